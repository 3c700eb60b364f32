use serde::{Deserialize, Serialize};

use crate::driver::{self, ConfigError, StepConfig, non_negative, unit_interval};

use super::Projection;

/// Configuration for metamer synthesis.
///
/// Defaults: Adam with `lr = 0.01`, `tolerance = 1e-8`, clamping to
/// `[0, 1]`, seed 0, and no representation subsampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    driver: driver::Config,
    #[serde(default)]
    step: StepConfig,
    #[serde(default = "default_tolerance")]
    tolerance: f64,
    #[serde(default)]
    projection: Projection,
    #[serde(default)]
    seed: u64,
    #[serde(default)]
    fraction_removed: f64,
}

fn default_tolerance() -> f64 {
    1e-8
}

impl Config {
    /// Creates a config around the given driver settings.
    #[must_use]
    pub fn new(driver: driver::Config) -> Self {
        Self {
            driver,
            step: StepConfig::default(),
            tolerance: default_tolerance(),
            projection: Projection::default(),
            seed: 0,
            fraction_removed: 0.0,
        }
    }

    #[must_use]
    pub fn with_step(mut self, step: impl Into<StepConfig>) -> Self {
        self.step = step.into();
        self
    }

    /// Sets the representation distance at which synthesis has converged.
    ///
    /// # Errors
    ///
    /// Returns an error if `tolerance` is negative or non-finite.
    pub fn with_tolerance(mut self, tolerance: f64) -> Result<Self, ConfigError> {
        non_negative(tolerance, ConfigError::Tolerance)?;
        self.tolerance = tolerance;
        Ok(self)
    }

    /// Sets the projection applied after every step.
    ///
    /// # Errors
    ///
    /// Returns an error if the projection's range is empty or non-finite.
    pub fn with_projection(mut self, projection: Projection) -> Result<Self, ConfigError> {
        projection.validate()?;
        self.projection = projection;
        Ok(self)
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the fraction of representation elements dropped from the loss
    /// at each iteration.
    ///
    /// # Errors
    ///
    /// Returns an error if `fraction` is not in `[0, 1)`.
    pub fn with_fraction_removed(mut self, fraction: f64) -> Result<Self, ConfigError> {
        unit_interval(fraction, ConfigError::FractionRemoved)?;
        self.fraction_removed = fraction;
        Ok(self)
    }

    /// Checks every setting, for configs built through deserialization.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.driver.validate()?;
        self.step.validate()?;
        non_negative(self.tolerance, ConfigError::Tolerance)?;
        self.projection.validate()?;
        unit_interval(self.fraction_removed, ConfigError::FractionRemoved)
    }

    #[must_use]
    pub fn driver(&self) -> &driver::Config {
        &self.driver
    }

    #[must_use]
    pub fn step(&self) -> &StepConfig {
        &self.step
    }

    #[must_use]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    #[must_use]
    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub fn fraction_removed(&self) -> f64 {
        self.fraction_removed
    }
}
