use serde::{Deserialize, Serialize};

use crate::driver::{self, ConfigError, StepConfig, non_negative};

use super::PenaltySchedule;

/// Configuration for MAD competition.
///
/// Defaults: Adam with `lr = 0.01`, seed 0, the default
/// [`PenaltySchedule`], `constraint_tol = 1e-4`, initial noise variance
/// `noise_level = 0.1`, and pixel range `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    driver: driver::Config,
    #[serde(default)]
    step: StepConfig,
    #[serde(default)]
    seed: u64,
    #[serde(default)]
    schedule: PenaltySchedule,
    #[serde(default = "defaults::constraint_tol")]
    constraint_tol: f64,
    #[serde(default = "defaults::noise_level")]
    noise_level: f64,
    #[serde(default = "defaults::range")]
    range: (f64, f64),
}

mod defaults {
    pub(super) fn constraint_tol() -> f64 {
        1e-4
    }

    pub(super) fn noise_level() -> f64 {
        0.1
    }

    pub(super) fn range() -> (f64, f64) {
        (0.0, 1.0)
    }
}

impl Config {
    /// Creates a config around the given driver settings.
    #[must_use]
    pub fn new(driver: driver::Config) -> Self {
        Self {
            driver,
            step: StepConfig::default(),
            seed: 0,
            schedule: PenaltySchedule::default(),
            constraint_tol: defaults::constraint_tol(),
            noise_level: defaults::noise_level(),
            range: defaults::range(),
        }
    }

    #[must_use]
    pub fn with_step(mut self, step: impl Into<StepConfig>) -> Self {
        self.step = step.into();
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the penalty weight schedule.
    ///
    /// # Errors
    ///
    /// Returns an error if the schedule is invalid.
    pub fn with_schedule(mut self, schedule: PenaltySchedule) -> Result<Self, ConfigError> {
        schedule.validate()?;
        self.schedule = schedule;
        Ok(self)
    }

    /// Sets how far the fixed model's distance may stray from its target.
    ///
    /// # Errors
    ///
    /// Returns an error if `tolerance` is negative or non-finite.
    pub fn with_constraint_tol(mut self, tolerance: f64) -> Result<Self, ConfigError> {
        non_negative(tolerance, ConfigError::Tolerance)?;
        self.constraint_tol = tolerance;
        Ok(self)
    }

    /// Sets the variance of the noise added to the reference at initialization.
    ///
    /// # Errors
    ///
    /// Returns an error if `noise_level` is negative or non-finite.
    pub fn with_noise_level(mut self, noise_level: f64) -> Result<Self, ConfigError> {
        non_negative(noise_level, ConfigError::NoiseLevel)?;
        self.noise_level = noise_level;
        Ok(self)
    }

    /// Sets the pixel range images are clamped into.
    ///
    /// # Errors
    ///
    /// Returns an error unless `min < max` with finite bounds.
    pub fn with_range(mut self, min: f64, max: f64) -> Result<Self, ConfigError> {
        self.range = (min, max);
        self.validate_range()?;
        Ok(self)
    }

    fn validate_range(&self) -> Result<(), ConfigError> {
        let (min, max) = self.range;
        if min.is_finite() && max.is_finite() && min < max {
            Ok(())
        } else {
            Err(ConfigError::Range)
        }
    }

    /// Checks every setting, for configs built through deserialization.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.driver.validate()?;
        self.step.validate()?;
        self.schedule.validate()?;
        non_negative(self.constraint_tol, ConfigError::Tolerance)?;
        non_negative(self.noise_level, ConfigError::NoiseLevel)?;
        self.validate_range()
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
    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub fn schedule(&self) -> &PenaltySchedule {
        &self.schedule
    }

    #[must_use]
    pub fn constraint_tol(&self) -> f64 {
        self.constraint_tol
    }

    #[must_use]
    pub fn noise_level(&self) -> f64 {
        self.noise_level
    }

    #[must_use]
    pub fn range(&self) -> (f64, f64) {
        self.range
    }
}
