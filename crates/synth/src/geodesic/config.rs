use serde::{Deserialize, Serialize};

use crate::driver::{self, ConfigError, StepConfig, non_negative};

use super::PathInit;

/// Configuration for geodesic synthesis.
///
/// Defaults: Adam with `lr = 0.01`, seed 0, a straight initial path, no
/// reparameterization, and `speed_tol = 1e-6`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    driver: driver::Config,
    num_intermediate: usize,
    #[serde(default)]
    step: StepConfig,
    #[serde(default)]
    seed: u64,
    #[serde(default)]
    init: PathInit,
    #[serde(default)]
    reparameterize_every: Option<usize>,
    #[serde(default = "default_speed_tol")]
    speed_tol: f64,
}

fn default_speed_tol() -> f64 {
    1e-6
}

impl Config {
    /// Creates a config for paths with `num_intermediate` free points.
    ///
    /// # Errors
    ///
    /// Returns an error if `num_intermediate` is zero.
    pub fn new(driver: driver::Config, num_intermediate: usize) -> Result<Self, ConfigError> {
        if num_intermediate == 0 {
            return Err(ConfigError::Intermediate);
        }
        Ok(Self {
            driver,
            num_intermediate,
            step: StepConfig::default(),
            seed: 0,
            init: PathInit::default(),
            reparameterize_every: None,
            speed_tol: default_speed_tol(),
        })
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

    /// Sets how the initial path is built.
    ///
    /// # Errors
    ///
    /// Returns an error if a bridge's noise level is negative or non-finite.
    pub fn with_init(mut self, init: PathInit) -> Result<Self, ConfigError> {
        init.validate()?;
        self.init = init;
        Ok(self)
    }

    /// Redistributes the path's points to equal representation-space arc
    /// length after every `every` iterations.
    ///
    /// # Errors
    ///
    /// Returns an error if `every` is zero.
    pub fn with_reparameterize_every(mut self, every: usize) -> Result<Self, ConfigError> {
        if every == 0 {
            return Err(ConfigError::ReparameterizeEvery);
        }
        self.reparameterize_every = Some(every);
        Ok(self)
    }

    /// Sets the step-distance variance below which a plateaued path counts
    /// as converged.
    ///
    /// # Errors
    ///
    /// Returns an error if `tolerance` is negative or non-finite.
    pub fn with_speed_tol(mut self, tolerance: f64) -> Result<Self, ConfigError> {
        non_negative(tolerance, ConfigError::Tolerance)?;
        self.speed_tol = tolerance;
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
        if self.num_intermediate == 0 {
            return Err(ConfigError::Intermediate);
        }
        self.init.validate()?;
        if self.reparameterize_every == Some(0) {
            return Err(ConfigError::ReparameterizeEvery);
        }
        non_negative(self.speed_tol, ConfigError::Tolerance)
    }

    #[must_use]
    pub fn driver(&self) -> &driver::Config {
        &self.driver
    }

    #[must_use]
    pub fn num_intermediate(&self) -> usize {
        self.num_intermediate
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
    pub fn init(&self) -> &PathInit {
        &self.init
    }

    #[must_use]
    pub fn reparameterize_every(&self) -> Option<usize> {
        self.reparameterize_every
    }

    #[must_use]
    pub fn speed_tol(&self) -> f64 {
        self.speed_tol
    }
}
