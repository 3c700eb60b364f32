use serde::{Deserialize, Serialize};

use crate::driver::{ConfigError, non_negative};

/// Configuration for eigendistortion synthesis.
///
/// `max_iterations` caps each phase separately. Defaults: `tolerance =
/// 1e-10`, one candidate direction, seed 0, and `rank_tol = 1e-8`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    max_iterations: usize,
    #[serde(default = "default_tolerance")]
    tolerance: f64,
    #[serde(default = "default_subspace_dim")]
    subspace_dim: usize,
    #[serde(default)]
    seed: u64,
    #[serde(default = "default_rank_tol")]
    rank_tol: f64,
}

fn default_tolerance() -> f64 {
    1e-10
}

fn default_subspace_dim() -> usize {
    1
}

fn default_rank_tol() -> f64 {
    1e-8
}

impl Config {
    #[must_use]
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            tolerance: default_tolerance(),
            subspace_dim: default_subspace_dim(),
            seed: 0,
            rank_tol: default_rank_tol(),
        }
    }

    /// Sets the relative change of the eigenvalue estimate at which a phase
    /// has converged.
    ///
    /// # Errors
    ///
    /// Returns an error if `tolerance` is negative or non-finite.
    pub fn with_tolerance(mut self, tolerance: f64) -> Result<Self, ConfigError> {
        non_negative(tolerance, ConfigError::Tolerance)?;
        self.tolerance = tolerance;
        Ok(self)
    }

    /// Sets how many candidate directions each phase iterates together.
    ///
    /// # Errors
    ///
    /// Returns an error if `dim` is zero.
    pub fn with_subspace_dim(mut self, dim: usize) -> Result<Self, ConfigError> {
        if dim == 0 {
            return Err(ConfigError::SubspaceDim);
        }
        self.subspace_dim = dim;
        Ok(self)
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the eigenvalue ratio `λ_min / λ_max` at or below which the
    /// Jacobian is reported as rank deficient.
    ///
    /// # Errors
    ///
    /// Returns an error if `rank_tol` is negative or non-finite.
    pub fn with_rank_tol(mut self, rank_tol: f64) -> Result<Self, ConfigError> {
        non_negative(rank_tol, ConfigError::RankTol)?;
        self.rank_tol = rank_tol;
        Ok(self)
    }

    /// Checks every setting, for configs built through deserialization.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative(self.tolerance, ConfigError::Tolerance)?;
        if self.subspace_dim == 0 {
            return Err(ConfigError::SubspaceDim);
        }
        non_negative(self.rank_tol, ConfigError::RankTol)
    }

    #[must_use]
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    #[must_use]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    #[must_use]
    pub fn subspace_dim(&self) -> usize {
        self.subspace_dim
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[must_use]
    pub fn rank_tol(&self) -> f64 {
        self.rank_tol
    }
}
