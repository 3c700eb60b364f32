use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Checkpoint;

/// Configuration shared by every optimization run.
///
/// The iteration cap has no default and must be given to [`Config::new`].
/// The remaining settings start from documented defaults:
///
/// - `loss_rel_tol = 1e-9` and `loss_window = 10`: the loss plateau test
/// - `divergence_patience = 5`: consecutive non-finite evaluations tolerated
/// - `checkpoint = None`: no snapshots are written during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    max_iterations: usize,
    #[serde(default = "defaults::loss_rel_tol")]
    loss_rel_tol: f64,
    #[serde(default = "defaults::loss_window")]
    loss_window: usize,
    #[serde(default = "defaults::divergence_patience")]
    divergence_patience: usize,
    #[serde(default)]
    checkpoint: Option<Checkpoint>,
}

mod defaults {
    pub(super) fn loss_rel_tol() -> f64 {
        1e-9
    }

    pub(super) fn loss_window() -> usize {
        10
    }

    pub(super) fn divergence_patience() -> usize {
        5
    }
}

/// Errors that can occur when validating a synthesis config.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("loss_rel_tol must be finite and positive")]
    LossRelTol,

    #[error("loss_window must be at least 1")]
    LossWindow,

    #[error("divergence_patience must be at least 1")]
    DivergencePatience,

    #[error("learning_rate must be finite and positive")]
    LearningRate,

    #[error("momentum must be in [0, 1)")]
    Momentum,

    #[error("betas must be in [0, 1)")]
    Beta,

    #[error("epsilon must be finite and positive")]
    Epsilon,

    #[error("tolerance must be finite and non-negative")]
    Tolerance,

    #[error("range must satisfy min < max with finite bounds")]
    Range,

    #[error("fraction_removed must be in [0, 1)")]
    FractionRemoved,

    #[error("noise_level must be finite and non-negative")]
    NoiseLevel,

    #[error("subspace_dim must be at least 1 and at most the number of pixels")]
    SubspaceDim,

    #[error("rank_tol must be finite and non-negative")]
    RankTol,

    #[error("penalty schedule needs initial > 0, factor >= 1, every >= 1, and max >= initial")]
    PenaltySchedule,

    #[error("num_intermediate must be at least 1")]
    Intermediate,

    #[error("reparameterize_every must be at least 1")]
    ReparameterizeEvery,

    #[error("checkpoint every must be at least 1")]
    CheckpointEvery,
}

impl Config {
    /// Creates a config with the given iteration cap and default tolerances.
    #[must_use]
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            loss_rel_tol: defaults::loss_rel_tol(),
            loss_window: defaults::loss_window(),
            divergence_patience: defaults::divergence_patience(),
            checkpoint: None,
        }
    }

    /// Sets the loss plateau test.
    ///
    /// A run plateaus when the relative change of the loss over the last
    /// `window` iterations is below `rel_tol`.
    ///
    /// # Errors
    ///
    /// Returns an error if `rel_tol` is not finite and positive or `window` is zero.
    pub fn with_loss_tolerance(mut self, rel_tol: f64, window: usize) -> Result<Self, ConfigError> {
        self.loss_rel_tol = rel_tol;
        self.loss_window = window;
        self.validate()?;
        Ok(self)
    }

    /// Sets how many consecutive non-finite evaluations are tolerated.
    ///
    /// # Errors
    ///
    /// Returns an error if `patience` is zero.
    pub fn with_divergence_patience(mut self, patience: usize) -> Result<Self, ConfigError> {
        self.divergence_patience = patience;
        self.validate()?;
        Ok(self)
    }

    /// Writes the session to disk periodically during a run.
    #[must_use]
    pub fn with_checkpoint(mut self, checkpoint: Checkpoint) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    /// Checks every setting, for configs built through deserialization.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.loss_rel_tol.is_finite() || self.loss_rel_tol <= 0.0 {
            return Err(ConfigError::LossRelTol);
        }
        if self.loss_window == 0 {
            return Err(ConfigError::LossWindow);
        }
        if self.divergence_patience == 0 {
            return Err(ConfigError::DivergencePatience);
        }
        if let Some(checkpoint) = &self.checkpoint {
            checkpoint.validate()?;
        }
        Ok(())
    }

    /// Returns the iteration cap for a fresh run.
    #[must_use]
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Returns the relative tolerance of the loss plateau test.
    #[must_use]
    pub fn loss_rel_tol(&self) -> f64 {
        self.loss_rel_tol
    }

    /// Returns the window, in iterations, of the loss plateau test.
    #[must_use]
    pub fn loss_window(&self) -> usize {
        self.loss_window
    }

    /// Returns how many consecutive non-finite evaluations are tolerated.
    #[must_use]
    pub fn divergence_patience(&self) -> usize {
        self.divergence_patience
    }

    #[must_use]
    pub fn checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoint.as_ref()
    }

    /// Returns true if `loss` is a plateau relative to the recorded history.
    ///
    /// `loss` is the loss at the current iterate, one past the end of
    /// `history`. It is compared against the loss `loss_window` iterations
    /// earlier.
    #[must_use]
    pub fn is_plateau(&self, history: &[f64], loss: f64) -> bool {
        let Some(index) = history.len().checked_sub(self.loss_window) else {
            return false;
        };
        let past = history[index];
        let change = (loss - past).abs() / past.abs().max(f64::MIN_POSITIVE);
        change < self.loss_rel_tol
    }
}

/// Returns an error unless `value` is finite and non-negative.
pub(crate) fn non_negative(value: f64, error: ConfigError) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(error)
    }
}

/// Returns an error unless `value` is finite and positive.
pub(crate) fn positive(value: f64, error: ConfigError) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(error)
    }
}

/// Returns an error unless `value` lies in `[0, 1)`.
pub(crate) fn unit_interval(value: f64, error: ConfigError) -> Result<(), ConfigError> {
    if (0.0..1.0).contains(&value) {
        Ok(())
    } else {
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plateau_needs_a_full_window() {
        let config = Config::new(100).with_loss_tolerance(1e-6, 3).unwrap();
        assert!(!config.is_plateau(&[1.0, 1.0], 1.0));
        assert!(config.is_plateau(&[1.0, 1.0, 1.0], 1.0));
    }

    #[test]
    fn plateau_compares_against_the_window_start() {
        let config = Config::new(100).with_loss_tolerance(1e-3, 2).unwrap();
        let history = [10.0, 2.0, 1.0];
        assert!(!config.is_plateau(&history, 1.9));
        assert!(config.is_plateau(&history, 1.9999));
    }

    #[test]
    fn rejects_invalid_settings() {
        assert_eq!(
            Config::new(10).with_loss_tolerance(0.0, 5),
            Err(ConfigError::LossRelTol)
        );
        assert_eq!(
            Config::new(10).with_loss_tolerance(1e-6, 0),
            Err(ConfigError::LossWindow)
        );
        assert_eq!(
            Config::new(10).with_divergence_patience(0),
            Err(ConfigError::DivergencePatience)
        );
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: Config = serde_json::from_str(r#"{ "max_iterations": 50 }"#).unwrap();
        assert_eq!(config, Config::new(50));
        assert!(config.checkpoint().is_none());
    }

    #[test]
    fn deserialized_checkpoint_is_validated() {
        let config: Config = serde_json::from_str(
            r#"{ "max_iterations": 50, "checkpoint": { "every": 0, "path": "run.json" } }"#,
        )
        .unwrap();
        assert_eq!(config.validate(), Err(ConfigError::CheckpointEvery));
    }
}
