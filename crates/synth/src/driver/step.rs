//! Step procedures: how an iterate moves given its gradient.
//!
//! A procedure is stateless itself; anything it accumulates across
//! iterations (momentum, moment estimates, step counts) lives in the
//! [`OptimizerState`] carried by the session, so a resumed run continues
//! exactly where it left off.

use std::collections::BTreeMap;

use ndarray::{ArrayD, Zip};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::config::{ConfigError, positive, unit_interval};

/// Named buffers and counters accumulated by a step procedure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizerState {
    buffers: BTreeMap<String, ArrayD<f64>>,
    counters: BTreeMap<String, u64>,
}

/// Errors raised when optimizer state does not fit the iterate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("buffer `{name}` has shape {found:?}, expected {expected:?}")]
    Shape {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
}

impl OptimizerState {
    /// Returns true if no procedure has written any state yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty() && self.counters.is_empty()
    }

    /// Returns the named buffer, if present.
    #[must_use]
    pub fn buffer(&self, name: &str) -> Option<&ArrayD<f64>> {
        self.buffers.get(name)
    }

    /// Returns the named counter, zero if absent.
    #[must_use]
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    /// Removes the named buffer, or creates a zeroed one shaped like `like`.
    fn take_buffer(&mut self, name: &str, like: &ArrayD<f64>) -> Result<ArrayD<f64>, StateError> {
        match self.buffers.remove(name) {
            Some(buffer) if buffer.shape() == like.shape() => Ok(buffer),
            Some(buffer) => Err(StateError::Shape {
                name: name.to_owned(),
                expected: like.shape().to_vec(),
                found: buffer.shape().to_vec(),
            }),
            None => Ok(ArrayD::zeros(like.raw_dim())),
        }
    }

    fn put_buffer(&mut self, name: &str, buffer: ArrayD<f64>) {
        self.buffers.insert(name.to_owned(), buffer);
    }

    fn increment(&mut self, name: &str) -> u64 {
        let counter = self.counters.entry(name.to_owned()).or_insert(0);
        *counter += 1;
        *counter
    }
}

/// Updates an iterate in place from its gradient.
pub trait StepProcedure {
    /// Applies one descent step.
    ///
    /// # Errors
    ///
    /// Returns an error if `state` holds buffers that do not match the iterate.
    fn step(
        &self,
        state: &mut OptimizerState,
        iterate: &mut ArrayD<f64>,
        gradient: &ArrayD<f64>,
    ) -> Result<(), StateError>;
}

/// Gradient descent with optional heavy-ball momentum.
///
/// With momentum `μ` the update is `v ← μ v + g`, `x ← x - lr v`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sgd {
    learning_rate: f64,
    #[serde(default)]
    momentum: f64,
}

impl Sgd {
    const VELOCITY: &'static str = "velocity";

    /// Creates plain gradient descent with the given learning rate.
    ///
    /// # Errors
    ///
    /// Returns an error if `learning_rate` is not finite and positive.
    pub fn new(learning_rate: f64) -> Result<Self, ConfigError> {
        let sgd = Self {
            learning_rate,
            momentum: 0.0,
        };
        sgd.validate()?;
        Ok(sgd)
    }

    /// Sets the momentum coefficient.
    ///
    /// # Errors
    ///
    /// Returns an error if `momentum` is not in `[0, 1)`.
    pub fn with_momentum(mut self, momentum: f64) -> Result<Self, ConfigError> {
        self.momentum = momentum;
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        positive(self.learning_rate, ConfigError::LearningRate)?;
        unit_interval(self.momentum, ConfigError::Momentum)
    }

    #[must_use]
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    #[must_use]
    pub fn momentum(&self) -> f64 {
        self.momentum
    }
}

impl StepProcedure for Sgd {
    fn step(
        &self,
        state: &mut OptimizerState,
        iterate: &mut ArrayD<f64>,
        gradient: &ArrayD<f64>,
    ) -> Result<(), StateError> {
        if self.momentum == 0.0 {
            iterate.scaled_add(-self.learning_rate, gradient);
            return Ok(());
        }

        let mut velocity = state.take_buffer(Self::VELOCITY, iterate)?;
        Zip::from(&mut velocity)
            .and(gradient)
            .for_each(|v, &g| *v = self.momentum * *v + g);
        iterate.scaled_add(-self.learning_rate, &velocity);
        state.put_buffer(Self::VELOCITY, velocity);
        Ok(())
    }
}

/// Adam with bias-corrected first and second moment estimates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Adam {
    #[serde(default = "Adam::default_learning_rate")]
    learning_rate: f64,
    #[serde(default = "Adam::default_betas")]
    betas: (f64, f64),
    #[serde(default = "Adam::default_epsilon")]
    epsilon: f64,
}

impl Default for Adam {
    fn default() -> Self {
        Self {
            learning_rate: Self::default_learning_rate(),
            betas: Self::default_betas(),
            epsilon: Self::default_epsilon(),
        }
    }
}

impl Adam {
    const FIRST_MOMENT: &'static str = "first_moment";
    const SECOND_MOMENT: &'static str = "second_moment";
    const STEPS: &'static str = "steps";

    fn default_learning_rate() -> f64 {
        0.01
    }

    fn default_betas() -> (f64, f64) {
        (0.9, 0.999)
    }

    fn default_epsilon() -> f64 {
        1e-8
    }

    /// Creates Adam with the given learning rate and default betas and epsilon.
    ///
    /// # Errors
    ///
    /// Returns an error if `learning_rate` is not finite and positive.
    pub fn new(learning_rate: f64) -> Result<Self, ConfigError> {
        let adam = Self {
            learning_rate,
            ..Self::default()
        };
        adam.validate()?;
        Ok(adam)
    }

    /// Sets the exponential decay rates of the moment estimates.
    ///
    /// # Errors
    ///
    /// Returns an error if either beta is not in `[0, 1)`.
    pub fn with_betas(mut self, beta1: f64, beta2: f64) -> Result<Self, ConfigError> {
        self.betas = (beta1, beta2);
        self.validate()?;
        Ok(self)
    }

    /// Sets the denominator offset.
    ///
    /// # Errors
    ///
    /// Returns an error if `epsilon` is not finite and positive.
    pub fn with_epsilon(mut self, epsilon: f64) -> Result<Self, ConfigError> {
        self.epsilon = epsilon;
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        positive(self.learning_rate, ConfigError::LearningRate)?;
        unit_interval(self.betas.0, ConfigError::Beta)?;
        unit_interval(self.betas.1, ConfigError::Beta)?;
        positive(self.epsilon, ConfigError::Epsilon)
    }

    #[must_use]
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    #[must_use]
    pub fn betas(&self) -> (f64, f64) {
        self.betas
    }

    #[must_use]
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }
}

impl StepProcedure for Adam {
    fn step(
        &self,
        state: &mut OptimizerState,
        iterate: &mut ArrayD<f64>,
        gradient: &ArrayD<f64>,
    ) -> Result<(), StateError> {
        let mut first = state.take_buffer(Self::FIRST_MOMENT, iterate)?;
        let mut second = state.take_buffer(Self::SECOND_MOMENT, iterate)?;
        let steps = state.increment(Self::STEPS);

        let (beta1, beta2) = self.betas;
        #[allow(clippy::cast_precision_loss)]
        let t = steps as f64;
        let correction1 = 1.0 - beta1.powf(t);
        let correction2 = 1.0 - beta2.powf(t);

        Zip::from(&mut *iterate)
            .and(&mut first)
            .and(&mut second)
            .and(gradient)
            .for_each(|x, m, v, &g| {
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                let m_hat = *m / correction1;
                let v_hat = *v / correction2;
                *x -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
            });

        state.put_buffer(Self::FIRST_MOMENT, first);
        state.put_buffer(Self::SECOND_MOMENT, second);
        Ok(())
    }
}

/// A serializable choice of step procedure.
///
/// Deserializes from a table tagged by `kind`, for example
/// `{ kind = "adam", learning_rate = 0.05 }`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepConfig {
    Sgd(Sgd),
    Adam(Adam),
}

impl Default for StepConfig {
    fn default() -> Self {
        Self::Adam(Adam::default())
    }
}

impl From<Sgd> for StepConfig {
    fn from(sgd: Sgd) -> Self {
        Self::Sgd(sgd)
    }
}

impl From<Adam> for StepConfig {
    fn from(adam: Adam) -> Self {
        Self::Adam(adam)
    }
}

impl StepConfig {
    /// Checks the procedure's settings, for configs built through deserialization.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Sgd(sgd) => sgd.validate(),
            Self::Adam(adam) => adam.validate(),
        }
    }
}

impl StepProcedure for StepConfig {
    fn step(
        &self,
        state: &mut OptimizerState,
        iterate: &mut ArrayD<f64>,
        gradient: &ArrayD<f64>,
    ) -> Result<(), StateError> {
        match self {
            Self::Sgd(sgd) => sgd.step(state, iterate, gradient),
            Self::Adam(adam) => adam.step(state, iterate, gradient),
        }
    }
}
