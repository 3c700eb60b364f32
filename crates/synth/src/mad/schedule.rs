use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    driver::{Auxiliary, ConfigError, Hook, Session, positive},
};

use super::PENALTY;

/// Geometric growth of the constraint penalty weight.
///
/// The weight starts at `initial` and is multiplied by `factor` after every
/// `every` iterations, never exceeding `max`. Defaults: `initial = 1`,
/// `factor = 2`, `every = 25`, `max = 1e6`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenaltySchedule {
    initial: f64,
    factor: f64,
    every: usize,
    max: f64,
}

impl Default for PenaltySchedule {
    fn default() -> Self {
        Self {
            initial: 1.0,
            factor: 2.0,
            every: 25,
            max: 1e6,
        }
    }
}

impl PenaltySchedule {
    /// Creates a validated schedule.
    ///
    /// A `factor` of 1 keeps the weight constant.
    ///
    /// # Errors
    ///
    /// Returns an error unless `initial > 0`, `factor >= 1`, `every >= 1`,
    /// and `max >= initial`.
    pub fn new(initial: f64, factor: f64, every: usize, max: f64) -> Result<Self, ConfigError> {
        let schedule = Self {
            initial,
            factor,
            every,
            max,
        };
        schedule.validate()?;
        Ok(schedule)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        positive(self.initial, ConfigError::PenaltySchedule)?;
        positive(self.max, ConfigError::PenaltySchedule)?;
        if !self.factor.is_finite() || self.factor < 1.0 || self.every == 0 || self.max < self.initial {
            return Err(ConfigError::PenaltySchedule);
        }
        Ok(())
    }

    #[must_use]
    pub fn initial(&self) -> f64 {
        self.initial
    }

    #[must_use]
    pub fn factor(&self) -> f64 {
        self.factor
    }

    #[must_use]
    pub fn max(&self) -> f64 {
        self.max
    }
}

impl<O: ?Sized> Hook<O> for PenaltySchedule {
    fn every(&self) -> usize {
        self.every
    }

    fn apply(
        &self,
        _objective: &O,
        _iteration: usize,
        _iterate: &mut ArrayD<f64>,
        auxiliary: &mut Auxiliary,
    ) -> Result<(), Error> {
        let penalty = Session::auxiliary_value(auxiliary, PENALTY)?;
        auxiliary.insert(PENALTY.to_owned(), (penalty * self.factor).min(self.max));
        Ok(())
    }
}
