use serde::{Deserialize, Serialize};
use stimuli_core::Image;

use crate::driver::{Session, Status};

/// A unit-norm perturbation and its eigenvalue of `JᵀJ`.
#[derive(Debug, Clone, PartialEq)]
pub struct Direction {
    pub vector: Image,
    pub eigenvalue: f64,

    /// How the phase that produced this direction ended.
    pub status: Status,
}

/// The sessions of both phases, for resuming or saving a run.
///
/// `bottom` is `None` when the top phase has not converged yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sessions {
    pub top: Session,
    pub bottom: Option<Session>,
}

/// The result of eigendistortion synthesis.
#[derive(Debug, Clone)]
pub struct Solution {
    /// [`Status::Converged`] when both phases converged,
    /// [`Status::StoppedByObserver`] when an observer ended either phase,
    /// and [`Status::MaxIters`] otherwise.
    pub status: Status,

    /// The most sensitive direction.
    pub max: Direction,

    /// The least sensitive direction, absent if the top phase did not
    /// converge.
    pub min: Option<Direction>,

    /// True if `min.eigenvalue <= rank_tol · max.eigenvalue`.
    pub rank_deficient: bool,

    pub sessions: Sessions,
}

impl Solution {
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.status.is_converged()
    }
}
