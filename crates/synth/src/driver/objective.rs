use std::fmt::Debug;

use ndarray::ArrayD;

use crate::Error;

use super::{
    Criterion, Status,
    session::{Auxiliary, SessionRng},
};

/// The loss, gradient, and engine metrics at one iterate.
#[derive(Debug, Clone)]
pub struct Evaluation<M> {
    pub loss: f64,
    pub gradient: ArrayD<f64>,
    pub metrics: M,
}

impl<M> Evaluation<M> {
    /// Returns true if the loss and every gradient element are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.loss.is_finite() && self.gradient.iter().all(|g| g.is_finite())
    }
}

/// What an engine optimizes.
///
/// The driver owns the loop; an objective supplies the loss and its gradient
/// and decides when its engine stops. Only `evaluate` is required. The
/// defaults project nothing, converge on a loss plateau, and report
/// [`Status::MaxIters`] at the cap.
pub trait Objective {
    type Metrics: Clone + Debug;

    /// Evaluates the loss and its gradient at `iterate`.
    ///
    /// Any randomness must come from `rng`. The driver hands out a copy of
    /// the session's generator and keeps the advanced copy only when the
    /// iteration completes, so evaluation stays reproducible across resumes.
    ///
    /// # Errors
    ///
    /// Returns an error if a model call fails or shapes disagree.
    fn evaluate(
        &self,
        iterate: &ArrayD<f64>,
        auxiliary: &Auxiliary,
        rng: &mut SessionRng,
    ) -> Result<Evaluation<Self::Metrics>, Error>;

    /// Maps a freshly stepped iterate back onto the feasible set.
    fn project(&self, _iterate: &mut ArrayD<f64>) {}

    /// Decides whether the run stops at this evaluation, and with what status.
    ///
    /// Only [`Status::Converged`] counts as success. An engine with its own
    /// target should stop a plateau that misses it with [`Status::Plateaued`].
    fn assess(&self, _evaluation: &Evaluation<Self::Metrics>, plateaued: bool) -> Option<Status> {
        plateaued.then_some(Status::Converged(Criterion::LossPlateau))
    }

    /// Returns the status for a run that reached its cap at this evaluation.
    fn exhausted(&self, _evaluation: &Evaluation<Self::Metrics>) -> Status {
        Status::MaxIters
    }
}

/// A periodic adjustment applied after the step of every `every()`-th
/// iteration.
///
/// Hooks may rewrite the iterate (path reparameterization) or the session's
/// auxiliary values (penalty schedules). A hook is a pure function of its
/// inputs, so resumed runs apply it at the same iterations with the same
/// effect.
pub trait Hook<O: ?Sized> {
    /// Returns the period, in completed iterations.
    fn every(&self) -> usize;

    /// Applies the hook after `iteration` iterations have completed.
    ///
    /// # Errors
    ///
    /// Returns an error if the hook needs a model call that fails.
    fn apply(
        &self,
        objective: &O,
        iteration: usize,
        iterate: &mut ArrayD<f64>,
        auxiliary: &mut Auxiliary,
    ) -> Result<(), Error>;
}
