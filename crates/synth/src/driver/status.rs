use serde::{Deserialize, Serialize};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// Met a convergence criterion.
    Converged(Criterion),

    /// The loss stopped changing before the engine's target was met.
    Plateaued,

    /// Reached the iteration cap without converging.
    MaxIters,

    /// Reached the iteration cap with an engine constraint still violated.
    ConstraintUnsatisfied,

    /// Stopped early due to an observer decision.
    StoppedByObserver,
}

/// The criterion a converged run satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Criterion {
    /// The loss stopped changing over the configured window, for engines
    /// whose target is a stationary loss.
    LossPlateau,

    /// An engine-specific target was reached, such as a metamer distance
    /// below tolerance or a stable eigenvalue estimate.
    Objective,
}

impl Status {
    #[must_use]
    pub fn is_converged(self) -> bool {
        matches!(self, Self::Converged(_))
    }
}
