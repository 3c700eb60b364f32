use stimuli_core::Image;

use crate::driver::{Session, Status};

/// The result of metamer synthesis.
#[derive(Debug, Clone)]
pub struct Solution {
    /// How the run ended.
    pub status: Status,

    /// The synthesized image.
    ///
    /// When an observer stopped the run this is the lowest-loss image seen.
    pub image: Image,

    /// Representation distance between `image` and the reference.
    pub distance: f64,

    /// Iterations completed when the run finished.
    pub iters: usize,

    /// The session, for resuming or saving the run.
    pub session: Session,
}

impl Solution {
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.status.is_converged()
    }

    /// Returns the loss of every completed iteration.
    #[must_use]
    pub fn loss_history(&self) -> &[f64] {
        self.session.loss_history()
    }
}
