use stimuli_core::Image;

use crate::driver::{Session, Status};

use super::Extremize;

/// The result of one MAD synthesis.
#[derive(Debug, Clone)]
pub struct Solution {
    /// How the run ended.
    pub status: Status,

    /// Whether the optimized model's distance was minimized or maximized.
    pub extremize: Extremize,

    /// The synthesized image.
    pub image: Image,

    /// Fixed-model distance between `image` and the reference.
    pub fixed_distance: f64,

    /// Optimized-model distance between `image` and the reference.
    pub optimized_distance: f64,

    /// The fixed-model distance the run was constrained to.
    pub target_distance: f64,

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

    /// Returns how far the fixed-model distance ended from its target.
    #[must_use]
    pub fn residual(&self) -> f64 {
        self.fixed_distance - self.target_distance
    }

    #[must_use]
    pub fn loss_history(&self) -> &[f64] {
        self.session.loss_history()
    }
}
