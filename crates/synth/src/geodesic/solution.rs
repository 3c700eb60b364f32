use ndarray::Array4;

use crate::driver::{Session, Status};

/// The result of geodesic synthesis.
#[derive(Debug, Clone)]
pub struct Solution {
    /// How the run ended.
    pub status: Status,

    /// The full path, `[n + 2, c, h, w]`, from the start image to the end
    /// image. The endpoints are the caller's images, bit for bit.
    pub path: Array4<f64>,

    /// Sum of the step distances along `path`.
    pub energy: f64,

    /// Representation distance of each step along `path`.
    pub step_distances: Vec<f64>,

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

    #[must_use]
    pub fn loss_history(&self) -> &[f64] {
        self.session.loss_history()
    }
}
