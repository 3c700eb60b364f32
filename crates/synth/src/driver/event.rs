use ndarray::ArrayD;

/// Emitted once per iteration, after evaluation and before the step.
///
/// `metrics` carries engine-specific quantities (a metamer's distance, a MAD
/// constraint residual, a geodesic's step lengths).
#[derive(Debug)]
pub struct Event<'a, M> {
    /// Iterations completed before this evaluation.
    pub iteration: usize,

    /// Loss at `iterate`.
    pub loss: f64,

    /// Euclidean norm of the loss gradient at `iterate`.
    pub gradient_norm: f64,

    pub metrics: &'a M,

    /// The iterate that was evaluated.
    pub iterate: &'a ArrayD<f64>,
}
