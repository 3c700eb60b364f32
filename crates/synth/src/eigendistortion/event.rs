use ndarray::ArrayD;

/// Which end of the spectrum a phase computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Iterates on `JᵀJ` toward its largest eigenvalue.
    Top,

    /// Iterates on `λ_max·I - JᵀJ` toward the smallest eigenvalue of `JᵀJ`.
    Bottom,
}

/// One iteration of an eigendistortion phase.
#[derive(Debug, Clone, Copy)]
pub struct Event<'a> {
    pub phase: Phase,
    pub iteration: usize,

    /// The phase's current estimate of an eigenvalue of `JᵀJ`.
    pub estimate: f64,

    /// Change of the Rayleigh quotient since the previous iteration, or
    /// `None` on a phase's first iteration.
    pub change: Option<f64>,

    /// The orthonormal candidate basis, `[k, c, h, w]`.
    pub basis: &'a ArrayD<f64>,
}
