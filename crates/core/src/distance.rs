use crate::tensor::{self, Representation};

/// A differentiable dissimilarity between two representations.
///
/// Implementations must be non-negative and zero for identical inputs.
/// Callers guarantee both arguments have the same shape.
pub trait Distance {
    /// Returns the distance between `a` and `b`.
    fn distance(&self, a: &Representation, b: &Representation) -> f64;

    /// Returns the gradient of the distance with respect to `a`.
    fn gradient(&self, a: &Representation, b: &Representation) -> Representation;

    /// Returns the gradient of the distance with respect to `b`.
    ///
    /// The default assumes a symmetric distance.
    fn gradient_second(&self, a: &Representation, b: &Representation) -> Representation {
        self.gradient(b, a)
    }
}

/// Mean of squared elementwise differences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeanSquaredError;

impl Distance for MeanSquaredError {
    fn distance(&self, a: &Representation, b: &Representation) -> f64 {
        if a.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = a.len() as f64;
        a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum::<f64>() / n
    }

    fn gradient(&self, a: &Representation, b: &Representation) -> Representation {
        if a.is_empty() {
            return a.clone();
        }
        #[allow(clippy::cast_precision_loss)]
        let scale = 2.0 / a.len() as f64;
        (a - b) * scale
    }
}

/// Euclidean norm of the difference.
///
/// The gradient is taken as zero where the two inputs coincide.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Euclidean;

impl Distance for Euclidean {
    fn distance(&self, a: &Representation, b: &Representation) -> f64 {
        tensor::norm(&(a - b))
    }

    fn gradient(&self, a: &Representation, b: &Representation) -> Representation {
        let diff = a - b;
        let norm = tensor::norm(&diff);
        if norm > 0.0 { diff / norm } else { diff }
    }
}
