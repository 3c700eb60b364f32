//! Tensor aliases and the small reductions the engines share.

use ndarray::{Array3, ArrayBase, ArrayD, Data, Dimension};

/// A single image with shape `[channels, height, width]`.
pub type Image = Array3<f64>;

/// A model output of arbitrary shape.
pub type Representation = ArrayD<f64>;

/// Returns the inner product of two equally shaped arrays.
///
/// Elements are paired in logical order; callers are responsible for
/// checking that the shapes agree.
pub fn dot<S1, S2, D>(a: &ArrayBase<S1, D>, b: &ArrayBase<S2, D>) -> f64
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
    D: Dimension,
{
    debug_assert_eq!(a.shape(), b.shape());
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Returns the Euclidean norm of an array.
pub fn norm<S, D>(a: &ArrayBase<S, D>) -> f64
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    a.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Returns the mean and population standard deviation of an array.
///
/// An empty array has mean and deviation zero.
pub fn moments<S, D>(a: &ArrayBase<S, D>) -> (f64, f64)
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    if a.is_empty() {
        return (0.0, 0.0);
    }
    #[allow(clippy::cast_precision_loss)]
    let n = a.len() as f64;
    let mean = a.sum() / n;
    let variance = a.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Returns true if every element is finite.
pub fn all_finite<S, D>(a: &ArrayBase<S, D>) -> bool
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    a.iter().all(|x| x.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use ndarray::{array, Array1};

    #[test]
    fn dot_and_norm_agree() {
        let a = array![[3.0, 0.0], [0.0, 4.0]];
        assert_relative_eq!(dot(&a, &a), 25.0);
        assert_relative_eq!(norm(&a), 5.0);
    }

    #[test]
    fn moments_of_constant_array() {
        let (mean, std) = moments(&Array1::from_elem(5, 0.25));
        assert_relative_eq!(mean, 0.25);
        assert_relative_eq!(std, 0.0);
    }

    #[test]
    fn moments_use_population_deviation() {
        let (mean, std) = moments(&array![1.0, 3.0]);
        assert_relative_eq!(mean, 2.0);
        assert_relative_eq!(std, 1.0);
    }

    #[test]
    fn detects_non_finite_values() {
        assert!(all_finite(&array![0.0, -1.0]));
        assert!(!all_finite(&array![0.0, f64::NAN]));
        assert!(!all_finite(&array![f64::INFINITY]));
    }
}
