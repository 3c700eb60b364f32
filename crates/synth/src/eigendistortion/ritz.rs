//! Dense helpers for subspace iteration on a handful of candidate images.

use ndarray::{Array2, Array3};
use rand::Rng;
use rand_distr::StandardNormal;
use stimuli_core::{Image, tensor};

use crate::driver::SessionRng;

const MAX_SWEEPS: usize = 64;

/// A candidate whose norm falls to this fraction of the largest input is
/// replaced by a random direction.
const COLLAPSE: f64 = 1e-12;

const MAX_RESEEDS: usize = 16;

/// Diagonalizes a symmetric matrix with cyclic Jacobi rotations.
///
/// Returns the eigenvalues in descending order and the matching unit
/// eigenvectors as columns.
pub(super) fn symmetric_eigen(matrix: &Array2<f64>) -> (Vec<f64>, Array2<f64>) {
    let n = matrix.nrows();
    let mut a = matrix.clone();
    let mut v = Array2::<f64>::eye(n);

    for _ in 0..MAX_SWEEPS {
        let off_diagonal = (0..n)
            .flat_map(|p| (p + 1..n).map(move |q| (p, q)))
            .map(|(p, q)| a[[p, q]].powi(2))
            .sum::<f64>()
            .sqrt();
        if off_diagonal <= f64::EPSILON * tensor::norm(&a) {
            break;
        }

        for p in 0..n {
            for q in p + 1..n {
                let apq = a[[p, q]];
                if apq == 0.0 {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let (akp, akq) = (a[[k, p]], a[[k, q]]);
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let (apk, aqk) = (a[[p, k]], a[[q, k]]);
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let (vkp, vkq) = (v[[k, p]], v[[k, q]]);
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| a[[j, j]].total_cmp(&a[[i, i]]));

    let values = order.iter().map(|&i| a[[i, i]]).collect();
    let vectors = Array2::from_shape_fn((n, n), |(row, col)| v[[row, order[col]]]);
    (values, vectors)
}

/// Orthonormalizes `vectors` in order with Gram-Schmidt.
///
/// A vector that is (numerically) in the span of its predecessors is
/// replaced by a Gaussian draw from `rng`, so the result always has as many
/// vectors as the input.
pub(super) fn orthonormalize(vectors: Vec<Image>, rng: &mut SessionRng) -> Vec<Image> {
    let scale = vectors.iter().map(tensor::norm).fold(0.0, f64::max);
    let mut basis: Vec<Image> = Vec::with_capacity(vectors.len());

    for vector in vectors {
        let mut candidate = reject(vector, &basis);
        let mut reseeds = 0;
        while reseeds < MAX_RESEEDS && collapsed(&candidate, scale) {
            let draw = Array3::from_shape_simple_fn(candidate.raw_dim(), || {
                rng.sample::<f64, _>(StandardNormal)
            });
            candidate = reject(draw, &basis);
            reseeds += 1;
        }
        let norm = tensor::norm(&candidate);
        candidate.mapv_inplace(|x| x / norm);
        basis.push(candidate);
    }
    basis
}

fn collapsed(candidate: &Image, scale: f64) -> bool {
    let norm = tensor::norm(candidate);
    norm == 0.0 || norm <= COLLAPSE * scale
}

/// Removes the components of `vector` along an orthonormal `basis`, twice.
fn reject(mut vector: Image, basis: &[Image]) -> Image {
    for _ in 0..2 {
        for direction in basis {
            let projection = tensor::dot(&vector, direction);
            vector.scaled_add(-projection, direction);
        }
    }
    vector
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::SeedableRng;

    #[test]
    fn eigen_sorts_descending() {
        let (values, vectors) = symmetric_eigen(&array![[2.0, 0.0], [0.0, 5.0]]);

        assert_eq!(values, vec![5.0, 2.0]);
        assert_relative_eq!(vectors, array![[0.0, 1.0], [1.0, 0.0]]);
    }

    #[test]
    fn eigen_diagonalizes_a_coupled_matrix() {
        let matrix = array![[2.0, 1.0, 0.0], [1.0, 2.0, 1.0], [0.0, 1.0, 2.0]];

        let (values, vectors) = symmetric_eigen(&matrix);

        let root = 2.0_f64.sqrt();
        assert_relative_eq!(values[0], 2.0 + root, epsilon = 1e-12);
        assert_relative_eq!(values[1], 2.0, epsilon = 1e-12);
        assert_relative_eq!(values[2], 2.0 - root, epsilon = 1e-12);

        for (col, value) in values.iter().enumerate() {
            let vector = vectors.column(col);
            assert_relative_eq!(matrix.dot(&vector), &vector * *value, epsilon = 1e-12);
            assert_relative_eq!(tensor::norm(&vector), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn orthonormalize_produces_an_orthonormal_set() {
        let mut rng = SessionRng::seed_from_u64(0);
        let vectors = vec![array![[[3.0, 0.0, 0.0]]], array![[[1.0, 2.0, 0.0]]]];

        let basis = orthonormalize(vectors, &mut rng);

        assert_relative_eq!(basis[0], array![[[1.0, 0.0, 0.0]]]);
        assert_relative_eq!(basis[1], array![[[0.0, 1.0, 0.0]]]);
    }

    #[test]
    fn collapsed_vectors_are_reseeded() {
        let mut rng = SessionRng::seed_from_u64(1);
        let vectors = vec![
            array![[[1.0, 1.0, 0.0]]],
            array![[[2.0, 2.0, 0.0]]],
            array![[[0.0, 0.0, 0.0]]],
        ];

        let basis = orthonormalize(vectors, &mut rng);

        assert_eq!(basis.len(), 3);
        for (i, a) in basis.iter().enumerate() {
            assert_relative_eq!(tensor::norm(a), 1.0, epsilon = 1e-12);
            for b in &basis[i + 1..] {
                assert_relative_eq!(tensor::dot(a, b), 0.0, epsilon = 1e-12);
            }
        }
    }
}
