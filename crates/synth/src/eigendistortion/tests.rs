use approx::assert_relative_eq;
use ndarray::{Array, Array2};
use stimuli_core::{Image, models::Linear, tensor};

use crate::{
    Error,
    driver::{Action, ConfigError, Status},
};

use super::*;

/// A linear model on a 2×2 image whose weights are `diag(gains)`.
fn diagonal(gains: [f64; 4]) -> Linear {
    Linear::new(Array2::from_diag(&Array::from(gains.to_vec())), [1, 2, 2]).unwrap()
}

fn reference() -> Image {
    Array::from_shape_vec((1, 2, 2), vec![0.2, 0.4, 0.6, 0.8]).unwrap()
}

/// Returns the magnitude of the pixel a direction is concentrated on.
fn component(direction: &Direction, pixel: usize) -> f64 {
    direction.vector.iter().nth(pixel).copied().unwrap().abs()
}

#[test]
fn finds_extreme_eigenvalues_of_a_diagonal_jacobian() {
    let model = diagonal([4.0, 3.0, 2.0, 0.5]);
    let image = reference();
    let engine = Eigendistortion::at(&model, &image, Config::new(500)).unwrap();

    let solution = engine.synthesize_unobserved().unwrap();

    assert!(solution.is_converged());
    assert!(!solution.rank_deficient);
    assert_relative_eq!(solution.max.eigenvalue, 16.0, epsilon = 1e-6);
    assert!(component(&solution.max, 0) > 1.0 - 1e-6);

    let min = solution.min.unwrap();
    assert_relative_eq!(min.eigenvalue, 0.25, epsilon = 1e-6);
    assert!(component(&min, 3) > 1.0 - 1e-6);

    assert!(solution.max.eigenvalue >= min.eigenvalue);
    for direction in [&solution.max, &min] {
        assert_relative_eq!(tensor::norm(&direction.vector), 1.0, epsilon = 1e-12);
    }
}

#[test]
fn larger_subspace_converges_to_the_same_pair() {
    let model = diagonal([4.0, 3.0, 2.0, 0.5]);
    let image = reference();
    let config = Config::new(500).with_subspace_dim(2).unwrap().with_seed(9);
    let engine = Eigendistortion::at(&model, &image, config).unwrap();

    let solution = engine.synthesize_unobserved().unwrap();

    assert!(solution.is_converged());
    assert_eq!(solution.sessions.top.iterate().shape(), &[2, 1, 2, 2]);
    assert_relative_eq!(solution.max.eigenvalue, 16.0, epsilon = 1e-6);
    assert_relative_eq!(solution.min.unwrap().eigenvalue, 0.25, epsilon = 1e-6);
}

#[test]
fn rank_deficiency_is_reported_not_raised() {
    let model = diagonal([2.0, 1.0, 0.0, 0.0]);
    let image = reference();
    let engine = Eigendistortion::at(&model, &image, Config::new(500)).unwrap();

    let solution = engine.synthesize_unobserved().unwrap();

    assert!(solution.rank_deficient);
    assert_relative_eq!(solution.max.eigenvalue, 4.0, epsilon = 1e-6);
    let min = solution.min.unwrap();
    assert!(min.eigenvalue >= 0.0);
    assert!(min.eigenvalue <= 1e-8 * solution.max.eigenvalue);

    // Any unit vector in the null space is a valid answer.
    let null = min.vector.iter().skip(2).map(|x| x * x).sum::<f64>();
    assert_relative_eq!(null, 1.0, epsilon = 1e-6);
}

#[test]
fn same_seed_gives_identical_solutions() {
    let model = diagonal([4.0, 1.0, 0.9, 0.5]);
    let image = reference();
    let config = Config::new(50).with_seed(3);
    let engine = Eigendistortion::at(&model, &image, config).unwrap();

    let first = engine.synthesize_unobserved().unwrap();
    let second = engine.synthesize_unobserved().unwrap();

    assert_eq!(first.max, second.max);
    assert_eq!(first.min, second.min);
    assert_eq!(first.sessions, second.sessions);
}

#[test]
fn resumed_run_matches_uninterrupted_run() {
    // The top phase converges quickly while the bottom phase needs far more
    // than 40 iterations.
    let model = diagonal([4.0, 1.0, 0.9, 0.5]);
    let image = reference();

    let full = Eigendistortion::at(&model, &image, Config::new(80))
        .unwrap()
        .synthesize_unobserved()
        .unwrap();

    let engine = Eigendistortion::at(&model, &image, Config::new(40)).unwrap();
    let partial = engine.synthesize_unobserved().unwrap();
    assert!(partial.max.status.is_converged());
    assert_eq!(partial.min.as_ref().unwrap().status, Status::MaxIters);

    let json = serde_json::to_string(&partial.sessions).unwrap();
    let sessions: Sessions = serde_json::from_str(&json).unwrap();
    let resumed = engine.resume_unobserved(sessions, 40).unwrap();

    assert_eq!(resumed.status, full.status);
    assert_eq!(resumed.max, full.max);
    assert_eq!(resumed.min, full.min);
    assert_eq!(resumed.sessions, full.sessions);
}

#[test]
fn observer_sees_both_phases() {
    let model = diagonal([4.0, 3.0, 2.0, 0.5]);
    let image = reference();
    let engine = Eigendistortion::at(&model, &image, Config::new(500)).unwrap();

    let mut phases = Vec::new();
    let solution = engine
        .synthesize(|event: &Event<'_>| -> Option<Action> {
            assert!(event.estimate >= 0.0);
            assert_eq!(event.change.is_none(), event.iteration == 0);
            phases.push(event.phase);
            None
        })
        .unwrap();

    let top = phases.iter().filter(|&&phase| phase == Phase::Top).count();
    assert_eq!(top, solution.sessions.top.iteration());
    assert_eq!(phases.len() - top, solution.sessions.bottom.unwrap().iteration());
    assert_eq!(phases.last(), Some(&Phase::Bottom));
}

#[test]
fn stopping_in_the_top_phase_skips_the_bottom_phase() {
    let model = diagonal([4.0, 3.0, 2.0, 0.5]);
    let image = reference();
    let engine = Eigendistortion::at(&model, &image, Config::new(500)).unwrap();

    let solution = engine
        .synthesize(|event: &Event<'_>| (event.iteration == 3).then_some(Action::StopEarly))
        .unwrap();

    assert_eq!(solution.status, Status::StoppedByObserver);
    assert_eq!(solution.max.status, Status::StoppedByObserver);
    assert!(solution.min.is_none());
    assert!(solution.sessions.bottom.is_none());
    assert_eq!(solution.sessions.top.iteration(), 3);
}

#[test]
fn unconverged_top_phase_defers_the_bottom_phase() {
    let model = diagonal([4.0, 3.0, 2.0, 0.5]);
    let image = reference();
    let engine = Eigendistortion::at(&model, &image, Config::new(2)).unwrap();

    let partial = engine.synthesize_unobserved().unwrap();

    assert_eq!(partial.status, Status::MaxIters);
    assert_eq!(partial.max.status, Status::MaxIters);
    assert!(partial.min.is_none());
    assert!(!partial.rank_deficient);
    assert!(partial.sessions.bottom.is_none());
    assert_eq!(partial.sessions.top.iteration(), 2);

    let resumed = engine.resume_unobserved(partial.sessions, 500).unwrap();

    assert!(resumed.is_converged());
    assert_relative_eq!(resumed.max.eigenvalue, 16.0, epsilon = 1e-6);
    assert_relative_eq!(resumed.min.unwrap().eigenvalue, 0.25, epsilon = 1e-6);
}

#[test]
fn converged_sessions_resume_unchanged() {
    let model = diagonal([4.0, 3.0, 2.0, 0.5]);
    let image = reference();
    let engine = Eigendistortion::at(&model, &image, Config::new(500)).unwrap();

    let solution = engine.synthesize_unobserved().unwrap();
    let resumed = engine.resume_unobserved(solution.sessions.clone(), 100).unwrap();

    assert_eq!(resumed.sessions, solution.sessions);
    assert_eq!(resumed.max, solution.max);
}

#[test]
fn subspace_larger_than_the_image_is_rejected() {
    let model = diagonal([1.0, 1.0, 1.0, 1.0]);
    let image = reference();
    let config = Config::new(10).with_subspace_dim(5).unwrap();

    let result = Eigendistortion::at(&model, &image, config);

    assert!(matches!(
        result,
        Err(Error::InvalidConfig(ConfigError::SubspaceDim))
    ));
}

#[test]
fn foreign_sessions_are_rejected() {
    let model = diagonal([1.0, 2.0, 3.0, 4.0]);
    let image = reference();
    let engine = Eigendistortion::at(&model, &image, Config::new(10)).unwrap();
    let solution = engine.synthesize_unobserved().unwrap();

    let wide = Eigendistortion::at(
        &model,
        &image,
        Config::new(10).with_subspace_dim(2).unwrap(),
    )
    .unwrap();
    let result = wide.resume_unobserved(solution.sessions, 10);

    assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
}
