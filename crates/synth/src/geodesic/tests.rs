use approx::assert_relative_eq;
use ndarray::{Axis, array};
use stimuli_core::{
    Image, MeanSquaredError,
    models::{Identity, Tanh},
};

use crate::{
    Error,
    driver::{self, Action, Adam, ConfigError, Criterion, Event, Sgd, Status},
};

use super::*;

fn dark() -> Image {
    array![[[-1.0]]]
}

fn bright() -> Image {
    array![[[1.0]]]
}

#[test]
fn straight_path_is_already_a_geodesic_for_identity() {
    let config = Config::new(driver::Config::new(100), 3).unwrap();
    let geodesic = Geodesic::new(&Identity, MeanSquaredError, array![[[0.0]]], array![[[1.0]]], config)
        .unwrap();

    let solution = geodesic.synthesize_unobserved().unwrap();

    assert_eq!(solution.status, Status::Converged(Criterion::LossPlateau));
    assert_eq!(solution.iters, 10);
    assert_relative_eq!(solution.energy, 0.25, epsilon = 1e-15);
    assert_relative_eq!(geodesic.straight_line_energy().unwrap(), 0.25, epsilon = 1e-15);
    for distance in &solution.step_distances {
        assert_relative_eq!(*distance, 0.0625, epsilon = 1e-15);
    }
}

#[test]
fn saturating_model_bends_the_path() {
    let model = Tanh::new(1.5);
    let config = Config::new(driver::Config::new(500), 5)
        .unwrap()
        .with_step(Sgd::new(0.05).unwrap());
    let geodesic = Geodesic::new(&model, MeanSquaredError, dark(), bright(), config).unwrap();

    let solution = geodesic.synthesize_unobserved().unwrap();

    // Equal steps in representation space: (2 tanh(1.5))² / 6.
    let optimal = (2.0 * 1.5_f64.tanh()).powi(2) / 6.0;
    assert!(solution.energy < geodesic.straight_line_energy().unwrap());
    assert_relative_eq!(solution.energy, optimal, epsilon = 1e-6);

    assert_eq!(solution.path.shape(), &[7, 1, 1, 1]);
    assert_eq!(solution.path.index_axis(Axis(0), 0), dark());
    assert_eq!(solution.path.index_axis(Axis(0), 6), bright());

    // Equal representation steps pull the first point off the saturated start.
    let first = solution.path[[1, 0, 0, 0]];
    assert!(first > -1.0 + 2.0 / 6.0);
}

#[test]
fn reparameterization_equalizes_arc_length() {
    let config = Config::new(driver::Config::new(10), 3).unwrap();
    let geodesic = Geodesic::new(&Identity, MeanSquaredError, array![[[0.0]]], array![[[1.0]]], config)
        .unwrap();
    let iterate = array![[[[0.1]]], [[[0.2]]], [[[0.3]]]].into_dyn();

    let placed = geodesic.reparameterized(&iterate).unwrap();

    let values: Vec<f64> = placed.iter().copied().collect();
    for (value, expected) in values.iter().zip([0.25, 0.5, 0.75]) {
        assert_relative_eq!(*value, expected, epsilon = 1e-12);
    }
}

#[test]
fn zero_length_path_is_left_alone() {
    let config = Config::new(driver::Config::new(10), 2).unwrap();
    let geodesic = Geodesic::new(&Identity, MeanSquaredError, array![[[0.5]]], array![[[0.5]]], config)
        .unwrap();
    let iterate = array![[[[0.5]]], [[[0.5]]]].into_dyn();

    assert_eq!(geodesic.reparameterized(&iterate).unwrap(), iterate);
}

#[test]
fn resumed_run_matches_uninterrupted_run() {
    let model = Tanh::new(2.0);
    let config = Config::new(driver::Config::new(10), 3)
        .unwrap()
        .with_step(Adam::new(0.05).unwrap())
        .with_seed(3)
        .with_init(PathInit::Bridge { noise_level: 0.01 })
        .unwrap()
        .with_reparameterize_every(3)
        .unwrap();
    let geodesic = Geodesic::new(&model, MeanSquaredError, dark(), bright(), config).unwrap();

    let full = geodesic.synthesize_unobserved().unwrap();

    let mut session = geodesic.initialize().unwrap();
    let driver = geodesic.driver();
    for _ in 0..4 {
        driver.step(&mut session).unwrap();
    }
    let resumed = geodesic.resume_unobserved(session, 6).unwrap();

    assert_eq!(full.status, Status::MaxIters);
    assert_eq!(resumed.iters, 10);
    assert_eq!(resumed.path, full.path);
    assert_eq!(resumed.loss_history(), full.loss_history());
    assert_eq!(resumed.session, full.session);
}

#[test]
fn events_carry_only_the_interior_points() {
    let model = Tanh::new(1.0);
    let config = Config::new(driver::Config::new(5), 4).unwrap();
    let geodesic = Geodesic::new(&model, MeanSquaredError, dark(), bright(), config).unwrap();

    let mut energies = Vec::new();
    let solution = geodesic
        .synthesize(|event: &Event<'_, Metrics>| -> Option<Action> {
            assert_eq!(event.iterate.shape(), &[4, 1, 1, 1]);
            assert_eq!(event.metrics.step_distances.len(), 5);
            energies.push(event.metrics.energy);
            None
        })
        .unwrap();

    assert_eq!(energies.len(), 5);
    assert_eq!(energies, solution.loss_history());
}

#[test]
fn mismatched_endpoints_are_rejected() {
    let config = Config::new(driver::Config::new(10), 2).unwrap();
    let result = Geodesic::new(&Identity, MeanSquaredError, array![[[0.0]]], array![[[0.0, 1.0]]], config);

    assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
}

#[test]
fn resume_rejects_a_foreign_session() {
    let config = Config::new(driver::Config::new(10), 2).unwrap();
    let geodesic = Geodesic::new(&Identity, MeanSquaredError, dark(), bright(), config).unwrap();
    let foreign = driver::Session::new(array![[[0.0, 0.0]]].into_dyn(), 0);

    let result = geodesic.resume_unobserved(foreign, 5);

    assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
}

#[test]
fn config_requires_intermediate_points() {
    assert_eq!(
        Config::new(driver::Config::new(10), 0),
        Err(ConfigError::Intermediate)
    );
    assert_eq!(
        Config::new(driver::Config::new(10), 1)
            .unwrap()
            .with_reparameterize_every(0),
        Err(ConfigError::ReparameterizeEvery)
    );
}
