use ndarray::array;
use stimuli_core::{MeanSquaredError, models::Identity};
use stimuli_synth::{
    Error,
    driver::{self, Adam, Checkpoint, ConfigError, Sgd},
    eigendistortion, geodesic,
    geodesic::PathInit,
    mad::{self, PenaltySchedule},
    metamer::{self, Metamer, Projection},
};

#[test]
fn metamer_config_from_toml() {
    let config: metamer::Config = toml::from_str(
        r#"
        tolerance = 1e-6
        seed = 42
        fraction_removed = 0.2

        [driver]
        max_iterations = 500
        loss_rel_tol = 1e-7
        loss_window = 20

        [step]
        kind = "sgd"
        learning_rate = 0.5
        momentum = 0.9

        [projection]
        kind = "match_moments"
        min = -1.0
        max = 1.0
        "#,
    )
    .unwrap();

    let expected = metamer::Config::new(
        driver::Config::new(500).with_loss_tolerance(1e-7, 20).unwrap(),
    )
    .with_step(Sgd::new(0.5).unwrap().with_momentum(0.9).unwrap())
    .with_tolerance(1e-6)
    .unwrap()
    .with_projection(Projection::MatchMoments { min: -1.0, max: 1.0 })
    .unwrap()
    .with_seed(42)
    .with_fraction_removed(0.2)
    .unwrap();

    assert_eq!(config, expected);
}

#[test]
fn minimal_tables_use_defaults() {
    let config: metamer::Config = toml::from_str("[driver]\nmax_iterations = 10\n").unwrap();

    assert_eq!(config, metamer::Config::new(driver::Config::new(10)));
    assert_eq!(config.tolerance(), 1e-8);
    assert_eq!(config.projection(), &Projection::Clamp { min: 0.0, max: 1.0 });
}

#[test]
fn mad_config_from_toml() {
    let config: mad::Config = toml::from_str(
        r#"
        seed = 7
        constraint_tol = 1e-3
        noise_level = 0.05
        range = [-1.0, 1.0]

        [driver]
        max_iterations = 1000

        [step]
        kind = "adam"
        learning_rate = 0.005

        [schedule]
        initial = 0.5
        factor = 3.0
        every = 50
        max = 1e5
        "#,
    )
    .unwrap();

    let expected = mad::Config::new(driver::Config::new(1000))
        .with_step(Adam::new(0.005).unwrap())
        .with_seed(7)
        .with_schedule(PenaltySchedule::new(0.5, 3.0, 50, 1e5).unwrap())
        .unwrap()
        .with_constraint_tol(1e-3)
        .unwrap()
        .with_noise_level(0.05)
        .unwrap()
        .with_range(-1.0, 1.0)
        .unwrap();

    assert_eq!(config, expected);
}

#[test]
fn geodesic_config_from_toml() {
    let config: geodesic::Config = toml::from_str(
        r#"
        num_intermediate = 8
        reparameterize_every = 25
        speed_tol = 1e-4

        [driver]
        max_iterations = 2000

        [init]
        kind = "bridge"
        noise_level = 0.01
        "#,
    )
    .unwrap();

    let expected = geodesic::Config::new(driver::Config::new(2000), 8)
        .unwrap()
        .with_init(PathInit::Bridge { noise_level: 0.01 })
        .unwrap()
        .with_reparameterize_every(25)
        .unwrap()
        .with_speed_tol(1e-4)
        .unwrap();

    assert_eq!(config, expected);
}

#[test]
fn eigendistortion_config_from_toml() {
    let config: eigendistortion::Config =
        toml::from_str("max_iterations = 300\nsubspace_dim = 3\nrank_tol = 1e-6\n").unwrap();

    let expected = eigendistortion::Config::new(300)
        .with_subspace_dim(3)
        .unwrap()
        .with_rank_tol(1e-6)
        .unwrap();

    assert_eq!(config, expected);
    assert_eq!(config.tolerance(), 1e-10);
}

#[test]
fn invalid_values_are_rejected_when_the_engine_is_built() {
    let config: metamer::Config = toml::from_str(
        r#"
        [driver]
        max_iterations = 10

        [step]
        kind = "sgd"
        learning_rate = -1.0
        "#,
    )
    .unwrap();

    let result = Metamer::new(&Identity, array![[[0.5]]], MeanSquaredError, config);

    assert!(matches!(
        result,
        Err(Error::InvalidConfig(ConfigError::LearningRate))
    ));
}

#[test]
fn checkpoint_from_toml() {
    let config: mad::Config = toml::from_str(
        r#"
        [driver]
        max_iterations = 5000

        [driver.checkpoint]
        every = 250
        path = "runs/mad.json"
        "#,
    )
    .unwrap();

    let checkpoint = Checkpoint::new(250, "runs/mad.json").unwrap();
    let expected = mad::Config::new(driver::Config::new(5000).with_checkpoint(checkpoint));

    assert_eq!(config, expected);
    assert_eq!(config.driver().checkpoint().map(Checkpoint::every), Some(250));
}
