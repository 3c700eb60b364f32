use std::{env, fs, path::PathBuf, process};

use ndarray::Array;
use stimuli_core::{
    Image, MeanSquaredError,
    models::{Identity, Linear, Tanh},
};
use stimuli_synth::{
    driver::{self, Adam, Checkpoint, Session},
    geodesic::{self, Geodesic, PathInit},
    mad::{self, Extremize, Mad},
    metamer::{self, Init, Metamer},
};
use tracing_subscriber::EnvFilter;

fn reference() -> Image {
    Array::from_shape_vec((1, 2, 3), vec![0.15, 0.35, 0.55, 0.75, 0.25, 0.65]).unwrap()
}

/// Routes engine logs to the test harness; `RUST_LOG=debug` shows every iteration.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A session file path unique to this test process.
fn scratch(name: &str) -> PathBuf {
    env::temp_dir().join(format!("stimuli-{}-{name}.json", process::id()))
}

#[test]
fn metamer_resumes_from_a_saved_session() {
    init_tracing();
    let pooling = Linear::new(
        Array::from_shape_vec(
            (2, 6),
            vec![
                0.5, 0.5, 0.0, 0.0, 0.0, 0.0, //
                0.0, 0.0, 0.3, 0.3, 0.2, 0.2,
            ],
        )
        .unwrap(),
        [1, 2, 3],
    )
    .unwrap();
    let config = |cap| {
        metamer::Config::new(driver::Config::new(cap))
            .with_step(Adam::new(0.05).unwrap())
            .with_seed(11)
            .with_fraction_removed(0.25)
            .unwrap()
    };

    let full = Metamer::new(&pooling, reference(), MeanSquaredError, config(30))
        .unwrap()
        .synthesize_unobserved(Init::Noise)
        .unwrap();

    let engine = Metamer::new(&pooling, reference(), MeanSquaredError, config(12)).unwrap();
    let partial = engine.synthesize_unobserved(Init::Noise).unwrap();
    let path = scratch("metamer");
    partial.session.save(&path).unwrap();
    let loaded = Session::load(&path).unwrap();
    fs::remove_file(&path).unwrap();

    assert_eq!(loaded, partial.session);
    let resumed = engine.resume_unobserved(loaded, 18).unwrap();

    assert_eq!(resumed.iters, full.iters);
    assert_eq!(resumed.loss_history(), full.loss_history());
    assert_eq!(resumed.image, full.image);
    assert_eq!(resumed.distance, full.distance);
}

#[test]
fn mad_resumes_from_json() {
    init_tracing();
    let optimized = Tanh::new(3.0);
    let config = |cap| {
        mad::Config::new(driver::Config::new(cap))
            .with_step(Adam::new(0.02).unwrap())
            .with_seed(2)
    };

    let full = Mad::new(&Identity, MeanSquaredError, &optimized, MeanSquaredError, reference(), config(40))
        .unwrap()
        .synthesize_unobserved(Extremize::Max, mad::Init::Noise)
        .unwrap();

    let engine = Mad::new(&Identity, MeanSquaredError, &optimized, MeanSquaredError, reference(), config(25))
        .unwrap();
    let partial = engine
        .synthesize_unobserved(Extremize::Max, mad::Init::Noise)
        .unwrap();
    let json = partial.session.to_json().unwrap();
    let resumed = engine
        .resume_unobserved(Session::from_json(&json).unwrap(), 15)
        .unwrap();

    assert_eq!(resumed.extremize, Extremize::Max);
    assert_eq!(resumed.loss_history(), full.loss_history());
    assert_eq!(resumed.image, full.image);
    assert_eq!(resumed.session, full.session);
}

#[test]
fn mad_resumes_from_a_checkpoint_written_mid_run() {
    init_tracing();
    let optimized = Tanh::new(3.0);
    let path = scratch("mad-checkpoint");
    let config = |driver| {
        mad::Config::new(driver)
            .with_step(Adam::new(0.02).unwrap())
            .with_seed(2)
    };

    let full = Mad::new(
        &Identity,
        MeanSquaredError,
        &optimized,
        MeanSquaredError,
        reference(),
        config(driver::Config::new(40)),
    )
    .unwrap()
    .synthesize_unobserved(Extremize::Max, mad::Init::Noise)
    .unwrap();

    let checkpointed = driver::Config::new(40).with_checkpoint(Checkpoint::new(8, &path).unwrap());
    let engine = Mad::new(
        &Identity,
        MeanSquaredError,
        &optimized,
        MeanSquaredError,
        reference(),
        config(checkpointed),
    )
    .unwrap();
    let solution = engine
        .synthesize_unobserved(Extremize::Max, mad::Init::Noise)
        .unwrap();
    let saved = Session::load(&path).unwrap();
    fs::remove_file(&path).unwrap();

    assert_eq!(solution.session, full.session);
    assert_eq!(saved.iteration() % 8, 0);
    assert!(saved.iteration() <= full.iters);
    assert_eq!(saved.status(), None);

    let remaining = full.iters - saved.iteration();
    let resumed = engine.resume_unobserved(saved, remaining).unwrap();

    assert_eq!(resumed.status, full.status);
    assert_eq!(resumed.image, full.image);
    assert_eq!(resumed.session, full.session);
}

#[test]
fn geodesic_resumes_from_a_saved_session() {
    init_tracing();
    let model = Tanh::new(2.0);
    let start = Array::from_shape_vec((1, 1, 2), vec![-1.0, 0.5]).unwrap();
    let end = Array::from_shape_vec((1, 1, 2), vec![1.0, -0.5]).unwrap();
    let config = |cap| {
        geodesic::Config::new(driver::Config::new(cap), 4)
            .unwrap()
            .with_seed(8)
            .with_init(PathInit::Bridge { noise_level: 0.05 })
            .unwrap()
            .with_reparameterize_every(5)
            .unwrap()
    };

    let full = Geodesic::new(&model, MeanSquaredError, start.clone(), end.clone(), config(20))
        .unwrap()
        .synthesize_unobserved()
        .unwrap();

    let engine = Geodesic::new(&model, MeanSquaredError, start, end, config(7)).unwrap();
    let partial = engine.synthesize_unobserved().unwrap();
    let path = scratch("geodesic");
    partial.session.save(&path).unwrap();
    let loaded = Session::load(&path).unwrap();
    fs::remove_file(&path).unwrap();
    let resumed = engine.resume_unobserved(loaded, 13).unwrap();

    assert_eq!(resumed.path, full.path);
    assert_eq!(resumed.energy, full.energy);
    assert_eq!(resumed.session, full.session);
}

#[test]
fn loading_a_missing_file_fails() {
    let result = Session::load(scratch("missing"));

    assert!(matches!(result, Err(stimuli_synth::Error::Io(_))));
}
