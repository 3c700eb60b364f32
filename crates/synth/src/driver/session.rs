use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use ndarray::ArrayD;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::Error;

use super::{Status, step::OptimizerState};

/// The random number generator carried by a session.
pub type SessionRng = ChaCha8Rng;

/// Scalar state owned by an engine rather than by the step procedure.
///
/// Engines keep scheduled quantities here (a MAD penalty weight, the target
/// distance of a constraint) so that a saved session resumes them exactly.
pub type Auxiliary = BTreeMap<String, f64>;

/// The complete, serializable state of an optimization run.
///
/// Resuming from a session continues the run as if it had never stopped:
/// for a fixed seed, `n` iterations followed by `m` more produce the same
/// iterate and loss history as `n + m` iterations in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub(crate) iterate: ArrayD<f64>,
    pub(crate) iteration: usize,
    pub(crate) loss_history: Vec<f64>,
    pub(crate) optimizer: OptimizerState,
    pub(crate) auxiliary: Auxiliary,
    pub(crate) rng: SessionRng,
    pub(crate) seed: u64,
    pub(crate) status: Option<Status>,
    pub(crate) non_finite_streak: usize,
    pub(crate) best: Option<Best>,
}

/// The lowest-loss iterate seen so far in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Best {
    pub iteration: usize,
    pub loss: f64,
    pub iterate: ArrayD<f64>,
}

impl Session {
    /// Starts a session at `iterate` with a generator seeded from `seed`.
    #[must_use]
    pub fn new(iterate: ArrayD<f64>, seed: u64) -> Self {
        Self::with_rng(iterate, seed, SessionRng::seed_from_u64(seed))
    }

    /// Starts a session whose generator has already been advanced, for
    /// engines that draw their initial iterate from the seeded stream.
    pub(crate) fn with_rng(iterate: ArrayD<f64>, seed: u64, rng: SessionRng) -> Self {
        Self {
            iterate,
            iteration: 0,
            loss_history: Vec::new(),
            optimizer: OptimizerState::default(),
            auxiliary: Auxiliary::new(),
            rng,
            seed,
            status: None,
            non_finite_streak: 0,
            best: None,
        }
    }

    /// Returns the current iterate.
    #[must_use]
    pub fn iterate(&self) -> &ArrayD<f64> {
        &self.iterate
    }

    /// Returns the number of completed iterations.
    #[must_use]
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Returns the loss of every completed iteration, oldest first.
    ///
    /// Entry `i` is the loss evaluated at the iterate that iteration `i`
    /// stepped away from. Non-finite evaluations are never recorded.
    #[must_use]
    pub fn loss_history(&self) -> &[f64] {
        &self.loss_history
    }

    #[must_use]
    pub fn optimizer(&self) -> &OptimizerState {
        &self.optimizer
    }

    #[must_use]
    pub fn auxiliary(&self) -> &Auxiliary {
        &self.auxiliary
    }

    /// Returns the seed the session was started with.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns how the most recent run ended, or `None` before any run.
    #[must_use]
    pub fn status(&self) -> Option<Status> {
        self.status
    }

    /// Returns true if the most recent run met a convergence criterion.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.status.is_some_and(|status| status.is_converged())
    }

    /// Returns the lowest-loss iterate evaluated so far.
    #[must_use]
    pub fn best(&self) -> Option<&Best> {
        self.best.as_ref()
    }

    /// Returns the iterate an engine should report.
    ///
    /// This is the best iterate when an observer stopped the run, and the
    /// current iterate otherwise.
    #[must_use]
    pub fn output(&self) -> &ArrayD<f64> {
        match (self.status, &self.best) {
            (Some(Status::StoppedByObserver), Some(best)) => &best.iterate,
            _ => &self.iterate,
        }
    }

    /// Records `loss` at the current iterate if it beats the best so far.
    pub(crate) fn track_best(&mut self, loss: f64) {
        if self.best.as_ref().is_none_or(|best| loss < best.loss) {
            self.best = Some(Best {
                iteration: self.iteration,
                loss,
                iterate: self.iterate.clone(),
            });
        }
    }

    /// Reads an auxiliary value the engine stored at initialization.
    pub(crate) fn auxiliary_value(
        auxiliary: &Auxiliary,
        key: &'static str,
    ) -> Result<f64, Error> {
        auxiliary
            .get(key)
            .copied()
            .ok_or(Error::MissingAuxiliary(key))
    }

    /// Serializes the session to a JSON string.
    ///
    /// Floats round-trip exactly, so a deserialized session resumes with
    /// bit-identical results.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserializes a session from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid session.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    /// Writes the session to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Reads a session from a JSON file written by [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid session.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::array;
    use rand::Rng;

    use crate::driver::Criterion;

    #[test]
    fn json_round_trip_preserves_everything() {
        let mut session = Session::new(array![[0.1, 0.2], [0.3, 1.0 / 3.0]].into_dyn(), 42);
        session.loss_history = vec![0.7, std::f64::consts::PI];
        session.iteration = 2;
        session.auxiliary.insert("penalty".into(), 0.1 + 0.2);
        session.status = Some(Status::Converged(Criterion::LossPlateau));
        let _: f64 = session.rng.gen_range(0.0..1.0);
        session.track_best(0.5);

        let restored = Session::from_json(&session.to_json().unwrap()).unwrap();
        assert_eq!(restored, session);
    }

    #[test]
    fn restored_generator_continues_the_stream() {
        let mut session = Session::new(array![0.0].into_dyn(), 9);
        let _: u64 = session.rng.gen_range(0..100);
        let mut restored = Session::from_json(&session.to_json().unwrap()).unwrap();

        let expected: Vec<u32> = (0..4).map(|_| session.rng.gen_range(0..1000)).collect();
        let actual: Vec<u32> = (0..4).map(|_| restored.rng.gen_range(0..1000)).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn save_and_load_through_a_file() {
        let session = Session::new(array![0.25, 0.5].into_dyn(), 3);
        let path = std::env::temp_dir().join(format!(
            "stimuli-session-{}-{}.json",
            std::process::id(),
            line!()
        ));

        session.save(&path).unwrap();
        let loaded = Session::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded, session);
    }

    #[test]
    fn best_tracks_the_lowest_loss() {
        let mut session = Session::new(array![1.0].into_dyn(), 0);
        session.track_best(2.0);
        session.iterate[[0]] = 0.5;
        session.iteration = 1;
        session.track_best(3.0);

        let best = session.best().unwrap();
        assert_eq!(best.iteration, 0);
        assert_eq!(best.iterate, array![1.0].into_dyn());
    }

    #[test]
    fn output_is_best_only_when_stopped_by_observer() {
        let mut session = Session::new(array![1.0].into_dyn(), 0);
        session.track_best(1.0);
        session.iterate[[0]] = 2.0;

        session.status = Some(Status::MaxIters);
        assert_eq!(session.output()[[0]], 2.0);

        session.status = Some(Status::StoppedByObserver);
        assert_eq!(session.output()[[0]], 1.0);
    }
}
