use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Error;

use super::{ConfigError, Session};

/// Periodic snapshots of a running session, written as JSON.
///
/// Each save replaces the file, so it always holds the latest snapshot.
/// [`Session::load`] reads it back, and resuming from it continues the run
/// exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    every: usize,
    path: PathBuf,
}

impl Checkpoint {
    /// Saves to `path` after every `every`-th completed iteration.
    ///
    /// # Errors
    ///
    /// Returns an error if `every` is zero.
    pub fn new(every: usize, path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let checkpoint = Self {
            every,
            path: path.into(),
        };
        checkpoint.validate()?;
        Ok(checkpoint)
    }

    #[must_use]
    pub fn every(&self) -> usize {
        self.every
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.every == 0 {
            return Err(ConfigError::CheckpointEvery);
        }
        Ok(())
    }

    /// Saves `session` if its iteration count is a multiple of the period.
    ///
    /// The snapshot is written next to the target and then renamed over it,
    /// so an interrupted write never clobbers the previous checkpoint.
    pub(crate) fn save_if_due(&self, session: &Session) -> Result<(), Error> {
        if self.every == 0 || session.iteration() % self.every != 0 {
            return Ok(());
        }

        let partial = self.path.with_extension("partial");
        session.save(&partial)?;
        fs::rename(&partial, &self.path)?;
        debug!(
            iteration = session.iteration(),
            path = %self.path.display(),
            "saved checkpoint"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{env, process};

    use ndarray::array;

    #[test]
    fn zero_period_is_rejected() {
        assert_eq!(
            Checkpoint::new(0, "unused.json"),
            Err(ConfigError::CheckpointEvery)
        );
    }

    #[test]
    fn saves_only_on_multiples_of_the_period() {
        let path = env::temp_dir().join(format!("stimuli-checkpoint-{}.json", process::id()));
        let checkpoint = Checkpoint::new(3, &path).unwrap();
        let mut session = Session::new(array![0.5].into_dyn(), 1);

        session.iteration = 2;
        checkpoint.save_if_due(&session).unwrap();
        assert!(!path.exists());

        session.iteration = 3;
        checkpoint.save_if_due(&session).unwrap();
        let loaded = Session::load(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(loaded, session);
        assert!(!path.with_extension("partial").exists());
    }
}
