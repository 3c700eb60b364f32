use std::error::Error as StdError;

use thiserror::Error;

use crate::driver::{ConfigError, Session, StateError};

/// Errors that can occur while configuring or running a synthesis engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("invalid config: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("model call failed")]
    Model(#[source] Box<dyn StdError + Send + Sync>),

    /// The loss or gradient stayed non-finite for too many evaluations.
    ///
    /// The session is returned as it was before the first non-finite
    /// evaluation of the streak, except for the advanced random state.
    #[error("loss or gradient non-finite for {consecutive} consecutive evaluations")]
    NumericalDivergence {
        consecutive: usize,
        session: Box<Session>,
    },

    /// A run failed after it started.
    ///
    /// The session holds every iteration completed before the failure and
    /// resumes from there.
    #[error("run interrupted at iteration {iteration}")]
    Interrupted {
        iteration: usize,
        #[source]
        source: Box<Error>,
        session: Box<Session>,
    },

    #[error("invalid optimizer state: {0}")]
    OptimizerState(#[from] StateError),

    #[error("session is missing auxiliary value `{0}`")]
    MissingAuxiliary(&'static str),

    #[error("failed to (de)serialize session")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to access session file")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns the partial session carried by a mid-run failure.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::NumericalDivergence { session, .. } | Self::Interrupted { session, .. } => {
                Some(session.as_ref())
            }
            _ => None,
        }
    }

    /// Attaches `session` to an error raised during a run.
    ///
    /// Errors that already carry a session are returned unchanged.
    pub(crate) fn interrupt(self, session: Session) -> Self {
        match self {
            Self::NumericalDivergence { .. } | Self::Interrupted { .. } => self,
            source => Self::Interrupted {
                iteration: session.iteration(),
                source: Box::new(source),
                session: Box::new(session),
            },
        }
    }

    pub(crate) fn model<E: StdError + Send + Sync + 'static>(error: E) -> Self {
        Self::Model(Box::new(error))
    }

    pub(crate) fn shape_mismatch(expected: &[usize], found: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }
}
