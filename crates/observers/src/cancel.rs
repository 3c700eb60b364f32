use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use stimuli_core::Observer;

use crate::traits::CanStopEarly;

/// A shared flag that asks running engines to stop.
///
/// Clones share the flag, so a token can be handed to another thread (a UI,
/// a signal handler) while the run observes it through [`Cancel`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that every run observing this token stop.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Returns an observer that stops a run once this token is cancelled.
    #[must_use]
    pub fn observer(&self) -> Cancel {
        Cancel::new(self.clone())
    }
}

/// An observer that stops the run at the first event after its token is
/// cancelled.
///
/// The engine finishes the current iteration first, so the run ends with
/// [`Status::StoppedByObserver`] and a valid session.
///
/// [`Status::StoppedByObserver`]: stimuli_synth::driver::Status::StoppedByObserver
#[derive(Debug, Clone)]
pub struct Cancel {
    token: CancelToken,
}

impl Cancel {
    #[must_use]
    pub fn new(token: CancelToken) -> Self {
        Self { token }
    }

    #[must_use]
    pub fn token(&self) -> &CancelToken {
        &self.token
    }
}

impl<E, A: CanStopEarly> Observer<E, A> for Cancel {
    fn observe(&mut self, _event: &E) -> Option<A> {
        self.token.is_cancelled().then(A::stop_early)
    }
}
