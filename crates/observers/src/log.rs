use std::num::NonZeroUsize;

use stimuli_core::Observer;
use tracing::info;

use crate::traits::{HasIteration, HasLoss};

/// An observer that emits an `info` event every n iterations.
///
/// Never stops the run.
#[derive(Debug, Clone, Copy)]
pub struct Log {
    every: NonZeroUsize,
}

impl Log {
    #[must_use]
    pub fn new(every: NonZeroUsize) -> Self {
        Self { every }
    }

    /// Returns true if the event at `iteration` is logged.
    #[must_use]
    pub fn logs(&self, iteration: usize) -> bool {
        iteration % self.every == 0
    }
}

impl<E, A> Observer<E, A> for Log
where
    E: HasIteration + HasLoss,
{
    fn observe(&mut self, event: &E) -> Option<A> {
        if self.logs(event.iteration()) {
            info!(iteration = event.iteration(), loss = event.loss(), "synthesis progress");
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::arr1;
    use stimuli_synth::driver::{Action, Event};

    #[test]
    fn logs_on_multiples_of_n() {
        let log = Log::new(NonZeroUsize::new(5).unwrap());

        let logged: Vec<usize> = (0..12).filter(|&i| log.logs(i)).collect();

        assert_eq!(logged, vec![0, 5, 10]);
    }

    #[test]
    fn never_stops_the_run() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let mut log = Log::new(NonZeroUsize::MIN);
        let iterate = arr1(&[0.0]).into_dyn();

        for iteration in 0..3 {
            let event = Event {
                iteration,
                loss: 0.5,
                gradient_norm: 0.0,
                metrics: &(),
                iterate: &iterate,
            };
            let action: Option<Action> = log.observe(&event);
            assert_eq!(action, None);
        }
    }
}
