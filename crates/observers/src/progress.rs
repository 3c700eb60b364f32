use std::num::NonZeroUsize;

use ndarray::ArrayD;
use stimuli_core::Observer;

use crate::traits::{HasIterate, HasIteration, HasLoss};

/// A stored snapshot of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub iteration: usize,
    pub loss: f64,
    pub iterate: ArrayD<f64>,
}

/// An observer that keeps the iterate and loss of every n-th iteration.
///
/// Pass `&mut Progress` to an engine to read the records after the run
/// completes.
///
/// # Example
///
/// ```ignore
/// let mut progress = Progress::new(NonZeroUsize::new(10).unwrap());
/// let solution = metamer.synthesize(Init::Noise, &mut progress)?;
/// for record in progress.records() {
///     println!("{}: {}", record.iteration, record.loss);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Progress {
    every: NonZeroUsize,
    records: Vec<Record>,
}

impl Progress {
    /// Creates an observer that stores iterations `0, every, 2·every, …`.
    #[must_use]
    pub fn new(every: NonZeroUsize) -> Self {
        Self {
            every,
            records: Vec::new(),
        }
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    fn record<E>(&mut self, event: &E)
    where
        E: HasIteration + HasLoss + HasIterate,
    {
        if event.iteration() % self.every == 0 {
            self.records.push(Record {
                iteration: event.iteration(),
                loss: event.loss(),
                iterate: event.iterate().clone(),
            });
        }
    }
}

impl<E, A> Observer<E, A> for Progress
where
    E: HasIteration + HasLoss + HasIterate,
{
    fn observe(&mut self, event: &E) -> Option<A> {
        self.record(event);
        None
    }
}

/// Allows `&mut Progress` to be passed to engines that take an observer by
/// value.
impl<E, A> Observer<E, A> for &mut Progress
where
    E: HasIteration + HasLoss + HasIterate,
{
    fn observe(&mut self, event: &E) -> Option<A> {
        self.record(event);
        None
    }
}
