//! Capability traits for cross-engine observers.
//!
//! These traits abstract over engine-specific event and action types, so one
//! observer can watch a metamer run, a MAD run, or an eigendistortion phase.
//!
//! # Event traits
//!
//! - [`HasIteration`]: events that know which iteration they belong to
//! - [`HasLoss`]: events that carry a loss value
//! - [`HasIterate`]: events that expose the current iterate
//!
//! # Action traits
//!
//! - [`CanStopEarly`]: actions that can signal early termination
//!
//! # Example
//!
//! ```rust
//! use stimuli_core::Observer;
//! use stimuli_observers::traits::{CanStopEarly, HasLoss};
//!
//! struct GoodEnough {
//!     threshold: f64,
//! }
//!
//! impl<E: HasLoss, A: CanStopEarly> Observer<E, A> for GoodEnough {
//!     fn observe(&mut self, event: &E) -> Option<A> {
//!         (event.loss() < self.threshold).then(A::stop_early)
//!     }
//! }
//! ```

use ndarray::ArrayD;
use stimuli_synth::{driver, eigendistortion};

/// An event that knows which iteration it belongs to.
pub trait HasIteration {
    /// Returns the number of iterations completed before this event.
    fn iteration(&self) -> usize;
}

/// An event that carries a loss value.
pub trait HasLoss {
    fn loss(&self) -> f64;
}

/// An event that exposes the current iterate.
pub trait HasIterate {
    fn iterate(&self) -> &ArrayD<f64>;
}

/// An action type that can signal early termination.
pub trait CanStopEarly {
    /// Returns the action that stops the engine early.
    fn stop_early() -> Self;
}

// --- driver::Event, shared by metamer, MAD, and geodesic runs ---

impl<M> HasIteration for driver::Event<'_, M> {
    fn iteration(&self) -> usize {
        self.iteration
    }
}

impl<M> HasLoss for driver::Event<'_, M> {
    fn loss(&self) -> f64 {
        self.loss
    }
}

impl<M> HasIterate for driver::Event<'_, M> {
    fn iterate(&self) -> &ArrayD<f64> {
        self.iterate
    }
}

// --- eigendistortion::Event ---

impl HasIteration for eigendistortion::Event<'_> {
    fn iteration(&self) -> usize {
        self.iteration
    }
}

impl HasIterate for eigendistortion::Event<'_> {
    fn iterate(&self) -> &ArrayD<f64> {
        self.basis
    }
}

// --- CanStopEarly ---

impl CanStopEarly for driver::Action {
    fn stop_early() -> Self {
        Self::StopEarly
    }
}
