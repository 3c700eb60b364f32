//! Reusable observers for stimulus synthesis runs.
//!
//! This crate provides [`Observer`] implementations and capability traits that
//! work across the synthesis engines in `stimuli-synth`.
//!
//! # Modules
//!
//! - [`traits`]: capability traits for cross-engine observers
//!   ([`HasIteration`], [`HasLoss`], [`HasIterate`], [`CanStopEarly`])
//!
//! # Observers
//!
//! - [`Cancel`] stops a run once its [`CancelToken`] is cancelled, possibly
//!   from another thread.
//! - [`Progress`] keeps every n-th iterate and its loss.
//! - [`Log`] emits a `tracing` event every n iterations.
//!
//! [`Observer`]: stimuli_core::Observer
//! [`HasIteration`]: traits::HasIteration
//! [`HasLoss`]: traits::HasLoss
//! [`HasIterate`]: traits::HasIterate
//! [`CanStopEarly`]: traits::CanStopEarly

pub mod traits;

mod cancel;
mod log;
mod progress;

pub use cancel::{Cancel, CancelToken};
pub use log::Log;
pub use progress::{Progress, Record};
