//! Perceptual stimulus synthesis.
//!
//! Every engine in this crate phrases its task as an iterative optimization
//! over images and runs it through the shared [`driver`]:
//!
//! - [`metamer`]: images whose representation matches a reference
//! - [`eigendistortion`]: the most and least noticeable image perturbations
//! - [`mad`]: maximal differentiation between two models
//! - [`geodesic`]: shortest paths between two images in representation space
//!
//! Runs are deterministic given a seed, and a [`driver::Session`] captures
//! everything needed to continue a run later with bit-identical results.

pub mod driver;
pub mod eigendistortion;
pub mod geodesic;
pub mod mad;
pub mod metamer;

mod error;
mod shape;

pub use error::Error;
