//! Core traits and types for perceptual stimulus synthesis.
//!
//! This crate defines the shared abstractions that the synthesis engines and
//! observers build on:
//!
//! - [`Model`]: maps an image to a representation tensor
//! - [`Differentiable`]: a model that also provides Jacobian products
//! - [`JacobianProducts`]: a model linearized at a fixed image
//! - [`Distance`]: a differentiable dissimilarity between representations
//! - [`Observer`]: receives engine events and optionally returns control actions
//!
//! The [`models`] module provides small reference models with closed-form
//! Jacobians, useful for tests and for checking engines against known answers.

mod distance;
mod model;
mod observer;

pub mod models;
pub mod tensor;

pub use distance::{Distance, Euclidean, MeanSquaredError};
pub use model::{Differentiable, JacobianProducts, Linearized, Model};
pub use observer::Observer;
pub use tensor::{Image, Representation};
