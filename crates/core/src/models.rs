//! Reference models with closed-form Jacobians.
//!
//! These are deliberately small. They give the engines problems with known
//! answers: an identity model makes a metamer the reference itself, and a
//! linear model has eigendistortions equal to the right singular vectors of
//! its weight matrix.

use ndarray::{Array1, Array2, Array3, Ix1, Ix3};
use thiserror::Error;

use crate::{
    model::{Differentiable, Model},
    tensor::{Image, Representation},
};

/// Errors returned by the reference models.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("expected shape {expected:?}, found {found:?}")]
    Shape {
        expected: Vec<usize>,
        found: Vec<usize>,
    },
}

impl Error {
    fn shape(expected: &[usize], found: &[usize]) -> Self {
        Self::Shape {
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }
}

fn check_shape(expected: &[usize], found: &[usize]) -> Result<(), Error> {
    if expected == found {
        Ok(())
    } else {
        Err(Error::shape(expected, found))
    }
}

/// Reshapes a representation-space array into an image shaped like `like`.
fn to_image(values: &Representation, like: &Image) -> Result<Image, Error> {
    check_shape(like.shape(), values.shape())?;
    values
        .clone()
        .into_dimensionality::<Ix3>()
        .map_err(|_| Error::shape(like.shape(), values.shape()))
}

/// The identity model: the representation is the image itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Identity;

impl Model for Identity {
    type Error = Error;

    fn forward(&self, image: &Image) -> Result<Representation, Error> {
        Ok(image.clone().into_dyn())
    }
}

impl Differentiable for Identity {
    fn vjp(&self, image: &Image, cotangent: &Representation) -> Result<Image, Error> {
        to_image(cotangent, image)
    }

    fn jvp(&self, image: &Image, tangent: &Image) -> Result<Representation, Error> {
        check_shape(image.shape(), tangent.shape())?;
        Ok(tangent.clone().into_dyn())
    }
}

/// Scales every pixel by a constant gain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gain {
    gain: f64,
}

impl Gain {
    #[must_use]
    pub fn new(gain: f64) -> Self {
        Self { gain }
    }
}

impl Model for Gain {
    type Error = Error;

    fn forward(&self, image: &Image) -> Result<Representation, Error> {
        Ok((image * self.gain).into_dyn())
    }
}

impl Differentiable for Gain {
    fn vjp(&self, image: &Image, cotangent: &Representation) -> Result<Image, Error> {
        Ok(to_image(cotangent, image)? * self.gain)
    }

    fn jvp(&self, image: &Image, tangent: &Image) -> Result<Representation, Error> {
        check_shape(image.shape(), tangent.shape())?;
        Ok((tangent * self.gain).into_dyn())
    }
}

/// A linear map applied to the flattened image: `r = W vec(x)`.
///
/// The representation is one-dimensional with one element per row of `W`.
#[derive(Debug, Clone, PartialEq)]
pub struct Linear {
    weights: Array2<f64>,
    shape: [usize; 3],
}

impl Linear {
    /// Creates a linear model for images of the given shape.
    ///
    /// # Errors
    ///
    /// Returns an error if the number of columns in `weights` differs from
    /// the number of pixels in `shape`.
    pub fn new(weights: Array2<f64>, shape: [usize; 3]) -> Result<Self, Error> {
        let pixels = shape.iter().product::<usize>();
        if weights.ncols() != pixels {
            return Err(Error::shape(&[weights.nrows(), pixels], weights.shape()));
        }
        Ok(Self { weights, shape })
    }

    /// Returns the weight matrix.
    #[must_use]
    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    fn flatten(&self, image: &Image) -> Result<Array1<f64>, Error> {
        check_shape(&self.shape, image.shape())?;
        Ok(image.iter().copied().collect())
    }
}

impl Model for Linear {
    type Error = Error;

    fn forward(&self, image: &Image) -> Result<Representation, Error> {
        let flat = self.flatten(image)?;
        Ok(self.weights.dot(&flat).into_dyn())
    }

    fn input_shape(&self) -> Option<[usize; 3]> {
        Some(self.shape)
    }
}

impl Differentiable for Linear {
    fn vjp(&self, image: &Image, cotangent: &Representation) -> Result<Image, Error> {
        check_shape(&self.shape, image.shape())?;
        let u = cotangent
            .view()
            .into_dimensionality::<Ix1>()
            .map_err(|_| Error::shape(&[self.weights.nrows()], cotangent.shape()))?;
        check_shape(&[self.weights.nrows()], u.shape())?;

        let pulled = self.weights.t().dot(&u);
        let [c, h, w] = self.shape;
        Array3::from_shape_vec((c, h, w), pulled.to_vec())
            .map_err(|_| Error::shape(&self.shape, pulled.shape()))
    }

    fn jvp(&self, image: &Image, tangent: &Image) -> Result<Representation, Error> {
        check_shape(&self.shape, image.shape())?;
        let flat = self.flatten(tangent)?;
        Ok(self.weights.dot(&flat).into_dyn())
    }
}

/// Elementwise saturating nonlinearity: `r = tanh(g x)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tanh {
    gain: f64,
}

impl Tanh {
    #[must_use]
    pub fn new(gain: f64) -> Self {
        Self { gain }
    }

    fn slope(&self, image: &Image) -> Image {
        image.mapv(|x| self.gain * (1.0 - (self.gain * x).tanh().powi(2)))
    }
}

impl Model for Tanh {
    type Error = Error;

    fn forward(&self, image: &Image) -> Result<Representation, Error> {
        Ok(image.mapv(|x| (self.gain * x).tanh()).into_dyn())
    }
}

impl Differentiable for Tanh {
    fn vjp(&self, image: &Image, cotangent: &Representation) -> Result<Image, Error> {
        Ok(to_image(cotangent, image)? * self.slope(image))
    }

    fn jvp(&self, image: &Image, tangent: &Image) -> Result<Representation, Error> {
        check_shape(image.shape(), tangent.shape())?;
        Ok((tangent * &self.slope(image)).into_dyn())
    }
}
