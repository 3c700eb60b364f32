use crate::tensor::{Image, Representation};

/// A perceptual model: maps an image to a representation tensor.
///
/// Models are treated as deterministic pure functions. Engines only read
/// from a model, so a single instance can be shared across concurrent runs.
pub trait Model {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Computes the representation of an image.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot evaluate the image, for example
    /// because its shape is not one the model accepts.
    fn forward(&self, image: &Image) -> Result<Representation, Self::Error>;

    /// Returns the image shape the model requires, if it has one.
    fn input_shape(&self) -> Option<[usize; 3]> {
        None
    }
}

/// A model that can differentiate its forward map.
///
/// Both products are taken at `image`:
///
/// - [`vjp`](Self::vjp) pulls a representation-space cotangent back to image
///   space (`Jᵀ u`), which is what gradient-based synthesis needs.
/// - [`jvp`](Self::jvp) pushes an image-space tangent forward (`J v`), which
///   together with `vjp` gives access to `JᵀJ` without forming it.
pub trait Differentiable: Model {
    /// Returns `Jᵀ cotangent`, with the same shape as `image`.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be differentiated at `image`.
    fn vjp(&self, image: &Image, cotangent: &Representation) -> Result<Image, Self::Error>;

    /// Returns `J tangent`, with the same shape as the representation.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be differentiated at `image`.
    fn jvp(&self, image: &Image, tangent: &Image) -> Result<Representation, Self::Error>;
}

/// Jacobian-vector products of a model fixed at one image.
///
/// This is the capability the eigendistortion engine consumes. Most callers
/// get one from [`Linearized`], but an implementation backed by an explicit
/// Jacobian or an external autodiff engine works just as well.
pub trait JacobianProducts {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the shape of the image the Jacobian is taken at.
    fn image_shape(&self) -> [usize; 3];

    /// Returns `J tangent`.
    ///
    /// # Errors
    ///
    /// Returns an error if the product cannot be computed.
    fn jvp(&self, tangent: &Image) -> Result<Representation, Self::Error>;

    /// Returns `Jᵀ cotangent`.
    ///
    /// # Errors
    ///
    /// Returns an error if the product cannot be computed.
    fn vjp(&self, cotangent: &Representation) -> Result<Image, Self::Error>;
}

/// A [`Differentiable`] model linearized at a fixed image.
#[derive(Debug, Clone, Copy)]
pub struct Linearized<'a, M> {
    model: &'a M,
    image: &'a Image,
}

impl<'a, M: Differentiable> Linearized<'a, M> {
    /// Linearizes `model` at `image`.
    pub fn new(model: &'a M, image: &'a Image) -> Self {
        Self { model, image }
    }

    /// Returns the image the model is linearized at.
    pub fn image(&self) -> &Image {
        self.image
    }

    /// Returns the underlying model.
    pub fn model(&self) -> &M {
        self.model
    }
}

impl<M: Differentiable> JacobianProducts for Linearized<'_, M> {
    type Error = M::Error;

    fn image_shape(&self) -> [usize; 3] {
        let (c, h, w) = self.image.dim();
        [c, h, w]
    }

    fn jvp(&self, tangent: &Image) -> Result<Representation, Self::Error> {
        self.model.jvp(self.image, tangent)
    }

    fn vjp(&self, cotangent: &Representation) -> Result<Image, Self::Error> {
        self.model.vjp(self.image, cotangent)
    }
}
