//! Metamer synthesis.
//!
//! # Algorithm
//!
//! A metamer is an image whose model representation matches that of a
//! reference image while the pixels may differ. Synthesis starts from noise
//! (or a caller-supplied image) and minimizes
//!
//! ```text
//! loss(x) = D(f(x), f(reference))
//! ```
//!
//! with the configured step procedure, projecting onto the allowed pixel
//! range after every step.
//!
//! The run converges only when the full representation distance drops to
//! the configured tolerance. A loss plateau above the tolerance (a reference
//! outside the projection range, say) stops the run with
//! [`Status::Plateaued`]. With `fraction_removed`
//! set, each iteration drops a random subset of representation elements
//! from the loss and gradient; the convergence test still uses every
//! element.
//!
//! # Observer Events
//!
//! One driver [`Event`] per iteration, carrying [`Metrics`]. Returning
//! [`Action::StopEarly`] ends the run with [`Status::StoppedByObserver`] and
//! reports the lowest-loss image seen.

mod config;
mod objective;
mod projection;
mod solution;


pub use config::Config;
pub use objective::Metrics;
pub use projection::Projection;
pub use solution::Solution;

use ndarray::Array3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use stimuli_core::{
    Differentiable, Distance, Image, MeanSquaredError, Observer, Representation, tensor,
};
use tracing::info_span;

use crate::{
    Error,
    driver::{Action, Driver, Event, Objective, Session, Status},
    shape,
};

/// How to choose the first iterate.
#[derive(Debug, Clone, PartialEq)]
pub enum Init {
    /// Gaussian noise with the reference's mean and standard deviation,
    /// drawn from the seeded generator and then projected.
    Noise,

    /// A caller-supplied image, projected before the first iteration.
    Image(Image),
}

/// Synthesizes metamers of one reference image under one model.
///
/// The engine only borrows the model. Independent runs (different seeds or
/// initializations) may share one `Metamer` across threads when the model
/// and distance are `Sync`.
#[derive(Debug)]
pub struct Metamer<'a, M, D = MeanSquaredError> {
    model: &'a M,
    distance: D,
    reference: Image,
    target: Representation,
    moments: (f64, f64),
    config: Config,
}

impl<'a, M, D> Metamer<'a, M, D>
where
    M: Differentiable,
    D: Distance,
{
    /// Prepares synthesis by computing the reference's representation.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid, the reference does not
    /// have the model's input shape, or the model fails on the reference.
    pub fn new(model: &'a M, reference: Image, distance: D, config: Config) -> Result<Self, Error> {
        config.validate()?;
        let mismatched = model
            .input_shape()
            .filter(|expected| reference.shape() != expected.as_slice());
        if let Some(expected) = mismatched {
            return Err(Error::shape_mismatch(&expected, reference.shape()));
        }

        let target = model.forward(&reference).map_err(Error::model)?;
        let moments = tensor::moments(&reference);

        Ok(Self {
            model,
            distance,
            reference,
            target,
            moments,
            config,
        })
    }

    #[must_use]
    pub fn reference(&self) -> &Image {
        &self.reference
    }

    /// Returns the reference's representation, the synthesis target.
    #[must_use]
    pub fn target(&self) -> &Representation {
        &self.target
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Creates the session a run starts from.
    ///
    /// # Errors
    ///
    /// Returns an error if an initial image does not match the reference's shape.
    pub fn initialize(&self, init: Init) -> Result<Session, Error> {
        let seed = self.config.seed();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let image = match init {
            Init::Noise => {
                let (mean, std) = self.moments;
                Array3::from_shape_simple_fn(self.reference.raw_dim(), || {
                    mean + std * rng.sample::<f64, _>(StandardNormal)
                })
            }
            Init::Image(image) => {
                if image.shape() != self.reference.shape() {
                    return Err(Error::shape_mismatch(self.reference.shape(), image.shape()));
                }
                image
            }
        };

        let mut iterate = image.into_dyn();
        self.project(&mut iterate);
        Ok(Session::with_rng(iterate, seed, rng))
    }

    /// Returns a driver for step-by-step control of a session.
    #[must_use]
    pub fn driver(&self) -> Driver<'_, Self> {
        Driver::new(self, self.config.step(), self.config.driver())
    }

    /// Synthesizes a metamer from a fresh session.
    ///
    /// The observer receives one driver [`Event`] per iteration. See the
    /// [module docs](self) for observer actions.
    ///
    /// # Errors
    ///
    /// Returns an error if initialization or a model call fails, or if the
    /// loss stays non-finite beyond the configured patience.
    pub fn synthesize<Obs>(&self, init: Init, observer: Obs) -> Result<Solution, Error>
    where
        Obs: for<'e> Observer<Event<'e, Metrics>, Action>,
    {
        let _span = info_span!("metamer", seed = self.config.seed()).entered();
        let session = self.initialize(init)?;
        let limit = self.config.driver().max_iterations();
        let session = self.driver().run(session, limit, observer)?;
        self.finish(session)
    }

    /// Synthesizes a metamer without observer support.
    ///
    /// # Errors
    ///
    /// See [`synthesize`](Self::synthesize).
    pub fn synthesize_unobserved(&self, init: Init) -> Result<Solution, Error> {
        self.synthesize(init, ())
    }

    /// Continues a session for up to `additional` more iterations.
    ///
    /// A session whose previous run converged is returned as is.
    ///
    /// # Errors
    ///
    /// Returns an error if the session's iterate does not match the
    /// reference's shape, a model call fails, or the loss stays non-finite
    /// beyond the configured patience.
    pub fn resume<Obs>(&self, session: Session, additional: usize, observer: Obs) -> Result<Solution, Error>
    where
        Obs: for<'e> Observer<Event<'e, Metrics>, Action>,
    {
        if session.iterate().shape() != self.reference.shape() {
            return Err(Error::shape_mismatch(
                self.reference.shape(),
                session.iterate().shape(),
            ));
        }

        let _span = info_span!("metamer", seed = session.seed()).entered();
        let limit = session.iteration().saturating_add(additional);
        let session = self.driver().run(session, limit, observer)?;
        self.finish(session)
    }

    /// Continues a session without observer support.
    ///
    /// # Errors
    ///
    /// See [`resume`](Self::resume).
    pub fn resume_unobserved(&self, session: Session, additional: usize) -> Result<Solution, Error> {
        self.resume(session, additional, ())
    }

    fn finish(&self, session: Session) -> Result<Solution, Error> {
        let (image, distance) = match self.measure(&session) {
            Ok(measured) => measured,
            Err(error) => return Err(error.interrupt(session)),
        };

        Ok(Solution {
            status: session.status().unwrap_or(Status::MaxIters),
            image,
            distance,
            iters: session.iteration(),
            session,
        })
    }

    /// Returns the image a session reports and its full distance from the target.
    fn measure(&self, session: &Session) -> Result<(Image, f64), Error> {
        let image = shape::to_image(session.output().view(), self.reference.shape())?;
        let representation = self.model.forward(&image).map_err(Error::model)?;
        let distance = self.distance.distance(&representation, &self.target);
        Ok((image, distance))
    }
}
