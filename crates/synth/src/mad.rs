//! Maximal differentiation (MAD) competition.
//!
//! # Algorithm
//!
//! MAD competition compares two models, `A` (fixed) and `B` (optimized), on
//! one reference image. Starting from a seed image `x₀` (the reference plus
//! noise by default), a run holds `A`'s distance from the reference at its
//! initial value `d₀ = D_A(A(x₀), A(reference))` while it minimizes or
//! maximizes `B`'s distance:
//!
//! ```text
//! loss(x) = s · D_B(B(x), B(reference)) + λ · (D_A(A(x), A(reference)) - d₀)²
//! ```
//!
//! with `s = +1` to minimize and `s = -1` to maximize. The penalty weight `λ`
//! grows on the configured [`PenaltySchedule`], which runs as a driver hook
//! and keeps `λ` in the session so resumed runs continue the schedule.
//!
//! A run converges when the loss plateaus with the constraint residual
//! inside `constraint_tol`. Reaching the cap with the residual outside it
//! ends with [`Status::ConstraintUnsatisfied`].
//!
//! A full competition is four runs: each model fixed in turn, each
//! direction. Runs are independent, so callers may execute them in
//! parallel; the engine itself only provides the single run.
//!
//! # Observer Events
//!
//! One driver [`Event`] per iteration, carrying [`Metrics`].

mod config;
mod objective;
mod schedule;
mod solution;


pub use config::Config;
pub use objective::Metrics;
pub use schedule::PenaltySchedule;
pub use solution::Solution;

use ndarray::Array3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use stimuli_core::{Differentiable, Distance, Image, MeanSquaredError, Observer, Representation};
use tracing::info_span;

use crate::{
    Error,
    driver::{Action, Driver, Event, Objective, Session, Status},
    shape,
};

pub(crate) const SIGN: &str = "sign";
pub(crate) const PENALTY: &str = "penalty";
pub(crate) const TARGET_DISTANCE: &str = "target_distance";

/// Which way to push the optimized model's distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extremize {
    Min,
    Max,
}

impl Extremize {
    /// Returns the loss sign: `+1` to minimize, `-1` to maximize.
    #[must_use]
    pub fn sign(self) -> f64 {
        match self {
            Self::Min => 1.0,
            Self::Max => -1.0,
        }
    }

    fn from_sign(sign: f64) -> Self {
        if sign < 0.0 { Self::Max } else { Self::Min }
    }
}

/// How to choose the seed image.
#[derive(Debug, Clone, PartialEq)]
pub enum Init {
    /// The reference plus Gaussian noise of variance `noise_level`, clamped
    /// into the pixel range.
    Noise,

    /// A caller-supplied image, clamped into the pixel range.
    Image(Image),
}

/// Runs MAD competition between a fixed and an optimized model.
#[derive(Debug)]
pub struct Mad<'a, A, B, DA = MeanSquaredError, DB = MeanSquaredError> {
    fixed: &'a A,
    fixed_distance: DA,
    optimized: &'a B,
    optimized_distance: DB,
    reference: Image,
    fixed_target: Representation,
    optimized_target: Representation,
    config: Config,
}

impl<'a, A, B, DA, DB> Mad<'a, A, B, DA, DB>
where
    A: Differentiable,
    B: Differentiable,
    DA: Distance,
    DB: Distance,
{
    /// Prepares a competition by computing both models' reference representations.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid, the reference does not
    /// have a model's input shape, or a model fails on the reference.
    pub fn new(
        fixed: &'a A,
        fixed_distance: DA,
        optimized: &'a B,
        optimized_distance: DB,
        reference: Image,
        config: Config,
    ) -> Result<Self, Error> {
        config.validate()?;
        for expected in [fixed.input_shape(), optimized.input_shape()].into_iter().flatten() {
            if reference.shape() != expected.as_slice() {
                return Err(Error::shape_mismatch(&expected, reference.shape()));
            }
        }

        let fixed_target = fixed.forward(&reference).map_err(Error::model)?;
        let optimized_target = optimized.forward(&reference).map_err(Error::model)?;

        Ok(Self {
            fixed,
            fixed_distance,
            optimized,
            optimized_distance,
            reference,
            fixed_target,
            optimized_target,
            config,
        })
    }

    #[must_use]
    pub fn reference(&self) -> &Image {
        &self.reference
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Creates the session a run starts from.
    ///
    /// The fixed model's distance at the seed image becomes the constraint
    /// target, stored in the session with the direction and the initial
    /// penalty weight.
    ///
    /// # Errors
    ///
    /// Returns an error if an initial image does not match the reference's
    /// shape or a model call fails.
    pub fn initialize(&self, extremize: Extremize, init: Init) -> Result<Session, Error> {
        let seed = self.config.seed();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let image = match init {
            Init::Noise => {
                let std = self.config.noise_level().sqrt();
                let noise = Array3::from_shape_simple_fn(self.reference.raw_dim(), || {
                    std * rng.sample::<f64, _>(StandardNormal)
                });
                &self.reference + &noise
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

        let seed_image = shape::to_image(iterate.view(), self.reference.shape())?;
        let (fixed_rep, _) = self.representations(&seed_image)?;
        let target_distance = self.fixed_distance.distance(&fixed_rep, &self.fixed_target);

        let mut session = Session::with_rng(iterate, seed, rng);
        session.auxiliary.insert(SIGN.to_owned(), extremize.sign());
        session
            .auxiliary
            .insert(PENALTY.to_owned(), self.config.schedule().initial());
        session
            .auxiliary
            .insert(TARGET_DISTANCE.to_owned(), target_distance);
        Ok(session)
    }

    /// Returns a driver, with the penalty schedule attached, for
    /// step-by-step control of a session.
    #[must_use]
    pub fn driver(&self) -> Driver<'_, Self> {
        Driver::new(self, self.config.step(), self.config.driver()).with_hook(self.config.schedule())
    }

    /// Runs one MAD synthesis from a fresh session.
    ///
    /// # Errors
    ///
    /// Returns an error if initialization or a model call fails, or if the
    /// loss stays non-finite beyond the configured patience.
    pub fn synthesize<Obs>(&self, extremize: Extremize, init: Init, observer: Obs) -> Result<Solution, Error>
    where
        Obs: for<'e> Observer<Event<'e, Metrics>, Action>,
    {
        let _span = info_span!("mad", ?extremize, seed = self.config.seed()).entered();
        let session = self.initialize(extremize, init)?;
        let limit = self.config.driver().max_iterations();
        let session = self.driver().run(session, limit, observer)?;
        self.finish(session)
    }

    /// Runs one MAD synthesis without observer support.
    ///
    /// # Errors
    ///
    /// See [`synthesize`](Self::synthesize).
    pub fn synthesize_unobserved(&self, extremize: Extremize, init: Init) -> Result<Solution, Error> {
        self.synthesize(extremize, init, ())
    }

    /// Continues a session for up to `additional` more iterations.
    ///
    /// The direction, penalty weight, and constraint target come from the
    /// session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session does not belong to this competition's
    /// reference, a model call fails, or the loss stays non-finite beyond
    /// the configured patience.
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

        let _span = info_span!("mad", seed = session.seed()).entered();
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

    /// Computes the fixed and optimized representations of an image.
    fn representations(&self, image: &Image) -> Result<(Representation, Representation), Error> {
        let fixed = self.fixed.forward(image).map_err(Error::model)?;
        if fixed.shape() != self.fixed_target.shape() {
            return Err(Error::shape_mismatch(self.fixed_target.shape(), fixed.shape()));
        }
        let optimized = self.optimized.forward(image).map_err(Error::model)?;
        if optimized.shape() != self.optimized_target.shape() {
            return Err(Error::shape_mismatch(
                self.optimized_target.shape(),
                optimized.shape(),
            ));
        }
        Ok((fixed, optimized))
    }

    fn finish(&self, session: Session) -> Result<Solution, Error> {
        let (image, fixed_rep, optimized_rep) = match self.measure(&session) {
            Ok(measured) => measured,
            Err(error) => return Err(error.interrupt(session)),
        };
        let auxiliary = session.auxiliary();
        let sign = Session::auxiliary_value(auxiliary, SIGN)?;
        let target_distance = Session::auxiliary_value(auxiliary, TARGET_DISTANCE)?;

        Ok(Solution {
            status: session.status().unwrap_or(Status::MaxIters),
            extremize: Extremize::from_sign(sign),
            fixed_distance: self.fixed_distance.distance(&fixed_rep, &self.fixed_target),
            optimized_distance: self
                .optimized_distance
                .distance(&optimized_rep, &self.optimized_target),
            target_distance,
            image,
            iters: session.iteration(),
            session,
        })
    }

    /// Returns the image a session reports and its representations.
    fn measure(&self, session: &Session) -> Result<(Image, Representation, Representation), Error> {
        let image = shape::to_image(session.output().view(), self.reference.shape())?;
        let (fixed, optimized) = self.representations(&image)?;
        Ok((image, fixed, optimized))
    }
}
