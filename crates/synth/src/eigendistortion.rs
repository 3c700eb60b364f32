//! Eigendistortion synthesis.
//!
//! # Algorithm
//!
//! For a model linearized at a reference image with Jacobian `J`, the
//! Fisher-style matrix `A = JᵀJ` measures how much the representation
//! changes per unit pixel perturbation. Its top and bottom eigenvectors are
//! the perturbations the model is most and least sensitive to.
//!
//! `A` is never formed. Each phase runs block subspace iteration on an
//! operator built from one JVP and one VJP per candidate:
//!
//! - The top phase iterates on `A`.
//! - The bottom phase iterates on `λ_max·I - A`, whose dominant eigenvector
//!   is the least sensitive direction of `A`.
//!
//! Every iteration applies the operator to the `k` orthonormal candidates,
//! rotates them with Rayleigh-Ritz on the `k × k` projected matrix, and
//! orthonormalizes the products to form the next basis. A phase converges
//! when the top Ritz value changes by at most `tolerance · |estimate|`
//! between iterations, or stops at `max_iterations`.
//!
//! The bottom phase needs an upper bound on the spectrum for its shift, so
//! it only starts once the top phase has converged. A top phase that hits
//! its cap leaves [`Solution::min`] empty; resuming the run finishes the top
//! phase and then runs the bottom one.
//!
//! A bottom eigenvalue at or below `rank_tol · λ_max` is reported through
//! [`Solution::rank_deficient`], not as an error.
//!
//! # Observer Events
//!
//! One [`Event`] per iteration of each phase. Returning [`Action::StopEarly`]
//! ends the current phase, and the run with it.

mod config;
mod event;
mod ritz;
mod solution;

#[cfg(test)]
mod tests;

pub use config::Config;
pub use event::{Event, Phase};
pub use solution::{Direction, Sessions, Solution};

use ndarray::{Array2, Array3};
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use stimuli_core::{Differentiable, Image, JacobianProducts, Linearized, Observer, tensor};
use tracing::{debug, info, info_span, warn};

use crate::{
    Error,
    driver::{Action, ConfigError, Criterion, Session, SessionRng, Status},
    shape,
};

const SHIFT: &str = "shift";

/// Ritz pairs of a phase operator on the current basis.
struct Ritz {
    /// Ritz values, largest first.
    values: Vec<f64>,
    /// Ritz vectors, in the order of `values`.
    vectors: Vec<Image>,
    /// The operator applied to each Ritz vector.
    images: Vec<Image>,
}

impl Ritz {
    fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite()) && self.images.iter().all(tensor::all_finite)
    }
}

/// Finds the most and least sensitive perturbations of a linearized model.
#[derive(Debug)]
pub struct Eigendistortion<J> {
    jacobian: J,
    config: Config,
}

impl<'a, M: Differentiable> Eigendistortion<Linearized<'a, M>> {
    /// Prepares synthesis for `model` linearized at `image`.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn at(model: &'a M, image: &'a Image, config: Config) -> Result<Self, Error> {
        Self::new(Linearized::new(model, image), config)
    }
}

impl<J: JacobianProducts> Eigendistortion<J> {
    /// Prepares synthesis from a source of Jacobian products.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or asks for more candidate
    /// directions than the image has pixels.
    pub fn new(jacobian: J, config: Config) -> Result<Self, Error> {
        config.validate()?;
        let pixels: usize = jacobian.image_shape().iter().product();
        if config.subspace_dim() > pixels {
            return Err(ConfigError::SubspaceDim.into());
        }
        Ok(Self { jacobian, config })
    }

    #[must_use]
    pub fn jacobian(&self) -> &J {
        &self.jacobian
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Computes both extreme directions from fresh sessions.
    ///
    /// # Errors
    ///
    /// Returns an error if a Jacobian product fails or has the wrong shape,
    /// or if an estimate turns non-finite.
    pub fn synthesize<Obs>(&self, mut observer: Obs) -> Result<Solution, Error>
    where
        Obs: for<'e> Observer<Event<'e>, Action>,
    {
        let _span = info_span!("eigendistortion", seed = self.config.seed()).entered();
        let limit = self.config.max_iterations();
        let top = self.start(Phase::Top, 0.0)?;
        let top = self.run_phase(Phase::Top, top, limit, &mut observer)?;
        self.descend(top, None, limit, &mut observer)
    }

    /// Computes both extreme directions without observer support.
    ///
    /// # Errors
    ///
    /// See [`synthesize`](Self::synthesize).
    pub fn synthesize_unobserved(&self) -> Result<Solution, Error> {
        self.synthesize(())
    }

    /// Continues both phases for up to `additional` more iterations each.
    ///
    /// A converged phase is not rerun. If the top phase moves, its new
    /// eigenvalue invalidates the bottom session's shift, and the bottom
    /// phase restarts from a fresh session.
    ///
    /// # Errors
    ///
    /// Returns an error if a session does not fit this Jacobian and
    /// subspace size, a Jacobian product fails, or an estimate turns
    /// non-finite.
    pub fn resume<Obs>(&self, sessions: Sessions, additional: usize, mut observer: Obs) -> Result<Solution, Error>
    where
        Obs: for<'e> Observer<Event<'e>, Action>,
    {
        let Sessions { top, bottom } = sessions;
        self.check(&top)?;
        if let Some(bottom) = &bottom {
            self.check(bottom)?;
        }

        let _span = info_span!("eigendistortion", seed = top.seed()).entered();
        let limit = top.iteration().saturating_add(additional);
        let top = self.run_phase(Phase::Top, top, limit, &mut observer)?;
        self.descend(top, bottom, additional, &mut observer)
    }

    /// Continues both phases without observer support.
    ///
    /// # Errors
    ///
    /// See [`resume`](Self::resume).
    pub fn resume_unobserved(&self, sessions: Sessions, additional: usize) -> Result<Solution, Error> {
        self.resume(sessions, additional, ())
    }

    /// Runs the bottom phase after a finished top phase and assembles the solution.
    fn descend<Obs>(
        &self,
        top: Session,
        bottom: Option<Session>,
        additional: usize,
        observer: &mut Obs,
    ) -> Result<Solution, Error>
    where
        Obs: for<'e> Observer<Event<'e>, Action>,
    {
        let max = self.direction(Phase::Top, &top)?;
        if !max.status.is_converged() {
            if max.status == Status::MaxIters {
                warn!(
                    iterations = top.iteration(),
                    estimate = max.eigenvalue,
                    "top phase did not converge, skipping the bottom phase"
                );
            }
            return Ok(Solution {
                status: max.status,
                max,
                min: None,
                rank_deficient: false,
                sessions: Sessions { top, bottom },
            });
        }

        let shift = max.eigenvalue;
        let bottom = match bottom {
            Some(session) if session.auxiliary().get(SHIFT) == Some(&shift) => session,
            _ => self.start(Phase::Bottom, shift)?,
        };
        let limit = bottom.iteration().saturating_add(additional);
        let bottom = self.run_phase(Phase::Bottom, bottom, limit, observer)?;
        let min = self.direction(Phase::Bottom, &bottom)?;

        let status = if min.status == Status::StoppedByObserver {
            Status::StoppedByObserver
        } else if max.status.is_converged() && min.status.is_converged() {
            Status::Converged(Criterion::Objective)
        } else {
            Status::MaxIters
        };
        let rank_deficient = min.eigenvalue <= self.config.rank_tol() * max.eigenvalue;
        if rank_deficient {
            info!(
                max = max.eigenvalue,
                min = min.eigenvalue,
                "Jacobian is rank deficient at the reference"
            );
        }

        Ok(Solution {
            status,
            max,
            min: Some(min),
            rank_deficient,
            sessions: Sessions {
                top,
                bottom: Some(bottom),
            },
        })
    }

    /// Creates a phase session with a random orthonormal basis.
    ///
    /// The phases draw from separate streams of the seeded generator.
    fn start(&self, phase: Phase, shift: f64) -> Result<Session, Error> {
        let seed = self.config.seed();
        let mut rng = SessionRng::seed_from_u64(seed);
        if phase == Phase::Bottom {
            rng.set_stream(1);
        }

        let [c, h, w] = self.jacobian.image_shape();
        let draws = (0..self.config.subspace_dim())
            .map(|_| Array3::from_shape_simple_fn((c, h, w), || rng.sample::<f64, _>(StandardNormal)))
            .collect();
        let basis = ritz::orthonormalize(draws, &mut rng);

        let mut session = Session::with_rng(shape::stack(&basis)?, seed, rng);
        if phase == Phase::Bottom {
            session.auxiliary.insert(SHIFT.to_owned(), shift);
        }
        Ok(session)
    }

    fn run_phase<Obs>(
        &self,
        phase: Phase,
        mut session: Session,
        limit: usize,
        observer: &mut Obs,
    ) -> Result<Session, Error>
    where
        Obs: for<'e> Observer<Event<'e>, Action>,
    {
        if session.is_converged() {
            return Ok(session);
        }
        session.status = None;

        match self.iterate_phase(phase, &mut session, limit, observer) {
            Ok(status) => Ok(finish(phase, session, status)),
            Err(error) => Err(error.interrupt(session)),
        }
    }

    /// Iterates a phase until it stops, returning how it ended.
    ///
    /// The session only changes at the end of a completed iteration.
    fn iterate_phase<Obs>(
        &self,
        phase: Phase,
        session: &mut Session,
        limit: usize,
        observer: &mut Obs,
    ) -> Result<Status, Error>
    where
        Obs: for<'e> Observer<Event<'e>, Action>,
    {
        let shift = shift(phase, session)?;

        loop {
            let basis = shape::unstack(&session.iterate, &self.jacobian.image_shape())?;
            let ritz = self.rayleigh_ritz(&basis, shift)?;
            let theta = ritz.values[0];

            if !ritz.is_finite() {
                warn!(?phase, iteration = session.iteration, "non-finite Rayleigh quotient");
                return Err(Error::NumericalDivergence {
                    consecutive: 1,
                    session: Box::new(session.clone()),
                });
            }

            let change = session.loss_history.last().map(|previous| (theta - previous).abs());
            if change.is_some_and(|change| change <= self.config.tolerance() * theta.abs()) {
                return Ok(Status::Converged(Criterion::Objective));
            }

            if session.iteration >= limit {
                return Ok(Status::MaxIters);
            }

            let estimate = eigenvalue(theta, shift);
            let event = Event {
                phase,
                iteration: session.iteration,
                estimate,
                change,
                basis: &session.iterate,
            };
            if let Some(Action::StopEarly) = observer.observe(&event) {
                return Ok(Status::StoppedByObserver);
            }

            let mut rng = session.rng.clone();
            let next = ritz::orthonormalize(ritz.images, &mut rng);
            session.iterate = shape::stack(&next)?;
            session.rng = rng;
            session.loss_history.push(theta);
            session.iteration += 1;
            debug!(?phase, iteration = session.iteration, estimate, "completed iteration");
        }
    }

    /// Applies the phase operator to one candidate.
    fn apply(&self, vector: &Image, shift: Option<f64>) -> Result<Image, Error> {
        let forward = self.jacobian.jvp(vector).map_err(Error::model)?;
        let product = self.jacobian.vjp(&forward).map_err(Error::model)?;
        if product.shape() != vector.shape() {
            return Err(Error::shape_mismatch(vector.shape(), product.shape()));
        }
        Ok(match shift {
            None => product,
            Some(shift) => vector * shift - product,
        })
    }

    fn rayleigh_ritz(&self, basis: &[Image], shift: Option<f64>) -> Result<Ritz, Error> {
        let images = basis
            .iter()
            .map(|vector| self.apply(vector, shift))
            .collect::<Result<Vec<_>, _>>()?;

        let k = basis.len();
        let projected = Array2::from_shape_fn((k, k), |(i, j)| {
            0.5 * (tensor::dot(&basis[i], &images[j]) + tensor::dot(&basis[j], &images[i]))
        });
        let (values, rotation) = ritz::symmetric_eigen(&projected);

        let rotate = |set: &[Image]| -> Vec<Image> {
            (0..k)
                .map(|col| {
                    let mut out = Image::zeros(set[0].raw_dim());
                    for (row, item) in set.iter().enumerate() {
                        out.scaled_add(rotation[[row, col]], item);
                    }
                    out
                })
                .collect()
        };

        Ok(Ritz {
            vectors: rotate(basis),
            images: rotate(&images),
            values,
        })
    }

    /// Extracts the leading Ritz pair of a finished phase.
    fn direction(&self, phase: Phase, session: &Session) -> Result<Direction, Error> {
        let shift = shift(phase, session)?;
        let basis = shape::unstack(session.output(), &self.jacobian.image_shape())?;
        let Ritz {
            values,
            mut vectors,
            ..
        } = self.rayleigh_ritz(&basis, shift)?;

        let mut vector = vectors.swap_remove(0);
        let norm = tensor::norm(&vector);
        if norm > 0.0 {
            vector.mapv_inplace(|x| x / norm);
        }

        Ok(Direction {
            vector,
            eigenvalue: eigenvalue(values[0], shift),
            status: session.status().unwrap_or(Status::MaxIters),
        })
    }

    fn check(&self, session: &Session) -> Result<(), Error> {
        let [c, h, w] = self.jacobian.image_shape();
        let expected = [self.config.subspace_dim(), c, h, w];
        if session.iterate().shape() != expected.as_slice() {
            return Err(Error::shape_mismatch(&expected, session.iterate().shape()));
        }
        Ok(())
    }
}

/// Reads the shift of a bottom-phase session.
fn shift(phase: Phase, session: &Session) -> Result<Option<f64>, Error> {
    match phase {
        Phase::Top => Ok(None),
        Phase::Bottom => Session::auxiliary_value(session.auxiliary(), SHIFT).map(Some),
    }
}

/// Maps a Ritz value of a phase operator to an eigenvalue of `JᵀJ`.
fn eigenvalue(theta: f64, shift: Option<f64>) -> f64 {
    match shift {
        None => theta.max(0.0),
        Some(shift) => (shift - theta).clamp(0.0, shift.max(0.0)),
    }
}

fn finish(phase: Phase, mut session: Session, status: Status) -> Session {
    info!(?phase, iterations = session.iteration, ?status, "phase finished");
    session.status = Some(status);
    session
}
