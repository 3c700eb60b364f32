//! Geodesic synthesis.
//!
//! # Algorithm
//!
//! A geodesic is the shortest path between two images as measured in a
//! model's representation space. The path is discretized into the two fixed
//! endpoints and `n` free intermediate images `x₁ … xₙ`. Synthesis minimizes
//! the path energy
//!
//! ```text
//! E = Σᵢ D(f(xᵢ), f(xᵢ₊₁)),   i = 0 … n,   x₀ = start, xₙ₊₁ = end
//! ```
//!
//! over the intermediate images only, so the endpoints never move. With the
//! default squared distance, minimizing energy also equalizes the step
//! lengths.
//!
//! A run converges when the energy plateaus and the variance of the step
//! distances is within `speed_tol`. Optionally, every
//! `reparameterize_every` iterations the points are redistributed to equal
//! representation-space arc length.
//!
//! # Observer Events
//!
//! One driver [`Event`] per iteration, carrying [`Metrics`]. The event's
//! iterate holds only the intermediate images.

mod config;
mod objective;
mod path;
mod reparameterize;
mod solution;

#[cfg(test)]
mod tests;

pub use config::Config;
pub use objective::Metrics;
pub use path::PathInit;
pub use solution::Solution;

use ndarray::Array4;
use rand::SeedableRng;
use stimuli_core::{Differentiable, Distance, Image, MeanSquaredError, Observer, Representation};
use tracing::info_span;

use crate::{
    Error,
    driver::{Action, Driver, Event, Session, SessionRng, Status},
    shape,
};

use reparameterize::Reparameterize;

/// Synthesizes geodesics between two images under one model.
#[derive(Debug)]
pub struct Geodesic<'a, M, D = MeanSquaredError> {
    model: &'a M,
    distance: D,
    start: Image,
    end: Image,
    start_rep: Representation,
    end_rep: Representation,
    reparameterize: Option<Reparameterize>,
    config: Config,
}

impl<'a, M, D> Geodesic<'a, M, D>
where
    M: Differentiable,
    D: Distance,
{
    /// Prepares synthesis by computing the endpoints' representations.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid, the endpoints differ in
    /// shape or do not have the model's input shape, or the model fails on
    /// an endpoint.
    pub fn new(model: &'a M, distance: D, start: Image, end: Image, config: Config) -> Result<Self, Error> {
        config.validate()?;
        if start.shape() != end.shape() {
            return Err(Error::shape_mismatch(start.shape(), end.shape()));
        }
        let mismatched = model
            .input_shape()
            .filter(|expected| start.shape() != expected.as_slice());
        if let Some(expected) = mismatched {
            return Err(Error::shape_mismatch(&expected, start.shape()));
        }

        let start_rep = model.forward(&start).map_err(Error::model)?;
        let end_rep = model.forward(&end).map_err(Error::model)?;
        if start_rep.shape() != end_rep.shape() {
            return Err(Error::shape_mismatch(start_rep.shape(), end_rep.shape()));
        }

        Ok(Self {
            model,
            distance,
            start,
            end,
            start_rep,
            end_rep,
            reparameterize: config.reparameterize_every().map(Reparameterize::new),
            config,
        })
    }

    #[must_use]
    pub fn start(&self) -> &Image {
        &self.start
    }

    #[must_use]
    pub fn end(&self) -> &Image {
        &self.end
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Creates the session a run starts from, holding the intermediate images.
    ///
    /// # Errors
    ///
    /// This never fails for endpoints accepted by [`new`](Self::new); the
    /// result type matches the other engines.
    pub fn initialize(&self) -> Result<Session, Error> {
        let seed = self.config.seed();
        let mut rng = SessionRng::seed_from_u64(seed);
        let points = self.config.init().build(
            &self.start,
            &self.end,
            self.config.num_intermediate(),
            &mut rng,
        );
        Ok(Session::with_rng(shape::stack(&points)?, seed, rng))
    }

    /// Returns the energy of the straight pixel-space path with the
    /// configured number of points.
    ///
    /// # Errors
    ///
    /// Returns an error if a model call fails.
    pub fn straight_line_energy(&self) -> Result<f64, Error> {
        let mut rng = SessionRng::seed_from_u64(self.config.seed());
        let points = PathInit::Straight.build(
            &self.start,
            &self.end,
            self.config.num_intermediate(),
            &mut rng,
        );
        let interior = self.representations(&points)?;
        let distances = self.step_distances(&self.with_endpoints(&interior));
        Ok(distances.iter().sum())
    }

    /// Returns a driver, with reparameterization attached when configured,
    /// for step-by-step control of a session.
    #[must_use]
    pub fn driver(&self) -> Driver<'_, Self> {
        let driver = Driver::new(self, self.config.step(), self.config.driver());
        match &self.reparameterize {
            Some(hook) => driver.with_hook(hook),
            None => driver,
        }
    }

    /// Synthesizes a geodesic from a fresh session.
    ///
    /// # Errors
    ///
    /// Returns an error if a model call fails or the energy stays
    /// non-finite beyond the configured patience.
    pub fn synthesize<Obs>(&self, observer: Obs) -> Result<Solution, Error>
    where
        Obs: for<'e> Observer<Event<'e, Metrics>, Action>,
    {
        let _span = info_span!("geodesic", seed = self.config.seed()).entered();
        let session = self.initialize()?;
        let limit = self.config.driver().max_iterations();
        let session = self.driver().run(session, limit, observer)?;
        self.finish(session)
    }

    /// Synthesizes a geodesic without observer support.
    ///
    /// # Errors
    ///
    /// See [`synthesize`](Self::synthesize).
    pub fn synthesize_unobserved(&self) -> Result<Solution, Error> {
        self.synthesize(())
    }

    /// Continues a session for up to `additional` more iterations.
    ///
    /// # Errors
    ///
    /// Returns an error if the session's path does not fit these endpoints,
    /// a model call fails, or the energy stays non-finite beyond the
    /// configured patience.
    pub fn resume<Obs>(&self, session: Session, additional: usize, observer: Obs) -> Result<Solution, Error>
    where
        Obs: for<'e> Observer<Event<'e, Metrics>, Action>,
    {
        shape::unstack(session.iterate(), self.start.shape())?;

        let _span = info_span!("geodesic", seed = session.seed()).entered();
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

    /// Computes the representation of each intermediate image.
    fn representations(&self, images: &[Image]) -> Result<Vec<Representation>, Error> {
        images
            .iter()
            .map(|image| {
                let rep = self.model.forward(image).map_err(Error::model)?;
                if rep.shape() == self.start_rep.shape() {
                    Ok(rep)
                } else {
                    Err(Error::shape_mismatch(self.start_rep.shape(), rep.shape()))
                }
            })
            .collect()
    }

    /// Surrounds interior representations with the endpoints'.
    fn with_endpoints<'r>(&'r self, interior: &'r [Representation]) -> Vec<&'r Representation> {
        std::iter::once(&self.start_rep)
            .chain(interior)
            .chain(std::iter::once(&self.end_rep))
            .collect()
    }

    fn step_distances(&self, reps: &[&Representation]) -> Vec<f64> {
        reps.windows(2)
            .map(|pair| self.distance.distance(pair[0], pair[1]))
            .collect()
    }

    fn finish(&self, session: Session) -> Result<Solution, Error> {
        let (path, step_distances) = match self.measure(&session) {
            Ok(measured) => measured,
            Err(error) => return Err(error.interrupt(session)),
        };

        Ok(Solution {
            status: session.status().unwrap_or(Status::MaxIters),
            path,
            energy: step_distances.iter().sum(),
            step_distances,
            iters: session.iteration(),
            session,
        })
    }

    /// Returns the full path a session reports and its step distances.
    fn measure(&self, session: &Session) -> Result<(Array4<f64>, Vec<f64>), Error> {
        let interior = shape::unstack(session.output(), self.start.shape())?;
        let reps = self.representations(&interior)?;
        let step_distances = self.step_distances(&self.with_endpoints(&reps));

        let mut points = Vec::with_capacity(interior.len() + 2);
        points.push(self.start.clone());
        points.extend(interior);
        points.push(self.end.clone());
        let path = shape::stack_images(&points)?;
        Ok((path, step_distances))
    }
}
