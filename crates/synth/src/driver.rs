//! The optimization driver shared by every synthesis engine.
//!
//! # Algorithm
//!
//! Each iteration of [`Driver::run`] proceeds in a fixed order:
//!
//! 1. Evaluate the [`Objective`] at the current iterate, drawing any
//!    randomness from a copy of the session generator.
//! 2. If the loss or gradient is non-finite, skip the step. After
//!    `divergence_patience` consecutive skips the run fails with
//!    [`Error::NumericalDivergence`].
//! 3. Ask the objective whether the run stops here, passing the result of
//!    the loss plateau test. Only [`Status::Converged`] means success; a
//!    plateau that misses the engine's target is [`Status::Plateaued`].
//! 4. If the iteration cap is reached, stop with the objective's exhausted
//!    status.
//! 5. Emit an [`Event`] to the observer, which may return
//!    [`Action::StopEarly`].
//! 6. Step, project, and apply any [`Hook`] whose period divides the new
//!    iteration count, then commit the result with the generator and the
//!    loss. A configured [`Checkpoint`] saves the session when due.
//!
//! [`Driver::step`] performs one pass of the same loop, without an observer,
//! and returns an [`Outcome`].
//!
//! Everything that influences the next iteration lives in the [`Session`],
//! so stopping after step 6 and resuming from a serialized session is
//! indistinguishable from never stopping.
//!
//! # Observer Events
//!
//! One [`Event`] per iteration with a finite evaluation that neither
//! converged nor hit the cap. On [`Action::StopEarly`] the run ends with
//! [`Status::StoppedByObserver`] and engines report the best iterate seen.

mod action;
mod checkpoint;
mod config;
mod event;
mod objective;
mod session;
mod status;

pub mod step;


pub use action::Action;
pub use checkpoint::Checkpoint;
pub use config::{Config, ConfigError};
pub use event::Event;
pub use objective::{Evaluation, Hook, Objective};
pub use session::{Auxiliary, Best, Session, SessionRng};
pub use status::{Criterion, Status};
pub use step::{Adam, OptimizerState, Sgd, StateError, StepConfig, StepProcedure};

pub(crate) use config::{non_negative, positive, unit_interval};

use stimuli_core::{Observer, tensor};
use tracing::{debug, info, warn};

use crate::Error;

/// Runs an [`Objective`] under a [`StepProcedure`] and a [`Config`].
///
/// A driver borrows everything it needs and holds no run state of its own,
/// so one driver can advance any number of sessions.
pub struct Driver<'d, O: Objective> {
    objective: &'d O,
    procedure: &'d dyn StepProcedure,
    config: &'d Config,
    hooks: Vec<&'d dyn Hook<O>>,
}

impl<'d, O: Objective> Driver<'d, O> {
    #[must_use]
    pub fn new(objective: &'d O, procedure: &'d dyn StepProcedure, config: &'d Config) -> Self {
        Self {
            objective,
            procedure,
            config,
            hooks: Vec::new(),
        }
    }

    /// Adds a hook applied after the steps of its period.
    #[must_use]
    pub fn with_hook(mut self, hook: &'d dyn Hook<O>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Returns true if the session's most recent run converged.
    #[must_use]
    pub fn is_converged(session: &Session) -> bool {
        session.is_converged()
    }

    /// Performs one iteration under the same stopping rules as [`run`].
    ///
    /// The cap is the config's `max_iterations`. Once a rule fires the
    /// session records its status, and later calls return
    /// [`Outcome::Finished`] without touching it. [`run`] continues a
    /// session that did not converge.
    ///
    /// # Errors
    ///
    /// Returns an error if evaluation or a hook fails, the optimizer state
    /// does not fit the iterate, or the divergence patience is exhausted.
    /// Unless only the checkpoint write failed, a failed call leaves the
    /// iterate, loss history, and optimizer state as they were.
    ///
    /// [`run`]: Self::run
    pub fn step(&self, session: &mut Session) -> Result<Outcome, Error> {
        if let Some(status) = session.status {
            return Ok(Outcome::Finished(status));
        }

        match self.begin(session, self.config.max_iterations())? {
            Pass::Skipped(loss) => Ok(Outcome::Skipped(loss)),
            Pass::Stopped(status) => Ok(Outcome::Finished(status)),
            Pass::Ready(evaluation, rng) => {
                let loss = evaluation.loss;
                self.advance(session, evaluation, rng)?;
                Ok(Outcome::Advanced(loss))
            }
        }
    }

    /// Iterates until convergence, the cap, an observer stop, or an error.
    ///
    /// `limit` is the absolute iteration count at which the run stops, so a
    /// resumed session with `iteration() == n` runs at most `limit - n` more
    /// iterations. A session whose last run converged is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if evaluation or a hook fails, the optimizer state
    /// does not fit the iterate, or the divergence patience is exhausted.
    /// Every error raised after the run starts carries the session as of
    /// the last completed iteration (see [`Error::session`]), so the caller
    /// can inspect, save, or resume it.
    pub fn run<Obs>(&self, mut session: Session, limit: usize, mut observer: Obs) -> Result<Session, Error>
    where
        Obs: for<'e> Observer<Event<'e, O::Metrics>, Action>,
    {
        if session.is_converged() {
            return Ok(session);
        }
        session.status = None;

        loop {
            let (evaluation, rng) = match self.begin(&mut session, limit) {
                Ok(Pass::Ready(evaluation, rng)) => (evaluation, rng),
                Ok(Pass::Skipped(_)) => continue,
                Ok(Pass::Stopped(_)) => return Ok(session),
                Err(error) => return Err(error.interrupt(session)),
            };

            let event = Event {
                iteration: session.iteration,
                loss: evaluation.loss,
                gradient_norm: tensor::norm(&evaluation.gradient),
                metrics: &evaluation.metrics,
                iterate: &session.iterate,
            };
            if let Some(Action::StopEarly) = observer.observe(&event) {
                finish(&mut session, Status::StoppedByObserver);
                return Ok(session);
            }

            if let Err(error) = self.advance(&mut session, evaluation, rng) {
                return Err(error.interrupt(session));
            }
        }
    }

    /// Evaluates the current iterate and applies every stopping rule.
    ///
    /// A stopping rule records its status in the session. The returned
    /// generator is the advanced copy, to be committed with the step.
    fn begin(&self, session: &mut Session, limit: usize) -> Result<Pass<O::Metrics>, Error> {
        let mut rng = session.rng.clone();
        let evaluation = self.evaluate(session, &mut rng)?;

        if !evaluation.is_finite() {
            session.rng = rng;
            self.record_non_finite(session, evaluation.loss);
            if self.diverged(session) {
                return Err(Error::NumericalDivergence {
                    consecutive: session.non_finite_streak,
                    session: Box::new(session.clone()),
                });
            }
            return Ok(Pass::Skipped(evaluation.loss));
        }
        session.non_finite_streak = 0;
        session.track_best(evaluation.loss);

        let plateaued = self.config.is_plateau(&session.loss_history, evaluation.loss);
        if let Some(status) = self.objective.assess(&evaluation, plateaued) {
            finish(session, status);
            return Ok(Pass::Stopped(status));
        }

        if session.iteration >= limit {
            let status = self.objective.exhausted(&evaluation);
            finish(session, status);
            return Ok(Pass::Stopped(status));
        }

        Ok(Pass::Ready(evaluation, rng))
    }

    fn evaluate(&self, session: &Session, rng: &mut SessionRng) -> Result<Evaluation<O::Metrics>, Error> {
        let evaluation = self
            .objective
            .evaluate(&session.iterate, &session.auxiliary, rng)?;
        if evaluation.gradient.shape() != session.iterate.shape() {
            return Err(Error::shape_mismatch(
                session.iterate.shape(),
                evaluation.gradient.shape(),
            ));
        }
        Ok(evaluation)
    }

    fn record_non_finite(&self, session: &mut Session, loss: f64) {
        session.non_finite_streak += 1;
        warn!(
            iteration = session.iteration,
            loss,
            streak = session.non_finite_streak,
            "skipping step after non-finite evaluation"
        );
    }

    fn diverged(&self, session: &Session) -> bool {
        session.non_finite_streak >= self.config.divergence_patience()
    }

    /// Steps, projects, and applies due hooks, then commits the iteration.
    ///
    /// The iteration is committed only if the step and every due hook
    /// succeed. A checkpoint is written after the commit.
    fn advance(
        &self,
        session: &mut Session,
        evaluation: Evaluation<O::Metrics>,
        rng: SessionRng,
    ) -> Result<(), Error> {
        let mut iterate = session.iterate.clone();
        let mut optimizer = session.optimizer.clone();
        self.procedure
            .step(&mut optimizer, &mut iterate, &evaluation.gradient)?;
        self.objective.project(&mut iterate);

        let iteration = session.iteration + 1;
        let mut auxiliary = session.auxiliary.clone();
        for hook in &self.hooks {
            let every = hook.every();
            if every > 0 && iteration % every == 0 {
                hook.apply(self.objective, iteration, &mut iterate, &mut auxiliary)?;
            }
        }

        session.iterate = iterate;
        session.optimizer = optimizer;
        session.auxiliary = auxiliary;
        session.rng = rng;
        session.loss_history.push(evaluation.loss);
        session.iteration = iteration;
        debug!(iteration, loss = evaluation.loss, "completed iteration");

        if let Some(checkpoint) = self.config.checkpoint() {
            checkpoint.save_if_due(session)?;
        }
        Ok(())
    }
}

/// What one evaluation allows the loop to do.
enum Pass<M> {
    /// The evaluation was non-finite and the step is skipped.
    Skipped(f64),
    /// A stopping rule fired.
    Stopped(Status),
    /// The session may step with this evaluation and generator.
    Ready(Evaluation<M>, SessionRng),
}

/// The result of one [`Driver::step`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// The iterate moved. Carries the loss evaluated before the step.
    Advanced(f64),

    /// The evaluation was non-finite and the step was skipped.
    Skipped(f64),

    /// A stopping rule fired, in this call or an earlier one. The session
    /// did not move.
    Finished(Status),
}

fn finish(session: &mut Session, status: Status) {
    info!(iterations = session.iteration, ?status, "run finished");
    session.status = Some(status);
}
