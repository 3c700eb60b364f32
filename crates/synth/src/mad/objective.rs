use ndarray::ArrayD;
use stimuli_core::{Differentiable, Distance};

use crate::{
    Error,
    driver::{Auxiliary, Criterion, Evaluation, Objective, Session, SessionRng, Status},
    shape,
};

use super::{Mad, PENALTY, SIGN, TARGET_DISTANCE};

/// Per-iteration MAD metrics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    /// Distance from the reference under the fixed model.
    pub fixed_distance: f64,

    /// Distance from the reference under the optimized model.
    pub optimized_distance: f64,

    /// `fixed_distance` minus its target; zero when the constraint holds.
    pub residual: f64,

    /// Current penalty weight on the squared residual.
    pub penalty: f64,
}

impl<A, B, DA, DB> Objective for Mad<'_, A, B, DA, DB>
where
    A: Differentiable,
    B: Differentiable,
    DA: Distance,
    DB: Distance,
{
    type Metrics = Metrics;

    fn evaluate(
        &self,
        iterate: &ArrayD<f64>,
        auxiliary: &Auxiliary,
        _rng: &mut SessionRng,
    ) -> Result<Evaluation<Metrics>, Error> {
        let sign = Session::auxiliary_value(auxiliary, SIGN)?;
        let penalty = Session::auxiliary_value(auxiliary, PENALTY)?;
        let target = Session::auxiliary_value(auxiliary, TARGET_DISTANCE)?;

        let image = shape::to_image(iterate.view(), self.reference.shape())?;
        let (fixed_rep, optimized_rep) = self.representations(&image)?;

        let fixed_distance = self.fixed_distance.distance(&fixed_rep, &self.fixed_target);
        let optimized_distance = self
            .optimized_distance
            .distance(&optimized_rep, &self.optimized_target);
        let residual = fixed_distance - target;
        let loss = sign * optimized_distance + penalty * residual * residual;

        let optimized_cotangent = self
            .optimized_distance
            .gradient(&optimized_rep, &self.optimized_target)
            * sign;
        let fixed_cotangent = self.fixed_distance.gradient(&fixed_rep, &self.fixed_target)
            * (2.0 * penalty * residual);

        let gradient = self
            .optimized
            .vjp(&image, &optimized_cotangent)
            .map_err(Error::model)?
            + self
                .fixed
                .vjp(&image, &fixed_cotangent)
                .map_err(Error::model)?;

        Ok(Evaluation {
            loss,
            gradient: gradient.into_dyn(),
            metrics: Metrics {
                fixed_distance,
                optimized_distance,
                residual,
                penalty,
            },
        })
    }

    fn project(&self, iterate: &mut ArrayD<f64>) {
        let (min, max) = self.config.range();
        iterate.mapv_inplace(|x| x.clamp(min, max));
    }

    fn assess(&self, evaluation: &Evaluation<Metrics>, plateaued: bool) -> Option<Status> {
        let satisfied = evaluation.metrics.residual.abs() <= self.config.constraint_tol();
        (plateaued && satisfied).then_some(Status::Converged(Criterion::LossPlateau))
    }

    fn exhausted(&self, evaluation: &Evaluation<Metrics>) -> Status {
        if evaluation.metrics.residual.abs() <= self.config.constraint_tol() {
            Status::MaxIters
        } else {
            Status::ConstraintUnsatisfied
        }
    }
}
