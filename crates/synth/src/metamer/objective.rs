use ndarray::ArrayD;
use rand::Rng;
use stimuli_core::{Differentiable, Distance};

use crate::{
    Error,
    driver::{Auxiliary, Criterion, Evaluation, Objective, SessionRng, Status},
    shape,
};

use super::Metamer;

/// Per-iteration metamer metrics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    /// Distance between the iterate's representation and the target, over
    /// every representation element.
    pub distance: f64,
}

impl<M, D> Objective for Metamer<'_, M, D>
where
    M: Differentiable,
    D: Distance,
{
    type Metrics = Metrics;

    fn evaluate(
        &self,
        iterate: &ArrayD<f64>,
        _auxiliary: &Auxiliary,
        rng: &mut SessionRng,
    ) -> Result<Evaluation<Metrics>, Error> {
        let image = shape::to_image(iterate.view(), self.reference.shape())?;
        let representation = self.model.forward(&image).map_err(Error::model)?;
        if representation.shape() != self.target.shape() {
            return Err(Error::shape_mismatch(
                self.target.shape(),
                representation.shape(),
            ));
        }

        let distance = self.distance.distance(&representation, &self.target);
        let fraction = self.config.fraction_removed();
        let (loss, cotangent) = if fraction > 0.0 {
            let keep = ArrayD::from_shape_fn(representation.raw_dim(), |_| {
                if rng.gen_range(0.0..1.0) < fraction { 0.0 } else { 1.0 }
            });
            let kept = &representation * &keep;
            let kept_target = &self.target * &keep;
            let loss = self.distance.distance(&kept, &kept_target);
            (loss, self.distance.gradient(&kept, &kept_target) * &keep)
        } else {
            let gradient = self.distance.gradient(&representation, &self.target);
            (distance, gradient)
        };

        let gradient = self
            .model
            .vjp(&image, &cotangent)
            .map_err(Error::model)?
            .into_dyn();

        Ok(Evaluation {
            loss,
            gradient,
            metrics: Metrics { distance },
        })
    }

    fn project(&self, iterate: &mut ArrayD<f64>) {
        self.config.projection().apply(iterate, self.moments);
    }

    fn assess(&self, evaluation: &Evaluation<Metrics>, plateaued: bool) -> Option<Status> {
        if evaluation.metrics.distance <= self.config.tolerance() {
            Some(Status::Converged(Criterion::Objective))
        } else {
            plateaued.then_some(Status::Plateaued)
        }
    }
}
