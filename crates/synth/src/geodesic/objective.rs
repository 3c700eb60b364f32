use ndarray::ArrayD;
use stimuli_core::{Differentiable, Distance};

use crate::{
    Error,
    driver::{Auxiliary, Criterion, Evaluation, Objective, SessionRng, Status},
    shape,
};

use super::Geodesic;

/// Per-iteration geodesic metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    /// Sum of the step distances.
    pub energy: f64,

    /// Representation distance of each step, from the start to the end.
    pub step_distances: Vec<f64>,

    /// Population variance of `step_distances`.
    pub speed_variance: f64,
}

impl Metrics {
    pub(crate) fn new(step_distances: Vec<f64>) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let n = step_distances.len().max(1) as f64;
        let energy: f64 = step_distances.iter().sum();
        let mean = energy / n;
        let speed_variance = step_distances.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;
        Self {
            energy,
            step_distances,
            speed_variance,
        }
    }
}

impl<M, D> Objective for Geodesic<'_, M, D>
where
    M: Differentiable,
    D: Distance,
{
    type Metrics = Metrics;

    fn evaluate(
        &self,
        iterate: &ArrayD<f64>,
        _auxiliary: &Auxiliary,
        _rng: &mut SessionRng,
    ) -> Result<Evaluation<Metrics>, Error> {
        let images = shape::unstack(iterate, self.start.shape())?;
        let interior = self.representations(&images)?;
        let reps = self.with_endpoints(&interior);
        let metrics = Metrics::new(self.step_distances(&reps));

        // Point i appears in steps i - 1 and i.
        let gradients = images
            .iter()
            .enumerate()
            .map(|(offset, image)| {
                let i = offset + 1;
                let cotangent = self.distance.gradient(reps[i], reps[i + 1])
                    + self.distance.gradient_second(reps[i - 1], reps[i]);
                self.model.vjp(image, &cotangent).map_err(Error::model)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Evaluation {
            loss: metrics.energy,
            gradient: shape::stack(&gradients)?,
            metrics,
        })
    }

    fn assess(&self, evaluation: &Evaluation<Metrics>, plateaued: bool) -> Option<Status> {
        let even = evaluation.metrics.speed_variance <= self.config.speed_tol();
        (plateaued && even).then_some(Status::Converged(Criterion::LossPlateau))
    }
}
