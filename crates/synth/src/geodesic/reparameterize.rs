use ndarray::ArrayD;
use stimuli_core::{Differentiable, Distance, Image, tensor};

use crate::{
    Error,
    driver::{Auxiliary, Hook},
    shape,
};

use super::Geodesic;

/// Moves the interior points to equal arc length along the path.
///
/// Arc length is Euclidean distance in representation space. New points are
/// placed by linear interpolation, in pixel space, between the old points
/// that bracket each target length.
#[derive(Debug)]
pub(crate) struct Reparameterize {
    every: usize,
}

impl Reparameterize {
    pub(crate) fn new(every: usize) -> Self {
        Self { every }
    }
}

impl<M, D> Hook<Geodesic<'_, M, D>> for Reparameterize
where
    M: Differentiable,
    D: Distance,
{
    fn every(&self) -> usize {
        self.every
    }

    fn apply(
        &self,
        geodesic: &Geodesic<'_, M, D>,
        _iteration: usize,
        iterate: &mut ArrayD<f64>,
        _auxiliary: &mut Auxiliary,
    ) -> Result<(), Error> {
        *iterate = geodesic.reparameterized(iterate)?;
        Ok(())
    }
}

impl<M, D> Geodesic<'_, M, D>
where
    M: Differentiable,
    D: Distance,
{
    /// Returns the iterate with its points at equal representation arc length.
    ///
    /// A path of zero or non-finite length is returned unchanged.
    pub(crate) fn reparameterized(&self, iterate: &ArrayD<f64>) -> Result<ArrayD<f64>, Error> {
        let images = shape::unstack(iterate, self.start.shape())?;
        let interior = self.representations(&images)?;
        let reps = self.with_endpoints(&interior);

        let mut cumulative = Vec::with_capacity(reps.len());
        cumulative.push(0.0);
        for pair in reps.windows(2) {
            let length = tensor::norm(&(pair[1] - pair[0]));
            cumulative.push(cumulative[cumulative.len() - 1] + length);
        }
        let total = cumulative[cumulative.len() - 1];
        if !(total.is_finite() && total > 0.0) {
            return Ok(iterate.clone());
        }

        let points: Vec<&Image> = std::iter::once(&self.start)
            .chain(&images)
            .chain(std::iter::once(&self.end))
            .collect();
        let last_segment = points.len() - 2;

        #[allow(clippy::cast_precision_loss)]
        let steps = (points.len() - 1) as f64;
        let mut segment = 0;
        let placed = (1..=images.len())
            .map(|m| {
                #[allow(clippy::cast_precision_loss)]
                let target = total * m as f64 / steps;
                while segment < last_segment && cumulative[segment + 1] < target {
                    segment += 1;
                }
                let length = cumulative[segment + 1] - cumulative[segment];
                let frac = if length > 0.0 {
                    ((target - cumulative[segment]) / length).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                points[segment] * (1.0 - frac) + points[segment + 1] * frac
            })
            .collect::<Vec<_>>();

        shape::stack(&placed)
    }
}
