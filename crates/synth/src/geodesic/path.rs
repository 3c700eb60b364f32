use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use stimuli_core::Image;

use crate::driver::{ConfigError, SessionRng, non_negative};

/// How the initial path between the endpoints is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PathInit {
    /// Evenly spaced points on the pixel-space line between the endpoints.
    #[default]
    Straight,

    /// The straight line plus Gaussian noise whose variance is
    /// `noise_level · t(1 - t)` at position `t`, vanishing at the endpoints.
    Bridge { noise_level: f64 },
}

impl PathInit {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            Self::Straight => Ok(()),
            Self::Bridge { noise_level } => non_negative(noise_level, ConfigError::NoiseLevel),
        }
    }

    /// Builds the `count` interior points between `start` and `end`.
    pub(crate) fn build(&self, start: &Image, end: &Image, count: usize, rng: &mut SessionRng) -> Vec<Image> {
        #[allow(clippy::cast_precision_loss)]
        let steps = (count + 1) as f64;
        (1..=count)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let t = i as f64 / steps;
                let mut point = start * (1.0 - t) + end * t;
                if let Self::Bridge { noise_level } = *self {
                    let std = (noise_level * t * (1.0 - t)).sqrt();
                    point.mapv_inplace(|x| x + std * rng.sample::<f64, _>(StandardNormal));
                }
                point
            })
            .collect()
    }
}
