use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use stimuli_core::tensor;

use crate::driver::ConfigError;

/// Maps a stepped image back onto the allowed pixel range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Projection {
    /// Clamps every pixel into `[min, max]`.
    Clamp { min: f64, max: f64 },

    /// Linearly rescales the whole image onto `[min, max]` when any pixel
    /// falls outside it.
    Remap { min: f64, max: f64 },

    /// Shifts and scales the image to the reference's mean and standard
    /// deviation, then clamps into `[min, max]`.
    MatchMoments { min: f64, max: f64 },
}

impl Default for Projection {
    fn default() -> Self {
        Self::Clamp { min: 0.0, max: 1.0 }
    }
}

impl Projection {
    /// Returns the `(min, max)` range this projection enforces.
    #[must_use]
    pub fn range(&self) -> (f64, f64) {
        match *self {
            Self::Clamp { min, max } | Self::Remap { min, max } | Self::MatchMoments { min, max } => {
                (min, max)
            }
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let (min, max) = self.range();
        if min.is_finite() && max.is_finite() && min < max {
            Ok(())
        } else {
            Err(ConfigError::Range)
        }
    }

    /// Applies the projection in place.
    ///
    /// `reference` holds the mean and standard deviation that
    /// [`MatchMoments`](Self::MatchMoments) targets.
    pub fn apply(&self, image: &mut ArrayD<f64>, reference: (f64, f64)) {
        let (min, max) = self.range();
        match self {
            Self::Clamp { .. } => {}
            Self::Remap { .. } => {
                let low = image.iter().copied().fold(f64::INFINITY, f64::min);
                let high = image.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                if (low < min || high > max) && high > low {
                    let scale = (max - min) / (high - low);
                    image.mapv_inplace(|x| min + (x - low) * scale);
                }
            }
            Self::MatchMoments { .. } => {
                let (mean, std) = tensor::moments(image);
                let (target_mean, target_std) = reference;
                if std > 0.0 {
                    image.mapv_inplace(|x| (x - mean) / std * target_std + target_mean);
                } else {
                    image.fill(target_mean);
                }
            }
        }
        image.mapv_inplace(|x| x.clamp(min, max));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn clamp_limits_each_pixel() {
        let mut image = array![-0.5, 0.25, 1.5].into_dyn();
        Projection::default().apply(&mut image, (0.0, 0.0));
        assert_eq!(image, array![0.0, 0.25, 1.0].into_dyn());
    }

    #[test]
    fn remap_rescales_only_out_of_range_images() {
        let projection = Projection::Remap { min: 0.0, max: 1.0 };

        let mut inside = array![0.2, 0.4].into_dyn();
        projection.apply(&mut inside, (0.0, 0.0));
        assert_eq!(inside, array![0.2, 0.4].into_dyn());

        let mut outside = array![-1.0, 0.0, 3.0].into_dyn();
        projection.apply(&mut outside, (0.0, 0.0));
        assert_relative_eq!(outside, array![0.0, 0.25, 1.0].into_dyn());
    }

    #[test]
    fn match_moments_targets_reference_statistics() {
        let projection = Projection::MatchMoments { min: -10.0, max: 10.0 };
        let mut image = array![0.0, 2.0, 4.0, 6.0].into_dyn();
        projection.apply(&mut image, (1.0, 0.5));

        let (mean, std) = tensor::moments(&image);
        assert_relative_eq!(mean, 1.0, epsilon = 1e-12);
        assert_relative_eq!(std, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn rejects_empty_range() {
        assert_eq!(
            Projection::Clamp { min: 1.0, max: 1.0 }.validate(),
            Err(ConfigError::Range)
        );
        assert_eq!(
            Projection::Remap {
                min: 0.0,
                max: f64::NAN
            }
            .validate(),
            Err(ConfigError::Range)
        );
    }
}
