//! Conversions between the driver's flat iterate and engine-shaped arrays.

use ndarray::{Array4, ArrayD, ArrayViewD, Axis, Ix3};
use stimuli_core::Image;

use crate::Error;

/// Converts an iterate into an image, checking its shape.
pub(crate) fn to_image(iterate: ArrayViewD<'_, f64>, expected: &[usize]) -> Result<Image, Error> {
    if iterate.shape() != expected {
        return Err(Error::shape_mismatch(expected, iterate.shape()));
    }
    iterate
        .to_owned()
        .into_dimensionality::<Ix3>()
        .map_err(|_| Error::shape_mismatch(expected, iterate.shape()))
}

/// Splits a stacked iterate (`[n, c, h, w]`) into its images.
pub(crate) fn unstack(iterate: &ArrayD<f64>, image_shape: &[usize]) -> Result<Vec<Image>, Error> {
    if iterate.ndim() != 4 || &iterate.shape()[1..] != image_shape {
        let mut expected = vec![iterate.shape().first().copied().unwrap_or(0)];
        expected.extend_from_slice(image_shape);
        return Err(Error::shape_mismatch(&expected, iterate.shape()));
    }
    iterate
        .axis_iter(Axis(0))
        .map(|row| to_image(row, image_shape))
        .collect()
}

/// Stacks equally shaped images into one iterate.
pub(crate) fn stack(images: &[Image]) -> Result<ArrayD<f64>, Error> {
    stack_images(images).map(Array4::into_dyn)
}

/// Stacks equally shaped images into a `[n, c, h, w]` array.
pub(crate) fn stack_images(images: &[Image]) -> Result<Array4<f64>, Error> {
    let views: Vec<_> = images.iter().map(Image::view).collect();
    ndarray::stack(Axis(0), &views).map_err(|_| {
        let found = images.iter().map(|image| image.len()).collect::<Vec<_>>();
        Error::shape_mismatch(&[images.len()], &found)
    })
}
