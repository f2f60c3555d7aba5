use crate::parallel;

use super::interpolate::sample_pixel;
use super::InterpolationMode;
use rephoto_geometry::CoordinateField;
use rephoto_image::{Image, ImageError};

/// Resample an image through a precomputed coordinate field.
///
/// # Arguments
///
/// * `src` - The input image container with shape (height, width, C).
/// * `dst` - The output image container, same size as the field.
/// * `field` - The source coordinate of every destination pixel.
/// * `interpolation` - The interpolation mode to use.
///
/// Destination pixels whose source coordinate falls outside `src` are set to zero.
///
/// # Errors
///
/// The output image must have the same size as the coordinate field.
pub fn remap<const C: usize>(
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
    field: &CoordinateField,
    interpolation: InterpolationMode,
) -> Result<(), ImageError> {
    if dst.cols() != field.width() || dst.rows() != field.height() {
        return Err(ImageError::InvalidImageSize(
            field.width(),
            field.height(),
            dst.cols(),
            dst.rows(),
        ));
    }

    // parallelize the remap operation by rows
    parallel::par_iter_rows_resample(dst, field.map_x(), field.map_y(), |&x, &y, dst_pixel| {
        match sample_pixel(src, x, y, interpolation) {
            Some(pixel) => dst_pixel.copy_from_slice(&pixel),
            None => dst_pixel.fill(0.0),
        }
    });

    Ok(())
}
