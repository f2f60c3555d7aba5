use serde::{Deserialize, Serialize};

use crate::{
    interpolation::{sample_pixel, InterpolationMode},
    parallel,
};

use rephoto_geometry::{Point2, Transform};
use rephoto_image::{Image, ImageError, ImageSize};

/// Settings of the warp stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WarpConfig {
    /// Sampling kernel used on the source image.
    pub interpolation: InterpolationMode,
}

/// Resample `src` into `dst` through a fitted transform.
///
/// * `src` - The source image (B) with shape (height, width, channels).
/// * `dst` - The output image in the reference frame (A).
/// * `transform` - The fitted B -> A transform; its inverse direction is evaluated.
/// * `interpolation` - The interpolation mode to use.
///
/// Rows are processed in parallel, each with its own coordinate buffer.
///
/// # Example
///
/// ```
/// use rephoto_geometry::Transform;
/// use rephoto_image::{Image, ImageSize};
/// use rephoto_imgproc::interpolation::InterpolationMode;
/// use rephoto_imgproc::warp::warp_into;
///
/// let src = Image::<f32, 4>::from_size_pixel(
///     ImageSize { width: 4, height: 5 },
///     [0.5, 0.5, 0.5, 1.0],
/// ).unwrap();
///
/// let mut dst = Image::<f32, 4>::from_size_val(
///     ImageSize { width: 2, height: 3 },
///     0.0,
/// ).unwrap();
///
/// warp_into(&src, &mut dst, &Transform::identity(), InterpolationMode::Bilinear);
///
/// assert_eq!(dst.pixel(1, 2).unwrap(), &[0.5, 0.5, 0.5, 1.0]);
/// ```
pub fn warp_into<const C: usize>(
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
    transform: &Transform,
    interpolation: InterpolationMode,
) {
    let cols = dst.cols();
    parallel::par_iter_rows_indexed(dst, |y, dst_row| {
        let targets: Vec<Point2> = (0..cols).map(|x| [x as f64, y as f64]).collect();
        let mut sources = vec![[0.0; 2]; cols];
        transform.apply_inverse_batch(&targets, &mut sources);

        dst_row
            .chunks_exact_mut(C)
            .zip(&sources)
            .for_each(|(dst_pixel, &[u, v])| {
                match sample_pixel(src, u as f32, v as f32, interpolation) {
                    Some(pixel) => dst_pixel.copy_from_slice(&pixel),
                    None => dst_pixel.fill(0.0),
                }
            });
    });
}

/// Warp `src` into a new image of `target_size`.
///
/// # Errors
///
/// Returns [`ImageError::InvalidImageSize`] when either the source or the target is empty.
pub fn warp<const C: usize>(
    src: &Image<f32, C>,
    transform: &Transform,
    target_size: ImageSize,
    interpolation: InterpolationMode,
) -> Result<Image<f32, C>, ImageError> {
    if src.size().area() == 0 || target_size.area() == 0 {
        return Err(ImageError::InvalidImageSize(
            src.width(),
            src.height(),
            target_size.width,
            target_size.height,
        ));
    }

    let start = std::time::Instant::now();
    let mut dst = Image::from_size_val(target_size, 0.0)?;
    warp_into(src, &mut dst, transform, interpolation);

    log::debug!(
        "warped {} into {} with {} in {:?}",
        src.size(),
        target_size,
        transform.kind(),
        start.elapsed()
    );

    Ok(dst)
}
