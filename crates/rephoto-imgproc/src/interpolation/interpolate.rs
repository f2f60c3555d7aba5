use serde::{Deserialize, Serialize};

use super::bicubic::bicubic_interpolation;
use super::bilinear::bilinear_interpolation;
use super::nearest::nearest_neighbor_interpolation;
use rephoto_image::Image;

/// Tolerance, in pixels, on the source bounds.
///
/// Mapped coordinates of pixels lying exactly on the border land a rounding error outside.
/// The same tolerance applies on all four sides.
pub(crate) const BOUNDS_EPS: f32 = 1e-3;

/// Interpolation mode for resampling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InterpolationMode {
    /// Bilinear interpolation
    #[default]
    Bilinear,
    /// Nearest neighbor interpolation
    Nearest,
    /// Bicubic (Keys cubic convolution) interpolation
    Bicubic,
}

/// Kernel for interpolating a pixel value
///
/// # Arguments
///
/// * `image` - The input image container with shape (height, width, C).
/// * `u` - The x coordinate of the pixel to interpolate, clamped to `[0, cols - 1]`.
/// * `v` - The y coordinate of the pixel to interpolate, clamped to `[0, rows - 1]`.
/// * `interpolation` - The interpolation mode to use.
///
/// # Returns
///
/// The interpolated pixel.
pub fn interpolate_pixel<const C: usize>(
    image: &Image<f32, C>,
    u: f32,
    v: f32,
    interpolation: InterpolationMode,
) -> [f32; C] {
    let max_u = image.cols().saturating_sub(1) as f32;
    let max_v = image.rows().saturating_sub(1) as f32;
    let (u, v) = (u.clamp(0.0, max_u), v.clamp(0.0, max_v));
    match interpolation {
        InterpolationMode::Bilinear => bilinear_interpolation(image, u, v),
        InterpolationMode::Nearest => nearest_neighbor_interpolation(image, u, v),
        InterpolationMode::Bicubic => bicubic_interpolation(image, u, v),
    }
}

/// Sample `image` at `(u, v)`, or `None` if the coordinate falls outside it.
///
/// The sampling domain spans the pixel centers, `[0, width - 1] x [0, height - 1]`, widened
/// by a small tolerance on every side. Nothing past it is clamped back in. Non-finite
/// coordinates are outside.
#[inline]
pub fn sample_pixel<const C: usize>(
    image: &Image<f32, C>,
    u: f32,
    v: f32,
    interpolation: InterpolationMode,
) -> Option<[f32; C]> {
    let max_u = image.cols() as f32 - 1.0 + BOUNDS_EPS;
    let max_v = image.rows() as f32 - 1.0 + BOUNDS_EPS;
    let inside = u >= -BOUNDS_EPS && u <= max_u && v >= -BOUNDS_EPS && v <= max_v;
    // NaN fails every comparison above
    if !inside || image.cols() == 0 || image.rows() == 0 {
        return None;
    }
    Some(interpolate_pixel(image, u, v, interpolation))
}
