//! Pixel interpolation used when resampling the modern image into the reference frame.
//!
//! - **Bilinear**: weighted average of the four neighbouring pixels (default)
//! - **Nearest**: value of the closest pixel
//! - **Bicubic**: cubic convolution over the 4x4 neighbourhood

mod bicubic;
mod bilinear;
pub(crate) mod interpolate;
mod nearest;
mod remap;

pub use interpolate::{interpolate_pixel, sample_pixel, InterpolationMode};
pub use remap::remap;
