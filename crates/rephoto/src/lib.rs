#![deny(missing_docs)]
//! Align a historical photograph (A) with a modern one (B) from user-supplied
//! correspondences.
//!
//! The pipeline flattens point, line and face correspondences into point pairs, fits a
//! homography or a thin plate spline mapping B onto A, resamples B into A's frame and
//! renders a comparison composite.
//!
//! ```
//! use rephoto::{composite, compute_transform, warp, CompositeMode, TransformKind};
//! use rephoto::geometry::{PointPair, SolverConfig};
//! use rephoto::image::{ImageSize, Rgba32F};
//! use rephoto::imgproc::interpolation::InterpolationMode;
//!
//! let a = [[0.0, 0.0], [100.0, 0.0], [100.0, 100.0], [0.0, 100.0]];
//! let b = [[10.0, 5.0], [120.0, 0.0], [115.0, 110.0], [5.0, 95.0]];
//! let pairs: Vec<PointPair> = a.iter().zip(&b).map(|(&a, &b)| PointPair { a, b }).collect();
//!
//! let transform =
//!     compute_transform(&pairs, TransformKind::Homography, &SolverConfig::default()).unwrap();
//!
//! let size = ImageSize { width: 100, height: 100 };
//! let modern = Rgba32F::from_size_pixel([130, 120].into(), [0.5, 0.5, 0.5, 1.0]).unwrap();
//! let historical = Rgba32F::from_size_pixel(size, [0.2, 0.2, 0.2, 1.0]).unwrap();
//!
//! let warped = warp(&modern, &transform, size, InterpolationMode::Bilinear).unwrap();
//! let view = composite(&historical, &warped, CompositeMode::slider(0.5)).unwrap();
//! assert_eq!(view.size(), size);
//! ```

use std::path::Path;

#[doc(inline)]
pub use rephoto_geometry as geometry;

#[doc(inline)]
pub use rephoto_image as image;

#[doc(inline)]
pub use rephoto_imgproc as imgproc;

#[doc(inline)]
pub use rephoto_io as io;

/// Session settings.
pub mod config;

/// Background computation with generation-based cancellation.
pub mod coordinator;

/// Error types of the pipeline.
pub mod error;

/// Project file reading and writing.
pub mod project;

/// Interactive session state machine.
pub mod session;

pub use crate::config::SessionConfig;
pub use crate::coordinator::{ComputeCoordinator, ComputeRequest, ComputeResult, ComputeStage};
pub use crate::error::Error;
pub use crate::project::{Project, ProjectError};
pub use crate::session::{Session, SessionEvent, SessionState};

pub use rephoto_geometry::{compute_transform, Transform, TransformKind};
pub use rephoto_imgproc::composite::{CompositeMode, SliderOrientation};

use rephoto_image::{ImageSize, Rgba32F};
use rephoto_imgproc::interpolation::InterpolationMode;

/// Resample `image` into a `target_size` frame through the inverse of `transform`.
///
/// Pixels without a source are transparent black.
pub fn warp(
    image: &Rgba32F,
    transform: &Transform,
    target_size: ImageSize,
    interpolation: InterpolationMode,
) -> Result<Rgba32F, Error> {
    Ok(rephoto_imgproc::warp::warp(
        image,
        transform,
        target_size,
        interpolation,
    )?)
}

/// Render the comparison of the reference image `a` with the warped image `warped_b`.
pub fn composite(a: &Rgba32F, warped_b: &Rgba32F, mode: CompositeMode) -> Result<Rgba32F, Error> {
    Ok(rephoto_imgproc::composite::composite(a, warped_b, mode)?)
}

/// Encode `image` to `path`, the format chosen by the extension.
pub fn export_image(image: &Rgba32F, path: impl AsRef<Path>) -> Result<(), rephoto_io::IoError> {
    rephoto_io::functional::write_image(path, image)
}
