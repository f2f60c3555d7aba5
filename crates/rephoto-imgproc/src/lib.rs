#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Compositing of the reference image with the warped image.
pub mod composite;

/// Interpolation kernels and coordinate field resampling.
pub mod interpolation;

/// Utility functions to parallelize row-wise image operations.
pub mod parallel;

/// Dense warping through a fitted transform.
pub mod warp;
