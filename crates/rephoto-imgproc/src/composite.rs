//! Side-by-side comparison of the reference image and the warped modern image.
//!
//! All modes take straight-alpha RGBA `f32` images in `[0, 1]` of identical size. A warped
//! pixel with alpha 0 carries no data: it never replaces the reference in slider and ghost
//! modes and produces no difference in diff mode.

use serde::{Deserialize, Serialize};

use crate::parallel;
use rephoto_image::{ImageError, Rgba32F};

/// Direction of the slider split.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SliderOrientation {
    /// Split along x; the warped image is revealed from the left.
    #[default]
    Vertical,
    /// Split along y; the warped image is revealed from the top.
    Horizontal,
}

/// Visualization of the reference and warped images.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum CompositeMode {
    /// Warped image before the split position, reference image after it.
    Slider {
        /// Split position as a fraction of the width (or height), `[0, 1]`.
        position: f32,
        /// Split direction.
        #[serde(default)]
        orientation: SliderOrientation,
    },
    /// Alpha blend of the two images.
    Ghost {
        /// Weight of the warped image, `[0, 1]`.
        alpha: f32,
    },
    /// Absolute per-channel difference.
    Diff {
        /// Pixels whose largest channel difference is below this value become black.
        threshold: f32,
        /// Amplification applied to the difference, `>= 0`.
        gain: f32,
        /// Map the difference magnitude to a heat ramp instead of per-channel values.
        colorize: bool,
    },
}

impl Default for CompositeMode {
    fn default() -> Self {
        CompositeMode::Slider {
            position: 0.5,
            orientation: SliderOrientation::Vertical,
        }
    }
}

impl CompositeMode {
    /// Vertical slider at `position`.
    pub fn slider(position: f32) -> Self {
        CompositeMode::Slider {
            position,
            orientation: SliderOrientation::Vertical,
        }
    }

    /// Ghost blend with the default opacity of 0.5.
    pub fn ghost() -> Self {
        CompositeMode::Ghost { alpha: 0.5 }
    }

    /// Plain difference map: no threshold, unit gain, no colors.
    pub fn diff() -> Self {
        CompositeMode::Diff {
            threshold: 0.0,
            gain: 1.0,
            colorize: false,
        }
    }

    /// The same mode with every parameter clamped to its range.
    pub fn clamped(self) -> Self {
        let unit = |v: f32| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        match self {
            CompositeMode::Slider {
                position,
                orientation,
            } => CompositeMode::Slider {
                position: unit(position),
                orientation,
            },
            CompositeMode::Ghost { alpha } => CompositeMode::Ghost { alpha: unit(alpha) },
            CompositeMode::Diff {
                threshold,
                gain,
                colorize,
            } => CompositeMode::Diff {
                threshold: unit(threshold),
                gain: if gain.is_nan() { 1.0 } else { gain.max(0.0) },
                colorize,
            },
        }
    }
}

/// `(1 - w) * a + w * b` on every channel; exact for `w` of 0 or 1.
#[inline]
fn mix(a: &[f32], b: &[f32], w: f32, out: &mut [f32]) {
    for ((o, &pa), &pb) in out.iter_mut().zip(a).zip(b) {
        *o = (1.0 - w) * pa + w * pb;
    }
}

/// Black to red to yellow to white.
#[inline]
fn heat_ramp(m: f32) -> [f32; 3] {
    let m = m.clamp(0.0, 1.0) * 3.0;
    [m.min(1.0), (m - 1.0).clamp(0.0, 1.0), (m - 2.0).clamp(0.0, 1.0)]
}

/// Combine the reference image `a` and the warped image `b`.
///
/// # Arguments
///
/// * `a` - The reference image, RGBA.
/// * `b` - The warped image in the reference frame, RGBA.
/// * `mode` - The visualization; parameters are clamped to their ranges.
///
/// # Errors
///
/// Returns [`ImageError::InvalidImageSize`] if the images differ in size.
pub fn composite(a: &Rgba32F, b: &Rgba32F, mode: CompositeMode) -> Result<Rgba32F, ImageError> {
    if a.size() != b.size() {
        return Err(ImageError::InvalidImageSize(
            a.width(),
            a.height(),
            b.width(),
            b.height(),
        ));
    }

    let mut dst = Rgba32F::from_size_val(a.size(), 0.0)?;

    match mode.clamped() {
        CompositeMode::Slider {
            position,
            orientation,
        } => {
            let (width, height) = (a.width() as f32, a.height() as f32);
            parallel::par_iter_rows_two_indexed(a, b, &mut dst, |y, row_a, row_b, row_dst| {
                let row_in_b = (y as f32 + 0.5) < position * height;
                row_a
                    .chunks_exact(4)
                    .zip(row_b.chunks_exact(4))
                    .zip(row_dst.chunks_exact_mut(4))
                    .enumerate()
                    .for_each(|(x, ((pa, pb), pd))| {
                        let in_b = match orientation {
                            SliderOrientation::Vertical => (x as f32 + 0.5) < position * width,
                            SliderOrientation::Horizontal => row_in_b,
                        };
                        if in_b {
                            mix(pa, pb, pb[3], pd);
                        } else {
                            pd.copy_from_slice(pa);
                        }
                    });
            });
        }
        CompositeMode::Ghost { alpha } => {
            parallel::par_iter_rows_pixel_two(a, b, &mut dst, |pa, pb, pd| {
                mix(pa, pb, alpha * pb[3], pd);
            });
        }
        CompositeMode::Diff {
            threshold,
            gain,
            colorize,
        } => {
            parallel::par_iter_rows_pixel_two(a, b, &mut dst, |pa, pb, pd| {
                let weight = pb[3];
                let mut diff = [0.0f32; 3];
                for (d, (&ca, &cb)) in diff.iter_mut().zip(pa.iter().zip(pb)) {
                    *d = (ca - cb).abs() * weight;
                }
                let magnitude = diff.iter().cloned().fold(0.0, f32::max);

                if weight <= 0.0 || magnitude < threshold {
                    pd.copy_from_slice(&[0.0, 0.0, 0.0, 1.0]);
                    return;
                }

                let rgb = if colorize {
                    heat_ramp(magnitude * gain)
                } else {
                    diff.map(|d| (d * gain).min(1.0))
                };
                pd[..3].copy_from_slice(&rgb);
                pd[3] = 1.0;
            });
        }
    }

    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rephoto_image::ImageSize;

    const SIZE: ImageSize = ImageSize {
        width: 8,
        height: 6,
    };

    fn solid(pixel: [f32; 4]) -> Result<Rgba32F, ImageError> {
        Rgba32F::from_size_pixel(SIZE, pixel)
    }

    fn textured(seed: f32) -> Result<Rgba32F, ImageError> {
        let data = (0..SIZE.area())
            .flat_map(|i| {
                let v = ((i as f32 * 0.37 + seed).sin() + 1.0) / 2.0;
                [v, 1.0 - v, v * 0.5, 1.0]
            })
            .collect();
        Rgba32F::new(SIZE, data)
    }

    #[test]
    fn slider_extremes() -> Result<(), ImageError> {
        let (a, b) = (textured(0.0)?, textured(1.3)?);
        for orientation in [SliderOrientation::Vertical, SliderOrientation::Horizontal] {
            let at = |position| CompositeMode::Slider {
                position,
                orientation,
            };
            assert_eq!(composite(&a, &b, at(0.0))?, a);
            assert_eq!(composite(&a, &b, at(1.0))?, b);
            // out of range positions are clamped
            assert_eq!(composite(&a, &b, at(-3.0))?, a);
            assert_eq!(composite(&a, &b, at(7.0))?, b);
        }
        Ok(())
    }

    #[test]
    fn slider_splits_at_position() -> Result<(), ImageError> {
        let a = solid([1.0, 0.0, 0.0, 1.0])?;
        let b = solid([0.0, 0.0, 1.0, 1.0])?;
        let out = composite(&a, &b, CompositeMode::slider(0.5))?;
        assert_eq!(out.pixel(3, 0)?, b.pixel(3, 0)?);
        assert_eq!(out.pixel(4, 0)?, a.pixel(4, 0)?);

        let out = composite(
            &a,
            &b,
            CompositeMode::Slider {
                position: 0.5,
                orientation: SliderOrientation::Horizontal,
            },
        )?;
        assert_eq!(out.pixel(7, 2)?, b.pixel(7, 2)?);
        assert_eq!(out.pixel(0, 3)?, a.pixel(0, 3)?);
        Ok(())
    }

    #[test]
    fn slider_transparent_b_shows_a() -> Result<(), ImageError> {
        let a = textured(0.0)?;
        let b = solid([0.0; 4])?;
        assert_eq!(composite(&a, &b, CompositeMode::slider(1.0))?, a);
        Ok(())
    }

    #[test]
    fn ghost_blends() -> Result<(), ImageError> {
        let a = solid([1.0, 0.0, 0.2, 1.0])?;
        let b = solid([0.0, 1.0, 0.6, 1.0])?;
        let out = composite(&a, &b, CompositeMode::ghost())?;
        let p = out.pixel(5, 5)?;
        assert_relative_eq!(p[0], 0.5);
        assert_relative_eq!(p[1], 0.5);
        assert_relative_eq!(p[2], 0.4);
        assert_relative_eq!(p[3], 1.0);

        // half transparent b contributes half as much
        let b = solid([0.0, 1.0, 0.6, 0.5])?;
        let out = composite(&a, &b, CompositeMode::Ghost { alpha: 1.0 })?;
        assert_relative_eq!(out.pixel(0, 0)?[0], 0.5);

        let b = solid([0.0; 4])?;
        assert_eq!(composite(&a, &b, CompositeMode::Ghost { alpha: 1.0 })?, a);
        Ok(())
    }

    #[test]
    fn diff_of_identical_images_is_black() -> Result<(), ImageError> {
        let a = textured(0.4)?;
        let out = composite(&a, &a, CompositeMode::diff())?;
        for p in out.as_slice().chunks_exact(4) {
            assert_eq!(p, &[0.0, 0.0, 0.0, 1.0]);
        }
        Ok(())
    }

    #[test]
    fn diff_threshold_and_gain() -> Result<(), ImageError> {
        let a = solid([0.5, 0.5, 0.5, 1.0])?;
        let b = solid([0.6, 0.5, 0.2, 1.0])?;

        let out = composite(
            &a,
            &b,
            CompositeMode::Diff {
                threshold: 0.0,
                gain: 2.0,
                colorize: false,
            },
        )?;
        let p = out.pixel(1, 1)?;
        assert_relative_eq!(p[0], 0.2, epsilon = 1e-6);
        assert_relative_eq!(p[1], 0.0);
        assert_relative_eq!(p[2], 0.6, epsilon = 1e-6);

        let out = composite(
            &a,
            &b,
            CompositeMode::Diff {
                threshold: 0.5,
                gain: 2.0,
                colorize: false,
            },
        )?;
        assert_eq!(out.pixel(1, 1)?, &[0.0, 0.0, 0.0, 1.0]);
        Ok(())
    }

    #[test]
    fn diff_colorize_uses_heat_ramp() -> Result<(), ImageError> {
        let a = solid([0.0, 0.0, 0.0, 1.0])?;
        let b = solid([1.0, 1.0, 1.0, 1.0])?;
        let out = composite(
            &a,
            &b,
            CompositeMode::Diff {
                threshold: 0.0,
                gain: 1.0,
                colorize: true,
            },
        )?;
        assert_eq!(out.pixel(0, 0)?, &[1.0, 1.0, 1.0, 1.0]);
        assert_eq!(heat_ramp(0.0), [0.0, 0.0, 0.0]);
        assert_eq!(heat_ramp(1.0 / 3.0), [1.0, 0.0, 0.0]);
        Ok(())
    }

    #[test]
    fn diff_transparent_b_is_zero() -> Result<(), ImageError> {
        let a = textured(0.0)?;
        let b = solid([0.0; 4])?;
        let out = composite(&a, &b, CompositeMode::diff())?;
        assert!(out
            .as_slice()
            .chunks_exact(4)
            .all(|p| p == [0.0, 0.0, 0.0, 1.0]));
        Ok(())
    }

    #[test]
    fn size_mismatch() -> Result<(), ImageError> {
        let a = solid([0.0; 4])?;
        let b = Rgba32F::from_size_val([2, 2].into(), 0.0)?;
        assert_eq!(
            composite(&a, &b, CompositeMode::default()),
            Err(ImageError::InvalidImageSize(8, 6, 2, 2))
        );
        Ok(())
    }

    #[test]
    fn mode_serde() -> Result<(), serde_json::Error> {
        let json = serde_json::to_string(&CompositeMode::ghost())?;
        assert_eq!(json, r#"{"mode":"ghost","alpha":0.5}"#);
        let mode: CompositeMode = serde_json::from_str(r#"{"mode":"slider","position":0.25}"#)?;
        assert_eq!(mode, CompositeMode::slider(0.25));
        Ok(())
    }
}
