use rephoto_image::Image;

/// Free parameter of the Keys cubic convolution kernel.
const CUBIC_A: f32 = -0.75;

#[inline]
fn cubic_weights(t: f32) -> [f32; 4] {
    let w = |x: f32| {
        let x = x.abs();
        if x <= 1.0 {
            ((CUBIC_A + 2.0) * x - (CUBIC_A + 3.0)) * x * x + 1.0
        } else if x < 2.0 {
            ((CUBIC_A * x - 5.0 * CUBIC_A) * x + 8.0 * CUBIC_A) * x - 4.0 * CUBIC_A
        } else {
            0.0
        }
    };
    [w(1.0 + t), w(t), w(1.0 - t), w(2.0 - t)]
}

/// Kernel for bicubic interpolation over the 4x4 neighbourhood of `(u, v)`.
///
/// # Arguments
///
/// * `image` - The input image container.
/// * `u` - The x coordinate of the pixel to interpolate, `0 <= u <= cols - 1`.
/// * `v` - The y coordinate of the pixel to interpolate, `0 <= v <= rows - 1`.
///
/// # Returns
///
/// The interpolated pixel values, limited per channel to the range of the neighbourhood so
/// the kernel never rings past the data. Neighbours past the border repeat the edge.
pub(crate) fn bicubic_interpolation<const C: usize>(
    image: &Image<f32, C>,
    u: f32,
    v: f32,
) -> [f32; C] {
    let (rows, cols) = (image.rows(), image.cols());

    let iu = (u.floor() as usize).min(cols - 1);
    let iv = (v.floor() as usize).min(rows - 1);
    let wu = cubic_weights(u - iu as f32);
    let wv = cubic_weights(v - iv as f32);

    let clamp_index = |i: isize, n: usize| i.clamp(0, n as isize - 1) as usize;
    let data = image.as_slice();

    let mut pixel = [0.0; C];
    let mut lo = [f32::INFINITY; C];
    let mut hi = [f32::NEG_INFINITY; C];
    for (j, wy) in wv.iter().enumerate() {
        let y = clamp_index(iv as isize + j as isize - 1, rows);
        for (i, wx) in wu.iter().enumerate() {
            let x = clamp_index(iu as isize + i as isize - 1, cols);
            let base = (y * cols + x) * C;
            let w = wx * wy;
            for k in 0..C {
                let value = data[base + k];
                pixel[k] += value * w;
                lo[k] = lo[k].min(value);
                hi[k] = hi[k].max(value);
            }
        }
    }

    for k in 0..C {
        pixel[k] = pixel[k].clamp(lo[k], hi[k]);
    }
    pixel
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rephoto_image::{ImageError, ImageSize};

    #[test]
    fn weights_sum_to_one() {
        for t in [0.0, 0.25, 0.5, 0.9] {
            let w = cubic_weights(t);
            assert_relative_eq!(w.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
        }
        assert_eq!(cubic_weights(0.0), [0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn bicubic_interpolates_samples_and_ramps() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 6,
            height: 5,
        };
        let data = (0..size.area()).map(|i| (i % size.width) as f32).collect();
        let image = Image::<f32, 1>::new(size, data)?;

        assert_eq!(bicubic_interpolation(&image, 3.0, 2.0), [3.0]);
        // a linear ramp is reproduced away from the border
        assert_relative_eq!(bicubic_interpolation(&image, 2.5, 1.5)[0], 2.5, epsilon = 1e-5);
        assert_relative_eq!(bicubic_interpolation(&image, 5.0, 4.0)[0], 5.0, epsilon = 1e-5);
        Ok(())
    }

    #[test]
    fn bicubic_does_not_overshoot_an_edge() -> Result<(), ImageError> {
        let image = Image::<f32, 1>::new(
            ImageSize {
                width: 4,
                height: 1,
            },
            vec![0.0, 0.0, 1.0, 1.0],
        )?;
        for u in [0.5, 1.2, 1.5, 1.8, 2.5] {
            let [value] = bicubic_interpolation(&image, u, 0.0);
            assert!((0.0..=1.0).contains(&value), "{u}: {value}");
        }
        Ok(())
    }
}
