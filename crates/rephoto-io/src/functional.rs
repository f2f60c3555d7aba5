use std::path::Path;

use rephoto_image::{ImageSize, Rgba32F};

use crate::error::IoError;

/// Reads an image from the given file path as straight-alpha RGBA in `[0, 1]`.
///
/// The method tries to read from any image format supported by the image crate. Images
/// without an alpha channel come back fully opaque.
///
/// # Arguments
///
/// * `file_path` - The path to a valid image file.
///
/// # Errors
///
/// * [`IoError::FileDoesNotExist`] if there is no file at `file_path`.
/// * [`IoError::ImageCodecError`] if the content cannot be decoded.
pub fn read_image_rgba32f(file_path: impl AsRef<Path>) -> Result<Rgba32F, IoError> {
    let file_path = file_path.as_ref();

    // verify the file exists
    if !file_path.exists() {
        return Err(IoError::FileDoesNotExist(file_path.to_path_buf()));
    }

    let img = image::ImageReader::open(file_path)?
        .with_guessed_format()?
        .decode()?;

    let size = ImageSize {
        width: img.width() as usize,
        height: img.height() as usize,
    };

    let image = Rgba32F::new(size, img.into_rgba32f().into_raw())?;
    log::debug!("decoded {} from {}", size, file_path.display());

    Ok(image)
}

#[inline]
fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Writes an RGBA image to the given file path, in the format named by its extension.
///
/// Values are clamped to `[0, 1]` and quantized to 8 bits. Formats without an alpha
/// channel (JPEG) drop it.
///
/// # Arguments
///
/// * `file_path` - The destination path, e.g. `aligned.png`.
/// * `image` - The image to encode.
///
/// # Errors
///
/// * [`IoError::InvalidFileExtension`] if the extension names no supported format.
/// * [`IoError::ImageCodecError`] or [`IoError::FileError`] on encoding or write failures.
pub fn write_image(file_path: impl AsRef<Path>, image: &Rgba32F) -> Result<(), IoError> {
    let file_path = file_path.as_ref();

    let format = image::ImageFormat::from_path(file_path)
        .map_err(|_| IoError::InvalidFileExtension(file_path.to_path_buf()))?;

    let (width, height) = (image.width() as u32, image.height() as u32);

    if format == image::ImageFormat::Jpeg {
        let data: Vec<u8> = image
            .as_slice()
            .chunks_exact(4)
            .flat_map(|p| [to_u8(p[0]), to_u8(p[1]), to_u8(p[2])])
            .collect();
        image::save_buffer_with_format(
            file_path,
            &data,
            width,
            height,
            image::ExtendedColorType::Rgb8,
            format,
        )?;
    } else {
        let data: Vec<u8> = image.as_slice().iter().map(|&v| to_u8(v)).collect();
        image::save_buffer_with_format(
            file_path,
            &data,
            width,
            height,
            image::ExtendedColorType::Rgba8,
            format,
        )?;
    }

    log::info!("wrote {} image to {}", image.size(), file_path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker() -> Result<Rgba32F, IoError> {
        let size = ImageSize {
            width: 6,
            height: 4,
        };
        let data = (0..size.area())
            .flat_map(|i| {
                if i % 2 == 0 {
                    [1.0, 0.0, 0.0, 1.0]
                } else {
                    [0.0, 0.0, 1.0, 0.0]
                }
            })
            .collect();
        Ok(Rgba32F::new(size, data)?)
    }

    #[test]
    fn png_round_trip() -> Result<(), IoError> {
        let tmp_dir = tempfile::tempdir()?;
        let file_path = tmp_dir.path().join("checker.png");

        let image = checker()?;
        write_image(&file_path, &image)?;
        assert!(file_path.exists());

        let back = read_image_rgba32f(&file_path)?;
        assert_eq!(back.size(), image.size());
        assert_eq!(back, image);
        Ok(())
    }

    #[test]
    fn jpeg_drops_alpha() -> Result<(), IoError> {
        let tmp_dir = tempfile::tempdir()?;
        let file_path = tmp_dir.path().join("checker.jpg");

        write_image(&file_path, &checker()?)?;
        let back = read_image_rgba32f(&file_path)?;
        assert_eq!(back.width(), 6);
        assert!(back.as_slice().chunks_exact(4).all(|p| p[3] == 1.0));
        Ok(())
    }

    #[test]
    fn missing_file() {
        let res = read_image_rgba32f("/definitely/not/here.png");
        assert!(matches!(res, Err(IoError::FileDoesNotExist(_))));
    }

    #[test]
    fn unknown_extension() -> Result<(), IoError> {
        let tmp_dir = tempfile::tempdir()?;
        let res = write_image(tmp_dir.path().join("image.unknown"), &checker()?);
        assert!(matches!(res, Err(IoError::InvalidFileExtension(_))));
        Ok(())
    }
}
