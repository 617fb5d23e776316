use std::path::Path;

use nstyle_image::{Image, ImageSize};

use crate::error::IoError;

/// Reads an image from the given file path and converts it to 8-bit RGB.
///
/// The method tries to read from any image format supported by the image crate.
/// Grayscale and alpha-carrying inputs are converted to three-channel RGB.
///
/// # Arguments
///
/// * `file_path` - The path to a valid image file.
///
/// # Returns
///
/// An image containing the image data in RGB8 format.
pub fn read_image_rgb8(file_path: impl AsRef<Path>) -> Result<Image<u8, 3>, IoError> {
    let file_path = file_path.as_ref().to_owned();

    // verify the file exists
    if !file_path.exists() {
        return Err(IoError::FileDoesNotExist(file_path.to_path_buf()));
    }

    // open the file and map it to memory
    let file = std::fs::File::open(&file_path)?;
    let mmap = unsafe { memmap2::Mmap::map(&file)? };

    // decode the data directly from memory
    let img = image::ImageReader::new(std::io::Cursor::new(&mmap))
        .with_guessed_format()?
        .decode()?;

    let size = ImageSize {
        width: img.width() as usize,
        height: img.height() as usize,
    };

    if img.color() != image::ColorType::Rgb8 {
        log::debug!(
            "converting {:?} image to rgb8: {:?}",
            img.color(),
            file_path
        );
    }

    let image = Image::new(size, img.into_rgb8().into_raw())?;

    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::read_image_rgb8;
    use crate::error::IoError;
    use crate::png::write_image_png_rgb8;
    use nstyle_image::{Image, ImageSize};

    #[test]
    fn read_missing_file() {
        let result = read_image_rgb8("/definitely/not/here.png");
        assert!(matches!(result, Err(IoError::FileDoesNotExist(_))));
    }

    #[test]
    fn read_corrupt_file() -> Result<(), IoError> {
        let tmp_dir = tempfile::tempdir()?;
        let file_path = tmp_dir.path().join("not_an_image.png");
        std::fs::write(&file_path, b"this is not an image")?;

        let result = read_image_rgb8(&file_path);
        assert!(matches!(result, Err(IoError::ImageDecodeError(_))));

        Ok(())
    }

    #[test]
    fn read_write_round_trip() -> Result<(), IoError> {
        let tmp_dir = tempfile::tempdir()?;
        let file_path = tmp_dir.path().join("gradient.png");

        let size = ImageSize {
            width: 4,
            height: 3,
        };
        let data = (0..4 * 3 * 3).map(|i| (i * 7 % 256) as u8).collect();
        let image = Image::<u8, 3>::new(size, data)?;

        write_image_png_rgb8(&file_path, &image)?;
        let image_back = read_image_rgb8(&file_path)?;

        assert_eq!(image_back.size(), size);
        assert_eq!(image_back.as_slice(), image.as_slice());

        Ok(())
    }
}
