use rayon::prelude::*;

use nstyle_image::{Image, ImageDtype, ImageError};

use crate::interpolation::{interpolate_pixel, InterpolationMode};

/// Resize an image to a new size.
///
/// The function resizes an image to the exact size of the destination image using the
/// specified interpolation mode. It supports any number of channels and data types and is
/// deterministic for a given input.
///
/// # Arguments
///
/// * `src` - The input image container.
/// * `dst` - The output image container.
/// * `interpolation` - The interpolation mode to use.
///
/// # Example
///
/// ```
/// use nstyle_image::{Image, ImageSize};
/// use nstyle_imgproc::resize::resize_native;
/// use nstyle_imgproc::interpolation::InterpolationMode;
///
/// let image = Image::<_, 3>::new(
///     ImageSize {
///         width: 4,
///         height: 5,
///     },
///     vec![0f32; 4 * 5 * 3],
/// )
/// .unwrap();
///
/// let new_size = ImageSize {
///     width: 2,
///     height: 3,
/// };
///
/// let mut image_resized = Image::<_, 3>::from_size_val(new_size, 0.0).unwrap();
///
/// resize_native(
///     &image,
///     &mut image_resized,
///     InterpolationMode::Bilinear,
/// )
/// .unwrap();
///
/// assert_eq!(image_resized.num_channels(), 3);
/// assert_eq!(image_resized.size().width, 2);
/// assert_eq!(image_resized.size().height, 3);
/// ```
pub fn resize_native<T, const CHANNELS: usize>(
    src: &Image<T, CHANNELS>,
    dst: &mut Image<T, CHANNELS>,
    interpolation: InterpolationMode,
) -> Result<(), ImageError>
where
    T: ImageDtype,
{
    if src.width() == 0 || src.height() == 0 || dst.width() == 0 || dst.height() == 0 {
        return Err(ImageError::InvalidImageSize(
            src.width(),
            src.height(),
            dst.width(),
            dst.height(),
        ));
    }

    // map every output coordinate onto the input grid, spanning the full range
    // of the source like a linspace over [0, src - 1]
    let step = |src_len: usize, dst_len: usize| -> f32 {
        if dst_len > 1 {
            (src_len - 1) as f32 / (dst_len - 1) as f32
        } else {
            0.0
        }
    };
    let u_step = step(src.width(), dst.width());
    let v_step = step(src.height(), dst.height());

    let dst_width = dst.width();

    // iterate over the output rows and interpolate the pixel values
    dst.as_slice_mut()
        .par_chunks_exact_mut(dst_width * CHANNELS)
        .enumerate()
        .for_each(|(row, out)| {
            let v = row as f32 * v_step;
            for col in 0..dst_width {
                let u = col as f32 * u_step;
                let pixel = interpolate_pixel(src, u, v, interpolation);
                for (k, val) in pixel.iter().enumerate() {
                    out[col * CHANNELS + k] = T::from_f32(*val);
                }
            }
        });

    Ok(())
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nstyle_image::{Image, ImageError, ImageSize};

    #[test]
    fn resize_smoke_ch3() -> Result<(), ImageError> {
        let image = Image::<_, 3>::new(
            ImageSize {
                width: 4,
                height: 5,
            },
            vec![0f32; 4 * 5 * 3],
        )?;

        let new_size = ImageSize {
            width: 2,
            height: 3,
        };

        let mut image_resized = Image::<_, 3>::from_size_val(new_size, 0.0)?;

        super::resize_native(
            &image,
            &mut image_resized,
            super::InterpolationMode::Bilinear,
        )?;

        assert_eq!(image_resized.num_channels(), 3);
        assert_eq!(image_resized.size().width, 2);
        assert_eq!(image_resized.size().height, 3);
        Ok(())
    }

    #[test]
    fn resize_identity() -> Result<(), ImageError> {
        let data: Vec<f32> = (0..2 * 3 * 3).map(|i| i as f32).collect();
        let image = Image::<_, 3>::new(
            ImageSize {
                width: 3,
                height: 2,
            },
            data.clone(),
        )?;

        let mut image_resized = Image::<_, 3>::from_size_val(image.size(), 0.0)?;

        super::resize_native(
            &image,
            &mut image_resized,
            super::InterpolationMode::Bilinear,
        )?;

        for (a, b) in image_resized.as_slice().iter().zip(data.iter()) {
            assert_relative_eq!(a, b);
        }
        Ok(())
    }

    #[test]
    fn resize_upscale_interpolates() -> Result<(), ImageError> {
        // a 1x2 image upscaled to 1x3 must place the midpoint between the endpoints
        let image = Image::<_, 1>::new(
            ImageSize {
                width: 2,
                height: 1,
            },
            vec![0.0f32, 2.0],
        )?;

        let mut image_resized = Image::<_, 1>::from_size_val(
            ImageSize {
                width: 3,
                height: 1,
            },
            0.0,
        )?;

        super::resize_native(
            &image,
            &mut image_resized,
            super::InterpolationMode::Bilinear,
        )?;

        assert_relative_eq!(image_resized.as_slice()[0], 0.0);
        assert_relative_eq!(image_resized.as_slice()[1], 1.0);
        assert_relative_eq!(image_resized.as_slice()[2], 2.0);
        Ok(())
    }

    #[test]
    fn resize_smoke_u8() -> Result<(), ImageError> {
        let image = Image::<u8, 3>::new(
            ImageSize {
                width: 4,
                height: 5,
            },
            vec![128u8; 4 * 5 * 3],
        )?;

        let mut image_resized = Image::<u8, 3>::from_size_val(
            ImageSize {
                width: 2,
                height: 3,
            },
            0,
        )?;

        super::resize_native(
            &image,
            &mut image_resized,
            super::InterpolationMode::Nearest,
        )?;

        assert_eq!(image_resized.as_slice(), vec![128u8; 2 * 3 * 3].as_slice());
        Ok(())
    }

    #[test]
    fn resize_empty_is_an_error() -> Result<(), ImageError> {
        let image = Image::<f32, 1>::new(
            ImageSize {
                width: 0,
                height: 0,
            },
            vec![],
        )?;

        let mut image_resized = Image::<f32, 1>::from_size_val(
            ImageSize {
                width: 2,
                height: 2,
            },
            0.0,
        )?;

        let res = super::resize_native(
            &image,
            &mut image_resized,
            super::InterpolationMode::Bilinear,
        );
        assert!(res.is_err());
        Ok(())
    }
}
