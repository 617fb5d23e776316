use candle_core::{Device, Tensor};
use nstyle_image::{Image, ImageDtype, ImageSize};

use crate::error::FeatureError;

/// Per-channel means of the VGG training distribution, in BGR order.
///
/// The network was trained on mean-centered BGR inputs, so the same constants must be
/// subtracted on the way in and added back on the way out.
pub const BGR_MEAN: [f32; 3] = [103.939, 116.779, 123.68];

/// Convert an RGB image into a network input tensor.
///
/// Adds a batch dimension of size 1, reverses the channel order to BGR and subtracts the
/// per-channel means of the network's training distribution. The output shape is
/// `(1, H, W, 3)`.
///
/// This transform must match the extractor's preprocessing convention exactly; a
/// mismatch does not error, it silently degrades the transfer quality.
///
/// # Arguments
///
/// * `image` - The input RGB image.
/// * `device` - The device to allocate the tensor on.
pub fn to_network_tensor(image: &Image<f32, 3>, device: &Device) -> Result<Tensor, FeatureError> {
    let (height, width) = (image.height(), image.width());

    let mut data = Vec::with_capacity(height * width * 3);
    for pixel in image.as_slice().chunks_exact(3) {
        data.push(pixel[2] - BGR_MEAN[0]);
        data.push(pixel[1] - BGR_MEAN[1]);
        data.push(pixel[0] - BGR_MEAN[2]);
    }

    Ok(Tensor::from_vec(data, (1, height, width, 3), device)?)
}

/// Convert a network tensor back into a displayable RGB image.
///
/// The exact inverse of [`to_network_tensor`]: adds the per-channel means back, reverses
/// the channel order to RGB and clips to the valid display range [0, 255]. The input must
/// have shape `(1, H, W, 3)`.
///
/// # Arguments
///
/// * `tensor` - The network tensor to convert.
pub fn to_image(tensor: &Tensor) -> Result<Image<u8, 3>, FeatureError> {
    let (batch, height, width, channels) = tensor.dims4()?;
    if batch != 1 || channels != 3 {
        return Err(FeatureError::InvalidShape {
            actual: tensor.dims().to_vec(),
            expected: "(1, H, W, 3)".to_string(),
        });
    }

    let data = tensor.contiguous()?.flatten_all()?.to_vec1::<f32>()?;

    let mut out = Vec::with_capacity(height * width * 3);
    for pixel in data.chunks_exact(3) {
        let b = pixel[0] + BGR_MEAN[0];
        let g = pixel[1] + BGR_MEAN[1];
        let r = pixel[2] + BGR_MEAN[2];
        out.push(u8::from_f32(r));
        out.push(u8::from_f32(g));
        out.push(u8::from_f32(b));
    }

    Ok(Image::new(ImageSize { width, height }, out)?)
}

#[cfg(test)]
mod tests {
    use super::{to_image, to_network_tensor, BGR_MEAN};
    use crate::error::FeatureError;
    use candle_core::Device;
    use nstyle_image::{Image, ImageSize};

    #[test]
    fn network_tensor_shape() -> Result<(), FeatureError> {
        let image = Image::<f32, 3>::from_size_val(
            ImageSize {
                width: 5,
                height: 4,
            },
            127.0,
        )?;

        let tensor = to_network_tensor(&image, &Device::Cpu)?;
        assert_eq!(tensor.dims(), &[1, 4, 5, 3]);

        Ok(())
    }

    #[test]
    fn mean_centering_and_channel_order() -> Result<(), FeatureError> {
        // a single red pixel
        let image = Image::<f32, 3>::new(
            ImageSize {
                width: 1,
                height: 1,
            },
            vec![255.0, 0.0, 0.0],
        )?;

        let tensor = to_network_tensor(&image, &Device::Cpu)?;
        let values = tensor.flatten_all()?.to_vec1::<f32>()?;

        // BGR order: blue first, red last
        assert_eq!(values[0], 0.0 - BGR_MEAN[0]);
        assert_eq!(values[1], 0.0 - BGR_MEAN[1]);
        assert_eq!(values[2], 255.0 - BGR_MEAN[2]);

        Ok(())
    }

    #[test]
    fn round_trip_is_lossless() -> Result<(), FeatureError> {
        let size = ImageSize {
            width: 6,
            height: 4,
        };
        let data: Vec<u8> = (0..6 * 4 * 3).map(|i| (i * 11 % 256) as u8).collect();
        let image = Image::<u8, 3>::new(size, data)?;

        let tensor = to_network_tensor(&image.cast::<f32>()?, &Device::Cpu)?;
        let image_back = to_image(&tensor)?;

        assert_eq!(image_back.size(), size);
        assert_eq!(image_back.as_slice(), image.as_slice());

        Ok(())
    }

    #[test]
    fn out_of_range_values_are_clipped() -> Result<(), FeatureError> {
        // pixels may transiently leave the display range during optimization; clipping
        // happens here, at output time
        let tensor = candle_core::Tensor::from_vec(
            vec![500.0f32, -500.0, 0.0],
            (1, 1, 1, 3),
            &Device::Cpu,
        )?;

        let image = to_image(&tensor)?;
        assert_eq!(image.as_slice()[0], 124); // red: 0.0 + mean, in range
        assert_eq!(image.as_slice()[1], 0); // green: -500 + mean, clipped low
        assert_eq!(image.as_slice()[2], 255); // blue: 500 + mean, clipped high

        Ok(())
    }

    #[test]
    fn rejects_wrong_shape() -> Result<(), FeatureError> {
        let tensor = candle_core::Tensor::zeros((2, 2, 2, 3), candle_core::DType::F32, &Device::Cpu)?;
        assert!(to_image(&tensor).is_err());

        Ok(())
    }
}
