use candle_core::Tensor;

use crate::error::FeatureError;

/// Compute the Gram matrix of an activation tensor.
///
/// The spatial dimensions are flattened per channel and the channel vectors are
/// multiplied with their own transpose, yielding a `(C, C)` channel-correlation matrix.
/// The result summarizes the texture statistics of the layer and is invariant to the
/// spatial arrangement of the features.
///
/// # Arguments
///
/// * `activation` - An activation tensor of shape `(C, H, W)`.
pub fn gram_matrix(activation: &Tensor) -> Result<Tensor, FeatureError> {
    let (channels, height, width) = activation.dims3()?;
    let features = activation.contiguous()?.reshape((channels, height * width))?;
    Ok(features.matmul(&features.t()?)?)
}

/// Compute the content loss between two activation tensors.
///
/// The sum of squared element-wise differences: zero when the activations are identical,
/// unbounded above.
///
/// # Arguments
///
/// * `content` - The content image's activation at the content layer, `(C, H, W)`.
/// * `generated` - The generated image's activation at the same layer, `(C, H, W)`.
pub fn content_loss(content: &Tensor, generated: &Tensor) -> Result<Tensor, FeatureError> {
    Ok(generated.sub(content)?.sqr()?.sum_all()?)
}

/// Compute the style loss between two activation tensors.
///
/// The sum of squared differences between the two Gram matrices, normalized by
/// `4 * C^2 * (H * W)^2` so that the magnitude is independent of layer size and
/// resolution. Without the normalization the loss scales with the image area and
/// comparisons across layers become invalid.
///
/// # Arguments
///
/// * `style` - The style image's activation at a style layer, `(C, H, W)`.
/// * `generated` - The generated image's activation at the same layer, `(C, H, W)`.
pub fn style_loss(style: &Tensor, generated: &Tensor) -> Result<Tensor, FeatureError> {
    let (channels, height, width) = style.dims3()?;
    if style.dims() != generated.dims() {
        return Err(FeatureError::InvalidShape {
            actual: generated.dims().to_vec(),
            expected: format!("{:?}", style.dims()),
        });
    }

    let gram_style = gram_matrix(style)?;
    let gram_generated = gram_matrix(generated)?;

    let numerator = gram_style.sub(&gram_generated)?.sqr()?.sum_all()?;
    let denominator =
        4.0 * (channels * channels) as f64 * ((height * width) as f64) * ((height * width) as f64);

    Ok((numerator / denominator)?)
}
