use candle_core::{IndexOp, Tensor, Var};
use nstyle_optim::LossAndGrad;
use nstyle_vgg::{
    loss::{content_loss, style_loss},
    VggFeatures,
};

use crate::error::TransferError;

/// The composite style transfer loss, evaluated at a flat pixel vector.
///
/// The objective owns references to everything an evaluation needs (the frozen
/// extractor, the fixed content and style tensors, the layer selection and the loss
/// weights), so that the solver can treat it as a stateless function of the pixel
/// vector. Every evaluation rebuilds the generated tensor from the vector, runs one
/// forward pass over the stacked batch of three and differentiates the total loss back
/// to the pixels.
pub struct TransferObjective<'a> {
    extractor: &'a VggFeatures,
    content: &'a Tensor,
    style: &'a Tensor,
    height: usize,
    width: usize,
    content_layer: &'a str,
    style_layers: &'a [String],
    content_weight: f64,
    style_weight: f64,
}

impl<'a> TransferObjective<'a> {
    /// Create an objective bound to fixed content and style tensors.
    ///
    /// # Arguments
    ///
    /// * `extractor` - The frozen feature extractor.
    /// * `content` - The content image as a `(1, H, W, 3)` network tensor.
    /// * `style` - The style image as a network tensor of the same shape.
    /// * `content_layer` - The layer the content loss compares at.
    /// * `style_layers` - The layers the style loss averages over.
    /// * `content_weight` - Weight of the content loss.
    /// * `style_weight` - Weight of the averaged style loss.
    ///
    /// # Errors
    ///
    /// Fails if the tensors are not shape-compatible or no style layer is given.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        extractor: &'a VggFeatures,
        content: &'a Tensor,
        style: &'a Tensor,
        content_layer: &'a str,
        style_layers: &'a [String],
        content_weight: f64,
        style_weight: f64,
    ) -> Result<Self, TransferError> {
        if content.dims() != style.dims() {
            return Err(TransferError::ShapeMismatch {
                content: content.dims().to_vec(),
                style: style.dims().to_vec(),
            });
        }
        let (batch, height, width, channels) = content.dims4()?;
        if batch != 1 || channels != 3 {
            return Err(TransferError::ShapeMismatch {
                content: content.dims().to_vec(),
                style: style.dims().to_vec(),
            });
        }
        if style_layers.is_empty() {
            return Err(TransferError::InvalidConfig(
                "at least one style layer is required".to_string(),
            ));
        }

        Ok(Self {
            extractor,
            content,
            style,
            height,
            width,
            content_layer,
            style_layers,
            content_weight,
            style_weight,
        })
    }
}

impl LossAndGrad for TransferObjective<'_> {
    type Error = TransferError;

    fn evaluate(&self, x: &[f32]) -> Result<(f32, Vec<f32>), TransferError> {
        // the generated image is the only variable in the graph; content and style
        // stay constants
        let generated = Var::from_tensor(&Tensor::from_slice(
            x,
            (1, self.height, self.width, 3),
            self.content.device(),
        )?)?;
        let batch = Tensor::cat(&[self.content, self.style, generated.as_tensor()], 0)?;

        let maps = self.extractor.forward(&batch)?;

        let activation = maps.get(self.content_layer)?;
        let content = content_loss(&activation.i(0)?, &activation.i(2)?)?;

        let mut style_total: Option<Tensor> = None;
        for layer in self.style_layers {
            let activation = maps.get(layer)?;
            let layer_loss = style_loss(&activation.i(1)?, &activation.i(2)?)?;
            style_total = Some(match style_total {
                Some(acc) => (acc + layer_loss)?,
                None => layer_loss,
            });
        }
        let style_total = style_total.ok_or_else(|| {
            TransferError::InvalidConfig("at least one style layer is required".to_string())
        })?;
        let style_mean = (style_total / self.style_layers.len() as f64)?;

        let total = ((content * self.content_weight)? + (style_mean * self.style_weight)?)?;

        let loss = total.to_scalar::<f32>()?;
        let grads = total.backward()?;
        let gradient = grads
            .get(generated.as_tensor())
            .ok_or(TransferError::MissingGradient)?
            .contiguous()?
            .flatten_all()?
            .to_vec1::<f32>()?;

        Ok((loss, gradient))
    }
}
