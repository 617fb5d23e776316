#![deny(missing_docs)]
//! Frozen VGG-19 feature extraction and style transfer losses on candle tensors.
//!
//! The network is consumed as a black-box differentiable feature extractor: weights are
//! loaded once from a safetensors file and never updated. A single forward pass over a
//! stacked batch of three images (content, style, generated) yields every named
//! intermediate activation, and candle's reverse-mode autodiff provides the gradient of
//! the composite loss with respect to the generated pixels.

/// The frozen convolutional feature extractor.
pub mod features;

/// Content, style and Gram-matrix losses.
pub mod loss;

/// Conversions between images and network tensors.
pub mod preprocess;

/// Error types for the vgg module.
pub mod error;

pub use crate::error::FeatureError;
pub use crate::features::{BlockConfig, FeatureMaps, VggConfig, VggFeatures};
pub use crate::preprocess::{to_image, to_network_tensor, BGR_MEAN};
