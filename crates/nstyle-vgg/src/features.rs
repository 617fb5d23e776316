use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::{conv2d, Conv2d, Conv2dConfig, Module, VarBuilder};

use crate::error::FeatureError;

/// One convolutional block of the backbone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockConfig {
    /// Number of 3x3 convolutions in the block.
    pub convs: usize,
    /// Number of output channels of every convolution in the block.
    pub channels: usize,
}

/// Architecture of the convolutional backbone.
///
/// The default is the VGG-19 feature stack. Smaller configurations are useful for tests
/// and quick experiments; the weight keys always follow the torchvision flat
/// `features.{index}.{weight,bias}` naming so that exported VGG-19 checkpoints load
/// without renaming.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VggConfig {
    /// The convolutional blocks, shallow to deep. A 2x2 max-pool separates consecutive
    /// blocks.
    pub blocks: Vec<BlockConfig>,
}

impl Default for VggConfig {
    fn default() -> Self {
        Self {
            blocks: vec![
                BlockConfig {
                    convs: 2,
                    channels: 64,
                },
                BlockConfig {
                    convs: 2,
                    channels: 128,
                },
                BlockConfig {
                    convs: 4,
                    channels: 256,
                },
                BlockConfig {
                    convs: 4,
                    channels: 512,
                },
                BlockConfig {
                    convs: 4,
                    channels: 512,
                },
            ],
        }
    }
}

impl VggConfig {
    /// The names of all activation layers of this configuration, shallow to deep.
    pub fn layer_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for (b, block) in self.blocks.iter().enumerate() {
            for c in 0..block.convs {
                names.push(format!("block{}_conv{}", b + 1, c + 1));
            }
        }
        names
    }

    /// The minimum spatial extent an input must have so that every pooling stage
    /// produces a non-empty feature map.
    pub fn min_spatial_size(&self) -> usize {
        1 << self.blocks.len().saturating_sub(1)
    }

    fn validate(&self) -> Result<(), FeatureError> {
        if self.blocks.is_empty() {
            return Err(FeatureError::InvalidConfig(
                "the network needs at least one block".to_string(),
            ));
        }
        for block in &self.blocks {
            if block.convs == 0 || block.channels == 0 {
                return Err(FeatureError::InvalidConfig(
                    "blocks need at least one convolution and one channel".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Named intermediate activations produced by one forward pass.
///
/// Every tensor has shape `(3, C, H', W')` with the fixed batch order content=0,
/// style=1, generated=2. The maps are recomputed fresh on every loss/gradient query
/// since the generated slice changes between queries.
pub struct FeatureMaps(HashMap<String, Tensor>);

impl FeatureMaps {
    /// Get the activation of the layer with the given name.
    ///
    /// # Errors
    ///
    /// If the layer name is not part of the network, an error is returned.
    pub fn get(&self, name: &str) -> Result<&Tensor, FeatureError> {
        self.0
            .get(name)
            .ok_or_else(|| FeatureError::UnknownLayer(name.to_string()))
    }

    /// The number of recorded activation layers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no activations were recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

struct ConvLayer {
    name: String,
    conv: Conv2d,
}

/// A frozen, pretrained convolutional feature extractor.
///
/// The network is treated as a pure differentiable function from a batch of images to
/// named activations: the weights are loaded once and never exposed for mutation, and
/// `forward` has no side effects. Gradients with respect to the input pixels are
/// available through candle's reverse-mode autodiff when the input tracks a variable.
pub struct VggFeatures {
    blocks: Vec<Vec<ConvLayer>>,
    min_spatial: usize,
}

impl VggFeatures {
    /// Build the extractor from an already opened variable store.
    ///
    /// # Arguments
    ///
    /// * `vb` - The variable builder holding the pretrained weights.
    /// * `config` - The architecture of the backbone.
    pub fn new(vb: VarBuilder, config: &VggConfig) -> Result<Self, FeatureError> {
        config.validate()?;

        let vb = vb.pp("features");
        let mut blocks = Vec::with_capacity(config.blocks.len());

        // weight keys are indexed the way torchvision flattens the feature stack:
        // every convolution takes two slots (conv, relu), every pool takes one
        let mut index = 0;
        let mut in_channels = 3;
        for (b, block) in config.blocks.iter().enumerate() {
            let mut layers = Vec::with_capacity(block.convs);
            for c in 0..block.convs {
                let conv = conv2d(
                    in_channels,
                    block.channels,
                    3,
                    Conv2dConfig {
                        padding: 1,
                        ..Default::default()
                    },
                    vb.pp(index.to_string()),
                )?;
                layers.push(ConvLayer {
                    name: format!("block{}_conv{}", b + 1, c + 1),
                    conv,
                });
                index += 2;
                in_channels = block.channels;
            }
            index += 1; // pool slot
            blocks.push(layers);
        }

        log::debug!(
            "feature extractor ready: {} blocks, {} activation layers",
            blocks.len(),
            blocks.iter().map(Vec::len).sum::<usize>()
        );

        Ok(Self {
            blocks,
            min_spatial: config.min_spatial_size(),
        })
    }

    /// Build the extractor from a safetensors weights file.
    ///
    /// The file is memory mapped; the weights are used read-only for the lifetime of the
    /// extractor.
    ///
    /// # Arguments
    ///
    /// * `weights_path` - The path to the safetensors file.
    /// * `config` - The architecture of the backbone.
    /// * `device` - The device to run the network on.
    pub fn from_safetensors(
        weights_path: impl AsRef<Path>,
        config: &VggConfig,
        device: &Device,
    ) -> Result<Self, FeatureError> {
        let weights_path = weights_path.as_ref();
        if !weights_path.exists() {
            return Err(FeatureError::WeightsNotFound(weights_path.to_path_buf()));
        }

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, device)?
        };

        Self::new(vb, config)
    }

    /// Run one forward pass over a stacked batch and record every named activation.
    ///
    /// # Arguments
    ///
    /// * `batch` - A `(N, H, W, 3)` tensor, mean-centered BGR as produced by
    ///   [`crate::preprocess::to_network_tensor`]. For style transfer N is 3 with the
    ///   fixed order content, style, generated.
    ///
    /// # Returns
    ///
    /// The named activations, each of shape `(N, C, H', W')`, recorded after the ReLU of
    /// every convolution.
    pub fn forward(&self, batch: &Tensor) -> Result<FeatureMaps, FeatureError> {
        let (_, height, width, channels) = batch.dims4()?;
        if channels != 3 {
            return Err(FeatureError::InvalidShape {
                actual: batch.dims().to_vec(),
                expected: "(N, H, W, 3)".to_string(),
            });
        }
        if height < self.min_spatial || width < self.min_spatial {
            return Err(FeatureError::InvalidShape {
                actual: batch.dims().to_vec(),
                expected: format!(
                    "spatial dimensions of at least {} for {} pooling stages",
                    self.min_spatial,
                    self.blocks.len() - 1
                ),
            });
        }

        // the network convolves in channels-first layout
        let mut x = batch.permute((0, 3, 1, 2))?.contiguous()?;

        let mut maps = HashMap::new();
        for (b, block) in self.blocks.iter().enumerate() {
            for layer in block {
                x = layer.conv.forward(&x)?.relu()?;
                maps.insert(layer.name.clone(), x.clone());
            }
            if b + 1 < self.blocks.len() {
                x = x.max_pool2d(2)?;
            }
        }

        Ok(FeatureMaps(maps))
    }
}
