use std::path::{Path, PathBuf};

use nstyle_vgg::VggConfig;

use crate::error::TransferError;

/// How the generated image is initialized before the first round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeedImage {
    /// Start from a copy of the content image.
    Content,
    /// Start from uniform pixel noise drawn with the given seed.
    Noise {
        /// The seed for the noise generator, passed explicitly so that runs are
        /// reproducible.
        seed: u64,
    },
}

/// Configuration of a style transfer run.
///
/// The round count and per-round iteration cap are plain tunables: there is no known
/// convergence criterion beyond exhausting them, and more rounds do not necessarily
/// keep improving the result.
#[derive(Clone, Debug)]
pub struct TransferConfig {
    /// Path to the content image.
    pub content_path: PathBuf,
    /// Path to the style image.
    pub style_path: PathBuf,
    /// Path to the safetensors file with the pretrained network weights.
    pub weights_path: PathBuf,
    /// Directory the round outputs are written to.
    pub output_dir: PathBuf,
    /// Stem of the round-indexed output filenames.
    pub output_stem: String,
    /// Target height of the run; content, style and generated images all share it.
    pub height: usize,
    /// Target width of the run; content, style and generated images all share it.
    pub width: usize,
    /// Weight of the content loss. Deliberately tiny by default: the raw content loss
    /// operates at pixel scale and dwarfs the normalized style loss.
    pub content_weight: f64,
    /// Weight of the averaged style loss.
    pub style_weight: f64,
    /// Number of optimization rounds.
    pub rounds: usize,
    /// Iteration cap of the solver within one round.
    pub iterations_per_round: usize,
    /// Name of the layer the content loss compares at.
    pub content_layer: String,
    /// Names of the layers the style loss averages over, shallow to deep.
    pub style_layers: Vec<String>,
    /// How the generated image is initialized.
    pub seed: SeedImage,
    /// Architecture of the feature extractor.
    pub vgg: VggConfig,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            content_path: PathBuf::new(),
            style_path: PathBuf::new(),
            weights_path: PathBuf::new(),
            output_dir: PathBuf::from("."),
            output_stem: "output".to_string(),
            height: 500,
            width: 500,
            content_weight: 1e-4,
            style_weight: 1.0,
            rounds: 3,
            iterations_per_round: 200,
            content_layer: "block5_conv2".to_string(),
            style_layers: vec![
                "block1_conv1".to_string(),
                "block2_conv1".to_string(),
                "block3_conv1".to_string(),
                "block4_conv1".to_string(),
                "block5_conv1".to_string(),
            ],
            seed: SeedImage::Content,
            vgg: VggConfig::default(),
        }
    }
}

impl TransferConfig {
    /// The output path of the given round.
    pub fn output_path(&self, round: usize) -> PathBuf {
        self.output_dir
            .join(format!("{}_{}.png", self.output_stem, round))
    }

    /// Check the configuration for problems that would only surface mid-run.
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.rounds == 0 {
            return Err(TransferError::InvalidConfig(
                "at least one round is required".to_string(),
            ));
        }
        if self.iterations_per_round == 0 {
            return Err(TransferError::InvalidConfig(
                "at least one iteration per round is required".to_string(),
            ));
        }
        if self.style_layers.is_empty() {
            return Err(TransferError::InvalidConfig(
                "at least one style layer is required".to_string(),
            ));
        }
        if !self.content_weight.is_finite() || !self.style_weight.is_finite() {
            return Err(TransferError::InvalidConfig(
                "loss weights must be finite".to_string(),
            ));
        }
        let min_size = self.vgg.min_spatial_size();
        if self.height < min_size || self.width < min_size {
            return Err(TransferError::InvalidConfig(format!(
                "target resolution {}x{} is below the network minimum of {}",
                self.width, self.height, min_size
            )));
        }

        let known = self.vgg.layer_names();
        let unknown = |name: &String| !known.contains(name);
        if unknown(&self.content_layer) {
            return Err(TransferError::InvalidConfig(format!(
                "unknown content layer {}",
                self.content_layer
            )));
        }
        if let Some(layer) = self.style_layers.iter().find(|l| unknown(*l)) {
            return Err(TransferError::InvalidConfig(format!(
                "unknown style layer {layer}"
            )));
        }

        Ok(())
    }

    /// Convenience constructor for the common case: content, style, weights, defaults
    /// for everything else.
    pub fn from_paths(
        content_path: impl AsRef<Path>,
        style_path: impl AsRef<Path>,
        weights_path: impl AsRef<Path>,
    ) -> Self {
        Self {
            content_path: content_path.as_ref().to_path_buf(),
            style_path: style_path.as_ref().to_path_buf(),
            weights_path: weights_path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TransferConfig;

    #[test]
    fn default_config_is_valid() {
        let config = TransferConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rounds, 3);
        assert_eq!(config.content_layer, "block5_conv2");
        assert_eq!(config.style_layers.len(), 5);
    }

    #[test]
    fn output_paths_are_round_indexed() {
        let config = TransferConfig {
            output_dir: "/tmp/run".into(),
            ..Default::default()
        };
        assert_eq!(
            config.output_path(2),
            std::path::PathBuf::from("/tmp/run/output_2.png")
        );
    }

    #[test]
    fn zero_rounds_is_rejected() {
        let config = TransferConfig {
            rounds: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_layers_are_rejected() {
        let config = TransferConfig {
            content_layer: "block9_conv9".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TransferConfig {
            style_layers: vec!["nope".to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn too_small_resolution_is_rejected() {
        let config = TransferConfig {
            height: 8,
            width: 8,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
