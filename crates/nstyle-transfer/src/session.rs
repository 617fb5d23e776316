use std::path::PathBuf;

use candle_core::{Device, Tensor};
use rand::{rngs::StdRng, Rng, SeedableRng};

use nstyle_image::{Image, ImageSize};
use nstyle_imgproc::{interpolation::InterpolationMode, resize::resize_native};
use nstyle_io::{functional::read_image_rgb8, png::write_image_png_rgb8};
use nstyle_optim::{lbfgs, LbfgsConfig, LbfgsError};
use nstyle_vgg::{to_image, to_network_tensor, VggFeatures};

use crate::config::{SeedImage, TransferConfig};
use crate::error::TransferError;
use crate::objective::TransferObjective;

/// The stage a transfer session is in.
///
/// A session moves strictly forward: images are loaded, preprocessed into network
/// tensors, optimized round by round and finally the session is done.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// The session was created but has not started.
    Created,
    /// The input images were decoded.
    Loaded,
    /// The inputs were resized and converted to network tensors.
    Preprocessed,
    /// The solver is running the given round.
    Optimizing(usize),
    /// The given round finished and its output was persisted.
    RoundComplete(usize),
    /// All rounds finished.
    Done,
}

/// A single-shot style transfer session.
///
/// The session exclusively owns the evolving generated-pixel vector; it is the only
/// writer, and mutation only happens between solver invocations.
pub struct StyleTransfer {
    config: TransferConfig,
    stage: Stage,
}

impl StyleTransfer {
    /// Create a new session with the given configuration.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is not valid.
    pub fn new(config: TransferConfig) -> Result<Self, TransferError> {
        config.validate()?;
        Ok(Self {
            config,
            stage: Stage::Created,
        })
    }

    /// The stage the session is currently in.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Run the full transfer and return the paths of the persisted round outputs.
    ///
    /// # Errors
    ///
    /// No failure is recovered locally: the first fatal condition aborts the run with a
    /// diagnostic naming the stage it happened in. Either a round completes and its
    /// output is persisted, or the run terminates without producing further outputs.
    pub fn run(&mut self) -> Result<Vec<PathBuf>, TransferError> {
        match self.run_inner() {
            Ok(outputs) => Ok(outputs),
            Err(e) => {
                log::error!("style transfer failed during {:?}: {}", self.stage, e);
                Err(e)
            }
        }
    }

    fn run_inner(&mut self) -> Result<Vec<PathBuf>, TransferError> {
        let config = self.config.clone();
        let device = Device::Cpu;
        let size = ImageSize {
            width: config.width,
            height: config.height,
        };

        log::info!("loading content image {:?}", config.content_path);
        let content_image = read_image_rgb8(&config.content_path)?;
        log::info!("loading style image {:?}", config.style_path);
        let style_image = read_image_rgb8(&config.style_path)?;
        self.stage = Stage::Loaded;

        let content = preprocess(&content_image, size, &device)?;
        let style = preprocess(&style_image, size, &device)?;
        let seed = match config.seed {
            SeedImage::Content => content.clone(),
            SeedImage::Noise { seed } => to_network_tensor(&noise_image(size, seed)?, &device)?,
        };

        // the extractor requires shape-compatible inputs at every layer; check here so
        // that a mismatch never reaches it
        if content.dims() != style.dims() {
            return Err(TransferError::ShapeMismatch {
                content: content.dims().to_vec(),
                style: style.dims().to_vec(),
            });
        }
        self.stage = Stage::Preprocessed;

        log::info!("loading network weights {:?}", config.weights_path);
        let extractor = VggFeatures::from_safetensors(&config.weights_path, &config.vgg, &device)?;

        let objective = TransferObjective::new(
            &extractor,
            &content,
            &style,
            &config.content_layer,
            &config.style_layers,
            config.content_weight,
            config.style_weight,
        )?;

        let solver_config = LbfgsConfig {
            max_iterations: config.iterations_per_round,
            ..Default::default()
        };

        std::fs::create_dir_all(&config.output_dir).map_err(nstyle_io::IoError::from)?;

        let mut x = seed.contiguous()?.flatten_all()?.to_vec1::<f32>()?;
        let mut outputs = Vec::with_capacity(config.rounds);

        for round in 0..config.rounds {
            self.stage = Stage::Optimizing(round);
            log::info!("round {}/{}", round + 1, config.rounds);

            let minimum = lbfgs::minimize(&objective, x, &solver_config).map_err(|e| match e {
                LbfgsError::Objective(inner) => inner,
                LbfgsError::NonFinite { .. } => TransferError::NumericInstability { round },
                other => TransferError::Optimizer(other.to_string()),
            })?;
            log::info!(
                "round {}/{} finished: loss {:.6e} after {} iterations ({:?})",
                round + 1,
                config.rounds,
                minimum.loss,
                minimum.iterations,
                minimum.reason
            );
            self.stage = Stage::RoundComplete(round);

            // persist the round result and carry the vector into the next round
            x = minimum.x;
            let tensor = Tensor::from_slice(&x, (1, config.height, config.width, 3), &device)?;
            let image = to_image(&tensor)?;
            let path = config.output_path(round);
            write_image_png_rgb8(&path, &image)?;
            log::info!("saved {:?}", path);
            outputs.push(path);
        }

        self.stage = Stage::Done;
        Ok(outputs)
    }
}

/// Cast, resize and mean-center one input image into a network tensor.
fn preprocess(
    image: &Image<u8, 3>,
    size: ImageSize,
    device: &Device,
) -> Result<Tensor, TransferError> {
    let image = image.cast::<f32>()?;
    let mut resized = Image::<f32, 3>::from_size_val(size, 0.0)?;
    resize_native(&image, &mut resized, InterpolationMode::Bilinear)?;
    Ok(to_network_tensor(&resized, device)?)
}

/// Uniform pixel noise in the display range, drawn from an explicitly seeded generator.
fn noise_image(size: ImageSize, seed: u64) -> Result<Image<f32, 3>, TransferError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let data = (0..size.width * size.height * 3)
        .map(|_| rng.random_range(0.0f32..=255.0))
        .collect();
    Ok(Image::new(size, data)?)
}

#[cfg(test)]
mod tests {
    use super::{noise_image, preprocess, Stage, StyleTransfer};
    use crate::config::TransferConfig;
    use crate::error::TransferError;
    use candle_core::Device;
    use nstyle_image::{Image, ImageSize};

    #[test]
    fn new_session_is_created() -> Result<(), TransferError> {
        let session = StyleTransfer::new(TransferConfig::default())?;
        assert_eq!(session.stage(), Stage::Created);
        Ok(())
    }

    #[test]
    fn missing_content_file_aborts_before_optimizing() -> Result<(), TransferError> {
        let mut session = StyleTransfer::new(TransferConfig::default())?;
        let result = session.run();
        assert!(matches!(result, Err(TransferError::Io(_))));
        assert_eq!(session.stage(), Stage::Created);
        Ok(())
    }

    #[test]
    fn preprocess_produces_target_shape() -> Result<(), TransferError> {
        let image = Image::<u8, 3>::from_size_val(
            ImageSize {
                width: 10,
                height: 7,
            },
            200,
        )?;
        let size = ImageSize {
            width: 4,
            height: 6,
        };

        let tensor = preprocess(&image, size, &Device::Cpu)?;
        assert_eq!(tensor.dims(), &[1, 6, 4, 3]);

        Ok(())
    }

    #[test]
    fn noise_is_deterministic_per_seed() -> Result<(), TransferError> {
        let size = ImageSize {
            width: 3,
            height: 3,
        };
        let a = noise_image(size, 1618)?;
        let b = noise_image(size, 1618)?;
        let c = noise_image(size, 42)?;

        assert_eq!(a.as_slice(), b.as_slice());
        assert_ne!(a.as_slice(), c.as_slice());
        for &v in a.as_slice() {
            assert!((0.0..=255.0).contains(&v));
        }

        Ok(())
    }
}
