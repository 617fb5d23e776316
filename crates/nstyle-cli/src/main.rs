use clap::Parser;
use std::path::PathBuf;

use nstyle_transfer::{SeedImage, StyleTransfer, TransferConfig};

#[derive(Parser)]
#[command(name = "nstyle", about = "Neural style transfer")]
struct Args {
    /// Path to the content image
    #[arg(long)]
    content: PathBuf,

    /// Path to the style image
    #[arg(long)]
    style: PathBuf,

    /// Path to the VGG-19 safetensors weights
    #[arg(long)]
    weights: PathBuf,

    /// Directory the round outputs are written to
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Stem of the round-indexed output filenames
    #[arg(long, default_value = "output")]
    output_stem: String,

    /// Target height in pixels
    #[arg(long, default_value_t = 500)]
    height: usize,

    /// Target width in pixels
    #[arg(long, default_value_t = 500)]
    width: usize,

    /// Weight of the content loss
    #[arg(long, default_value_t = 1e-4)]
    content_weight: f64,

    /// Weight of the style loss
    #[arg(long, default_value_t = 1.0)]
    style_weight: f64,

    /// Number of optimization rounds
    #[arg(long, default_value_t = 3)]
    rounds: usize,

    /// Iteration cap of the solver within one round
    #[arg(long, default_value_t = 200)]
    iterations: usize,

    /// Start from seeded pixel noise instead of a copy of the content image
    #[arg(long)]
    noise_seed: Option<u64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = TransferConfig {
        content_path: args.content,
        style_path: args.style,
        weights_path: args.weights,
        output_dir: args.output_dir,
        output_stem: args.output_stem,
        height: args.height,
        width: args.width,
        content_weight: args.content_weight,
        style_weight: args.style_weight,
        rounds: args.rounds,
        iterations_per_round: args.iterations,
        seed: match args.noise_seed {
            Some(seed) => SeedImage::Noise { seed },
            None => SeedImage::Content,
        },
        ..Default::default()
    };

    let mut session = StyleTransfer::new(config)?;
    let outputs = session.run()?;
    log::info!("transfer complete: {} output(s)", outputs.len());

    Ok(())
}
