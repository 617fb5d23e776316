/// An error type for the transfer module.
#[derive(thiserror::Error, Debug)]
pub enum TransferError {
    /// Error to read or write an image file.
    #[error("Failed to read or write an image. {0}")]
    Io(#[from] nstyle_io::IoError),

    /// Error to manipulate image data.
    #[error("Failed to manipulate image data. {0}")]
    Image(#[from] nstyle_image::ImageError),

    /// Error from the feature extractor or the loss model.
    #[error("Feature extraction failed. {0}")]
    Feature(#[from] nstyle_vgg::FeatureError),

    /// Error from the underlying tensor library.
    #[error(transparent)]
    Candle(#[from] candle_core::Error),

    /// Error when the content and style tensors are not shape-compatible.
    #[error("Content and style tensors have incompatible shapes: {content:?} vs {style:?}")]
    ShapeMismatch {
        /// Shape of the content tensor.
        content: Vec<usize>,
        /// Shape of the style tensor.
        style: Vec<usize>,
    },

    /// Error when the configuration is not valid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Error when the loss or gradient becomes non-finite during optimization.
    #[error("Loss or gradient became non-finite during round {round}")]
    NumericInstability {
        /// The round in which the instability appeared.
        round: usize,
    },

    /// Error when the solver rejects the problem.
    #[error("Optimizer failed: {0}")]
    Optimizer(String),

    /// Error when no gradient was produced for the generated image.
    #[error("The gradient for the generated image is missing")]
    MissingGradient,
}
