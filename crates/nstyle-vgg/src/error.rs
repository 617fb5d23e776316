/// An error type for the feature extraction module.
#[derive(thiserror::Error, Debug)]
pub enum FeatureError {
    /// Error when the weights file does not exist.
    #[error("Weights file does not exist: {0}")]
    WeightsNotFound(std::path::PathBuf),

    /// Error when the network configuration is not valid.
    #[error("Invalid network configuration: {0}")]
    InvalidConfig(String),

    /// Error when an input tensor does not have the expected shape.
    #[error("Invalid input shape {actual:?}, expected {expected}")]
    InvalidShape {
        /// The shape of the offending tensor.
        actual: Vec<usize>,
        /// Description of the expected shape.
        expected: String,
    },

    /// Error when a requested layer name is not part of the network.
    #[error("Unknown layer name: {0}")]
    UnknownLayer(String),

    /// Error from the underlying tensor library.
    #[error(transparent)]
    CandleError(#[from] candle_core::Error),

    /// Error to create the output image.
    #[error("Failed to create image. {0}")]
    ImageCreationError(#[from] nstyle_image::ImageError),
}
