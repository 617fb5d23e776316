#![deny(missing_docs)]
//! Image types and traits for the nstyle style transfer crates

/// image representation for style transfer purposes.
pub mod image;

/// Error types for the image module.
pub mod error;

pub use crate::error::ImageError;
pub use crate::image::{Image, ImageDtype, ImageSize};
