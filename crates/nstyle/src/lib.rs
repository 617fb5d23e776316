#![deny(missing_docs)]
//! Neural style transfer in Rust.
//!
//! Given a content image and a style image, synthesize a new image that keeps the
//! content image's spatial structure while adopting the style image's texture and
//! color statistics, by driving an L-BFGS solver through a composite loss built on
//! the activations of a frozen, pretrained VGG-19 feature extractor.

#[doc(inline)]
pub use nstyle_image as image;

#[doc(inline)]
pub use nstyle_imgproc as imgproc;

#[doc(inline)]
pub use nstyle_io as io;

#[doc(inline)]
pub use nstyle_optim as optim;

#[doc(inline)]
pub use nstyle_transfer as transfer;

#[doc(inline)]
pub use nstyle_vgg as vgg;
