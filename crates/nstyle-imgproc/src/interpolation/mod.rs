mod bilinear;
mod nearest;

use nstyle_image::{Image, ImageDtype};

pub(crate) use bilinear::bilinear_interpolation;
pub(crate) use nearest::nearest_neighbor_interpolation;

/// The interpolation mode to use for the resize operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterpolationMode {
    /// Bilinear interpolation
    Bilinear,
    /// Nearest neighbor interpolation
    Nearest,
}

/// Interpolate a pixel value from an image at the given (possibly fractional) coordinates.
///
/// # Arguments
///
/// * `image` - The input image container.
/// * `u` - The x coordinate of the pixel to interpolate.
/// * `v` - The y coordinate of the pixel to interpolate.
/// * `interpolation` - The interpolation mode to use.
///
/// # Returns
///
/// The interpolated pixel values, one per channel.
pub(crate) fn interpolate_pixel<T, const C: usize>(
    image: &Image<T, C>,
    u: f32,
    v: f32,
    interpolation: InterpolationMode,
) -> [f32; C]
where
    T: ImageDtype,
{
    match interpolation {
        InterpolationMode::Bilinear => bilinear_interpolation(image, u, v),
        InterpolationMode::Nearest => nearest_neighbor_interpolation(image, u, v),
    }
}
