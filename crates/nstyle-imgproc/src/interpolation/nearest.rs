use nstyle_image::{Image, ImageDtype};

/// Kernel for nearest neighbor interpolation
///
/// # Arguments
///
/// * `image` - The input image container.
/// * `u` - The x coordinate of the pixel to interpolate.
/// * `v` - The y coordinate of the pixel to interpolate.
///
/// # Returns
///
/// The pixel values of the nearest neighbor.
pub(crate) fn nearest_neighbor_interpolation<T, const C: usize>(
    image: &Image<T, C>,
    u: f32,
    v: f32,
) -> [f32; C]
where
    T: ImageDtype,
{
    let (rows, cols) = (image.rows(), image.cols());

    let iu = (u.round() as usize).min(cols - 1);
    let iv = (v.round() as usize).min(rows - 1);

    let base = (iv * cols + iu) * C;
    let data = image.as_slice();

    let mut pixel = [0.0; C];
    for k in 0..C {
        pixel[k] = data[base + k].into();
    }

    pixel
}
