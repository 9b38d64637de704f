//! SVG rasterization.
//!
//! Renders through usvg/resvg into a tiny-skia pixmap at the final
//! (post-resize) resolution, so a tiny SVG describing a billion-pixel
//! scene never allocates more than the target bitmap.

use crate::error::{ProxyError, Result};
use crate::image::scaled_dimensions;

/// Parse and render an SVG document at its Xiino target size.
pub fn rasterize(data: &[u8], max_pixels: u64) -> Result<image::RgbaImage> {
    let options = usvg::Options::default();
    let tree = usvg::Tree::from_data(data, &options).map_err(|_| ProxyError::ParseFailure)?;

    let size = tree.size();
    let src_w = (size.width().ceil() as u32).max(1);
    let src_h = (size.height().ceil() as u32).max(1);
    let (target_w, target_h) = scaled_dimensions(src_w, src_h);

    if target_w as u64 * target_h as u64 > max_pixels {
        return Err(ProxyError::TooLarge);
    }

    let mut pixmap = tiny_skia::Pixmap::new(target_w, target_h).ok_or(ProxyError::TooLarge)?;
    let transform = tiny_skia::Transform::from_scale(
        target_w as f32 / size.width(),
        target_h as f32 / size.height(),
    );
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    let mut raw = Vec::with_capacity(target_w as usize * target_h as usize * 4);
    for pixel in pixmap.pixels() {
        let c = pixel.demultiply();
        raw.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }
    image::RgbaImage::from_raw(target_w, target_h, raw).ok_or(ProxyError::ParseFailure)
}
