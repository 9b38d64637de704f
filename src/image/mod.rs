//! Image transcoding pipeline.
//!
//! # Responsibilities
//! - Admission checks on source size before any decoding
//! - Decode raster formats / rasterize SVG, bounded in pixels and time
//! - Apply the Xiino scaling law, quantize to the device palette, encode
//! - Account every produced image against the request budget
//!
//! Stages 2-5 are CPU-bound and run on the worker pool so the I/O
//! scheduler never blocks on a quantize.

pub mod dither;
pub mod svg;

use image::imageops::FilterType;
use image::{RgbImage, RgbaImage};

use crate::budget::Budget;
use crate::config::{DitherPriority, ImageConfig};
use crate::ebd::{serialize_ebd, EbdImage};
use crate::error::{ProxyError, Result};
use crate::palette::{palette_for, ColorMode};
use crate::workers::WorkerPool;

/// A fully transcoded image plus its inline wire form.
#[derive(Debug, Clone)]
pub struct TranscodedImage {
    pub image: EbdImage,
    /// Inline `SRC` payload (`ebd:` + base64).
    pub src: String,
}

#[derive(Clone)]
pub struct ImageProcessor {
    config: ImageConfig,
    workers: WorkerPool,
}

impl ImageProcessor {
    pub fn new(config: ImageConfig, workers: WorkerPool) -> Self {
        Self { config, workers }
    }

    /// Transcode one fetched image for the given device.
    ///
    /// Every failure is image-local; the caller substitutes ALT text and
    /// the page survives.
    pub async fn transcode(
        &self,
        bytes: Vec<u8>,
        content_type: Option<&str>,
        mode: ColorMode,
        budget: &Budget,
    ) -> Result<TranscodedImage> {
        let is_svg = is_svg_content(content_type, &bytes);

        // Admission: reject on declared size before touching a decoder.
        if is_svg {
            if bytes.len() > self.config.max_svg_size {
                return Err(ProxyError::TooLarge);
            }
        } else if bytes.len() > self.config.max_source_bytes() {
            return Err(ProxyError::TooLarge);
        }
        if budget.expired() {
            return Err(ProxyError::Timeout);
        }

        let config = self.config.clone();
        let work = move || -> Result<(u16, u16, u8, ColorMode, Vec<u8>)> {
            let rgb = if is_svg {
                flatten_onto_white(svg::rasterize(&bytes, config.max_pixels)?)
            } else {
                decode_and_resize(&bytes, &config)?
            };

            let palette = palette_for(mode);
            let indices = match config.dither_priority {
                DitherPriority::Quality => dither::floyd_steinberg_lab(&rgb, palette),
                DitherPriority::Performance => dither::ordered_bayer(&rgb, palette),
            };
            Ok((
                rgb.width() as u16,
                rgb.height() as u16,
                mode.bpp(),
                mode,
                indices,
            ))
        };

        let limit = if is_svg {
            self.config.svg_timeout_secs.min(self.config.processing_timeout_secs)
        } else {
            self.config.processing_timeout_secs
        };
        let deadline_cap = budget
            .deadline()
            .saturating_duration_since(std::time::Instant::now());
        let timeout = std::time::Duration::from_secs(limit).min(deadline_cap);

        let (width, height, depth, mode, indices) =
            tokio::time::timeout(timeout, self.workers.run(work))
                .await
                .map_err(|_| ProxyError::Timeout)??;

        let image = EbdImage::from_indices(width, height, depth, mode, &indices)?;
        if !budget.try_charge_image(image.encoded_len()) {
            return Err(ProxyError::TooLarge);
        }

        let src = serialize_ebd(&image);
        Ok(TranscodedImage { image, src })
    }
}

/// The Xiino scaling law: sources wider than 306 px land at 153 px,
/// everything else is halved; both axes round down with a floor of 1.
pub(crate) fn scaled_dimensions(width: u32, height: u32) -> (u32, u32) {
    let target_w = if width > 306 { 153 } else { (width / 2).max(1) };
    let target_h = ((height as u64 * target_w as u64) / width as u64).max(1) as u32;
    (target_w, target_h)
}

fn decode_and_resize(bytes: &[u8], config: &ImageConfig) -> Result<RgbImage> {
    let decoded = image::load_from_memory(bytes).map_err(|_| ProxyError::ParseFailure)?;
    let (w, h) = (decoded.width(), decoded.height());

    if w as u64 * h as u64 > config.max_pixels
        || w > config.max_dimension
        || h > config.max_dimension
    {
        return Err(ProxyError::TooLarge);
    }

    let (target_w, target_h) = scaled_dimensions(w, h);
    let filter = match config.dither_priority {
        DitherPriority::Quality => FilterType::Lanczos3,
        DitherPriority::Performance => FilterType::Triangle,
    };
    let resized = decoded.resize_exact(target_w, target_h, filter);
    Ok(flatten_onto_white(resized.to_rgba8()))
}

/// Composite transparency over a white background, as the client has no
/// alpha channel.
fn flatten_onto_white(rgba: RgbaImage) -> RgbImage {
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let a = pixel.0[3] as u16;
        let blend = |c: u8| (((c as u16 * a) + (255 * (255 - a)) + 127) / 255) as u8;
        out.put_pixel(
            x,
            y,
            image::Rgb([blend(pixel.0[0]), blend(pixel.0[1]), blend(pixel.0[2])]),
        );
    }
    out
}

/// SVG is identified by content type or by sniffing the first kilobyte.
fn is_svg_content(content_type: Option<&str>, bytes: &[u8]) -> bool {
    if content_type.is_some_and(|ct| ct.contains("svg")) {
        return true;
    }
    let head = &bytes[..bytes.len().min(1024)];
    String::from_utf8_lossy(head).to_ascii_lowercase().contains("<svg")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn budget() -> Budget {
        Budget::new(512 * 1024, 100, Instant::now() + Duration::from_secs(30))
    }

    fn processor() -> ImageProcessor {
        ImageProcessor::new(ImageConfig::default(), WorkerPool::new(2))
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, image::Rgb([200, 40, 40]));
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn scaling_law() {
        assert_eq!(scaled_dimensions(600, 400), (153, 102));
        assert_eq!(scaled_dimensions(306, 100), (153, 50));
        assert_eq!(scaled_dimensions(100, 60), (50, 30));
        assert_eq!(scaled_dimensions(1, 1), (1, 1));
        assert_eq!(scaled_dimensions(307, 1), (153, 1));
    }

    #[tokio::test]
    async fn transcodes_png_and_charges_budget() {
        let budget = budget();
        let out = processor()
            .transcode(png_bytes(100, 60), Some("image/png"), ColorMode::Color8, &budget)
            .await
            .unwrap();
        assert_eq!(out.image.width, 50);
        assert_eq!(out.image.height, 30);
        assert_eq!(out.image.depth, 8);
        assert!(out.src.starts_with("ebd:"));
        assert!(budget.bytes_remaining() < 512 * 1024);
    }

    #[tokio::test]
    async fn packed_size_invariant_for_all_depths() {
        for mode in [
            ColorMode::Mono1,
            ColorMode::Gray2,
            ColorMode::Gray4,
            ColorMode::Color8,
        ] {
            let out = processor()
                .transcode(png_bytes(99, 40), None, mode, &budget())
                .await
                .unwrap();
            let img = &out.image;
            let expected =
                (img.width as usize * img.depth as usize).div_ceil(8) * img.height as usize;
            assert_eq!(img.bytes.len(), expected);
        }
    }

    #[tokio::test]
    async fn oversized_source_is_rejected_before_decode() {
        let err = processor()
            .transcode(vec![0u8; 6 * 1024 * 1024], None, ColorMode::Color8, &budget())
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::TooLarge));
    }

    #[tokio::test]
    async fn oversized_dimensions_are_rejected_after_decode() {
        let mut config = ImageConfig::default();
        config.max_pixels = 1_000;
        let processor = ImageProcessor::new(config, WorkerPool::new(2));
        let err = processor
            .transcode(png_bytes(100, 60), None, ColorMode::Color8, &budget())
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::TooLarge));
    }

    #[tokio::test]
    async fn garbage_bytes_are_a_parse_failure() {
        let err = processor()
            .transcode(b"not an image at all".to_vec(), None, ColorMode::Color8, &budget())
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::ParseFailure));
    }
}
