//! Palette quantization with perceptual dithering.
//!
//! Two strategies, selected by `IMAGE_DITHER_PRIORITY`:
//! - quality: Floyd-Steinberg error diffusion with the error carried in
//!   LAB components and serpentine row traversal
//! - performance: ordered 8x8 Bayer thresholding, no error propagation

use image::RgbImage;
use lab::{rgb_bytes_to_labs, Lab};

use crate::palette::Palette;

/// Standard 8x8 Bayer threshold matrix.
const BAYER_8X8: [[u8; 8]; 8] = [
    [0, 32, 8, 40, 2, 34, 10, 42],
    [48, 16, 56, 24, 50, 18, 58, 26],
    [12, 44, 4, 36, 14, 46, 6, 38],
    [60, 28, 52, 20, 62, 30, 54, 22],
    [3, 35, 11, 43, 1, 33, 9, 41],
    [51, 19, 59, 27, 49, 17, 57, 25],
    [15, 47, 7, 39, 13, 45, 5, 37],
    [63, 31, 55, 23, 61, 29, 53, 21],
];

/// Threshold amplitude applied around the Bayer midpoint.
const BAYER_AMPLITUDE: f32 = 32.0;

/// Floyd-Steinberg quantization in LAB space with serpentine traversal.
///
/// Error is diffused in LAB components rather than RGB so that the
/// propagated residual matches what the eye actually lost.
pub fn floyd_steinberg_lab(img: &RgbImage, palette: &Palette) -> Vec<u8> {
    let w = img.width() as usize;
    let h = img.height() as usize;
    let labs = rgb_bytes_to_labs(img.as_raw());

    let mut error = vec![[0.0f32; 3]; w * h];
    let mut out = vec![0u8; w * h];

    for y in 0..h {
        let ltr = y % 2 == 0;
        for step in 0..w {
            let x = if ltr { step } else { w - 1 - step };
            let i = y * w + x;

            let adjusted = Lab {
                l: labs[i].l + error[i][0],
                a: labs[i].a + error[i][1],
                b: labs[i].b + error[i][2],
            };
            let index = palette.nearest_lab(adjusted);
            out[i] = index;

            let chosen = palette.lab_entry(index);
            let residual = [
                adjusted.l - chosen.l,
                adjusted.a - chosen.a,
                adjusted.b - chosen.b,
            ];

            let dx: isize = if ltr { 1 } else { -1 };
            let mut spread = |tx: isize, ty: usize, weight: f32| {
                if tx >= 0 && (tx as usize) < w && ty < h {
                    let t = ty * w + tx as usize;
                    error[t][0] += residual[0] * weight;
                    error[t][1] += residual[1] * weight;
                    error[t][2] += residual[2] * weight;
                }
            };
            let xi = x as isize;
            spread(xi + dx, y, 7.0 / 16.0);
            spread(xi - dx, y + 1, 3.0 / 16.0);
            spread(xi, y + 1, 5.0 / 16.0);
            spread(xi + dx, y + 1, 1.0 / 16.0);
        }
    }

    out
}

/// Ordered 8x8 Bayer quantization via the palette lookup cube.
pub fn ordered_bayer(img: &RgbImage, palette: &Palette) -> Vec<u8> {
    let w = img.width() as usize;
    let h = img.height() as usize;
    let mut out = Vec::with_capacity(w * h);

    for (x, y, pixel) in img.enumerate_pixels() {
        let threshold = (BAYER_8X8[y as usize % 8][x as usize % 8] as f32 + 0.5) / 64.0 - 0.5;
        let offset = threshold * BAYER_AMPLITUDE;
        let rgb = [
            (pixel.0[0] as f32 + offset).clamp(0.0, 255.0) as u8,
            (pixel.0[1] as f32 + offset).clamp(0.0, 255.0) as u8,
            (pixel.0[2] as f32 + offset).clamp(0.0, 255.0) as u8,
        ];
        out.push(palette.index_of(rgb));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::{palette_for, ColorMode};

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(width, height, image::Rgb(rgb))
    }

    #[test]
    fn exact_palette_colors_pass_through_unchanged() {
        let palette = palette_for(ColorMode::Color8);
        let mut img = RgbImage::new(4, 2);
        let colors = [
            [0xFF, 0xFF, 0xFF],
            [0xFF, 0x00, 0x00],
            [0x00, 0xFF, 0x00],
            [0x33, 0x66, 0x99],
        ];
        for (x, y, px) in img.enumerate_pixels_mut() {
            px.0 = colors[(x as usize + y as usize) % colors.len()];
        }

        let indices = floyd_steinberg_lab(&img, palette);
        for (i, px) in img.pixels().enumerate() {
            assert_eq!(palette.color(indices[i]), px.0);
        }
    }

    #[test]
    fn mid_gray_dithers_to_multiple_levels() {
        let palette = palette_for(ColorMode::Mono1);
        let indices = floyd_steinberg_lab(&solid(16, 16, [128, 128, 128]), palette);
        assert!(indices.contains(&0));
        assert!(indices.contains(&1));
    }

    #[test]
    fn bayer_indices_stay_in_palette_range() {
        let palette = palette_for(ColorMode::Gray2);
        let indices = ordered_bayer(&solid(9, 9, [100, 150, 200]), palette);
        assert_eq!(indices.len(), 81);
        assert!(indices.iter().all(|&i| i < 4));
    }

    #[test]
    fn bayer_is_deterministic() {
        let palette = palette_for(ColorMode::Color8);
        let img = solid(8, 8, [120, 90, 60]);
        assert_eq!(ordered_bayer(&img, palette), ordered_bayer(&img, palette));
    }
}
