//! Fixed palettes and perceptual color matching.
//!
//! # Responsibilities
//! - Hold the Palm web-safe 256-color palette and the grayscale ramps
//! - Precompute LAB entries and a 32^3 sRGB lookup cube per palette
//! - Answer nearest-color queries deterministically (ties break low)
//!
//! Palettes are process-wide, built on first access and immutable after,
//! so no synchronization is needed on the hot path.

use std::sync::OnceLock;

use lab::Lab;

/// Client color capability, derived from the request's device codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    /// 1-bit black and white.
    Mono1,
    /// 2-bit grayscale.
    Gray2,
    /// 4-bit grayscale.
    Gray4,
    /// 8-bit indexed color.
    Color8,
}

impl ColorMode {
    /// Bits per pixel on the wire.
    pub fn bpp(self) -> u8 {
        match self {
            ColorMode::Mono1 => 1,
            ColorMode::Gray2 => 2,
            ColorMode::Gray4 => 4,
            ColorMode::Color8 => 8,
        }
    }
}

const CUBE_BITS: u32 = 5;
const CUBE_SIDE: usize = 1 << CUBE_BITS;
const CUBE_LEN: usize = CUBE_SIDE * CUBE_SIDE * CUBE_SIDE;

/// An immutable indexed palette with precomputed lookup structures.
pub struct Palette {
    mode: ColorMode,
    entries: Vec<[u8; 3]>,
    lab: Vec<Lab>,
    cube: Box<[u8]>,
}

impl Palette {
    fn build(mode: ColorMode, entries: Vec<[u8; 3]>) -> Self {
        let lab: Vec<Lab> = entries.iter().map(|rgb| Lab::from_rgb(rgb)).collect();

        let mut cube = vec![0u8; CUBE_LEN].into_boxed_slice();
        for r in 0..CUBE_SIDE {
            for g in 0..CUBE_SIDE {
                for b in 0..CUBE_SIDE {
                    let probe = Lab::from_rgb(&[
                        bucket_center(r),
                        bucket_center(g),
                        bucket_center(b),
                    ]);
                    cube[(r << (2 * CUBE_BITS)) | (g << CUBE_BITS) | b] =
                        nearest_in(&lab, probe);
                }
            }
        }

        Self {
            mode,
            entries,
            lab,
            cube,
        }
    }

    pub fn mode(&self) -> ColorMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// sRGB value of a palette entry.
    pub fn color(&self, index: u8) -> [u8; 3] {
        self.entries[index as usize]
    }

    /// LAB value of a palette entry.
    pub fn lab_entry(&self, index: u8) -> Lab {
        self.lab[index as usize]
    }

    /// Nearest palette index for an sRGB color via the lookup cube.
    ///
    /// Single table read with bit-masked coordinates.
    pub fn index_of(&self, rgb: [u8; 3]) -> u8 {
        let r = (rgb[0] >> 3) as usize;
        let g = (rgb[1] >> 3) as usize;
        let b = (rgb[2] >> 3) as usize;
        self.cube[(r << (2 * CUBE_BITS)) | (g << CUBE_BITS) | b]
    }

    /// Nearest palette index for an exact LAB value (full scan).
    ///
    /// Used by the error-diffusion path, where the adjusted color only
    /// exists in LAB space.
    pub fn nearest_lab(&self, probe: Lab) -> u8 {
        nearest_in(&self.lab, probe)
    }
}

/// Center of an sRGB bucket along one axis.
fn bucket_center(bucket: usize) -> u8 {
    ((bucket << 3) | 0x04) as u8
}

/// Index minimizing squared dE*76; ties break toward the lower index.
fn nearest_in(palette: &[Lab], probe: Lab) -> u8 {
    let mut best = 0usize;
    let mut best_dist = f32::INFINITY;
    for (i, entry) in palette.iter().enumerate() {
        let d = distance_sq(probe, *entry);
        if d < best_dist {
            best_dist = d;
            best = i;
        }
    }
    best as u8
}

/// Squared color distance in LAB space (dE^2).
#[inline]
pub(crate) fn distance_sq(c1: Lab, c2: Lab) -> f32 {
    let dl = c1.l - c2.l;
    let da = c1.a - c2.a;
    let db = c1.b - c2.b;
    dl * dl + da * da + db * db
}

/// Perceptual dE*76 distance between two sRGB colors.
pub fn lab_distance(a: [u8; 3], b: [u8; 3]) -> f32 {
    distance_sq(Lab::from_rgb(&a), Lab::from_rgb(&b)).sqrt()
}

/// The palette a device renders with.
pub fn palette_for(mode: ColorMode) -> &'static Palette {
    match mode {
        ColorMode::Mono1 => {
            static MONO: OnceLock<Palette> = OnceLock::new();
            MONO.get_or_init(|| Palette::build(ColorMode::Mono1, gray_ramp(2)))
        }
        ColorMode::Gray2 => {
            static GRAY4: OnceLock<Palette> = OnceLock::new();
            GRAY4.get_or_init(|| Palette::build(ColorMode::Gray2, gray_ramp(4)))
        }
        ColorMode::Gray4 => {
            static GRAY16: OnceLock<Palette> = OnceLock::new();
            GRAY16.get_or_init(|| Palette::build(ColorMode::Gray4, gray_ramp(16)))
        }
        ColorMode::Color8 => {
            static COLOR: OnceLock<Palette> = OnceLock::new();
            COLOR.get_or_init(|| Palette::build(ColorMode::Color8, palm_color_entries()))
        }
    }
}

/// The Palm web-safe 256-entry palette.
///
/// Layout: the 6x6x6 cube over {FF,CC,99,66,33,00} brightest-first
/// (0..216), ten grays absent from the cube (216..226), four legacy
/// system colors (226..230), black at 230 (the conventional fallback
/// entry), then black padding to 256.
fn palm_color_entries() -> Vec<[u8; 3]> {
    const LEVELS: [u8; 6] = [0xFF, 0xCC, 0x99, 0x66, 0x33, 0x00];
    const GRAYS: [u8; 10] = [0xEE, 0xDD, 0xBB, 0xAA, 0x88, 0x77, 0x55, 0x44, 0x22, 0x11];
    const SYSTEM: [[u8; 3]; 4] = [
        [0xC0, 0xC0, 0xC0],
        [0x80, 0x00, 0x00],
        [0x00, 0x80, 0x00],
        [0x00, 0x00, 0x80],
    ];

    let mut entries = Vec::with_capacity(256);
    for r in LEVELS {
        for g in LEVELS {
            for b in LEVELS {
                entries.push([r, g, b]);
            }
        }
    }
    for v in GRAYS {
        entries.push([v, v, v]);
    }
    entries.extend(SYSTEM);
    while entries.len() < 256 {
        entries.push([0x00, 0x00, 0x00]);
    }
    entries
}

/// Grayscale ramp with perceptually uniform L* steps, brightest first
/// (Xiino's inverted convention: index 0 = white).
fn gray_ramp(levels: usize) -> Vec<[u8; 3]> {
    (0..levels)
        .map(|i| {
            let l = 100.0 * (levels - 1 - i) as f32 / (levels - 1) as f32;
            let v = l_to_srgb(l);
            [v, v, v]
        })
        .collect()
}

/// Invert CIE L* back to an sRGB channel value (D65, neutral gray).
fn l_to_srgb(l: f32) -> u8 {
    let y = if l > 8.0 {
        ((l + 16.0) / 116.0).powi(3)
    } else {
        l / 903.3
    };
    let c = if y > 0.003_130_8 {
        1.055 * y.powf(1.0 / 2.4) - 0.055
    } else {
        12.92 * y
    };
    (c * 255.0).round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_palette_has_256_entries() {
        let p = palette_for(ColorMode::Color8);
        assert_eq!(p.len(), 256);
        assert_eq!(p.color(0), [0xFF, 0xFF, 0xFF]);
        // Last cube entry and the conventional fallback are both black.
        assert_eq!(p.color(215), [0x00, 0x00, 0x00]);
        assert_eq!(p.color(230), [0x00, 0x00, 0x00]);
    }

    #[test]
    fn gray_ramps_are_inverted() {
        let p = palette_for(ColorMode::Gray4);
        assert_eq!(p.len(), 16);
        assert_eq!(p.color(0), [0xFF, 0xFF, 0xFF]);
        assert_eq!(p.color(15), [0x00, 0x00, 0x00]);
        for i in 1..16 {
            assert!(p.color(i)[0] < p.color(i - 1)[0]);
        }
    }

    #[test]
    fn cube_lookup_matches_exact_colors() {
        let p = palette_for(ColorMode::Color8);
        // Primary cube colors land on themselves.
        for rgb in [[0xFF, 0x00, 0x00], [0x00, 0xFF, 0x00], [0x00, 0x00, 0xFF]] {
            let idx = p.index_of(rgb);
            assert_eq!(p.color(idx), rgb);
        }
    }

    #[test]
    fn black_ties_break_to_lowest_index() {
        let p = palette_for(ColorMode::Color8);
        // Black appears at 215, 230 and in the padding; the scan must
        // deterministically pick the lowest.
        assert_eq!(p.nearest_lab(Lab::from_rgb(&[0, 0, 0])), 215);
    }

    #[test]
    fn lab_distance_is_zero_for_equal_colors() {
        assert_eq!(lab_distance([10, 20, 30], [10, 20, 30]), 0.0);
        assert!(lab_distance([0, 0, 0], [255, 255, 255]) > 99.0);
    }

    #[test]
    fn mono_palette_is_black_and_white() {
        let p = palette_for(ColorMode::Mono1);
        assert_eq!(p.len(), 2);
        assert_eq!(p.color(0), [0xFF, 0xFF, 0xFF]);
        assert_eq!(p.color(1), [0x00, 0x00, 0x00]);
    }
}
