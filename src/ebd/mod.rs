//! EBDImage bitstream encoding.
//!
//! # Responsibilities
//! - Pack palette indices into the client's packed-row byte layout
//! - Serialize the wire header (depth, width, height) plus pixel bytes
//! - Reject out-of-range indices; never alter pixel values
//!
//! Quantization is the caller's job; this module performs no I/O.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::{ProxyError, Result};
use crate::palette::ColorMode;

/// A transcoded image in the client's palette-indexed bitmap format.
#[derive(Debug, Clone)]
pub struct EbdImage {
    pub width: u16,
    pub height: u16,
    /// Bits per pixel: 1, 2, 4 or 8.
    pub depth: u8,
    /// Palette the indices refer to.
    pub mode: ColorMode,
    /// Packed rows, MSB-first, each padded to a byte boundary.
    pub bytes: Vec<u8>,
}

impl EbdImage {
    /// Build an EBDImage from raw palette indices in row-major order.
    ///
    /// Fails with `InvalidPixelIndex` if any index does not fit `depth`
    /// bits.
    pub fn from_indices(
        width: u16,
        height: u16,
        depth: u8,
        mode: ColorMode,
        indices: &[u8],
    ) -> Result<Self> {
        let bytes = pack(width, height, depth, indices)?;
        Ok(Self {
            width,
            height,
            depth,
            mode,
            bytes,
        })
    }

    /// Bytes occupied by one packed row.
    pub fn row_stride(&self) -> usize {
        row_stride(self.width, self.depth)
    }

    /// Total serialized size: header plus packed rows.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.bytes.len()
    }

    /// Unpack back to one index per pixel (test and fallback path).
    pub fn unpack(&self) -> Vec<u8> {
        let stride = self.row_stride();
        let per_byte = 8 / self.depth as usize;
        let mask = (1u16 << self.depth) - 1;
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize);
        for y in 0..self.height as usize {
            let row = &self.bytes[y * stride..(y + 1) * stride];
            for x in 0..self.width as usize {
                let byte = row[x / per_byte];
                let shift = 8 - self.depth as usize * (x % per_byte + 1);
                out.push(((byte as u16 >> shift) & mask) as u8);
            }
        }
        out
    }
}

const HEADER_LEN: usize = 5;

fn row_stride(width: u16, depth: u8) -> usize {
    (width as usize * depth as usize).div_ceil(8)
}

/// Pack indices MSB-first with byte-padded rows, top to bottom.
fn pack(width: u16, height: u16, depth: u8, indices: &[u8]) -> Result<Vec<u8>> {
    assert!(matches!(depth, 1 | 2 | 4 | 8), "unsupported depth {depth}");
    assert_eq!(
        indices.len(),
        width as usize * height as usize,
        "index buffer does not match dimensions"
    );

    let limit = ((1u16 << depth) - 1) as u8;
    let stride = row_stride(width, depth);
    let mut bytes = Vec::with_capacity(stride * height as usize);

    for row in indices.chunks(width as usize) {
        let mut acc: u16 = 0;
        let mut filled: u8 = 0;
        for &index in row {
            if index > limit {
                return Err(ProxyError::InvalidPixelIndex { index, depth });
            }
            acc = (acc << depth) | index as u16;
            filled += depth;
            if filled == 8 {
                bytes.push(acc as u8);
                acc = 0;
                filled = 0;
            }
        }
        if filled > 0 {
            bytes.push((acc << (8 - filled)) as u8);
        }
    }

    debug_assert_eq!(bytes.len(), stride * height as usize);
    Ok(bytes)
}

/// Serialize an EBDImage into the inline form the rewritten `SRC`
/// attribute carries: `ebd:` plus base64 of header and pixel bytes.
///
/// Header layout: 1 byte depth, u16 big-endian width, u16 big-endian
/// height.
pub fn serialize_ebd(image: &EbdImage) -> String {
    let mut payload = Vec::with_capacity(image.encoded_len());
    payload.push(image.depth);
    payload.extend_from_slice(&image.width.to_be_bytes());
    payload.extend_from_slice(&image.height.to_be_bytes());
    payload.extend_from_slice(&image.bytes);
    format!("ebd:{}", BASE64.encode(payload))
}

/// Read width and height back out of a serialized `ebd:` payload.
///
/// Decodes only the leading base64 quanta covering the 5-byte header.
pub fn payload_dimensions(payload: &str) -> Option<(u16, u16)> {
    let b64 = payload.strip_prefix("ebd:")?;
    let prefix = if b64.len() >= 8 { b64.get(..8)? } else { b64 };
    let bytes = BASE64.decode(prefix).ok()?;
    if bytes.len() < 5 {
        return None;
    }
    Some((
        u16::from_be_bytes([bytes[1], bytes[2]]),
        u16::from_be_bytes([bytes[3], bytes[4]]),
    ))
}
