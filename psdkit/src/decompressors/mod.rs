// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

use multiversion::multiversion;
use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};

use crate::formats::psd::MAX_PSB_DIMENSION;
use crate::{PsdError, Result, bits::clampf, pixarray::PixF32};

pub mod deflate;
pub mod rle;

/// Compression method, stored as u16 in front of the channel data
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, Serialize, Deserialize)]
#[repr(u16)]
pub enum Compression {
  Raw = 0,
  Rle = 1,
  Zip = 2,
  ZipPrediction = 3,
}

impl Compression {
  pub fn from_tag(tag: u16) -> Result<Self> {
    Self::try_from(tag).map_err(|_| PsdError::decode(format!("Unknown compression method {}", tag)))
  }
}

/// Geometry of a plane to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneFormat {
  pub width: usize,
  pub height: usize,
  /// Bits per sample: 1, 8, 16 or 32
  pub depth: u16,
  /// Large document format, RLE tables use u32 entries
  pub psb: bool,
}

impl PlaneFormat {
  pub fn row_bytes(&self) -> usize {
    match self.depth {
      1 => self.width.div_ceil(8),
      16 => self.width.saturating_mul(2),
      32 => self.width.saturating_mul(4),
      _ => self.width,
    }
  }

  pub fn plane_bytes(&self) -> usize {
    self.row_bytes().saturating_mul(self.height)
  }
}

/// Decompress `src` (without compression tag) into big-endian samples of `rows` rows.
pub fn decompress(compression: Compression, src: &[u8], format: &PlaneFormat, rows: usize) -> Result<Vec<u8>> {
  let row_bytes = format.row_bytes();
  let expected = row_bytes
    .checked_mul(rows)
    .ok_or_else(|| PsdError::decode(format!("Plane of {} rows with {} bytes each is too large", rows, row_bytes)))?;
  match compression {
    Compression::Raw => {
      if src.len() < expected {
        return Err(PsdError::decode(format!("Raw data holds {} bytes, expected {}", src.len(), expected)));
      }
      Ok(src[..expected].to_vec())
    }
    Compression::Rle => rle::unpack_rows(src, rows, row_bytes, format.psb),
    Compression::Zip => deflate::inflate(src, expected),
    Compression::ZipPrediction => {
      let mut buf = deflate::inflate(src, expected)?;
      if format.depth == 1 {
        return Err(PsdError::decode("Prediction is not defined for 1 bit data"));
      }
      deflate::unpredict(&mut buf, row_bytes, format.depth)?;
      Ok(buf)
    }
  }
}

/// Decode a channel record: compression tag followed by the data.
pub fn decode_plane(src: &[u8], format: &PlaneFormat) -> Result<PixF32> {
  if format.width == 0 || format.height == 0 {
    return Ok(PixF32::default());
  }
  if format.width > MAX_PSB_DIMENSION as usize || format.height > MAX_PSB_DIMENSION as usize {
    return Err(PsdError::decode(format!("Channel of {}x{} pixels exceeds the format limits", format.width, format.height)));
  }
  if src.len() < 2 {
    return Err(PsdError::decode("Channel data is missing the compression tag"));
  }
  let compression = Compression::from_tag(u16::from_be_bytes([src[0], src[1]]))?;
  let raw = decompress(compression, &src[2..], format, format.height)?;
  Ok(PixF32::new_with(normalize(&raw, format), format.width, format.height))
}

/// Convert big-endian samples to floats in `[0, 1]`.
pub fn normalize(raw: &[u8], format: &PlaneFormat) -> Vec<f32> {
  let mut out = vec![0.0; format.width * format.height];
  match format.depth {
    1 => normalize_1bit(raw, &mut out, format.width, format.row_bytes()),
    16 => normalize_16bit(raw, &mut out),
    32 => normalize_32bit(raw, &mut out),
    _ => normalize_8bit(raw, &mut out),
  }
  out
}

#[multiversion(targets("x86_64+avx+avx2", "x86+sse", "aarch64+neon"))]
fn normalize_8bit(raw: &[u8], out: &mut [f32]) {
  for (o, i) in out.iter_mut().zip(raw.iter()) {
    *o = *i as f32 / 255.0;
  }
}

#[multiversion(targets("x86_64+avx+avx2", "x86+sse", "aarch64+neon"))]
fn normalize_16bit(raw: &[u8], out: &mut [f32]) {
  for (o, i) in out.iter_mut().zip(raw.chunks_exact(2)) {
    *o = u16::from_be_bytes([i[0], i[1]]) as f32 / 65535.0;
  }
}

fn normalize_32bit(raw: &[u8], out: &mut [f32]) {
  for (o, i) in out.iter_mut().zip(raw.chunks_exact(4)) {
    *o = clampf(f32::from_be_bytes([i[0], i[1], i[2], i[3]]));
  }
}

/// Bitmap data, MSB first, a set bit is black.
fn normalize_1bit(raw: &[u8], out: &mut [f32], width: usize, row_bytes: usize) {
  for (line, bits) in out.chunks_exact_mut(width).zip(raw.chunks_exact(row_bytes)) {
    for (x, o) in line.iter_mut().enumerate() {
      let bit = (bits[x / 8] >> (7 - (x % 8))) & 1;
      *o = if bit == 1 { 0.0 } else { 1.0 };
    }
  }
}
