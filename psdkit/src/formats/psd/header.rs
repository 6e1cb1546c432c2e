// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

use log::debug;
use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};

use crate::{PsdError, Result, reader::StreamReader};

pub const PSD_SIGNATURE: [u8; 4] = *b"8BPS";
pub const HEADER_LEN: u64 = 26;

const MAX_CHANNELS: u16 = 56;
const MAX_PSD_DIMENSION: u32 = 30_000;
pub const MAX_PSB_DIMENSION: u32 = 300_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, Serialize, Deserialize)]
#[repr(u16)]
#[serde(rename_all = "camelCase")]
pub enum ColorMode {
  Bitmap = 0,
  Grayscale = 1,
  Indexed = 2,
  Rgb = 3,
  Cmyk = 4,
  Multichannel = 7,
  Duotone = 8,
  Lab = 9,
}

impl ColorMode {
  /// Number of channels carrying color information.
  pub fn color_channels(&self) -> usize {
    match self {
      Self::Bitmap | Self::Grayscale | Self::Indexed | Self::Duotone => 1,
      Self::Rgb | Self::Lab => 3,
      Self::Cmyk => 4,
      Self::Multichannel => 0,
    }
  }
}

/// File header section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
  /// 1 for PSD, 2 for PSB (large document format)
  pub version: u16,
  pub channels: u16,
  pub height: u32,
  pub width: u32,
  /// Bits per channel: 1, 8, 16 or 32
  pub depth: u16,
  pub color_mode: ColorMode,
}

impl Header {
  pub fn parse(reader: &mut StreamReader) -> Result<Self> {
    let signature = reader.read_signature().map_err(truncated)?;
    if signature != PSD_SIGNATURE {
      return Err(PsdError::Format(format!("Invalid signature {:02x?}, not a Photoshop document", signature)));
    }
    let version = reader.read_u16().map_err(truncated)?;
    if version != 1 && version != 2 {
      return Err(PsdError::Format(format!("Unknown version {}", version)));
    }
    reader.skip(6).map_err(truncated)?; // reserved
    let channels = reader.read_u16().map_err(truncated)?;
    let height = reader.read_u32().map_err(truncated)?;
    let width = reader.read_u32().map_err(truncated)?;
    let depth = reader.read_u16().map_err(truncated)?;
    let mode = reader.read_u16().map_err(truncated)?;

    if channels == 0 || channels > MAX_CHANNELS {
      return Err(PsdError::Format(format!("Invalid channel count {}", channels)));
    }
    let max_dim = if version == 2 { MAX_PSB_DIMENSION } else { MAX_PSD_DIMENSION };
    if width == 0 || height == 0 || width > max_dim || height > max_dim {
      return Err(PsdError::Format(format!("Invalid dimensions {}x{}", width, height)));
    }
    if !matches!(depth, 1 | 8 | 16 | 32) {
      return Err(PsdError::Format(format!("Invalid bit depth {}", depth)));
    }
    let color_mode = ColorMode::try_from(mode).map_err(|_| PsdError::Format(format!("Unknown color mode {}", mode)))?;

    let header = Self {
      version,
      channels,
      height,
      width,
      depth,
      color_mode,
    };
    debug!("PSD header: {:?}", header);
    Ok(header)
  }

  pub fn is_psb(&self) -> bool {
    self.version == 2
  }

  /// Bytes per sample, 1-bit data counts as one byte per 8 pixels elsewhere.
  pub fn bytes_per_sample(&self) -> u64 {
    match self.depth {
      16 => 2,
      32 => 4,
      _ => 1,
    }
  }

  /// Bytes of one uncompressed scanline of `width` samples.
  pub fn row_bytes(&self, width: u64) -> u64 {
    if self.depth == 1 { width.div_ceil(8) } else { width * self.bytes_per_sample() }
  }
}

fn truncated(err: PsdError) -> PsdError {
  match err {
    PsdError::OutOfBounds { .. } => PsdError::Format("File header is truncated".into()),
    other => other,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::source::MemorySource;
  use std::sync::Arc;

  fn header_bytes(sig: &[u8; 4], version: u16, depth: u16, mode: u16) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(sig);
    buf.extend_from_slice(&version.to_be_bytes());
    buf.extend_from_slice(&[0; 6]);
    buf.extend_from_slice(&3_u16.to_be_bytes());
    buf.extend_from_slice(&20_u32.to_be_bytes());
    buf.extend_from_slice(&30_u32.to_be_bytes());
    buf.extend_from_slice(&depth.to_be_bytes());
    buf.extend_from_slice(&mode.to_be_bytes());
    buf
  }

  fn parse(buf: Vec<u8>) -> Result<Header> {
    let mut reader = StreamReader::new(Arc::new(MemorySource::new(buf)));
    Header::parse(&mut reader)
  }

  #[test]
  fn parse_valid_header() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let header = parse(header_bytes(b"8BPS", 1, 8, 3))?;
    assert_eq!(header.width, 30);
    assert_eq!(header.height, 20);
    assert_eq!(header.channels, 3);
    assert_eq!(header.color_mode, ColorMode::Rgb);
    assert!(!header.is_psb());
    assert_eq!(header.row_bytes(30), 30);
    Ok(())
  }

  #[test]
  fn reject_bad_signature_and_fields() {
    assert!(matches!(parse(header_bytes(b"8BIM", 1, 8, 3)), Err(PsdError::Format(_))));
    assert!(matches!(parse(header_bytes(b"8BPS", 3, 8, 3)), Err(PsdError::Format(_))));
    assert!(matches!(parse(header_bytes(b"8BPS", 1, 7, 3)), Err(PsdError::Format(_))));
    assert!(matches!(parse(header_bytes(b"8BPS", 1, 8, 5)), Err(PsdError::Format(_))));
    assert!(matches!(parse(b"8BPS\0\x01".to_vec()), Err(PsdError::Format(_))));
  }

  #[test]
  fn bitmap_row_bytes() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let header = parse(header_bytes(b"8BPS", 2, 1, 0))?;
    assert!(header.is_psb());
    assert_eq!(header.row_bytes(30), 4);
    Ok(())
  }
}
