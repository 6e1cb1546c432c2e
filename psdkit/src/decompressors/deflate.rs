// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

use std::io::{Read, Write};

use libflate::zlib::{Decoder, Encoder};

use crate::{PsdError, Result};

/// Upper bound of the deflate compression ratio
const MAX_DEFLATE_RATIO: usize = 1032;

/// Inflate zlib wrapped deflate data, the result must hold `expected` bytes.
pub fn inflate(src: &[u8], expected: usize) -> Result<Vec<u8>> {
  let decoder = Decoder::new(src).map_err(|e| PsdError::decode(format!("Invalid zlib stream: {}", e)))?;
  let mut out = Vec::with_capacity(expected.min(src.len().saturating_mul(MAX_DEFLATE_RATIO)));
  decoder
    .take(expected as u64)
    .read_to_end(&mut out)
    .map_err(|e| PsdError::decode(format!("Deflate failed: {}", e)))?;
  if out.len() < expected {
    return Err(PsdError::decode(format!("Deflate produced {} bytes, expected {}", out.len(), expected)));
  }
  Ok(out)
}

pub fn deflate(src: &[u8]) -> Result<Vec<u8>> {
  let mut encoder = Encoder::new(Vec::with_capacity(src.len() / 2))?;
  encoder.write_all(src)?;
  Ok(encoder.finish().into_result()?)
}

/// Undo the horizontal delta coding of `row_bytes` wide rows.
pub fn unpredict(buf: &mut [u8], row_bytes: usize, depth: u16) -> Result<()> {
  if row_bytes == 0 {
    return Ok(());
  }
  match depth {
    8 => buf.chunks_exact_mut(row_bytes).for_each(|row| {
      for i in 1..row.len() {
        row[i] = row[i].wrapping_add(row[i - 1]);
      }
    }),
    16 => buf.chunks_exact_mut(row_bytes).for_each(|row| {
      let mut prev = 0_u16;
      for sample in row.chunks_exact_mut(2) {
        prev = prev.wrapping_add(u16::from_be_bytes([sample[0], sample[1]]));
        sample.copy_from_slice(&prev.to_be_bytes());
      }
    }),
    32 => {
      let width = row_bytes / 4;
      let mut planes = vec![0_u8; row_bytes];
      for row in buf.chunks_exact_mut(row_bytes) {
        for i in 1..row.len() {
          row[i] = row[i].wrapping_add(row[i - 1]);
        }
        // the row holds all high bytes first, then the next byte plane
        planes.copy_from_slice(row);
        for (x, sample) in row.chunks_exact_mut(4).enumerate() {
          for (b, byte) in sample.iter_mut().enumerate() {
            *byte = planes[b * width + x];
          }
        }
      }
    }
    _ => return Err(PsdError::Unsupported(format!("Prediction for {} bit samples", depth))),
  }
  Ok(())
}

/// Horizontal delta coding, the inverse of [`unpredict`].
pub fn predict(buf: &mut [u8], row_bytes: usize, depth: u16) -> Result<()> {
  if row_bytes == 0 {
    return Ok(());
  }
  match depth {
    8 => buf.chunks_exact_mut(row_bytes).for_each(|row| {
      for i in (1..row.len()).rev() {
        row[i] = row[i].wrapping_sub(row[i - 1]);
      }
    }),
    16 => buf.chunks_exact_mut(row_bytes).for_each(|row| {
      let mut prev = 0_u16;
      for sample in row.chunks_exact_mut(2) {
        let value = u16::from_be_bytes([sample[0], sample[1]]);
        sample.copy_from_slice(&value.wrapping_sub(prev).to_be_bytes());
        prev = value;
      }
    }),
    32 => {
      let width = row_bytes / 4;
      let mut planes = vec![0_u8; row_bytes];
      for row in buf.chunks_exact_mut(row_bytes) {
        for (x, sample) in row.chunks_exact(4).enumerate() {
          for (b, byte) in sample.iter().enumerate() {
            planes[b * width + x] = *byte;
          }
        }
        row.copy_from_slice(&planes);
        for i in (1..row.len()).rev() {
          row[i] = row[i].wrapping_sub(row[i - 1]);
        }
      }
    }
    _ => return Err(PsdError::Unsupported(format!("Prediction for {} bit samples", depth))),
  }
  Ok(())
}
