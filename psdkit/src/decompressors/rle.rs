// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

//! PackBits run-length coding as used by Photoshop.
//!
//! Compressed planes start with a table of compressed byte counts, one entry
//! per row (u16 in PSD, u32 in PSB), followed by the packed rows.

use rayon::prelude::*;

use crate::{PsdError, Result, bits::Endian};

/// Unpack one PackBits row into `out`, which must be filled exactly.
pub fn unpack_row(src: &[u8], out: &mut [u8]) -> Result<()> {
  let mut i = 0;
  let mut o = 0;
  while o < out.len() {
    let control = *src.get(i).ok_or_else(|| PsdError::decode("RLE row is truncated"))? as i8;
    i += 1;
    match control {
      -128 => {}
      0.. => {
        let n = control as usize + 1;
        let literal = src.get(i..i + n).ok_or_else(|| PsdError::decode("RLE literal run is truncated"))?;
        out.get_mut(o..o + n).ok_or_else(|| PsdError::decode("RLE literal run overflows row"))?.copy_from_slice(literal);
        i += n;
        o += n;
      }
      _ => {
        let n = 1 - control as isize;
        let n = n as usize;
        let value = *src.get(i).ok_or_else(|| PsdError::decode("RLE repeat run is truncated"))?;
        out.get_mut(o..o + n).ok_or_else(|| PsdError::decode("RLE repeat run overflows row"))?.fill(value);
        i += 1;
        o += n;
      }
    }
  }
  Ok(())
}

/// Unpack `rows` rows of `row_bytes` each, `src` starts with the byte count table.
pub fn unpack_rows(src: &[u8], rows: usize, row_bytes: usize, psb: bool) -> Result<Vec<u8>> {
  let entry = if psb { 4 } else { 2 };
  let table = rows
    .checked_mul(entry)
    .and_then(|len| src.get(..len))
    .ok_or_else(|| PsdError::decode("RLE byte count table is truncated"))?;
  let mut ranges = Vec::with_capacity(rows);
  let mut offset = rows * entry;
  for row in 0..rows {
    let count = if psb {
      Endian::Big.read_u32(table, row * 4) as usize
    } else {
      Endian::Big.read_u16(table, row * 2) as usize
    };
    let end = offset + count;
    if end > src.len() {
      return Err(PsdError::decode(format!("RLE row {} exceeds channel data", row)));
    }
    ranges.push(offset..end);
    offset = end;
  }

  // a two byte packet expands to at most 128 bytes
  let packed = src.len() - rows * entry;
  match rows.checked_mul(row_bytes) {
    Some(size) if size <= packed.saturating_mul(64) || row_bytes == 0 => {}
    _ => return Err(PsdError::decode(format!("RLE data of {} bytes can not fill {} rows", packed, rows))),
  }
  let mut out = vec![0; rows * row_bytes];
  if row_bytes > 0 {
    out
      .par_chunks_exact_mut(row_bytes)
      .zip(ranges.into_par_iter())
      .try_for_each(|(line, range)| unpack_row(&src[range], line))?;
  }
  Ok(out)
}

/// PackBits encoder for one row.
pub fn pack_row(src: &[u8], out: &mut Vec<u8>) {
  let mut i = 0;
  while i < src.len() {
    let mut run = 1;
    while i + run < src.len() && run < 128 && src[i + run] == src[i] {
      run += 1;
    }
    if run >= 2 {
      out.push((1 - run as isize) as i8 as u8);
      out.push(src[i]);
      i += run;
      continue;
    }
    let start = i;
    while i < src.len() && i - start < 128 {
      if i + 1 < src.len() && src[i] == src[i + 1] {
        break;
      }
      i += 1;
    }
    out.push((i - start - 1) as u8);
    out.extend_from_slice(&src[start..i]);
  }
}

/// Pack `data` row by row including the byte count table.
pub fn pack_rows(data: &[u8], row_bytes: usize, psb: bool) -> Vec<u8> {
  let rows: Vec<Vec<u8>> = data
    .chunks(row_bytes.max(1))
    .map(|row| {
      let mut packed = Vec::new();
      pack_row(row, &mut packed);
      packed
    })
    .collect();
  let mut out = Vec::new();
  for row in &rows {
    if psb {
      out.extend_from_slice(&(row.len() as u32).to_be_bytes());
    } else {
      out.extend_from_slice(&(row.len() as u16).to_be_bytes());
    }
  }
  rows.iter().for_each(|row| out.extend_from_slice(row));
  out
}
