// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

use std::io::SeekFrom;
use std::sync::Arc;

use bytes::Bytes;

use crate::{PsdError, Result, bits::Endian, bits::padding, source::ByteSource};

macro_rules! typed_read {
  ($name:ident, $name_at:ident, $ty:ty, $size:expr) => {
    pub fn $name(&mut self) -> Result<$ty> {
      let value = self.$name_at(self.pos)?;
      self.pos += $size;
      Ok(value)
    }

    pub fn $name_at(&self, offset: u64) -> Result<$ty> {
      let buf = self.source.view(offset, $size)?;
      Ok(self.endian.$name(&buf, 0))
    }
  };
}

/// Cursor over a [`ByteSource`] with typed reads.
///
/// Reads without an offset advance the cursor, the `_at` variants read at an
/// absolute offset and leave the cursor untouched.
#[derive(Debug, Clone)]
pub struct StreamReader {
  source: Arc<dyn ByteSource>,
  pos: u64,
  endian: Endian,
}

impl StreamReader {
  pub fn new(source: Arc<dyn ByteSource>) -> Self {
    Self {
      source,
      pos: 0,
      endian: Endian::Big,
    }
  }

  pub fn with_endian(mut self, endian: Endian) -> Self {
    self.endian = endian;
    self
  }

  /// Independent cursor on the same source.
  pub fn new_cursor(&self, at: u64) -> Self {
    Self {
      source: self.source.clone(),
      pos: at,
      endian: self.endian,
    }
  }

  pub fn source(&self) -> &Arc<dyn ByteSource> {
    &self.source
  }

  pub fn len(&self) -> u64 {
    self.source.len()
  }

  pub fn is_empty(&self) -> bool {
    self.source.is_empty()
  }

  pub fn position(&self) -> u64 {
    self.pos
  }

  pub fn remaining(&self) -> u64 {
    self.len().saturating_sub(self.pos)
  }

  /// Move the cursor. Positions behind the end are rejected.
  pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
    let target = match pos {
      SeekFrom::Start(offset) => Some(offset),
      SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
      SeekFrom::End(delta) => self.len().checked_add_signed(delta),
    };
    match target {
      Some(target) if target <= self.len() => {
        self.pos = target;
        Ok(target)
      }
      _ => Err(PsdError::OutOfBounds {
        offset: target.unwrap_or(u64::MAX),
        size: 0,
        len: self.len(),
      }),
    }
  }

  pub fn skip(&mut self, n: u64) -> Result<()> {
    let target = self.pos.checked_add(n).filter(|t| *t <= self.len()).ok_or(PsdError::OutOfBounds {
      offset: self.pos,
      size: n,
      len: self.len(),
    })?;
    self.pos = target;
    Ok(())
  }

  /// Hint the source that the next `size` bytes will be read.
  pub fn prefetch(&self, size: u64) -> Result<()> {
    self.source.prefetch(self.pos, size.min(self.remaining()))
  }

  pub fn read_u8(&mut self) -> Result<u8> {
    let value = self.read_u8_at(self.pos)?;
    self.pos += 1;
    Ok(value)
  }

  pub fn read_u8_at(&self, offset: u64) -> Result<u8> {
    Ok(self.source.view(offset, 1)?[0])
  }

  pub fn read_i8(&mut self) -> Result<i8> {
    Ok(self.read_u8()? as i8)
  }

  pub fn read_i8_at(&self, offset: u64) -> Result<i8> {
    Ok(self.read_u8_at(offset)? as i8)
  }

  typed_read!(read_u16, read_u16_at, u16, 2);
  typed_read!(read_i16, read_i16_at, i16, 2);
  typed_read!(read_u32, read_u32_at, u32, 4);
  typed_read!(read_i32, read_i32_at, i32, 4);
  typed_read!(read_u64, read_u64_at, u64, 8);
  typed_read!(read_i64, read_i64_at, i64, 8);
  typed_read!(read_f32, read_f32_at, f32, 4);
  typed_read!(read_f64, read_f64_at, f64, 8);

  /// 16.16 fixed point number
  pub fn read_fixed(&mut self) -> Result<f64> {
    Ok(self.read_i32()? as f64 / 65536.0)
  }

  pub fn read_fixed_at(&self, offset: u64) -> Result<f64> {
    Ok(self.read_i32_at(offset)? as f64 / 65536.0)
  }

  pub fn read_bytes(&mut self, n: u64) -> Result<Bytes> {
    let buf = self.source.view(self.pos, n)?;
    self.pos += n;
    Ok(buf)
  }

  pub fn read_bytes_at(&self, offset: u64, n: u64) -> Result<Bytes> {
    self.source.view(offset, n)
  }

  /// Four byte signature like `8BPS` or `8BIM`.
  pub fn read_signature(&mut self) -> Result<[u8; 4]> {
    let buf = self.read_bytes(4)?;
    Ok([buf[0], buf[1], buf[2], buf[3]])
  }

  /// Length prefixed string, total size (including the length byte) padded to `align`.
  pub fn read_pascal_string(&mut self, align: u64) -> Result<String> {
    let len = self.read_u8()? as u64;
    let buf = self.read_bytes(len)?;
    self.skip(padding(len + 1, align))?;
    // Pascal strings are MacRoman, bytes above 0x7f are rare in layer names.
    Ok(buf.iter().map(|&b| b as char).collect())
  }

  /// u32 length in UTF-16 code units, followed by big-endian units.
  pub fn read_unicode_string(&mut self) -> Result<String> {
    let len = self.read_u32()? as u64;
    let buf = self.read_bytes(len * 2)?;
    let units: Vec<u16> = buf.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect();
    Ok(String::from_utf16_lossy(&units).trim_end_matches('\0').to_string())
  }

  /// Section length field, 64 bit wide in PSB documents.
  pub fn read_length(&mut self, wide: bool) -> Result<u64> {
    if wide { self.read_u64() } else { Ok(self.read_u32()? as u64) }
  }
}
