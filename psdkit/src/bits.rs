// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

/// Convert a normalized sample to 8 bit with rounding.
#[inline(always)]
pub fn f32_to_u8(val: f32) -> u8 {
  (clampf(val) * 255.0 + 0.5) as u8
}

#[inline(always)]
pub fn clampf(val: f32) -> f32 {
  if val.is_nan() { 0.0 } else { val.clamp(0.0, 1.0) }
}

/// Number of bytes to skip so that `len` becomes a multiple of `align`.
pub fn padding(len: u64, align: u64) -> u64 {
  if align <= 1 { 0 } else { (align - len % align) % align }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum Endian {
  Big,
  Little,
}

/// Photoshop documents are big-endian throughout.
impl Default for Endian {
  fn default() -> Self {
    Self::Big
  }
}

impl Endian {
  #[inline]
  pub fn read_u16(&self, buf: &[u8], offset: usize) -> u16 {
    match *self {
      Self::Big => BigEndian::read_u16(&buf[offset..]),
      Self::Little => LittleEndian::read_u16(&buf[offset..]),
    }
  }

  #[inline]
  pub fn read_i16(&self, buf: &[u8], offset: usize) -> i16 {
    match *self {
      Self::Big => BigEndian::read_i16(&buf[offset..]),
      Self::Little => LittleEndian::read_i16(&buf[offset..]),
    }
  }

  #[inline]
  pub fn read_u32(&self, buf: &[u8], offset: usize) -> u32 {
    match *self {
      Self::Big => BigEndian::read_u32(&buf[offset..]),
      Self::Little => LittleEndian::read_u32(&buf[offset..]),
    }
  }

  #[inline]
  pub fn read_i32(&self, buf: &[u8], offset: usize) -> i32 {
    match *self {
      Self::Big => BigEndian::read_i32(&buf[offset..]),
      Self::Little => LittleEndian::read_i32(&buf[offset..]),
    }
  }

  #[inline]
  pub fn read_u64(&self, buf: &[u8], offset: usize) -> u64 {
    match *self {
      Self::Big => BigEndian::read_u64(&buf[offset..]),
      Self::Little => LittleEndian::read_u64(&buf[offset..]),
    }
  }

  #[inline]
  pub fn read_i64(&self, buf: &[u8], offset: usize) -> i64 {
    match *self {
      Self::Big => BigEndian::read_i64(&buf[offset..]),
      Self::Little => LittleEndian::read_i64(&buf[offset..]),
    }
  }

  #[inline]
  pub fn read_f32(&self, buf: &[u8], offset: usize) -> f32 {
    match *self {
      Self::Big => BigEndian::read_f32(&buf[offset..]),
      Self::Little => LittleEndian::read_f32(&buf[offset..]),
    }
  }

  #[inline]
  pub fn read_f64(&self, buf: &[u8], offset: usize) -> f64 {
    match *self {
      Self::Big => BigEndian::read_f64(&buf[offset..]),
      Self::Little => LittleEndian::read_f64(&buf[offset..]),
    }
  }
}
