// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

use rayon::prelude::*;

use crate::formats::psd::{ChannelId, Rect};

/// Row-major 2D array of samples
#[derive(Debug, Clone, PartialEq)]
pub struct Pix2D<T> {
  pub width: usize,
  pub height: usize,
  pub data: Vec<T>,
}

pub type PixF32 = Pix2D<f32>;

impl<T> Pix2D<T>
where
  T: Copy + Default + Send + Sync,
{
  pub fn new_with(data: Vec<T>, width: usize, height: usize) -> Self {
    debug_assert_eq!(data.len(), height * width);
    Self { data, width, height }
  }

  pub fn new_filled(width: usize, height: usize, value: T) -> Self {
    Self {
      data: vec![value; width * height],
      width,
      height,
    }
  }

  pub fn pixel_rows(&self) -> std::slice::ChunksExact<'_, T> {
    self.data.chunks_exact(self.width.max(1))
  }

  #[inline(always)]
  pub fn at(&self, row: usize, col: usize) -> &T {
    &self.data[row * self.width + col]
  }

  #[inline(always)]
  pub fn at_mut(&mut self, row: usize, col: usize) -> &mut T {
    &mut self.data[row * self.width + col]
  }

  /// Sample at `(row, col)` or `None` outside of the array.
  #[inline(always)]
  pub fn get(&self, row: i64, col: i64) -> Option<T> {
    if row < 0 || col < 0 || row as usize >= self.height || col as usize >= self.width {
      None
    } else {
      Some(self.data[row as usize * self.width + col as usize])
    }
  }
}

impl<T> Default for Pix2D<T> {
  fn default() -> Self {
    Self {
      width: 0,
      height: 0,
      data: Vec::new(),
    }
  }
}

/// RGBA pixels, straight (non-premultiplied) alpha
#[derive(Debug, Clone, PartialEq)]
pub struct Rgba2D<T> {
  pub width: usize,
  pub height: usize,
  pub data: Vec<[T; 4]>,
}

pub type RgbaF32 = Rgba2D<f32>;

impl<T> Rgba2D<T>
where
  T: Copy + Default + Send + Sync,
{
  pub fn new(width: usize, height: usize) -> Self {
    Self {
      data: vec![<[T; 4]>::default(); width * height],
      width,
      height,
    }
  }

  pub fn par_pixel_rows_mut(&mut self) -> rayon::slice::ChunksExactMut<'_, [T; 4]> {
    self.data.par_chunks_exact_mut(self.width.max(1))
  }

  #[inline(always)]
  pub fn at(&self, row: usize, col: usize) -> &[T; 4] {
    &self.data[row * self.width + col]
  }
}

/// One decoded channel of a layer
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
  pub id: ChannelId,
  /// Position of the samples in document coordinates
  pub rect: Rect,
  pub data: PixF32,
}

impl Plane {
  /// Sample at document position `(x, y)`, `None` outside the plane.
  #[inline(always)]
  pub fn sample(&self, x: i32, y: i32) -> Option<f32> {
    self.data.get(y as i64 - self.rect.top as i64, x as i64 - self.rect.left as i64)
  }
}

/// Decoded channels of one layer, samples normalized to `[0, 1]`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerRaster {
  pub planes: Vec<Plane>,
}

impl LayerRaster {
  pub fn plane(&self, id: ChannelId) -> Option<&Plane> {
    self.planes.iter().find(|p| p.id == id)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn plane_sampling_uses_document_coordinates() {
    let plane = Plane {
      id: ChannelId::Color(0),
      rect: Rect::new(10, 20, 12, 23),
      data: PixF32::new_with(vec![0.0, 0.1, 0.2, 0.3, 0.4, 0.5], 3, 2),
    };
    assert_eq!(plane.sample(20, 10), Some(0.0));
    assert_eq!(plane.sample(22, 11), Some(0.5));
    assert_eq!(plane.sample(23, 11), None);
    assert_eq!(plane.sample(19, 10), None);
  }

  #[test]
  fn rows() {
    let mut pix = Pix2D::<u8>::new_filled(3, 2, 7);
    *pix.at_mut(1, 2) = 9;
    assert_eq!(pix.pixel_rows().count(), 2);
    assert_eq!(pix.pixel_rows().nth(1), Some(&[7, 7, 9][..]));
    assert_eq!(pix.get(1, 2), Some(9));
    assert_eq!(pix.get(2, 0), None);
    assert_eq!(pix.get(0, -1), None);
  }
}
