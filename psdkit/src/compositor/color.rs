// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

use crate::formats::psd::{ChannelId, ColorMode};
use crate::pixarray::{LayerRaster, Plane};
use crate::{PsdError, Result};

/// XYZ (D50) to linear sRGB, Bradford adapted
const XYZ_D50_TO_SRGB: [[f32; 3]; 3] = [
  [3.133_856_1, -1.616_866_7, -0.490_614_6],
  [-0.978_768_4, 1.916_141_5, 0.033_454_0],
  [0.071_945_3, -0.228_991_4, 1.405_242_7],
];
const D50_WHITE: [f32; 3] = [0.9642, 1.0, 0.8249];

/// Converts the color planes of a layer to RGB.
#[derive(Debug, Clone, Copy)]
pub struct ColorConverter<'a> {
  mode: ColorMode,
  planes: [Option<&'a Plane>; 4],
}

impl<'a> ColorConverter<'a> {
  pub fn new(mode: ColorMode, raster: &'a LayerRaster) -> Result<Self> {
    check_mode(mode)?;
    let planes = [0, 1, 2, 3].map(|i| raster.plane(ChannelId::Color(i)));
    Ok(Self { mode, planes })
  }

  #[inline(always)]
  fn channel(&self, i: usize, x: i32, y: i32) -> f32 {
    self.planes[i].and_then(|p| p.sample(x, y)).unwrap_or(0.0)
  }

  /// RGB color at document position `(x, y)`
  #[inline(always)]
  pub fn rgb(&self, x: i32, y: i32) -> [f32; 3] {
    match self.mode {
      ColorMode::Rgb => [self.channel(0, x, y), self.channel(1, x, y), self.channel(2, x, y)],
      ColorMode::Cmyk => {
        // samples hold 1 - ink
        let k = self.channel(3, x, y);
        [self.channel(0, x, y) * k, self.channel(1, x, y) * k, self.channel(2, x, y) * k]
      }
      ColorMode::Lab => lab_to_srgb(self.channel(0, x, y), self.channel(1, x, y), self.channel(2, x, y)),
      _ => {
        let v = self.channel(0, x, y);
        [v, v, v]
      }
    }
  }
}

/// Color modes the compositor can render layers in.
pub fn check_mode(mode: ColorMode) -> Result<()> {
  match mode {
    ColorMode::Rgb | ColorMode::Grayscale | ColorMode::Duotone | ColorMode::Cmyk | ColorMode::Lab => Ok(()),
    other => Err(PsdError::Unsupported(format!("Compositing layers of {:?} documents", other))),
  }
}

/// Normalized Lab samples (L, a + 128, b + 128 scaled to `[0, 1]`) to sRGB.
pub fn lab_to_srgb(l: f32, a: f32, b: f32) -> [f32; 3] {
  let l = l * 100.0;
  let a = a * 255.0 - 128.0;
  let b = b * 255.0 - 128.0;
  let fy = (l + 16.0) / 116.0;
  let f = [fy + a / 500.0, fy, fy - b / 200.0];
  let xyz: [f32; 3] = std::array::from_fn(|i| {
    let t = f[i];
    let v = if t > 6.0 / 29.0 { t * t * t } else { 3.0 * (6.0_f32 / 29.0).powi(2) * (t - 4.0 / 29.0) };
    v * D50_WHITE[i]
  });
  XYZ_D50_TO_SRGB.map(|row| {
    let linear = row[0] * xyz[0] + row[1] * xyz[1] + row[2] * xyz[2];
    srgb_gamma(linear.clamp(0.0, 1.0))
  })
}

#[inline(always)]
fn srgb_gamma(v: f32) -> f32 {
  if v <= 0.003_130_8 { 12.92 * v } else { 1.055 * v.powf(1.0 / 2.4) - 0.055 }
}
