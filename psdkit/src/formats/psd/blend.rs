// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

use log::warn;
use serde::{Deserialize, Serialize};

/// Layer blend mode as stored in the four character blend key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlendMode {
  /// Only valid for groups, children blend directly with the backdrop
  PassThrough,
  #[default]
  Normal,
  Dissolve,
  Darken,
  Multiply,
  ColorBurn,
  LinearBurn,
  DarkerColor,
  Lighten,
  Screen,
  ColorDodge,
  LinearDodge,
  LighterColor,
  Overlay,
  SoftLight,
  HardLight,
  VividLight,
  LinearLight,
  PinLight,
  HardMix,
  Difference,
  Exclusion,
  Subtract,
  Divide,
  Hue,
  Saturation,
  Color,
  Luminosity,
}

const KEYS: [(&[u8; 4], BlendMode); 28] = [
  (b"pass", BlendMode::PassThrough),
  (b"norm", BlendMode::Normal),
  (b"diss", BlendMode::Dissolve),
  (b"dark", BlendMode::Darken),
  (b"mul ", BlendMode::Multiply),
  (b"idiv", BlendMode::ColorBurn),
  (b"lbrn", BlendMode::LinearBurn),
  (b"dkCl", BlendMode::DarkerColor),
  (b"lite", BlendMode::Lighten),
  (b"scrn", BlendMode::Screen),
  (b"div ", BlendMode::ColorDodge),
  (b"lddg", BlendMode::LinearDodge),
  (b"lgCl", BlendMode::LighterColor),
  (b"over", BlendMode::Overlay),
  (b"sLit", BlendMode::SoftLight),
  (b"hLit", BlendMode::HardLight),
  (b"vLit", BlendMode::VividLight),
  (b"lLit", BlendMode::LinearLight),
  (b"pLit", BlendMode::PinLight),
  (b"hMix", BlendMode::HardMix),
  (b"diff", BlendMode::Difference),
  (b"smud", BlendMode::Exclusion),
  (b"fsub", BlendMode::Subtract),
  (b"fdiv", BlendMode::Divide),
  (b"hue ", BlendMode::Hue),
  (b"sat ", BlendMode::Saturation),
  (b"colr", BlendMode::Color),
  (b"lum ", BlendMode::Luminosity),
];

impl BlendMode {
  /// Map a blend key, `None` for keys this library does not know.
  pub fn from_key(key: &[u8; 4]) -> Option<Self> {
    KEYS.iter().find(|(k, _)| *k == key).map(|(_, mode)| *mode)
  }

  /// Map a blend key, unknown keys fall back to [`BlendMode::Normal`].
  pub fn from_key_or_normal(key: &[u8; 4]) -> Self {
    Self::from_key(key).unwrap_or_else(|| {
      warn!("Unknown blend mode key '{}', using normal", String::from_utf8_lossy(key));
      Self::Normal
    })
  }

  pub fn key(&self) -> &'static [u8; 4] {
    KEYS.iter().find(|(_, mode)| mode == self).map(|(k, _)| *k).unwrap_or(b"norm")
  }

  /// Modes that can not be computed per channel.
  pub fn is_non_separable(&self) -> bool {
    matches!(self, Self::Hue | Self::Saturation | Self::Color | Self::Luminosity | Self::DarkerColor | Self::LighterColor)
  }
}
