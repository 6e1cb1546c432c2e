// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

//! Blend mode math on straight alpha RGBA values in `[0, 1]`.

use crate::formats::psd::BlendMode;

pub type Rgb = [f32; 3];
pub type Rgba = [f32; 4];

#[inline(always)]
fn clamp(v: f32) -> f32 {
  v.clamp(0.0, 1.0)
}

#[inline(always)]
fn color_burn(cb: f32, cs: f32) -> f32 {
  if cb >= 1.0 {
    1.0
  } else if cs <= 0.0 {
    0.0
  } else {
    1.0 - ((1.0 - cb) / cs).min(1.0)
  }
}

#[inline(always)]
fn color_dodge(cb: f32, cs: f32) -> f32 {
  if cb <= 0.0 {
    0.0
  } else if cs >= 1.0 {
    1.0
  } else {
    (cb / (1.0 - cs)).min(1.0)
  }
}

#[inline(always)]
fn hard_light(cb: f32, cs: f32) -> f32 {
  if cs <= 0.5 {
    cb * 2.0 * cs
  } else {
    let s = 2.0 * cs - 1.0;
    cb + s - cb * s
  }
}

#[inline(always)]
fn soft_light(cb: f32, cs: f32) -> f32 {
  if cs <= 0.5 {
    cb - (1.0 - 2.0 * cs) * cb * (1.0 - cb)
  } else {
    let d = if cb <= 0.25 { ((16.0 * cb - 12.0) * cb + 4.0) * cb } else { cb.sqrt() };
    cb + (2.0 * cs - 1.0) * (d - cb)
  }
}

/// Separable blend function `B(Cb, Cs)` for one channel.
#[inline(always)]
pub fn blend_channel(mode: BlendMode, cb: f32, cs: f32) -> f32 {
  match mode {
    BlendMode::Darken => cb.min(cs),
    BlendMode::Multiply => cb * cs,
    BlendMode::ColorBurn => color_burn(cb, cs),
    BlendMode::LinearBurn => clamp(cb + cs - 1.0),
    BlendMode::Lighten => cb.max(cs),
    BlendMode::Screen => cb + cs - cb * cs,
    BlendMode::ColorDodge => color_dodge(cb, cs),
    BlendMode::LinearDodge => clamp(cb + cs),
    BlendMode::Overlay => hard_light(cs, cb),
    BlendMode::SoftLight => soft_light(cb, cs),
    BlendMode::HardLight => hard_light(cb, cs),
    BlendMode::VividLight => {
      if cs <= 0.5 {
        color_burn(cb, 2.0 * cs)
      } else {
        color_dodge(cb, 2.0 * (cs - 0.5))
      }
    }
    BlendMode::LinearLight => clamp(cb + 2.0 * cs - 1.0),
    BlendMode::PinLight => {
      if cs <= 0.5 {
        cb.min(2.0 * cs)
      } else {
        cb.max(2.0 * cs - 1.0)
      }
    }
    BlendMode::HardMix => {
      if cb + cs >= 1.0 {
        1.0
      } else {
        0.0
      }
    }
    BlendMode::Difference => (cb - cs).abs(),
    BlendMode::Exclusion => cb + cs - 2.0 * cb * cs,
    BlendMode::Subtract => clamp(cb - cs),
    BlendMode::Divide => {
      if cs <= 0.0 {
        if cb <= 0.0 { 0.0 } else { 1.0 }
      } else {
        (cb / cs).min(1.0)
      }
    }
    _ => cs,
  }
}

#[inline(always)]
pub fn lum(c: Rgb) -> f32 {
  0.3 * c[0] + 0.59 * c[1] + 0.11 * c[2]
}

fn clip_color(c: Rgb) -> Rgb {
  let l = lum(c);
  let n = c[0].min(c[1]).min(c[2]);
  let x = c[0].max(c[1]).max(c[2]);
  let mut out = c;
  if n < 0.0 && l - n > f32::EPSILON {
    out = out.map(|v| l + (v - l) * l / (l - n));
  }
  if x > 1.0 && x - l > f32::EPSILON {
    out = out.map(|v| l + (v - l) * (1.0 - l) / (x - l));
  }
  out.map(clamp)
}

fn set_lum(c: Rgb, l: f32) -> Rgb {
  let d = l - lum(c);
  clip_color(c.map(|v| v + d))
}

fn sat(c: Rgb) -> f32 {
  c[0].max(c[1]).max(c[2]) - c[0].min(c[1]).min(c[2])
}

fn set_sat(c: Rgb, s: f32) -> Rgb {
  let max = c[0].max(c[1]).max(c[2]);
  let min = c[0].min(c[1]).min(c[2]);
  if max - min <= f32::EPSILON {
    return [0.0; 3];
  }
  c.map(|v| (v - min) * s / (max - min))
}

/// `B(Cb, Cs)` on a whole color.
#[inline(always)]
pub fn blend_rgb(mode: BlendMode, cb: Rgb, cs: Rgb) -> Rgb {
  match mode {
    BlendMode::Hue => set_lum(set_sat(cs, sat(cb)), lum(cb)),
    BlendMode::Saturation => set_lum(set_sat(cb, sat(cs)), lum(cb)),
    BlendMode::Color => set_lum(cs, lum(cb)),
    BlendMode::Luminosity => set_lum(cb, lum(cs)),
    BlendMode::DarkerColor => {
      if lum(cs) < lum(cb) {
        cs
      } else {
        cb
      }
    }
    BlendMode::LighterColor => {
      if lum(cs) > lum(cb) {
        cs
      } else {
        cb
      }
    }
    BlendMode::Normal | BlendMode::PassThrough | BlendMode::Dissolve => cs,
    _ => [
      blend_channel(mode, cb[0], cs[0]),
      blend_channel(mode, cb[1], cs[1]),
      blend_channel(mode, cb[2], cs[2]),
    ],
  }
}

/// Source-over composition of `cs` onto `cb` with blend function `mode`.
#[inline(always)]
pub fn blend_pixel(mode: BlendMode, cb: Rgba, cs: Rgba) -> Rgba {
  let a_s = cs[3];
  if a_s <= 0.0 {
    return cb;
  }
  let a_b = cb[3];
  let a_o = a_s + a_b * (1.0 - a_s);
  let b = blend_rgb(mode, [cb[0], cb[1], cb[2]], [cs[0], cs[1], cs[2]]);
  let mut out = [0.0, 0.0, 0.0, a_o];
  for i in 0..3 {
    let mixed = (1.0 - a_b) * cs[i] + a_b * b[i];
    out[i] = clamp((a_s * mixed + (1.0 - a_s) * a_b * cb[i]) / a_o);
  }
  out
}

/// Source-atop composition: the backdrop alpha is kept.
#[inline(always)]
pub fn blend_pixel_atop(mode: BlendMode, cb: Rgba, cs: Rgba) -> Rgba {
  let a_s = cs[3];
  let a_b = cb[3];
  if a_s <= 0.0 || a_b <= 0.0 {
    return cb;
  }
  let b = blend_rgb(mode, [cb[0], cb[1], cb[2]], [cs[0], cs[1], cs[2]]);
  let mut out = [0.0, 0.0, 0.0, a_b];
  for i in 0..3 {
    let mixed = (1.0 - a_b) * cs[i] + a_b * b[i];
    out[i] = clamp(a_s * mixed + (1.0 - a_s) * cb[i]);
  }
  out
}

/// Interpolate between two straight alpha pixels in premultiplied space.
#[inline(always)]
pub fn lerp_pixel(from: Rgba, to: Rgba, t: f32) -> Rgba {
  if t >= 1.0 {
    return to;
  }
  if t <= 0.0 {
    return from;
  }
  let a = from[3] * (1.0 - t) + to[3] * t;
  if a <= 0.0 {
    return [0.0; 4];
  }
  let mut out = [0.0, 0.0, 0.0, a];
  for i in 0..3 {
    out[i] = clamp((from[i] * from[3] * (1.0 - t) + to[i] * to[3] * t) / a);
  }
  out
}

/// Deterministic per-pixel threshold in `[0, 1)` for dissolve.
#[inline(always)]
pub fn dissolve_threshold(x: i32, y: i32, seed: u32) -> f32 {
  let mut h = (x as u32).wrapping_mul(0x9E37_79B1) ^ (y as u32).wrapping_mul(0x85EB_CA77) ^ seed.wrapping_mul(0xC2B2_AE3D);
  h ^= h >> 16;
  h = h.wrapping_mul(0x7FEB_352D);
  h ^= h >> 15;
  h = h.wrapping_mul(0x846C_A68B);
  h ^= h >> 16;
  (h >> 8) as f32 / (1 << 24) as f32
}
