// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

//! Layer compositor.
//!
//! Layers are blended bottom to top into float RGBA buffers with straight
//! alpha. Non pass-through groups are rendered into an isolated buffer first,
//! clipped layers are rendered onto an isolated copy of their base layer.
//! Only already decoded rasters are used, layers without pixels contribute
//! nothing.

use image::{RgbaImage, imageops};
use log::debug;
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::bits::f32_to_u8;
use crate::formats::psd::{BlendMode, ChannelId, ColorMode, Document, Layer, MaskArea, Rect};
use crate::pixarray::{Plane, RgbaF32};
use crate::{PsdError, Result, check_abort};

pub mod blend;
pub mod color;

use blend::{Rgba, blend_pixel, blend_pixel_atop, dissolve_threshold, lerp_pixel};
use color::ColorConverter;

/// RGBA buffer placed at `rect` in document coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
  pub rect: Rect,
  pub pixels: RgbaF32,
}

impl Canvas {
  /// Transparent canvas
  pub fn new(rect: Rect) -> Self {
    Self {
      rect,
      pixels: RgbaF32::new(rect.width() as usize, rect.height() as usize),
    }
  }

  /// Pixel at document position, transparent outside the canvas.
  #[inline(always)]
  pub fn at(&self, x: i32, y: i32) -> Rgba {
    if self.rect.contains(x, y) {
      *self.pixels.at((y - self.rect.top) as usize, (x - self.rect.left) as usize)
    } else {
      [0.0; 4]
    }
  }

  /// Fill every pixel from a function of its document position.
  fn fill_with<F>(&mut self, op: F)
  where
    F: Fn(i32, i32) -> Rgba + Send + Sync,
  {
    let rect = self.rect;
    self.pixels.par_pixel_rows_mut().enumerate().for_each(|(row, line)| {
      let y = rect.top + row as i32;
      for (col, pixel) in line.iter_mut().enumerate() {
        *pixel = op(rect.left + col as i32, y);
      }
    });
  }

  /// Update every pixel inside `region` with `op(x, y, current)`.
  fn update<F>(&mut self, region: Rect, op: F)
  where
    F: Fn(i32, i32, Rgba) -> Rgba + Send + Sync,
  {
    let region = region.intersect(&self.rect);
    if region.is_empty() {
      return;
    }
    let rect = self.rect;
    self.pixels.par_pixel_rows_mut().enumerate().for_each(|(row, line)| {
      let y = rect.top + row as i32;
      if y < region.top || y >= region.bottom {
        return;
      }
      for x in region.left..region.right {
        let pixel = &mut line[(x - rect.left) as usize];
        *pixel = op(x, y, *pixel);
      }
    });
  }

  pub fn to_image(&self) -> RgbaImage {
    let mut image = RgbaImage::new(self.rect.width(), self.rect.height());
    image.par_chunks_exact_mut(4).zip(self.pixels.data.par_iter()).for_each(|(out, px)| {
      for (o, v) in out.iter_mut().zip(px.iter()) {
        *o = f32_to_u8(*v);
      }
    });
    image
  }
}

/// Combined user and real user mask of a layer
struct MaskSampler<'a> {
  areas: Vec<(MaskArea, Option<&'a Plane>)>,
}

impl<'a> MaskSampler<'a> {
  fn new(layer: &'a Layer) -> Self {
    let raster = layer.raster();
    let areas = layer
      .mask
      .iter()
      .flat_map(|mask| {
        [ChannelId::UserMask, ChannelId::RealUserMask]
          .into_iter()
          .filter_map(|id| mask.area(id).map(|area| (id, *area)))
          .collect::<Vec<_>>()
      })
      .filter(|(_, area)| !area.disabled)
      .map(|(id, area)| (area, raster.and_then(|r| r.plane(id)).filter(|p| !p.data.data.is_empty())))
      .collect();
    Self { areas }
  }

  fn is_empty(&self) -> bool {
    self.areas.is_empty()
  }

  #[inline(always)]
  fn value(&self, x: i32, y: i32) -> f32 {
    self.areas.iter().fold(1.0, |acc, (area, plane)| {
      let default = area.default_color as f32 / 255.0;
      let v = match plane {
        Some(plane) if area.bounds.contains(x, y) => plane.sample(x, y).unwrap_or(default),
        _ => default,
      };
      acc * if area.invert { 1.0 - v } else { v }
    })
  }
}

struct Context<'a> {
  mode: ColorMode,
  abort: &'a CancellationToken,
  progress: &'a mut dyn FnMut(f32),
  rendered: usize,
  total: usize,
}

impl Context<'_> {
  fn tick(&mut self) {
    self.rendered += 1;
    if self.total > 0 {
      (self.progress)((self.rendered.min(self.total)) as f32 / self.total as f32);
    }
  }
}

/// Composite the visible layers of `document`.
pub fn composite(document: &Document, abort: &CancellationToken) -> Result<RgbaImage> {
  composite_with_progress(document, abort, |_| {})
}

/// Composite the visible layers, `progress` receives the fraction of rendered layers.
pub fn composite_with_progress<F>(document: &Document, abort: &CancellationToken, mut progress: F) -> Result<RgbaImage>
where
  F: FnMut(f32),
{
  if !document.layers.is_empty() {
    color::check_mode(document.header.color_mode)?;
  }
  let total = count_rendered(&document.layers);
  let mut ctx = Context {
    mode: document.header.color_mode,
    abort,
    progress: &mut progress,
    rendered: 0,
    total,
  };
  let mut canvas = Canvas::new(document.bounds());
  render_stack(&document.layers, &mut canvas, &mut ctx)?;
  check_abort(abort)?;
  if total == 0 {
    progress(1.0);
  }
  debug!("Composited {} layers", total);
  Ok(canvas.to_image())
}

/// Split a top-down layer list into bottom-up (base, clipped layers) runs.
fn clip_runs(layers: &[Layer]) -> Vec<(&Layer, Vec<&Layer>)> {
  let mut runs: Vec<(&Layer, Vec<&Layer>)> = Vec::new();
  for layer in layers.iter().rev() {
    match runs.last_mut() {
      Some((_, clipped)) if layer.clipping => clipped.push(layer),
      _ => runs.push((layer, Vec::new())),
    }
  }
  runs
}

/// Number of leaf layers the compositor will visit.
fn count_rendered(layers: &[Layer]) -> usize {
  clip_runs(layers)
    .into_iter()
    .filter(|(base, _)| base.visible)
    .map(|(base, clipped)| count_layer(base) + clipped.into_iter().filter(|l| l.visible).map(count_layer).sum::<usize>())
    .sum()
}

fn count_layer(layer: &Layer) -> usize {
  if layer.is_group { count_rendered(&layer.children) } else { 1 }
}

/// Union of the bounds of everything visible in `layers`.
fn content_bounds(layers: &[Layer]) -> Rect {
  layers.iter().filter(|l| l.visible).fold(Rect::default(), |acc, layer| {
    let bounds = if layer.is_group { content_bounds(&layer.children) } else { layer.bounds };
    acc.union(&bounds)
  })
}

fn layer_bounds(layer: &Layer) -> Rect {
  if layer.is_group { content_bounds(&layer.children) } else { layer.bounds }
}

fn render_stack(layers: &[Layer], canvas: &mut Canvas, ctx: &mut Context) -> Result<()> {
  for (base, clipped) in clip_runs(layers) {
    check_abort(ctx.abort)?;
    if !base.visible {
      continue;
    }
    let clipped: Vec<&Layer> = clipped.into_iter().filter(|l| l.visible).collect();
    if clipped.is_empty() {
      render_layer(base, canvas, ctx)?;
      continue;
    }
    let Some(mut content) = layer_content(base, canvas.rect, ctx)? else {
      // nothing to clip against, clipped layers are invisible
      for layer in clipped {
        skip_layer(layer, ctx);
      }
      continue;
    };
    for layer in clipped {
      check_abort(ctx.abort)?;
      if let Some(src) = layer_content(layer, content.rect, ctx)? {
        blend_atop(&mut content, &src, layer.blend_mode, opacity(layer));
      }
    }
    blend_over(canvas, &content, base.blend_mode, opacity(base), base.index as u32);
  }
  Ok(())
}

fn skip_layer(layer: &Layer, ctx: &mut Context) {
  for _ in 0..count_layer(layer) {
    ctx.tick();
  }
}

fn opacity(layer: &Layer) -> f32 {
  layer.opacity as f32 / 255.0
}

fn render_layer(layer: &Layer, canvas: &mut Canvas, ctx: &mut Context) -> Result<()> {
  if layer.is_group && layer.blend_mode == BlendMode::PassThrough {
    // children blend with the backdrop directly
    let mut result = canvas.clone();
    render_stack(&layer.children, &mut result, ctx)?;
    let mask = MaskSampler::new(layer);
    let opacity = opacity(layer);
    let region = content_bounds(&layer.children);
    canvas.update(region, |x, y, backdrop| {
      let t = if mask.is_empty() { opacity } else { opacity * mask.value(x, y) };
      lerp_pixel(backdrop, result.at(x, y), t)
    });
    return Ok(());
  }
  if let Some(src) = layer_content(layer, canvas.rect, ctx)? {
    blend_over(canvas, &src, layer.blend_mode, opacity(layer), layer.index as u32);
  }
  Ok(())
}

/// Pixels of a layer in isolation, without opacity and blend mode.
fn layer_content(layer: &Layer, clip: Rect, ctx: &mut Context) -> Result<Option<Canvas>> {
  let region = layer_bounds(layer).intersect(&clip);
  if layer.is_group {
    if region.is_empty() {
      skip_layer(layer, ctx);
      return Ok(None);
    }
    let mut content = Canvas::new(region);
    render_stack(&layer.children, &mut content, ctx)?;
    let mask = MaskSampler::new(layer);
    if !mask.is_empty() {
      content.update(region, |x, y, mut px| {
        px[3] *= mask.value(x, y);
        px
      });
    }
    return Ok(Some(content));
  }

  ctx.tick();
  let Some(raster) = layer.raster() else {
    return Ok(None);
  };
  if region.is_empty() {
    return Ok(None);
  }
  let converter = ColorConverter::new(ctx.mode, raster)?;
  let transparency = raster.plane(ChannelId::Transparency);
  let mask = MaskSampler::new(layer);
  let fill = layer.fill_opacity as f32 / 255.0;
  let mut content = Canvas::new(region);
  content.fill_with(|x, y| {
    let [r, g, b] = converter.rgb(x, y);
    let mut a = match transparency {
      Some(plane) => plane.sample(x, y).unwrap_or(0.0),
      None => 1.0,
    };
    a *= fill;
    if !mask.is_empty() {
      a *= mask.value(x, y);
    }
    [r, g, b, a]
  });
  Ok(Some(content))
}

fn blend_over(dst: &mut Canvas, src: &Canvas, mode: BlendMode, opacity: f32, seed: u32) {
  dst.update(src.rect, |x, y, backdrop| {
    let mut px = src.at(x, y);
    px[3] *= opacity;
    if mode == BlendMode::Dissolve {
      px[3] = if px[3] > dissolve_threshold(x, y, seed) { 1.0 } else { 0.0 };
    }
    blend_pixel(mode, backdrop, px)
  });
}

fn blend_atop(dst: &mut Canvas, src: &Canvas, mode: BlendMode, opacity: f32) {
  dst.update(src.rect, |x, y, backdrop| {
    let mut px = src.at(x, y);
    px[3] *= opacity;
    blend_pixel_atop(mode, backdrop, px)
  });
}

/// Render one layer, or the content of a group, scaled to fit into
/// `width` x `height` and centered on a transparent image.
pub fn layer_thumbnail(document: &Document, index: usize, width: u32, height: u32) -> Result<RgbaImage> {
  if width == 0 || height == 0 {
    return Err(PsdError::Unsupported(format!("Thumbnail size {}x{}", width, height)));
  }
  let layer = document.layer(index).ok_or(PsdError::LayerNotFound(index))?;
  if !layer.is_group {
    color::check_mode(document.header.color_mode)?;
  }
  let abort = CancellationToken::new();
  let mut progress = |_: f32| {};
  let mut ctx = Context {
    mode: document.header.color_mode,
    abort: &abort,
    progress: &mut progress,
    rendered: 0,
    total: 0,
  };
  let mut thumb = RgbaImage::new(width, height);
  let content = match layer_content(layer, document.bounds(), &mut ctx)? {
    Some(content) if !content.rect.is_empty() => content,
    _ => return Ok(thumb),
  };
  let image = content.to_image();
  let scale = (width as f64 / image.width() as f64).min(height as f64 / image.height() as f64);
  let tw = ((image.width() as f64 * scale).round() as u32).clamp(1, width);
  let th = ((image.height() as f64 * scale).round() as u32).clamp(1, height);
  let scaled = imageops::resize(&image, tw, th, imageops::FilterType::Triangle);
  imageops::replace(&mut thumb, &scaled, ((width - tw) / 2) as i64, ((height - th) / 2) as i64);
  Ok(thumb)
}
