// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

//! Photoshop document (PSD) and large document (PSB) structure.
//!
//! Parsing only walks the section headers and layer records. Channel image
//! data is located but never read here, see [`crate::decoder`].

use std::io::SeekFrom;
use std::sync::Arc;

use bytes::Bytes;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{PsdError, Result, reader::StreamReader, source::ByteSource};

mod blend;
mod header;
pub mod layer;
pub mod resources;
pub mod tree;

pub use blend::BlendMode;
pub use header::{ColorMode, HEADER_LEN, Header, MAX_PSB_DIMENSION, PSD_SIGNATURE};
pub use layer::{ChannelDescriptor, ChannelId, Layer, LayerMask, LayerPixels, MaskArea};
pub use resources::ImageResources;

/// Rectangle in document coordinates, `bottom` and `right` are exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
  pub top: i32,
  pub left: i32,
  pub bottom: i32,
  pub right: i32,
}

impl Rect {
  pub fn new(top: i32, left: i32, bottom: i32, right: i32) -> Self {
    Self { top, left, bottom, right }
  }

  /// Rectangle at the origin
  pub fn of_size(width: u32, height: u32) -> Self {
    Self::new(0, 0, height as i32, width as i32)
  }

  pub fn width(&self) -> u32 {
    (self.right as i64 - self.left as i64).max(0) as u32
  }

  pub fn height(&self) -> u32 {
    (self.bottom as i64 - self.top as i64).max(0) as u32
  }

  pub fn is_empty(&self) -> bool {
    self.width() == 0 || self.height() == 0
  }

  pub fn contains(&self, x: i32, y: i32) -> bool {
    x >= self.left && x < self.right && y >= self.top && y < self.bottom
  }

  pub fn intersect(&self, other: &Rect) -> Rect {
    let r = Rect::new(
      self.top.max(other.top),
      self.left.max(other.left),
      self.bottom.min(other.bottom),
      self.right.min(other.right),
    );
    if r.is_empty() { Rect::default() } else { r }
  }

  pub fn union(&self, other: &Rect) -> Rect {
    if self.is_empty() {
      return *other;
    }
    if other.is_empty() {
      return *self;
    }
    Rect::new(
      self.top.min(other.top),
      self.left.min(other.left),
      self.bottom.max(other.bottom),
      self.right.max(other.right),
    )
  }
}

/// Location of the Image Data section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedImage {
  /// Offset of the compression tag
  pub offset: u64,
  pub length: u64,
}

/// Serializable view of a layer and its children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerSummary {
  pub index: usize,
  pub id: Option<u32>,
  pub name: String,
  pub is_group: bool,
  pub is_open: bool,
  pub visible: bool,
  pub opacity: u8,
  pub fill_opacity: u8,
  pub clipping: bool,
  pub blend_mode: BlendMode,
  pub bounds: Rect,
  pub has_mask: bool,
  #[serde(skip_serializing_if = "Vec::is_empty", default)]
  pub children: Vec<LayerSummary>,
}

impl From<&Layer> for LayerSummary {
  fn from(layer: &Layer) -> Self {
    Self {
      index: layer.index,
      id: layer.id,
      name: layer.name.clone(),
      is_group: layer.is_group,
      is_open: layer.is_open,
      visible: layer.visible,
      opacity: layer.opacity,
      fill_opacity: layer.fill_opacity,
      clipping: layer.clipping,
      blend_mode: layer.blend_mode,
      bounds: layer.bounds,
      has_mask: layer.mask.is_some(),
      children: layer.children.iter().map(LayerSummary::from).collect(),
    }
  }
}

/// Parsed document
#[derive(Debug, Clone)]
pub struct Document {
  pub header: Header,
  /// Palette for indexed documents, duotone specification otherwise
  pub color_mode_data: Bytes,
  pub resources: ImageResources,
  /// Root layers, top-down
  pub layers: Vec<Layer>,
  /// Number of layer records including group markers
  pub layer_count: usize,
  /// The first alpha channel of the merged image holds its transparency
  pub merged_alpha: bool,
  pub merged: Option<MergedImage>,
  source: Arc<dyn ByteSource>,
}

impl Document {
  pub fn parse(source: Arc<dyn ByteSource>) -> Result<Self> {
    let mut reader = StreamReader::new(source.clone());
    reader.prefetch(HEADER_LEN)?;
    let header = Header::parse(&mut reader)?;
    let file_len = reader.len();

    let color_len = reader.read_u32()? as u64;
    check_section("Color mode data", reader.position(), color_len, file_len)?;
    let color_mode_data = reader.read_bytes(color_len)?;

    let res_len = reader.read_u32()? as u64;
    check_section("Image resources", reader.position(), res_len, file_len)?;
    let res_start = reader.position();
    let resources = ImageResources::parse(&mut reader.new_cursor(res_start), res_len)?;
    reader.seek(SeekFrom::Start(res_start + res_len))?;

    let lm_len = reader.read_length(header.is_psb())?;
    check_section("Layer and mask information", reader.position(), lm_len, file_len)?;
    let lm_start = reader.position();
    let info = if lm_len > 0 {
      let mut lm_reader = reader.new_cursor(lm_start);
      lm_reader.prefetch(lm_len)?;
      layer::parse_layer_and_mask(&mut lm_reader, lm_len, &header)?
    } else {
      layer::LayerInfo::default()
    };
    reader.seek(SeekFrom::Start(lm_start + lm_len))?;

    let merged = if reader.remaining() >= 2 {
      Some(MergedImage {
        offset: reader.position(),
        length: reader.remaining(),
      })
    } else {
      None
    };

    let layer_count = info.records.len();
    let layers = tree::build_tree(info.records)?;
    info!(
      "Parsed {}x{} {:?} document, depth {}, {} layer records",
      header.width, header.height, header.color_mode, header.depth, layer_count
    );
    Ok(Self {
      header,
      color_mode_data,
      resources,
      layers,
      layer_count,
      merged_alpha: info.merged_alpha,
      merged,
      source,
    })
  }

  pub fn source(&self) -> &Arc<dyn ByteSource> {
    &self.source
  }

  pub fn width(&self) -> u32 {
    self.header.width
  }

  pub fn height(&self) -> u32 {
    self.header.height
  }

  pub fn bounds(&self) -> Rect {
    Rect::of_size(self.width(), self.height())
  }

  /// Find a layer by its record index.
  pub fn layer(&self, index: usize) -> Option<&Layer> {
    self.iter().find(|l| l.index == index)
  }

  pub fn layer_mut(&mut self, index: usize) -> Option<&mut Layer> {
    // explicit stack, the tree may be deep
    let mut stack: Vec<&mut Layer> = self.layers.iter_mut().collect();
    while let Some(layer) = stack.pop() {
      if layer.index == index {
        return Some(layer);
      }
      stack.extend(layer.children.iter_mut());
    }
    None
  }

  /// Depth-first iteration, top-down within each level.
  pub fn iter(&self) -> impl Iterator<Item = &Layer> {
    let mut stack: Vec<&Layer> = self.layers.iter().rev().collect();
    std::iter::from_fn(move || {
      let layer = stack.pop()?;
      stack.extend(layer.children.iter().rev());
      Some(layer)
    })
  }

  /// Layers in record order, bottom to top as stored in the file.
  pub fn flat_layers(&self) -> Vec<&Layer> {
    let mut layers: Vec<&Layer> = self.iter().collect();
    layers.sort_by_key(|l| l.index);
    layers
  }

  /// Change the visibility flag, returns true when the flag changed.
  pub fn set_layer_visibility(&mut self, index: usize, visible: bool) -> bool {
    match self.layer_mut(index) {
      Some(layer) if layer.visible != visible => {
        debug!("Layer {} visible: {}", index, visible);
        layer.visible = visible;
        true
      }
      _ => false,
    }
  }

  pub fn set_group_open(&mut self, index: usize, open: bool) -> bool {
    match self.layer_mut(index) {
      Some(layer) if layer.is_group && layer.is_open != open => {
        layer.is_open = open;
        true
      }
      _ => false,
    }
  }

  pub fn summary(&self) -> Vec<LayerSummary> {
    self.layers.iter().map(LayerSummary::from).collect()
  }
}

fn check_section(name: &str, start: u64, len: u64, file_len: u64) -> Result<()> {
  match start.checked_add(len) {
    Some(end) if end <= file_len => Ok(()),
    _ => Err(PsdError::Format(format!(
      "{} section length {} at offset {} exceeds file size {}",
      name, len, start, file_len
    ))),
  }
}
