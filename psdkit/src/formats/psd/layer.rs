// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

use std::io::SeekFrom;
use std::sync::{Arc, OnceLock};

use log::{debug, warn};
use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};

use super::{BlendMode, Header, Rect};
use crate::{PsdError, Result, bits::padding, pixarray::LayerRaster, reader::StreamReader};

/// Additional layer information keys with 64 bit lengths in PSB documents
const PSB_WIDE_KEYS: [&[u8; 4]; 13] = [
  b"LMsk", b"Lr16", b"Lr32", b"Layr", b"Mt16", b"Mt32", b"Mtrn", b"Alph", b"FMsk", b"lnk2", b"FEid", b"FXid", b"PxSD",
];

/// End offset of a block of `len` bytes at `start`.
pub(crate) fn block_end(what: &str, start: u64, len: u64) -> Result<u64> {
  start
    .checked_add(len)
    .ok_or_else(|| PsdError::Format(format!("{} length {} at offset {} overflows", what, len, start)))
}

pub(crate) fn is_info_signature(sig: &[u8; 4]) -> bool {
  sig == b"8BIM" || sig == b"8B64"
}

pub(crate) fn read_info_length(reader: &mut StreamReader, key: &[u8; 4], wide: bool) -> Result<u64> {
  reader.read_length(wide && PSB_WIDE_KEYS.contains(&key))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelId {
  /// Color channel 0.. (red, green, blue for RGB documents)
  Color(u16),
  /// -1
  Transparency,
  /// -2
  UserMask,
  /// -3
  RealUserMask,
  Unknown(i16),
}

impl From<i16> for ChannelId {
  fn from(id: i16) -> Self {
    match id {
      0.. => Self::Color(id as u16),
      -1 => Self::Transparency,
      -2 => Self::UserMask,
      -3 => Self::RealUserMask,
      _ => Self::Unknown(id),
    }
  }
}

impl ChannelId {
  pub fn is_mask(&self) -> bool {
    matches!(self, Self::UserMask | Self::RealUserMask)
  }
}

/// Location of one channel's compressed data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelDescriptor {
  pub id: ChannelId,
  /// Absolute offset of the compression tag
  pub offset: u64,
  /// Length including the 2 byte compression tag
  pub length: u64,
  /// Area covered by the channel
  pub rect: Rect,
  /// Size of the plane after decompression
  pub decoded_len: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskArea {
  pub bounds: Rect,
  /// 0 or 255, value outside of `bounds`
  pub default_color: u8,
  /// Position relative to the layer
  pub relative: bool,
  pub disabled: bool,
  pub invert: bool,
}

impl MaskArea {
  fn from_flags(bounds: Rect, default_color: u8, flags: u8) -> Self {
    Self {
      bounds,
      default_color,
      relative: flags & 0x01 != 0,
      disabled: flags & 0x02 != 0,
      invert: flags & 0x04 != 0,
    }
  }
}

/// Layer mask data, channel -2 and optional channel -3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerMask {
  pub user: MaskArea,
  pub real: Option<MaskArea>,
}

impl LayerMask {
  pub fn area(&self, id: ChannelId) -> Option<&MaskArea> {
    match id {
      ChannelId::UserMask => Some(&self.user),
      ChannelId::RealUserMask => self.real.as_ref(),
      _ => None,
    }
  }

  fn parse(reader: &mut StreamReader, len: u64) -> Result<Option<Self>> {
    if len < 20 {
      return Ok(None);
    }
    let bounds = read_rect(reader)?;
    let default_color = reader.read_u8()?;
    let flags = reader.read_u8()?;
    let user = MaskArea::from_flags(bounds, default_color, flags);
    if len == 20 {
      return Ok(Some(Self { user, real: None }));
    }
    if flags & 0x10 != 0 {
      // density and feather parameters are not rendered
      let params = reader.read_u8()?;
      for (bit, size) in [(0x01, 1), (0x02, 8), (0x04, 1), (0x08, 8)] {
        if params & bit != 0 {
          reader.skip(size)?;
        }
      }
    }
    let real = if len >= 36 {
      let real_flags = reader.read_u8()?;
      let real_default = reader.read_u8()?;
      let real_bounds = read_rect(reader)?;
      Some(MaskArea::from_flags(real_bounds, real_default, real_flags))
    } else {
      None
    };
    Ok(Some(Self { user, real }))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, Serialize, Deserialize)]
#[repr(u32)]
#[serde(rename_all = "camelCase")]
pub enum DividerType {
  Other = 0,
  OpenFolder = 1,
  ClosedFolder = 2,
  /// Hidden marker closing a group, in file order it precedes the children
  BoundingSection = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionDivider {
  pub kind: DividerType,
  pub blend_mode: Option<BlendMode>,
}

/// One entry of the flat layer record list, in file order
#[derive(Debug, Clone, PartialEq)]
pub struct LayerRecord {
  pub index: usize,
  pub name: String,
  pub id: Option<u32>,
  pub bounds: Rect,
  pub channels: Vec<ChannelDescriptor>,
  pub blend_mode: BlendMode,
  pub opacity: u8,
  pub fill_opacity: u8,
  pub clipping: bool,
  pub flags: u8,
  pub mask: Option<LayerMask>,
  pub divider: Option<SectionDivider>,
}

impl LayerRecord {
  pub fn visible(&self) -> bool {
    self.flags & 0x02 == 0
  }

  fn parse(reader: &mut StreamReader, index: usize, header: &Header) -> Result<Self> {
    let wide = header.is_psb();
    let bounds = read_rect(reader)?;
    let channel_count = reader.read_u16()?;
    if channel_count > 56 {
      return Err(PsdError::Format(format!("Layer {} declares {} channels", index, channel_count)));
    }
    let mut channels = Vec::with_capacity(channel_count as usize);
    for _ in 0..channel_count {
      let id = ChannelId::from(reader.read_i16()?);
      let length = reader.read_length(wide)?;
      channels.push(ChannelDescriptor {
        id,
        offset: 0,
        length,
        rect: bounds,
        decoded_len: 0,
      });
    }

    let signature = reader.read_signature()?;
    if signature != *b"8BIM" {
      return Err(PsdError::Format(format!("Invalid blend mode signature {:02x?} in layer {}", signature, index)));
    }
    let blend_mode = BlendMode::from_key_or_normal(&reader.read_signature()?);
    let opacity = reader.read_u8()?;
    let clipping = reader.read_u8()? != 0;
    let flags = reader.read_u8()?;
    reader.skip(1)?; // filler

    let extra_len = reader.read_u32()? as u64;
    let extra_end = block_end("Layer extra data", reader.position(), extra_len)?;
    if extra_end > reader.len() {
      return Err(PsdError::Format(format!("Extra data of layer {} exceeds file", index)));
    }

    let mask_len = reader.read_u32()? as u64;
    let mask_start = reader.position();
    let mask = LayerMask::parse(&mut reader.new_cursor(mask_start), mask_len)?;
    reader.skip(mask_len)?;

    let ranges_len = reader.read_u32()? as u64;
    reader.skip(ranges_len)?;

    let mut record = Self {
      index,
      name: reader.read_pascal_string(4)?,
      id: None,
      bounds,
      channels,
      blend_mode,
      opacity,
      fill_opacity: 255,
      clipping,
      flags,
      mask,
      divider: None,
    };

    while reader.position() + 12 <= extra_end {
      let signature = reader.read_signature()?;
      if !is_info_signature(&signature) {
        warn!("Layer {}: invalid additional info signature {:02x?}, skipping rest", index, signature);
        break;
      }
      let key = reader.read_signature()?;
      let len = read_info_length(reader, &key, wide)?;
      let data_start = reader.position();
      if !block_end("Additional info", data_start, len).is_ok_and(|data_end| data_end <= extra_end) {
        warn!("Layer {}: additional info '{}' overruns layer record", index, String::from_utf8_lossy(&key));
        break;
      }
      let mut data = reader.new_cursor(data_start);
      if let Err(err) = record.interpret_info(&key, &mut data, len) {
        warn!("Layer {}: ignoring malformed '{}': {}", index, String::from_utf8_lossy(&key), err);
      }
      reader.seek(SeekFrom::Start((data_start + len + padding(len, 2)).min(extra_end)))?;
    }
    reader.seek(SeekFrom::Start(extra_end))?;

    for channel in record.channels.iter_mut() {
      channel.rect = match (channel.id, record.mask.as_ref()) {
        (ChannelId::UserMask, Some(mask)) => mask.user.bounds,
        (ChannelId::RealUserMask, Some(LayerMask { real: Some(real), .. })) => real.bounds,
        (id, _) if id.is_mask() => Rect::default(),
        _ => record.bounds,
      };
      channel.decoded_len = (channel.rect.height() as u64).saturating_mul(header.row_bytes(channel.rect.width() as u64));
    }
    Ok(record)
  }

  fn interpret_info(&mut self, key: &[u8; 4], data: &mut StreamReader, len: u64) -> Result<()> {
    match key {
      b"luni" if len >= 4 => {
        let name = data.read_unicode_string()?;
        if !name.is_empty() {
          self.name = name;
        }
      }
      b"lsct" | b"lsdk" if len >= 4 => {
        let kind = data.read_u32()?;
        let kind = DividerType::try_from(kind).unwrap_or_else(|_| {
          warn!("Layer {}: unknown section divider type {}", self.index, kind);
          DividerType::Other
        });
        let blend_mode = if len >= 12 && is_info_signature(&data.read_signature()?) {
          Some(BlendMode::from_key_or_normal(&data.read_signature()?))
        } else {
          None
        };
        self.divider = Some(SectionDivider { kind, blend_mode });
      }
      b"lyid" if len >= 4 => self.id = Some(data.read_u32()?),
      b"iOpa" if len >= 1 => self.fill_opacity = data.read_u8()?,
      _ => {}
    }
    Ok(())
  }
}

fn read_rect(reader: &mut StreamReader) -> Result<Rect> {
  Ok(Rect {
    top: reader.read_i32()?,
    left: reader.read_i32()?,
    bottom: reader.read_i32()?,
    right: reader.read_i32()?,
  })
}

/// Records from a layer info structure
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerInfo {
  pub records: Vec<LayerRecord>,
  /// Negative layer count: first alpha channel holds the merged transparency
  pub merged_alpha: bool,
}

impl LayerInfo {
  /// Parse a layer info structure occupying `[reader.position(), +len)`.
  pub fn parse(reader: &mut StreamReader, len: u64, header: &Header) -> Result<Self> {
    let end = block_end("Layer info", reader.position(), len)?;
    if len < 2 {
      return Ok(Self::default());
    }
    let raw_count = reader.read_i16()?;
    let count = raw_count.unsigned_abs() as usize;
    let mut records = Vec::with_capacity(count);
    for index in 0..count {
      records.push(LayerRecord::parse(reader, index, header)?);
    }

    // Channel image data follows the records in the same order
    let mut offset = reader.position();
    for channel in records.iter_mut().flat_map(|r| r.channels.iter_mut()) {
      channel.offset = offset;
      offset = offset
        .checked_add(channel.length)
        .ok_or_else(|| PsdError::Format("Channel length overflow".into()))?;
    }
    if offset > end {
      return Err(PsdError::Format(format!(
        "Channel image data ends at {} behind the layer info section end {}",
        offset, end
      )));
    }
    debug!("Parsed {} layer records", records.len());
    Ok(Self {
      records,
      merged_alpha: raw_count < 0,
    })
  }
}

/// Layer and mask information section starting at the reader position.
pub(crate) fn parse_layer_and_mask(reader: &mut StreamReader, len: u64, header: &Header) -> Result<LayerInfo> {
  let wide = header.is_psb();
  let end = block_end("Layer and mask information", reader.position(), len)?;

  let info_len = reader.read_length(wide)?;
  let info_start = reader.position();
  let info_end = block_end("Layer info", info_start, info_len)?;
  if info_end > end {
    return Err(PsdError::Format(format!("Layer info length {} exceeds layer and mask section", info_len)));
  }
  let mut info = LayerInfo::parse(&mut reader.new_cursor(info_start), info_len, header)?;
  reader.seek(SeekFrom::Start(info_end))?;

  // Global layer mask info
  if reader.position() + 4 <= end {
    let mask_len = reader.read_u32()? as u64;
    if block_end("Global layer mask info", reader.position(), mask_len)? > end {
      return Err(PsdError::Format("Global layer mask info exceeds layer and mask section".into()));
    }
    reader.skip(mask_len)?;
  }

  // Trailing additional layer information, 16 and 32 bit documents keep their layers here
  while reader.position() + 12 <= end {
    if !align_to_signature(reader, end)? {
      break;
    }
    let _signature = reader.read_signature()?;
    let key = reader.read_signature()?;
    let block_len = read_info_length(reader, &key, wide)?;
    let data_start = reader.position();
    let data_end = match block_end("Additional info", data_start, block_len) {
      Ok(data_end) if data_end <= end => data_end,
      _ => {
        warn!("Additional info '{}' overruns layer and mask section", String::from_utf8_lossy(&key));
        break;
      }
    };
    if (&key == b"Lr16" || &key == b"Lr32") && info.records.is_empty() {
      debug!("Reading layers from '{}' block", String::from_utf8_lossy(&key));
      info = LayerInfo::parse(&mut reader.new_cursor(data_start), block_len, header)?;
    }
    reader.seek(SeekFrom::Start(data_end))?;
  }
  Ok(info)
}

/// Skip up to three padding bytes until a block signature is found.
fn align_to_signature(reader: &mut StreamReader, end: u64) -> Result<bool> {
  for _ in 0..4 {
    if reader.position() + 12 > end {
      return Ok(false);
    }
    let sig = reader.read_bytes_at(reader.position(), 4)?;
    if is_info_signature(&[sig[0], sig[1], sig[2], sig[3]]) {
      return Ok(true);
    }
    reader.skip(1)?;
  }
  Ok(false)
}

/// Decoded pixel state of a layer
#[derive(Debug, Clone)]
pub enum LayerPixels {
  Decoded(Arc<LayerRaster>),
  /// Decoding failed, the layer renders as fully transparent.
  Failed(PsdError),
}

/// Node of the layer tree
#[derive(Debug, Clone)]
pub struct Layer {
  /// Position in the flat record list (file order, bottom to top)
  pub index: usize,
  pub id: Option<u32>,
  pub name: String,
  pub is_group: bool,
  pub is_open: bool,
  pub visible: bool,
  pub opacity: u8,
  pub fill_opacity: u8,
  pub clipping: bool,
  pub transparency_protected: bool,
  pub blend_mode: BlendMode,
  pub bounds: Rect,
  pub channels: Vec<ChannelDescriptor>,
  pub mask: Option<LayerMask>,
  /// Top-down order
  pub children: Vec<Layer>,
  pixels: OnceLock<LayerPixels>,
}

impl Layer {
  pub(crate) fn from_record(record: LayerRecord) -> Self {
    let visible = record.visible();
    Self {
      index: record.index,
      id: record.id,
      name: record.name,
      is_group: false,
      is_open: false,
      visible,
      opacity: record.opacity,
      fill_opacity: record.fill_opacity,
      clipping: record.clipping,
      transparency_protected: record.flags & 0x01 != 0,
      blend_mode: record.blend_mode,
      bounds: record.bounds,
      channels: record.channels,
      mask: record.mask,
      children: Vec::new(),
      pixels: OnceLock::new(),
    }
  }

  /// Group from its folder record, `children` still in file order.
  pub(crate) fn group(record: LayerRecord, children: Vec<Layer>) -> Self {
    let divider = record.divider;
    let mut layer = Self::from_record(record);
    layer.is_group = true;
    layer.is_open = matches!(divider.map(|d| d.kind), Some(DividerType::OpenFolder));
    if let Some(mode) = divider.and_then(|d| d.blend_mode) {
      layer.blend_mode = mode;
    }
    layer.children = children;
    layer
  }

  pub fn channel(&self, id: ChannelId) -> Option<&ChannelDescriptor> {
    self.channels.iter().find(|c| c.id == id)
  }

  /// Total bytes of compressed channel data
  pub fn data_len(&self) -> u64 {
    self.channels.iter().map(|c| c.length).sum()
  }

  /// Byte range spanned by the layer's channel data, channels are stored back to back.
  pub fn data_range(&self) -> Option<(u64, u64)> {
    let start = self.channels.iter().map(|c| c.offset).min()?;
    let end = self.channels.iter().map(|c| c.offset + c.length).max()?;
    Some((start, end - start))
  }

  pub fn pixels(&self) -> Option<&LayerPixels> {
    self.pixels.get()
  }

  /// Decoded raster, `None` when not decoded yet or decoding failed.
  pub fn raster(&self) -> Option<&Arc<LayerRaster>> {
    match self.pixels.get() {
      Some(LayerPixels::Decoded(raster)) => Some(raster),
      _ => None,
    }
  }

  pub fn is_decoded(&self) -> bool {
    self.pixels.get().is_some()
  }

  /// Store the decode result. The slot is written once, later calls are ignored.
  pub(crate) fn set_pixels(&self, pixels: LayerPixels) -> bool {
    self.pixels.set(pixels).is_ok()
  }

  /// Layers with pixel data of their own
  pub fn has_pixels(&self) -> bool {
    !self.is_group && !self.channels.is_empty()
  }
}
