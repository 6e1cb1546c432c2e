// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

//! Writer for small synthetic documents used by the integration tests.

#![allow(dead_code)]

use psdkit::decompressors::{deflate, rle};

pub const SECTION_OPEN: u32 = 1;
pub const SECTION_CLOSED: u32 = 2;
pub const SECTION_BOUNDING: u32 = 3;

pub fn init_test_logger() {
  let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug, Clone)]
pub struct TestMask {
  pub rect: [i32; 4],
  pub default_color: u8,
  pub flags: u8,
  pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct TestLayer {
  pub name: String,
  pub unicode_name: Option<String>,
  /// top, left, bottom, right
  pub rect: [i32; 4],
  /// channel id and 8 bit samples
  pub channels: Vec<(i16, Vec<u8>)>,
  pub blend: [u8; 4],
  pub opacity: u8,
  pub fill: Option<u8>,
  pub clipping: bool,
  pub hidden: bool,
  pub divider: Option<(u32, Option<[u8; 4]>)>,
  pub mask: Option<TestMask>,
  /// 0 raw, 1 RLE
  pub compression: u16,
  pub corrupt: bool,
  pub extra_info: Vec<([u8; 4], Vec<u8>)>,
}

impl TestLayer {
  /// RGBA layer filled with one color
  pub fn solid(name: &str, rect: [i32; 4], rgba: [u8; 4]) -> Self {
    let count = ((rect[2] - rect[0]) * (rect[3] - rect[1])).max(0) as usize;
    Self::with_channels(
      name,
      rect,
      vec![
        (-1, vec![rgba[3]; count]),
        (0, vec![rgba[0]; count]),
        (1, vec![rgba[1]; count]),
        (2, vec![rgba[2]; count]),
      ],
    )
  }

  /// RGBA layer of a 16 bit document filled with one color
  pub fn solid16(name: &str, rect: [i32; 4], rgba: [u16; 4]) -> Self {
    let count = ((rect[2] - rect[0]) * (rect[3] - rect[1])).max(0) as usize;
    let plane = |v: u16| v.to_be_bytes().repeat(count);
    Self::with_channels(
      name,
      rect,
      vec![(-1, plane(rgba[3])), (0, plane(rgba[0])), (1, plane(rgba[1])), (2, plane(rgba[2]))],
    )
  }

  pub fn with_channels(name: &str, rect: [i32; 4], channels: Vec<(i16, Vec<u8>)>) -> Self {
    Self {
      name: name.to_string(),
      unicode_name: None,
      rect,
      channels,
      blend: *b"norm",
      opacity: 255,
      fill: None,
      clipping: false,
      hidden: false,
      divider: None,
      mask: None,
      compression: 0,
      corrupt: false,
      extra_info: Vec::new(),
    }
  }

  /// Section divider record
  pub fn divider(name: &str, kind: u32) -> Self {
    let mut layer = Self::with_channels(name, [0, 0, 0, 0], vec![(-1, vec![]), (0, vec![]), (1, vec![]), (2, vec![])]);
    layer.divider = Some((kind, None));
    layer
  }

  pub fn group_end() -> Self {
    Self::divider("</Layer group>", SECTION_BOUNDING)
  }

  pub fn blend(mut self, key: &[u8; 4]) -> Self {
    self.blend = *key;
    self
  }

  pub fn opacity(mut self, opacity: u8) -> Self {
    self.opacity = opacity;
    self
  }

  pub fn fill(mut self, fill: u8) -> Self {
    self.fill = Some(fill);
    self
  }

  pub fn clipped(mut self) -> Self {
    self.clipping = true;
    self
  }

  pub fn hidden(mut self) -> Self {
    self.hidden = true;
    self
  }

  pub fn rle(mut self) -> Self {
    self.compression = 1;
    self
  }

  pub fn zip(mut self) -> Self {
    self.compression = 2;
    self
  }

  pub fn corrupt(mut self) -> Self {
    self.corrupt = true;
    self
  }

  pub fn unicode(mut self, name: &str) -> Self {
    self.unicode_name = Some(name.to_string());
    self
  }

  pub fn section_blend(mut self, key: &[u8; 4]) -> Self {
    if let Some((_, blend)) = self.divider.as_mut() {
      *blend = Some(*key);
    }
    self
  }

  pub fn mask(mut self, rect: [i32; 4], default_color: u8, flags: u8, data: Vec<u8>) -> Self {
    self.mask = Some(TestMask {
      rect,
      default_color,
      flags,
      data,
    });
    self
  }

  pub fn info(mut self, key: &[u8; 4], data: Vec<u8>) -> Self {
    self.extra_info.push((*key, data));
    self
  }

  fn width(&self) -> usize {
    (self.rect[3] - self.rect[1]).max(0) as usize
  }

  fn channel_data(&self, samples: &[u8], row_bytes: usize, psb: bool) -> Vec<u8> {
    if self.corrupt {
      // RLE tag without a complete count table
      return vec![0, 1, 0xFF];
    }
    let mut out = self.compression.to_be_bytes().to_vec();
    if samples.is_empty() {
      return out;
    }
    match self.compression {
      1 => out.extend(rle::pack_rows(samples, row_bytes, psb)),
      2 => out.extend(deflate::deflate(samples).unwrap()),
      _ => out.extend_from_slice(samples),
    }
    out
  }

  fn all_channels(&self) -> Vec<(i16, Vec<u8>, usize)> {
    let mut channels: Vec<(i16, Vec<u8>, usize)> = self.channels.iter().map(|(id, data)| (*id, data.clone(), self.width())).collect();
    if let Some(mask) = &self.mask {
      channels.push((-2, mask.data.clone(), (mask.rect[3] - mask.rect[1]).max(0) as usize));
    }
    channels
  }
}

#[derive(Debug, Clone)]
pub struct PsdBuilder {
  pub version: u16,
  pub width: u32,
  pub height: u32,
  pub depth: u16,
  pub color_mode: u16,
  pub channels: u16,
  /// Bottom to top, as stored in the file
  pub layers: Vec<TestLayer>,
  pub merged_alpha: bool,
  pub color_mode_data: Vec<u8>,
  pub resources: Vec<u8>,
  /// Planes of the image data section and its compression
  pub merged: Option<(u16, Vec<Vec<u8>>)>,
  /// Store the layers in a trailing `Lr16` block
  pub lr16: bool,
}

impl PsdBuilder {
  pub fn new(width: u32, height: u32) -> Self {
    Self {
      version: 1,
      width,
      height,
      depth: 8,
      color_mode: 3,
      channels: 3,
      layers: Vec::new(),
      merged_alpha: false,
      color_mode_data: Vec::new(),
      resources: Vec::new(),
      merged: None,
      lr16: false,
    }
  }

  pub fn depth16(mut self) -> Self {
    self.depth = 16;
    self.lr16 = true;
    self
  }

  pub fn psb(mut self) -> Self {
    self.version = 2;
    self
  }

  pub fn layer(mut self, layer: TestLayer) -> Self {
    self.layers.push(layer);
    self
  }

  pub fn merged(mut self, compression: u16, planes: Vec<Vec<u8>>) -> Self {
    self.channels = planes.len() as u16;
    self.merged = Some((compression, planes));
    self
  }

  fn is_psb(&self) -> bool {
    self.version == 2
  }

  fn push_len(&self, out: &mut Vec<u8>, len: usize, wide: bool) {
    if wide && self.is_psb() {
      out.extend_from_slice(&(len as u64).to_be_bytes());
    } else {
      out.extend_from_slice(&(len as u32).to_be_bytes());
    }
  }

  fn layer_record(&self, layer: &TestLayer, channel_lengths: &[usize]) -> Vec<u8> {
    let mut out = Vec::new();
    for v in layer.rect {
      out.extend_from_slice(&v.to_be_bytes());
    }
    let channels = layer.all_channels();
    out.extend_from_slice(&(channels.len() as u16).to_be_bytes());
    for ((id, _, _), len) in channels.iter().zip(channel_lengths) {
      out.extend_from_slice(&id.to_be_bytes());
      self.push_len(&mut out, *len, true);
    }
    out.extend_from_slice(b"8BIM");
    out.extend_from_slice(&layer.blend);
    out.push(layer.opacity);
    out.push(layer.clipping as u8);
    out.push(if layer.hidden { 0x02 } else { 0x00 });
    out.push(0);

    let mut extra = Vec::new();
    match &layer.mask {
      Some(mask) => {
        extra.extend_from_slice(&20_u32.to_be_bytes());
        for v in mask.rect {
          extra.extend_from_slice(&v.to_be_bytes());
        }
        extra.push(mask.default_color);
        extra.push(mask.flags);
        extra.extend_from_slice(&[0, 0]);
      }
      None => extra.extend_from_slice(&0_u32.to_be_bytes()),
    }
    extra.extend_from_slice(&0_u32.to_be_bytes()); // blending ranges
    let name = layer.name.as_bytes();
    extra.push(name.len() as u8);
    extra.extend_from_slice(name);
    while extra.len() % 4 != 0 {
      extra.push(0);
    }

    let mut blocks: Vec<([u8; 4], Vec<u8>)> = Vec::new();
    if let Some(name) = &layer.unicode_name {
      let units: Vec<u16> = name.encode_utf16().collect();
      let mut data = (units.len() as u32).to_be_bytes().to_vec();
      units.iter().for_each(|u| data.extend_from_slice(&u.to_be_bytes()));
      blocks.push((*b"luni", data));
    }
    if let Some((kind, blend)) = layer.divider {
      let mut data = kind.to_be_bytes().to_vec();
      if let Some(key) = blend {
        data.extend_from_slice(b"8BIM");
        data.extend_from_slice(&key);
      }
      blocks.push((*b"lsct", data));
    }
    if let Some(fill) = layer.fill {
      blocks.push((*b"iOpa", vec![fill, 0, 0, 0]));
    }
    blocks.extend(layer.extra_info.iter().cloned());
    for (key, mut data) in blocks {
      extra.extend_from_slice(b"8BIM");
      extra.extend_from_slice(&key);
      if data.len() % 2 == 1 {
        data.push(0);
      }
      extra.extend_from_slice(&(data.len() as u32).to_be_bytes());
      extra.extend_from_slice(&data);
    }
    out.extend_from_slice(&(extra.len() as u32).to_be_bytes());
    out.extend(extra);
    out
  }

  fn layer_info(&self) -> Vec<u8> {
    if self.layers.is_empty() {
      return Vec::new();
    }
    let count = self.layers.len() as i16;
    let mut info = if self.merged_alpha { (-count).to_be_bytes() } else { count.to_be_bytes() }.to_vec();
    let mut pixel_data = Vec::new();
    for layer in &self.layers {
      let mut lengths = Vec::new();
      for (_, samples, width) in layer.all_channels() {
        let data = layer.channel_data(&samples, width * self.depth as usize / 8, self.is_psb());
        lengths.push(data.len());
        pixel_data.extend(data);
      }
      info.extend(self.layer_record(layer, &lengths));
    }
    info.extend(pixel_data);
    if info.len() % 2 == 1 {
      info.push(0);
    }
    info
  }

  fn merged_data(&self) -> Vec<u8> {
    let Some((compression, planes)) = &self.merged else {
      return Vec::new();
    };
    let mut out = compression.to_be_bytes().to_vec();
    match compression {
      1 => {
        let width = self.width as usize;
        let packed: Vec<Vec<u8>> = planes.iter().map(|p| rle::pack_rows(p, width, self.is_psb())).collect();
        let table_len = self.height as usize * if self.is_psb() { 4 } else { 2 };
        for p in &packed {
          out.extend_from_slice(&p[..table_len]);
        }
        for p in &packed {
          out.extend_from_slice(&p[table_len..]);
        }
      }
      _ => planes.iter().for_each(|p| out.extend_from_slice(p)),
    }
    out
  }

  pub fn build(&self) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"8BPS");
    out.extend_from_slice(&self.version.to_be_bytes());
    out.extend_from_slice(&[0; 6]);
    out.extend_from_slice(&self.channels.to_be_bytes());
    out.extend_from_slice(&self.height.to_be_bytes());
    out.extend_from_slice(&self.width.to_be_bytes());
    out.extend_from_slice(&self.depth.to_be_bytes());
    out.extend_from_slice(&self.color_mode.to_be_bytes());

    out.extend_from_slice(&(self.color_mode_data.len() as u32).to_be_bytes());
    out.extend_from_slice(&self.color_mode_data);
    out.extend_from_slice(&(self.resources.len() as u32).to_be_bytes());
    out.extend_from_slice(&self.resources);

    let info = self.layer_info();
    let mut section = Vec::new();
    if self.lr16 {
      self.push_len(&mut section, 0, true);
      section.extend_from_slice(&0_u32.to_be_bytes()); // global layer mask info
      section.extend_from_slice(b"8BIMLr16");
      self.push_len(&mut section, info.len(), true);
      section.extend(info);
    } else {
      self.push_len(&mut section, info.len(), true);
      section.extend(info);
      section.extend_from_slice(&0_u32.to_be_bytes()); // global layer mask info
    }
    self.push_len(&mut out, section.len(), true);
    out.extend(section);

    out.extend(self.merged_data());
    out
  }
}

/// Two flat layers over a 100x100 canvas: an opaque bottom and a multiply top at 50%.
pub fn multiply_document(bottom: [u8; 4], top: [u8; 4]) -> Vec<u8> {
  PsdBuilder::new(100, 100)
    .layer(TestLayer::solid("Bottom", [0, 0, 100, 100], bottom))
    .layer(TestLayer::solid("Top", [0, 0, 100, 100], top).blend(b"mul ").opacity(128))
    .build()
}
