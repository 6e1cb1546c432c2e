// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

//! Preview from the pre-composited Image Data section.
//!
//! All planes share one compression method. For RLE the byte count table of
//! every row of every channel comes first, followed by the packed rows.

use image::RgbaImage;
use log::debug;
use rayon::prelude::*;

use crate::bits::f32_to_u8;
use crate::compositor::color::lab_to_srgb;
use crate::decompressors::{Compression, PlaneFormat, decompress, normalize};
use crate::formats::psd::{ColorMode, Document};
use crate::source::ByteSourceExt;
use crate::{PsdError, Result};

/// Decode the merged image of `document`.
pub fn render_merged(document: &Document) -> Result<RgbaImage> {
  let merged = document
    .merged
    .ok_or_else(|| PsdError::Format("Document has no image data section".into()))?;
  let header = &document.header;
  let format = PlaneFormat {
    width: header.width as usize,
    height: header.height as usize,
    depth: header.depth,
    psb: header.is_psb(),
  };
  let channels = header.channels as usize;
  let palette = &document.color_mode_data;
  if header.color_mode == ColorMode::Multichannel {
    return Err(PsdError::Unsupported("Merged image of multichannel documents".into()));
  }
  if header.color_mode == ColorMode::Indexed && palette.len() < 768 {
    return Err(PsdError::Format(format!("Indexed color table holds {} bytes", palette.len())));
  }

  let raw = document.source().read_with(merged.offset, merged.length, |data| {
    if data.len() < 2 {
      return Err(PsdError::Format("Image data section is truncated".into()));
    }
    let compression = Compression::from_tag(u16::from_be_bytes([data[0], data[1]]))?;
    debug!("Merged image: {:?}, {} channels", compression, channels);
    decompress(compression, &data[2..], &format, format.height * channels)
  })?;

  let planes: Vec<Vec<f32>> = raw
    .par_chunks_exact(format.plane_bytes())
    .map(|plane| normalize(plane, &format))
    .collect();
  let color = header.color_mode.color_channels();
  // the first extra channel is transparency when layers say so or when there are none
  let alpha = if channels > color && (document.merged_alpha || document.layer_count == 0) {
    planes.get(color)
  } else {
    None
  };

  let pixel = |i: usize| -> [f32; 3] {
    let p = |c: usize| planes.get(c).map(|plane| plane[i]).unwrap_or(0.0);
    match header.color_mode {
      ColorMode::Rgb => [p(0), p(1), p(2)],
      ColorMode::Cmyk => {
        let k = p(3);
        [p(0) * k, p(1) * k, p(2) * k]
      }
      ColorMode::Lab => lab_to_srgb(p(0), p(1), p(2)),
      ColorMode::Indexed => {
        let index = (p(0) * 255.0).round() as usize;
        let entry = |c: usize| palette.get(c * 256 + index).map(|v| *v as f32 / 255.0).unwrap_or(0.0);
        [entry(0), entry(1), entry(2)]
      }
      _ => {
        let v = p(0);
        [v, v, v]
      }
    }
  };

  if planes.len() < color {
    return Err(PsdError::Format(format!("Merged image holds {} planes, {} required", planes.len(), color)));
  }

  let mut image = RgbaImage::new(header.width, header.height);
  image.par_chunks_exact_mut(4).enumerate().for_each(|(i, out)| {
    let [r, g, b] = pixel(i);
    let a = alpha.map(|plane| plane[i]).unwrap_or(1.0);
    out.copy_from_slice(&[f32_to_u8(r), f32_to_u8(g), f32_to_u8(b), f32_to_u8(a)]);
  });
  Ok(image)
}
