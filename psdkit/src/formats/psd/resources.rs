// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

//! Image resource blocks. Only a handful of ids are interpreted, all other
//! blocks are skipped by their declared length.

use bytes::Bytes;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::layer::block_end;
use crate::{PsdError, Result, bits::padding, reader::StreamReader};

const RESOURCE_SIGNATURES: [&[u8; 4]; 5] = [b"8BIM", b"MeSa", b"AgHg", b"PHUT", b"DCSR"];

pub const RES_RESOLUTION_INFO: u16 = 1005;
pub const RES_LAYER_STATE: u16 = 1024;
pub const RES_LAYER_GROUP_INFO: u16 = 1026;
pub const RES_GRID_AND_GUIDES: u16 = 1032;
pub const RES_ICC_PROFILE: u16 = 1039;
pub const RES_VERSION_INFO: u16 = 1057;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionInfo {
  pub h_res: f64,
  pub h_res_unit: u16,
  pub width_unit: u16,
  pub v_res: f64,
  pub v_res_unit: u16,
  pub height_unit: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GuideDirection {
  Vertical,
  Horizontal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guide {
  /// Position in pixels
  pub location: f64,
  pub direction: GuideDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
  pub version: u32,
  pub has_real_merged_data: bool,
  pub writer: String,
  pub reader: String,
  pub file_version: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResources {
  pub resolution: Option<ResolutionInfo>,
  /// Index of the selected layer, counted in file order
  pub target_layer: Option<u16>,
  pub layer_group_ids: Vec<u16>,
  pub guides: Vec<Guide>,
  #[serde(skip)]
  pub icc_profile: Option<Bytes>,
  pub version_info: Option<VersionInfo>,
  /// Ids of all blocks that were skipped
  pub skipped: Vec<u16>,
}

impl ImageResources {
  /// Parse the resource blocks in `[start, start + len)`.
  pub fn parse(reader: &mut StreamReader, len: u64) -> Result<Self> {
    let mut resources = Self::default();
    let end = block_end("Image resources", reader.position(), len)?;
    reader.prefetch(len)?;
    while reader.position() + 12 <= end {
      let signature = reader.read_signature()?;
      if !RESOURCE_SIGNATURES.contains(&&signature) {
        return Err(PsdError::Format(format!(
          "Invalid image resource signature {:02x?} at offset {}",
          signature,
          reader.position() - 4
        )));
      }
      let id = reader.read_u16()?;
      let _name = reader.read_pascal_string(2)?;
      let size = reader.read_u32()? as u64;
      let data_start = reader.position();
      if block_end("Image resource", data_start, size)? > end {
        return Err(PsdError::Format(format!("Image resource {} overruns the resource section", id)));
      }
      let mut block = reader.new_cursor(data_start);
      if let Err(err) = resources.interpret(id, &mut block, size) {
        // A malformed optional block must not break the document
        warn!("Ignoring malformed image resource {}: {}", id, err);
      }
      reader.seek(std::io::SeekFrom::Start((data_start + size + padding(size, 2)).min(end)))?;
    }
    debug!("Parsed image resources, skipped ids: {:?}", resources.skipped);
    Ok(resources)
  }

  fn interpret(&mut self, id: u16, block: &mut StreamReader, size: u64) -> Result<()> {
    match id {
      RES_RESOLUTION_INFO if size >= 16 => {
        self.resolution = Some(ResolutionInfo {
          h_res: block.read_fixed()?,
          h_res_unit: block.read_u16()?,
          width_unit: block.read_u16()?,
          v_res: block.read_fixed()?,
          v_res_unit: block.read_u16()?,
          height_unit: block.read_u16()?,
        });
      }
      RES_LAYER_STATE if size >= 2 => {
        self.target_layer = Some(block.read_u16()?);
      }
      RES_LAYER_GROUP_INFO => {
        self.layer_group_ids = (0..size / 2).map(|_| block.read_u16()).collect::<Result<Vec<u16>>>()?;
      }
      RES_GRID_AND_GUIDES if size >= 16 => {
        let _version = block.read_u32()?;
        let _grid_h = block.read_u32()?;
        let _grid_v = block.read_u32()?;
        let count = block.read_u32()? as u64;
        if 16 + count * 5 > size {
          return Err(PsdError::Format(format!("Guide count {} exceeds block", count)));
        }
        for _ in 0..count {
          let location = block.read_i32()? as f64 / 32.0;
          let direction = if block.read_u8()? == 0 { GuideDirection::Vertical } else { GuideDirection::Horizontal };
          self.guides.push(Guide { location, direction });
        }
      }
      RES_ICC_PROFILE => {
        self.icc_profile = Some(block.read_bytes(size)?);
      }
      RES_VERSION_INFO if size >= 5 => {
        self.version_info = Some(VersionInfo {
          version: block.read_u32()?,
          has_real_merged_data: block.read_u8()? != 0,
          writer: block.read_unicode_string()?,
          reader: block.read_unicode_string()?,
          file_version: block.read_u32()?,
        });
      }
      _ => self.skipped.push(id),
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::source::MemorySource;
  use std::sync::Arc;

  fn block(id: u16, data: &[u8]) -> Vec<u8> {
    let mut buf = b"8BIM".to_vec();
    buf.extend_from_slice(&id.to_be_bytes());
    buf.extend_from_slice(&[0, 0]); // empty name, padded
    buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
    buf.extend_from_slice(data);
    if data.len() % 2 == 1 {
      buf.push(0);
    }
    buf
  }

  #[test]
  fn known_and_unknown_blocks() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut buf = block(4000, &[1, 2, 3]);
    buf.extend(block(RES_LAYER_STATE, &[0, 2]));
    let mut guides = vec![0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1];
    guides.extend_from_slice(&(64_i32 * 32).to_be_bytes());
    guides.push(1);
    buf.extend(block(RES_GRID_AND_GUIDES, &guides));
    let len = buf.len() as u64;

    let mut reader = StreamReader::new(Arc::new(MemorySource::new(buf)));
    let res = ImageResources::parse(&mut reader, len)?;
    assert_eq!(res.target_layer, Some(2));
    assert_eq!(res.skipped, vec![4000]);
    assert_eq!(
      res.guides,
      vec![Guide {
        location: 64.0,
        direction: GuideDirection::Horizontal
      }]
    );
    assert_eq!(reader.position(), len);
    Ok(())
  }

  #[test]
  fn block_overrun_is_format_error() {
    let mut buf = block(RES_LAYER_STATE, &[0, 2]);
    buf[11] = 200; // declared size far larger than the section
    let len = buf.len() as u64;
    let mut reader = StreamReader::new(Arc::new(MemorySource::new(buf)));
    assert!(matches!(ImageResources::parse(&mut reader, len), Err(PsdError::Format(_))));
  }
}
