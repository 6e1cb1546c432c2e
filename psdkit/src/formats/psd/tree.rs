// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

//! Fold the flat record list into the layer tree.
//!
//! Records are stored bottom to top. A group appears as a bounding section
//! marker, followed by its children and finally the folder record carrying
//! the group's properties.

use log::warn;

use super::layer::{DividerType, Layer, LayerRecord};
use crate::{PsdError, Result};

pub const MAX_GROUP_DEPTH: usize = 256;

/// Build the root layer sequence in top-down order.
pub fn build_tree(records: Vec<LayerRecord>) -> Result<Vec<Layer>> {
  // frames[0] is the document root
  let mut frames: Vec<Vec<Layer>> = vec![Vec::new()];

  for record in records {
    match record.divider.map(|d| d.kind) {
      Some(DividerType::BoundingSection) => {
        if frames.len() > MAX_GROUP_DEPTH {
          return Err(PsdError::Format(format!("Layer groups nested deeper than {} levels", MAX_GROUP_DEPTH)));
        }
        frames.push(Vec::new());
      }
      Some(DividerType::OpenFolder | DividerType::ClosedFolder) => {
        let children = if frames.len() > 1 {
          frames.pop().unwrap_or_default()
        } else {
          warn!("Group '{}' (layer {}) has no bounding marker, keeping it empty", record.name, record.index);
          Vec::new()
        };
        let group = Layer::group(record, top_down(children));
        push(&mut frames, group);
      }
      Some(DividerType::Other) | None => push(&mut frames, Layer::from_record(record)),
    }
  }

  while frames.len() > 1 {
    let orphans = frames.pop().unwrap_or_default();
    warn!("Unterminated layer group with {} layers, moving them to the parent", orphans.len());
    if let Some(parent) = frames.last_mut() {
      parent.extend(orphans);
    }
  }
  Ok(top_down(frames.pop().unwrap_or_default()))
}

fn push(frames: &mut [Vec<Layer>], layer: Layer) {
  if let Some(frame) = frames.last_mut() {
    frame.push(layer);
  }
}

fn top_down(mut layers: Vec<Layer>) -> Vec<Layer> {
  layers.reverse();
  layers
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::formats::psd::{BlendMode, Rect, layer::SectionDivider};

  fn record(index: usize, name: &str, kind: Option<DividerType>) -> LayerRecord {
    LayerRecord {
      index,
      name: name.to_string(),
      id: None,
      bounds: Rect::default(),
      channels: Vec::new(),
      blend_mode: BlendMode::Normal,
      opacity: 255,
      fill_opacity: 255,
      clipping: false,
      flags: 0,
      mask: None,
      divider: kind.map(|kind| SectionDivider { kind, blend_mode: None }),
    }
  }

  fn names(layers: &[Layer]) -> Vec<&str> {
    layers.iter().map(|l| l.name.as_str()).collect()
  }

  #[test]
  fn fold_group_between_layers() -> Result<()> {
    let records = vec![
      record(0, "A", None),
      record(1, "</Layer group>", Some(DividerType::BoundingSection)),
      record(2, "B", None),
      record(3, "C", None),
      record(4, "Group1", Some(DividerType::OpenFolder)),
      record(5, "D", None),
    ];
    let tree = build_tree(records)?;
    assert_eq!(names(&tree), ["D", "Group1", "A"]);
    assert!(tree[1].is_group);
    assert!(tree[1].is_open);
    assert_eq!(names(&tree[1].children), ["C", "B"]);
    Ok(())
  }

  #[test]
  fn fold_group_at_bottom() -> Result<()> {
    let records = vec![
      record(0, "</Layer group>", Some(DividerType::BoundingSection)),
      record(1, "B", None),
      record(2, "C", None),
      record(3, "Group1", Some(DividerType::ClosedFolder)),
      record(4, "D", None),
    ];
    let tree = build_tree(records)?;
    assert_eq!(names(&tree), ["D", "Group1"]);
    assert!(!tree[1].is_open);
    assert_eq!(names(&tree[1].children), ["C", "B"]);
    assert_eq!(tree[1].index, 3);
    Ok(())
  }

  #[test]
  fn nested_groups() -> Result<()> {
    let records = vec![
      record(0, "", Some(DividerType::BoundingSection)),
      record(1, "", Some(DividerType::BoundingSection)),
      record(2, "inner layer", None),
      record(3, "Inner", Some(DividerType::OpenFolder)),
      record(4, "outer layer", None),
      record(5, "Outer", Some(DividerType::OpenFolder)),
    ];
    let tree = build_tree(records)?;
    assert_eq!(names(&tree), ["Outer"]);
    assert_eq!(names(&tree[0].children), ["outer layer", "Inner"]);
    assert_eq!(names(&tree[0].children[1].children), ["inner layer"]);
    Ok(())
  }

  #[test]
  fn unbalanced_markers() -> Result<()> {
    let records = vec![
      record(0, "Lonely", Some(DividerType::OpenFolder)),
      record(1, "", Some(DividerType::BoundingSection)),
      record(2, "Orphan", None),
    ];
    let tree = build_tree(records)?;
    assert_eq!(names(&tree), ["Orphan", "Lonely"]);
    assert!(tree[1].is_group);
    assert!(tree[1].children.is_empty());
    Ok(())
  }

  #[test]
  fn nesting_limit() {
    let records = (0..=MAX_GROUP_DEPTH + 1)
      .map(|i| record(i, "", Some(DividerType::BoundingSection)))
      .collect();
    assert!(matches!(build_tree(records), Err(PsdError::Format(_))));
  }
}
