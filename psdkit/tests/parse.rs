// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

mod common;

use common::{PsdBuilder, SECTION_CLOSED, SECTION_OPEN, TestLayer, init_test_logger};
use psdkit::formats::psd::ChannelId;
use psdkit::{BlendMode, PsdError, Rect, open_bytes};

fn names(layers: &[psdkit::Layer]) -> Vec<&str> {
  layers.iter().map(|l| l.name.as_str()).collect()
}

#[test]
fn flat_layers_are_top_down() -> psdkit::Result<()> {
  init_test_logger();
  let doc = open_bytes(
    PsdBuilder::new(4, 4)
      .layer(TestLayer::solid("A", [0, 0, 4, 4], [255, 0, 0, 255]))
      .layer(TestLayer::solid("B", [0, 0, 2, 2], [0, 255, 0, 255]))
      .build(),
  )?;
  assert_eq!(doc.width(), 4);
  assert_eq!(doc.height(), 4);
  assert_eq!(doc.layer_count, 2);
  assert_eq!(names(&doc.layers), ["B", "A"]);
  assert_eq!(doc.layers[0].index, 1);
  assert_eq!(doc.layers[0].bounds, Rect::new(0, 0, 2, 2));
  assert_eq!(doc.layers[0].channels.len(), 4);
  assert!(doc.merged.is_none());
  Ok(())
}

#[test]
fn groups_are_folded_from_markers() -> psdkit::Result<()> {
  init_test_logger();
  let doc = open_bytes(
    PsdBuilder::new(8, 8)
      .layer(TestLayer::solid("A", [0, 0, 8, 8], [10, 10, 10, 255]))
      .layer(TestLayer::group_end())
      .layer(TestLayer::solid("B", [0, 0, 4, 4], [20, 20, 20, 255]))
      .layer(TestLayer::solid("C", [4, 4, 8, 8], [30, 30, 30, 255]))
      .layer(TestLayer::divider("Group 1", SECTION_OPEN).section_blend(b"pass"))
      .layer(TestLayer::solid("D", [0, 0, 1, 1], [40, 40, 40, 255]))
      .build(),
  )?;
  assert_eq!(names(&doc.layers), ["D", "Group 1", "A"]);
  let group = &doc.layers[1];
  assert!(group.is_group);
  assert!(group.is_open);
  assert_eq!(group.index, 4);
  assert_eq!(group.blend_mode, BlendMode::PassThrough);
  assert_eq!(names(&group.children), ["C", "B"]);

  let order: Vec<&str> = doc.iter().map(|l| l.name.as_str()).collect();
  assert_eq!(order, ["D", "Group 1", "C", "B", "A"]);
  let flat: Vec<usize> = doc.flat_layers().iter().map(|l| l.index).collect();
  assert_eq!(flat, [0, 2, 3, 4, 5]);
  Ok(())
}

#[test]
fn nested_closed_group() -> psdkit::Result<()> {
  let doc = open_bytes(
    PsdBuilder::new(8, 8)
      .layer(TestLayer::group_end())
      .layer(TestLayer::group_end())
      .layer(TestLayer::solid("Inner layer", [0, 0, 8, 8], [1, 2, 3, 255]))
      .layer(TestLayer::divider("Inner", SECTION_CLOSED))
      .layer(TestLayer::solid("Outer layer", [0, 0, 8, 8], [1, 2, 3, 255]))
      .layer(TestLayer::divider("Outer", SECTION_OPEN))
      .build(),
  )?;
  assert_eq!(names(&doc.layers), ["Outer"]);
  let outer = &doc.layers[0];
  assert_eq!(names(&outer.children), ["Outer layer", "Inner"]);
  let inner = &outer.children[1];
  assert!(!inner.is_open);
  assert_eq!(names(&inner.children), ["Inner layer"]);
  Ok(())
}

#[test]
fn unknown_blend_key_is_normal() -> psdkit::Result<()> {
  let doc = open_bytes(
    PsdBuilder::new(2, 2)
      .layer(TestLayer::solid("Odd", [0, 0, 2, 2], [1, 2, 3, 255]).blend(b"zzzz"))
      .layer(TestLayer::solid("Screen", [0, 0, 2, 2], [1, 2, 3, 255]).blend(b"scrn"))
      .build(),
  )?;
  assert_eq!(doc.layers[0].blend_mode, BlendMode::Screen);
  assert_eq!(doc.layers[1].blend_mode, BlendMode::Normal);
  Ok(())
}

#[test]
fn unknown_info_blocks_are_skipped() -> psdkit::Result<()> {
  let doc = open_bytes(
    PsdBuilder::new(2, 2)
      .layer(
        TestLayer::solid("Plain", [0, 0, 2, 2], [1, 2, 3, 255])
          .info(b"xyzw", vec![1, 2, 3])
          .fill(100)
          .info(b"lyid", 77_u32.to_be_bytes().to_vec()),
      )
      .build(),
  )?;
  let layer = &doc.layers[0];
  assert_eq!(layer.name, "Plain");
  assert_eq!(layer.fill_opacity, 100);
  assert_eq!(layer.id, Some(77));
  Ok(())
}

#[test]
fn unicode_name_overrides_pascal_name() -> psdkit::Result<()> {
  let doc = open_bytes(
    PsdBuilder::new(2, 2)
      .layer(TestLayer::solid("Ebene", [0, 0, 2, 2], [1, 2, 3, 255]).unicode("Ébène ✓"))
      .build(),
  )?;
  assert_eq!(doc.layers[0].name, "Ébène ✓");
  Ok(())
}

#[test]
fn hidden_and_clipping_flags() -> psdkit::Result<()> {
  let doc = open_bytes(
    PsdBuilder::new(2, 2)
      .layer(TestLayer::solid("Base", [0, 0, 2, 2], [1, 2, 3, 255]))
      .layer(TestLayer::solid("Clip", [0, 0, 2, 2], [1, 2, 3, 255]).clipped().hidden().opacity(64))
      .build(),
  )?;
  let clip = &doc.layers[0];
  assert!(clip.clipping);
  assert!(!clip.visible);
  assert_eq!(clip.opacity, 64);
  assert!(doc.layers[1].visible);
  Ok(())
}

#[test]
fn layer_mask_record() -> psdkit::Result<()> {
  let doc = open_bytes(
    PsdBuilder::new(4, 4)
      .layer(TestLayer::solid("Masked", [0, 0, 4, 4], [1, 2, 3, 255]).mask([1, 1, 3, 3], 0, 0x02, vec![255; 4]))
      .build(),
  )?;
  let layer = &doc.layers[0];
  let mask = layer.mask.as_ref().ok_or(PsdError::decode("mask missing"))?;
  assert_eq!(mask.user.bounds, Rect::new(1, 1, 3, 3));
  assert!(mask.user.disabled);
  assert!(mask.real.is_none());
  let channel = layer.channel(ChannelId::UserMask).ok_or(PsdError::decode("mask channel missing"))?;
  assert_eq!(channel.rect, Rect::new(1, 1, 3, 3));
  assert_eq!(channel.decoded_len, 4);
  Ok(())
}

#[test]
fn psb_uses_wide_lengths() -> psdkit::Result<()> {
  init_test_logger();
  let doc = open_bytes(
    PsdBuilder::new(3, 3)
      .psb()
      .layer(TestLayer::solid("Wide", [0, 0, 3, 3], [9, 8, 7, 255]).rle())
      .merged(1, vec![vec![9; 9], vec![8; 9], vec![7; 9]])
      .build(),
  )?;
  assert!(doc.header.is_psb());
  assert_eq!(names(&doc.layers), ["Wide"]);
  let channel = doc.layers[0].channel(ChannelId::Color(0)).ok_or(PsdError::decode("channel missing"))?;
  // tag, three u32 row counts and three packed rows of two bytes
  assert_eq!(channel.length, 2 + 12 + 6);
  assert!(doc.merged.is_some());
  Ok(())
}

#[test]
fn sixteen_bit_layers_from_trailing_block() -> psdkit::Result<()> {
  let doc = open_bytes(
    PsdBuilder::new(2, 2)
      .depth16()
      .layer(TestLayer::solid16("Deep", [0, 0, 2, 2], [65535, 0, 32768, 65535]))
      .build(),
  )?;
  assert_eq!(doc.header.depth, 16);
  assert_eq!(names(&doc.layers), ["Deep"]);
  assert_eq!(doc.layers[0].channels[0].decoded_len, 8);
  Ok(())
}

#[test]
fn rejects_invalid_headers() {
  let valid = PsdBuilder::new(2, 2).build();

  let mut bad_signature = valid.clone();
  bad_signature[0] = b'X';
  assert!(matches!(open_bytes(bad_signature), Err(PsdError::Format(_))));

  let mut bad_version = valid.clone();
  bad_version[5] = 3;
  assert!(matches!(open_bytes(bad_version), Err(PsdError::Format(_))));

  let mut bad_depth = valid.clone();
  bad_depth[23] = 7;
  assert!(matches!(open_bytes(bad_depth), Err(PsdError::Format(_))));

  let mut bad_mode = valid.clone();
  bad_mode[25] = 5;
  assert!(matches!(open_bytes(bad_mode), Err(PsdError::Format(_))));

  let mut zero_width = valid.clone();
  zero_width[18..22].copy_from_slice(&[0, 0, 0, 0]);
  assert!(matches!(open_bytes(zero_width), Err(PsdError::Format(_))));

  assert!(matches!(open_bytes(valid[..10].to_vec()), Err(PsdError::Format(_))));
}

#[test]
fn rejects_section_overrun() {
  let mut data = PsdBuilder::new(2, 2).layer(TestLayer::solid("L", [0, 0, 2, 2], [1, 2, 3, 255])).build();
  // layer and mask section length behind the header and two empty sections
  data[34..38].copy_from_slice(&u32::MAX.to_be_bytes());
  assert!(matches!(open_bytes(data), Err(PsdError::Format(_))));

  let mut data = PsdBuilder::new(2, 2).build();
  data[26..30].copy_from_slice(&1000_u32.to_be_bytes());
  assert!(matches!(open_bytes(data), Err(PsdError::Format(_))));

  // PSB layer info length right behind the 64 bit layer and mask length
  let mut data = PsdBuilder::new(2, 2).psb().layer(TestLayer::solid("L", [0, 0, 2, 2], [1, 2, 3, 255])).build();
  data[42..50].copy_from_slice(&u64::MAX.to_be_bytes());
  assert!(matches!(open_bytes(data), Err(PsdError::Format(_))));
}

#[test]
fn summary_serializes_tree() -> psdkit::Result<()> {
  let doc = open_bytes(
    PsdBuilder::new(2, 2)
      .layer(TestLayer::group_end())
      .layer(TestLayer::solid("Child", [0, 0, 2, 2], [1, 2, 3, 255]))
      .layer(TestLayer::divider("Folder", SECTION_OPEN))
      .build(),
  )?;
  let summary = doc.summary();
  assert_eq!(summary.len(), 1);
  assert!(summary[0].is_group);
  assert_eq!(summary[0].children[0].name, "Child");
  Ok(())
}
