// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

use clap::ArgMatches;
use log::debug;
use psdkit::formats::psd::{Header, ImageResources, LayerSummary};
use psdkit::Document;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{AppError, input_source, source_config};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentInfo {
  header: Header,
  resources: ImageResources,
  layer_records: usize,
  merged_alpha: bool,
  has_merged_image: bool,
  layers: Vec<LayerSummary>,
}

impl From<&Document> for DocumentInfo {
  fn from(doc: &Document) -> Self {
    Self {
      header: doc.header,
      resources: doc.resources.clone(),
      layer_records: doc.layer_count,
      merged_alpha: doc.merged_alpha,
      has_merged_image: doc.merged.is_some(),
      layers: doc.summary(),
    }
  }
}

fn print_output<T: Serialize + ?Sized>(obj: &T, options: &ArgMatches) -> crate::Result<()> {
  if options.get_flag("yaml") {
    let yaml = serde_yaml::to_string(obj)?;
    println!("{}", yaml);
  } else {
    let json = serde_json::to_string_pretty(obj)?;
    println!("{}", json);
  }
  Ok(())
}

fn print_tree(layers: &[LayerSummary], depth: usize) {
  for layer in layers {
    let kind = match (layer.is_group, layer.is_open) {
      (true, true) => "v",
      (true, false) => ">",
      _ => " ",
    };
    println!(
      "{:>4} {}{} {:<32} {:?} {}% {}{}{}",
      layer.index,
      "  ".repeat(depth),
      kind,
      layer.name,
      layer.blend_mode,
      (layer.opacity as u32 * 100 + 127) / 255,
      if layer.visible { "" } else { "hidden " },
      if layer.clipping { "clipped " } else { "" },
      if layer.has_mask { "mask" } else { "" },
    );
    print_tree(&layer.children, depth + 1);
  }
}

/// Print header, resources and the layer tree of a document
pub async fn info(options: &ArgMatches) -> crate::Result<()> {
  let spec = input_source(options)?;
  let config = source_config(options);
  let handle = tokio::runtime::Handle::current();
  debug!("Infile: {}", spec);

  // parsing blocks on range requests for remote documents
  let doc = tokio::task::spawn_blocking(move || {
    let source = spec.open(config, Some(handle), &CancellationToken::new())?;
    Document::parse(source)
  })
  .await
  .map_err(|err| AppError::General(err.to_string()))??;

  if options.get_flag("json") || options.get_flag("yaml") {
    return print_output(&DocumentInfo::from(&doc), options);
  }
  let header = &doc.header;
  println!(
    "{} {}x{}, {:?}, {} bit, {} channels",
    if header.is_psb() { "PSB" } else { "PSD" },
    header.width,
    header.height,
    header.color_mode,
    header.depth,
    header.channels
  );
  if let Some(res) = doc.resources.resolution {
    println!("Resolution: {:.0}x{:.0} ppi", res.h_res, res.v_res);
  }
  if let Some(version) = &doc.resources.version_info {
    println!("Written by: {}", version.writer);
  }
  println!(
    "Layer records: {}, merged image: {}",
    doc.layer_count,
    if doc.merged.is_some() { "yes" } else { "no" }
  );
  print_tree(&doc.summary(), 0);
  Ok(())
}
