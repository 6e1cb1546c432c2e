// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

use clap::ArgMatches;
use log::debug;
use psdkit::Document;
use psdkit::merged::render_merged;
use tokio_util::sync::CancellationToken;

use crate::{AppError, input_source, output_path, save_png, source_config};

/// Extract the pre-composited image of a document into a PNG file
pub async fn merged(options: &ArgMatches) -> crate::Result<()> {
  let spec = input_source(options)?;
  let output = output_path(options)?;
  let config = source_config(options);
  let handle = tokio::runtime::Handle::current();
  debug!("Infile: {}", spec);

  let image = tokio::task::spawn_blocking(move || {
    let source = spec.open(config, Some(handle), &CancellationToken::new())?;
    let doc = Document::parse(source)?;
    render_merged(&doc)
  })
  .await
  .map_err(|err| AppError::General(err.to_string()))??;
  save_png(&image, &output)
}
