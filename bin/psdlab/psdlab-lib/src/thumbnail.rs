// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

use clap::ArgMatches;
use log::{debug, warn};
use psdkit::RenderEvent;

use crate::{AppError, input_source, output_path, save_png, start_renderer, wait_for_load};

/// Render one layer or group into a PNG file
pub async fn thumbnail(options: &ArgMatches) -> crate::Result<()> {
  let source = input_source(options)?;
  let output = output_path(options)?;
  let index = *options
    .get_one::<usize>("layer")
    .ok_or_else(|| AppError::InvalidCmdSwitch("--layer is missing".into()))?;
  let width = options.get_one::<u32>("width").copied().unwrap_or(256);
  let height = options.get_one::<u32>("height").copied().unwrap_or(256);

  let (renderer, mut events) = start_renderer(options);
  renderer.load(source)?;
  let layers = wait_for_load(&mut events).await?;
  debug!("Document has {} root layers", layers.layers.len());
  let serial = renderer.generate_layer_thumbnail(index, width, height)?;

  while let Some(event) = events.recv().await {
    match event {
      RenderEvent::LayerThumbnail { serial: s, result } if s == serial => {
        let image = result?;
        return save_png(&image, &output);
      }
      RenderEvent::LayerDecodeFailed { index, message } => warn!("Layer {} is rendered transparent: {}", index, message),
      RenderEvent::Error(msg) => return Err(AppError::General(msg)),
      _ => {}
    }
  }
  Err(AppError::General("Renderer stopped before the thumbnail was ready".into()))
}
