// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::ArgMatches;
use image::{ImageError, RgbaImage};
use log::{info, warn};
use psdkit::render::{EventReceiver, LoadInfo, WorkerStrategy};
use psdkit::{PsdError, RenderEvent, Renderer, RendererOptions, SourceConfig, SourceSpec};
use thiserror::Error;

pub mod app;
pub mod info;
pub mod merged;
pub mod render;
pub mod thumbnail;

const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Error, Debug)]
pub enum AppError {
  #[error("{}", _0)]
  General(String),
  #[error("Invalid arguments: {}", _0)]
  InvalidCmdSwitch(String),
  #[error("I/O error: {}", _0)]
  Io(#[from] std::io::Error),
  #[error("Not found: {}", _0.display())]
  NotFound(PathBuf),
  #[error("Already exists: {}", _0.display())]
  AlreadyExists(PathBuf),
  #[error("Decoder failed: {}", _0)]
  DecoderFailed(String),
  #[error("Unsupported file: {}", _0)]
  UnsupportedFile(String),
  #[error(transparent)]
  Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for AppError {
  fn from(value: serde_json::Error) -> Self {
    anyhow::Error::new(value).into()
  }
}

impl From<serde_yaml::Error> for AppError {
  fn from(value: serde_yaml::Error) -> Self {
    anyhow::Error::new(value).into()
  }
}

impl From<ImageError> for AppError {
  fn from(value: ImageError) -> Self {
    anyhow::Error::new(value).into()
  }
}

impl From<PsdError> for AppError {
  fn from(value: PsdError) -> Self {
    match value {
      PsdError::Decode { .. } => Self::DecoderFailed(value.to_string()),
      PsdError::Format(_) | PsdError::Unsupported(_) => Self::UnsupportedFile(value.to_string()),
      PsdError::Io(msg) => Self::Io(std::io::Error::other(msg)),
      _ => Self::General(value.to_string()),
    }
  }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Source settings from the environment, overridden by command line switches.
pub fn source_config(options: &ArgMatches) -> SourceConfig {
  let mut config = SourceConfig::from_env();
  if let Some(chunk_size) = options.get_one::<u64>("chunk_size") {
    config.chunk_size = *chunk_size;
  }
  if let Some(max) = options.get_one::<usize>("max_request_chunks") {
    config.max_request_chunks = (*max).max(1);
  }
  config
}

pub fn renderer_options(options: &ArgMatches) -> RendererOptions {
  let strategy = if options.get_flag("inline") {
    WorkerStrategy::Inline
  } else {
    options.get_one::<WorkerStrategy>("worker").copied().unwrap_or_default()
  };
  RendererOptions {
    source: source_config(options),
    runtime: tokio::runtime::Handle::try_current().ok(),
    strategy,
  }
}

/// INPUT argument as a document source, local files must exist.
pub fn input_source(options: &ArgMatches) -> Result<SourceSpec> {
  let input: &String = options
    .get_one("INPUT")
    .ok_or_else(|| AppError::InvalidCmdSwitch("INPUT is missing".into()))?;
  let spec = SourceSpec::from_input(input);
  if let SourceSpec::File(path) = &spec {
    if !path.exists() {
      return Err(AppError::NotFound(path.clone()));
    }
  }
  Ok(spec)
}

/// OUTPUT argument, existing files are only replaced with `--override`.
pub fn output_path(options: &ArgMatches) -> Result<PathBuf> {
  let output: &PathBuf = options
    .get_one("OUTPUT")
    .ok_or_else(|| AppError::InvalidCmdSwitch("OUTPUT is missing".into()))?;
  if output.exists() && !options.get_flag("override") {
    return Err(AppError::AlreadyExists(output.clone()));
  }
  Ok(output.clone())
}

pub fn save_png(image: &RgbaImage, path: &Path) -> Result<()> {
  image.save_with_format(path, image::ImageFormat::Png)?;
  info!("Wrote {}x{} image to {}", image.width(), image.height(), path.display());
  Ok(())
}

/// Wait for the structure of the loading document.
pub async fn wait_for_load(events: &mut EventReceiver) -> Result<LoadInfo> {
  while let Some(event) = events.recv().await {
    match event {
      RenderEvent::Load(info) => return Ok(info),
      RenderEvent::Error(msg) => return Err(AppError::General(msg)),
      _ => {}
    }
  }
  Err(AppError::General("Renderer stopped before the document was loaded".into()))
}

/// Wait for the next composited image, progress is printed to stderr.
pub async fn wait_for_render(events: &mut EventReceiver, progress: bool) -> Result<Arc<RgbaImage>> {
  while let Some(event) = events.recv().await {
    match event {
      RenderEvent::Load(info) => info!("Document {}x{} with {} root layers", info.width, info.height, info.layers.len()),
      RenderEvent::LayerLoad(p) if progress => eprint!("\rDecoding layers  {:3.0}%", p * 100.0),
      RenderEvent::LayerRender(p) if progress => eprint!("\rCompositing      {:3.0}%", p * 100.0),
      RenderEvent::LayerDecodeFailed { index, message } => warn!("Layer {} is rendered transparent: {}", index, message),
      RenderEvent::Render(image) => {
        if progress {
          eprintln!();
        }
        return Ok(image);
      }
      RenderEvent::Error(msg) => return Err(AppError::General(msg)),
      _ => {}
    }
  }
  Err(AppError::General("Renderer stopped before an image was rendered".into()))
}

/// Start a renderer for the global switches.
pub fn start_renderer(options: &ArgMatches) -> (Renderer, EventReceiver) {
  let (renderer, events) = Renderer::new(renderer_options(options));
  info!("{} {} using the {} worker", app::create_app().get_name(), PKG_VERSION, renderer.worker_name());
  (renderer, events)
}
