// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

//! Render orchestrator.
//!
//! A [`Renderer`] drives parse, decode and composite of one document and
//! reports through [`RenderEvent`]s. The work runs on a dedicated thread
//! when available, otherwise on the caller's thread.

use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use bytes::Bytes;
use log::{debug, warn};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::source::{ByteSource, MemorySource, RemoteSource, SourceConfig};
use crate::{PsdError, Result};

mod events;
mod worker;

pub use events::{EventReceiver, LoadInfo, RenderEvent};
pub use worker::{BackgroundWorker, Command, InlineWorker, RenderWorker, probe_background_support};

use events::EventSink;
use worker::Pipeline;

/// Where the document comes from
#[derive(Debug, Clone)]
pub enum SourceSpec {
  Memory(Bytes),
  File(PathBuf),
  /// `http://` or `https://` URL, read with range requests
  Url(String),
}

impl SourceSpec {
  /// Local path or URL given on a command line.
  pub fn from_input(input: &str) -> Self {
    if input.starts_with("http://") || input.starts_with("https://") {
      Self::Url(input.to_string())
    } else {
      Self::File(PathBuf::from(input))
    }
  }
}

impl SourceSpec {
  /// Open the byte source. Remote documents need a runtime `handle` for their fetches.
  pub fn open(&self, config: SourceConfig, handle: Option<Handle>, abort: &CancellationToken) -> Result<Arc<dyn ByteSource>> {
    Ok(match self {
      Self::Memory(buf) => Arc::new(MemorySource::new(buf.clone())),
      Self::File(path) => Arc::new(MemorySource::open(path)?),
      Self::Url(url) => {
        let handle = handle.ok_or_else(|| PsdError::Unsupported("Remote documents need a tokio runtime".into()))?;
        Arc::new(RemoteSource::open(url, config, handle, abort.clone())?)
      }
    })
  }
}

impl Display for SourceSpec {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Memory(buf) => write!(f, "<memory, {} bytes>", buf.len()),
      Self::File(path) => write!(f, "{}", path.display()),
      Self::Url(url) => f.write_str(url),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum WorkerStrategy {
  /// Background thread when supported
  #[default]
  Auto,
  Background,
  /// Render on the calling thread. Remote documents then need a multi-thread
  /// runtime or a thread outside of any runtime.
  Inline,
}

#[derive(Debug, Clone, Default)]
pub struct RendererOptions {
  pub source: SourceConfig,
  /// Runtime for remote fetches, a private one is created when missing
  pub runtime: Option<Handle>,
  pub strategy: WorkerStrategy,
}

/// Front end of the render pipeline
#[derive(Debug)]
pub struct Renderer {
  worker: Box<dyn RenderWorker>,
  abort: CancellationToken,
  generation: Arc<AtomicU64>,
  serial: AtomicU64,
  decode_count: Arc<AtomicUsize>,
}

impl Renderer {
  pub fn new(options: RendererOptions) -> (Self, EventReceiver) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let abort = CancellationToken::new();
    let generation = Arc::new(AtomicU64::new(0));
    let decode_count = Arc::new(AtomicUsize::new(0));
    let pipeline = || {
      Pipeline::new(
        options.source,
        options.runtime.clone(),
        abort.clone(),
        EventSink::new(tx.clone(), abort.clone()),
        generation.clone(),
        decode_count.clone(),
      )
    };

    let background = match options.strategy {
      WorkerStrategy::Auto => probe_background_support(),
      WorkerStrategy::Background => true,
      WorkerStrategy::Inline => false,
    };
    let worker: Box<dyn RenderWorker> = if background {
      match BackgroundWorker::spawn(pipeline()) {
        Ok(worker) => Box::new(worker),
        Err(err) => {
          warn!("Failed to start render thread, rendering inline: {}", err);
          Box::new(InlineWorker::new(pipeline()))
        }
      }
    } else {
      Box::new(InlineWorker::new(pipeline()))
    };
    debug!("Using {} render worker", worker.name());

    let renderer = Self {
      worker,
      abort,
      generation,
      serial: AtomicU64::new(0),
      decode_count,
    };
    (renderer, rx)
  }

  /// Parse, decode and composite a document.
  ///
  /// Emits `Load` after the structure is known, `LayerLoad` while decoding,
  /// then `LayerRender` and `Render`.
  pub fn load(&self, source: SourceSpec) -> Result<()> {
    self.load_with_visibility(source, Vec::new())
  }

  /// Like [`Renderer::load`], the layer visibility overrides are applied
  /// before the first composite.
  pub fn load_with_visibility(&self, source: SourceSpec, visibility: Vec<(usize, bool)>) -> Result<()> {
    self.worker.submit(Command::Load { source, visibility })
  }

  /// Show or hide a layer. Only composites again, layers are not decoded twice.
  ///
  /// A composite still running for an older state is not delivered.
  pub fn set_layer_visibility(&self, index: usize, visible: bool) -> Result<()> {
    let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
    self.worker.submit(Command::SetVisibility { index, visible, generation })
  }

  pub fn set_group_open(&self, index: usize, open: bool) -> Result<()> {
    self.worker.submit(Command::SetGroupOpen { index, open })
  }

  /// Request a thumbnail, the answer carries the returned serial.
  pub fn generate_layer_thumbnail(&self, index: usize, width: u32, height: u32) -> Result<u64> {
    let serial = self.serial.fetch_add(1, Ordering::AcqRel) + 1;
    self.worker.submit(Command::Thumbnail {
      serial,
      index,
      width,
      height,
    })?;
    Ok(serial)
  }

  /// Abort the running work and stop the worker. No events follow.
  pub fn cancel(&self) {
    debug!("Render cancelled");
    self.abort.cancel();
    // wake up an idle background thread
    let _ = self.worker.submit(Command::Shutdown);
  }

  pub fn abort_signal(&self) -> CancellationToken {
    self.abort.clone()
  }

  /// Number of layer decodes so far
  pub fn decode_count(&self) -> usize {
    self.decode_count.load(Ordering::Acquire)
  }

  pub fn worker_name(&self) -> &'static str {
    self.worker.name()
  }
}

impl Drop for Renderer {
  fn drop(&mut self) {
    self.abort.cancel();
    self.worker.shutdown();
  }
}
