// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

//! Library to parse Adobe Photoshop documents (PSD and PSB), decode the
//! per-layer channel data and composite the visible layers into a single
//! RGBA image. Documents can be read from memory, from a memory mapped
//! file or lazily from an HTTP(S) server that honors range requests.
//!
//! # Example
//! ```rust,no_run
//! use psdkit::{compositor, decoder::LayerDecoder};
//! use tokio_util::sync::CancellationToken;
//!
//! fn main() -> psdkit::Result<()> {
//!   let mut document = psdkit::open_file("artwork.psd")?;
//!   let abort = CancellationToken::new();
//!   let decoder = LayerDecoder::new(document.source(), abort.clone());
//!   decoder.decode_all(&document, |progress| eprintln!("{:.0}%", progress * 100.0))?;
//!
//!   // Hide the topmost layer and render the rest
//!   if let Some(top) = document.layers.first().map(|l| l.index) {
//!     document.set_layer_visibility(top, false);
//!   }
//!   let image = compositor::composite(&document, &abort)?;
//!   println!("Rendered {}x{}", image.width(), image.height());
//!   Ok(())
//! }
//! ```

#![deny(unstable_features)]

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

pub mod bits;
pub mod compositor;
pub mod decoder;
pub mod decompressors;
mod envparams;
pub mod formats;
pub mod merged;
pub mod pixarray;
pub mod reader;
pub mod render;
pub mod source;

pub use formats::psd::{BlendMode, ColorMode, Document, Layer, Rect};
pub use render::{RenderEvent, Renderer, RendererOptions, SourceSpec};
pub use source::{ByteSource, MemorySource, SourceConfig};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PsdError {
  /// The document violates the file format, parsing can not continue.
  #[error("Format error: {}", _0)]
  Format(String),

  /// Compressed channel data is corrupt.
  #[error("Decode error{}: {}", layer.map(|i| format!(" in layer {}", i)).unwrap_or_default(), msg)]
  Decode { layer: Option<usize>, msg: String },

  #[error("I/O error: {}", _0)]
  Io(String),

  #[error("Read of {size} bytes at offset {offset} exceeds source length {len}")]
  OutOfBounds { offset: u64, size: u64, len: u64 },

  #[error("No layer with index {}", _0)]
  LayerNotFound(usize),

  #[error("Unsupported: {}", _0)]
  Unsupported(String),

  #[error("Operation cancelled")]
  Cancelled,
}

pub type Result<T> = std::result::Result<T, PsdError>;

impl PsdError {
  pub fn decode(msg: impl Into<String>) -> Self {
    Self::Decode { layer: None, msg: msg.into() }
  }

  /// Attach a layer index to a decode error, other errors are passed through.
  pub fn in_layer(self, index: usize) -> Self {
    match self {
      Self::Decode { msg, .. } => Self::Decode { layer: Some(index), msg },
      other => other,
    }
  }

  /// Cancellation must never be reported to the user as failure.
  pub fn is_cancelled(&self) -> bool {
    matches!(self, Self::Cancelled)
  }
}

impl From<std::io::Error> for PsdError {
  fn from(err: std::io::Error) -> Self {
    Self::Io(err.to_string())
  }
}

impl From<reqwest::Error> for PsdError {
  fn from(err: reqwest::Error) -> Self {
    Self::Io(err.to_string())
  }
}

/// Fail with [`PsdError::Cancelled`] once the abort signal has been triggered.
pub fn check_abort(abort: &tokio_util::sync::CancellationToken) -> Result<()> {
  if abort.is_cancelled() { Err(PsdError::Cancelled) } else { Ok(()) }
}

/// Memory map a local file and parse its structure.
pub fn open_file<P: AsRef<Path>>(path: P) -> Result<Document> {
  let source = MemorySource::open(path.as_ref())?;
  Document::parse(Arc::new(source))
}

/// Parse a document held in memory.
pub fn open_bytes(buf: impl Into<bytes::Bytes>) -> Result<Document> {
  Document::parse(Arc::new(MemorySource::new(buf)))
}

#[cfg(test)]
pub(crate) fn init_test_logger() {
  let _ = env_logger::builder().is_test(true).try_init();
}
