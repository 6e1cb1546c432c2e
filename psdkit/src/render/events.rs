// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

use std::sync::Arc;

use image::RgbaImage;
use log::trace;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

use crate::PsdError;
use crate::formats::psd::LayerSummary;

/// Structure of a loaded document, sent before any pixel is decoded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadInfo {
  pub layers: Vec<LayerSummary>,
  pub width: u32,
  pub height: u32,
}

#[derive(Debug, Clone)]
pub enum RenderEvent {
  Load(LoadInfo),
  /// Fraction of decoded layers
  LayerLoad(f32),
  /// Fraction of composited layers
  LayerRender(f32),
  Render(Arc<RgbaImage>),
  /// Answer to a thumbnail request
  LayerThumbnail {
    serial: u64,
    result: std::result::Result<Arc<RgbaImage>, PsdError>,
  },
  /// A layer could not be decoded and renders transparent.
  LayerDecodeFailed { index: usize, message: String },
  Error(String),
}

pub type EventReceiver = UnboundedReceiver<RenderEvent>;

/// Sending half of the event channel.
///
/// Once the abort signal is triggered nothing is delivered anymore.
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
  tx: UnboundedSender<RenderEvent>,
  abort: CancellationToken,
}

impl EventSink {
  pub(crate) fn new(tx: UnboundedSender<RenderEvent>, abort: CancellationToken) -> Self {
    Self { tx, abort }
  }

  pub(crate) fn emit(&self, event: RenderEvent) {
    if self.abort.is_cancelled() {
      trace!("Dropping event after cancellation: {:?}", std::mem::discriminant(&event));
      return;
    }
    // receiver gone means nobody listens anymore
    let _ = self.tx.send(event);
  }

  /// Report an error, cancellation is never an error for the consumer.
  pub(crate) fn error(&self, err: &PsdError) {
    if !err.is_cancelled() {
      self.emit(RenderEvent::Error(err.to_string()));
    }
  }
}
