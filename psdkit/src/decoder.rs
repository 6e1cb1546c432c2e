// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

//! Layer pixel decoder.
//!
//! Fills the write-once pixel slot of each layer. Channels of one layer are
//! decompressed in parallel, layers are processed in record order.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use log::{debug, warn};
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::decompressors::{PlaneFormat, decode_plane};
use crate::formats::psd::{ChannelDescriptor, Document, Header, Layer, LayerPixels};
use crate::pixarray::{LayerRaster, PixF32, Plane};
use crate::source::{ByteSource, ByteSourceExt, SubSource};
use crate::{PsdError, Result, check_abort};

#[derive(Debug, Clone)]
pub struct LayerDecoder {
  source: Arc<dyn ByteSource>,
  abort: CancellationToken,
  decode_count: Arc<AtomicUsize>,
}

impl LayerDecoder {
  pub fn new(source: &Arc<dyn ByteSource>, abort: CancellationToken) -> Self {
    Self {
      source: source.clone(),
      abort,
      decode_count: Arc::new(AtomicUsize::new(0)),
    }
  }

  /// Count decodes in a counter shared with the caller.
  pub fn with_counter(mut self, counter: Arc<AtomicUsize>) -> Self {
    self.decode_count = counter;
    self
  }

  /// Number of layer decodes performed by this decoder (and its clones).
  pub fn decode_count(&self) -> usize {
    self.decode_count.load(Ordering::Acquire)
  }

  /// Decode the channels of `layer` into its pixel slot.
  ///
  /// Corrupt channel data stores [`LayerPixels::Failed`] and returns the decode
  /// error. I/O errors and cancellation leave the slot empty.
  pub fn decode_layer(&self, header: &Header, layer: &Layer) -> Result<()> {
    if layer.is_decoded() {
      return Ok(());
    }
    check_abort(&self.abort)?;
    self.decode_count.fetch_add(1, Ordering::AcqRel);

    let start = Instant::now();
    match self.decode_channels(header, &layer.channels) {
      Ok(raster) => {
        debug!(
          "Layer {} '{}': decoded {} planes in {:.2?}",
          layer.index,
          layer.name,
          raster.planes.len(),
          start.elapsed()
        );
        layer.set_pixels(LayerPixels::Decoded(Arc::new(raster)));
        Ok(())
      }
      Err(err @ (PsdError::Cancelled | PsdError::Io(_))) => Err(err),
      Err(err) => {
        let err = match err {
          PsdError::OutOfBounds { .. } => PsdError::decode(err.to_string()),
          other => other,
        }
        .in_layer(layer.index);
        warn!("Layer {} '{}' failed to decode, rendering it transparent: {}", layer.index, layer.name, err);
        layer.set_pixels(LayerPixels::Failed(err.clone()));
        Err(err)
      }
    }
  }

  fn decode_channels(&self, header: &Header, channels: &[ChannelDescriptor]) -> Result<LayerRaster> {
    // one request for all channels, they are stored back to back
    if let (Some(start), Some(end)) = (
      channels.iter().map(|c| c.offset).min(),
      channels.iter().map(|c| c.offset + c.length).max(),
    ) {
      self.source.prefetch(start, end - start)?;
    }
    let windows = channels
      .iter()
      .map(|c| Ok((c, SubSource::new(self.source.clone(), c.offset, c.length)?)))
      .collect::<Result<Vec<_>>>()?;
    check_abort(&self.abort)?;

    let planes = windows
      .into_par_iter()
      .map(|(channel, window)| {
        let format = PlaneFormat {
          width: channel.rect.width() as usize,
          height: channel.rect.height() as usize,
          depth: header.depth,
          psb: header.is_psb(),
        };
        let pixels = if format.width == 0 || format.height == 0 {
          PixF32::default()
        } else {
          window.read_with(0, window.len(), |data| decode_plane(data, &format))?
        };
        Ok(Plane {
          id: channel.id,
          rect: channel.rect,
          data: pixels,
        })
      })
      .collect::<Result<Vec<Plane>>>()?;
    Ok(LayerRaster { planes })
  }

  /// Decode every layer of `document` in record order.
  ///
  /// `progress` receives the fraction of decoded layers after each layer.
  /// Per-layer decode errors are collected and returned, I/O errors and
  /// cancellation abort the whole run.
  pub fn decode_all<F>(&self, document: &Document, mut progress: F) -> Result<Vec<PsdError>>
  where
    F: FnMut(f32),
  {
    // groups are decoded too, they may carry a mask
    let layers = document.flat_layers();
    let total = layers.len();
    let mut failures = Vec::new();
    if total == 0 {
      progress(1.0);
      return Ok(failures);
    }
    for (done, layer) in layers.into_iter().enumerate() {
      check_abort(&self.abort)?;
      match self.decode_layer(&document.header, layer) {
        Ok(()) => {}
        Err(err @ (PsdError::Cancelled | PsdError::Io(_))) => return Err(err),
        Err(err) => failures.push(err),
      }
      progress((done + 1) as f32 / total as f32);
    }
    Ok(failures)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::formats::psd::{ChannelId, Rect};
  use crate::source::MemorySource;

  fn header() -> Header {
    Header {
      version: 1,
      channels: 3,
      height: 2,
      width: 2,
      depth: 8,
      color_mode: crate::ColorMode::Rgb,
    }
  }

  fn channels(data_len: u64) -> Vec<ChannelDescriptor> {
    vec![ChannelDescriptor {
      id: ChannelId::Color(0),
      offset: 0,
      length: data_len,
      rect: Rect::new(0, 0, 2, 2),
      decoded_len: 4,
    }]
  }

  #[test]
  fn decode_raw_channel() -> Result<()> {
    crate::init_test_logger();
    let source: Arc<dyn ByteSource> = Arc::new(MemorySource::new_from_slice(&[0, 0, 0, 255, 255, 0]));
    let decoder = LayerDecoder::new(&source, CancellationToken::new());
    let raster = decoder.decode_channels(&header(), &channels(6))?;
    let plane = raster.plane(ChannelId::Color(0)).ok_or(PsdError::decode("missing plane"))?;
    assert_eq!(plane.data.data, vec![0.0, 1.0, 1.0, 0.0]);
    Ok(())
  }

  #[test]
  fn cancelled_decoder_refuses_work() {
    let source: Arc<dyn ByteSource> = Arc::new(MemorySource::new_from_slice(&[0, 0, 0, 255, 255, 0]));
    let abort = CancellationToken::new();
    abort.cancel();
    let decoder = LayerDecoder::new(&source, abort);
    assert!(matches!(decoder.decode_channels(&header(), &channels(6)), Err(PsdError::Cancelled)));
  }
}
