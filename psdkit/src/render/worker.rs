// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use log::{debug, info, warn};
use tokio::runtime::{Handle, Runtime};
use tokio_util::sync::CancellationToken;

use super::events::{EventSink, LoadInfo, RenderEvent};
use super::SourceSpec;
use crate::compositor::{composite_with_progress, layer_thumbnail};
use crate::decoder::LayerDecoder;
use crate::formats::psd::Document;
use crate::merged::render_merged;
use crate::source::{ByteSource, SourceConfig};
use crate::{PsdError, Result, check_abort, envparams};

const RENDER_THREAD_NAME: &str = "psdkit-render";

#[derive(Debug, Clone)]
pub enum Command {
  /// Load a document, `visibility` overrides are applied before the first composite
  Load { source: SourceSpec, visibility: Vec<(usize, bool)> },
  /// `generation` is the value of the shared counter after this request was made
  SetVisibility { index: usize, visible: bool, generation: u64 },
  SetGroupOpen { index: usize, open: bool },
  Thumbnail { serial: u64, index: usize, width: u32, height: u32 },
  Shutdown,
}

/// Executes pipeline commands. Implementations differ only in the thread
/// the work runs on, events and their order are the same.
pub trait RenderWorker: Send + Sync + Debug {
  fn submit(&self, command: Command) -> Result<()>;

  /// Stop accepting commands and wait until running work is finished.
  fn shutdown(&mut self);

  fn name(&self) -> &'static str;
}

/// True when a dedicated render thread can be used.
pub fn probe_background_support() -> bool {
  if envparams::psdkit_force_inline() {
    debug!("Background rendering disabled by environment");
    return false;
  }
  match std::thread::Builder::new().name("psdkit-probe".into()).spawn(|| ()) {
    Ok(handle) => handle.join().is_ok(),
    Err(err) => {
      warn!("Threads are not available, rendering inline: {}", err);
      false
    }
  }
}

/// Parse, decode and composite state of one document.
pub(crate) struct Pipeline {
  config: SourceConfig,
  handle: Option<Handle>,
  runtime: Option<Runtime>,
  abort: CancellationToken,
  events: EventSink,
  generation: Arc<AtomicU64>,
  /// Generation of the last visibility change applied to the document
  applied: u64,
  decode_count: Arc<AtomicUsize>,
  document: Option<Document>,
  decoder: Option<LayerDecoder>,
  /// A composite was discarded as stale and has to be repeated
  dirty: bool,
}

impl Debug for Pipeline {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Pipeline")
      .field("loaded", &self.document.is_some())
      .field("dirty", &self.dirty)
      .finish()
  }
}

impl Drop for Pipeline {
  fn drop(&mut self) {
    if let Some(runtime) = self.runtime.take() {
      runtime.shutdown_background();
    }
  }
}

impl Pipeline {
  pub(crate) fn new(
    config: SourceConfig,
    handle: Option<Handle>,
    abort: CancellationToken,
    events: EventSink,
    generation: Arc<AtomicU64>,
    decode_count: Arc<AtomicUsize>,
  ) -> Self {
    Self {
      config,
      handle,
      runtime: None,
      abort,
      events,
      generation,
      applied: 0,
      decode_count,
      document: None,
      decoder: None,
      dirty: false,
    }
  }

  /// Run a batch of queued commands, returns false when the worker should stop.
  pub(crate) fn process(&mut self, batch: Vec<Command>) -> bool {
    let mut changed = false;
    for command in batch {
      if self.abort.is_cancelled() {
        return false;
      }
      match command {
        Command::Load { source, visibility } => {
          changed = false;
          self.dirty = false;
          if let Err(err) = self.load(source, &visibility) {
            self.events.error(&err);
          }
        }
        Command::SetVisibility {
          index,
          visible,
          generation,
        } => {
          self.applied = self.applied.max(generation);
          if let Some(document) = self.document.as_mut() {
            if document.layer(index).is_none() {
              warn!("Ignoring visibility of unknown layer {}", index);
            }
            changed |= document.set_layer_visibility(index, visible);
          }
        }
        Command::SetGroupOpen { index, open } => {
          if let Some(document) = self.document.as_mut() {
            document.set_group_open(index, open);
          }
        }
        Command::Thumbnail {
          serial,
          index,
          width,
          height,
        } => self.thumbnail(serial, index, width, height),
        Command::Shutdown => return false,
      }
    }
    if changed || self.dirty {
      self.recomposite();
    }
    !self.abort.is_cancelled()
  }

  fn runtime_handle(&mut self) -> Result<Handle> {
    if let Some(handle) = &self.handle {
      return Ok(handle.clone());
    }
    let runtime = tokio::runtime::Builder::new_multi_thread()
      .worker_threads(2)
      .thread_name("psdkit-fetch")
      .enable_all()
      .build()?;
    let handle = runtime.handle().clone();
    self.runtime = Some(runtime);
    self.handle = Some(handle.clone());
    Ok(handle)
  }

  fn open_source(&mut self, spec: SourceSpec) -> Result<Arc<dyn ByteSource>> {
    let handle = match spec {
      SourceSpec::Url(_) => Some(self.runtime_handle()?),
      _ => None,
    };
    spec.open(self.config, handle, &self.abort)
  }

  fn load(&mut self, spec: SourceSpec, visibility: &[(usize, bool)]) -> Result<()> {
    check_abort(&self.abort)?;
    info!("Loading {}", spec);
    self.document = None;
    let source = self.open_source(spec)?;
    let mut document = Document::parse(source)?;
    check_abort(&self.abort)?;
    for &(index, visible) in visibility {
      if document.layer(index).is_none() {
        warn!("Ignoring visibility of unknown layer {}", index);
      }
      document.set_layer_visibility(index, visible);
    }
    self.events.emit(RenderEvent::Load(LoadInfo {
      layers: document.summary(),
      width: document.width(),
      height: document.height(),
    }));

    let decoder = LayerDecoder::new(document.source(), self.abort.clone()).with_counter(self.decode_count.clone());
    let events = self.events.clone();
    let failures = decoder.decode_all(&document, |progress| events.emit(RenderEvent::LayerLoad(progress)))?;
    for err in failures {
      if let PsdError::Decode { layer: Some(index), .. } = &err {
        self.events.emit(RenderEvent::LayerDecodeFailed {
          index: *index,
          message: err.to_string(),
        });
      }
    }
    self.document = Some(document);
    self.decoder = Some(decoder);
    self.recomposite();
    Ok(())
  }

  /// Composite the current state and deliver it unless a newer state was requested meanwhile.
  fn recomposite(&mut self) {
    let Some(document) = self.document.as_ref() else {
      return;
    };
    self.dirty = false;
    let events = self.events.clone();
    let result = if document.layers.is_empty() && document.merged.is_some() {
      events.emit(RenderEvent::LayerRender(1.0));
      render_merged(document)
    } else {
      composite_with_progress(document, &self.abort, |progress| events.emit(RenderEvent::LayerRender(progress)))
    };
    match result {
      Ok(image) => {
        // a newer visibility change is on its way
        let requested = self.generation.load(Ordering::Acquire);
        if requested != self.applied {
          debug!("Discarding stale composite of generation {}, {} requested", self.applied, requested);
          self.dirty = true;
          return;
        }
        self.events.emit(RenderEvent::Render(Arc::new(image)));
      }
      Err(err) => self.events.error(&err),
    }
  }

  fn thumbnail(&mut self, serial: u64, index: usize, width: u32, height: u32) {
    let result = match (self.document.as_ref(), self.decoder.as_ref()) {
      (Some(document), Some(decoder)) => match document.layer(index) {
        Some(layer) => ensure_decoded(decoder, document, layer).and_then(|_| layer_thumbnail(document, index, width, height)),
        None => Err(PsdError::LayerNotFound(index)),
      },
      _ => Err(PsdError::Format("No document loaded".into())),
    };
    if matches!(result, Err(PsdError::Cancelled)) {
      return;
    }
    self.events.emit(RenderEvent::LayerThumbnail {
      serial,
      result: result.map(Arc::new),
    });
  }
}

/// Decode a layer and its descendants, already decoded layers are skipped.
fn ensure_decoded(decoder: &LayerDecoder, document: &Document, layer: &crate::Layer) -> Result<()> {
  let mut stack = vec![layer];
  while let Some(layer) = stack.pop() {
    match decoder.decode_layer(&document.header, layer) {
      Ok(()) | Err(PsdError::Decode { .. }) => {}
      Err(err) => return Err(err),
    }
    stack.extend(layer.children.iter());
  }
  Ok(())
}

/// Runs the pipeline on the calling thread.
#[derive(Debug)]
pub struct InlineWorker {
  pipeline: Mutex<Option<Pipeline>>,
}

impl InlineWorker {
  pub(crate) fn new(pipeline: Pipeline) -> Self {
    Self {
      pipeline: Mutex::new(Some(pipeline)),
    }
  }
}

impl RenderWorker for InlineWorker {
  fn submit(&self, command: Command) -> Result<()> {
    let mut guard = self.pipeline.lock().map_err(|_| PsdError::Io("Render pipeline is poisoned".into()))?;
    let Some(pipeline) = guard.as_mut() else {
      return Err(PsdError::Cancelled);
    };
    if !pipeline.process(vec![command]) {
      *guard = None;
    }
    Ok(())
  }

  fn shutdown(&mut self) {
    if let Ok(mut guard) = self.pipeline.lock() {
      guard.take();
    }
  }

  fn name(&self) -> &'static str {
    "inline"
  }
}

/// Runs the pipeline on a dedicated thread fed by a command channel.
#[derive(Debug)]
pub struct BackgroundWorker {
  tx: Mutex<Option<Sender<Command>>>,
  thread: Option<JoinHandle<()>>,
}

impl BackgroundWorker {
  pub(crate) fn spawn(pipeline: Pipeline) -> std::io::Result<Self> {
    let (tx, rx) = channel();
    let thread = std::thread::Builder::new()
      .name(RENDER_THREAD_NAME.into())
      .spawn(move || run_commands(pipeline, rx))?;
    Ok(Self {
      tx: Mutex::new(Some(tx)),
      thread: Some(thread),
    })
  }
}

fn run_commands(mut pipeline: Pipeline, rx: Receiver<Command>) {
  debug!("Render thread started");
  while let Ok(first) = rx.recv() {
    // everything queued meanwhile is handled as one batch
    let mut batch = vec![first];
    batch.extend(rx.try_iter());
    if !pipeline.process(batch) {
      break;
    }
  }
  debug!("Render thread finished");
}

impl RenderWorker for BackgroundWorker {
  fn submit(&self, command: Command) -> Result<()> {
    let guard = self.tx.lock().map_err(|_| PsdError::Io("Render command channel is poisoned".into()))?;
    match guard.as_ref() {
      Some(tx) => tx.send(command).map_err(|_| PsdError::Cancelled),
      None => Err(PsdError::Cancelled),
    }
  }

  fn shutdown(&mut self) {
    if let Ok(mut guard) = self.tx.lock() {
      if let Some(tx) = guard.take() {
        let _ = tx.send(Command::Shutdown);
      }
    }
    if let Some(thread) = self.thread.take() {
      if thread.join().is_err() {
        warn!("Render thread panicked");
      }
    }
  }

  fn name(&self) -> &'static str {
    RENDER_THREAD_NAME
  }
}

impl Drop for BackgroundWorker {
  fn drop(&mut self) {
    self.shutdown();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use bytes::Bytes;
  use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

  /// 1x1 RGB document with a single opaque layer
  fn document() -> Bytes {
    let mut record = Vec::new();
    for v in [0_i32, 0, 1, 1] {
      record.extend_from_slice(&v.to_be_bytes());
    }
    record.extend_from_slice(&3_u16.to_be_bytes());
    for id in [0_i16, 1, 2] {
      record.extend_from_slice(&id.to_be_bytes());
      record.extend_from_slice(&3_u32.to_be_bytes());
    }
    record.extend_from_slice(b"8BIMnorm");
    record.extend_from_slice(&[255, 0, 0, 0]);
    record.extend_from_slice(&12_u32.to_be_bytes());
    record.extend_from_slice(&[0; 8]);
    record.extend_from_slice(&[1, b'L', 0, 0]);

    let mut info = 1_i16.to_be_bytes().to_vec();
    info.extend(record);
    for value in [10, 20, 30] {
      info.extend_from_slice(&[0, 0, value]);
    }
    if info.len() % 2 == 1 {
      info.push(0);
    }

    let mut data = b"8BPS".to_vec();
    data.extend_from_slice(&1_u16.to_be_bytes());
    data.extend_from_slice(&[0; 6]);
    data.extend_from_slice(&3_u16.to_be_bytes());
    data.extend_from_slice(&1_u32.to_be_bytes());
    data.extend_from_slice(&1_u32.to_be_bytes());
    data.extend_from_slice(&8_u16.to_be_bytes());
    data.extend_from_slice(&3_u16.to_be_bytes());
    data.extend_from_slice(&[0; 8]);
    data.extend_from_slice(&((info.len() + 8) as u32).to_be_bytes());
    data.extend_from_slice(&(info.len() as u32).to_be_bytes());
    data.extend(info);
    data.extend_from_slice(&[0; 4]);
    Bytes::from(data)
  }

  fn pipeline() -> (Pipeline, UnboundedReceiver<RenderEvent>, Arc<AtomicU64>) {
    let (tx, rx) = unbounded_channel();
    let abort = CancellationToken::new();
    let generation = Arc::new(AtomicU64::new(0));
    let pipeline = Pipeline::new(
      SourceConfig::default(),
      None,
      abort.clone(),
      EventSink::new(tx, abort),
      generation.clone(),
      Arc::new(AtomicUsize::new(0)),
    );
    (pipeline, rx, generation)
  }

  fn load() -> Command {
    Command::Load {
      source: SourceSpec::Memory(document()),
      visibility: Vec::new(),
    }
  }

  fn render_count(rx: &mut UnboundedReceiver<RenderEvent>) -> usize {
    let mut count = 0;
    while let Ok(event) = rx.try_recv() {
      if let RenderEvent::Render(image) = event {
        assert_eq!(image.get_pixel(0, 0).0, [10, 20, 30, 255]);
        count += 1;
      }
    }
    count
  }

  #[test]
  fn batch_composites_once() {
    crate::init_test_logger();
    let (mut pipeline, mut rx, generation) = pipeline();
    assert!(pipeline.process(vec![load()]));
    assert_eq!(render_count(&mut rx), 1);

    generation.store(2, Ordering::Release);
    let batch = vec![
      Command::SetVisibility {
        index: 0,
        visible: false,
        generation: 1,
      },
      Command::SetVisibility {
        index: 0,
        visible: true,
        generation: 2,
      },
    ];
    assert!(pipeline.process(batch));
    assert_eq!(render_count(&mut rx), 1);
  }

  #[test]
  fn stale_composite_is_not_delivered() {
    let (mut pipeline, mut rx, generation) = pipeline();
    assert!(pipeline.process(vec![load()]));
    assert_eq!(render_count(&mut rx), 1);

    // second request is made before the first one is processed
    generation.store(2, Ordering::Release);
    let hide = Command::SetVisibility {
      index: 0,
      visible: false,
      generation: 1,
    };
    assert!(pipeline.process(vec![hide]));
    assert!(pipeline.dirty);
    assert_eq!(render_count(&mut rx), 0);

    // the last request does not change anything, the pending composite is still delivered
    let hide_again = Command::SetVisibility {
      index: 0,
      visible: false,
      generation: 2,
    };
    assert!(pipeline.process(vec![hide_again]));
    assert!(!pipeline.dirty);
    let mut images = Vec::new();
    while let Ok(event) = rx.try_recv() {
      if let RenderEvent::Render(image) = event {
        images.push(image);
      }
    }
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].get_pixel(0, 0).0[3], 0);
  }

  #[test]
  fn load_applies_visibility_overrides() {
    let (mut pipeline, mut rx, _) = pipeline();
    let command = Command::Load {
      source: SourceSpec::Memory(document()),
      visibility: vec![(0, false), (7, false)],
    };
    assert!(pipeline.process(vec![command]));
    let mut rendered = false;
    while let Ok(event) = rx.try_recv() {
      if let RenderEvent::Render(image) = event {
        assert_eq!(image.get_pixel(0, 0).0[3], 0);
        rendered = true;
      }
    }
    assert!(rendered);
  }

  #[test]
  fn shutdown_stops_processing() {
    let (mut pipeline, mut rx, _) = pipeline();
    assert!(!pipeline.process(vec![Command::Shutdown, load()]));
    assert_eq!(render_count(&mut rx), 0);
  }
}
