// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

//! Lazily fetched HTTP(S) source with a chunk cache.
//!
//! The document is split into fixed size chunks. A read first makes sure all
//! chunks covering the range are present, merging adjacent missing chunks into
//! as few range requests as possible, then slices the cached chunk data.
//! Fetches are serialised by a gate so concurrent readers of overlapping
//! ranges wait for the running request instead of issuing a second one.
//!
//! The source blocks the calling thread while fetching. It must be used from
//! a thread that is not driving the tokio runtime (a worker thread, a
//! `spawn_blocking` task or a multi-threaded runtime worker via `block_in_place`).
//! Reads from inside a current thread runtime fail with [`PsdError::Unsupported`].

use std::{
  collections::BTreeMap,
  fmt::Debug,
  future::Future,
  sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicUsize, Ordering},
  },
};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use log::{debug, warn};
use reqwest::{StatusCode, header};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio_util::sync::CancellationToken;

use super::{ByteSource, SourceConfig, check_bounds};
use crate::{PsdError, Result, check_abort};

/// Transport used by [`RemoteSource`] to talk to the server.
#[async_trait]
pub trait RangeFetcher: Send + Sync + Debug {
  /// Total size of the remote file.
  async fn content_length(&self) -> Result<u64>;

  /// Probe whether the server honors byte range requests.
  async fn supports_ranges(&self) -> Result<bool>;

  /// Fetch bytes `[start, end)`.
  async fn fetch_range(&self, start: u64, end: u64) -> Result<Bytes>;

  /// Fetch the whole file in one request.
  async fn fetch_all(&self) -> Result<Bytes>;
}

/// [`RangeFetcher`] over HTTP(S) using reqwest
#[derive(Debug, Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
  url: String,
}

impl HttpFetcher {
  pub fn new(url: impl Into<String>) -> Self {
    Self::with_client(reqwest::Client::new(), url)
  }

  pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
    Self { client, url: url.into() }
  }
}

#[async_trait]
impl RangeFetcher for HttpFetcher {
  async fn content_length(&self) -> Result<u64> {
    let response = self.client.head(&self.url).send().await?.error_for_status()?;
    response
      .headers()
      .get(header::CONTENT_LENGTH)
      .and_then(|value| value.to_str().ok())
      .and_then(|value| value.parse::<u64>().ok())
      .ok_or_else(|| PsdError::Io(format!("Server did not report a Content-Length for {}", self.url)))
  }

  async fn supports_ranges(&self) -> Result<bool> {
    let response = self.client.get(&self.url).header(header::RANGE, "bytes=0-0").send().await?.error_for_status()?;
    // Response body is dropped without reading, a server ignoring the range
    // header would otherwise stream the whole file here.
    Ok(response.status() == StatusCode::PARTIAL_CONTENT)
  }

  async fn fetch_range(&self, start: u64, end: u64) -> Result<Bytes> {
    let response = self
      .client
      .get(&self.url)
      .header(header::RANGE, format!("bytes={}-{}", start, end - 1))
      .send()
      .await?
      .error_for_status()?;
    if response.status() != StatusCode::PARTIAL_CONTENT {
      return Err(PsdError::Io(format!(
        "Malformed Range response for bytes {}-{}: status {}",
        start,
        end - 1,
        response.status()
      )));
    }
    let body = response.bytes().await?;
    if body.len() as u64 != end - start {
      return Err(PsdError::Io(format!(
        "Malformed Range response: expected {} bytes, got {}",
        end - start,
        body.len()
      )));
    }
    Ok(body)
  }

  async fn fetch_all(&self) -> Result<Bytes> {
    let response = self.client.get(&self.url).send().await?.error_for_status()?;
    Ok(response.bytes().await?)
  }
}

/// Source reading a remote file on demand
pub struct RemoteSource {
  fetcher: Arc<dyn RangeFetcher>,
  len: u64,
  config: SourceConfig,
  runtime: Handle,
  abort: CancellationToken,
  ranges: bool,
  chunks: Mutex<BTreeMap<u64, Bytes>>,
  fetch_gate: Mutex<()>,
  requests: AtomicUsize,
}

impl RemoteSource {
  /// Open an HTTP(S) URL.
  pub fn open(url: &str, config: SourceConfig, runtime: Handle, abort: CancellationToken) -> Result<Self> {
    Self::with_fetcher(Arc::new(HttpFetcher::new(url)), config, runtime, abort)
  }

  /// Open a remote file through an arbitrary transport.
  ///
  /// Determines the file size and probes for range support. Servers without
  /// range support are read completely right here.
  pub fn with_fetcher(fetcher: Arc<dyn RangeFetcher>, config: SourceConfig, runtime: Handle, abort: CancellationToken) -> Result<Self> {
    if config.chunk_size == 0 || config.max_request_chunks == 0 {
      return Err(PsdError::Io("Chunk size and request size must not be zero".into()));
    }
    let mut source = Self {
      fetcher,
      len: 0,
      config,
      runtime,
      abort,
      ranges: true,
      chunks: Mutex::new(BTreeMap::new()),
      fetch_gate: Mutex::new(()),
      requests: AtomicUsize::new(0),
    };
    check_abort(&source.abort)?;
    let fetcher = source.fetcher.clone();
    let (len, ranges) = source.block_on(async move {
      let len = fetcher.content_length().await?;
      let ranges = fetcher.supports_ranges().await?;
      Ok((len, ranges))
    })?;
    source.len = len;
    source.ranges = ranges;
    debug!(
      "Remote source opened: {} bytes, range requests: {}, up to {} bytes per request",
      len,
      ranges,
      source.config.max_request_bytes()
    );

    if !ranges {
      warn!("Server does not honor range requests, fetching the whole file ({} bytes)", len);
      let fetcher = source.fetcher.clone();
      source.requests.fetch_add(1, Ordering::SeqCst);
      let body = source.block_on(async move { fetcher.fetch_all().await })?;
      if body.len() as u64 != len {
        warn!("Content-Length {} does not match received body of {} bytes", len, body.len());
        source.len = body.len() as u64;
      }
      let mut chunks = source.chunks.lock().unwrap_or_else(|e| e.into_inner());
      insert_chunks(&mut chunks, 0, &body, source.config.chunk_size);
    }
    Ok(source)
  }

  /// Whether the server honored the range probe.
  pub fn supports_ranges(&self) -> bool {
    self.ranges
  }

  /// Indices of all chunks present in the cache, ascending.
  pub fn fetched_chunks(&self) -> Vec<u64> {
    self.cache().keys().copied().collect()
  }

  /// Number of data requests issued so far (probes not counted).
  pub fn request_count(&self) -> usize {
    self.requests.load(Ordering::SeqCst)
  }

  fn cache(&self) -> MutexGuard<'_, BTreeMap<u64, Bytes>> {
    self.chunks.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Chunk indices covering a non-empty byte range.
  fn chunk_span(&self, offset: u64, size: u64) -> (u64, u64) {
    let first = offset / self.config.chunk_size;
    let last = (offset + size - 1) / self.config.chunk_size;
    (first, last)
  }

  fn missing_chunks(&self, first: u64, last: u64) -> Vec<u64> {
    let cache = self.cache();
    (first..=last).filter(|idx| !cache.contains_key(idx)).collect()
  }

  /// Drive a future on the runtime, racing it against the abort signal.
  fn block_on<T, F>(&self, fut: F) -> Result<T>
  where
    F: Future<Output = Result<T>>,
  {
    let abort = self.abort.clone();
    let task = async move {
      tokio::select! {
        biased;
        _ = abort.cancelled() => Err(PsdError::Cancelled),
        res = fut => res,
      }
    };
    match Handle::try_current() {
      Ok(current) if current.runtime_flavor() == RuntimeFlavor::CurrentThread => Err(PsdError::Unsupported(
        "Remote reads can not block a current thread runtime, read from spawn_blocking or a background worker".into(),
      )),
      Ok(_) => tokio::task::block_in_place(|| self.runtime.block_on(task)),
      Err(_) => self.runtime.block_on(task),
    }
  }

  fn fetch_run(&self, first: u64, last: u64) -> Result<()> {
    check_abort(&self.abort)?;
    let start = first * self.config.chunk_size;
    let end = ((last + 1) * self.config.chunk_size).min(self.len);
    debug!("Fetching chunks {}..={} (bytes {}..{})", first, last, start, end);
    self.requests.fetch_add(1, Ordering::SeqCst);
    let fetcher = self.fetcher.clone();
    let body = self.block_on(async move { fetcher.fetch_range(start, end).await })?;
    if body.len() as u64 != end - start {
      return Err(PsdError::Io(format!("Range fetch returned {} bytes, expected {}", body.len(), end - start)));
    }
    insert_chunks(&mut self.cache(), first, &body, self.config.chunk_size);
    Ok(())
  }
}

/// Split consecutive chunk indices into runs of at most `max` chunks.
fn coalesce_runs(missing: &[u64], max: usize) -> Vec<(u64, u64)> {
  let mut runs: Vec<(u64, u64)> = Vec::new();
  for &idx in missing {
    match runs.last_mut() {
      Some((first, last)) if *last + 1 == idx && (idx - *first) < max as u64 => *last = idx,
      _ => runs.push((idx, idx)),
    }
  }
  runs
}

fn insert_chunks(cache: &mut BTreeMap<u64, Bytes>, first: u64, body: &Bytes, chunk_size: u64) {
  let chunk_size = chunk_size as usize;
  let mut start = 0;
  let mut idx = first;
  while start < body.len() {
    let end = (start + chunk_size).min(body.len());
    cache.insert(idx, body.slice(start..end));
    start = end;
    idx += 1;
  }
}

impl ByteSource for RemoteSource {
  fn len(&self) -> u64 {
    self.len
  }

  fn view(&self, offset: u64, size: u64) -> Result<Bytes> {
    check_bounds(offset, size, self.len)?;
    if size == 0 {
      return Ok(Bytes::new());
    }
    self.prefetch(offset, size)?;
    let cs = self.config.chunk_size;
    let (first, last) = self.chunk_span(offset, size);
    let cache = self.cache();
    let lookup = |idx: u64| cache.get(&idx).ok_or_else(|| PsdError::Io(format!("Chunk {} missing after fetch", idx)));
    if first == last {
      let chunk = lookup(first)?;
      let start = (offset - first * cs) as usize;
      return Ok(chunk.slice(start..start + size as usize));
    }
    let mut out = BytesMut::with_capacity(size as usize);
    for idx in first..=last {
      let chunk = lookup(idx)?;
      let chunk_start = idx * cs;
      let from = offset.max(chunk_start) - chunk_start;
      let to = (offset + size).min(chunk_start + chunk.len() as u64) - chunk_start;
      out.extend_from_slice(&chunk[from as usize..to as usize]);
    }
    Ok(out.freeze())
  }

  fn prefetch(&self, offset: u64, size: u64) -> Result<()> {
    check_bounds(offset, size, self.len)?;
    if size == 0 {
      return Ok(());
    }
    check_abort(&self.abort)?;
    let (first, last) = self.chunk_span(offset, size);
    if self.missing_chunks(first, last).is_empty() {
      return Ok(());
    }
    let _gate = self.fetch_gate.lock().unwrap_or_else(|e| e.into_inner());
    // Another reader may have fetched the data while we waited for the gate.
    let missing = self.missing_chunks(first, last);
    for (run_first, run_last) in coalesce_runs(&missing, self.config.max_request_chunks) {
      self.fetch_run(run_first, run_last)?;
    }
    Ok(())
  }
}

impl Debug for RemoteSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RemoteSource")
      .field("fetcher", &self.fetcher)
      .field("len", &self.len)
      .field("config", &self.config)
      .field("ranges", &self.ranges)
      .finish()
  }
}
