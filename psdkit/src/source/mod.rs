// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

//! Read-only byte sources a document is parsed from.
//!
//! A source is stateless with respect to reading position, all reads pass
//! an absolute offset. Cursors are provided by [`crate::reader::StreamReader`],
//! so one source can serve any number of independent cursors.

use std::{
  fmt::Debug,
  fs::File,
  path::{Path, PathBuf},
  sync::Arc,
};

use bytes::Bytes;
use memmap2::MmapOptions;

use crate::{PsdError, Result, envparams};

pub mod remote;

pub use remote::{HttpFetcher, RangeFetcher, RemoteSource};

/// Default granularity of the remote chunk cache.
pub const DEFAULT_CHUNK_SIZE: u64 = 128 * 1024;
/// Default upper bound of chunks merged into a single range request.
pub const DEFAULT_MAX_REQUEST_CHUNKS: usize = 32;

/// Tuning for remote sources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceConfig {
  pub chunk_size: u64,
  pub max_request_chunks: usize,
}

impl Default for SourceConfig {
  fn default() -> Self {
    Self {
      chunk_size: DEFAULT_CHUNK_SIZE,
      max_request_chunks: DEFAULT_MAX_REQUEST_CHUNKS,
    }
  }
}

impl SourceConfig {
  /// Defaults, overridden by `PSDKIT_CHUNK_SIZE` and `PSDKIT_MAX_REQUEST_CHUNKS`.
  pub fn from_env() -> Self {
    let mut config = Self::default();
    if let Some(chunk_size) = envparams::psdkit_chunk_size() {
      config.chunk_size = chunk_size;
    }
    if let Some(max) = envparams::psdkit_max_request_chunks() {
      config.max_request_chunks = max;
    }
    config
  }

  /// Largest number of bytes a single range request may cover.
  pub fn max_request_bytes(&self) -> u64 {
    self.chunk_size * self.max_request_chunks as u64
  }
}

/// Uniform random access interface over the bytes of one document.
pub trait ByteSource: Send + Sync + Debug {
  /// Total size of the logical file.
  fn len(&self) -> u64;

  fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Return `size` bytes starting at `offset`. Fetches missing data first.
  fn view(&self, offset: u64, size: u64) -> Result<Bytes>;

  /// Hint that the given range will be read soon. No-op for in-memory sources.
  fn prefetch(&self, offset: u64, size: u64) -> Result<()>;
}

/// Decoding reads on top of [`ByteSource`].
pub trait ByteSourceExt: ByteSource {
  /// Fetch `[offset, offset + size)` and hand the bytes to `decode`.
  fn read_with<T, F>(&self, offset: u64, size: u64, decode: F) -> Result<T>
  where
    F: FnOnce(&[u8]) -> Result<T>,
  {
    self.prefetch(offset, size)?;
    let buf = self.view(offset, size)?;
    decode(&buf)
  }
}

impl<S: ByteSource + ?Sized> ByteSourceExt for S {}

/// Fail with [`PsdError::OutOfBounds`] unless `[offset, offset + size)` lies inside `[0, len)`.
pub fn check_bounds(offset: u64, size: u64, len: u64) -> Result<()> {
  match offset.checked_add(size) {
    Some(end) if end <= len => Ok(()),
    _ => Err(PsdError::OutOfBounds { offset, size, len }),
  }
}

/// Source backed by bytes in memory or a memory mapped file
pub struct MemorySource {
  path: PathBuf,
  buf: Bytes,
}

impl MemorySource {
  pub fn new(buf: impl Into<Bytes>) -> Self {
    Self {
      path: PathBuf::default(),
      buf: buf.into(),
    }
  }

  pub fn new_from_slice(buf: &[u8]) -> Self {
    Self::new(Bytes::copy_from_slice(buf))
  }

  /// Memory map a local file.
  pub fn open(path: &Path) -> std::io::Result<Self> {
    let file = File::open(path)?;
    let mmap = unsafe { MmapOptions::new().map(&file)? };
    #[cfg(unix)]
    {
      mmap.advise(memmap2::Advice::WillNeed)?;
    }
    Ok(Self {
      path: path.canonicalize().unwrap_or_else(|_| path.to_owned()),
      buf: Bytes::from_owner(mmap),
    })
  }
}

impl ByteSource for MemorySource {
  fn len(&self) -> u64 {
    self.buf.len() as u64
  }

  fn view(&self, offset: u64, size: u64) -> Result<Bytes> {
    check_bounds(offset, size, self.len())?;
    Ok(self.buf.slice(offset as usize..(offset + size) as usize))
  }

  fn prefetch(&self, offset: u64, size: u64) -> Result<()> {
    check_bounds(offset, size, self.len())
  }
}

impl Debug for MemorySource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("MemorySource").field("path", &self.path).field("len", &self.buf.len()).finish()
  }
}

/// Bounded window into a parent source, offsets are relative to the window start.
#[derive(Debug, Clone)]
pub struct SubSource {
  parent: Arc<dyn ByteSource>,
  offset: u64,
  len: u64,
}

impl SubSource {
  pub fn new(parent: Arc<dyn ByteSource>, offset: u64, len: u64) -> Result<Self> {
    check_bounds(offset, len, parent.len())?;
    Ok(Self { parent, offset, len })
  }
}

impl ByteSource for SubSource {
  fn len(&self) -> u64 {
    self.len
  }

  fn view(&self, offset: u64, size: u64) -> Result<Bytes> {
    check_bounds(offset, size, self.len)?;
    self.parent.view(self.offset + offset, size)
  }

  fn prefetch(&self, offset: u64, size: u64) -> Result<()> {
    check_bounds(offset, size, self.len)?;
    self.parent.prefetch(self.offset + offset, size)
  }
}
