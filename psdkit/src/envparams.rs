// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

use log::warn;

pub(crate) fn psdkit_chunk_size() -> Option<u64> {
  match std::env::var("PSDKIT_CHUNK_SIZE").map(|val| val.parse::<u64>()) {
    Ok(Ok(value)) if value > 0 => Some(value),
    Ok(_) => {
      warn!("Invalid value for PSDKIT_CHUNK_SIZE");
      None
    }
    Err(_) => None,
  }
}

pub(crate) fn psdkit_max_request_chunks() -> Option<usize> {
  match std::env::var("PSDKIT_MAX_REQUEST_CHUNKS").map(|val| val.parse::<usize>()) {
    Ok(Ok(value)) if value > 0 => Some(value),
    Ok(_) => {
      warn!("Invalid value for PSDKIT_MAX_REQUEST_CHUNKS");
      None
    }
    Err(_) => None,
  }
}

pub(crate) fn psdkit_force_inline() -> bool {
  match std::env::var("PSDKIT_FORCE_INLINE").map(|val| val.parse::<u32>()) {
    Ok(Ok(value)) => value == 1,
    Ok(Err(_)) => {
      warn!("Invalid value for PSDKIT_FORCE_INLINE");
      false
    }
    Err(_) => false,
  }
}
