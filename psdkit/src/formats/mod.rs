// SPDX-License-Identifier: LGPL-2.1
// Copyright 2026 The psdkit developers

pub mod psd;
