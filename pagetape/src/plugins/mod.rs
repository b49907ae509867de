// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

//! Built-in plugins.

mod sequential_id;

pub use sequential_id::{sequential_id_plugin, SequentialIdOptions};
