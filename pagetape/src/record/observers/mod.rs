// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

//! Observers that hook browser APIs rather than listen for DOM events.

pub(crate) mod canvas;
pub(crate) mod fonts;
pub(crate) mod log;
pub(crate) mod style;
