// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

//! Records a page's DOM, user input and per-element visibility as a
//! time-ordered stream of self-contained events that a player of the rrweb
//! family can deterministically replay.
//!
//! # Quickstart
//!
//! ```rust,no_run
//! use std::rc::Rc;
//! use pagetape::{record, EmittedEvent, RecordOptions};
//!
//! pub fn main() {
//!     let handle = record(RecordOptions {
//!         emit: Some(Rc::new(|event: &EmittedEvent, _is_checkout| {
//!             if let Some(event) = event.as_event() {
//!                 web_sys::console::log_1(
//!                     &serde_json::to_string(event).unwrap_or_default().into(),
//!                 );
//!             }
//!         })),
//!         checkout_every_nth: Some(200),
//!         ..Default::default()
//!     })
//!     .expect("recorder configuration is valid");
//!     // ... later:
//!     handle.stop();
//! }
//! ```
//!
//! The recording starts with a `Meta` + `FullSnapshot` pair, then streams
//! incremental snapshots (DOM mutations, pointer/input activity, style and
//! visibility changes) until the handle is stopped. Fresh full snapshots
//! ("checkouts") are taken when any configured event-count, time, or
//! visibility-change threshold fires.

// LINEBENDER LINT SET - lib.rs - v3
// See https://linebender.org/wiki/canonical-lints/
// These lints shouldn't apply to examples or tests.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
// These lints shouldn't apply to examples.
#![warn(clippy::print_stdout, clippy::print_stderr)]
// Targeting e.g. 32-bit means structs containing usize can give false positives for 64-bit.
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
// END LINEBENDER LINT SET
#![expect(missing_docs, reason = "We have many as-yet undocumented items")]
#![expect(clippy::cast_possible_truncation, reason = "Deferred: Noisy")]

mod config;
mod error;
mod record;
mod utils;

pub mod plugins;
pub mod types;

pub use self::config::{
    CanvasSampling, EmitFn, EmittedEvent, ErrorHandler, FlushCustomEvent, HookFn, Hooks,
    InputSampling, KeepIframeSrcFn, LogOptions, MaskTextFn, MouseInteractionSampling,
    MousemoveSampling, PackFn, PluginDisposer, PluginEmitFn, RecordAfter, RecordOptions,
    RecordPlugin, Sampling, VisibilityFlushMode, VisibilitySampling,
};
pub use self::error::RecordError;
pub use self::record::{record, RecordHandle};

// The serializer's shared vocabulary, re-exported so hosts don't need to
// depend on the snapshot crate directly.
pub use pagetape_snapshot::{
    AttrMap, AttrValue, DataUrlOptions, MaskInputFn, MaskInputOptions, Mirror, NodeId,
    SerializedNode, SlimDomOptions, IGNORED_NODE, UNKNOWN_NODE,
};
