// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

//! One-shot serialization of a live DOM tree into a stable, id-addressed tree
//! of [`SerializedNode`]s, plus the pieces the recording engine shares with it:
//! the node [`Mirror`] and the visibility/interactivity evaluator.
//!
//! The serialized form is the baseline of a recording: the recorder in the
//! `pagetape` crate takes a full snapshot through [`snapshot`], then describes
//! everything that happens afterwards relative to the node ids handed out
//! here.

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

mod css;
mod error;
mod mask;
mod mirror;
mod selector;
mod serialize;
mod types;
mod visibility;

pub use self::css::{absolutify_import_urls, split_css_text, stringify_stylesheet, SPLIT_MARKER};
pub use self::error::SnapshotError;
pub use self::mask::{
    mask_input_value, mask_text, InputKind, MaskInputFn, MaskInputOptions, MaskTextFn,
};
pub use self::mirror::Mirror;
pub use self::selector::{css_selector_of, xpath_of};
pub use self::serialize::{
    is_shadow_root, serialize_node_with_id, snapshot, DataUrlOptions, SlimDomOptions,
    SnapshotOptions, ORIGINAL_METHOD_KEY,
};
pub use self::types::{
    AttrMap, AttrValue, DocumentNode, DocumentTypeNode, ElementNode, NodeId, SerializedNode,
    TextNode, IGNORED_NODE, UNKNOWN_NODE,
};
pub use self::visibility::{
    evaluate_visibility, expand_by_margin, is_interactive_element, is_interactive_node,
    is_style_visible, parse_root_margin, MarginValue, Rect, VisibilityEntry, VisibilityMap,
    VisibilityOptions,
};

/// The HTML namespace
pub const HTML_NS: &str = "http://www.w3.org/1999/xhtml";
/// The SVG namespace
pub const SVG_NS: &str = "http://www.w3.org/2000/svg";

/// Helper to get the HTML document
pub fn document() -> web_sys::Document {
    let window = web_sys::window().expect("no global `window` exists");
    window.document().expect("should have a document on window")
}
