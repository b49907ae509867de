// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Failure to serialize a document or one of its branches.
///
/// None of these are fatal to a recording: the caller logs a warning, skips
/// the snapshot (or the offending branch) and carries on. The next checkout
/// retries from scratch.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The document is no longer attached to a browsing context.
    #[error("document is detached or has no documentElement")]
    DetachedDocument,
    /// A subtree (typically a cross-origin iframe or a CORS-guarded
    /// stylesheet) refused access.
    #[error("access to {what} was denied: {message}")]
    AccessDenied { what: &'static str, message: String },
    /// A JS-side failure that doesn't fit the cases above.
    #[error("serialization failed: {0}")]
    Js(String),
}

impl SnapshotError {
    /// Wraps a caught JS exception, stringifying whatever the throw site
    /// provided.
    pub fn from_js(value: &wasm_bindgen::JsValue) -> Self {
        Self::Js(
            value
                .as_string()
                .or_else(|| {
                    js_sys::Reflect::get(value, &"message".into())
                        .ok()
                        .and_then(|m| m.as_string())
                })
                .unwrap_or_else(|| "unknown JS error".into()),
        )
    }
}
