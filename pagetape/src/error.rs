// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Recorder failures.
///
/// Only [`RecordError::InvalidConfig`] is fatal and surfaces out of
/// [`record`](crate::record): everything that can go wrong later is routed
/// to the configured error handler (or `console.warn`) and the recording
/// keeps going.
#[derive(Debug, Error)]
pub enum RecordError {
    /// `emit` was not provided in the emitting frame. Nothing is installed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Installing an observer on a document failed; that document goes
    /// unrecorded.
    #[error("failed to install {observer} observer: {message}")]
    ObserverInstallFailed {
        observer: &'static str,
        message: String,
    },
    /// There is no window/document to record in this context.
    #[error("no browsing context available")]
    NoBrowsingContext,
    /// A recording is already running; stop it before starting another.
    #[error("a recording is already in progress")]
    AlreadyRecording,
}
