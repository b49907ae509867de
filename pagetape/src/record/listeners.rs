// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

//! The global listener registry feeding the interactivity classifier.
//!
//! `EventTarget.prototype.addEventListener` is patched for the lifetime of
//! the recording: whenever something registers a listener for one of the
//! interactive event types, the target lands in a weak set the serializer
//! and visibility pipeline consult. Membership never decays —
//! `removeEventListener` is deliberately unobserved, making interactivity a
//! safe over-approximation.

use wasm_bindgen::{JsCast, JsValue};

use crate::utils::{global_prototype, patch_method, PatchGuard};

/// Event types whose registration marks a target as interactive.
pub(crate) const INTERACTIVE_EVENTS: &[&str] = &[
    "click",
    "dblclick",
    "contextmenu",
    "mousedown",
    "mouseup",
    "mouseenter",
    "mouseleave",
    "keydown",
    "keyup",
    "keypress",
    "input",
    "change",
    "submit",
    "pointerdown",
    "pointerup",
    "touchstart",
    "touchmove",
    "touchend",
    "touchcancel",
    "focus",
    "blur",
    "dragstart",
    "drop",
];

/// Registry of elements observed to register interactive listeners.
pub(crate) struct ListenerRegistry {
    known: js_sys::WeakSet,
    guard: Option<PatchGuard>,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self {
            known: js_sys::WeakSet::new(),
            guard: None,
        }
    }

    /// A handle to the underlying weak set (shared, not copied).
    pub(crate) fn known_set(&self) -> js_sys::WeakSet {
        self.known.clone()
    }

    /// Installs the `addEventListener` patch. The hook only reads the
    /// arguments and inserts into a weak set; original semantics are
    /// preserved by delegation inside the patcher.
    pub(crate) fn install(&mut self) -> Result<(), JsValue> {
        if self.guard.is_some() {
            return Ok(());
        }
        let Some(prototype) = global_prototype("EventTarget") else {
            return Ok(());
        };
        let known = self.known.clone();
        let guard = patch_method(
            &prototype,
            "addEventListener",
            move |this: &JsValue, args: &js_sys::Array, _result: &JsValue| {
                let Some(event_type) = args.get(0).as_string() else {
                    return;
                };
                if !INTERACTIVE_EVENTS.contains(&event_type.as_str()) {
                    return;
                }
                if let Some(element) = this.dyn_ref::<web_sys::Element>() {
                    known.add(element);
                }
            },
        )?;
        self.guard = Some(guard);
        Ok(())
    }

    /// One-time sweep for inline `onclick`-style handlers already present
    /// in the markup.
    pub(crate) fn scan_inline_handlers(&self, doc: &web_sys::Document) {
        let Ok(all) = doc.query_selector_all("*") else {
            return;
        };
        for i in 0..all.length() {
            let Some(element) = all.get(i).and_then(|n| n.dyn_into::<web_sys::Element>().ok())
            else {
                continue;
            };
            let attributes = element.attributes();
            for j in 0..attributes.length() {
                let Some(attr) = attributes.item(j) else {
                    continue;
                };
                if let Some(event_type) = attr.name().strip_prefix("on") {
                    if INTERACTIVE_EVENTS.contains(&event_type) {
                        self.known.add(&element);
                        break;
                    }
                }
            }
        }
    }

    /// Restores the original `addEventListener`.
    pub(crate) fn uninstall(&mut self) {
        if let Some(guard) = self.guard.take() {
            guard.restore();
        }
    }
}
