// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

//! Shadow-DOM manager: every shadow root gets the mutation observer set,
//! whether it existed at snapshot time or was attached later.

use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::JsCast;

use crate::record::mutation::MutationBuffers;
use crate::utils::{global_prototype, patch_method, Disposables, PatchGuard};

struct ShadowInner {
    buffers: MutationBuffers,
    /// Roots already observed; attachShadow and re-serialization both land
    /// here, only the first wins.
    seen: js_sys::WeakSet,
    guard: Option<PatchGuard>,
}

#[derive(Clone)]
pub(crate) struct ShadowDomManager {
    inner: Rc<RefCell<ShadowInner>>,
}

impl ShadowDomManager {
    pub(crate) fn new(buffers: MutationBuffers) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ShadowInner {
                buffers,
                seen: js_sys::WeakSet::new(),
                guard: None,
            })),
        }
    }

    /// Serializer callback: observe the shadow root of any serialized
    /// shadow host.
    pub(crate) fn handle_serialized(&self, node: &web_sys::Node) {
        let Some(element) = node.dyn_ref::<web_sys::Element>() else {
            return;
        };
        if let Some(root) = element.shadow_root() {
            self.observe_root(&root);
        }
    }

    fn observe_root(&self, root: &web_sys::ShadowRoot) {
        let (buffers, already_seen) = {
            let inner = self.inner.borrow();
            (inner.buffers.clone(), inner.seen.has(root))
        };
        if already_seen {
            return;
        }
        self.inner.borrow().seen.add(root);
        let root_node: &web_sys::Node = root;
        if let Some(buffer) = buffers.buffer_for_node(root_node) {
            buffer.observe_root(root_node);
        }
    }

    /// Intercepts `attachShadow` so roots opened after the snapshot are
    /// observed the moment they exist.
    pub(crate) fn install_attach_shadow_patch(&self, disposables: &mut Disposables) {
        let Some(prototype) = global_prototype("Element") else {
            return;
        };
        let manager = self.clone();
        let result = patch_method(&prototype, "attachShadow", move |this, _args, result| {
            // Accepts polyfilled roots too, which are plain objects.
            if !pagetape_snapshot::is_shadow_root(result) {
                return;
            }
            let root: &web_sys::ShadowRoot = result.unchecked_ref();
            let connected = this
                .dyn_ref::<web_sys::Node>()
                .is_some_and(web_sys::Node::is_connected);
            if connected {
                manager.observe_root(root);
            }
        });
        match result {
            Ok(guard) => {
                self.inner.borrow_mut().guard = Some(guard);
                let manager = self.clone();
                disposables.push(move || {
                    if let Some(guard) = manager.inner.borrow_mut().guard.take() {
                        guard.restore();
                    }
                });
            }
            Err(e) => {
                web_sys::console::warn_2(&"failed to patch attachShadow".into(), &e);
            }
        }
    }
}
