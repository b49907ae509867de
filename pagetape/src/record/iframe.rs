// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

//! Iframe recording.
//!
//! Same-origin iframes are recursed into directly: their document is
//! serialized into the parent's id space and attached through a mutation
//! with `isAttachIframe`, then observed like any other document.
//!
//! Cross-origin iframes run their own recorder, which posts every event to
//! the parent; the manager validates the sender, rewrites child-local ids
//! through a per-iframe secondary mirror and re-emits in the parent stream.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use wasm_bindgen::{JsCast, JsValue};

use pagetape_snapshot::{snapshot, Mirror, NodeId, SerializedNode, SnapshotOptions};

use crate::record::mutation::MutationBuffers;
use crate::record::stylesheet::StylesheetManager;
use crate::record::Emitter;
use crate::types::{
    AddedNodeMutation, Event, EventWithTime, IncrementalData, MutationData,
};
use crate::utils::{add_listener, Disposables};

/// `type` of a forwarded event message.
pub(crate) const CROSS_ORIGIN_MESSAGE_TYPE: &str = "rrweb";
/// `type` of the synthetic stop message a parent posts to its children.
pub(crate) const CROSS_ORIGIN_STOP_TYPE: &str = "rrweb-stop";

/// Per-iframe id spaces: child-local node and stylesheet ids, mapped into
/// the parent's spaces on first sight.
struct CrossOriginEntry {
    iframe: web_sys::HtmlIFrameElement,
    ids: HashMap<NodeId, NodeId>,
    style_ids: HashMap<u32, u32>,
}

struct IframeInner {
    emitter: Emitter,
    mirror: Mirror,
    win: web_sys::Window,
    stylesheets: StylesheetManager,
    snapshot_options: Option<Rc<SnapshotOptions>>,
    buffers: Option<MutationBuffers>,
    /// Iframes already handled by `add_iframe`.
    seen: js_sys::WeakSet,
    /// Inner documents already serialized and observed; a navigation swaps
    /// the document object, so re-attach happens naturally on load.
    attached_docs: js_sys::WeakSet,
    /// Every iframe under observation, same and cross origin.
    tracked: Vec<web_sys::HtmlIFrameElement>,
    cross_entries: Vec<CrossOriginEntry>,
    load_disposers: Vec<Box<dyn FnOnce()>>,
    /// Zero-delay attach timers, retained until stop.
    attach_timers: Vec<wasm_bindgen::prelude::Closure<dyn FnMut()>>,
}

#[derive(Clone)]
pub(crate) struct IframeManager {
    inner: Rc<RefCell<IframeInner>>,
}

impl IframeManager {
    pub(crate) fn new(
        emitter: Emitter,
        mirror: Mirror,
        win: web_sys::Window,
        stylesheets: StylesheetManager,
    ) -> Self {
        Self {
            inner: Rc::new(RefCell::new(IframeInner {
                emitter,
                mirror,
                win,
                stylesheets,
                snapshot_options: None,
                buffers: None,
                seen: js_sys::WeakSet::new(),
                attached_docs: js_sys::WeakSet::new(),
                tracked: Vec::new(),
                cross_entries: Vec::new(),
                load_disposers: Vec::new(),
                attach_timers: Vec::new(),
            })),
        }
    }

    pub(crate) fn set_snapshot_options(&self, options: Rc<SnapshotOptions>) {
        self.inner.borrow_mut().snapshot_options = Some(options);
    }

    pub(crate) fn set_buffers(&self, buffers: MutationBuffers) {
        self.inner.borrow_mut().buffers = Some(buffers);
    }

    /// Serializer callback for every iframe element it visits.
    pub(crate) fn add_iframe(&self, iframe: &web_sys::HtmlIFrameElement) {
        {
            let inner = self.inner.borrow();
            if inner.seen.has(iframe) {
                return;
            }
            inner.seen.add(iframe);
        }
        self.inner.borrow_mut().tracked.push(iframe.clone());

        if iframe.content_document().is_some() {
            // Same origin. An already-complete document attaches on a
            // zero-delay timer, after the mutation event that introduced
            // the iframe element itself has gone out; otherwise the load
            // event attaches it.
            let ready = iframe
                .content_document()
                .is_some_and(|d| d.ready_state() == web_sys::DocumentReadyState::Complete);
            if ready {
                self.schedule_attach(iframe);
            }
            let manager = self.clone();
            let iframe_for_load = iframe.clone();
            let result = add_listener(
                iframe,
                "load",
                move |_event| manager.attach_iframe(&iframe_for_load),
                false,
                true,
            );
            match result {
                Ok(disposer) => self
                    .inner
                    .borrow_mut()
                    .load_disposers
                    .push(Box::new(disposer)),
                Err(e) => self.inner.borrow().emitter.report_error(&e),
            }
        }
        // Cross-origin children announce themselves via postMessage; the
        // message listener picks them up from `tracked`.
    }

    fn schedule_attach(&self, iframe: &web_sys::HtmlIFrameElement) {
        let manager = self.clone();
        let iframe = iframe.clone();
        let timer: wasm_bindgen::prelude::Closure<dyn FnMut()> =
            wasm_bindgen::prelude::Closure::new(move || manager.attach_iframe(&iframe));
        let scheduled = crate::utils::window()
            .set_timeout_with_callback_and_timeout_and_arguments_0(
                timer.as_ref().unchecked_ref(),
                0,
            )
            .is_ok();
        if scheduled {
            self.inner.borrow_mut().attach_timers.push(timer);
        }
    }

    /// Serializes a same-origin iframe's document into the parent id space
    /// and starts observing it.
    fn attach_iframe(&self, iframe: &web_sys::HtmlIFrameElement) {
        let (emitter, mirror, options, buffers) = {
            let inner = self.inner.borrow();
            let (Some(options), Some(buffers)) =
                (inner.snapshot_options.clone(), inner.buffers.clone())
            else {
                return;
            };
            (
                inner.emitter.clone(),
                inner.mirror.clone(),
                options,
                buffers,
            )
        };
        if emitter.is_stopped() {
            return;
        }
        let Some(doc) = iframe.content_document() else {
            return;
        };
        if doc.document_element().is_none() {
            return;
        }
        {
            let inner = self.inner.borrow();
            if inner.attached_docs.has(&doc) {
                return;
            }
            inner.attached_docs.add(&doc);
        }
        let iframe_node: &web_sys::Node = iframe;
        let iframe_id = mirror.get_id(Some(iframe_node));
        if iframe_id <= 0 {
            return;
        }
        let node = match snapshot(&doc, &mirror, &options, true) {
            Ok(node) => node,
            Err(e) => {
                web_sys::console::warn_1(
                    &format!("pagetape: failed to serialize iframe document: {e}").into(),
                );
                return;
            }
        };
        let doc_id = node.id();
        emitter.emit_incremental(IncrementalData::Mutation(MutationData {
            texts: vec![],
            attributes: vec![],
            removes: vec![],
            adds: vec![AddedNodeMutation {
                parent_id: iframe_id,
                next_id: None,
                node,
            }],
            is_attach_iframe: Some(true),
        }));
        buffers.observe_document(&doc, mirror, emitter, Some(doc_id));
    }

    /// The parent half of the cross-origin protocol.
    pub(crate) fn install_message_listener(&self, disposables: &mut Disposables) {
        let manager = self.clone();
        let win = self.inner.borrow().win.clone();
        let result = add_listener(
            &win,
            "message",
            move |event: web_sys::Event| {
                let Some(message) = event.dyn_ref::<web_sys::MessageEvent>() else {
                    return;
                };
                manager.handle_message(message);
            },
            false,
            true,
        );
        match result {
            Ok(disposer) => disposables.push(disposer),
            Err(e) => self.inner.borrow().emitter.report_error(&e),
        }
    }

    fn handle_message(&self, message: &web_sys::MessageEvent) {
        let data = message.data();
        let ty = js_sys::Reflect::get(&data, &"type".into())
            .ok()
            .and_then(|v| v.as_string());
        if ty.as_deref() != Some(CROSS_ORIGIN_MESSAGE_TYPE) {
            return;
        }

        // The sender must be the content window of a tracked iframe whose
        // URL matches the message origin.
        let source = js_sys::Reflect::get(message, &"source".into()).unwrap_or(JsValue::NULL);
        let Some((iframe_id, entry_index)) = self.resolve_sender(&source, &message.origin())
        else {
            return;
        };

        let Ok(event_value) = js_sys::Reflect::get(&data, &"event".into()) else {
            return;
        };
        let Some(json) = js_sys::JSON::stringify(&event_value)
            .ok()
            .and_then(|s| s.as_string())
        else {
            return;
        };
        let Ok(event) = serde_json::from_str::<EventWithTime>(&json) else {
            web_sys::console::warn_1(&"pagetape: dropping malformed child event".into());
            return;
        };
        let is_checkout = js_sys::Reflect::get(&data, &"isCheckout".into())
            .ok()
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let Some(rewritten) = self.rewrite_event(event, entry_index, iframe_id) else {
            return;
        };
        let emitter = self.inner.borrow().emitter.clone();
        emitter.emit_forwarded(rewritten, is_checkout);
    }

    /// `(parent id of the iframe element, index of its cross-origin entry)`.
    fn resolve_sender(&self, source: &JsValue, origin: &str) -> Option<(NodeId, usize)> {
        let mut inner = self.inner.borrow_mut();
        let tracked = inner.tracked.clone();
        let mirror = inner.mirror.clone();
        for iframe in tracked {
            let Some(content_window) = iframe.content_window() else {
                continue;
            };
            let window_value: &JsValue = content_window.as_ref();
            if !window_value.loose_eq(source) {
                continue;
            }
            if !origin_matches(&iframe.src(), origin) {
                web_sys::console::warn_1(
                    &format!("pagetape: ignoring rrweb message from unexpected origin {origin}")
                        .into(),
                );
                return None;
            }
            let iframe_node: &web_sys::Node = &iframe;
            let iframe_id = mirror.get_id(Some(iframe_node));
            if iframe_id <= 0 {
                return None;
            }
            let index = inner.cross_entries.iter().position(|e| {
                let existing: &web_sys::Node = &e.iframe;
                existing.is_same_node(Some(iframe_node))
            });
            let index = match index {
                Some(index) => index,
                None => {
                    inner.cross_entries.push(CrossOriginEntry {
                        iframe: iframe.clone(),
                        ids: HashMap::new(),
                        style_ids: HashMap::new(),
                    });
                    inner.cross_entries.len() - 1
                }
            };
            return Some((iframe_id, index));
        }
        None
    }

    fn map_id(&self, entry_index: usize, child_id: NodeId) -> NodeId {
        if child_id <= 0 {
            return child_id;
        }
        let mut inner = self.inner.borrow_mut();
        let mirror = inner.mirror.clone();
        let entry = &mut inner.cross_entries[entry_index];
        *entry.ids.entry(child_id).or_insert_with(|| mirror.gen_id())
    }

    fn map_style_id(&self, entry_index: usize, child_style_id: u32) -> u32 {
        let stylesheets = self.inner.borrow().stylesheets.clone();
        let mut inner = self.inner.borrow_mut();
        let entry = &mut inner.cross_entries[entry_index];
        match entry.style_ids.get(&child_style_id) {
            Some(mapped) => *mapped,
            None => {
                drop(inner);
                let mapped = stylesheets.gen_style_id();
                self.inner.borrow_mut().cross_entries[entry_index]
                    .style_ids
                    .insert(child_style_id, mapped);
                mapped
            }
        }
    }

    fn rewrite_node(&self, entry_index: usize, node: &mut SerializedNode) {
        node.set_id(self.map_id(entry_index, node.id()));
        if let Some(root_id) = node.root_id() {
            node.set_root_id(self.map_id(entry_index, root_id));
        }
        if let Some(children) = node.children_mut() {
            for child in children {
                self.rewrite_node(entry_index, child);
            }
        }
    }

    /// Translates a child event into the parent's id spaces. `None` means
    /// the event has no counterpart in the parent stream.
    fn rewrite_event(
        &self,
        mut event: EventWithTime,
        entry_index: usize,
        iframe_id: NodeId,
    ) -> Option<EventWithTime> {
        let map = |id: NodeId| self.map_id(entry_index, id);
        match &mut event.event {
            // The child's lifecycle/meta events describe its own frame;
            // the parent stream has its own.
            Event::Meta(_) | Event::DomContentLoaded | Event::Load => return None,
            // A child baseline becomes an attach mutation under the iframe
            // element, with a fresh id mapping.
            Event::FullSnapshot(data) => {
                self.inner.borrow_mut().cross_entries[entry_index].ids.clear();
                let mut node = data.node.clone();
                self.rewrite_node(entry_index, &mut node);
                event.event = Event::IncrementalSnapshot(IncrementalData::Mutation(MutationData {
                    texts: vec![],
                    attributes: vec![],
                    removes: vec![],
                    adds: vec![AddedNodeMutation {
                        parent_id: iframe_id,
                        next_id: None,
                        node,
                    }],
                    is_attach_iframe: Some(true),
                }));
            }
            Event::IncrementalSnapshot(data) => match data {
                IncrementalData::Mutation(m) => {
                    for text in &mut m.texts {
                        text.id = map(text.id);
                    }
                    for attr in &mut m.attributes {
                        attr.id = map(attr.id);
                    }
                    for remove in &mut m.removes {
                        remove.id = map(remove.id);
                        remove.parent_id = map(remove.parent_id);
                    }
                    for add in &mut m.adds {
                        add.parent_id = map(add.parent_id);
                        add.next_id = add.next_id.map(map);
                        self.rewrite_node(entry_index, &mut add.node);
                    }
                }
                IncrementalData::MouseMove(m)
                | IncrementalData::TouchMove(m)
                | IncrementalData::Drag(m) => {
                    for position in &mut m.positions {
                        position.id = map(position.id);
                    }
                }
                IncrementalData::MouseInteraction(m) => m.id = map(m.id),
                IncrementalData::Scroll(s) => s.id = map(s.id),
                IncrementalData::Input(i) => i.id = map(i.id),
                IncrementalData::MediaInteraction(m) => m.id = map(m.id),
                IncrementalData::StyleSheetRule(s) => {
                    s.id = s.id.map(map);
                    s.style_id = s.style_id.map(|id| self.map_style_id(entry_index, id));
                }
                IncrementalData::StyleDeclaration(s) => {
                    s.id = s.id.map(map);
                    s.style_id = s.style_id.map(|id| self.map_style_id(entry_index, id));
                }
                IncrementalData::CanvasMutation(c) => c.id = map(c.id),
                IncrementalData::Selection(s) => {
                    for range in &mut s.ranges {
                        range.start = map(range.start);
                        range.end = map(range.end);
                    }
                }
                IncrementalData::AdoptedStyleSheet(a) => {
                    a.id = map(a.id);
                    for style_id in &mut a.style_ids {
                        *style_id = self.map_style_id(entry_index, *style_id);
                    }
                    for style in &mut a.styles {
                        style.style_id = self.map_style_id(entry_index, style.style_id);
                    }
                }
                IncrementalData::VisibilityMutation(v) => {
                    for mutation in &mut v.mutations {
                        mutation.id = map(mutation.id);
                    }
                }
                IncrementalData::ViewportResize(_)
                | IncrementalData::Font(_)
                | IncrementalData::Log(_)
                | IncrementalData::CustomElement(_) => {}
            },
            Event::Custom(_) | Event::Plugin(_) => {}
        }
        Some(event)
    }

    /// Parent side of the synthetic stop: every tracked child is told to
    /// stop with the parent.
    pub(crate) fn notify_children_stopped(&self) {
        let tracked = self.inner.borrow().tracked.clone();
        for iframe in tracked {
            let Some(content_window) = iframe.content_window() else {
                continue;
            };
            let payload = js_sys::Object::new();
            if js_sys::Reflect::set(&payload, &"type".into(), &CROSS_ORIGIN_STOP_TYPE.into())
                .is_err()
            {
                continue;
            }
            let _ = content_window.post_message(&payload, "*");
        }
        let disposers = std::mem::take(&mut self.inner.borrow_mut().load_disposers);
        for disposer in disposers {
            disposer();
        }
    }
}

/// Compares a url's scheme://host[:port] prefix with a `postMessage`
/// origin.
fn origin_matches(url: &str, origin: &str) -> bool {
    if url.is_empty() || origin.is_empty() {
        return false;
    }
    let Some(scheme_end) = url.find("://") else {
        return false;
    };
    let rest = &url[scheme_end + 3..];
    let host_end = rest.find('/').unwrap_or(rest.len());
    let url_origin = &url[..scheme_end + 3 + host_end];
    url_origin == origin
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_matching() {
        assert!(origin_matches(
            "https://widgets.example.com/embed/x.html",
            "https://widgets.example.com"
        ));
        assert!(!origin_matches(
            "https://widgets.example.com/embed/x.html",
            "https://evil.example.com"
        ));
        assert!(!origin_matches("about:blank", "https://a.example.com"));
        assert!(!origin_matches("", "https://a.example.com"));
    }
}
