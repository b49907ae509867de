// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

//! Per-tick coalescing of observed DOM mutations.
//!
//! `MutationObserver` records are classified eagerly (so add/remove
//! cancellation sees the true order) and serialized lazily on the next
//! animation frame, which naturally makes attribute and text edits
//! last-writer-wins within a frame.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use wasm_bindgen::prelude::Closure;
use wasm_bindgen::JsCast;

use pagetape_snapshot::{
    mask_input_value, mask_text, serialize_node_with_id, InputKind, Mirror, NodeId,
    SnapshotOptions,
};

use crate::record::observer::in_blocked_subtree;
use crate::record::Emitter;
use crate::types::{
    AddedNodeMutation, AttributeMutation, IncrementalData, MutationData, RemovedNodeMutation,
    TextMutation,
};
use crate::utils::window;

/// Registry of every document's buffer in one recording; the snapshot flow
/// locks them all at once.
#[derive(Clone, Default)]
pub(crate) struct MutationBuffers {
    inner: Rc<RefCell<BuffersInner>>,
}

#[derive(Default)]
struct BuffersInner {
    buffers: Vec<MutationBuffer>,
    snapshot_options: Option<Rc<SnapshotOptions>>,
}

impl MutationBuffers {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_snapshot_options(&self, options: Rc<SnapshotOptions>) {
        self.inner.borrow_mut().snapshot_options = Some(options);
    }

    /// Creates and registers a buffer observing `doc`.
    pub(crate) fn observe_document(
        &self,
        doc: &web_sys::Document,
        mirror: Mirror,
        emitter: Emitter,
        root_id: Option<NodeId>,
    ) -> Option<MutationBuffer> {
        let options = self.inner.borrow().snapshot_options.clone()?;
        let buffer = MutationBuffer::new(doc.clone(), mirror, emitter, options, root_id);
        buffer.observe_root(doc);
        self.inner.borrow_mut().buffers.push(buffer.clone());
        Some(buffer)
    }

    /// The buffer observing the document that owns `node`, when present.
    pub(crate) fn buffer_for_node(&self, node: &web_sys::Node) -> Option<MutationBuffer> {
        let doc = node.owner_document()?;
        let doc_node: &web_sys::Node = &doc;
        self.inner
            .borrow()
            .buffers
            .iter()
            .find(|b| {
                let buffer_doc: &web_sys::Node = &b.inner.borrow().doc;
                buffer_doc.is_same_node(Some(doc_node))
            })
            .cloned()
    }

    pub(crate) fn lock(&self) {
        for buffer in self.inner.borrow().buffers.iter() {
            buffer.set_locked(true);
        }
    }

    pub(crate) fn unlock(&self) {
        let buffers: Vec<_> = self.inner.borrow().buffers.to_vec();
        for buffer in buffers {
            buffer.set_locked(false);
            buffer.flush();
        }
    }

    pub(crate) fn freeze(&self) {
        for buffer in self.inner.borrow().buffers.iter() {
            buffer.set_frozen(true);
        }
    }

    pub(crate) fn unfreeze(&self) {
        let buffers: Vec<_> = self.inner.borrow().buffers.to_vec();
        for buffer in buffers {
            buffer.set_frozen(false);
            buffer.flush();
        }
    }

    pub(crate) fn dispose(&self) {
        let buffers: Vec<_> = std::mem::take(&mut self.inner.borrow_mut().buffers);
        for buffer in buffers {
            buffer.dispose();
        }
    }
}

struct AttrRecord {
    element: web_sys::Element,
    names: Vec<String>,
}

struct BufferInner {
    doc: web_sys::Document,
    mirror: Mirror,
    emitter: Emitter,
    options: Rc<SnapshotOptions>,
    root_id: Option<NodeId>,
    observers: Vec<(web_sys::MutationObserver, Closure<dyn FnMut(js_sys::Array)>)>,
    added: js_sys::Set,
    removed: js_sys::Set,
    removes: Vec<RemovedNodeMutation>,
    text_set: js_sys::Set,
    texts: Vec<web_sys::Node>,
    attrs: Vec<AttrRecord>,
    locked: bool,
    frozen: bool,
    raf_handle: Option<i32>,
    raf_closure: Option<Closure<dyn FnMut(f64)>>,
}

/// One document's mutation buffer.
#[derive(Clone)]
pub(crate) struct MutationBuffer {
    inner: Rc<RefCell<BufferInner>>,
}

impl MutationBuffer {
    fn new(
        doc: web_sys::Document,
        mirror: Mirror,
        emitter: Emitter,
        options: Rc<SnapshotOptions>,
        root_id: Option<NodeId>,
    ) -> Self {
        Self {
            inner: Rc::new(RefCell::new(BufferInner {
                doc,
                mirror,
                emitter,
                options,
                root_id,
                observers: Vec::new(),
                added: js_sys::Set::new(&wasm_bindgen::JsValue::UNDEFINED),
                removed: js_sys::Set::new(&wasm_bindgen::JsValue::UNDEFINED),
                removes: Vec::new(),
                text_set: js_sys::Set::new(&wasm_bindgen::JsValue::UNDEFINED),
                texts: Vec::new(),
                attrs: Vec::new(),
                locked: false,
                frozen: false,
                raf_handle: None,
                raf_closure: None,
            })),
        }
    }

    /// Attaches a `MutationObserver` to `root` (the document itself, or a
    /// shadow root inside it) feeding this buffer.
    pub(crate) fn observe_root(&self, root: &web_sys::Node) {
        let buffer = self.clone();
        let callback: Closure<dyn FnMut(js_sys::Array)> =
            Closure::new(move |records: js_sys::Array| {
                buffer.consume_records(&records);
            });
        let observer = match web_sys::MutationObserver::new(callback.as_ref().unchecked_ref()) {
            Ok(observer) => observer,
            Err(e) => {
                self.inner.borrow().emitter.report_error(&e);
                return;
            }
        };
        let init = web_sys::MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        init.set_attributes(true);
        init.set_attribute_old_value(true);
        init.set_character_data(true);
        init.set_character_data_old_value(true);
        if let Err(e) = observer.observe_with_options(root, &init) {
            self.inner.borrow().emitter.report_error(&e);
            return;
        }
        self.inner.borrow_mut().observers.push((observer, callback));
    }

    fn consume_records(&self, records: &js_sys::Array) {
        for record in records.iter() {
            let Ok(record) = record.dyn_into::<web_sys::MutationRecord>() else {
                continue;
            };
            self.process_record(&record);
        }
        self.schedule_flush();
    }

    fn process_record(&self, record: &web_sys::MutationRecord) {
        let Some(target) = record.target() else {
            return;
        };
        match record.type_().as_str() {
            "characterData" => {
                let mut inner = self.inner.borrow_mut();
                if inner.options.slim_dom.head_title_mutations && in_title(&target) {
                    return;
                }
                if !inner.text_set.has(&target) {
                    inner.text_set.add(&target);
                    inner.texts.push(target);
                }
            }
            "attributes" => {
                let Ok(element) = target.dyn_into::<web_sys::Element>() else {
                    return;
                };
                let Some(name) = record.attribute_name() else {
                    return;
                };
                let mut inner = self.inner.borrow_mut();
                if let Some(exclude) = &inner.options.exclude_attribute {
                    if exclude.is_match(&name) {
                        return;
                    }
                }
                if inner.options.slim_dom.head_title_mutations
                    && element.tag_name().eq_ignore_ascii_case("title")
                {
                    return;
                }
                let node: &web_sys::Node = &element;
                let position = inner.attrs.iter().position(|r| {
                    let existing: &web_sys::Node = &r.element;
                    existing.is_same_node(Some(node))
                });
                match position {
                    Some(idx) => {
                        let entry = &mut inner.attrs[idx];
                        if !entry.names.contains(&name) {
                            entry.names.push(name);
                        }
                    }
                    None => inner.attrs.push(AttrRecord {
                        element,
                        names: vec![name],
                    }),
                }
            }
            "childList" => {
                let added = record.added_nodes();
                for i in 0..added.length() {
                    if let Some(node) = added.get(i) {
                        self.inner.borrow_mut().added.add(&node);
                    }
                }
                let removed = record.removed_nodes();
                for i in 0..removed.length() {
                    if let Some(node) = removed.get(i) {
                        self.process_removal(&node, &target);
                    }
                }
            }
            _ => {}
        }
    }

    fn process_removal(&self, node: &web_sys::Node, parent: &web_sys::Node) {
        let mut inner = self.inner.borrow_mut();
        // Added and removed within one frame cancels both.
        if inner.added.has(node) {
            inner.added.delete(node);
            return;
        }
        inner.removed.add(node);
        let id = inner.mirror.get_id(Some(node));
        if id <= 0 {
            return;
        }
        let (parent_id, is_shadow) = resolve_parent_id(&inner.mirror, parent);
        if parent_id <= 0 {
            return;
        }
        inner.removes.push(RemovedNodeMutation {
            parent_id,
            id,
            is_shadow,
        });
        // The weak node→id side survives this, so a re-attach in a later
        // frame resolves to the same id.
        inner.mirror.remove_node_from_map(node);
    }

    fn schedule_flush(&self) {
        let mut inner = self.inner.borrow_mut();
        if inner.raf_handle.is_some() {
            return;
        }
        let buffer = self.clone();
        let raf: Closure<dyn FnMut(f64)> = Closure::new(move |_time: f64| {
            {
                let mut inner = buffer.inner.borrow_mut();
                inner.raf_handle = None;
                inner.raf_closure = None;
            }
            buffer.flush();
        });
        match window().request_animation_frame(raf.as_ref().unchecked_ref()) {
            Ok(handle) => {
                inner.raf_handle = Some(handle);
                inner.raf_closure = Some(raf);
            }
            Err(e) => {
                let emitter = inner.emitter.clone();
                drop(inner);
                emitter.report_error(&e);
            }
        }
    }

    /// Serializes and emits everything buffered, as one mutation event.
    pub(crate) fn flush(&self) {
        {
            let inner = self.inner.borrow();
            if inner.locked || inner.frozen {
                return;
            }
        }

        // Drain under one short borrow; serialization below may re-enter
        // this buffer through the serializer's callbacks (e.g. a freshly
        // added shadow host getting its root observed).
        let (pending, emitter) = {
            let mut inner = self.inner.borrow_mut();
            let pending = PendingMutations {
                doc: inner.doc.clone(),
                mirror: inner.mirror.clone(),
                options: Rc::clone(&inner.options),
                root_id: inner.root_id,
                texts: std::mem::take(&mut inner.texts),
                attrs: std::mem::take(&mut inner.attrs),
                removes: std::mem::take(&mut inner.removes),
                added: std::mem::replace(
                    &mut inner.added,
                    js_sys::Set::new(&wasm_bindgen::JsValue::UNDEFINED),
                ),
                removed: std::mem::replace(
                    &mut inner.removed,
                    js_sys::Set::new(&wasm_bindgen::JsValue::UNDEFINED),
                ),
            };
            inner.text_set = js_sys::Set::new(&wasm_bindgen::JsValue::UNDEFINED);
            (pending, inner.emitter.clone())
        };
        let Some(data) = build_mutation_data(pending) else {
            return;
        };
        emitter.emit_incremental(IncrementalData::Mutation(data));
    }

    fn set_locked(&self, locked: bool) {
        self.inner.borrow_mut().locked = locked;
    }

    fn set_frozen(&self, frozen: bool) {
        self.inner.borrow_mut().frozen = frozen;
    }

    pub(crate) fn dispose(&self) {
        let mut inner = self.inner.borrow_mut();
        for (observer, _closure) in inner.observers.drain(..) {
            observer.disconnect();
        }
        if let Some(handle) = inner.raf_handle.take() {
            let _ = window().cancel_animation_frame(handle);
        }
        inner.raf_closure = None;
        inner.added = js_sys::Set::new(&wasm_bindgen::JsValue::UNDEFINED);
        inner.removed = js_sys::Set::new(&wasm_bindgen::JsValue::UNDEFINED);
        inner.text_set = js_sys::Set::new(&wasm_bindgen::JsValue::UNDEFINED);
        inner.texts.clear();
        inner.attrs.clear();
        inner.removes.clear();
    }
}

/// Whether a text node lives inside a `<title>` element.
fn in_title(node: &web_sys::Node) -> bool {
    node.parent_element()
        .is_some_and(|p| p.tag_name().eq_ignore_ascii_case("title"))
}

fn resolve_parent_id(mirror: &Mirror, parent: &web_sys::Node) -> (NodeId, Option<bool>) {
    if let Some(shadow) = parent.dyn_ref::<web_sys::ShadowRoot>() {
        let host: web_sys::Element = shadow.host();
        let host_node: &web_sys::Node = &host;
        return (mirror.get_id(Some(host_node)), Some(true));
    }
    (mirror.get_id(Some(parent)), None)
}

/// Everything a flush drained out of the buffer, ready to serialize without
/// touching the buffer's `RefCell` again.
struct PendingMutations {
    doc: web_sys::Document,
    mirror: Mirror,
    options: Rc<SnapshotOptions>,
    root_id: Option<NodeId>,
    texts: Vec<web_sys::Node>,
    attrs: Vec<AttrRecord>,
    removes: Vec<RemovedNodeMutation>,
    added: js_sys::Set,
    removed: js_sys::Set,
}

fn build_mutation_data(pending: PendingMutations) -> Option<MutationData> {
    let PendingMutations {
        doc,
        mirror,
        options,
        root_id,
        texts: text_nodes,
        attrs,
        removes,
        added,
        removed,
    } = pending;

    // Texts: last value wins by reading the live node now.
    let mut texts = Vec::new();
    for node in text_nodes {
        if removed.has(&node) || added.has(&node) {
            continue;
        }
        let id = mirror.get_id(Some(&node));
        if id <= 0 {
            continue;
        }
        let parent = node.parent_element();
        if parent
            .as_ref()
            .is_some_and(|p| in_blocked_subtree(p, &options))
        {
            continue;
        }
        let mut value = node.text_content();
        if let (Some(text), Some(parent)) = (value.as_mut(), parent.as_ref()) {
            let masked = !options.mask_text_class.is_empty()
                && parent
                    .closest(&format!(".{}", options.mask_text_class))
                    .ok()
                    .flatten()
                    .is_some()
                || options
                    .mask_text_selector
                    .as_deref()
                    .is_some_and(|sel| parent.closest(sel).ok().flatten().is_some());
            if masked {
                *text = mask_text(text, parent, options.mask_text_fn.as_ref());
            }
        }
        texts.push(TextMutation { id, value });
    }

    // Attributes: read current values, mask form values.
    let mut attributes = Vec::new();
    for record in attrs {
        let element = record.element;
        let node: &web_sys::Node = &element;
        if removed.has(node) || added.has(node) {
            continue;
        }
        let id = mirror.get_id(Some(node));
        if id <= 0 || in_blocked_subtree(&element, &options) {
            continue;
        }
        let mut map = BTreeMap::new();
        for name in record.names {
            let value = element.get_attribute(&name);
            let value = match value {
                Some(value) if name == "value" => {
                    Some(mask_form_value(&element, &value, &options).into())
                }
                Some(value) => Some(value.into()),
                None => None,
            };
            map.insert(name, value);
        }
        if !map.is_empty() {
            attributes.push(AttributeMutation { id, attributes: map });
        }
    }

    // Adds: topmost added nodes only; their descendants serialize inline.
    let candidates = js_sys::Array::from(&added);
    let mut topmost: Vec<web_sys::Node> = Vec::new();
    'candidate: for value in candidates.iter() {
        let node: web_sys::Node = value.unchecked_into();
        if !node.is_connected() {
            continue;
        }
        let mut ancestor = node.parent_node();
        while let Some(current) = ancestor {
            if added.has(&current) {
                continue 'candidate;
            }
            ancestor = current.parent_node();
        }
        topmost.push(node);
    }
    topmost.sort_by(|a, b| {
        use std::cmp::Ordering;
        let mask = web_sys::Node::DOCUMENT_POSITION_FOLLOWING;
        if a.compare_document_position(b) & mask != 0 {
            Ordering::Less
        } else {
            Ordering::Greater
        }
    });

    // Reverse document order: a node's next sibling (when also added this
    // frame) is serialized, and therefore addressable, before the node
    // itself references it as an anchor.
    let mut adds = Vec::new();
    for node in topmost.iter().rev() {
        let Some(parent) = node.parent_node() else {
            continue;
        };
        let (parent_id, _is_shadow) = resolve_parent_id(&mirror, &parent);
        if parent_id <= 0 {
            continue;
        }
        if let Some(parent_el) = parent.dyn_ref::<web_sys::Element>() {
            if in_blocked_subtree(parent_el, &options) {
                continue;
            }
        }
        let Some(serialized) = serialize_node_with_id(node, &doc, &mirror, &options, root_id)
        else {
            continue;
        };
        let mut next_id = None;
        let mut sibling = node.next_sibling();
        while let Some(current) = sibling {
            let sibling_id = mirror.get_id(Some(&current));
            if sibling_id > 0 {
                next_id = Some(sibling_id);
                break;
            }
            sibling = current.next_sibling();
        }
        adds.push(AddedNodeMutation {
            parent_id,
            next_id,
            node: serialized,
        });
    }

    if texts.is_empty() && attributes.is_empty() && removes.is_empty() && adds.is_empty() {
        return None;
    }
    Some(MutationData {
        texts,
        attributes,
        removes,
        adds,
        is_attach_iframe: None,
    })
}

fn mask_form_value(element: &web_sys::Element, value: &str, options: &SnapshotOptions) -> String {
    let kind = if let Some(input) = element.dyn_ref::<web_sys::HtmlInputElement>() {
        InputKind::from_input_type(&input.type_().to_lowercase())
    } else if element.dyn_ref::<web_sys::HtmlTextAreaElement>().is_some() {
        InputKind::TextArea
    } else if element.dyn_ref::<web_sys::HtmlSelectElement>().is_some() {
        InputKind::Select
    } else {
        return value.to_owned();
    };
    mask_input_value(
        value,
        kind,
        &options.mask_input_options,
        element,
        options.mask_input_fn.as_ref(),
    )
}
