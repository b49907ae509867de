// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

//! The bidirectional map between live DOM nodes and their stable ids.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use wasm_bindgen::JsValue;

use crate::types::{NodeId, SerializedNode, UNKNOWN_NODE};

struct MirrorInner {
    /// Strong side, keeps serialized nodes alive for id lookups.
    id_to_node: HashMap<NodeId, web_sys::Node>,
    /// Weak side: the JS engine drops entries once a node is collected.
    node_to_id: js_sys::WeakMap,
    /// Serialized metadata per id, children stripped (children are addressed
    /// by their own ids). Survives `remove_node_from_map` until `reset` so
    /// transiently detached nodes keep their serialization identity.
    meta: HashMap<NodeId, SerializedNode>,
    next_id: NodeId,
}

/// Cloneable handle to the node↔id map shared by the serializer and every
/// observer of one recording.
///
/// Ids start at 1 and are never reused within a recording. Looking up a node
/// the mirror has never seen yields [`UNKNOWN_NODE`].
#[derive(Clone)]
pub struct Mirror(Rc<RefCell<MirrorInner>>);

impl Default for Mirror {
    fn default() -> Self {
        Self::new()
    }
}

impl Mirror {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(MirrorInner {
            id_to_node: HashMap::new(),
            node_to_id: js_sys::WeakMap::new(),
            meta: HashMap::new(),
            next_id: 1,
        })))
    }

    /// Hands out the next fresh id.
    ///
    /// Also used by the cross-origin iframe mirrors, which allocate ids in
    /// the parent's id space for nodes that only exist in a child frame.
    pub fn gen_id(&self) -> NodeId {
        let mut inner = self.0.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        id
    }

    /// Registers `node` under the id carried by `serialized`.
    pub fn add(&self, node: &web_sys::Node, serialized: SerializedNode) {
        let id = serialized.id();
        let mut inner = self.0.borrow_mut();
        inner.id_to_node.insert(id, node.clone());
        inner.node_to_id.set(node, &JsValue::from_f64(id as f64));
        inner.meta.insert(id, strip_children(serialized));
    }

    /// Points an existing id at a different live node.
    pub fn replace(&self, id: NodeId, node: &web_sys::Node) {
        let mut inner = self.0.borrow_mut();
        inner.node_to_id.set(node, &JsValue::from_f64(id as f64));
        inner.id_to_node.insert(id, node.clone());
    }

    /// The id of `node`, or [`UNKNOWN_NODE`] when absent (including for
    /// `None`).
    pub fn get_id(&self, node: Option<&web_sys::Node>) -> NodeId {
        let Some(node) = node else {
            return UNKNOWN_NODE;
        };
        let value = self.0.borrow().node_to_id.get(node);
        value.as_f64().map_or(UNKNOWN_NODE, |id| id as NodeId)
    }

    pub fn get_node(&self, id: NodeId) -> Option<web_sys::Node> {
        self.0.borrow().id_to_node.get(&id).cloned()
    }

    pub fn get_meta(&self, node: &web_sys::Node) -> Option<SerializedNode> {
        let id = self.get_id(Some(node));
        if id == UNKNOWN_NODE {
            return None;
        }
        self.0.borrow().meta.get(&id).cloned()
    }

    pub fn get_meta_by_id(&self, id: NodeId) -> Option<SerializedNode> {
        self.0.borrow().meta.get(&id).cloned()
    }

    pub fn has(&self, id: NodeId) -> bool {
        self.0.borrow().id_to_node.contains_key(&id)
    }

    pub fn has_node(&self, node: &web_sys::Node) -> bool {
        self.get_id(Some(node)) != UNKNOWN_NODE
    }

    /// Marks a node as belonging to an ignored subtree; lookups resolve to
    /// [`IGNORED_NODE`](crate::IGNORED_NODE) so observers can tell "skip"
    /// from "never seen".
    pub fn mark_ignored(&self, node: &web_sys::Node) {
        let inner = self.0.borrow();
        inner
            .node_to_id
            .set(node, &JsValue::from_f64(f64::from(crate::types::IGNORED_NODE)));
    }

    /// Drops `node` and its child subtree from the strong `id → node` side.
    ///
    /// The weak `node → id` side and the per-id metadata are left alone, so
    /// a node that is re-attached later still resolves to its old id; both
    /// are purged only by [`reset`](Self::reset).
    pub fn remove_node_from_map(&self, node: &web_sys::Node) {
        let id = self.get_id(Some(node));
        if id != UNKNOWN_NODE {
            self.0.borrow_mut().id_to_node.remove(&id);
        }
        let children = node.child_nodes();
        for i in 0..children.length() {
            if let Some(child) = children.get(i) {
                self.remove_node_from_map(&child);
            }
        }
    }

    /// Clears every side of the map. The id counter keeps running so ids are
    /// unique across a reset within the same recording.
    pub fn reset(&self) {
        let mut inner = self.0.borrow_mut();
        inner.id_to_node.clear();
        inner.node_to_id = js_sys::WeakMap::new();
        inner.meta.clear();
    }
}

/// Metadata is stored flat; the tree shape lives in the emitted events.
fn strip_children(mut serialized: SerializedNode) -> SerializedNode {
    if let Some(children) = serialized.children_mut() {
        children.clear();
    }
    serialized
}
