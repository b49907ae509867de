// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

//! The visibility manager: an rAF-paced loop driving the evaluator over the
//! observed element set and batching changes into `VisibilityMutation`
//! events.
//!
//! The first pass after start is evaluated but never emitted; it only seeds
//! the previous-state map, so the stream carries changes, not the initial
//! classification (the full snapshot already has that).

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use wasm_bindgen::prelude::Closure;
use wasm_bindgen::JsCast;

use pagetape_snapshot::{evaluate_visibility, Mirror, NodeId, VisibilityMap, VisibilityOptions};

use crate::config::{VisibilityFlushMode, VisibilitySampling};
use crate::record::Emitter;
use crate::types::{IncrementalData, VisibilityMutationData, VisibilityMutationEntry};
use crate::utils::{now, window};

struct VisibilityInner {
    emitter: Emitter,
    mirror: Mirror,
    sampling: VisibilitySampling,
    doc: web_sys::Document,
    observed: Vec<web_sys::Element>,
    observed_set: js_sys::Set,
    previous: VisibilityMap,
    /// Buffered changes keyed by id; last writer wins.
    pending: BTreeMap<NodeId, VisibilityMutationEntry>,
    first_pass_done: bool,
    running: bool,
    frozen: bool,
    locked: bool,
    last_eval: f64,
    last_emit: f64,
    raf_handle: Option<i32>,
    raf_closure: Option<Closure<dyn FnMut(f64)>>,
    debounce_timer: Option<i32>,
    debounce_closure: Option<Closure<dyn FnMut()>>,
    body_observer: Option<(web_sys::MutationObserver, Closure<dyn FnMut(js_sys::Array)>)>,
}

/// rAF-paced batching of visibility changes into incremental events.
#[derive(Clone)]
pub(crate) struct VisibilityManager {
    inner: Rc<RefCell<VisibilityInner>>,
}

impl VisibilityManager {
    pub(crate) fn new(
        emitter: Emitter,
        mirror: Mirror,
        sampling: VisibilitySampling,
        doc: web_sys::Document,
    ) -> Self {
        Self {
            inner: Rc::new(RefCell::new(VisibilityInner {
                emitter,
                mirror,
                sampling,
                doc,
                observed: Vec::new(),
                observed_set: js_sys::Set::new(&wasm_bindgen::JsValue::UNDEFINED),
                previous: VisibilityMap::new(),
                pending: BTreeMap::new(),
                first_pass_done: false,
                running: false,
                frozen: false,
                locked: false,
                last_eval: f64::NEG_INFINITY,
                last_emit: f64::NEG_INFINITY,
                raf_handle: None,
                raf_closure: None,
                debounce_timer: None,
                debounce_closure: None,
                body_observer: None,
            })),
        }
    }

    /// Seeds the observed set from the current body, installs the
    /// keep-in-sync observer and starts the frame loop.
    pub(crate) fn start(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.running {
                return;
            }
            inner.running = true;
        }
        let body = { self.inner.borrow().doc.body() };
        if let Some(body) = body {
            let body_el: &web_sys::Element = &body;
            self.observe(body_el);
            if let Ok(all) = body_el.query_selector_all("*") {
                for i in 0..all.length() {
                    if let Some(el) = all.get(i).and_then(|n| n.dyn_into::<web_sys::Element>().ok())
                    {
                        self.observe(&el);
                    }
                }
            }
            self.install_body_observer(body_el);
        }
        self.schedule_frame();
    }

    pub(crate) fn observe(&self, element: &web_sys::Element) {
        let mut inner = self.inner.borrow_mut();
        if inner.observed_set.has(element) {
            return;
        }
        inner.observed_set.add(element);
        inner.observed.push(element.clone());
    }

    pub(crate) fn unobserve(&self, element: &web_sys::Element) {
        let mut inner = self.inner.borrow_mut();
        inner.observed_set.delete(element);
        let target: &web_sys::Node = element;
        inner.observed.retain(|el| {
            let node: &web_sys::Node = el;
            !node.is_same_node(Some(target))
        });
    }

    pub(crate) fn freeze(&self) {
        self.inner.borrow_mut().frozen = true;
    }

    pub(crate) fn unfreeze(&self) {
        self.inner.borrow_mut().frozen = false;
    }

    pub(crate) fn lock(&self) {
        self.inner.borrow_mut().locked = true;
    }

    pub(crate) fn unlock(&self) {
        self.inner.borrow_mut().locked = false;
    }

    /// Cancels the frame loop and pending timers, drops all buffered state.
    pub(crate) fn reset(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.running = false;
        if let Some(handle) = inner.raf_handle.take() {
            let _ = window().cancel_animation_frame(handle);
        }
        inner.raf_closure = None;
        if let Some(timer) = inner.debounce_timer.take() {
            window().clear_timeout_with_handle(timer);
        }
        inner.debounce_closure = None;
        if let Some((observer, _closure)) = inner.body_observer.take() {
            observer.disconnect();
        }
        inner.observed.clear();
        inner.observed_set = js_sys::Set::new(&wasm_bindgen::JsValue::UNDEFINED);
        inner.previous = VisibilityMap::new();
        inner.pending.clear();
        inner.first_pass_done = false;
    }

    /// Keeps the observed set in sync with DOM adds/removes under body.
    fn install_body_observer(&self, body: &web_sys::Element) {
        let manager = self.clone();
        let callback: Closure<dyn FnMut(js_sys::Array)> =
            Closure::new(move |records: js_sys::Array| {
                for record in records.iter() {
                    let Ok(record) = record.dyn_into::<web_sys::MutationRecord>() else {
                        continue;
                    };
                    let added = record.added_nodes();
                    for i in 0..added.length() {
                        let Some(el) = added.get(i).and_then(|n| n.dyn_into::<web_sys::Element>().ok())
                        else {
                            continue;
                        };
                        manager.observe(&el);
                        if let Ok(descendants) = el.query_selector_all("*") {
                            for j in 0..descendants.length() {
                                if let Some(child) = descendants
                                    .get(j)
                                    .and_then(|n| n.dyn_into::<web_sys::Element>().ok())
                                {
                                    manager.observe(&child);
                                }
                            }
                        }
                    }
                    let removed = record.removed_nodes();
                    for i in 0..removed.length() {
                        let Some(node) = removed.get(i) else { continue };
                        manager.unobserve_subtree(&node);
                    }
                }
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
        if let Err(e) = observer.observe_with_options(body, &init) {
            self.inner.borrow().emitter.report_error(&e);
            return;
        }
        self.inner.borrow_mut().body_observer = Some((observer, callback));
    }

    fn unobserve_subtree(&self, root: &web_sys::Node) {
        let Some(element) = root.dyn_ref::<web_sys::Element>() else {
            return;
        };
        self.unobserve(element);
        if let Ok(descendants) = element.query_selector_all("*") {
            for i in 0..descendants.length() {
                if let Some(child) = descendants
                    .get(i)
                    .and_then(|n| n.dyn_into::<web_sys::Element>().ok())
                {
                    self.unobserve(&child);
                }
            }
        }
    }

    fn schedule_frame(&self) {
        let mut inner = self.inner.borrow_mut();
        if !inner.running || inner.raf_handle.is_some() {
            return;
        }
        let manager = self.clone();
        let raf: Closure<dyn FnMut(f64)> = Closure::new(move |_time: f64| {
            {
                let mut inner = manager.inner.borrow_mut();
                inner.raf_handle = None;
                inner.raf_closure = None;
            }
            manager.frame();
            manager.schedule_frame();
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

    fn frame(&self) {
        // Gather evaluation inputs without holding the borrow across the
        // style/layout reads.
        let (elements, options, sensitivity) = {
            let inner = self.inner.borrow();
            if !inner.running || inner.frozen || inner.locked || inner.observed.is_empty() {
                return;
            }
            if now() - inner.last_eval < inner.sampling.raf_throttle {
                return;
            }
            let options = VisibilityOptions {
                root: None,
                threshold: inner.sampling.threshold,
                sensitivity: inner.sampling.sensitivity,
                root_margin: inner.sampling.root_margin.clone(),
            };
            (inner.observed.clone(), options, inner.sampling.sensitivity)
        };

        let next = {
            let inner = self.inner.borrow();
            evaluate_visibility(&elements, &inner.previous, &options)
        };

        let mode = {
            let mut inner = self.inner.borrow_mut();
            inner.last_eval = now();
            for entry in next.iter() {
                if !entry.changed(sensitivity) {
                    continue;
                }
                let node: &web_sys::Node = &entry.target;
                let id = inner.mirror.get_id(Some(node));
                if id <= 0 {
                    continue;
                }
                inner.pending.insert(
                    id,
                    VisibilityMutationEntry {
                        id,
                        is_visible: entry.is_visible,
                        ratio: entry.intersection_ratio,
                    },
                );
            }
            inner.previous = next;
            if !inner.first_pass_done {
                // The initial classification is baseline, not change.
                inner.first_pass_done = true;
                inner.pending.clear();
                return;
            }
            if inner.pending.is_empty() {
                return;
            }
            inner.sampling.mode
        };

        match mode {
            VisibilityFlushMode::None => self.emit_pending(),
            VisibilityFlushMode::Debounce => self.arm_debounce(),
            VisibilityFlushMode::Throttle => {
                let due = {
                    let inner = self.inner.borrow();
                    now() - inner.last_emit >= inner.sampling.throttle
                };
                // Not due yet: keep the buffer, a later frame retries.
                if due {
                    self.emit_pending();
                }
            }
        }
    }

    fn arm_debounce(&self) {
        let mut inner = self.inner.borrow_mut();
        if let Some(timer) = inner.debounce_timer.take() {
            window().clear_timeout_with_handle(timer);
        }
        let manager = self.clone();
        let fire: Closure<dyn FnMut()> = Closure::new(move || {
            {
                let mut inner = manager.inner.borrow_mut();
                inner.debounce_timer = None;
                inner.debounce_closure = None;
            }
            manager.emit_pending();
        });
        let timer = window()
            .set_timeout_with_callback_and_timeout_and_arguments_0(
                fire.as_ref().unchecked_ref(),
                inner.sampling.debounce as i32,
            )
            .ok();
        inner.debounce_timer = timer;
        inner.debounce_closure = Some(fire);
    }

    /// One event with every buffered `{id, isVisible, ratio}` tuple; the
    /// checkout counter is advanced by the batch size.
    fn emit_pending(&self) {
        let (mutations, emitter) = {
            let mut inner = self.inner.borrow_mut();
            if inner.pending.is_empty() {
                return;
            }
            let mutations: Vec<VisibilityMutationEntry> =
                std::mem::take(&mut inner.pending).into_values().collect();
            inner.last_emit = now();
            (mutations, inner.emitter.clone())
        };
        emitter.notify_visibility_activity(mutations.len() as u64);
        emitter.emit_incremental(IncrementalData::VisibilityMutation(VisibilityMutationData {
            mutations,
        }));
    }
}
