// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

//! Stylesheet manager: late-loading `<link rel="stylesheet">` elements and
//! the constructed-stylesheet (adopted) id space.

use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::JsCast;

use pagetape_snapshot::{stringify_stylesheet, Mirror, NodeId};

use crate::record::Emitter;
use crate::types::{
    AdoptedStyleSheetData, AdoptedStyleSheetStyle, AttributeMutation, IncrementalData,
    MutationData, StyleSheetAddRule,
};

struct StylesheetInner {
    emitter: Emitter,
    mirror: Mirror,
    /// Constructed sheet → style id.
    style_ids: js_sys::Map,
    next_style_id: u32,
    /// Style ids whose rules were already shipped once.
    emitted_styles: std::collections::BTreeSet<u32>,
    tracked_links: js_sys::WeakSet,
    link_disposers: Vec<Box<dyn FnOnce()>>,
}

/// Tracks stylesheets that aren't readable at serialization time and the
/// adopted-stylesheet id space.
#[derive(Clone)]
pub(crate) struct StylesheetManager {
    inner: Rc<RefCell<StylesheetInner>>,
}

impl StylesheetManager {
    pub(crate) fn new(emitter: Emitter, mirror: Mirror) -> Self {
        Self {
            inner: Rc::new(RefCell::new(StylesheetInner {
                emitter,
                mirror,
                style_ids: js_sys::Map::new(),
                next_style_id: 1,
                emitted_styles: std::collections::BTreeSet::new(),
                tracked_links: js_sys::WeakSet::new(),
                link_disposers: Vec::new(),
            })),
        }
    }

    /// Serializer callback for a `<link>` whose rules weren't readable yet;
    /// re-emits the css as an attribute mutation once the sheet loads.
    pub(crate) fn track_link(&self, link: &web_sys::HtmlLinkElement) {
        {
            let inner = self.inner.borrow();
            if inner.tracked_links.has(link) {
                return;
            }
            inner.tracked_links.add(link);
        }
        let manager = self.clone();
        let link_for_load = link.clone();
        let result = crate::utils::add_listener(
            link,
            "load",
            move |_event| manager.emit_link_css(&link_for_load),
            false,
            true,
        );
        match result {
            Ok(disposer) => self
                .inner
                .borrow_mut()
                .link_disposers
                .push(Box::new(disposer)),
            Err(e) => self.inner.borrow().emitter.report_error(&e),
        }
    }

    fn emit_link_css(&self, link: &web_sys::HtmlLinkElement) {
        let (emitter, mirror) = {
            let inner = self.inner.borrow();
            (inner.emitter.clone(), inner.mirror.clone())
        };
        let node: &web_sys::Node = link;
        let id = mirror.get_id(Some(node));
        if id <= 0 {
            return;
        }
        let Some(sheet) = link
            .sheet()
            .and_then(|s| s.dyn_into::<web_sys::CssStyleSheet>().ok())
        else {
            return;
        };
        let Ok(css) = stringify_stylesheet(&sheet) else {
            return;
        };
        if css.is_empty() {
            return;
        }
        let mut attributes = std::collections::BTreeMap::new();
        attributes.insert("_cssText".to_owned(), Some(css.into()));
        emitter.emit_incremental(IncrementalData::Mutation(MutationData {
            texts: vec![],
            attributes: vec![AttributeMutation { id, attributes }],
            removes: vec![],
            adds: vec![],
            is_attach_iframe: None,
        }));
    }

    /// The constructed-stylesheet id for `sheet`, when one was assigned.
    pub(crate) fn style_id_for(&self, sheet: &web_sys::CssStyleSheet) -> Option<u32> {
        let value = self.inner.borrow().style_ids.get(sheet);
        value.as_f64().map(|id| id as u32)
    }

    fn ensure_style_id(&self, sheet: &wasm_bindgen::JsValue) -> (u32, bool) {
        let mut inner = self.inner.borrow_mut();
        if let Some(existing) = inner.style_ids.get(sheet).as_f64() {
            return (existing as u32, false);
        }
        let id = inner.next_style_id;
        inner.next_style_id += 1;
        inner
            .style_ids
            .set(sheet, &wasm_bindgen::JsValue::from_f64(f64::from(id)));
        (id, true)
    }

    /// Fresh id in the constructed-sheet space, for cross-origin rewriting.
    pub(crate) fn gen_style_id(&self) -> u32 {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_style_id;
        inner.next_style_id += 1;
        id
    }

    /// Re-emits the full adopted list of a document or shadow host. Rules
    /// are shipped only the first time an individual sheet shows up.
    pub(crate) fn adopted_sheets_changed(&self, host_id: NodeId, sheets: &js_sys::Array) {
        let mut style_ids = Vec::new();
        let mut styles = Vec::new();
        for sheet in sheets.iter() {
            let (style_id, _fresh) = self.ensure_style_id(&sheet);
            style_ids.push(style_id);
            let needs_rules = self.inner.borrow_mut().emitted_styles.insert(style_id);
            if !needs_rules {
                continue;
            }
            let Some(sheet) = sheet.dyn_ref::<web_sys::CssStyleSheet>() else {
                continue;
            };
            let Ok(rules) = sheet.css_rules() else {
                continue;
            };
            let mut adds = Vec::new();
            for i in 0..rules.length() {
                if let Some(rule) = rules.item(i) {
                    adds.push(StyleSheetAddRule {
                        rule: rule.css_text(),
                        index: Some(vec![i]),
                    });
                }
            }
            styles.push(AdoptedStyleSheetStyle { style_id, rules: adds });
        }
        let emitter = self.inner.borrow().emitter.clone();
        emitter.emit_incremental(IncrementalData::AdoptedStyleSheet(AdoptedStyleSheetData {
            id: host_id,
            style_ids,
            styles,
        }));
    }

    pub(crate) fn dispose(&self) {
        let disposers = std::mem::take(&mut self.inner.borrow_mut().link_disposers);
        for disposer in disposers {
            disposer();
        }
    }
}
