// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

//! Style observers: `insertRule`/`deleteRule`, declaration-block edits, and
//! the adopted-stylesheet lists of documents and shadow roots.

use wasm_bindgen::{JsCast, JsValue};

use pagetape_snapshot::NodeId;

use crate::record::observer::ObserverContext;
use crate::types::{
    IncrementalData, StyleDeclarationData, StyleDeclarationRemove, StyleDeclarationSet,
    StyleSheetAddRule, StyleSheetDeleteRule, StyleSheetRuleData,
};
use crate::utils::{global_prototype, patch_method, patch_setter};

pub(crate) fn init(ctx: &ObserverContext, disposables: &mut crate::utils::Disposables) {
    init_sheet_rule_patches(ctx, disposables);
    init_declaration_patches(ctx, disposables);
    init_adopted_patches(ctx, disposables);
}

/// Mirror id of the element owning `sheet`, or the constructed-sheet id.
fn sheet_ids(ctx: &ObserverContext, sheet: &web_sys::CssStyleSheet) -> (Option<NodeId>, Option<u32>) {
    if let Some(owner) = sheet.owner_node() {
        let id = ctx.mirror.get_id(Some(&owner));
        if id > 0 {
            return (Some(id), None);
        }
        return (None, None);
    }
    (None, ctx.stylesheets.style_id_for(sheet))
}

fn init_sheet_rule_patches(ctx: &ObserverContext, disposables: &mut crate::utils::Disposables) {
    let Some(prototype) = global_prototype("CSSStyleSheet") else {
        return;
    };

    let insert_ctx = ctx.clone();
    let insert = patch_method(&prototype, "insertRule", move |this, args, _result| {
        let Some(sheet) = this.dyn_ref::<web_sys::CssStyleSheet>() else {
            return;
        };
        let Some(rule) = args.get(0).as_string() else {
            return;
        };
        let (id, style_id) = sheet_ids(&insert_ctx, sheet);
        if id.is_none() && style_id.is_none() {
            return;
        }
        let index = args.get(1).as_f64().map(|i| vec![i as u32]);
        insert_ctx
            .emitter
            .emit_incremental(IncrementalData::StyleSheetRule(StyleSheetRuleData {
                id,
                style_id,
                adds: vec![StyleSheetAddRule { rule, index }],
                removes: vec![],
            }));
    });
    match insert {
        Ok(guard) => disposables.push(move || guard.restore()),
        Err(e) => ctx.emitter.report_error(&e),
    }

    let delete_ctx = ctx.clone();
    let delete = patch_method(&prototype, "deleteRule", move |this, args, _result| {
        let Some(sheet) = this.dyn_ref::<web_sys::CssStyleSheet>() else {
            return;
        };
        let Some(index) = args.get(0).as_f64() else {
            return;
        };
        let (id, style_id) = sheet_ids(&delete_ctx, sheet);
        if id.is_none() && style_id.is_none() {
            return;
        }
        delete_ctx
            .emitter
            .emit_incremental(IncrementalData::StyleSheetRule(StyleSheetRuleData {
                id,
                style_id,
                adds: vec![],
                removes: vec![StyleSheetDeleteRule {
                    index: vec![index as u32],
                }],
            }));
    });
    match delete {
        Ok(guard) => disposables.push(move || guard.restore()),
        Err(e) => ctx.emitter.report_error(&e),
    }
}

/// Index path of `rule` within its stylesheet (flat sheets only; nested
/// group rules are re-emitted whole by the sheet-level observers).
fn rule_index(sheet: &web_sys::CssStyleSheet, rule: &JsValue) -> Option<Vec<u32>> {
    let rules = sheet.css_rules().ok()?;
    for i in 0..rules.length() {
        if let Some(candidate) = rules.item(i) {
            let candidate_value: &JsValue = candidate.as_ref();
            if candidate_value.loose_eq(rule) {
                return Some(vec![i]);
            }
        }
    }
    None
}

fn declaration_context(
    ctx: &ObserverContext,
    declaration: &JsValue,
) -> Option<(Option<NodeId>, Option<u32>, Vec<u32>)> {
    let rule = js_sys::Reflect::get(declaration, &"parentRule".into()).ok()?;
    if rule.is_null() || rule.is_undefined() {
        return None;
    }
    let sheet = js_sys::Reflect::get(&rule, &"parentStyleSheet".into()).ok()?;
    let sheet = sheet.dyn_into::<web_sys::CssStyleSheet>().ok()?;
    let (id, style_id) = sheet_ids(ctx, &sheet);
    if id.is_none() && style_id.is_none() {
        return None;
    }
    let index = rule_index(&sheet, &rule)?;
    Some((id, style_id, index))
}

fn init_declaration_patches(ctx: &ObserverContext, disposables: &mut crate::utils::Disposables) {
    let Some(prototype) = global_prototype("CSSStyleDeclaration") else {
        return;
    };

    let set_ctx = ctx.clone();
    let set = patch_method(&prototype, "setProperty", move |this, args, _result| {
        let Some(property) = args.get(0).as_string() else {
            return;
        };
        if set_ctx.options.ignore_css_attributes.contains(&property) {
            return;
        }
        let Some((id, style_id, index)) = declaration_context(&set_ctx, this) else {
            return;
        };
        set_ctx
            .emitter
            .emit_incremental(IncrementalData::StyleDeclaration(StyleDeclarationData {
                id,
                style_id,
                set: Some(StyleDeclarationSet {
                    property,
                    value: args.get(1).as_string(),
                    priority: args.get(2).as_string().filter(|p| !p.is_empty()),
                }),
                remove: None,
                index,
            }));
    });
    match set {
        Ok(guard) => disposables.push(move || guard.restore()),
        Err(e) => ctx.emitter.report_error(&e),
    }

    let remove_ctx = ctx.clone();
    let remove = patch_method(&prototype, "removeProperty", move |this, args, _result| {
        let Some(property) = args.get(0).as_string() else {
            return;
        };
        if remove_ctx.options.ignore_css_attributes.contains(&property) {
            return;
        }
        let Some((id, style_id, index)) = declaration_context(&remove_ctx, this) else {
            return;
        };
        remove_ctx
            .emitter
            .emit_incremental(IncrementalData::StyleDeclaration(StyleDeclarationData {
                id,
                style_id,
                set: None,
                remove: Some(StyleDeclarationRemove { property }),
                index,
            }));
    });
    match remove {
        Ok(guard) => disposables.push(move || guard.restore()),
        Err(e) => ctx.emitter.report_error(&e),
    }
}

/// Re-emits a document's or shadow root's full adopted list whenever the
/// `adoptedStyleSheets` property is assigned.
fn init_adopted_patches(ctx: &ObserverContext, disposables: &mut crate::utils::Disposables) {
    for interface in ["Document", "ShadowRoot"] {
        let Some(prototype) = global_prototype(interface) else {
            continue;
        };
        let adopted_ctx = ctx.clone();
        let result = patch_setter(&prototype, "adoptedStyleSheets", move |this, value| {
            let host_id = adopted_host_id(&adopted_ctx, this);
            if host_id <= 0 {
                return;
            }
            let sheets = js_sys::Array::from(value);
            adopted_ctx.stylesheets.adopted_sheets_changed(host_id, &sheets);
        });
        match result {
            Ok(Some(guard)) => disposables.push(move || guard.restore_descriptor()),
            Ok(None) => {}
            Err(e) => ctx.emitter.report_error(&e),
        }
    }
}

/// The mirror id the adopted list hangs off: the document itself, or the
/// shadow root's host element.
fn adopted_host_id(ctx: &ObserverContext, target: &JsValue) -> NodeId {
    if let Some(shadow) = target.dyn_ref::<web_sys::ShadowRoot>() {
        let host = shadow.host();
        let host_node: &web_sys::Node = &host;
        return ctx.mirror.get_id(Some(host_node));
    }
    target
        .dyn_ref::<web_sys::Node>()
        .map_or(-1, |node| ctx.mirror.get_id(Some(node)))
}
