// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

//! Console recording, the `Log` incremental source.
//!
//! Patches the configured console levels; each call is recorded with its
//! stringified arguments and a stack trace. A hard cap guards against
//! logging loops filling the stream.

use std::cell::Cell;
use std::rc::Rc;

use wasm_bindgen::{JsCast, JsValue};

use crate::record::observer::ObserverContext;
use crate::types::{IncrementalData, LogData};
use crate::utils::{js_value_to_json, patch_method, Disposables};

pub(crate) fn init(ctx: &ObserverContext, disposables: &mut Disposables) {
    let Some(options) = ctx.options.log_options.clone() else {
        return;
    };
    let Ok(console) = js_sys::Reflect::get(&js_sys::global(), &"console".into()) else {
        return;
    };
    let Ok(console) = console.dyn_into::<js_sys::Object>() else {
        return;
    };

    let count = Rc::new(Cell::new(0usize));
    // The emit pipeline itself warns through the console on failures; the
    // guard keeps such warnings from recursing back in here.
    let reentrant = Rc::new(Cell::new(false));

    for level in options.level.clone() {
        let ctx = ctx.clone();
        let ctx_emitter = ctx.emitter.clone();
        let count = Rc::clone(&count);
        let reentrant = Rc::clone(&reentrant);
        let threshold = options.length_threshold;
        let hook_level = level.clone();
        let result = patch_method(&console, &level, move |_this, args, _result| {
            if reentrant.get() {
                return;
            }
            let seen = count.get();
            if seen > threshold {
                return;
            }
            count.set(seen + 1);
            reentrant.set(true);
            let data = if seen == threshold {
                LogData {
                    level: "warn".into(),
                    trace: vec![],
                    payload: vec![format!(
                        "\"console output is being truncated after {threshold} entries\""
                    )],
                }
            } else {
                LogData {
                    level: hook_level.clone(),
                    trace: capture_trace(),
                    payload: args
                        .iter()
                        .map(|arg| stringify_arg(&arg))
                        .collect(),
                }
            };
            ctx.emitter.emit_incremental(IncrementalData::Log(data));
            reentrant.set(false);
        });
        match result {
            Ok(guard) => disposables.push(move || guard.restore()),
            Err(e) => ctx_emitter.report_error(&e),
        }
    }
}

fn stringify_arg(arg: &JsValue) -> String {
    serde_json::to_string(&js_value_to_json(arg)).unwrap_or_else(|_| "null".into())
}

/// Stack of the console call site, minus this module's own frames.
fn capture_trace() -> Vec<String> {
    let error = js_sys::Error::new("");
    let stack = js_sys::Reflect::get(&error, &"stack".into())
        .ok()
        .and_then(|v| v.as_string())
        .unwrap_or_default();
    stack
        .lines()
        .skip(1)
        .map(|line| line.trim().to_owned())
        .filter(|line| !line.is_empty())
        .collect()
}
