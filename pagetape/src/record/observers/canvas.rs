// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

//! Canvas capture.
//!
//! 2d contexts get their draw methods (and the common style setters)
//! patched; commands buffer per canvas and flush once per animation frame.
//! WebGL/WebGL2 contexts can't be replayed command-by-command from here, so
//! they fall back to periodic data-url snapshots, as does every canvas when
//! `sampling.canvas` asks for snapshots outright.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use wasm_bindgen::prelude::Closure;
use wasm_bindgen::JsCast;

use pagetape_snapshot::NodeId;

use crate::config::CanvasSampling;
use crate::record::observer::ObserverContext;
use crate::types::{CanvasCommand, CanvasContextKind, CanvasMutationData, IncrementalData};
use crate::utils::{
    global_prototype, js_value_to_json, patch_method, patch_setter, window, Disposables,
};

/// 2d methods whose calls are recorded as commands.
const PATCHED_2D_METHODS: &[&str] = &[
    "clearRect",
    "fillRect",
    "strokeRect",
    "fillText",
    "strokeText",
    "drawImage",
    "beginPath",
    "closePath",
    "moveTo",
    "lineTo",
    "bezierCurveTo",
    "quadraticCurveTo",
    "arc",
    "arcTo",
    "ellipse",
    "rect",
    "fill",
    "stroke",
    "clip",
    "putImageData",
    "setTransform",
    "transform",
    "translate",
    "rotate",
    "scale",
    "save",
    "restore",
];

/// 2d accessor properties recorded as setter commands.
const PATCHED_2D_SETTERS: &[&str] = &[
    "fillStyle",
    "strokeStyle",
    "font",
    "lineWidth",
    "globalAlpha",
    "globalCompositeOperation",
];

struct CanvasState {
    /// canvas element → index into `pending`.
    index: js_sys::Map,
    pending: Vec<PendingCanvas>,
    /// canvas element → context kind, learned from `getContext` calls.
    kinds: js_sys::Map,
    /// Last emitted snapshot url per canvas id, to skip unchanged frames.
    last_snapshots: BTreeMap<NodeId, String>,
    raf: Option<i32>,
    raf_closure: Option<Closure<dyn FnMut(f64)>>,
}

struct PendingCanvas {
    id: NodeId,
    commands: Vec<CanvasCommand>,
}

pub(crate) fn init(ctx: &ObserverContext, disposables: &mut Disposables) {
    if !ctx.options.record_canvas {
        return;
    }
    let state = Rc::new(RefCell::new(CanvasState {
        index: js_sys::Map::new(),
        pending: Vec::new(),
        kinds: js_sys::Map::new(),
        last_snapshots: BTreeMap::new(),
        raf: None,
        raf_closure: None,
    }));

    init_get_context_tracking(ctx, &state, disposables);

    match ctx.options.sampling.canvas {
        CanvasSampling::Commands => {
            init_2d_patches(ctx, &state, disposables);
            // GL canvases still need pixels; sample them slowly.
            init_snapshot_timer(ctx, &state, 2.0, true, disposables);
        }
        CanvasSampling::Snapshot { fps } => {
            init_snapshot_timer(ctx, &state, fps.max(0.1), false, disposables);
        }
    }
}

/// Patches `getContext` so the recorder knows each canvas's context kind
/// without creating contexts itself (calling `getContext` on a fresh canvas
/// would).
fn init_get_context_tracking(
    ctx: &ObserverContext,
    state: &Rc<RefCell<CanvasState>>,
    disposables: &mut Disposables,
) {
    let Some(prototype) = global_prototype("HTMLCanvasElement") else {
        return;
    };
    let state = Rc::clone(state);
    let result = patch_method(&prototype, "getContext", move |this, args, result| {
        if result.is_null() {
            return;
        }
        let Some(kind) = args.get(0).as_string() else {
            return;
        };
        let wire_kind = match kind.as_str() {
            "2d" => CanvasContextKind::TwoD,
            "webgl" | "experimental-webgl" => CanvasContextKind::WebGl,
            "webgl2" => CanvasContextKind::WebGl2,
            _ => return,
        };
        state
            .borrow()
            .kinds
            .set(this, &wasm_bindgen::JsValue::from_f64(wire_kind as u8 as f64));
    });
    match result {
        Ok(guard) => disposables.push(move || guard.restore()),
        Err(e) => ctx.emitter.report_error(&e),
    }
}

fn canvas_of_context(this: &wasm_bindgen::JsValue) -> Option<web_sys::HtmlCanvasElement> {
    this.dyn_ref::<web_sys::CanvasRenderingContext2d>()
        .and_then(|ctx| ctx.canvas())
}

fn record_command(
    ctx: &ObserverContext,
    state: &Rc<RefCell<CanvasState>>,
    this: &wasm_bindgen::JsValue,
    property: &str,
    args: Option<&js_sys::Array>,
    setter: bool,
) {
    let Some(canvas) = canvas_of_context(this) else {
        return;
    };
    let node: &web_sys::Node = &canvas;
    let id = ctx.mirror.get_id(Some(node));
    if id <= 0 {
        return;
    }
    let command = CanvasCommand {
        property: property.to_owned(),
        args: args
            .map(|a| a.iter().map(|v| js_value_to_json(&v)).collect())
            .unwrap_or_default(),
        setter: setter.then_some(true),
    };
    {
        let mut s = state.borrow_mut();
        let existing = s.index.get(&canvas).as_f64();
        match existing {
            Some(idx) => s.pending[idx as usize].commands.push(command),
            None => {
                s.index.set(
                    &canvas,
                    &wasm_bindgen::JsValue::from_f64(s.pending.len() as f64),
                );
                s.pending.push(PendingCanvas {
                    id,
                    commands: vec![command],
                });
            }
        }
    }
    schedule_flush(ctx, state);
}

fn init_2d_patches(
    ctx: &ObserverContext,
    state: &Rc<RefCell<CanvasState>>,
    disposables: &mut Disposables,
) {
    let Some(prototype) = global_prototype("CanvasRenderingContext2D") else {
        return;
    };
    for &method in PATCHED_2D_METHODS {
        let ctx = ctx.clone();
        let ctx_emitter = ctx.emitter.clone();
        let state = Rc::clone(state);
        let result = patch_method(&prototype, method, move |this, args, _result| {
            record_command(&ctx, &state, this, method, Some(args), false);
        });
        match result {
            Ok(guard) => disposables.push(move || guard.restore()),
            Err(e) => ctx_emitter.report_error(&e),
        }
    }
    for &property in PATCHED_2D_SETTERS {
        let ctx = ctx.clone();
        let ctx_emitter = ctx.emitter.clone();
        let state = Rc::clone(state);
        let result = patch_setter(&prototype, property, move |this, value| {
            let args = js_sys::Array::of1(value);
            record_command(&ctx, &state, this, property, Some(&args), true);
        });
        match result {
            Ok(Some(guard)) => disposables.push(move || guard.restore_descriptor()),
            Ok(None) => {}
            Err(e) => ctx_emitter.report_error(&e),
        }
    }
}

fn schedule_flush(ctx: &ObserverContext, state: &Rc<RefCell<CanvasState>>) {
    let mut s = state.borrow_mut();
    if s.raf.is_some() {
        return;
    }
    let emitter = ctx.emitter.clone();
    let state_for_raf = Rc::clone(state);
    let raf: Closure<dyn FnMut(f64)> = Closure::new(move |_time: f64| {
        let pending = {
            let mut s = state_for_raf.borrow_mut();
            s.raf = None;
            s.raf_closure = None;
            s.index = js_sys::Map::new();
            std::mem::take(&mut s.pending)
        };
        for canvas in pending {
            emitter.emit_incremental(IncrementalData::CanvasMutation(CanvasMutationData {
                id: canvas.id,
                kind: CanvasContextKind::TwoD,
                commands: canvas.commands,
            }));
        }
    });
    s.raf = window()
        .request_animation_frame(raf.as_ref().unchecked_ref())
        .ok();
    s.raf_closure = Some(raf);
}

/// Emits full-frame snapshots as a single `drawImage(dataURL)` command.
/// With `gl_only`, canvases known to hold a 2d context are skipped (they're
/// covered by the command patches).
fn init_snapshot_timer(
    ctx: &ObserverContext,
    state: &Rc<RefCell<CanvasState>>,
    fps: f64,
    gl_only: bool,
    disposables: &mut Disposables,
) {
    let interval_ms = (1000.0 / fps) as i32;
    let timer_ctx = ctx.clone();
    let state = Rc::clone(state);
    let tick: Closure<dyn FnMut()> = Closure::new(move || {
        let Ok(canvases) = timer_ctx.doc.query_selector_all("canvas") else {
            return;
        };
        for i in 0..canvases.length() {
            let Some(canvas) = canvases
                .get(i)
                .and_then(|n| n.dyn_into::<web_sys::HtmlCanvasElement>().ok())
            else {
                continue;
            };
            let kind = state.borrow().kinds.get(&canvas).as_f64();
            let kind = match kind {
                Some(k) if k == f64::from(CanvasContextKind::WebGl as u8) => {
                    CanvasContextKind::WebGl
                }
                Some(k) if k == f64::from(CanvasContextKind::WebGl2 as u8) => {
                    CanvasContextKind::WebGl2
                }
                Some(_) if gl_only => continue,
                Some(_) => CanvasContextKind::TwoD,
                // No getContext seen: nothing has drawn to it.
                None => continue,
            };
            let node: &web_sys::Node = &canvas;
            let id = timer_ctx.mirror.get_id(Some(node));
            if id <= 0 {
                continue;
            }
            let options = &timer_ctx.snapshot_options.data_url_options;
            let url = match options.quality {
                Some(q) => canvas.to_data_url_with_type_and_encoder_options(
                    &options.mime_type,
                    &wasm_bindgen::JsValue::from_f64(q),
                ),
                None => canvas.to_data_url_with_type(&options.mime_type),
            };
            let Ok(url) = url else {
                continue;
            };
            {
                let mut s = state.borrow_mut();
                if s.last_snapshots.get(&id).is_some_and(|last| *last == url) {
                    continue;
                }
                s.last_snapshots.insert(id, url.clone());
            }
            timer_ctx
                .emitter
                .emit_incremental(IncrementalData::CanvasMutation(CanvasMutationData {
                    id,
                    kind,
                    commands: vec![CanvasCommand {
                        property: "drawImage".into(),
                        args: vec![serde_json::Value::String(url)],
                        setter: None,
                    }],
                }));
        }
    });
    match window()
        .set_interval_with_callback_and_timeout_and_arguments_0(tick.as_ref().unchecked_ref(), interval_ms)
    {
        Ok(handle) => {
            disposables.push(move || {
                window().clear_interval_with_handle(handle);
                drop(tick);
            });
        }
        Err(e) => ctx.emitter.report_error(&e),
    }
}
