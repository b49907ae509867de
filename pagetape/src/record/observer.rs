// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

//! The per-source incremental observers and their wiring.
//!
//! `init_observers` installs everything in a fixed order; within one frame,
//! events therefore surface in install order, and mutations (which coalesce
//! to a single event per frame) stay atomic.

use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::prelude::Closure;
use wasm_bindgen::JsCast;

use pagetape_snapshot::{
    mask_input_value, InputKind, MaskInputOptions, Mirror, NodeId, SnapshotOptions,
};

use crate::config::{InputSampling, MousemoveSampling, RecordOptions};
use crate::record::iframe::IframeManager;
use crate::record::mutation::MutationBuffers;
use crate::record::observers::{canvas, fonts, log, style};
use crate::record::shadow::ShadowDomManager;
use crate::record::stylesheet::StylesheetManager;
use crate::record::Emitter;
use crate::types::{
    IncrementalData, IncrementalSource, InputData, MediaInteractionData, MediaInteractionKind,
    MouseInteractionData, MouseInteractionKind, MousePosition, MousePositionsData, ScrollData,
    SelectionData, SelectionRange, ViewportResizeData,
};
use crate::types::{CustomElementData, CustomElementDefine};
use crate::utils::{add_listener, now, patch_method, throttle, window, Disposables};

/// Everything the observer initializers need; cheap to clone.
#[derive(Clone)]
pub(crate) struct ObserverContext {
    pub(crate) win: web_sys::Window,
    pub(crate) doc: web_sys::Document,
    pub(crate) mirror: Mirror,
    pub(crate) emitter: Emitter,
    pub(crate) options: Rc<RecordOptions>,
    pub(crate) snapshot_options: Rc<SnapshotOptions>,
    pub(crate) buffers: MutationBuffers,
    pub(crate) stylesheets: StylesheetManager,
    pub(crate) shadow: ShadowDomManager,
}

/// Derives the serializer's options from the recorder's, wiring the
/// manager callbacks in.
pub(crate) fn build_snapshot_options(
    options: &RecordOptions,
    known_interactive: js_sys::WeakSet,
    shadow: &ShadowDomManager,
    iframes: &IframeManager,
    stylesheets: &StylesheetManager,
) -> SnapshotOptions {
    let mask_input_options = if options.mask_all_inputs {
        MaskInputOptions::all()
    } else {
        options.mask_input_options.clone().unwrap_or_default()
    };
    let shadow = shadow.clone();
    let iframes = iframes.clone();
    let stylesheets = stylesheets.clone();
    SnapshotOptions {
        block_class: options
            .block_class
            .clone()
            .unwrap_or_else(|| "rr-block".into()),
        block_selector: options.block_selector.clone(),
        ignore_class: options
            .ignore_class
            .clone()
            .unwrap_or_else(|| "rr-ignore".into()),
        ignore_selector: options.ignore_selector.clone(),
        exclude_attribute: options.exclude_attribute.clone(),
        mask_text_class: options
            .mask_text_class
            .clone()
            .unwrap_or_else(|| "rr-mask".into()),
        mask_text_selector: options.mask_text_selector.clone(),
        mask_text_fn: options.mask_text_fn.clone(),
        mask_input_options,
        mask_input_fn: options.mask_input_fn.clone(),
        slim_dom: options.slim_dom_options.unwrap_or_default(),
        inline_stylesheet: options.inline_stylesheet.unwrap_or(true),
        inline_images: options.inline_images,
        record_canvas: options.record_canvas,
        data_url_options: options.data_url_options.clone().unwrap_or_default(),
        keep_iframe_src_fn: options.keep_iframe_src_fn.clone(),
        known_interactive: Some(known_interactive),
        visibility: options.visibility_options(),
        on_serialize: Some(Rc::new(move |node, _id| shadow.handle_serialized(node))),
        on_iframe_load: Some(Rc::new(move |iframe| iframes.add_iframe(iframe))),
        on_stylesheet_load: Some(Rc::new(move |link| stylesheets.track_link(link))),
    }
}

/// Installs the full observer set for the top document. Install order is
/// the emission order within a frame.
pub(crate) fn init_observers(ctx: &ObserverContext) -> Disposables {
    let mut disposables = Disposables::new();
    let record_dom = ctx.options.record_dom.unwrap_or(true);

    if record_dom {
        ctx.buffers
            .observe_document(&ctx.doc, ctx.mirror.clone(), ctx.emitter.clone(), None);
        let buffers = ctx.buffers.clone();
        disposables.push(move || buffers.dispose());
        ctx.shadow.install_attach_shadow_patch(&mut disposables);
    }
    init_move_observer(ctx, &mut disposables);
    init_mouse_interaction_observer(ctx, &mut disposables);
    init_scroll_observer(ctx, &mut disposables);
    init_viewport_resize_observer(ctx, &mut disposables);
    init_input_observer(ctx, &mut disposables);
    init_media_observer(ctx, &mut disposables);
    if record_dom {
        style::init(ctx, &mut disposables);
    }
    canvas::init(ctx, &mut disposables);
    fonts::init(ctx, &mut disposables);
    init_selection_observer(ctx, &mut disposables);
    init_custom_element_observer(ctx, &mut disposables);
    log::init(ctx, &mut disposables);
    init_plugin_observers(ctx, &mut disposables);
    disposables
}

fn interaction_target(
    ctx: &ObserverContext,
    event: &web_sys::Event,
) -> Option<(web_sys::Element, NodeId)> {
    let element = event.target()?.dyn_into::<web_sys::Element>().ok()?;
    let node: &web_sys::Node = &element;
    let id = ctx.mirror.get_id(Some(node));
    if id <= 0 || in_blocked_subtree(&element, &ctx.snapshot_options) {
        return None;
    }
    Some((element, id))
}

/// Whether the element sits inside a blocked subtree.
pub(crate) fn in_blocked_subtree(element: &web_sys::Element, options: &SnapshotOptions) -> bool {
    if !options.block_class.is_empty() {
        let selector = format!(".{}", options.block_class);
        if element.closest(&selector).ok().flatten().is_some() {
            return true;
        }
    }
    options
        .block_selector
        .as_deref()
        .is_some_and(|sel| element.closest(sel).ok().flatten().is_some())
}

fn event_coordinates(event: &web_sys::Event) -> Option<(f64, f64)> {
    if let Some(mouse) = event.dyn_ref::<web_sys::MouseEvent>() {
        return Some((f64::from(mouse.client_x()), f64::from(mouse.client_y())));
    }
    let touch_event = event.dyn_ref::<web_sys::TouchEvent>()?;
    let touch = touch_event.changed_touches().get(0)?;
    Some((f64::from(touch.client_x()), f64::from(touch.client_y())))
}

struct MoveBatch {
    positions: Vec<MousePosition>,
    baseline: f64,
    source: IncrementalSource,
    timer: Option<i32>,
    timer_closure: Option<Closure<dyn FnMut()>>,
}

/// MouseMove/TouchMove/Drag batching with a configurable wait.
fn init_move_observer(ctx: &ObserverContext, disposables: &mut Disposables) {
    let wait = match ctx.options.mousemove_sampling() {
        MousemoveSampling::Off => return,
        MousemoveSampling::Wait(wait) => wait,
    };
    let batch = Rc::new(RefCell::new(MoveBatch {
        positions: Vec::new(),
        baseline: 0.0,
        source: IncrementalSource::MouseMove,
        timer: None,
        timer_closure: None,
    }));

    for (event_name, source) in [
        ("mousemove", IncrementalSource::MouseMove),
        ("touchmove", IncrementalSource::TouchMove),
        ("drag", IncrementalSource::Drag),
    ] {
        let ctx = ctx.clone();
        let ctx_emitter = ctx.emitter.clone();
        let batch = Rc::clone(&batch);
        let result = add_listener(
            &ctx.doc,
            event_name,
            move |event: web_sys::Event| {
                let Some((x, y)) = event_coordinates(&event) else {
                    return;
                };
                let id = event
                    .target()
                    .and_then(|t| t.dyn_into::<web_sys::Node>().ok())
                    .map_or(-1, |n| ctx.mirror.get_id(Some(&n)));
                let mut b = batch.borrow_mut();
                if b.positions.is_empty() {
                    b.baseline = now();
                }
                let time_offset = now() - b.baseline;
                b.positions.push(MousePosition {
                    x,
                    y,
                    id,
                    time_offset,
                });
                b.source = source;
                if b.timer.is_none() {
                    let batch_for_timer = Rc::clone(&batch);
                    let emitter = ctx.emitter.clone();
                    let fire: Closure<dyn FnMut()> = Closure::new(move || {
                        let (positions, source) = {
                            let mut b = batch_for_timer.borrow_mut();
                            b.timer = None;
                            b.timer_closure = None;
                            (std::mem::take(&mut b.positions), b.source)
                        };
                        if positions.is_empty() {
                            return;
                        }
                        let data = MousePositionsData { positions };
                        emitter.emit_incremental(match source {
                            IncrementalSource::TouchMove => IncrementalData::TouchMove(data),
                            IncrementalSource::Drag => IncrementalData::Drag(data),
                            _ => IncrementalData::MouseMove(data),
                        });
                    });
                    b.timer = window()
                        .set_timeout_with_callback_and_timeout_and_arguments_0(
                            fire.as_ref().unchecked_ref(),
                            wait as i32,
                        )
                        .ok();
                    b.timer_closure = Some(fire);
                }
            },
            true,
            true,
        );
        match result {
            Ok(disposer) => disposables.push(disposer),
            Err(e) => ctx_emitter.report_error(&e),
        }
    }
    let batch = Rc::clone(&batch);
    disposables.push(move || {
        let mut b = batch.borrow_mut();
        if let Some(timer) = b.timer.take() {
            window().clear_timeout_with_handle(timer);
        }
        b.timer_closure = None;
    });
}

fn init_mouse_interaction_observer(ctx: &ObserverContext, disposables: &mut Disposables) {
    let sampling = ctx.options.sampling.mouse_interaction;
    let kinds: [(&str, MouseInteractionKind, bool); 10] = [
        ("mouseup", MouseInteractionKind::MouseUp, sampling.mouse_up),
        ("mousedown", MouseInteractionKind::MouseDown, sampling.mouse_down),
        ("click", MouseInteractionKind::Click, sampling.click),
        ("contextmenu", MouseInteractionKind::ContextMenu, sampling.context_menu),
        ("dblclick", MouseInteractionKind::DblClick, sampling.dbl_click),
        ("focus", MouseInteractionKind::Focus, sampling.focus),
        ("blur", MouseInteractionKind::Blur, sampling.blur),
        ("touchstart", MouseInteractionKind::TouchStart, sampling.touch_start),
        ("touchend", MouseInteractionKind::TouchEnd, sampling.touch_end),
        ("touchcancel", MouseInteractionKind::TouchCancel, sampling.touch_cancel),
    ];
    for (event_name, kind, enabled) in kinds {
        if !enabled {
            continue;
        }
        let ctx = ctx.clone();
        let ctx_emitter = ctx.emitter.clone();
        let ctx_doc = ctx.doc.clone();
        let result = add_listener(
            &ctx_doc,
            event_name,
            move |event: web_sys::Event| {
                let Some((_element, id)) = interaction_target(&ctx, &event) else {
                    return;
                };
                let coords = event_coordinates(&event);
                ctx.emitter
                    .emit_incremental(IncrementalData::MouseInteraction(MouseInteractionData {
                        kind,
                        id,
                        x: coords.map(|c| c.0),
                        y: coords.map(|c| c.1),
                    }));
            },
            true,
            true,
        );
        match result {
            Ok(disposer) => disposables.push(disposer),
            Err(e) => ctx_emitter.report_error(&e),
        }
    }
}

fn init_scroll_observer(ctx: &ObserverContext, disposables: &mut Disposables) {
    let wait = ctx.options.sampling.scroll.unwrap_or(100.0);
    let scroll_ctx = ctx.clone();
    let emit_scroll = throttle(
        move |event: web_sys::Event| {
            let Some(target) = event.target() else {
                return;
            };
            let data = if let Some(doc) = target.dyn_ref::<web_sys::Document>() {
                let doc_node: &web_sys::Node = doc;
                let id = scroll_ctx.mirror.get_id(Some(doc_node));
                if id <= 0 {
                    return;
                }
                ScrollData {
                    id,
                    x: scroll_ctx.win.page_x_offset().unwrap_or(0.0),
                    y: scroll_ctx.win.page_y_offset().unwrap_or(0.0),
                }
            } else if let Ok(element) = target.dyn_into::<web_sys::Element>() {
                let node: &web_sys::Node = &element;
                let id = scroll_ctx.mirror.get_id(Some(node));
                if id <= 0 || in_blocked_subtree(&element, &scroll_ctx.snapshot_options) {
                    return;
                }
                ScrollData {
                    id,
                    x: f64::from(element.scroll_left()),
                    y: f64::from(element.scroll_top()),
                }
            } else {
                return;
            };
            scroll_ctx
                .emitter
                .emit_incremental(IncrementalData::Scroll(data));
        },
        wait,
    );
    let result = add_listener(
        &ctx.doc,
        "scroll",
        move |event| emit_scroll(event),
        true,
        true,
    );
    match result {
        Ok(disposer) => disposables.push(disposer),
        Err(e) => ctx.emitter.report_error(&e),
    }
}

fn init_viewport_resize_observer(ctx: &ObserverContext, disposables: &mut Disposables) {
    let resize_ctx = ctx.clone();
    let last: Rc<RefCell<Option<(f64, f64)>>> = Rc::new(RefCell::new(None));
    let emit_resize = throttle(
        move |(): ()| {
            let width = resize_ctx
                .win
                .inner_width()
                .ok()
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);
            let height = resize_ctx
                .win
                .inner_height()
                .ok()
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);
            if last.borrow().is_some_and(|(w, h)| w == width && h == height) {
                return;
            }
            *last.borrow_mut() = Some((width, height));
            resize_ctx
                .emitter
                .emit_incremental(IncrementalData::ViewportResize(ViewportResizeData {
                    width,
                    height,
                }));
        },
        200.0,
    );
    let result = add_listener(&ctx.win, "resize", move |_event| emit_resize(()), false, true);
    match result {
        Ok(disposer) => disposables.push(disposer),
        Err(e) => ctx.emitter.report_error(&e),
    }
}

struct InputState {
    /// Last emitted `text|checked` per id, to drop no-op events.
    last: std::collections::HashMap<NodeId, (String, bool)>,
    /// Parked events in `last`-sampling mode, flushed on the next frame.
    pending: std::collections::BTreeMap<NodeId, InputData>,
    raf: Option<i32>,
    raf_closure: Option<Closure<dyn FnMut(f64)>>,
}

fn init_input_observer(ctx: &ObserverContext, disposables: &mut Disposables) {
    let state = Rc::new(RefCell::new(InputState {
        last: std::collections::HashMap::new(),
        pending: std::collections::BTreeMap::new(),
        raf: None,
        raf_closure: None,
    }));

    let handler: Rc<dyn Fn(&web_sys::Element, Option<bool>)> = {
        let ctx = ctx.clone();
        let state = Rc::clone(&state);
        Rc::new(move |element: &web_sys::Element, user_triggered: Option<bool>| {
            let Some((text, is_checked, kind)) = read_form_value(element) else {
                return;
            };
            let node: &web_sys::Node = element;
            let id = ctx.mirror.get_id(Some(node));
            if id <= 0 || in_blocked_subtree(element, &ctx.snapshot_options) {
                return;
            }
            let text = mask_input_value(
                &text,
                kind,
                &ctx.snapshot_options.mask_input_options,
                element,
                ctx.snapshot_options.mask_input_fn.as_ref(),
            );
            {
                let mut s = state.borrow_mut();
                if s.last.get(&id).is_some_and(|(t, c)| *t == text && *c == is_checked) {
                    return;
                }
                s.last.insert(id, (text.clone(), is_checked));
            }
            let user_triggered = ctx
                .options
                .user_triggered_on_input
                .then(|| user_triggered.unwrap_or(false));
            let data = InputData {
                id,
                text,
                is_checked,
                user_triggered,
            };
            match ctx.options.sampling.input {
                InputSampling::All => {
                    ctx.emitter.emit_incremental(IncrementalData::Input(data));
                }
                InputSampling::Last => {
                    state.borrow_mut().pending.insert(id, data);
                    schedule_input_flush(&ctx, &state);
                }
            }

            // A checked radio silently unchecks the rest of its group.
            if let Some(input) = element.dyn_ref::<web_sys::HtmlInputElement>() {
                if input.type_() == "radio" && input.checked() && !input.name().is_empty() {
                    emit_radio_siblings(&ctx, &state, input);
                }
            }
        })
    };

    for event_name in ["input", "change"] {
        let handler = Rc::clone(&handler);
        let result = add_listener(
            &ctx.doc,
            event_name,
            move |event: web_sys::Event| {
                let Some(element) = event
                    .target()
                    .and_then(|t| t.dyn_into::<web_sys::Element>().ok())
                else {
                    return;
                };
                handler(&element, Some(event.is_trusted()));
            },
            true,
            true,
        );
        match result {
            Ok(disposer) => disposables.push(disposer),
            Err(e) => ctx.emitter.report_error(&e),
        }
    }

    // Programmatic value assignments bypass events entirely; hook the
    // property setters.
    let setter_targets: [(&str, &str); 6] = [
        ("HTMLInputElement", "value"),
        ("HTMLInputElement", "checked"),
        ("HTMLSelectElement", "value"),
        ("HTMLSelectElement", "selectedIndex"),
        ("HTMLTextAreaElement", "value"),
        ("HTMLOptionElement", "selected"),
    ];
    for (interface, property) in setter_targets {
        let Some(prototype) = crate::utils::global_prototype(interface) else {
            continue;
        };
        let handler = Rc::clone(&handler);
        let result = crate::utils::patch_setter(&prototype, property, move |this, _value| {
            if let Some(element) = this.dyn_ref::<web_sys::Element>() {
                handler(element, Some(false));
            }
        });
        match result {
            Ok(Some(guard)) => disposables.push(move || guard.restore_descriptor()),
            Ok(None) => {}
            Err(e) => ctx.emitter.report_error(&e),
        }
    }

    let state = Rc::clone(&state);
    disposables.push(move || {
        let mut s = state.borrow_mut();
        if let Some(raf) = s.raf.take() {
            let _ = window().cancel_animation_frame(raf);
        }
        s.raf_closure = None;
        s.pending.clear();
    });
}

fn schedule_input_flush(ctx: &ObserverContext, state: &Rc<RefCell<InputState>>) {
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
            std::mem::take(&mut s.pending)
        };
        for (_id, data) in pending {
            emitter.emit_incremental(IncrementalData::Input(data));
        }
    });
    s.raf = window()
        .request_animation_frame(raf.as_ref().unchecked_ref())
        .ok();
    s.raf_closure = Some(raf);
}

fn emit_radio_siblings(
    ctx: &ObserverContext,
    state: &Rc<RefCell<InputState>>,
    input: &web_sys::HtmlInputElement,
) {
    let selector = format!("input[type=\"radio\"][name=\"{}\"]", input.name());
    let Ok(list) = ctx.doc.query_selector_all(&selector) else {
        return;
    };
    let self_node: &web_sys::Node = input;
    for i in 0..list.length() {
        let Some(node) = list.get(i) else { continue };
        if node.is_same_node(Some(self_node)) {
            continue;
        }
        let id = ctx.mirror.get_id(Some(&node));
        if id <= 0 {
            continue;
        }
        let Some(sibling) = node.dyn_ref::<web_sys::HtmlInputElement>() else {
            continue;
        };
        let text = mask_input_value(
            &sibling.value(),
            InputKind::from_input_type(&sibling.type_()),
            &ctx.snapshot_options.mask_input_options,
            sibling,
            ctx.snapshot_options.mask_input_fn.as_ref(),
        );
        let data = InputData {
            id,
            text,
            is_checked: false,
            user_triggered: ctx.options.user_triggered_on_input.then_some(false),
        };
        state.borrow_mut().last.insert(id, (data.text.clone(), false));
        ctx.emitter.emit_incremental(IncrementalData::Input(data));
    }
}

/// `(value, checked, kind)` of a form control, or `None` for other elements.
fn read_form_value(element: &web_sys::Element) -> Option<(String, bool, InputKind)> {
    if let Some(input) = element.dyn_ref::<web_sys::HtmlInputElement>() {
        let kind = InputKind::from_input_type(&input.type_().to_lowercase());
        return Some((input.value(), input.checked(), kind));
    }
    if let Some(textarea) = element.dyn_ref::<web_sys::HtmlTextAreaElement>() {
        return Some((textarea.value(), false, InputKind::TextArea));
    }
    if let Some(select) = element.dyn_ref::<web_sys::HtmlSelectElement>() {
        return Some((select.value(), false, InputKind::Select));
    }
    if let Some(option) = element.dyn_ref::<web_sys::HtmlOptionElement>() {
        return Some((option.value(), option.selected(), InputKind::Select));
    }
    None
}

fn init_media_observer(ctx: &ObserverContext, disposables: &mut Disposables) {
    let wait = ctx.options.sampling.media.unwrap_or(500.0);
    let media_ctx = ctx.clone();
    let emit_media = throttle(
        move |(kind, event): (MediaInteractionKind, web_sys::Event)| {
            let Some((element, id)) = interaction_target(&media_ctx, &event) else {
                return;
            };
            let Some(media) = element.dyn_ref::<web_sys::HtmlMediaElement>() else {
                return;
            };
            media_ctx
                .emitter
                .emit_incremental(IncrementalData::MediaInteraction(MediaInteractionData {
                    kind,
                    id,
                    current_time: Some(media.current_time()),
                    volume: Some(media.volume()),
                    muted: Some(media.muted()),
                    playback_rate: Some(media.playback_rate()),
                }));
        },
        wait,
    );
    let events: [(&str, MediaInteractionKind); 5] = [
        ("play", MediaInteractionKind::Play),
        ("pause", MediaInteractionKind::Pause),
        ("seeked", MediaInteractionKind::Seeked),
        ("volumechange", MediaInteractionKind::VolumeChange),
        ("ratechange", MediaInteractionKind::RateChange),
    ];
    for (event_name, kind) in events {
        let emit_media = Rc::clone(&emit_media);
        let result = add_listener(
            &ctx.doc,
            event_name,
            move |event| emit_media((kind, event)),
            true,
            true,
        );
        match result {
            Ok(disposer) => disposables.push(disposer),
            Err(e) => ctx.emitter.report_error(&e),
        }
    }
}

fn init_selection_observer(ctx: &ObserverContext, disposables: &mut Disposables) {
    let selection_ctx = ctx.clone();
    let result = add_listener(
        &ctx.doc,
        "selectionchange",
        move |_event| {
            let Ok(Some(selection)) = selection_ctx.win.get_selection() else {
                return;
            };
            let mut ranges = Vec::new();
            for i in 0..selection.range_count() {
                let Ok(range) = selection.get_range_at(i) else {
                    continue;
                };
                let (Ok(start_node), Ok(end_node)) = (range.start_container(), range.end_container())
                else {
                    continue;
                };
                let start = selection_ctx.mirror.get_id(Some(&start_node));
                let end = selection_ctx.mirror.get_id(Some(&end_node));
                if start <= 0 || end <= 0 {
                    continue;
                }
                ranges.push(SelectionRange {
                    start,
                    start_offset: range.start_offset().unwrap_or(0),
                    end,
                    end_offset: range.end_offset().unwrap_or(0),
                });
            }
            if ranges.is_empty() {
                return;
            }
            selection_ctx
                .emitter
                .emit_incremental(IncrementalData::Selection(SelectionData { ranges }));
        },
        false,
        true,
    );
    match result {
        Ok(disposer) => disposables.push(disposer),
        Err(e) => ctx.emitter.report_error(&e),
    }
}

fn init_custom_element_observer(ctx: &ObserverContext, disposables: &mut Disposables) {
    let registry = ctx.win.custom_elements();
    let registry_obj: &js_sys::Object = registry.as_ref();
    let emitter = ctx.emitter.clone();
    let result = patch_method(registry_obj, "define", move |_this, args, _result| {
        let Some(name) = args.get(0).as_string() else {
            return;
        };
        emitter.emit_incremental(IncrementalData::CustomElement(CustomElementData {
            define: CustomElementDefine { name },
        }));
    });
    match result {
        Ok(guard) => disposables.push(move || guard.restore()),
        Err(e) => ctx.emitter.report_error(&e),
    }
}

fn init_plugin_observers(ctx: &ObserverContext, disposables: &mut Disposables) {
    for plugin in &ctx.options.plugins {
        let Some(observer) = &plugin.observer else {
            continue;
        };
        let emitter = ctx.emitter.clone();
        let name = plugin.name.clone();
        let emit: crate::config::PluginEmitFn =
            Rc::new(move |payload| emitter.emit_plugin(&name, payload));
        let disposer = observer(emit, &ctx.win);
        disposables.push(disposer);
    }
}
