// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

//! The recording engine: wiring, the emit pipeline, the checkout policy and
//! the public [`record`] facade.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use wasm_bindgen::{JsCast, JsValue};

use pagetape_snapshot::{snapshot, Mirror};

use crate::config::{
    EmitFn, EmittedEvent, ErrorHandler, FlushCustomEvent, Hooks, PackFn, RecordAfter,
    RecordOptions,
};
use crate::error::RecordError;
use crate::types::{
    Event, EventWithTime, FullSnapshotData, IncrementalData, InitialOffset, MetaData, PluginData,
};
use crate::utils::{add_listener, now, Disposables};

pub(crate) mod iframe;
pub(crate) mod listeners;
pub(crate) mod mutation;
pub(crate) mod observer;
pub(crate) mod observers;
pub(crate) mod shadow;
pub(crate) mod stylesheet;
pub(crate) mod visibility;

use iframe::IframeManager;
use listeners::ListenerRegistry;
use mutation::MutationBuffers;
use shadow::ShadowDomManager;
use stylesheet::StylesheetManager;
use visibility::VisibilityManager;

thread_local! {
    static RECORDING_ACTIVE: Cell<bool> = const { Cell::new(false) };
}

type EventProcessor = Rc<dyn Fn(EventWithTime) -> EventWithTime>;

/// Where finished events go: the configured sink, or the parent frame when
/// this recorder only passes through.
#[derive(Clone)]
enum Sink {
    Emit(EmitFn),
    Parent(web_sys::Window),
}

struct EmitterInner {
    sink: Sink,
    processors: Vec<EventProcessor>,
    pack_fn: Option<PackFn>,
    hooks: Hooks,
    error_handler: Option<ErrorHandler>,
    checkout_every_nth: Option<u64>,
    checkout_every_nms: Option<f64>,
    checkout_every_nvm: Option<u64>,
    incremental_count: u64,
    visibility_count: u64,
    last_full_timestamp: f64,
    last_timestamp: f64,
    checkout_requester: Option<Rc<dyn Fn()>>,
    stopped: bool,
}

/// The emit pipeline: timestamping, plugin chain, packing, sink dispatch
/// and the checkout counters. Shared by every observer of a recording.
#[derive(Clone)]
pub(crate) struct Emitter(Rc<RefCell<EmitterInner>>);

impl Emitter {
    fn new(sink: Sink, options: &RecordOptions) -> Self {
        let processors = options
            .plugins
            .iter()
            .filter_map(|p| p.event_processor.clone())
            .collect();
        Self(Rc::new(RefCell::new(EmitterInner {
            sink,
            processors,
            pack_fn: options.pack_fn.clone(),
            hooks: options.hooks.clone(),
            error_handler: options.error_handler.clone(),
            checkout_every_nth: options.checkout_every_nth,
            checkout_every_nms: options.checkout_every_nms,
            checkout_every_nvm: options.checkout_every_nvm,
            incremental_count: 0,
            visibility_count: 0,
            last_full_timestamp: 0.0,
            last_timestamp: 0.0,
            checkout_requester: None,
            stopped: false,
        })))
    }

    pub(crate) fn emit(&self, event: Event, is_checkout: bool) {
        self.emit_stamped(EventWithTime::new(event, 0.0), is_checkout, true);
    }

    /// Re-emits an event forwarded from a child frame. The child already
    /// stamped it; the parent only clamps it into its own monotonic order.
    pub(crate) fn emit_forwarded(&self, event: EventWithTime, is_checkout: bool) {
        self.emit_stamped(event, is_checkout, false);
    }

    fn emit_stamped(&self, mut wrapped: EventWithTime, is_checkout: bool, stamp: bool) {
        let processors = {
            let mut inner = self.0.borrow_mut();
            if inner.stopped {
                return;
            }
            // Date.now can step backwards (NTP); the stream may not.
            let timestamp = if stamp {
                now().max(inner.last_timestamp)
            } else {
                wrapped.timestamp.max(inner.last_timestamp)
            };
            wrapped.timestamp = timestamp;
            inner.last_timestamp = timestamp;
            inner.processors.clone()
        };
        for processor in &processors {
            wrapped = processor(wrapped);
        }

        let counts_as_full = matches!(wrapped.event, Event::FullSnapshot(_))
            || matches!(
                &wrapped.event,
                Event::IncrementalSnapshot(IncrementalData::Mutation(m))
                    if m.is_attach_iframe == Some(true)
            );
        let is_incremental = matches!(wrapped.event, Event::IncrementalSnapshot(_));
        let timestamp = wrapped.timestamp;

        self.dispatch(&wrapped, is_checkout);

        let checkout_due = {
            let mut inner = self.0.borrow_mut();
            if inner.stopped {
                return;
            }
            if counts_as_full {
                inner.incremental_count = 0;
                inner.visibility_count = 0;
                inner.last_full_timestamp = timestamp;
                false
            } else if is_incremental {
                inner.incremental_count += 1;
                let nth_due = inner
                    .checkout_every_nth
                    .is_some_and(|n| inner.incremental_count >= n);
                let nms_due = inner
                    .checkout_every_nms
                    .is_some_and(|n| timestamp - inner.last_full_timestamp > n);
                let nvm_due = inner
                    .checkout_every_nvm
                    .is_some_and(|n| inner.visibility_count >= n);
                nth_due || nms_due || nvm_due
            } else {
                false
            }
        };
        if checkout_due {
            let requester = self.0.borrow().checkout_requester.clone();
            if let Some(requester) = requester {
                requester();
            }
        }
    }

    /// Runs the family hook, then emits as an incremental snapshot.
    pub(crate) fn emit_incremental(&self, data: IncrementalData) {
        let hook = {
            let inner = self.0.borrow();
            if inner.stopped {
                return;
            }
            inner.hooks.for_data(&data).cloned()
        };
        if let Some(hook) = hook {
            hook(&data);
        }
        self.emit(Event::IncrementalSnapshot(data), false);
    }

    /// Emits a plugin event on behalf of `plugin`.
    pub(crate) fn emit_plugin(&self, plugin: &str, payload: serde_json::Value) {
        self.emit(
            Event::Plugin(PluginData {
                plugin: plugin.to_owned(),
                payload,
            }),
            false,
        );
    }

    /// Visibility changes feed their own checkout counter.
    pub(crate) fn notify_visibility_activity(&self, count: u64) {
        self.0.borrow_mut().visibility_count += count;
    }

    fn set_checkout_requester(&self, requester: Rc<dyn Fn()>) {
        self.0.borrow_mut().checkout_requester = Some(requester);
    }

    /// Routes a JS-side failure to the error handler, or `console.warn`.
    pub(crate) fn report_error(&self, error: &JsValue) {
        let handler = self.0.borrow().error_handler.clone();
        match handler {
            Some(handler) => handler(error),
            None => web_sys::console::warn_2(&"recording error".into(), error),
        }
    }

    fn dispatch(&self, event: &EventWithTime, is_checkout: bool) {
        // Clone the sink out so a sink that re-enters the emitter (e.g. a
        // custom event from inside `emit`) doesn't hit a live borrow.
        let (sink, pack_fn) = {
            let inner = self.0.borrow();
            (inner.sink.clone(), inner.pack_fn.clone())
        };
        match sink {
            Sink::Emit(sink) => {
                let emitted = match &pack_fn {
                    Some(pack) => EmittedEvent::Packed(pack(event)),
                    None => EmittedEvent::Event(event.clone()),
                };
                sink(&emitted, is_checkout);
            }
            // Packing is skipped here: the parent packs once for the whole
            // stream.
            Sink::Parent(parent) => {
                if let Err(e) = post_to_parent(&parent, event, is_checkout) {
                    self.report_error(&e);
                }
            }
        }
    }

    fn stop(&self) {
        self.0.borrow_mut().stopped = true;
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.0.borrow().stopped
    }
}

/// The cross-origin pass-through message: `{type, event, origin, isCheckout}`.
fn post_to_parent(
    parent: &web_sys::Window,
    event: &EventWithTime,
    is_checkout: bool,
) -> Result<(), JsValue> {
    let json = serde_json::to_string(event)
        .map_err(|e| JsValue::from_str(&format!("failed to encode event: {e}")))?;
    let payload = js_sys::Object::new();
    js_sys::Reflect::set(&payload, &"type".into(), &iframe::CROSS_ORIGIN_MESSAGE_TYPE.into())?;
    js_sys::Reflect::set(&payload, &"event".into(), &js_sys::JSON::parse(&json)?)?;
    let origin = web_sys::window()
        .and_then(|w| w.location().href().ok())
        .unwrap_or_default();
    js_sys::Reflect::set(&payload, &"origin".into(), &origin.into())?;
    js_sys::Reflect::set(&payload, &"isCheckout".into(), &is_checkout.into())?;
    parent.post_message(&payload, "*")
}

struct HandleInner {
    emitter: Emitter,
    mirror: Mirror,
    observers: RefCell<Disposables>,
    buffers: MutationBuffers,
    visibility: VisibilityManager,
    iframes: IframeManager,
    stylesheets: StylesheetManager,
    registry: Rc<RefCell<ListenerRegistry>>,
    take_full_snapshot: Rc<dyn Fn(bool)>,
    custom_queue: RefCell<Vec<(String, serde_json::Value)>>,
    started: Cell<bool>,
    stopped: Cell<bool>,
}

/// Handle to a running recording, returned by [`record`].
///
/// Cloning hands out another reference to the same recording. Dropping the
/// handle does *not* stop it; call [`stop`](RecordHandle::stop).
#[derive(Clone)]
pub struct RecordHandle(Rc<HandleInner>);

impl RecordHandle {
    /// Stops the recording: every observer is detached, patched prototypes
    /// are restored, pending timers and animation frames are cancelled and
    /// the mirror is reset. Idempotent.
    pub fn stop(&self) {
        let inner = &self.0;
        if inner.stopped.replace(true) {
            return;
        }
        inner.iframes.notify_children_stopped();
        inner.observers.borrow_mut().dispose();
        inner.buffers.dispose();
        inner.visibility.reset();
        inner.stylesheets.dispose();
        inner.registry.borrow_mut().uninstall();
        inner.emitter.stop();
        inner.mirror.reset();
        RECORDING_ACTIVE.with(|active| active.set(false));
    }

    /// Emits a custom event, or queues it when recording hasn't started
    /// (or was stopped).
    pub fn add_custom_event(&self, tag: impl Into<String>, payload: serde_json::Value) {
        let tag = tag.into();
        if self.0.started.get() && !self.0.stopped.get() {
            self.0.emitter.emit(
                Event::Custom(crate::types::CustomData { tag, payload }),
                false,
            );
        } else {
            self.0.custom_queue.borrow_mut().push((tag, payload));
        }
    }

    /// Drains the custom-event queue into the stream.
    pub fn flush_custom_event_queue(&self) {
        if self.0.stopped.get() {
            return;
        }
        let queued: Vec<_> = self.0.custom_queue.borrow_mut().drain(..).collect();
        for (tag, payload) in queued {
            self.0
                .emitter
                .emit(Event::Custom(crate::types::CustomData { tag, payload }), false);
        }
    }

    /// Freezes the page: mutations keep coalescing but nothing is emitted
    /// until [`unfreeze_page`](Self::unfreeze_page).
    pub fn freeze_page(&self) {
        self.0.buffers.freeze();
        self.0.visibility.freeze();
    }

    /// Unfreezes and flushes everything that accumulated, as one event per
    /// buffer.
    pub fn unfreeze_page(&self) {
        self.0.buffers.unfreeze();
        self.0.visibility.unfreeze();
    }

    /// Forces a fresh `Meta` + `FullSnapshot` pair.
    pub fn take_full_snapshot(&self, is_checkout: bool) {
        if !self.0.stopped.get() {
            (self.0.take_full_snapshot)(is_checkout);
        }
    }

    /// Read-only handle to the node mirror.
    pub fn mirror(&self) -> Mirror {
        self.0.mirror.clone()
    }
}

/// Whether this frame should pass events through to a recording parent
/// instead of emitting itself.
fn is_cross_origin_child(win: &web_sys::Window) -> bool {
    let Ok(Some(parent)) = win.parent() else {
        return false;
    };
    if parent.loose_eq(win) {
        return false;
    }
    // Same-origin children are recorded by the parent directly; only a
    // frame that cannot reach its parent's document forwards events.
    win.frame_element().is_err() || win.frame_element().is_ok_and(|el| el.is_none())
}

/// Starts a recording.
///
/// Takes one full snapshot (per `record_after` readiness), installs the
/// observer set and returns the stop handle. The only fatal error paths are
/// a missing `emit` in an emitting frame, a missing browsing context, and a
/// recording already in progress.
pub fn record(options: RecordOptions) -> Result<RecordHandle, RecordError> {
    let win = web_sys::window().ok_or(RecordError::NoBrowsingContext)?;
    let doc = win.document().ok_or(RecordError::NoBrowsingContext)?;

    let pass_through = options.record_cross_origin_iframes && is_cross_origin_child(&win);
    let sink = match (&options.emit, pass_through) {
        (Some(emit), _) => Sink::Emit(emit.clone()),
        (None, true) => {
            let parent = win
                .parent()
                .ok()
                .flatten()
                .ok_or(RecordError::NoBrowsingContext)?;
            Sink::Parent(parent)
        }
        (None, false) => {
            return Err(RecordError::InvalidConfig(
                "`emit` is required in the emitting frame",
            ))
        }
    };
    if RECORDING_ACTIVE.with(|active| active.replace(true)) {
        return Err(RecordError::AlreadyRecording);
    }

    let record_dom = options.record_dom.unwrap_or(true);
    let mirror = Mirror::new();
    let emitter = Emitter::new(sink, &options);

    let registry = Rc::new(RefCell::new(ListenerRegistry::new()));
    if let Err(e) = registry.borrow_mut().install() {
        emitter.report_error(&e);
    }
    registry.borrow().scan_inline_handlers(&doc);

    let buffers = MutationBuffers::new();
    let stylesheets = StylesheetManager::new(emitter.clone(), mirror.clone());
    let shadow = ShadowDomManager::new(buffers.clone());
    let iframes = IframeManager::new(
        emitter.clone(),
        mirror.clone(),
        win.clone(),
        stylesheets.clone(),
    );

    let snapshot_options = Rc::new(observer::build_snapshot_options(
        &options,
        registry.borrow().known_set(),
        &shadow,
        &iframes,
        &stylesheets,
    ));
    buffers.set_snapshot_options(Rc::clone(&snapshot_options));
    iframes.set_snapshot_options(Rc::clone(&snapshot_options));
    iframes.set_buffers(buffers.clone());

    let visibility = VisibilityManager::new(
        emitter.clone(),
        mirror.clone(),
        options.sampling.visibility.clone(),
        doc.clone(),
    );

    let take_full_snapshot: Rc<dyn Fn(bool)> = {
        let emitter = emitter.clone();
        let mirror = mirror.clone();
        let win = win.clone();
        let doc = doc.clone();
        let buffers = buffers.clone();
        let visibility = visibility.clone();
        let snapshot_options = Rc::clone(&snapshot_options);
        Rc::new(move |is_checkout: bool| {
            if !record_dom {
                return;
            }
            emitter.emit(Event::Meta(meta_data(&win)), is_checkout);
            buffers.lock();
            visibility.lock();
            let result = snapshot(&doc, &mirror, &snapshot_options, false);
            match result {
                Ok(node) => {
                    let initial_offset = InitialOffset {
                        top: win.page_y_offset().unwrap_or(0.0),
                        left: win.page_x_offset().unwrap_or(0.0),
                    };
                    emitter.emit(
                        Event::FullSnapshot(FullSnapshotData {
                            node,
                            initial_offset,
                        }),
                        is_checkout,
                    );
                }
                Err(e) => {
                    web_sys::console::warn_1(
                        &format!("pagetape: snapshot failed, keeping recording alive: {e}").into(),
                    );
                }
            }
            visibility.unlock();
            buffers.unlock();
        })
    };
    emitter.set_checkout_requester({
        let take_full_snapshot = Rc::clone(&take_full_snapshot);
        Rc::new(move || take_full_snapshot(true))
    });

    let handle = RecordHandle(Rc::new(HandleInner {
        emitter: emitter.clone(),
        mirror: mirror.clone(),
        observers: RefCell::new(Disposables::new()),
        buffers: buffers.clone(),
        visibility: visibility.clone(),
        iframes: iframes.clone(),
        stylesheets: stylesheets.clone(),
        registry: Rc::clone(&registry),
        take_full_snapshot: Rc::clone(&take_full_snapshot),
        custom_queue: RefCell::new(Vec::new()),
        started: Cell::new(false),
        stopped: Cell::new(false),
    }));

    // The actual start: one full snapshot, then the observer set.
    let start = {
        let handle = handle.clone();
        let options = options.clone();
        let emitter = emitter.clone();
        let mirror = mirror.clone();
        let win = win.clone();
        let doc = doc.clone();
        let visibility = visibility.clone();
        let stylesheets = stylesheets.clone();
        let shadow = shadow.clone();
        let snapshot_options = Rc::clone(&snapshot_options);
        Rc::new(move || {
            if handle.0.started.replace(true) || handle.0.stopped.get() {
                return;
            }
            if options.flush_custom_event == FlushCustomEvent::Before {
                handle.flush_custom_event_queue();
            }
            (handle.0.take_full_snapshot)(false);

            let ctx = observer::ObserverContext {
                win: win.clone(),
                doc: doc.clone(),
                mirror: mirror.clone(),
                emitter: emitter.clone(),
                options: Rc::new(options.clone()),
                snapshot_options: Rc::clone(&snapshot_options),
                buffers: handle.0.buffers.clone(),
                stylesheets: stylesheets.clone(),
                shadow: shadow.clone(),
            };
            let mut disposables = observer::init_observers(&ctx);
            if record_dom {
                visibility.start();
                let visibility = visibility.clone();
                disposables.push(move || visibility.reset());
            }
            if options.record_cross_origin_iframes {
                handle.0.iframes.install_message_listener(&mut disposables);
            }
            handle.0.observers.borrow_mut().append(disposables);

            if options.flush_custom_event == FlushCustomEvent::After {
                handle.flush_custom_event_queue();
            }
        })
    };

    arm_start(&win, &doc, &options, &emitter, &handle, start);

    // A pass-through child lives and dies with its parent.
    if pass_through {
        install_child_stop_listeners(&win, &handle);
    }

    Ok(handle)
}

fn meta_data(win: &web_sys::Window) -> MetaData {
    MetaData {
        href: win.location().href().unwrap_or_default(),
        width: win
            .inner_width()
            .ok()
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0),
        height: win
            .inner_height()
            .ok()
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0),
    }
}

/// Starts now when the document is ready enough, otherwise waits for the
/// readiness event `record_after` names, emitting the lifecycle events on
/// the way.
fn arm_start(
    win: &web_sys::Window,
    doc: &web_sys::Document,
    options: &RecordOptions,
    emitter: &Emitter,
    handle: &RecordHandle,
    start: Rc<dyn Fn()>,
) {
    use web_sys::DocumentReadyState;

    let ready_state = doc.ready_state();
    let ready_now = match options.record_after {
        RecordAfter::DomContentLoaded => {
            ready_state == DocumentReadyState::Interactive
                || ready_state == DocumentReadyState::Complete
        }
        RecordAfter::Load => ready_state == DocumentReadyState::Complete,
    };
    if ready_now {
        start();
        return;
    }

    {
        let emitter = emitter.clone();
        let start = start.clone();
        let fire_on_dcl = options.record_after == RecordAfter::DomContentLoaded;
        let result = add_listener(
            win,
            "DOMContentLoaded",
            move |_event| {
                emitter.emit(Event::DomContentLoaded, false);
                if fire_on_dcl {
                    start();
                }
            },
            false,
            true,
        );
        match result {
            Ok(disposer) => handle.0.observers.borrow_mut().push(disposer),
            Err(e) => emitter.report_error(&e),
        }
    }
    if options.record_after == RecordAfter::Load {
        let emitter = emitter.clone();
        let result = add_listener(
            win,
            "load",
            move |_event| {
                emitter.emit(Event::Load, false);
                start();
            },
            false,
            true,
        );
        match result {
            Ok(disposer) => handle.0.observers.borrow_mut().push(disposer),
            Err(e) => emitter.report_error(&e),
        }
    }
}

/// A cross-origin child stops on its parent's synthetic stop message and on
/// its own unload.
fn install_child_stop_listeners(win: &web_sys::Window, handle: &RecordHandle) {
    {
        let handle = handle.clone();
        let handle_for_push = handle.clone();
        let result = add_listener(
            win,
            "message",
            move |event| {
                let Some(message) = event.dyn_ref::<web_sys::MessageEvent>() else {
                    return;
                };
                let data = message.data();
                let ty = js_sys::Reflect::get(&data, &"type".into())
                    .ok()
                    .and_then(|v| v.as_string());
                if ty.as_deref() == Some(iframe::CROSS_ORIGIN_STOP_TYPE) {
                    handle.stop();
                }
            },
            false,
            true,
        );
        if let Ok(disposer) = result {
            handle_for_push.0.observers.borrow_mut().push(disposer);
        }
    }
    let pagehide_handle = handle.clone();
    let result = add_listener(
        win,
        "pagehide",
        move |_event| pagehide_handle.stop(),
        false,
        true,
    );
    if let Ok(disposer) = result {
        handle.0.observers.borrow_mut().push(disposer);
    }
}

