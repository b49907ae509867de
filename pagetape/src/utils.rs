// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

//! Shared plumbing: listener helpers, throttling, and the method patcher
//! every observer that hooks a browser API goes through.

use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::prelude::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::AddEventListenerOptions;

use pagetape_snapshot::ORIGINAL_METHOD_KEY;

/// Current wall-clock time in ms, the timestamp basis of the stream.
pub(crate) fn now() -> f64 {
    js_sys::Date::now()
}

pub(crate) fn window() -> web_sys::Window {
    web_sys::window().expect("no global `window` exists")
}

/// A bundle of teardown callbacks, run once in reverse install order.
#[derive(Default)]
pub(crate) struct Disposables(Vec<Box<dyn FnOnce()>>);

impl Disposables {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, disposer: impl FnOnce() + 'static) {
        self.0.push(Box::new(disposer));
    }

    pub(crate) fn append(&mut self, mut other: Disposables) {
        self.0.append(&mut other.0);
    }

    pub(crate) fn dispose(&mut self) {
        while let Some(disposer) = self.0.pop() {
            disposer();
        }
    }
}

/// Attaches a listener and returns a disposer that detaches it again. The
/// closure is retained by the disposer so it can be called by the
/// environment until then.
pub(crate) fn add_listener(
    target: &web_sys::EventTarget,
    event: &str,
    handler: impl FnMut(web_sys::Event) + 'static,
    capture: bool,
    passive: bool,
) -> Result<impl FnOnce(), JsValue> {
    let callback: Closure<dyn FnMut(web_sys::Event)> = Closure::new(handler);
    let options = AddEventListenerOptions::new();
    options.set_capture(capture);
    options.set_passive(passive);
    target.add_event_listener_with_callback_and_add_event_listener_options(
        event,
        callback.as_ref().unchecked_ref(),
        &options,
    )?;
    let target = target.clone();
    let event = event.to_owned();
    Ok(move || {
        let _ = target.remove_event_listener_with_callback_and_bool(
            &event,
            callback.as_ref().unchecked_ref(),
            capture,
        );
    })
}

/// Leading+trailing throttle: the first call in a window fires immediately,
/// the last one fires when the window closes, everything in between is
/// dropped.
pub(crate) fn throttle<T: 'static>(
    callback: impl Fn(T) + 'static,
    wait: f64,
) -> Rc<dyn Fn(T)> {
    struct State<T> {
        last_call: f64,
        timer: Option<i32>,
        pending: Option<T>,
        timer_closure: Option<Closure<dyn FnMut()>>,
    }
    let callback = Rc::new(callback);
    let state = Rc::new(RefCell::new(State::<T> {
        last_call: f64::NEG_INFINITY,
        timer: None,
        pending: None,
        timer_closure: None,
    }));

    Rc::new(move |value: T| {
        let elapsed = now() - state.borrow().last_call;
        if elapsed >= wait {
            state.borrow_mut().last_call = now();
            callback(value);
            return;
        }
        // Park the value; (re)arm the trailing timer.
        let mut s = state.borrow_mut();
        s.pending = Some(value);
        if s.timer.is_some() {
            return;
        }
        let state_for_timer = Rc::clone(&state);
        let callback_for_timer = Rc::clone(&callback);
        let fire: Closure<dyn FnMut()> = Closure::new(move || {
            let pending = {
                let mut s = state_for_timer.borrow_mut();
                s.timer = None;
                s.timer_closure = None;
                s.last_call = now();
                s.pending.take()
            };
            if let Some(value) = pending {
                callback_for_timer(value);
            }
        });
        let delay = (wait - elapsed).max(0.0) as i32;
        let handle = window()
            .set_timeout_with_callback_and_timeout_and_arguments_0(
                fire.as_ref().unchecked_ref(),
                delay,
            )
            .ok();
        s.timer = handle;
        s.timer_closure = Some(fire);
    })
}

/// Restores a patched method when dropped from the recorder's teardown.
pub(crate) struct PatchGuard {
    target: js_sys::Object,
    name: String,
    original: JsValue,
    // Kept alive for as long as the patch is installed.
    _trap: Box<dyn std::any::Any>,
}

impl PatchGuard {
    pub(crate) fn restore(self) {
        let _ = js_sys::Reflect::set(&self.target, &self.name.as_str().into(), &self.original);
        if let Some(original) = self.original.dyn_ref::<js_sys::Object>() {
            let _ = js_sys::Reflect::delete_property(original, &ORIGINAL_METHOD_KEY.into());
        }
    }
}

/// Replaces `target[name]` with a `Proxy` whose `apply` trap delegates to
/// the original and then reports `(this, args, result)` to `hook`.
///
/// Going through a proxy keeps the receiver intact (patching prototypes
/// needs `this`), keeps `toString`/`length` behavior close to the original,
/// and cannot re-enter: the hook runs after delegation returned.
pub(crate) fn patch_method(
    target: &js_sys::Object,
    name: &str,
    mut hook: impl FnMut(&JsValue, &js_sys::Array, &JsValue) + 'static,
) -> Result<PatchGuard, JsValue> {
    let original = js_sys::Reflect::get(target, &name.into())?;
    let original_fn: js_sys::Function = original.clone().dyn_into()?;

    let trap_original = original_fn.clone();
    let trap: Closure<dyn FnMut(JsValue, JsValue, js_sys::Array) -> JsValue> =
        Closure::new(move |_target: JsValue, this: JsValue, args: js_sys::Array| {
            match trap_original.apply(&this, &args) {
                Ok(result) => {
                    hook(&this, &args, &result);
                    result
                }
                Err(e) => wasm_bindgen::throw_val(e),
            }
        });

    let handler = js_sys::Object::new();
    js_sys::Reflect::set(&handler, &"apply".into(), trap.as_ref())?;
    let proxy = js_sys::Proxy::new(&original, &handler);
    // Leave a trail to the unpatched function for callers that must bypass
    // the hook (e.g. blank-canvas sampling).
    js_sys::Reflect::set(&proxy, &ORIGINAL_METHOD_KEY.into(), &original)?;
    js_sys::Reflect::set(target, &name.into(), &proxy)?;

    Ok(PatchGuard {
        target: target.clone(),
        name: name.to_owned(),
        original,
        _trap: Box::new(trap),
    })
}

/// Like [`patch_method`] for constructors: proxies `construct` instead of
/// `apply`, reporting `(args, instance)` after construction.
pub(crate) fn patch_constructor(
    target: &js_sys::Object,
    name: &str,
    mut hook: impl FnMut(&js_sys::Array, &JsValue) + 'static,
) -> Result<PatchGuard, JsValue> {
    let original = js_sys::Reflect::get(target, &name.into())?;
    let original_fn: js_sys::Function = original.clone().dyn_into()?;

    let trap_original = original_fn.clone();
    let trap: Closure<dyn FnMut(JsValue, JsValue, JsValue) -> JsValue> =
        Closure::new(move |_target: JsValue, args: JsValue, _new_target: JsValue| {
            let args: js_sys::Array = args.unchecked_into();
            match js_sys::Reflect::construct(&trap_original, &args) {
                Ok(instance) => {
                    hook(&args, &instance);
                    instance
                }
                Err(e) => wasm_bindgen::throw_val(e),
            }
        });

    let handler = js_sys::Object::new();
    js_sys::Reflect::set(&handler, &"construct".into(), trap.as_ref())?;
    let proxy = js_sys::Proxy::new(&original, &handler);
    js_sys::Reflect::set(target, &name.into(), &proxy)?;

    Ok(PatchGuard {
        target: target.clone(),
        name: name.to_owned(),
        original,
        _trap: Box::new(trap),
    })
}

/// Wraps the setter half of an accessor property so assignments report
/// `(this, value)` after the original setter ran. Getter is untouched.
pub(crate) fn patch_setter(
    target: &js_sys::Object,
    name: &str,
    mut hook: impl FnMut(&JsValue, &JsValue) + 'static,
) -> Result<Option<PatchGuard>, JsValue> {
    let descriptor = js_sys::Object::get_own_property_descriptor(target, &name.into());
    if descriptor.is_undefined() {
        return Ok(None);
    }
    let original_set = js_sys::Reflect::get(&descriptor, &"set".into())?;
    let Ok(original_set_fn) = original_set.clone().dyn_into::<js_sys::Function>() else {
        return Ok(None);
    };

    let trap_original = original_set_fn.clone();
    let trap: Closure<dyn FnMut(JsValue, JsValue, js_sys::Array) -> JsValue> =
        Closure::new(move |_target: JsValue, this: JsValue, args: js_sys::Array| {
            match trap_original.apply(&this, &args) {
                Ok(result) => {
                    hook(&this, &args.get(0));
                    result
                }
                Err(e) => wasm_bindgen::throw_val(e),
            }
        });
    let handler = js_sys::Object::new();
    js_sys::Reflect::set(&handler, &"apply".into(), trap.as_ref())?;
    let proxy = js_sys::Proxy::new(&original_set, &handler);

    let patched = js_sys::Object::new();
    js_sys::Reflect::set(&patched, &"set".into(), &proxy)?;
    let getter = js_sys::Reflect::get(&descriptor, &"get".into())?;
    js_sys::Reflect::set(&patched, &"get".into(), &getter)?;
    js_sys::Reflect::set(&patched, &"configurable".into(), &JsValue::TRUE)?;
    js_sys::Object::define_property(target, &name.into(), &patched);

    Ok(Some(PatchGuard {
        target: target.clone(),
        name: name.to_owned(),
        original: descriptor.into(),
        _trap: Box::new(trap),
    }))
}

impl PatchGuard {
    /// Restore an accessor patched with [`patch_setter`].
    pub(crate) fn restore_descriptor(self) {
        if let Ok(descriptor) = self.original.clone().dyn_into::<js_sys::Object>() {
            js_sys::Object::define_property(&self.target, &self.name.as_str().into(), &descriptor);
        }
    }
}

/// Looks up `Interface.prototype` off the global object.
pub(crate) fn global_prototype(interface: &str) -> Option<js_sys::Object> {
    let ctor = js_sys::Reflect::get(&js_sys::global(), &interface.into()).ok()?;
    if ctor.is_undefined() {
        return None;
    }
    js_sys::Reflect::get(&ctor, &"prototype".into())
        .ok()?
        .dyn_into()
        .ok()
}

/// Stringifies an arbitrary JS value for log/canvas payloads: primitives
/// via JSON, objects best-effort, functions and cycles as `null`.
pub(crate) fn js_value_to_json(value: &JsValue) -> serde_json::Value {
    if let Some(s) = value.as_string() {
        return serde_json::Value::String(s);
    }
    if let Some(n) = value.as_f64() {
        return serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null);
    }
    if let Some(b) = value.as_bool() {
        return serde_json::Value::Bool(b);
    }
    if value.is_null() || value.is_undefined() {
        return serde_json::Value::Null;
    }
    js_sys::JSON::stringify(value)
        .ok()
        .and_then(|s| s.as_string())
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposables_run_in_reverse_order() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut disposables = Disposables::new();
        for i in 0..3 {
            let order = Rc::clone(&order);
            disposables.push(move || order.borrow_mut().push(i));
        }
        disposables.dispose();
        assert_eq!(*order.borrow(), vec![2, 1, 0]);
    }
}
