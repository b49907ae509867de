// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

//! Font loading observer.
//!
//! Faces constructed through `new FontFace(...)` are captured with their
//! source; faces arriving any other way (css `@font-face`) surface through
//! `document.fonts`' `loadingdone` event with descriptor-only data. Face
//! properties are read reflectively: the typed `FontFace` binding has
//! churned across web-sys releases.

use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::{JsCast, JsValue};

use crate::record::observer::ObserverContext;
use crate::types::{FontData, FontDescriptors, IncrementalData};
use crate::utils::{add_listener, patch_constructor, Disposables};

pub(crate) fn init(ctx: &ObserverContext, disposables: &mut Disposables) {
    if !ctx.options.collect_fonts {
        return;
    }

    // face → index into `params`, for faces seen at construction.
    let registry: Rc<(js_sys::WeakMap, RefCell<Vec<FontData>>)> =
        Rc::new((js_sys::WeakMap::new(), RefCell::new(Vec::new())));

    {
        let registry = Rc::clone(&registry);
        let result = patch_constructor(&js_sys::global(), "FontFace", move |args, instance| {
            let family = args.get(0).as_string().unwrap_or_default();
            let source = args.get(1);
            let descriptors = descriptors_from_value(&args.get(2));
            let data = FontData {
                family,
                font_source: source.as_string().unwrap_or_default(),
                buffer: !source.is_string() && !source.is_undefined() && !source.is_null(),
                descriptors,
            };
            let (map, params) = &*registry;
            let mut params = params.borrow_mut();
            if let Some(obj) = instance.dyn_ref::<js_sys::Object>() {
                map.set(obj, &JsValue::from_f64(params.len() as f64));
            }
            params.push(data);
        });
        match result {
            Ok(guard) => disposables.push(move || guard.restore()),
            Err(e) => ctx.emitter.report_error(&e),
        }
    }

    let fonts = ctx.doc.fonts();
    let loading_ctx = ctx.clone();
    let result = add_listener(
        &fonts,
        "loadingdone",
        move |event: web_sys::Event| {
            let Ok(faces) = js_sys::Reflect::get(&event, &"fontfaces".into()) else {
                return;
            };
            let faces = js_sys::Array::from(&faces);
            for face in faces.iter() {
                let (map, params) = &*registry;
                let stored = map
                    .get(face.unchecked_ref())
                    .as_f64()
                    .and_then(|idx| params.borrow().get(idx as usize).cloned());
                let data = stored.unwrap_or_else(|| font_data_from_face(&face));
                loading_ctx
                    .emitter
                    .emit_incremental(IncrementalData::Font(data));
            }
        },
        false,
        true,
    );
    match result {
        Ok(disposer) => disposables.push(disposer),
        Err(e) => ctx.emitter.report_error(&e),
    }
}

fn reflect_string(value: &JsValue, key: &str) -> Option<String> {
    js_sys::Reflect::get(value, &key.into())
        .ok()
        .and_then(|v| v.as_string())
        .filter(|s| !s.is_empty())
}

fn descriptors_from_value(value: &JsValue) -> FontDescriptors {
    FontDescriptors {
        style: reflect_string(value, "style"),
        weight: reflect_string(value, "weight"),
        stretch: reflect_string(value, "stretch"),
        unicode_range: reflect_string(value, "unicodeRange"),
        variant: reflect_string(value, "variant"),
        feature_settings: reflect_string(value, "featureSettings"),
        display: reflect_string(value, "display"),
    }
}

fn font_data_from_face(face: &JsValue) -> FontData {
    FontData {
        family: reflect_string(face, "family").unwrap_or_default(),
        font_source: String::new(),
        buffer: false,
        descriptors: descriptors_from_value(face),
    }
}
