// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

//! End-to-end browser tests for the recording engine.

use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::prelude::Closure;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};

use pagetape::types::{Event, EventType, EventWithTime, IncrementalData};
use pagetape::{
    record, EmittedEvent, RecordHandle, RecordOptions, SerializedNode, VisibilityFlushMode,
};

wasm_bindgen_test_configure!(run_in_browser);

type EventLog = Rc<RefCell<Vec<(EventWithTime, bool)>>>;

fn document() -> web_sys::Document {
    web_sys::window().unwrap().document().unwrap()
}

fn reset_body(html: &str) {
    document().body().unwrap().set_inner_html(html);
}

fn start(configure: impl FnOnce(&mut RecordOptions)) -> (RecordHandle, EventLog) {
    let events: EventLog = Rc::new(RefCell::new(Vec::new()));
    let sink_events = Rc::clone(&events);
    let mut options = RecordOptions {
        emit: Some(Rc::new(move |event: &EmittedEvent, is_checkout| {
            if let Some(event) = event.as_event() {
                sink_events.borrow_mut().push((event.clone(), is_checkout));
            }
        })),
        ..Default::default()
    };
    configure(&mut options);
    let handle = record(options).expect("recorder starts");
    (handle, events)
}

/// Waits for two animation frames, enough for one coalescing cycle.
async fn next_frames() {
    for _ in 0..2 {
        let promise = js_sys::Promise::new(&mut |resolve, _reject| {
            let closure: Closure<dyn FnMut(f64)> = Closure::new(move |_: f64| {
                resolve.call0(&wasm_bindgen::JsValue::NULL).unwrap();
            });
            web_sys::window()
                .unwrap()
                .request_animation_frame(closure.as_ref().unchecked_ref())
                .unwrap();
            closure.forget();
        });
        JsFuture::from(promise).await.unwrap();
    }
}

fn event_types(events: &EventLog) -> Vec<EventType> {
    events
        .borrow()
        .iter()
        .map(|(e, _)| e.event.event_type())
        .collect()
}

fn tree_contains_text(node: &SerializedNode, needle: &str) -> bool {
    match node {
        SerializedNode::Text(text) => text.text_content.contains(needle),
        _ => node.children().iter().any(|c| tree_contains_text(c, needle)),
    }
}

fn tree_find_tag<'a>(node: &'a SerializedNode, tag: &str) -> Option<&'a SerializedNode> {
    if node.as_element().is_some_and(|el| el.tag_name == tag) {
        return Some(node);
    }
    node.children().iter().find_map(|c| tree_find_tag(c, tag))
}

fn tree_ids(node: &SerializedNode, ids: &mut Vec<pagetape::NodeId>) {
    ids.push(node.id());
    for child in node.children() {
        tree_ids(child, ids);
    }
}

#[wasm_bindgen_test]
fn stream_starts_with_meta_and_full_snapshot() {
    reset_body(r#"<div id="x">hi</div>"#);
    let (handle, events) = start(|_| {});
    handle.stop();

    let types = event_types(&events);
    assert!(types.len() >= 2, "got {types:?}");
    assert_eq!(types[0], EventType::Meta);
    assert_eq!(types[1], EventType::FullSnapshot);

    let log = events.borrow();
    match &log[0].0.event {
        Event::Meta(meta) => {
            assert!(!meta.href.is_empty());
            assert!(meta.width > 0.0);
            assert!(meta.height > 0.0);
        }
        other => panic!("expected meta, got {other:?}"),
    }
    match &log[1].0.event {
        Event::FullSnapshot(full) => {
            assert!(tree_contains_text(&full.node, "hi"));
        }
        other => panic!("expected full snapshot, got {other:?}"),
    }

    // Timestamps are monotonic.
    let stamps: Vec<f64> = log.iter().map(|(e, _)| e.timestamp).collect();
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
}

#[wasm_bindgen_test]
fn stop_is_idempotent_and_silences_the_stream() {
    reset_body("<div>bye</div>");
    let (handle, events) = start(|_| {});
    handle.stop();
    let count = events.borrow().len();
    handle.stop();
    handle.add_custom_event("late", serde_json::json!({}));
    assert_eq!(events.borrow().len(), count);
}

#[wasm_bindgen_test]
async fn programmatic_password_input_is_masked() {
    reset_body(r#"<input type="password" id="p">"#);
    let (handle, events) = start(|_| {});

    let input = document()
        .get_element_by_id("p")
        .unwrap()
        .dyn_into::<web_sys::HtmlInputElement>()
        .unwrap();
    input.set_value("secret");
    next_frames().await;
    handle.stop();

    let log = events.borrow();
    let masked = log.iter().any(|(e, _)| {
        matches!(
            &e.event,
            Event::IncrementalSnapshot(IncrementalData::Input(input)) if input.text == "******"
        )
    });
    assert!(masked, "expected a masked input event in {log:?}");
    let leaked = log.iter().any(|(e, _)| {
        serde_json::to_string(&e).unwrap_or_default().contains("secret")
    });
    assert!(!leaked, "raw value must never appear in the stream");
}

#[wasm_bindgen_test]
async fn mutations_coalesce_per_frame() {
    reset_body(r#"<div id="host"></div>"#);
    let (handle, events) = start(|_| {});

    let host = document().get_element_by_id("host").unwrap();
    for i in 0..3 {
        let child = document().create_element("span").unwrap();
        child.set_text_content(Some(&format!("c{i}")));
        host.append_child(&child).unwrap();
    }
    next_frames().await;
    handle.stop();

    let log = events.borrow();
    let mutation_events: Vec<_> = log
        .iter()
        .filter_map(|(e, _)| match &e.event {
            Event::IncrementalSnapshot(IncrementalData::Mutation(m)) => Some(m),
            _ => None,
        })
        .collect();
    assert_eq!(mutation_events.len(), 1, "one coalesced event per frame");
    assert_eq!(mutation_events[0].adds.len(), 3);
    for add in &mutation_events[0].adds {
        assert!(add.parent_id > 0);
        assert!(add.node.id() > 0);
    }
}

#[wasm_bindgen_test]
async fn checkout_every_nth_takes_extra_snapshots() {
    reset_body(r#"<div id="subject"></div>"#);
    let (handle, events) = start(|options| {
        options.checkout_every_nth = Some(5);
    });

    let subject = document().get_element_by_id("subject").unwrap();
    for i in 0..12 {
        subject.set_attribute("data-step", &i.to_string()).unwrap();
        next_frames().await;
    }
    handle.stop();

    let types = event_types(&events);
    let full_count = types
        .iter()
        .filter(|t| **t == EventType::FullSnapshot)
        .count();
    assert_eq!(full_count, 3, "initial + two checkouts in {types:?}");

    // Checkout snapshots arrive flagged and paired with a fresh meta.
    let log = events.borrow();
    let checkout_flags: Vec<bool> = log
        .iter()
        .filter(|(e, _)| e.event.event_type() == EventType::FullSnapshot)
        .map(|(_, is_checkout)| *is_checkout)
        .collect();
    assert_eq!(checkout_flags, vec![false, true, true]);
    for (i, (e, _)) in log.iter().enumerate() {
        if e.event.event_type() == EventType::FullSnapshot {
            assert_eq!(log[i - 1].0.event.event_type(), EventType::Meta);
        }
    }
}

#[wasm_bindgen_test]
async fn visibility_flip_emits_one_batched_event() {
    reset_body(r#"<section id="s" style="display:none;width:100px;height:50px">A</section>"#);
    let (handle, events) = start(|options| {
        options.sampling.visibility.mode = VisibilityFlushMode::None;
        options.sampling.visibility.raf_throttle = 0.0;
    });

    // Let the first (suppressed) pass run.
    next_frames().await;
    assert!(
        !events.borrow().iter().any(|(e, _)| matches!(
            &e.event,
            Event::IncrementalSnapshot(IncrementalData::VisibilityMutation(_))
        )),
        "initial pass must not emit"
    );

    let section = document().get_element_by_id("s").unwrap();
    section
        .set_attribute("style", "display:block;width:100px;height:50px")
        .unwrap();
    next_frames().await;
    next_frames().await;
    handle.stop();

    let log = events.borrow();
    let flips: Vec<_> = log
        .iter()
        .filter_map(|(e, _)| match &e.event {
            Event::IncrementalSnapshot(IncrementalData::VisibilityMutation(v)) => Some(v),
            _ => None,
        })
        .collect();
    assert!(!flips.is_empty(), "expected a visibility mutation in {log:?}");
    let section_node: &web_sys::Node = &section;
    let section_id = handle.mirror().get_id(Some(section_node));
    let entry = flips
        .iter()
        .flat_map(|v| v.mutations.iter())
        .find(|m| m.id == section_id)
        .expect("the section flipped");
    assert!(entry.is_visible);
    assert!(entry.ratio > 0.0);
}

#[wasm_bindgen_test]
async fn same_origin_iframe_attaches_into_the_parent_id_space() {
    reset_body("<div>host page</div>");
    let (handle, events) = start(|_| {});

    let iframe = document()
        .create_element("iframe")
        .unwrap()
        .dyn_into::<web_sys::HtmlIFrameElement>()
        .unwrap();
    document().body().unwrap().append_child(&iframe).unwrap();
    let child_doc = iframe.content_document().expect("about:blank is same origin");
    let button = child_doc.create_element("button").unwrap();
    button.set_text_content(Some("press"));
    child_doc.body().unwrap().append_child(&button).unwrap();

    next_frames().await;
    next_frames().await;
    let iframe_node: &web_sys::Node = &iframe;
    let iframe_id = handle.mirror().get_id(Some(iframe_node));
    handle.stop();

    assert!(iframe_id > 0, "the iframe element was serialized");
    let log = events.borrow();
    let attaches: Vec<_> = log
        .iter()
        .filter_map(|(e, _)| match &e.event {
            Event::IncrementalSnapshot(IncrementalData::Mutation(m))
                if m.is_attach_iframe == Some(true) =>
            {
                Some(m.clone())
            }
            _ => None,
        })
        .collect();
    assert!(!attaches.is_empty(), "an attach mutation in {log:?}");
    assert_eq!(attaches[0].adds.len(), 1);
    let add = &attaches[0].adds[0];
    assert_eq!(add.parent_id, iframe_id);
    assert!(
        matches!(add.node, SerializedNode::Document(_)),
        "the inner document is the attached root"
    );
    let inner_button = tree_find_tag(&add.node, "button").expect("button serialized");
    assert!(tree_contains_text(inner_button, "press"));

    // Ids are drawn from the parent's space: all positive, none colliding
    // with the iframe element's own id.
    let mut ids = Vec::new();
    tree_ids(&add.node, &mut ids);
    assert!(ids.iter().all(|id| *id > 0));
    assert!(!ids.contains(&iframe_id));
}

#[wasm_bindgen_test]
async fn late_shadow_roots_are_observed() {
    reset_body(r#"<div id="sh"></div>"#);
    let (handle, events) = start(|_| {});

    let host = document().get_element_by_id("sh").unwrap();
    let init = web_sys::ShadowRootInit::new(web_sys::ShadowRootMode::Open);
    let root = host.attach_shadow(&init).expect("attachShadow works while patched");
    let span = document().create_element("span").unwrap();
    span.set_text_content(Some("inside"));
    root.append_child(&span).unwrap();

    next_frames().await;
    let host_node: &web_sys::Node = &host;
    let host_id = handle.mirror().get_id(Some(host_node));
    handle.stop();

    assert!(host_id > 0);
    let log = events.borrow();
    let shadow_add = log
        .iter()
        .filter_map(|(e, _)| match &e.event {
            Event::IncrementalSnapshot(IncrementalData::Mutation(m)) => Some(m.clone()),
            _ => None,
        })
        .flat_map(|m| m.adds)
        .find(|add| tree_find_tag(&add.node, "span").is_some())
        .expect("the shadow child surfaced as a mutation");

    assert_eq!(shadow_add.parent_id, host_id);
    match &shadow_add.node {
        SerializedNode::Element(el) => {
            assert_eq!(el.is_shadow, Some(true), "flagged for the replayer");
            assert!(tree_contains_text(&shadow_add.node, "inside"));
        }
        other => panic!("expected an element add, got {other:?}"),
    }
}

#[wasm_bindgen_test]
async fn custom_events_follow_the_initial_snapshot() {
    reset_body("<div>q</div>");
    let (handle, events) = start(|_| {});
    handle.add_custom_event("marker", serde_json::json!({"k": 1}));
    next_frames().await;
    handle.stop();

    let log = events.borrow();
    let custom_index = log
        .iter()
        .position(|(e, _)| e.event.event_type() == EventType::Custom)
        .expect("custom event emitted");
    let full_index = log
        .iter()
        .position(|(e, _)| e.event.event_type() == EventType::FullSnapshot)
        .unwrap();
    assert!(custom_index > full_index, "default flush is after the snapshot");
}

#[wasm_bindgen_test]
async fn freeze_coalesces_until_unfreeze() {
    reset_body(r#"<div id="frozen-host"></div>"#);
    let (handle, events) = start(|_| {});
    handle.freeze_page();

    let host = document().get_element_by_id("frozen-host").unwrap();
    for _ in 0..2 {
        let child = document().create_element("i").unwrap();
        host.append_child(&child).unwrap();
        next_frames().await;
    }
    let frozen_mutations = events
        .borrow()
        .iter()
        .filter(|(e, _)| {
            matches!(
                &e.event,
                Event::IncrementalSnapshot(IncrementalData::Mutation(_))
            )
        })
        .count();
    assert_eq!(frozen_mutations, 0, "nothing emitted while frozen");

    handle.unfreeze_page();
    next_frames().await;
    handle.stop();

    let log = events.borrow();
    let mutations: Vec<_> = log
        .iter()
        .filter_map(|(e, _)| match &e.event {
            Event::IncrementalSnapshot(IncrementalData::Mutation(m)) => Some(m),
            _ => None,
        })
        .collect();
    assert_eq!(mutations.len(), 1, "one flush for the whole pause");
    assert_eq!(mutations[0].adds.len(), 2);
}
