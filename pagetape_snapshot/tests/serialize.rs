// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

//! Browser tests for the serializer and the mirror.

use std::cell::Cell;
use std::rc::Rc;

use wasm_bindgen::JsCast;
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};

use pagetape_snapshot::{
    document, snapshot, MaskInputOptions, Mirror, SerializedNode, SlimDomOptions, SnapshotOptions,
    IGNORED_NODE,
};

wasm_bindgen_test_configure!(run_in_browser);

fn reset_body(html: &str) {
    document()
        .body()
        .expect("test page has a body")
        .set_inner_html(html);
}

fn take(options: &SnapshotOptions) -> (SerializedNode, Mirror) {
    let mirror = Mirror::new();
    let tree = snapshot(&document(), &mirror, options, false).expect("snapshot succeeds");
    (tree, mirror)
}

fn default_options() -> SnapshotOptions {
    SnapshotOptions {
        block_class: "rr-block".into(),
        ignore_class: "rr-ignore".into(),
        mask_text_class: "rr-mask".into(),
        ..Default::default()
    }
}

fn walk<'a>(node: &'a SerializedNode, found: &mut Vec<&'a SerializedNode>) {
    found.push(node);
    for child in node.children() {
        walk(child, found);
    }
}

fn find_element<'a>(tree: &'a SerializedNode, tag: &str) -> Option<&'a SerializedNode> {
    let mut nodes = Vec::new();
    walk(tree, &mut nodes);
    nodes
        .into_iter()
        .find(|n| n.as_element().is_some_and(|el| el.tag_name == tag))
}

#[wasm_bindgen_test]
fn serializes_structure_with_fresh_ids() {
    reset_body(r#"<div id="x" class="greeting">hi</div>"#);
    let (tree, mirror) = take(&default_options());

    let mut nodes = Vec::new();
    walk(&tree, &mut nodes);
    let mut ids: Vec<_> = nodes.iter().map(|n| n.id()).collect();
    assert!(ids.iter().all(|id| *id > 0), "all ids positive: {ids:?}");
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), nodes.len(), "ids are unique");

    let div = find_element(&tree, "div").expect("div serialized").as_element().unwrap();
    assert_eq!(div.selector, "#x");
    assert_eq!(div.xpath, "//*[@id=\"x\"]");
    match div.child_nodes.first() {
        Some(SerializedNode::Text(text)) => assert_eq!(text.text_content, "hi"),
        other => panic!("expected a text child, got {other:?}"),
    }

    // The mirror resolves the live node to the serialized id.
    let live = document().get_element_by_id("x").unwrap();
    let live_node: &web_sys::Node = &live;
    assert_eq!(mirror.get_id(Some(live_node)), div.id);
}

#[wasm_bindgen_test]
fn id_stable_across_reserialization() {
    reset_body(r#"<p id="stable">text</p>"#);
    let mirror = Mirror::new();
    let options = default_options();
    let _ = snapshot(&document(), &mirror, &options, false).unwrap();
    let live = document().get_element_by_id("stable").unwrap();
    let live_node: &web_sys::Node = &live;
    let first = mirror.get_id(Some(live_node));

    let _ = snapshot(&document(), &mirror, &options, false).unwrap();
    assert_eq!(mirror.get_id(Some(live_node)), first);
}

#[wasm_bindgen_test]
fn removed_node_keeps_weak_id() {
    reset_body(r#"<span id="gone">x</span>"#);
    let (_tree, mirror) = take(&default_options());
    let live = document().get_element_by_id("gone").unwrap();
    let live_node: web_sys::Node = live.into();
    let id = mirror.get_id(Some(&live_node));
    assert!(id > 0);

    mirror.remove_node_from_map(&live_node);
    assert!(!mirror.has(id), "strong side dropped");
    assert_eq!(mirror.get_id(Some(&live_node)), id, "weak side survives");
    assert!(mirror.get_meta(&live_node).is_some(), "meta survives");

    mirror.reset();
    assert_eq!(mirror.get_id(Some(&live_node)), -1);
}

#[wasm_bindgen_test]
fn ignored_subtree_is_omitted() {
    reset_body(r#"<div class="rr-ignore"><b>secret dom</b></div><i>kept</i>"#);
    let (tree, mirror) = take(&default_options());
    assert!(find_element(&tree, "b").is_none());
    assert!(find_element(&tree, "i").is_some());

    let ignored = document().query_selector(".rr-ignore").unwrap().unwrap();
    let ignored_node: &web_sys::Node = &ignored;
    assert_eq!(mirror.get_id(Some(ignored_node)), IGNORED_NODE);
}

#[wasm_bindgen_test]
fn blocked_subtree_keeps_shape_only() {
    reset_body(r#"<div class="rr-block" style="width:120px;height:40px"><b>hidden</b></div>"#);
    let (tree, _mirror) = take(&default_options());
    let div = find_element(&tree, "div").unwrap().as_element().unwrap();
    assert_eq!(div.need_block, Some(true));
    assert!(div.child_nodes.is_empty());
    assert!(div.attributes.contains_key("rr_width"));
    assert!(div.attributes.contains_key("rr_height"));
    assert!(find_element(&tree, "b").is_none());
}

#[wasm_bindgen_test]
fn masks_password_values() {
    reset_body(r#"<input type="password" id="p">"#);
    let input = document()
        .get_element_by_id("p")
        .unwrap()
        .dyn_into::<web_sys::HtmlInputElement>()
        .unwrap();
    input.set_value("secret");

    let (tree, _mirror) = take(&default_options());
    let el = find_element(&tree, "input").unwrap().as_element().unwrap();
    assert_eq!(
        el.attributes.get("value"),
        Some(&pagetape_snapshot::AttrValue::Str("******".into()))
    );
    assert!(el.attributes.contains_key("data-rr-is-password"));
}

#[wasm_bindgen_test]
fn mask_all_inputs_covers_text_fields() {
    reset_body(r#"<input type="text" id="t">"#);
    let input = document()
        .get_element_by_id("t")
        .unwrap()
        .dyn_into::<web_sys::HtmlInputElement>()
        .unwrap();
    input.set_value("hello");

    let options = SnapshotOptions {
        mask_input_options: MaskInputOptions::all(),
        ..default_options()
    };
    let (tree, _mirror) = take(&options);
    let el = find_element(&tree, "input").unwrap().as_element().unwrap();
    assert_eq!(
        el.attributes.get("value"),
        Some(&pagetape_snapshot::AttrValue::Str("*****".into()))
    );
}

#[wasm_bindgen_test]
fn masks_text_content() {
    reset_body(r#"<p class="rr-mask">Card 1234</p>"#);
    let (tree, _mirror) = take(&default_options());
    let p = find_element(&tree, "p").unwrap().as_element().unwrap();
    match p.child_nodes.first() {
        Some(SerializedNode::Text(text)) => {
            assert_eq!(text.text_content, "**** ****");
        }
        other => panic!("expected text child, got {other:?}"),
    }
}

#[wasm_bindgen_test]
fn shadow_host_and_children_are_flagged() {
    reset_body(r#"<div id="host"></div>"#);
    let host = document().get_element_by_id("host").unwrap();
    let init = web_sys::ShadowRootInit::new(web_sys::ShadowRootMode::Open);
    let root = host.attach_shadow(&init).unwrap();
    let span = document().create_element("span").unwrap();
    span.set_text_content(Some("shadow text"));
    root.append_child(&span).unwrap();

    let (tree, mirror) = take(&default_options());
    let div = find_element(&tree, "div").unwrap().as_element().unwrap();
    assert_eq!(div.is_shadow_host, Some(true));
    let span = find_element(&tree, "span").unwrap().as_element().unwrap();
    assert_eq!(span.is_shadow, Some(true));
    assert!(span.id > 0);

    // Shadow children share the host document's id space.
    let live_span = root.query_selector("span").unwrap().unwrap();
    let live_node: &web_sys::Node = &live_span;
    assert_eq!(mirror.get_id(Some(live_node)), span.id);
}

#[wasm_bindgen_test]
fn iframes_report_to_the_attach_hook() {
    reset_body(r#"<iframe id="frame"></iframe>"#);
    let seen = Rc::new(Cell::new(false));
    let hook_seen = Rc::clone(&seen);
    let options = SnapshotOptions {
        on_iframe_load: Some(Rc::new(move |_iframe| hook_seen.set(true))),
        ..default_options()
    };
    let (tree, _mirror) = take(&options);

    assert!(seen.get(), "the iframe manager hook fired during serialization");
    let iframe = find_element(&tree, "iframe").unwrap().as_element().unwrap();
    // Children are attached through the manager, never inlined.
    assert!(iframe.child_nodes.is_empty());
}

#[wasm_bindgen_test]
fn slim_dom_all_prunes_the_title() {
    let head = document().query_selector("head").unwrap().unwrap();
    if document().query_selector("title").unwrap().is_none() {
        let title = document().create_element("title").unwrap();
        head.append_child(&title).unwrap();
    }
    document().set_title("session under test");
    reset_body("<div>content</div>");

    let options = SnapshotOptions {
        slim_dom: SlimDomOptions::all(),
        ..default_options()
    };
    let (tree, _mirror) = take(&options);
    assert!(find_element(&tree, "title").is_none());

    let (tree, _mirror) = take(&default_options());
    assert!(find_element(&tree, "title").is_some());
}

#[wasm_bindgen_test]
fn interactive_flags_on_controls() {
    reset_body(r#"<button id="b">go</button><p id="plain">copy</p>"#);
    let (tree, _mirror) = take(&default_options());
    let button = find_element(&tree, "button").unwrap().as_element().unwrap();
    assert!(button.is_interactive);
    let p = find_element(&tree, "p").unwrap().as_element().unwrap();
    assert!(!p.is_interactive);
}
