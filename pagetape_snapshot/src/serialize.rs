// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

//! One-shot serialization of a live DOM subtree.
//!
//! Every visited node is registered with the [`Mirror`] as a side effect, so
//! the ids in the returned tree stay resolvable for the incremental events
//! that follow.

use std::rc::Rc;

use regex::Regex;
use wasm_bindgen::{JsCast, JsValue};

use crate::css::{split_css_text, stringify_stylesheet};
use crate::error::SnapshotError;
use crate::mask::{
    mask_input_value, mask_text, InputKind, MaskInputFn, MaskInputOptions, MaskTextFn,
};
use crate::mirror::Mirror;
use crate::selector::{css_selector_of, xpath_of};
use crate::types::{
    AttrMap, AttrValue, DocumentNode, DocumentTypeNode, ElementNode, NodeId, SerializedNode,
    TextNode,
};
use crate::visibility::{
    expand_by_margin, is_interactive_node, is_style_visible, parse_root_margin, Rect,
    VisibilityOptions,
};
use crate::SVG_NS;

/// Property stashed on patched canvas methods so the serializer can reach
/// the unpatched original for blank detection.
pub const ORIGINAL_METHOD_KEY: &str = "__pagetape_original__";

const SCRIPT_PLACEHOLDER: &str = "SCRIPT_PLACEHOLDER";

/// Options for canvas/image data-url serialization.
#[derive(Debug, Clone)]
pub struct DataUrlOptions {
    pub mime_type: String,
    pub quality: Option<f64>,
}

impl Default for DataUrlOptions {
    fn default() -> Self {
        Self {
            mime_type: "image/png".into(),
            quality: None,
        }
    }
}

/// Head-noise pruning switches.
///
/// The "common" profile drops what never matters for replay (favicons,
/// social/robots/verification metas); the "all" profile additionally drops
/// authorship and description metas and `<title>` churn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlimDomOptions {
    pub script: bool,
    pub comment: bool,
    pub head_favicon: bool,
    pub head_meta_social: bool,
    pub head_meta_robots: bool,
    pub head_meta_http_equiv: bool,
    pub head_meta_verification: bool,
    pub head_meta_authorship: bool,
    pub head_meta_desc_keywords: bool,
    /// Drop the `<title>` element and its later text mutations; SPA routers
    /// rewrite it on every navigation.
    pub head_title_mutations: bool,
}

impl SlimDomOptions {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn common() -> Self {
        Self {
            script: true,
            comment: true,
            head_favicon: true,
            head_meta_social: true,
            head_meta_robots: true,
            head_meta_http_equiv: true,
            head_meta_verification: true,
            head_meta_authorship: false,
            head_meta_desc_keywords: false,
            head_title_mutations: false,
        }
    }

    pub fn all() -> Self {
        Self {
            head_meta_authorship: true,
            head_meta_desc_keywords: true,
            head_title_mutations: true,
            ..Self::common()
        }
    }
}

type NodeCallback = Rc<dyn Fn(&web_sys::Node, NodeId)>;
type IframeCallback = Rc<dyn Fn(&web_sys::HtmlIFrameElement)>;
type LinkCallback = Rc<dyn Fn(&web_sys::HtmlLinkElement)>;
type KeepIframeSrcFn = Rc<dyn Fn(&str) -> bool>;

/// Everything steering a snapshot. The recorder builds one of these from its
/// own options and keeps it alive for incremental (re)serialization too.
#[derive(Default)]
pub struct SnapshotOptions {
    pub block_class: String,
    pub block_selector: Option<String>,
    pub ignore_class: String,
    pub ignore_selector: Option<String>,
    pub exclude_attribute: Option<Regex>,
    pub mask_text_class: String,
    pub mask_text_selector: Option<String>,
    pub mask_text_fn: Option<MaskTextFn>,
    pub mask_input_options: MaskInputOptions,
    pub mask_input_fn: Option<MaskInputFn>,
    pub slim_dom: SlimDomOptions,
    pub inline_stylesheet: bool,
    pub inline_images: bool,
    pub record_canvas: bool,
    pub data_url_options: DataUrlOptions,
    pub keep_iframe_src_fn: Option<KeepIframeSrcFn>,
    /// The recorder's registry of elements seen registering interactive
    /// listeners; feeds the `isInteractive` flag.
    pub known_interactive: Option<js_sys::WeakSet>,
    pub visibility: VisibilityOptions,
    pub on_serialize: Option<NodeCallback>,
    pub on_iframe_load: Option<IframeCallback>,
    pub on_stylesheet_load: Option<LinkCallback>,
}

/// Serializes a whole document.
///
/// `emit_root_id` marks sub-documents (iframe content): their descendants
/// carry a `rootId` pointing at the serialized document so the replayer can
/// scope them.
pub fn snapshot(
    doc: &web_sys::Document,
    mirror: &Mirror,
    options: &SnapshotOptions,
    emit_root_id: bool,
) -> Result<SerializedNode, SnapshotError> {
    if doc.document_element().is_none() {
        return Err(SnapshotError::DetachedDocument);
    }
    let serializer = Serializer {
        doc: doc.clone(),
        mirror,
        options,
    };
    let doc_node: &web_sys::Node = doc;
    let id = serializer.id_for(doc_node);
    let root_id = emit_root_id.then_some(id);
    let mut children = Vec::new();
    let child_nodes = doc_node.child_nodes();
    for i in 0..child_nodes.length() {
        if let Some(child) = child_nodes.get(i) {
            if let Some(serialized) = serializer.serialize_node(&child, root_id) {
                children.push(serialized);
            }
        }
    }
    let serialized = SerializedNode::Document(DocumentNode {
        id,
        compat_mode: doc.compat_mode(),
        child_nodes: children,
        root_id: None,
    });
    mirror.add(doc_node, serialized.clone());
    Ok(serialized)
}

/// Serializes a single subtree (used by the mutation buffer for added
/// nodes). Returns `None` when the node falls under the ignore policy.
pub fn serialize_node_with_id(
    node: &web_sys::Node,
    doc: &web_sys::Document,
    mirror: &Mirror,
    options: &SnapshotOptions,
    root_id: Option<NodeId>,
) -> Option<SerializedNode> {
    let serializer = Serializer {
        doc: doc.clone(),
        mirror,
        options,
    };
    serializer.serialize_node(node, root_id)
}

struct Serializer<'a> {
    doc: web_sys::Document,
    mirror: &'a Mirror,
    options: &'a SnapshotOptions,
}

impl Serializer<'_> {
    /// Reuses the node's existing id across re-serialization; hands out a
    /// fresh one otherwise.
    fn id_for(&self, node: &web_sys::Node) -> NodeId {
        if self.mirror.has_node(node) {
            self.mirror.get_id(Some(node))
        } else {
            self.mirror.gen_id()
        }
    }

    fn serialize_node(&self, node: &web_sys::Node, root_id: Option<NodeId>) -> Option<SerializedNode> {
        match node.node_type() {
            web_sys::Node::DOCUMENT_NODE => {
                let doc = node.dyn_ref::<web_sys::Document>()?;
                snapshot(doc, self.mirror, self.options, true).ok()
            }
            web_sys::Node::DOCUMENT_TYPE_NODE => {
                let doctype = node.dyn_ref::<web_sys::DocumentType>()?;
                let serialized = SerializedNode::DocumentType(DocumentTypeNode {
                    id: self.id_for(node),
                    name: doctype.name(),
                    public_id: doctype.public_id(),
                    system_id: doctype.system_id(),
                    root_id,
                });
                self.mirror.add(node, serialized.clone());
                Some(serialized)
            }
            web_sys::Node::ELEMENT_NODE => {
                let element = node.dyn_ref::<web_sys::Element>()?;
                self.serialize_element(element, root_id)
            }
            web_sys::Node::TEXT_NODE => self.serialize_text(node, root_id),
            web_sys::Node::CDATA_SECTION_NODE => {
                let serialized = SerializedNode::Cdata(TextNode {
                    id: self.id_for(node),
                    text_content: String::new(),
                    is_style: None,
                    root_id,
                });
                self.mirror.add(node, serialized.clone());
                Some(serialized)
            }
            web_sys::Node::COMMENT_NODE => {
                if self.options.slim_dom.comment {
                    self.mirror.mark_ignored(node);
                    return None;
                }
                let serialized = SerializedNode::Comment(TextNode {
                    id: self.id_for(node),
                    text_content: node.text_content().unwrap_or_default(),
                    is_style: None,
                    root_id,
                });
                self.mirror.add(node, serialized.clone());
                Some(serialized)
            }
            _ => None,
        }
    }

    fn serialize_element(
        &self,
        element: &web_sys::Element,
        root_id: Option<NodeId>,
    ) -> Option<SerializedNode> {
        if self.is_ignored(element) || self.is_slim_skipped(element) {
            self.mirror.mark_ignored(element);
            return None;
        }

        let node: &web_sys::Node = element;
        let id = self.id_for(node);
        let tag_name = element.tag_name().to_lowercase();
        let blocked = self.is_blocked(element);
        let masked = self.matches_text_mask(element);
        let is_svg = element.namespace_uri().as_deref() == Some(SVG_NS);
        // Direct children of a shadow root are flagged so the replayer
        // attaches them below the host's root, not among its light children.
        let in_shadow = node.parent_node().is_some_and(|p| is_shadow_root(&p));

        let mut attributes = self.serialize_attributes(element, &tag_name);
        self.add_live_state(element, &tag_name, blocked, &mut attributes);

        let mut child_nodes = Vec::new();
        let mut is_shadow_host = None;
        if !blocked && tag_name != "iframe" {
            let children = node.child_nodes();
            for i in 0..children.length() {
                if let Some(child) = children.get(i) {
                    if let Some(serialized) = self.serialize_node(&child, root_id) {
                        child_nodes.push(serialized);
                    }
                }
            }
            if let Some(shadow) = element.shadow_root() {
                is_shadow_host = Some(true);
                let shadow_children = shadow.child_nodes();
                for i in 0..shadow_children.length() {
                    if let Some(child) = shadow_children.get(i) {
                        if let Some(serialized) = self.serialize_node(&child, root_id) {
                            child_nodes.push(serialized);
                        }
                    }
                }
            }
        }

        let (is_visible, _ratio) = self.element_visibility(element);
        let serialized = SerializedNode::Element(ElementNode {
            id,
            tag_name: tag_name.clone(),
            attributes,
            child_nodes,
            is_svg: is_svg.then_some(true),
            need_block: blocked.then_some(true),
            need_mask: masked.then_some(true),
            root_id,
            is_shadow_host,
            is_shadow: in_shadow.then_some(true),
            xpath: xpath_of(element),
            selector: css_selector_of(element),
            is_visible,
            is_interactive: is_interactive_node(node, self.options.known_interactive.as_ref()),
        });
        self.mirror.add(node, serialized.clone());

        if let Some(on_serialize) = &self.options.on_serialize {
            on_serialize(node, id);
        }
        if tag_name == "iframe" {
            if let (Some(on_iframe_load), Some(iframe)) = (
                &self.options.on_iframe_load,
                element.dyn_ref::<web_sys::HtmlIFrameElement>(),
            ) {
                on_iframe_load(iframe);
            }
        }
        Some(serialized)
    }

    fn serialize_text(&self, node: &web_sys::Node, root_id: Option<NodeId>) -> Option<SerializedNode> {
        let parent = node.parent_element();
        let parent_tag = parent.as_ref().map(|p| p.tag_name().to_lowercase());
        let is_style = parent_tag.as_deref() == Some("style");
        let mut text_content = node.text_content().unwrap_or_default();
        if parent_tag.as_deref() == Some("script") {
            text_content = SCRIPT_PLACEHOLDER.into();
        } else if !is_style {
            if let Some(parent) = &parent {
                if self.matches_text_mask(parent) {
                    text_content =
                        mask_text(&text_content, parent, self.options.mask_text_fn.as_ref());
                }
            }
        }
        let serialized = SerializedNode::Text(TextNode {
            id: self.id_for(node),
            text_content,
            is_style: is_style.then_some(true),
            root_id,
        });
        self.mirror.add(node, serialized.clone());
        Some(serialized)
    }

    fn serialize_attributes(&self, element: &web_sys::Element, tag_name: &str) -> AttrMap {
        let mut out = AttrMap::new();
        let attributes = element.attributes();
        for i in 0..attributes.length() {
            let Some(attr) = attributes.item(i) else {
                continue;
            };
            let name = attr.name();
            if let Some(exclude) = &self.options.exclude_attribute {
                if exclude.is_match(&name) {
                    continue;
                }
            }
            if tag_name == "iframe" && name == "src" {
                let keep = self
                    .options
                    .keep_iframe_src_fn
                    .as_ref()
                    .is_some_and(|f| f(&attr.value()));
                if !keep {
                    continue;
                }
            }
            out.insert(name, attr.value());
        }
        out
    }

    /// State that lives on the live object rather than in the attribute map:
    /// form values, media/scroll state, inlined resources.
    fn add_live_state(
        &self,
        element: &web_sys::Element,
        tag_name: &str,
        blocked: bool,
        attributes: &mut AttrMap,
    ) {
        match tag_name {
            "input" => {
                if let Some(input) = element.dyn_ref::<web_sys::HtmlInputElement>() {
                    let kind = InputKind::from_input_type(&input.type_().to_lowercase());
                    if kind == InputKind::Password {
                        attributes.insert("data-rr-is-password", AttrValue::True);
                    }
                    let value = input.value();
                    if !value.is_empty() {
                        attributes.insert(
                            "value",
                            mask_input_value(
                                &value,
                                kind,
                                &self.options.mask_input_options,
                                element,
                                self.options.mask_input_fn.as_ref(),
                            ),
                        );
                    }
                    if input.checked() {
                        attributes.insert("checked", AttrValue::True);
                    }
                }
            }
            "textarea" => {
                if let Some(textarea) = element.dyn_ref::<web_sys::HtmlTextAreaElement>() {
                    let value = textarea.value();
                    if !value.is_empty() {
                        attributes.insert(
                            "value",
                            mask_input_value(
                                &value,
                                InputKind::TextArea,
                                &self.options.mask_input_options,
                                element,
                                self.options.mask_input_fn.as_ref(),
                            ),
                        );
                    }
                }
            }
            "select" => {
                if let Some(select) = element.dyn_ref::<web_sys::HtmlSelectElement>() {
                    let value = select.value();
                    if !value.is_empty() {
                        attributes.insert(
                            "value",
                            mask_input_value(
                                &value,
                                InputKind::Select,
                                &self.options.mask_input_options,
                                element,
                                self.options.mask_input_fn.as_ref(),
                            ),
                        );
                    }
                }
            }
            "option" => {
                if let Some(option) = element.dyn_ref::<web_sys::HtmlOptionElement>() {
                    if option.selected() {
                        attributes.insert("selected", AttrValue::True);
                    }
                }
            }
            "style" => {
                self.inline_style_element(element, attributes);
            }
            "link" => {
                if self.options.inline_stylesheet {
                    self.inline_linked_stylesheet(element, attributes);
                }
            }
            "canvas" => {
                if self.options.record_canvas {
                    if let Some(canvas) = element.dyn_ref::<web_sys::HtmlCanvasElement>() {
                        if !is_canvas_blank(canvas) {
                            if let Some(url) = canvas_data_url(canvas, &self.options.data_url_options)
                            {
                                attributes.insert("rr_dataURL", url);
                            }
                        }
                    }
                }
            }
            "img" => {
                if self.options.inline_images {
                    if let Some(img) = element.dyn_ref::<web_sys::HtmlImageElement>() {
                        if let Some(url) = inline_image(&self.doc, img, &self.options.data_url_options)
                        {
                            attributes.insert("rr_dataURL", url);
                        }
                    }
                }
            }
            "audio" | "video" => {
                if let Some(media) = element.dyn_ref::<web_sys::HtmlMediaElement>() {
                    let state = if media.paused() { "paused" } else { "played" };
                    attributes.insert("rr_mediaState", state);
                }
            }
            _ => {}
        }

        let scroll_left = element.scroll_left();
        let scroll_top = element.scroll_top();
        if scroll_left != 0 {
            attributes.insert("rr_scrollLeft", f64::from(scroll_left));
        }
        if scroll_top != 0 {
            attributes.insert("rr_scrollTop", f64::from(scroll_top));
        }
        if blocked {
            let rect = element.get_bounding_client_rect();
            attributes.insert("rr_width", format!("{}px", rect.width()));
            attributes.insert("rr_height", format!("{}px", rect.height()));
        }
    }

    /// Reads a `<style>` element's sheet; when the sheet text differs from
    /// the element's literal text children (e.g. rules were inserted
    /// programmatically), records the real css under `_cssText`, split to
    /// stay aligned with the children.
    fn inline_style_element(&self, element: &web_sys::Element, attributes: &mut AttrMap) {
        let Some(style) = element.dyn_ref::<web_sys::HtmlStyleElement>() else {
            return;
        };
        let Some(sheet) = style.sheet() else {
            return;
        };
        let Some(sheet) = sheet.dyn_ref::<web_sys::CssStyleSheet>() else {
            return;
        };
        let Ok(css) = stringify_stylesheet(sheet) else {
            return;
        };
        if css.is_empty() {
            return;
        }
        let node: &web_sys::Node = element;
        let mut chunk_lengths = Vec::new();
        let mut literal = String::new();
        let children = node.child_nodes();
        for i in 0..children.length() {
            if let Some(child) = children.get(i) {
                if child.node_type() == web_sys::Node::TEXT_NODE {
                    let text = child.text_content().unwrap_or_default();
                    chunk_lengths.push(text.chars().count());
                    literal.push_str(&text);
                }
            }
        }
        if css != literal {
            attributes.insert("_cssText", split_css_text(&css, &chunk_lengths));
        }
    }

    /// Inlines a `<link rel="stylesheet">`'s rules under `_cssText`. When
    /// the sheet isn't readable yet the stylesheet manager is told to retry
    /// after its load event.
    fn inline_linked_stylesheet(&self, element: &web_sys::Element, attributes: &mut AttrMap) {
        let Some(link) = element.dyn_ref::<web_sys::HtmlLinkElement>() else {
            return;
        };
        if !link.rel().to_lowercase().contains("stylesheet") {
            return;
        }
        let sheet = link
            .sheet()
            .and_then(|s| s.dyn_into::<web_sys::CssStyleSheet>().ok());
        let css = sheet.as_ref().and_then(|s| stringify_stylesheet(s).ok());
        match css {
            Some(css) if !css.is_empty() => {
                attributes.insert("_cssText", css);
            }
            _ => {
                if let Some(on_stylesheet_load) = &self.options.on_stylesheet_load {
                    on_stylesheet_load(link);
                }
            }
        }
    }

    fn is_blocked(&self, element: &web_sys::Element) -> bool {
        matches_class_or_selector(
            element,
            &self.options.block_class,
            self.options.block_selector.as_deref(),
        )
    }

    fn is_ignored(&self, element: &web_sys::Element) -> bool {
        matches_class_or_selector(
            element,
            &self.options.ignore_class,
            self.options.ignore_selector.as_deref(),
        )
    }

    fn matches_text_mask(&self, element: &web_sys::Element) -> bool {
        matches_class_or_selector(
            element,
            &self.options.mask_text_class,
            self.options.mask_text_selector.as_deref(),
        )
    }

    /// Head-noise and script pruning.
    fn is_slim_skipped(&self, element: &web_sys::Element) -> bool {
        let slim = &self.options.slim_dom;
        let tag = element.tag_name().to_lowercase();
        match tag.as_str() {
            "script" => slim.script,
            "noscript" => slim.script,
            "title" => slim.head_title_mutations,
            "link" => {
                slim.head_favicon
                    && element
                        .get_attribute("rel")
                        .is_some_and(|rel| rel.to_lowercase().contains("icon"))
            }
            "meta" => {
                let name = element
                    .get_attribute("name")
                    .unwrap_or_default()
                    .to_lowercase();
                let property = element
                    .get_attribute("property")
                    .unwrap_or_default()
                    .to_lowercase();
                if slim.head_meta_social
                    && (property.starts_with("og:")
                        || property.starts_with("twitter:")
                        || name.starts_with("twitter:"))
                {
                    return true;
                }
                if slim.head_meta_robots
                    && matches!(name.as_str(), "robots" | "googlebot" | "bingbot")
                {
                    return true;
                }
                if slim.head_meta_http_equiv && element.has_attribute("http-equiv") {
                    return true;
                }
                if slim.head_meta_verification
                    && (name.contains("site-verification") || name == "yandex-verification")
                {
                    return true;
                }
                if slim.head_meta_authorship
                    && matches!(name.as_str(), "author" | "generator" | "framework" | "publisher")
                {
                    return true;
                }
                if slim.head_meta_desc_keywords
                    && matches!(name.as_str(), "description" | "keywords")
                {
                    return true;
                }
                false
            }
            _ => false,
        }
    }

    /// One-off visibility classification for the snapshot flags; the live
    /// tracking afterwards is the visibility manager's job.
    fn element_visibility(&self, element: &web_sys::Element) -> (bool, f64) {
        let vis = &self.options.visibility;
        let el_rect = Rect::from(element.get_bounding_client_rect());
        if el_rect.area() <= 0.0 {
            return (false, 0.0);
        }
        let root_rect = match &vis.root {
            Some(root) => Rect::from(root.get_bounding_client_rect()),
            None => {
                let window = web_sys::window();
                let width = window
                    .as_ref()
                    .and_then(|w| w.inner_width().ok())
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.0);
                let height = window
                    .as_ref()
                    .and_then(|w| w.inner_height().ok())
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.0);
                Rect { top: 0.0, left: 0.0, width, height }
            }
        };
        let expanded = expand_by_margin(&root_rect, &parse_root_margin(&vis.root_margin));
        let ratio = el_rect.intersect(&expanded).area() / el_rect.area();
        let ratio = (ratio * 100.0).round() / 100.0;
        (is_style_visible(element) && ratio > vis.threshold, ratio)
    }
}

fn matches_class_or_selector(
    element: &web_sys::Element,
    class: &str,
    selector: Option<&str>,
) -> bool {
    if !class.is_empty() && element.class_list().contains(class) {
        return true;
    }
    selector.is_some_and(|sel| element.matches(sel).unwrap_or(false))
}

/// Detects shadow roots from older polyfills, which are plain objects whose
/// `toString` still reports `[object ShadowRoot]`.
pub fn is_shadow_root(value: &JsValue) -> bool {
    if value.is_instance_of::<web_sys::ShadowRoot>() {
        return true;
    }
    value
        .dyn_ref::<js_sys::Object>()
        .is_some_and(|obj| obj.to_string() == "[object ShadowRoot]")
}

/// Samples the canvas in 50-pixel chunks through the unpatched
/// `getImageData`; a canvas with any non-zero byte is not blank.
fn is_canvas_blank(canvas: &web_sys::HtmlCanvasElement) -> bool {
    let Ok(Some(ctx)) = canvas.get_context("2d") else {
        // A non-2d (GL) canvas can't be sampled this way; assume painted.
        return false;
    };
    let Ok(ctx) = ctx.dyn_into::<web_sys::CanvasRenderingContext2d>() else {
        return false;
    };
    let get_image_data = match js_sys::Reflect::get(&ctx, &"getImageData".into()) {
        Ok(f) => f,
        Err(_) => return true,
    };
    let original = js_sys::Reflect::get(&get_image_data, &ORIGINAL_METHOD_KEY.into())
        .ok()
        .filter(|v| v.is_function())
        .unwrap_or(get_image_data);
    let Ok(original) = original.dyn_into::<js_sys::Function>() else {
        return true;
    };

    const CHUNK: u32 = 50;
    let (width, height) = (canvas.width(), canvas.height());
    let mut x = 0;
    while x < width {
        let mut y = 0;
        while y < height {
            let args = js_sys::Array::of4(
                &JsValue::from_f64(f64::from(x)),
                &JsValue::from_f64(f64::from(y)),
                &JsValue::from_f64(f64::from(CHUNK.min(width - x))),
                &JsValue::from_f64(f64::from(CHUNK.min(height - y))),
            );
            let Ok(data) = original.apply(&ctx, &args) else {
                return true;
            };
            let Ok(image_data) = data.dyn_into::<web_sys::ImageData>() else {
                return true;
            };
            if image_data.data().0.iter().any(|byte| *byte != 0) {
                return false;
            }
            y += CHUNK;
        }
        x += CHUNK;
    }
    true
}

fn canvas_data_url(
    canvas: &web_sys::HtmlCanvasElement,
    options: &DataUrlOptions,
) -> Option<String> {
    let result = match options.quality {
        Some(quality) => canvas.to_data_url_with_type_and_encoder_options(
            &options.mime_type,
            &JsValue::from_f64(quality),
        ),
        None => canvas.to_data_url_with_type(&options.mime_type),
    };
    match result {
        Ok(url) => Some(url),
        Err(e) => {
            web_sys::console::warn_2(&"failed to read canvas contents".into(), &e);
            None
        }
    }
}

/// Draws a loaded `<img>` onto a scratch canvas to obtain a data url.
/// Images that are still loading, zero-sized, or CORS-tainted are skipped.
fn inline_image(
    doc: &web_sys::Document,
    img: &web_sys::HtmlImageElement,
    options: &DataUrlOptions,
) -> Option<String> {
    if !img.complete() || img.natural_width() == 0 {
        return None;
    }
    let canvas = doc
        .create_element("canvas")
        .ok()?
        .dyn_into::<web_sys::HtmlCanvasElement>()
        .ok()?;
    canvas.set_width(img.natural_width());
    canvas.set_height(img.natural_height());
    let ctx = canvas
        .get_context("2d")
        .ok()??
        .dyn_into::<web_sys::CanvasRenderingContext2d>()
        .ok()?;
    if let Err(e) = ctx.draw_image_with_html_image_element(img, 0.0, 0.0) {
        web_sys::console::warn_2(&"failed to inline image".into(), &e);
        return None;
    }
    canvas_data_url(&canvas, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slim_profiles() {
        let none = SlimDomOptions::none();
        assert!(!none.script && !none.head_favicon && !none.head_title_mutations);

        let common = SlimDomOptions::common();
        assert!(common.script && common.head_meta_social);
        assert!(!common.head_meta_authorship);
        assert!(!common.head_title_mutations);

        let all = SlimDomOptions::all();
        assert!(all.head_meta_authorship && all.head_meta_desc_keywords);
        assert!(all.head_title_mutations);
    }
}
