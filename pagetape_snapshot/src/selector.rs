// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

//! XPath and CSS-selector derivation.
//!
//! Both strings address an element in the live tree *at serialization time*;
//! they are recorded once and never re-derived on mutation.

use wasm_bindgen::JsCast;

/// An absolute-ish XPath for `element`: the `//*[@id="…"]` shortcut when an
/// id is present, otherwise a chain of lowercased tags with 1-based
/// positional indices among same-tag siblings.
pub fn xpath_of(element: &web_sys::Element) -> String {
    if !element.id().is_empty() {
        return format!("//*[@id=\"{}\"]", element.id());
    }
    let mut segments = Vec::new();
    let mut current = Some(element.clone());
    while let Some(el) = current {
        let tag = el.tag_name().to_lowercase();
        segments.push(format!("{tag}[{}]", same_tag_index(&el)));
        current = el.parent_element();
    }
    segments.reverse();
    format!("/{}", segments.join("/"))
}

/// 1-based position of `element` among its same-tag element siblings.
fn same_tag_index(element: &web_sys::Element) -> usize {
    let tag = element.tag_name();
    let mut index = 1;
    let mut sibling = element.previous_element_sibling();
    while let Some(s) = sibling {
        if s.tag_name() == tag {
            index += 1;
        }
        sibling = s.previous_element_sibling();
    }
    index
}

/// A CSS selector for `element`.
///
/// Preference order: `#id`; a tag qualified with classes and `data-*`
/// attributes, if that is unique in the document; otherwise a
/// `:nth-of-type` chain up to the root, which always is.
pub fn css_selector_of(element: &web_sys::Element) -> String {
    if !element.id().is_empty() {
        return format!("#{}", element.id());
    }
    let qualified = qualified_selector(element);
    if let Some(doc) = element.owner_document() {
        if is_unique(&doc, &qualified, element) {
            return qualified;
        }
    }
    positional_chain(element)
}

fn qualified_selector(element: &web_sys::Element) -> String {
    let mut selector = element.tag_name().to_lowercase();
    let class_list = element.class_list();
    for i in 0..class_list.length() {
        if let Some(class) = class_list.item(i) {
            if !class.is_empty() && is_css_identifier(&class) {
                selector.push('.');
                selector.push_str(&class);
            }
        }
    }
    let attributes = element.attributes();
    for i in 0..attributes.length() {
        let Some(attr) = attributes.item(i) else {
            continue;
        };
        let name = attr.name();
        if name.starts_with("data-") && !attr.value().contains(['"', '\\']) {
            selector.push_str(&format!("[{name}=\"{}\"]", attr.value()));
        }
    }
    selector
}

/// Whether `selector` matches exactly `element` and nothing else.
fn is_unique(doc: &web_sys::Document, selector: &str, element: &web_sys::Element) -> bool {
    match doc.query_selector_all(selector) {
        Ok(list) => {
            list.length() == 1
                && list
                    .get(0)
                    .and_then(|n| n.dyn_into::<web_sys::Element>().ok())
                    .is_some_and(|el| el.is_same_node(Some(element)))
        }
        Err(_) => false,
    }
}

/// `html > body > div:nth-of-type(2) > span:nth-of-type(1)` style fallback.
fn positional_chain(element: &web_sys::Element) -> String {
    let mut segments = Vec::new();
    let mut current = Some(element.clone());
    while let Some(el) = current {
        let tag = el.tag_name().to_lowercase();
        if tag == "html" {
            segments.push(tag);
        } else {
            segments.push(format!("{tag}:nth-of-type({})", same_tag_index(&el)));
        }
        current = el.parent_element();
    }
    segments.reverse();
    segments.join(" > ")
}

/// Good-enough check that a class name can be written into a selector
/// without escaping.
fn is_css_identifier(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with(|c: char| c.is_ascii_digit())
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn css_identifier_rules() {
        assert!(is_css_identifier("btn-primary"));
        assert!(is_css_identifier("_private"));
        assert!(!is_css_identifier("2col"));
        assert!(!is_css_identifier("a b"));
        assert!(!is_css_identifier(""));
    }
}
