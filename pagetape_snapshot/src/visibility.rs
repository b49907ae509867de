// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

//! Per-element visibility and interactivity classification.
//!
//! Visibility is computed from bounding-rect intersection with a root (the
//! viewport by default, expandable by a css-style `rootMargin`) combined
//! with the computed style. The recorder's visibility manager runs this on
//! every animation frame and turns the deltas into incremental events.

use wasm_bindgen::JsCast;

/// A plain rectangle; everything the evaluator needs from a `DOMRect`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// The overlapping region of two rectangles; zero-sized when disjoint.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        Rect {
            top,
            left,
            width: (right - left).max(0.0),
            height: (bottom - top).max(0.0),
        }
    }
}

impl From<web_sys::DomRect> for Rect {
    fn from(rect: web_sys::DomRect) -> Self {
        Self {
            top: rect.top(),
            left: rect.left(),
            width: rect.width(),
            height: rect.height(),
        }
    }
}

/// One margin component, either pixels or a percentage of the root's size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarginValue {
    Px(f64),
    Percent(f64),
}

impl MarginValue {
    fn resolve(&self, reference: f64) -> f64 {
        match self {
            Self::Px(v) => *v,
            Self::Percent(p) => reference * p / 100.0,
        }
    }
}

/// Parses a css margin shorthand (`"10px"`, `"10px 5%"`, …) in the usual
/// top/right/bottom/left expansion order. Malformed components read as 0.
pub fn parse_root_margin(margin: &str) -> [MarginValue; 4] {
    let parts: Vec<MarginValue> = margin
        .split_whitespace()
        .map(|part| {
            if let Some(pct) = part.strip_suffix('%') {
                MarginValue::Percent(pct.parse().unwrap_or(0.0))
            } else {
                let px = part.strip_suffix("px").unwrap_or(part);
                MarginValue::Px(px.parse().unwrap_or(0.0))
            }
        })
        .collect();
    match parts.as_slice() {
        [] => [MarginValue::Px(0.0); 4],
        [all] => [*all; 4],
        [tb, lr] => [*tb, *lr, *tb, *lr],
        [t, lr, b] => [*t, *lr, *b, *lr],
        [t, r, b, l, ..] => [*t, *r, *b, *l],
    }
}

/// Expands `root` by a parsed margin (positive values grow the rect).
pub fn expand_by_margin(root: &Rect, margin: &[MarginValue; 4]) -> Rect {
    let top = margin[0].resolve(root.height);
    let right = margin[1].resolve(root.width);
    let bottom = margin[2].resolve(root.height);
    let left = margin[3].resolve(root.width);
    Rect {
        top: root.top - top,
        left: root.left - left,
        width: root.width + left + right,
        height: root.height + top + bottom,
    }
}

/// Options steering the evaluator, mirroring the recorder's
/// `sampling.visibility` block.
#[derive(Clone)]
pub struct VisibilityOptions {
    /// Intersection root; `None` means the viewport.
    pub root: Option<web_sys::Element>,
    /// Minimum intersection ratio for an element to count as visible.
    pub threshold: f64,
    /// Ratio delta below which a change is not reported.
    pub sensitivity: f64,
    /// Margin expanding the root rect, css shorthand syntax.
    pub root_margin: String,
}

impl Default for VisibilityOptions {
    fn default() -> Self {
        Self {
            root: None,
            threshold: 0.1,
            sensitivity: 0.25,
            root_margin: String::new(),
        }
    }
}

/// The evaluator's per-element record.
#[derive(Debug, Clone)]
pub struct VisibilityEntry {
    pub target: web_sys::Element,
    pub is_visible: bool,
    pub is_style_visible: bool,
    pub intersection_ratio: f64,
    pub intersection_rect: Rect,
    /// The previous pass's `(is_visible, ratio)`, when there was one.
    pub old_value: Option<(bool, f64)>,
}

impl VisibilityEntry {
    /// Whether this entry counts as changed against its `old_value`:
    /// either the visibility flipped, or the ratio moved by more than
    /// `sensitivity`.
    pub fn changed(&self, sensitivity: f64) -> bool {
        match self.old_value {
            None => true,
            Some((was_visible, old_ratio)) => {
                was_visible != self.is_visible
                    || (self.intersection_ratio - old_ratio).abs() > sensitivity
            }
        }
    }
}

/// Keyed element→entry storage.
///
/// Elements are JS objects, so the key side lives in a `js_sys::Map`
/// (element → index) over a dense entry vec; lookups stay O(1) without
/// hashing wrappers.
#[derive(Default)]
pub struct VisibilityMap {
    index: js_sys::Map,
    entries: Vec<VisibilityEntry>,
}

impl VisibilityMap {
    pub fn new() -> Self {
        Self {
            index: js_sys::Map::new(),
            entries: Vec::new(),
        }
    }

    pub fn get(&self, element: &web_sys::Element) -> Option<&VisibilityEntry> {
        let idx = self.index.get(element).as_f64()? as usize;
        self.entries.get(idx)
    }

    pub fn insert(&mut self, entry: VisibilityEntry) {
        let existing = self.index.get(&entry.target).as_f64();
        match existing {
            Some(idx) => self.entries[idx as usize] = entry,
            None => {
                self.index.set(
                    &entry.target,
                    &wasm_bindgen::JsValue::from_f64(self.entries.len() as f64),
                );
                self.entries.push(entry);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &VisibilityEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Whether the computed style lets the element paint at all:
/// `display ≠ none ∧ visibility ≠ hidden ∧ opacity > 0`.
pub fn is_style_visible(element: &web_sys::Element) -> bool {
    let Some(window) = web_sys::window() else {
        return false;
    };
    let Ok(Some(style)) = window.get_computed_style(element) else {
        return false;
    };
    let prop = |name: &str| style.get_property_value(name).unwrap_or_default();
    if prop("display") == "none" || prop("visibility") == "hidden" {
        return false;
    }
    let opacity = prop("opacity");
    opacity.is_empty() || opacity.parse::<f64>().map_or(true, |o| o > 0.0)
}

/// The viewport rect, `(0, 0, innerWidth, innerHeight)`.
fn viewport_rect() -> Rect {
    let Some(window) = web_sys::window() else {
        return Rect::default();
    };
    let width = window.inner_width().ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
    let height = window.inner_height().ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
    Rect {
        top: 0.0,
        left: 0.0,
        width,
        height,
    }
}

/// Runs one evaluation pass over `elements`, carrying forward `previous`
/// state for change detection. Returns a fresh map with one entry per input
/// element.
pub fn evaluate_visibility(
    elements: &[web_sys::Element],
    previous: &VisibilityMap,
    options: &VisibilityOptions,
) -> VisibilityMap {
    let margin = parse_root_margin(&options.root_margin);
    let root_rect = options
        .root
        .as_ref()
        .map(|el| Rect::from(el.get_bounding_client_rect()))
        .unwrap_or_else(viewport_rect);
    let expanded_root = expand_by_margin(&root_rect, &margin);

    let mut next = VisibilityMap::new();
    for element in elements {
        let el_rect = Rect::from(element.get_bounding_client_rect());
        let intersection_rect = el_rect.intersect(&expanded_root);
        let ratio = if el_rect.area() > 0.0 {
            round2(intersection_rect.area() / el_rect.area())
        } else {
            0.0
        };
        let style_visible = is_style_visible(element);
        let is_visible = style_visible && ratio > options.threshold;
        let old_value = previous
            .get(element)
            .map(|e| (e.is_visible, e.intersection_ratio));
        next.insert(VisibilityEntry {
            target: element.clone(),
            is_visible,
            is_style_visible: style_visible,
            intersection_ratio: ratio,
            intersection_rect,
            old_value,
        });
    }
    next
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Tags that are interactive by nature.
const INTERACTIVE_TAGS: &[&str] = &[
    "a", "button", "input", "select", "textarea", "label", "details", "summary", "dialog",
    "video", "audio",
];

/// ARIA roles that imply interactivity.
const INTERACTIVE_ROLES: &[&str] = &["button", "link", "checkbox", "switch", "menuitem"];

/// Classifies an element as capable of receiving user input.
///
/// `known_listeners` is the recorder's registry of elements observed to
/// register a listener for an interactive event type; membership is an
/// over-approximation that never decays during a recording.
pub fn is_interactive_element(
    element: &web_sys::Element,
    known_listeners: Option<&js_sys::WeakSet>,
) -> bool {
    let tag = element.tag_name().to_lowercase();
    if INTERACTIVE_TAGS.contains(&tag.as_str()) {
        if tag == "button" {
            return !element.has_attribute("disabled");
        }
        if tag == "a" {
            // Anchors without an href are plain text carriers; still
            // interactive when something listens on them.
            if element.has_attribute("href") {
                return true;
            }
        } else {
            return true;
        }
    }
    if let Some(tabindex) = element.get_attribute("tabindex") {
        if tabindex.trim().parse::<i32>().is_ok_and(|t| t != -1) {
            return true;
        }
    }
    if let Some(role) = element.get_attribute("role") {
        if INTERACTIVE_ROLES.contains(&role.trim().to_lowercase().as_str()) {
            return true;
        }
    }
    known_listeners.is_some_and(|set| set.has(element))
}

/// Interactivity for non-element nodes propagates from the parent element.
pub fn is_interactive_node(
    node: &web_sys::Node,
    known_listeners: Option<&js_sys::WeakSet>,
) -> bool {
    if let Some(element) = node.dyn_ref::<web_sys::Element>() {
        return is_interactive_element(element, known_listeners);
    }
    node.parent_element()
        .is_some_and(|parent| is_interactive_element(&parent, known_listeners))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn margin_shorthand_expansion() {
        assert_eq!(parse_root_margin(""), [MarginValue::Px(0.0); 4]);
        assert_eq!(parse_root_margin("10px"), [MarginValue::Px(10.0); 4]);
        assert_eq!(
            parse_root_margin("10px 5%"),
            [
                MarginValue::Px(10.0),
                MarginValue::Percent(5.0),
                MarginValue::Px(10.0),
                MarginValue::Percent(5.0),
            ]
        );
        assert_eq!(
            parse_root_margin("1px 2px 3px 4px"),
            [
                MarginValue::Px(1.0),
                MarginValue::Px(2.0),
                MarginValue::Px(3.0),
                MarginValue::Px(4.0),
            ]
        );
    }

    #[test]
    fn percent_margin_resolves_against_root_size() {
        let root = Rect { top: 0.0, left: 0.0, width: 1000.0, height: 500.0 };
        let expanded = expand_by_margin(&root, &parse_root_margin("10% 20%"));
        assert_eq!(expanded.top, -50.0);
        assert_eq!(expanded.left, -200.0);
        assert_eq!(expanded.width, 1400.0);
        assert_eq!(expanded.height, 600.0);
    }

    #[test]
    fn disjoint_rects_intersect_to_zero() {
        let a = Rect { top: 0.0, left: 0.0, width: 10.0, height: 10.0 };
        let b = Rect { top: 20.0, left: 20.0, width: 10.0, height: 10.0 };
        let i = a.intersect(&b);
        assert_eq!(i.area(), 0.0);
    }

    #[test]
    fn half_overlap_ratio() {
        let el = Rect { top: 0.0, left: 0.0, width: 10.0, height: 10.0 };
        let root = Rect { top: 0.0, left: 5.0, width: 100.0, height: 100.0 };
        let i = el.intersect(&root);
        assert_eq!(round2(i.area() / el.area()), 0.5);
    }

    #[test]
    fn entry_change_detection() {
        let entry = |visible, ratio, old| VisibilityEntry {
            target: wasm_bindgen::JsCast::unchecked_into(wasm_bindgen::JsValue::NULL),
            is_visible: visible,
            is_style_visible: visible,
            intersection_ratio: ratio,
            intersection_rect: Rect::default(),
            old_value: old,
        };
        assert!(entry(true, 1.0, None).changed(0.25));
        assert!(entry(true, 1.0, Some((false, 0.0))).changed(0.25));
        assert!(entry(true, 1.0, Some((true, 0.5))).changed(0.25));
        assert!(!entry(true, 0.9, Some((true, 1.0))).changed(0.25));
    }
}
