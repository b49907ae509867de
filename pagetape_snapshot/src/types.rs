// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

//! The serialized-node model.
//!
//! Every live node the serializer visits becomes one of the variants below,
//! tagged on the wire with the numeric `type` the replayer family agreed on:
//! Document=0, DocumentType=1, Element=2, Text=3, CDATA=4, Comment=5.

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize};

/// Stable identifier of a serialized node within one recording.
///
/// Ids are handed out by the [`Mirror`](crate::Mirror), start at 1 and only
/// grow. `0` is reserved for "detached".
pub type NodeId = i32;

/// Returned by id lookups for nodes the mirror has never seen.
pub const UNKNOWN_NODE: NodeId = -1;

/// Assigned to subtrees matching the ignore policy; such nodes never appear
/// in the stream.
pub const IGNORED_NODE: NodeId = -2;

/// An attribute value as it travels on the wire: a string, a number, or the
/// bare boolean `true` (for value-less attributes such as `checked`).
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Str(String),
    Num(f64),
    True,
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        Self::Num(value)
    }
}

impl Serialize for AttrValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Str(s) => serializer.serialize_str(s),
            Self::Num(n) => serializer.serialize_f64(*n),
            Self::True => serializer.serialize_bool(true),
        }
    }
}

impl<'de> Deserialize<'de> for AttrValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct Visitor;

        impl serde::de::Visitor<'_> for Visitor {
            type Value = AttrValue;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a string, a number or `true`")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<AttrValue, E> {
                Ok(AttrValue::Str(v.to_owned()))
            }

            fn visit_string<E: serde::de::Error>(self, v: String) -> Result<AttrValue, E> {
                Ok(AttrValue::Str(v))
            }

            fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<AttrValue, E> {
                Ok(AttrValue::Num(v))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<AttrValue, E> {
                Ok(AttrValue::Num(v as f64))
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<AttrValue, E> {
                Ok(AttrValue::Num(v as f64))
            }

            fn visit_bool<E: serde::de::Error>(self, v: bool) -> Result<AttrValue, E> {
                if v {
                    Ok(AttrValue::True)
                } else {
                    Err(E::custom("`false` is not a valid attribute value"))
                }
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}

/// An ordered `name → value` map backed by a `Vec`.
///
/// Attribute counts are small, so linear search beats hashing here, and the
/// vec keeps the serialization order equal to the live DOM's attribute order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttrMap(Vec<(String, AttrValue)>);

impl AttrMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `value` under `name`, replacing in place when the name is
    /// already present (the original position is kept).
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<AttrValue>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter().position(|(k, _)| *k == name) {
            Some(idx) => self.0[idx].1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn remove(&mut self, name: &str) -> Option<AttrValue> {
        let idx = self.0.iter().position(|(k, _)| k == name)?;
        Some(self.0.remove(idx).1)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<AttrValue>> FromIterator<(K, V)> for AttrMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl Serialize for AttrMap {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for AttrMap {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct Visitor;

        impl<'de> serde::de::Visitor<'de> for Visitor {
            type Value = AttrMap;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a map of attribute values")
            }

            fn visit_map<A: serde::de::MapAccess<'de>>(
                self,
                mut access: A,
            ) -> Result<AttrMap, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((k, v)) = access.next_entry::<String, AttrValue>()? {
                    entries.push((k, v));
                }
                Ok(AttrMap(entries))
            }
        }

        deserializer.deserialize_map(Visitor)
    }
}

/// A serialized `Document`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentNode {
    pub id: NodeId,
    pub compat_mode: String,
    pub child_nodes: Vec<SerializedNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_id: Option<NodeId>,
}

/// A serialized doctype declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentTypeNode {
    pub id: NodeId,
    pub name: String,
    pub public_id: String,
    pub system_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_id: Option<NodeId>,
}

/// A serialized element with its attributes, children, addressing strings
/// and the visibility/interactivity classification at serialization time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementNode {
    pub id: NodeId,
    pub tag_name: String,
    pub attributes: AttrMap,
    pub child_nodes: Vec<SerializedNode>,
    #[serde(rename = "isSVG", default, skip_serializing_if = "Option::is_none")]
    pub is_svg: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub need_block: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub need_mask: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_shadow_host: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_shadow: Option<bool>,
    pub xpath: String,
    pub selector: String,
    pub is_visible: bool,
    pub is_interactive: bool,
}

/// A serialized text, comment or CDATA node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextNode {
    pub id: NodeId,
    pub text_content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_style: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_id: Option<NodeId>,
}

/// A node of the serialized tree, tagged on the wire by its numeric `type`.
#[derive(Debug, Clone, PartialEq)]
pub enum SerializedNode {
    Document(DocumentNode),
    DocumentType(DocumentTypeNode),
    Element(ElementNode),
    Text(TextNode),
    Cdata(TextNode),
    Comment(TextNode),
}

impl SerializedNode {
    pub fn id(&self) -> NodeId {
        match self {
            Self::Document(n) => n.id,
            Self::DocumentType(n) => n.id,
            Self::Element(n) => n.id,
            Self::Text(n) | Self::Cdata(n) | Self::Comment(n) => n.id,
        }
    }

    pub fn set_id(&mut self, id: NodeId) {
        match self {
            Self::Document(n) => n.id = id,
            Self::DocumentType(n) => n.id = id,
            Self::Element(n) => n.id = id,
            Self::Text(n) | Self::Cdata(n) | Self::Comment(n) => n.id = id,
        }
    }

    pub fn root_id(&self) -> Option<NodeId> {
        match self {
            Self::Document(n) => n.root_id,
            Self::DocumentType(n) => n.root_id,
            Self::Element(n) => n.root_id,
            Self::Text(n) | Self::Cdata(n) | Self::Comment(n) => n.root_id,
        }
    }

    pub fn set_root_id(&mut self, root_id: NodeId) {
        let slot = match self {
            Self::Document(n) => &mut n.root_id,
            Self::DocumentType(n) => &mut n.root_id,
            Self::Element(n) => &mut n.root_id,
            Self::Text(n) | Self::Cdata(n) | Self::Comment(n) => &mut n.root_id,
        };
        *slot = Some(root_id);
    }

    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            Self::Element(n) => Some(n),
            _ => None,
        }
    }

    pub fn children(&self) -> &[SerializedNode] {
        match self {
            Self::Document(n) => &n.child_nodes,
            Self::Element(n) => &n.child_nodes,
            _ => &[],
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<SerializedNode>> {
        match self {
            Self::Document(n) => Some(&mut n.child_nodes),
            Self::Element(n) => Some(&mut n.child_nodes),
            _ => None,
        }
    }

    /// The wire discriminant of this variant.
    fn wire_type(&self) -> u8 {
        match self {
            Self::Document(_) => 0,
            Self::DocumentType(_) => 1,
            Self::Element(_) => 2,
            Self::Text(_) => 3,
            Self::Cdata(_) => 4,
            Self::Comment(_) => 5,
        }
    }
}

impl Serialize for SerializedNode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Tagged<'a, T> {
            #[serde(rename = "type")]
            ty: u8,
            #[serde(flatten)]
            inner: &'a T,
        }

        let ty = self.wire_type();
        match self {
            Self::Document(n) => Tagged { ty, inner: n }.serialize(serializer),
            Self::DocumentType(n) => Tagged { ty, inner: n }.serialize(serializer),
            Self::Element(n) => Tagged { ty, inner: n }.serialize(serializer),
            Self::Text(n) | Self::Cdata(n) | Self::Comment(n) => {
                Tagged { ty, inner: n }.serialize(serializer)
            }
        }
    }
}

impl<'de> Deserialize<'de> for SerializedNode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let ty = value
            .get("type")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| D::Error::custom("serialized node without a numeric `type`"))?;
        let node = match ty {
            0 => Self::Document(serde_json::from_value(value).map_err(D::Error::custom)?),
            1 => Self::DocumentType(serde_json::from_value(value).map_err(D::Error::custom)?),
            2 => Self::Element(serde_json::from_value(value).map_err(D::Error::custom)?),
            3 => Self::Text(serde_json::from_value(value).map_err(D::Error::custom)?),
            4 => Self::Cdata(serde_json::from_value(value).map_err(D::Error::custom)?),
            5 => Self::Comment(serde_json::from_value(value).map_err(D::Error::custom)?),
            other => return Err(D::Error::custom(format!("unknown node type {other}"))),
        };
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(id: NodeId, content: &str) -> SerializedNode {
        SerializedNode::Text(TextNode {
            id,
            text_content: content.into(),
            is_style: None,
            root_id: None,
        })
    }

    #[test]
    fn attr_map_keeps_insertion_order() {
        let mut map = AttrMap::new();
        map.insert("class", "a b");
        map.insert("id", "x");
        map.insert("class", "c");
        let keys: Vec<_> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["class", "id"]);
        assert_eq!(map.get("class"), Some(&AttrValue::Str("c".into())));
    }

    #[test]
    fn element_wire_shape() {
        let el = SerializedNode::Element(ElementNode {
            id: 7,
            tag_name: "input".into(),
            attributes: [("type", AttrValue::Str("checkbox".into())), ("checked", AttrValue::True)]
                .into_iter()
                .collect(),
            child_nodes: vec![],
            is_svg: None,
            need_block: None,
            need_mask: None,
            root_id: None,
            is_shadow_host: None,
            is_shadow: None,
            xpath: "/html[1]/body[1]/input[1]".into(),
            selector: "input".into(),
            is_visible: true,
            is_interactive: true,
        });
        let json = serde_json::to_value(&el).unwrap();
        assert_eq!(json["type"], 2);
        assert_eq!(json["tagName"], "input");
        assert_eq!(json["attributes"]["checked"], true);
        assert_eq!(json["isVisible"], true);
        assert!(json.get("isSVG").is_none());
    }

    #[test]
    fn text_and_comment_disambiguate_by_type() {
        let json = r#"{"type":5,"textContent":"note","id":3}"#;
        let node: SerializedNode = serde_json::from_str(json).unwrap();
        assert!(matches!(node, SerializedNode::Comment(_)));

        let json = r#"{"type":3,"textContent":"hi","id":4}"#;
        let node: SerializedNode = serde_json::from_str(json).unwrap();
        assert!(matches!(node, SerializedNode::Text(_)));
    }

    #[test]
    fn round_trips_a_small_tree() {
        let tree = SerializedNode::Document(DocumentNode {
            id: 1,
            compat_mode: "CSS1Compat".into(),
            child_nodes: vec![
                SerializedNode::DocumentType(DocumentTypeNode {
                    id: 2,
                    name: "html".into(),
                    public_id: String::new(),
                    system_id: String::new(),
                    root_id: None,
                }),
                SerializedNode::Element(ElementNode {
                    id: 3,
                    tag_name: "html".into(),
                    attributes: AttrMap::new(),
                    child_nodes: vec![text(4, "hello")],
                    is_svg: None,
                    need_block: None,
                    need_mask: None,
                    root_id: None,
                    is_shadow_host: None,
                    is_shadow: None,
                    xpath: "/html[1]".into(),
                    selector: "html".into(),
                    is_visible: true,
                    is_interactive: false,
                }),
            ],
            root_id: None,
        });
        let json = serde_json::to_string(&tree).unwrap();
        let back: SerializedNode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn attr_value_number_round_trip() {
        let json = r#"{"type":2,"tagName":"div","attributes":{"rr_width":100.5},"childNodes":[],"xpath":"","selector":"","isVisible":false,"isInteractive":false,"id":9}"#;
        let node: SerializedNode = serde_json::from_str(json).unwrap();
        let el = node.as_element().unwrap();
        assert_eq!(el.attributes.get("rr_width"), Some(&AttrValue::Num(100.5)));
    }
}
