// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

//! The typed event taxonomy.
//!
//! Everything the recorder emits is an [`EventWithTime`]: a discriminated
//! union keyed by a numeric `type`, with incremental snapshots discriminated
//! further by a numeric `source`. The numeric assignments are normative; a
//! stream produced here replays on any player of the family.

use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use pagetape_snapshot::{AttrValue, NodeId, SerializedNode};

/// Top-level event discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    DomContentLoaded = 0,
    Load = 1,
    FullSnapshot = 2,
    IncrementalSnapshot = 3,
    Meta = 4,
    Custom = 5,
    Plugin = 6,
}

/// Discriminant of [`IncrementalData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementalSource {
    Mutation = 0,
    MouseMove = 1,
    MouseInteraction = 2,
    Scroll = 3,
    ViewportResize = 4,
    Input = 5,
    TouchMove = 6,
    MediaInteraction = 7,
    StyleSheetRule = 8,
    CanvasMutation = 9,
    Font = 10,
    Log = 11,
    Drag = 12,
    StyleDeclaration = 13,
    Selection = 14,
    AdoptedStyleSheet = 15,
    CustomElement = 16,
    VisibilityMutation = 17,
}

/// Pointer interaction kinds, `data.type` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseInteractionKind {
    MouseUp = 0,
    MouseDown = 1,
    Click = 2,
    ContextMenu = 3,
    DblClick = 4,
    Focus = 5,
    Blur = 6,
    TouchStart = 7,
    TouchEnd = 9,
    TouchCancel = 10,
}

/// Media interaction kinds, `data.type` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaInteractionKind {
    Play = 0,
    Pause = 1,
    Seeked = 2,
    VolumeChange = 3,
    RateChange = 4,
}

macro_rules! numeric_serde {
    ($ty:ident { $($variant:ident = $num:literal),+ $(,)? }) => {
        impl Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_u8(match self {
                    $(Self::$variant => $num,)+
                })
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                match u8::deserialize(deserializer)? {
                    $($num => Ok(Self::$variant),)+
                    other => Err(D::Error::custom(format!(
                        concat!("invalid ", stringify!($ty), " discriminant {}"),
                        other
                    ))),
                }
            }
        }
    };
}

numeric_serde!(EventType {
    DomContentLoaded = 0,
    Load = 1,
    FullSnapshot = 2,
    IncrementalSnapshot = 3,
    Meta = 4,
    Custom = 5,
    Plugin = 6,
});

numeric_serde!(IncrementalSource {
    Mutation = 0,
    MouseMove = 1,
    MouseInteraction = 2,
    Scroll = 3,
    ViewportResize = 4,
    Input = 5,
    TouchMove = 6,
    MediaInteraction = 7,
    StyleSheetRule = 8,
    CanvasMutation = 9,
    Font = 10,
    Log = 11,
    Drag = 12,
    StyleDeclaration = 13,
    Selection = 14,
    AdoptedStyleSheet = 15,
    CustomElement = 16,
    VisibilityMutation = 17,
});

numeric_serde!(MouseInteractionKind {
    MouseUp = 0,
    MouseDown = 1,
    Click = 2,
    ContextMenu = 3,
    DblClick = 4,
    Focus = 5,
    Blur = 6,
    TouchStart = 7,
    TouchEnd = 9,
    TouchCancel = 10,
});

numeric_serde!(MediaInteractionKind {
    Play = 0,
    Pause = 1,
    Seeked = 2,
    VolumeChange = 3,
    RateChange = 4,
});

/// `data` of a [`EventType::Meta`] event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaData {
    pub href: String,
    pub width: f64,
    pub height: f64,
}

/// `data` of a [`EventType::FullSnapshot`] event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullSnapshotData {
    pub node: SerializedNode,
    pub initial_offset: InitialOffset,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitialOffset {
    pub top: f64,
    pub left: f64,
}

/// `data` of a [`EventType::Custom`] event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomData {
    pub tag: String,
    pub payload: Value,
}

/// `data` of a [`EventType::Plugin`] event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginData {
    pub plugin: String,
    pub payload: Value,
}

/// A text node's content changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextMutation {
    pub id: NodeId,
    pub value: Option<String>,
}

/// An element's attributes changed; `None` values are removals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeMutation {
    pub id: NodeId,
    pub attributes: std::collections::BTreeMap<String, Option<AttrValue>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedNodeMutation {
    pub parent_id: NodeId,
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_shadow: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddedNodeMutation {
    pub parent_id: NodeId,
    /// Id of the next sibling, `null` when appended last.
    pub next_id: Option<NodeId>,
    pub node: SerializedNode,
}

/// One coalesced frame of DOM mutations.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationData {
    pub texts: Vec<TextMutation>,
    pub attributes: Vec<AttributeMutation>,
    pub removes: Vec<RemovedNodeMutation>,
    pub adds: Vec<AddedNodeMutation>,
    /// Set when the adds attach an iframe's inner document; counted as a
    /// full snapshot by the checkout policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_attach_iframe: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MousePosition {
    pub x: f64,
    pub y: f64,
    pub id: NodeId,
    pub time_offset: f64,
}

/// A batch of pointer positions (`MouseMove`, `TouchMove` and `Drag`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MousePositionsData {
    pub positions: Vec<MousePosition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MouseInteractionData {
    #[serde(rename = "type")]
    pub kind: MouseInteractionKind,
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollData {
    pub id: NodeId,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportResizeData {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputData {
    pub id: NodeId,
    pub text: String,
    pub is_checked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_triggered: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInteractionData {
    #[serde(rename = "type")]
    pub kind: MediaInteractionKind,
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playback_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleSheetAddRule {
    pub rule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<Vec<u32>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleSheetDeleteRule {
    pub index: Vec<u32>,
}

/// `insertRule`/`deleteRule` on a tracked stylesheet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleSheetRuleData {
    /// Mirror id of the owning `<style>`/`<link>` element, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,
    /// Id in the constructed-stylesheet space, for adopted sheets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub adds: Vec<StyleSheetAddRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removes: Vec<StyleSheetDeleteRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleDeclarationSet {
    pub property: String,
    pub value: Option<String>,
    pub priority: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleDeclarationRemove {
    pub property: String,
}

/// `setProperty`/`removeProperty` on a rule's declaration block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleDeclarationData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<StyleDeclarationSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove: Option<StyleDeclarationRemove>,
    /// Path of rule indices from the sheet root to the declaration block.
    pub index: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasCommand {
    pub property: String,
    pub args: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setter: Option<bool>,
}

/// Canvas context kind on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanvasContextKind {
    TwoD = 0,
    WebGl = 1,
    WebGl2 = 2,
}

numeric_serde!(CanvasContextKind {
    TwoD = 0,
    WebGl = 1,
    WebGl2 = 2,
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasMutationData {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: CanvasContextKind,
    pub commands: Vec<CanvasCommand>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontDescriptors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stretch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unicode_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_settings: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontData {
    pub family: String,
    pub font_source: String,
    pub buffer: bool,
    pub descriptors: FontDescriptors,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogData {
    pub level: String,
    pub trace: Vec<String>,
    pub payload: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRange {
    pub start: NodeId,
    pub start_offset: u32,
    pub end: NodeId,
    pub end_offset: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionData {
    pub ranges: Vec<SelectionRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdoptedStyleSheetStyle {
    pub style_id: u32,
    pub rules: Vec<StyleSheetAddRule>,
}

/// The full adopted-stylesheet list of a document or shadow root, re-emitted
/// on every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdoptedStyleSheetData {
    /// Mirror id of the owning document or shadow host.
    pub id: NodeId,
    pub style_ids: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub styles: Vec<AdoptedStyleSheetStyle>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomElementDefine {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomElementData {
    pub define: CustomElementDefine,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityMutationEntry {
    pub id: NodeId,
    pub is_visible: bool,
    pub ratio: f64,
}

/// One rAF batch of visibility changes; last writer wins per element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibilityMutationData {
    pub mutations: Vec<VisibilityMutationEntry>,
}

/// `data` of an incremental snapshot, discriminated by `source`.
#[derive(Debug, Clone, PartialEq)]
pub enum IncrementalData {
    Mutation(MutationData),
    MouseMove(MousePositionsData),
    MouseInteraction(MouseInteractionData),
    Scroll(ScrollData),
    ViewportResize(ViewportResizeData),
    Input(InputData),
    TouchMove(MousePositionsData),
    MediaInteraction(MediaInteractionData),
    StyleSheetRule(StyleSheetRuleData),
    CanvasMutation(CanvasMutationData),
    Font(FontData),
    Log(LogData),
    Drag(MousePositionsData),
    StyleDeclaration(StyleDeclarationData),
    Selection(SelectionData),
    AdoptedStyleSheet(AdoptedStyleSheetData),
    CustomElement(CustomElementData),
    VisibilityMutation(VisibilityMutationData),
}

impl IncrementalData {
    pub fn source(&self) -> IncrementalSource {
        match self {
            Self::Mutation(_) => IncrementalSource::Mutation,
            Self::MouseMove(_) => IncrementalSource::MouseMove,
            Self::MouseInteraction(_) => IncrementalSource::MouseInteraction,
            Self::Scroll(_) => IncrementalSource::Scroll,
            Self::ViewportResize(_) => IncrementalSource::ViewportResize,
            Self::Input(_) => IncrementalSource::Input,
            Self::TouchMove(_) => IncrementalSource::TouchMove,
            Self::MediaInteraction(_) => IncrementalSource::MediaInteraction,
            Self::StyleSheetRule(_) => IncrementalSource::StyleSheetRule,
            Self::CanvasMutation(_) => IncrementalSource::CanvasMutation,
            Self::Font(_) => IncrementalSource::Font,
            Self::Log(_) => IncrementalSource::Log,
            Self::Drag(_) => IncrementalSource::Drag,
            Self::StyleDeclaration(_) => IncrementalSource::StyleDeclaration,
            Self::Selection(_) => IncrementalSource::Selection,
            Self::AdoptedStyleSheet(_) => IncrementalSource::AdoptedStyleSheet,
            Self::CustomElement(_) => IncrementalSource::CustomElement,
            Self::VisibilityMutation(_) => IncrementalSource::VisibilityMutation,
        }
    }

    fn payload_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Mutation(d) => serde_json::to_value(d),
            Self::MouseMove(d) | Self::TouchMove(d) | Self::Drag(d) => serde_json::to_value(d),
            Self::MouseInteraction(d) => serde_json::to_value(d),
            Self::Scroll(d) => serde_json::to_value(d),
            Self::ViewportResize(d) => serde_json::to_value(d),
            Self::Input(d) => serde_json::to_value(d),
            Self::MediaInteraction(d) => serde_json::to_value(d),
            Self::StyleSheetRule(d) => serde_json::to_value(d),
            Self::CanvasMutation(d) => serde_json::to_value(d),
            Self::Font(d) => serde_json::to_value(d),
            Self::Log(d) => serde_json::to_value(d),
            Self::StyleDeclaration(d) => serde_json::to_value(d),
            Self::Selection(d) => serde_json::to_value(d),
            Self::AdoptedStyleSheet(d) => serde_json::to_value(d),
            Self::CustomElement(d) => serde_json::to_value(d),
            Self::VisibilityMutation(d) => serde_json::to_value(d),
        }
    }

    fn from_parts(source: IncrementalSource, payload: Value) -> Result<Self, serde_json::Error> {
        Ok(match source {
            IncrementalSource::Mutation => Self::Mutation(serde_json::from_value(payload)?),
            IncrementalSource::MouseMove => Self::MouseMove(serde_json::from_value(payload)?),
            IncrementalSource::MouseInteraction => {
                Self::MouseInteraction(serde_json::from_value(payload)?)
            }
            IncrementalSource::Scroll => Self::Scroll(serde_json::from_value(payload)?),
            IncrementalSource::ViewportResize => {
                Self::ViewportResize(serde_json::from_value(payload)?)
            }
            IncrementalSource::Input => Self::Input(serde_json::from_value(payload)?),
            IncrementalSource::TouchMove => Self::TouchMove(serde_json::from_value(payload)?),
            IncrementalSource::MediaInteraction => {
                Self::MediaInteraction(serde_json::from_value(payload)?)
            }
            IncrementalSource::StyleSheetRule => {
                Self::StyleSheetRule(serde_json::from_value(payload)?)
            }
            IncrementalSource::CanvasMutation => {
                Self::CanvasMutation(serde_json::from_value(payload)?)
            }
            IncrementalSource::Font => Self::Font(serde_json::from_value(payload)?),
            IncrementalSource::Log => Self::Log(serde_json::from_value(payload)?),
            IncrementalSource::Drag => Self::Drag(serde_json::from_value(payload)?),
            IncrementalSource::StyleDeclaration => {
                Self::StyleDeclaration(serde_json::from_value(payload)?)
            }
            IncrementalSource::Selection => Self::Selection(serde_json::from_value(payload)?),
            IncrementalSource::AdoptedStyleSheet => {
                Self::AdoptedStyleSheet(serde_json::from_value(payload)?)
            }
            IncrementalSource::CustomElement => {
                Self::CustomElement(serde_json::from_value(payload)?)
            }
            IncrementalSource::VisibilityMutation => {
                Self::VisibilityMutation(serde_json::from_value(payload)?)
            }
        })
    }
}

impl Serialize for IncrementalData {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::Error as _;
        let mut value = self.payload_value().map_err(S::Error::custom)?;
        let map = value
            .as_object_mut()
            .ok_or_else(|| S::Error::custom("incremental payload must be an object"))?;
        map.insert(
            "source".into(),
            Value::from(self.source() as u8),
        );
        value.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for IncrementalData {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let source = value
            .get("source")
            .cloned()
            .ok_or_else(|| D::Error::custom("incremental data without `source`"))?;
        let source: IncrementalSource =
            serde_json::from_value(source).map_err(D::Error::custom)?;
        Self::from_parts(source, value).map_err(D::Error::custom)
    }
}

/// An event without its timestamp.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    DomContentLoaded,
    Load,
    FullSnapshot(FullSnapshotData),
    IncrementalSnapshot(IncrementalData),
    Meta(MetaData),
    Custom(CustomData),
    Plugin(PluginData),
}

impl Event {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::DomContentLoaded => EventType::DomContentLoaded,
            Self::Load => EventType::Load,
            Self::FullSnapshot(_) => EventType::FullSnapshot,
            Self::IncrementalSnapshot(_) => EventType::IncrementalSnapshot,
            Self::Meta(_) => EventType::Meta,
            Self::Custom(_) => EventType::Custom,
            Self::Plugin(_) => EventType::Plugin,
        }
    }

    fn data_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::DomContentLoaded | Self::Load => Ok(Value::Object(Default::default())),
            Self::FullSnapshot(d) => serde_json::to_value(d),
            Self::IncrementalSnapshot(d) => serde_json::to_value(d),
            Self::Meta(d) => serde_json::to_value(d),
            Self::Custom(d) => serde_json::to_value(d),
            Self::Plugin(d) => serde_json::to_value(d),
        }
    }

    fn from_parts(ty: EventType, data: Value) -> Result<Self, serde_json::Error> {
        Ok(match ty {
            EventType::DomContentLoaded => Self::DomContentLoaded,
            EventType::Load => Self::Load,
            EventType::FullSnapshot => Self::FullSnapshot(serde_json::from_value(data)?),
            EventType::IncrementalSnapshot => {
                Self::IncrementalSnapshot(serde_json::from_value(data)?)
            }
            EventType::Meta => Self::Meta(serde_json::from_value(data)?),
            EventType::Custom => Self::Custom(serde_json::from_value(data)?),
            EventType::Plugin => Self::Plugin(serde_json::from_value(data)?),
        })
    }
}

/// A timestamped event as it travels to the sink.
///
/// `extra` carries plugin-added keys (e.g. the sequential id) so they
/// survive serialization without the core knowing their names.
#[derive(Debug, Clone, PartialEq)]
pub struct EventWithTime {
    pub event: Event,
    /// Milliseconds since the epoch, assigned in the emit pipeline.
    pub timestamp: f64,
    pub extra: serde_json::Map<String, Value>,
}

impl EventWithTime {
    pub fn new(event: Event, timestamp: f64) -> Self {
        Self {
            event,
            timestamp,
            extra: serde_json::Map::new(),
        }
    }
}

impl Serialize for EventWithTime {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::Error as _;
        use serde::ser::SerializeMap as _;
        let data = self.event.data_value().map_err(S::Error::custom)?;
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("type", &self.event.event_type())?;
        map.serialize_entry("data", &data)?;
        map.serialize_entry("timestamp", &self.timestamp)?;
        for (key, value) in &self.extra {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for EventWithTime {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let Value::Object(mut map) = value else {
            return Err(D::Error::custom("event must be an object"));
        };
        let ty = map
            .remove("type")
            .ok_or_else(|| D::Error::custom("event without `type`"))?;
        let ty: EventType = serde_json::from_value(ty).map_err(D::Error::custom)?;
        let data = map.remove("data").unwrap_or(Value::Null);
        let timestamp = map
            .remove("timestamp")
            .and_then(|t| t.as_f64())
            .ok_or_else(|| D::Error::custom("event without numeric `timestamp`"))?;
        let event = Event::from_parts(ty, data).map_err(D::Error::custom)?;
        Ok(Self {
            event,
            timestamp,
            extra: map,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_wire_values() {
        let pairs = [
            (EventType::DomContentLoaded, 0),
            (EventType::Load, 1),
            (EventType::FullSnapshot, 2),
            (EventType::IncrementalSnapshot, 3),
            (EventType::Meta, 4),
            (EventType::Custom, 5),
            (EventType::Plugin, 6),
        ];
        for (ty, num) in pairs {
            assert_eq!(serde_json::to_value(ty).unwrap(), serde_json::json!(num));
        }
    }

    #[test]
    fn incremental_source_wire_values() {
        assert_eq!(
            serde_json::to_value(IncrementalSource::Mutation).unwrap(),
            serde_json::json!(0)
        );
        assert_eq!(
            serde_json::to_value(IncrementalSource::CustomElement).unwrap(),
            serde_json::json!(16)
        );
        assert_eq!(
            serde_json::to_value(IncrementalSource::VisibilityMutation).unwrap(),
            serde_json::json!(17)
        );
    }

    #[test]
    fn meta_event_shape() {
        let event = EventWithTime::new(
            Event::Meta(MetaData {
                href: "https://example.com/".into(),
                width: 1280.0,
                height: 720.0,
            }),
            42.0,
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], 4);
        assert_eq!(json["data"]["href"], "https://example.com/");
        assert_eq!(json["timestamp"], 42.0);
    }

    #[test]
    fn incremental_flattens_source_beside_payload() {
        let event = Event::IncrementalSnapshot(IncrementalData::Scroll(ScrollData {
            id: 12,
            x: 0.0,
            y: 300.0,
        }));
        let json = serde_json::to_value(EventWithTime::new(event, 1.0)).unwrap();
        assert_eq!(json["data"]["source"], 3);
        assert_eq!(json["data"]["id"], 12);
        assert_eq!(json["data"]["y"], 300.0);
    }

    #[test]
    fn visibility_mutation_round_trip() {
        let event = EventWithTime::new(
            Event::IncrementalSnapshot(IncrementalData::VisibilityMutation(
                VisibilityMutationData {
                    mutations: vec![VisibilityMutationEntry {
                        id: 5,
                        is_visible: true,
                        ratio: 0.75,
                    }],
                },
            )),
            100.0,
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: EventWithTime = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn extra_keys_survive_round_trip() {
        let mut event = EventWithTime::new(Event::Load, 9.0);
        event.extra.insert("id".into(), serde_json::json!(17));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["id"], 17);
        let back: EventWithTime =
            serde_json::from_value(json).unwrap();
        assert_eq!(back.extra.get("id"), Some(&serde_json::json!(17)));
    }

    #[test]
    fn mutation_data_round_trip() {
        let data = MutationData {
            texts: vec![TextMutation { id: 3, value: Some("hi".into()) }],
            attributes: vec![AttributeMutation {
                id: 4,
                attributes: [("class".to_owned(), Some(AttrValue::Str("on".into())))]
                    .into_iter()
                    .collect(),
            }],
            removes: vec![RemovedNodeMutation { parent_id: 1, id: 9, is_shadow: None }],
            adds: vec![],
            is_attach_iframe: None,
        };
        let event = EventWithTime::new(
            Event::IncrementalSnapshot(IncrementalData::Mutation(data.clone())),
            5.0,
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: EventWithTime = serde_json::from_str(&json).unwrap();
        match back.event {
            Event::IncrementalSnapshot(IncrementalData::Mutation(d)) => assert_eq!(d, data),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
