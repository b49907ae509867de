// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

//! Recorder configuration.
//!
//! [`RecordOptions`] is the one options struct [`record`](crate::record)
//! accepts. Field names follow the family's canonical set; historical
//! aliases that drifted through old settings shapes are simply not
//! representable here. The one sanctioned legacy alias is
//! [`mousemove_wait`](RecordOptions::mousemove_wait), which
//! `sampling.mousemove` overrides.

use std::collections::HashSet;
use std::rc::Rc;

use regex::Regex;
use wasm_bindgen::JsValue;

use pagetape_snapshot::{
    DataUrlOptions, MaskInputFn, MaskInputOptions, SlimDomOptions, VisibilityOptions,
};

use crate::types::{EventWithTime, IncrementalData};

/// The required sink: `(event, is_checkout)`.
pub type EmitFn = Rc<dyn Fn(&EmittedEvent, bool)>;

/// Custom text masker, `(text, element)` → masked text.
pub type MaskTextFn = Rc<dyn Fn(&str, &web_sys::Element) -> String>;

/// Optional final encoder applied in the emitting frame only.
pub type PackFn = Rc<dyn Fn(&EventWithTime) -> String>;

/// Per-event failure callback.
pub type ErrorHandler = Rc<dyn Fn(&JsValue)>;

/// Keeps an iframe's `src` verbatim when it returns `true`.
pub type KeepIframeSrcFn = Rc<dyn Fn(&str) -> bool>;

/// What the sink receives: the typed event, or the packed string when a
/// `pack_fn` is configured.
#[derive(Debug, Clone, PartialEq)]
pub enum EmittedEvent {
    Event(EventWithTime),
    Packed(String),
}

impl EmittedEvent {
    /// The typed event, when packing didn't already collapse it.
    pub fn as_event(&self) -> Option<&EventWithTime> {
        match self {
            Self::Event(e) => Some(e),
            Self::Packed(_) => None,
        }
    }
}

/// When queued custom events are flushed relative to the first full
/// snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushCustomEvent {
    /// Before the initial `Meta`/`FullSnapshot` pair.
    Before,
    /// After the initial observers are installed.
    #[default]
    After,
}

/// Which readiness event arms the recorder when the document is still
/// loading at `record()` time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordAfter {
    #[default]
    Load,
    DomContentLoaded,
}

/// Pointer-position batching: off, or batched with a wait in ms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MousemoveSampling {
    Off,
    Wait(f64),
}

impl Default for MousemoveSampling {
    fn default() -> Self {
        Self::Wait(50.0)
    }
}

/// Per-kind toggles for mouse interaction events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseInteractionSampling {
    pub mouse_up: bool,
    pub mouse_down: bool,
    pub click: bool,
    pub context_menu: bool,
    pub dbl_click: bool,
    pub focus: bool,
    pub blur: bool,
    pub touch_start: bool,
    pub touch_end: bool,
    pub touch_cancel: bool,
}

impl Default for MouseInteractionSampling {
    fn default() -> Self {
        Self::all()
    }
}

impl MouseInteractionSampling {
    pub fn all() -> Self {
        Self {
            mouse_up: true,
            mouse_down: true,
            click: true,
            context_menu: true,
            dbl_click: true,
            focus: true,
            blur: true,
            touch_start: true,
            touch_end: true,
            touch_cancel: true,
        }
    }

    pub fn none() -> Self {
        Self {
            mouse_up: false,
            mouse_down: false,
            click: false,
            context_menu: false,
            dbl_click: false,
            focus: false,
            blur: false,
            touch_start: false,
            touch_end: false,
            touch_cancel: false,
        }
    }
}

/// `"all"` emits every input event, `"last"` only the final value of a
/// quiescent burst (flushed on the next animation frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputSampling {
    #[default]
    All,
    Last,
}

/// Canvas capture strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CanvasSampling {
    /// Patch the 2d context and stream draw commands.
    Commands,
    /// Periodic data-url snapshots at the given fps (also the only mode for
    /// WebGL contexts).
    Snapshot { fps: f64 },
}

impl Default for CanvasSampling {
    fn default() -> Self {
        Self::Commands
    }
}

/// How buffered visibility changes leave the visibility manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisibilityFlushMode {
    /// Emit on the frame they were observed.
    None,
    /// Restart a timer per change; emit when it fires.
    #[default]
    Debounce,
    /// Emit at most once per window; later frames retry.
    Throttle,
}

/// The visibility pipeline's sampling block.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilitySampling {
    pub mode: VisibilityFlushMode,
    /// Debounce window in ms, for [`VisibilityFlushMode::Debounce`].
    pub debounce: f64,
    /// Throttle window in ms, for [`VisibilityFlushMode::Throttle`].
    pub throttle: f64,
    /// Minimum intersection ratio to count as visible.
    pub threshold: f64,
    /// Ratio delta below which a change is not reported.
    pub sensitivity: f64,
    /// Minimum ms between two evaluation passes of the rAF loop.
    pub raf_throttle: f64,
    /// Root margin, css shorthand.
    pub root_margin: String,
}

impl Default for VisibilitySampling {
    fn default() -> Self {
        Self {
            mode: VisibilityFlushMode::default(),
            debounce: 100.0,
            throttle: 100.0,
            threshold: 0.1,
            sensitivity: 0.25,
            raf_throttle: 100.0,
            root_margin: String::new(),
        }
    }
}

/// Event-rate controls per observer family.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sampling {
    pub mousemove: Option<MousemoveSampling>,
    pub mouse_interaction: MouseInteractionSampling,
    /// Scroll throttle in ms.
    pub scroll: Option<f64>,
    /// Media interaction throttle in ms.
    pub media: Option<f64>,
    pub input: InputSampling,
    pub canvas: CanvasSampling,
    pub visibility: VisibilitySampling,
}

/// Console recording options (the `Log` incremental source).
#[derive(Debug, Clone, PartialEq)]
pub struct LogOptions {
    /// Console levels to patch.
    pub level: Vec<String>,
    /// Hard cap on recorded logs per recording; one warning is emitted when
    /// it is hit.
    pub length_threshold: usize,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: ["log", "info", "warn", "error"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            length_threshold: 1000,
        }
    }
}

/// Payload emitter handed to a plugin's observer.
pub type PluginEmitFn = Rc<dyn Fn(serde_json::Value)>;

/// Disposer returned by a plugin observer.
pub type PluginDisposer = Box<dyn FnOnce()>;

type PluginObserverFn = Rc<dyn Fn(PluginEmitFn, &web_sys::Window) -> PluginDisposer>;
type EventProcessorFn = Rc<dyn Fn(EventWithTime) -> EventWithTime>;

/// A recorder plugin: an optional event processor run over every emitted
/// event (in declaration order) and an optional observer that emits
/// [`EventType::Plugin`](crate::types::EventType::Plugin) events.
#[derive(Clone)]
pub struct RecordPlugin {
    pub name: String,
    pub event_processor: Option<EventProcessorFn>,
    pub observer: Option<PluginObserverFn>,
}

impl RecordPlugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            event_processor: None,
            observer: None,
        }
    }

    pub fn with_event_processor(
        mut self,
        processor: impl Fn(EventWithTime) -> EventWithTime + 'static,
    ) -> Self {
        self.event_processor = Some(Rc::new(processor));
        self
    }

    pub fn with_observer(
        mut self,
        observer: impl Fn(PluginEmitFn, &web_sys::Window) -> PluginDisposer + 'static,
    ) -> Self {
        self.observer = Some(Rc::new(observer));
        self
    }
}

/// One coarse callback per event family, invoked with the incremental data
/// before it enters the emit pipeline.
pub type HookFn = Rc<dyn Fn(&IncrementalData)>;

/// Pre-emit callbacks per incremental family.
#[derive(Clone, Default)]
pub struct Hooks {
    pub mutation: Option<HookFn>,
    pub mousemove: Option<HookFn>,
    pub mouse_interaction: Option<HookFn>,
    pub scroll: Option<HookFn>,
    pub viewport_resize: Option<HookFn>,
    pub input: Option<HookFn>,
    pub media_interaction: Option<HookFn>,
    pub style_sheet_rule: Option<HookFn>,
    pub style_declaration: Option<HookFn>,
    pub canvas_mutation: Option<HookFn>,
    pub font: Option<HookFn>,
    pub selection: Option<HookFn>,
    pub visibility: Option<HookFn>,
    pub log: Option<HookFn>,
}

impl Hooks {
    /// The hook responsible for `data`'s family, if configured.
    pub(crate) fn for_data(&self, data: &IncrementalData) -> Option<&HookFn> {
        use IncrementalData::*;
        match data {
            Mutation(_) => self.mutation.as_ref(),
            MouseMove(_) | TouchMove(_) | Drag(_) => self.mousemove.as_ref(),
            MouseInteraction(_) => self.mouse_interaction.as_ref(),
            Scroll(_) => self.scroll.as_ref(),
            ViewportResize(_) => self.viewport_resize.as_ref(),
            Input(_) => self.input.as_ref(),
            MediaInteraction(_) => self.media_interaction.as_ref(),
            StyleSheetRule(_) => self.style_sheet_rule.as_ref(),
            StyleDeclaration(_) => self.style_declaration.as_ref(),
            CanvasMutation(_) => self.canvas_mutation.as_ref(),
            Font(_) => self.font.as_ref(),
            Log(_) => self.log.as_ref(),
            Selection(_) => self.selection.as_ref(),
            AdoptedStyleSheet(_) => self.style_sheet_rule.as_ref(),
            CustomElement(_) => self.mutation.as_ref(),
            VisibilityMutation(_) => self.visibility.as_ref(),
        }
    }
}

/// Everything [`record`](crate::record) accepts. Start from `Default` and
/// set what you need; `emit` is the only required field in a top-level
/// frame.
#[derive(Clone, Default)]
pub struct RecordOptions {
    /// The sink. Required unless this frame only passes events through to a
    /// recording parent (`record_cross_origin_iframes` in a child frame).
    pub emit: Option<EmitFn>,
    /// Full snapshot every N incremental events.
    pub checkout_every_nth: Option<u64>,
    /// Full snapshot when the last one is older than N ms.
    pub checkout_every_nms: Option<f64>,
    /// Full snapshot every N visibility-change events.
    pub checkout_every_nvm: Option<u64>,
    pub block_class: Option<String>,
    pub block_selector: Option<String>,
    pub ignore_class: Option<String>,
    pub ignore_selector: Option<String>,
    /// Attributes whose names match are stripped from the stream.
    pub exclude_attribute: Option<Regex>,
    pub mask_text_class: Option<String>,
    pub mask_text_selector: Option<String>,
    pub mask_text_fn: Option<MaskTextFn>,
    pub mask_all_inputs: bool,
    pub mask_input_options: Option<MaskInputOptions>,
    pub mask_input_fn: Option<MaskInputFn>,
    pub inline_stylesheet: Option<bool>,
    pub inline_images: bool,
    pub collect_fonts: bool,
    pub slim_dom_options: Option<SlimDomOptions>,
    pub sampling: Sampling,
    /// Legacy alias for `sampling.mousemove`; the sampling block wins.
    pub mousemove_wait: Option<f64>,
    pub record_dom: Option<bool>,
    pub record_canvas: bool,
    pub record_cross_origin_iframes: bool,
    pub record_after: RecordAfter,
    pub flush_custom_event: FlushCustomEvent,
    /// Record console output as `Log` incrementals.
    pub log_options: Option<LogOptions>,
    /// Annotate input events with whether a user gesture triggered them.
    pub user_triggered_on_input: bool,
    pub keep_iframe_src_fn: Option<KeepIframeSrcFn>,
    /// Style properties dropped from style-declaration mutations.
    pub ignore_css_attributes: HashSet<String>,
    pub data_url_options: Option<DataUrlOptions>,
    pub plugins: Vec<RecordPlugin>,
    pub hooks: Hooks,
    pub pack_fn: Option<PackFn>,
    pub error_handler: Option<ErrorHandler>,
}

impl RecordOptions {
    /// Effective pointer-batching wait, resolving the legacy alias.
    pub(crate) fn mousemove_sampling(&self) -> MousemoveSampling {
        match (self.sampling.mousemove, self.mousemove_wait) {
            (Some(sampling), _) => sampling,
            (None, Some(wait)) => MousemoveSampling::Wait(wait),
            (None, None) => MousemoveSampling::default(),
        }
    }

    pub(crate) fn visibility_options(&self) -> VisibilityOptions {
        let v = &self.sampling.visibility;
        VisibilityOptions {
            root: None,
            threshold: v.threshold,
            sensitivity: v.sensitivity,
            root_margin: v.root_margin.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_mousemove_wait_is_overridden_by_sampling() {
        let mut options = RecordOptions {
            mousemove_wait: Some(200.0),
            ..Default::default()
        };
        assert_eq!(options.mousemove_sampling(), MousemoveSampling::Wait(200.0));

        options.sampling.mousemove = Some(MousemoveSampling::Wait(25.0));
        assert_eq!(options.mousemove_sampling(), MousemoveSampling::Wait(25.0));

        options.sampling.mousemove = Some(MousemoveSampling::Off);
        assert_eq!(options.mousemove_sampling(), MousemoveSampling::Off);
    }

    #[test]
    fn defaults() {
        let options = RecordOptions::default();
        assert_eq!(options.record_after, RecordAfter::Load);
        assert_eq!(options.flush_custom_event, FlushCustomEvent::After);
        assert_eq!(options.sampling.input, InputSampling::All);
        assert_eq!(
            options.sampling.visibility.mode,
            VisibilityFlushMode::Debounce
        );
    }
}
