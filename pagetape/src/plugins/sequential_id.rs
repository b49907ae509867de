// Copyright 2026 the Pagetape Authors
// SPDX-License-Identifier: Apache-2.0

//! Sequential-id annotator.
//!
//! Attaches a monotonically increasing integer to every emitted event so
//! consumers can detect gaps and order events across transport boundaries.
//! With an injected `get_id`, several recorders (e.g. parent and child
//! frames) share one counter.

use std::cell::Cell;
use std::rc::Rc;

use crate::config::RecordPlugin;

/// Shared counter callback: returns the next id.
pub type GetIdFn = Rc<dyn Fn() -> u64>;

#[derive(Clone)]
pub struct SequentialIdOptions {
    /// Key the id is written under. Defaults to `"id"`.
    pub key: String,
    /// External counter; a plugin-local one is used when absent.
    pub get_id: Option<GetIdFn>,
}

impl Default for SequentialIdOptions {
    fn default() -> Self {
        Self {
            key: "id".into(),
            get_id: None,
        }
    }
}

/// Builds the plugin. Ids start at 1 and never repeat within one counter.
pub fn sequential_id_plugin(options: SequentialIdOptions) -> RecordPlugin {
    let next: GetIdFn = match options.get_id {
        Some(get_id) => get_id,
        None => {
            let counter = Rc::new(Cell::new(0u64));
            Rc::new(move || {
                counter.set(counter.get() + 1);
                counter.get()
            })
        }
    };
    let key = options.key;
    RecordPlugin::new("sequential-id").with_event_processor(move |mut event| {
        event
            .extra
            .insert(key.clone(), serde_json::Value::from(next()));
        event
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Event, EventWithTime};

    fn run(plugin: &RecordPlugin, event: EventWithTime) -> EventWithTime {
        (plugin.event_processor.as_ref().unwrap())(event)
    }

    #[test]
    fn ids_increase_monotonically() {
        let plugin = sequential_id_plugin(SequentialIdOptions::default());
        let first = run(&plugin, EventWithTime::new(Event::Load, 1.0));
        let second = run(&plugin, EventWithTime::new(Event::Load, 2.0));
        assert_eq!(first.extra.get("id"), Some(&serde_json::json!(1)));
        assert_eq!(second.extra.get("id"), Some(&serde_json::json!(2)));
    }

    #[test]
    fn custom_key() {
        let plugin = sequential_id_plugin(SequentialIdOptions {
            key: "seq".into(),
            get_id: None,
        });
        let event = run(&plugin, EventWithTime::new(Event::Load, 1.0));
        assert_eq!(event.extra.get("seq"), Some(&serde_json::json!(1)));
        assert!(event.extra.get("id").is_none());
    }

    #[test]
    fn injected_counter_is_shared() {
        let counter = Rc::new(Cell::new(100u64));
        let get_id: GetIdFn = {
            let counter = Rc::clone(&counter);
            Rc::new(move || {
                counter.set(counter.get() + 1);
                counter.get()
            })
        };
        let a = sequential_id_plugin(SequentialIdOptions {
            key: "id".into(),
            get_id: Some(Rc::clone(&get_id)),
        });
        let b = sequential_id_plugin(SequentialIdOptions {
            key: "id".into(),
            get_id: Some(get_id),
        });
        let first = run(&a, EventWithTime::new(Event::Load, 1.0));
        let second = run(&b, EventWithTime::new(Event::Load, 2.0));
        assert_eq!(first.extra.get("id"), Some(&serde_json::json!(101)));
        assert_eq!(second.extra.get("id"), Some(&serde_json::json!(102)));
    }
}
