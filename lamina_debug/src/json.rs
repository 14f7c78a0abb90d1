// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! JSON exporter.
//!
//! [`export`] reads recorded bytes from a
//! [`RecorderSink`](super::recorder::RecorderSink) and writes them as a JSON
//! array with one object per event. Every object carries an `"event"` name;
//! the remaining keys depend on the event.

use std::io::{self, Write};

use lamina_core::geometry::Rect;
use lamina_core::trace::{BitmapEvent, ElementEvent};
use serde_json::{Value, json};

use crate::recorder::{RecordedEvent, decode};

fn rect(r: Rect) -> Value {
    json!({
        "x": r.origin.x,
        "y": r.origin.y,
        "width": r.size.width,
        "height": r.size.height,
    })
}

fn bitmap(name: &str, e: &BitmapEvent) -> Value {
    json!({
        "event": name,
        "resource": e.resource.0,
        "format": format!("{:?}", e.format),
        "width": e.size.width,
        "height": e.size.height,
    })
}

fn element(name: &str, e: &ElementEvent) -> Value {
    json!({
        "event": name,
        "element": e.element.0,
        "resource": e.resource.0,
        "layer": e.layer,
        "dest": rect(e.dest),
    })
}

/// Converts one recorded event to its JSON object.
#[must_use]
pub fn to_value(event: &RecordedEvent) -> Value {
    match event {
        RecordedEvent::BitmapCreated(e) => bitmap("bitmap_created", e),
        RecordedEvent::BitmapFreed(e) => bitmap("bitmap_freed", e),
        RecordedEvent::BitmapLeaked(e) => json!({
            "event": "bitmap_leaked",
            "resource": e.resource.0,
            "retain_count": e.retain_count,
        }),
        RecordedEvent::UpdateBegin(e) => json!({
            "event": "update_begin",
            "update": e.update.0,
            "priority": e.priority,
        }),
        RecordedEvent::UpdateCommit(e) => json!({
            "event": "update_commit",
            "update": e.update.0,
            "enlisted": e.enlisted,
            "ok": e.ok,
        }),
        RecordedEvent::ElementAdded(e) => element("element_added", e),
        RecordedEvent::ElementRemoved(e) => element("element_removed", e),
        RecordedEvent::ElementChanged(e) => json!({
            "event": "element_changed",
            "element": e.element.0,
            "mask": e.mask.bits(),
            "source_swapped": e.source_swapped,
        }),
        RecordedEvent::Damage(e) => json!({
            "event": "damage",
            "update": e.update.0,
            "resource": e.resource.0,
            "rect": rect(e.rect),
        }),
        RecordedEvent::Teardown(e) => json!({
            "event": "teardown",
            "elements_removed": e.elements_removed,
            "bitmaps_closed": e.bitmaps_closed,
            "errors": e.errors,
        }),
    }
}

/// Exports recorded events as a pretty-printed JSON array.
pub fn export(bytes: &[u8], writer: &mut dyn Write) -> io::Result<()> {
    let events: Vec<Value> = decode(bytes).map(|e| to_value(&e)).collect();
    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}
