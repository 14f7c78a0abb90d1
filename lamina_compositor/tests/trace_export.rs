// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A compositor session recorded and exported with `lamina_debug`.

mod common;

use common::Harness;
use lamina_core::geometry::{Point, Rect, Size};
use lamina_core::pixel::{PixelFormat, Rgba16};
use lamina_core::service::AlphaSource;
use lamina_debug::json;
use lamina_debug::recorder::{RecordedEvent, RecorderSink, decode};
use lamina_debug::shared::SharedSink;
use serde_json::Value;

#[test]
fn session_round_trips_through_the_recorder() {
    let h = Harness::new();
    let shared = SharedSink::new(RecorderSink::new());
    {
        let c = h.compositor();
        c.set_trace_sink(Box::new(shared.clone()));
        let bitmap = c.new_bitmap(Size::new(4, 4), PixelFormat::Rgba32).unwrap();
        bitmap.clear_to(Rgba16::WHITE).unwrap();
        let id = c
            .update(2, |c| {
                c.add_element(Rect::new(0, 0, 0, 0), &bitmap, 1, 1.0, AlphaSource::FromSource)
            })
            .unwrap();
        c.update(0, |c| c.set_element_origin(id, Point::new(3, 3)))
            .unwrap();
        c.close().unwrap();
    }

    let bytes = shared.with(|rec| rec.as_bytes().to_vec());
    let events: Vec<_> = decode(&bytes).collect();
    let names: Vec<_> = events
        .iter()
        .map(|e| match e {
            RecordedEvent::BitmapCreated(_) => "created",
            RecordedEvent::BitmapFreed(_) => "freed",
            RecordedEvent::BitmapLeaked(_) => "leaked",
            RecordedEvent::UpdateBegin(_) => "begin",
            RecordedEvent::UpdateCommit(_) => "commit",
            RecordedEvent::ElementAdded(_) => "added",
            RecordedEvent::ElementRemoved(_) => "removed",
            RecordedEvent::ElementChanged(_) => "changed",
            RecordedEvent::Damage(_) => "damage",
            RecordedEvent::Teardown(_) => "teardown",
        })
        .collect();
    assert_eq!(
        names,
        [
            "created", "begin", "added", "commit", "damage", "begin", "changed", "commit",
            "begin", "removed", "commit", "freed", "teardown",
        ]
    );

    let mut out = Vec::new();
    json::export(&bytes, &mut out).unwrap();
    let parsed: Vec<Value> = serde_json::from_slice(&out).unwrap();
    assert_eq!(parsed.len(), events.len());
    assert_eq!(parsed[1]["priority"], 2);
    assert_eq!(parsed[4]["rect"]["width"], 4);
    assert_eq!(parsed[12]["elements_removed"], 1);
}
