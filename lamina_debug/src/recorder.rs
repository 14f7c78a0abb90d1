// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as fixed-size little-endian records, each led by a one-byte tag.
//! [`decode`] reads them back as an iterator of [`RecordedEvent`].

use lamina_core::geometry::{Point, Rect, Size};
use lamina_core::handle::{ElementHandle, ResourceHandle, UpdateHandle};
use lamina_core::pixel::PixelFormat;
use lamina_core::service::ChangeMask;
use lamina_core::trace::{
    BitmapEvent, DamageEvent, ElementChangeEvent, ElementEvent, LeakEvent, TeardownEvent,
    TraceSink, UpdateBeginEvent, UpdateCommitEvent,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_BITMAP_CREATED: u8 = 1;
const TAG_BITMAP_FREED: u8 = 2;
const TAG_BITMAP_LEAKED: u8 = 3;
const TAG_UPDATE_BEGIN: u8 = 4;
const TAG_UPDATE_COMMIT: u8 = 5;
const TAG_ELEMENT_ADDED: u8 = 6;
const TAG_ELEMENT_REMOVED: u8 = 7;
const TAG_ELEMENT_CHANGED: u8 = 8;
const TAG_DAMAGE: u8 = 9;
const TAG_TEARDOWN: u8 = 10;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_rect(&mut self, r: Rect) {
        self.write_i32(r.origin.x);
        self.write_i32(r.origin.y);
        self.write_u32(r.size.width);
        self.write_u32(r.size.height);
    }

    fn write_format(&mut self, f: PixelFormat) {
        self.write_u8(match f {
            PixelFormat::Rgb565 => 0,
            PixelFormat::Rgb888 => 1,
            PixelFormat::Rgba32 => 2,
            PixelFormat::Rgba16 => 3,
            PixelFormat::Yuv420 => 4,
            PixelFormat::Palette8 => 5,
        });
    }

    fn write_bitmap(&mut self, tag: u8, e: &BitmapEvent) {
        self.write_u8(tag);
        self.write_u32(e.resource.0);
        self.write_format(e.format);
        self.write_u32(e.size.width);
        self.write_u32(e.size.height);
    }

    fn write_element(&mut self, tag: u8, e: &ElementEvent) {
        self.write_u8(tag);
        self.write_u32(e.element.0);
        self.write_u32(e.resource.0);
        self.write_u16(e.layer);
        self.write_rect(e.dest);
    }
}

impl TraceSink for RecorderSink {
    fn on_bitmap_created(&mut self, e: &BitmapEvent) {
        self.write_bitmap(TAG_BITMAP_CREATED, e);
    }

    fn on_bitmap_freed(&mut self, e: &BitmapEvent) {
        self.write_bitmap(TAG_BITMAP_FREED, e);
    }

    fn on_bitmap_leaked(&mut self, e: &LeakEvent) {
        self.write_u8(TAG_BITMAP_LEAKED);
        self.write_u32(e.resource.0);
        self.write_u32(e.retain_count);
    }

    fn on_update_begin(&mut self, e: &UpdateBeginEvent) {
        self.write_u8(TAG_UPDATE_BEGIN);
        self.write_u32(e.update.0);
        self.write_i32(e.priority);
    }

    fn on_update_commit(&mut self, e: &UpdateCommitEvent) {
        self.write_u8(TAG_UPDATE_COMMIT);
        self.write_u32(e.update.0);
        self.write_u32(e.enlisted);
        self.write_u8(u8::from(e.ok));
    }

    fn on_element_added(&mut self, e: &ElementEvent) {
        self.write_element(TAG_ELEMENT_ADDED, e);
    }

    fn on_element_removed(&mut self, e: &ElementEvent) {
        self.write_element(TAG_ELEMENT_REMOVED, e);
    }

    fn on_element_changed(&mut self, e: &ElementChangeEvent) {
        self.write_u8(TAG_ELEMENT_CHANGED);
        self.write_u32(e.element.0);
        self.write_u32(e.mask.bits());
        self.write_u8(u8::from(e.source_swapped));
    }

    fn on_damage(&mut self, e: &DamageEvent) {
        self.write_u8(TAG_DAMAGE);
        self.write_u32(e.update.0);
        self.write_u32(e.resource.0);
        self.write_rect(e.rect);
    }

    fn on_teardown(&mut self, e: &TeardownEvent) {
        self.write_u8(TAG_TEARDOWN);
        self.write_u32(e.elements_removed);
        self.write_u32(e.bitmaps_closed);
        self.write_u32(e.errors);
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordedEvent {
    /// See [`TraceSink::on_bitmap_created`].
    BitmapCreated(BitmapEvent),
    /// See [`TraceSink::on_bitmap_freed`].
    BitmapFreed(BitmapEvent),
    /// See [`TraceSink::on_bitmap_leaked`].
    BitmapLeaked(LeakEvent),
    /// See [`TraceSink::on_update_begin`].
    UpdateBegin(UpdateBeginEvent),
    /// See [`TraceSink::on_update_commit`].
    UpdateCommit(UpdateCommitEvent),
    /// See [`TraceSink::on_element_added`].
    ElementAdded(ElementEvent),
    /// See [`TraceSink::on_element_removed`].
    ElementRemoved(ElementEvent),
    /// See [`TraceSink::on_element_changed`].
    ElementChanged(ElementChangeEvent),
    /// See [`TraceSink::on_damage`].
    Damage(DamageEvent),
    /// See [`TraceSink::on_teardown`].
    Teardown(TeardownEvent),
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
///
/// Iteration stops at the first unknown tag or truncated record.
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.data.get(self.pos..self.pos + N)?.try_into().ok()?;
        self.pos += N;
        Some(bytes)
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[v]| v)
    }

    fn read_u16(&mut self) -> Option<u16> {
        self.take().map(u16::from_le_bytes)
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    fn read_i32(&mut self) -> Option<i32> {
        self.take().map(i32::from_le_bytes)
    }

    fn read_bool(&mut self) -> Option<bool> {
        Some(self.read_u8()? != 0)
    }

    fn read_rect(&mut self) -> Option<Rect> {
        let origin = Point::new(self.read_i32()?, self.read_i32()?);
        let size = Size::new(self.read_u32()?, self.read_u32()?);
        Some(Rect { origin, size })
    }

    fn read_format(&mut self) -> Option<PixelFormat> {
        Some(match self.read_u8()? {
            0 => PixelFormat::Rgb565,
            1 => PixelFormat::Rgb888,
            2 => PixelFormat::Rgba32,
            3 => PixelFormat::Rgba16,
            4 => PixelFormat::Yuv420,
            5 => PixelFormat::Palette8,
            _ => return None,
        })
    }

    fn read_bitmap(&mut self) -> Option<BitmapEvent> {
        Some(BitmapEvent {
            resource: ResourceHandle(self.read_u32()?),
            format: self.read_format()?,
            size: Size::new(self.read_u32()?, self.read_u32()?),
        })
    }

    fn read_element(&mut self) -> Option<ElementEvent> {
        Some(ElementEvent {
            element: ElementHandle(self.read_u32()?),
            resource: ResourceHandle(self.read_u32()?),
            layer: self.read_u16()?,
            dest: self.read_rect()?,
        })
    }

    fn decode_leak(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::BitmapLeaked(LeakEvent {
            resource: ResourceHandle(self.read_u32()?),
            retain_count: self.read_u32()?,
        }))
    }

    fn decode_update_begin(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::UpdateBegin(UpdateBeginEvent {
            update: UpdateHandle(self.read_u32()?),
            priority: self.read_i32()?,
        }))
    }

    fn decode_update_commit(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::UpdateCommit(UpdateCommitEvent {
            update: UpdateHandle(self.read_u32()?),
            enlisted: self.read_u32()?,
            ok: self.read_bool()?,
        }))
    }

    fn decode_element_changed(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::ElementChanged(ElementChangeEvent {
            element: ElementHandle(self.read_u32()?),
            mask: ChangeMask::from_bits(self.read_u32()?),
            source_swapped: self.read_bool()?,
        }))
    }

    fn decode_damage(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Damage(DamageEvent {
            update: UpdateHandle(self.read_u32()?),
            resource: ResourceHandle(self.read_u32()?),
            rect: self.read_rect()?,
        }))
    }

    fn decode_teardown(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Teardown(TeardownEvent {
            elements_removed: self.read_u32()?,
            bitmaps_closed: self.read_u32()?,
            errors: self.read_u32()?,
        }))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = self.read_u8()?;
        match tag {
            TAG_BITMAP_CREATED => self.read_bitmap().map(RecordedEvent::BitmapCreated),
            TAG_BITMAP_FREED => self.read_bitmap().map(RecordedEvent::BitmapFreed),
            TAG_BITMAP_LEAKED => self.decode_leak(),
            TAG_UPDATE_BEGIN => self.decode_update_begin(),
            TAG_UPDATE_COMMIT => self.decode_update_commit(),
            TAG_ELEMENT_ADDED => self.read_element().map(RecordedEvent::ElementAdded),
            TAG_ELEMENT_REMOVED => self.read_element().map(RecordedEvent::ElementRemoved),
            TAG_ELEMENT_CHANGED => self.decode_element_changed(),
            TAG_DAMAGE => self.decode_damage(),
            TAG_TEARDOWN => self.decode_teardown(),
            _ => None, // unknown tag → stop iteration
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bitmap() -> BitmapEvent {
        BitmapEvent {
            resource: ResourceHandle(3),
            format: PixelFormat::Rgb565,
            size: Size::new(10, 4),
        }
    }

    fn sample_element() -> ElementEvent {
        ElementEvent {
            element: ElementHandle(9),
            resource: ResourceHandle(3),
            layer: 2,
            dest: Rect::new(-4, 7, 10, 4),
        }
    }

    #[test]
    fn records_a_transaction() {
        let mut rec = RecorderSink::new();
        rec.on_bitmap_created(&sample_bitmap());
        rec.on_update_begin(&UpdateBeginEvent {
            update: UpdateHandle(5),
            priority: -2,
        });
        rec.on_element_added(&sample_element());
        rec.on_element_changed(&ElementChangeEvent {
            element: ElementHandle(9),
            mask: ChangeMask::LAYER | ChangeMask::OPACITY,
            source_swapped: false,
        });
        rec.on_update_commit(&UpdateCommitEvent {
            update: UpdateHandle(5),
            enlisted: 2,
            ok: true,
        });
        rec.on_damage(&DamageEvent {
            update: UpdateHandle(5),
            resource: ResourceHandle(3),
            rect: Rect::new(1, 1, 2, 2),
        });

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(events.len(), 6);
        assert_eq!(events[0], RecordedEvent::BitmapCreated(sample_bitmap()));
        match events[1] {
            RecordedEvent::UpdateBegin(e) => assert_eq!(e.priority, -2),
            other => panic!("expected UpdateBegin, got {other:?}"),
        }
        assert_eq!(events[2], RecordedEvent::ElementAdded(sample_element()));
        match events[3] {
            RecordedEvent::ElementChanged(e) => {
                assert_eq!(e.mask, ChangeMask::LAYER | ChangeMask::OPACITY);
                assert!(!e.source_swapped);
            }
            other => panic!("expected ElementChanged, got {other:?}"),
        }
        match events[4] {
            RecordedEvent::UpdateCommit(e) => {
                assert_eq!(e.enlisted, 2);
                assert!(e.ok);
            }
            other => panic!("expected UpdateCommit, got {other:?}"),
        }
        match events[5] {
            RecordedEvent::Damage(e) => assert_eq!(e.rect, Rect::new(1, 1, 2, 2)),
            other => panic!("expected Damage, got {other:?}"),
        }
    }

    #[test]
    fn records_teardown() {
        let mut rec = RecorderSink::new();
        rec.on_element_removed(&sample_element());
        rec.on_bitmap_leaked(&LeakEvent {
            resource: ResourceHandle(3),
            retain_count: 1,
        });
        rec.on_bitmap_freed(&sample_bitmap());
        let summary = TeardownEvent {
            elements_removed: 1,
            bitmaps_closed: 1,
            errors: 1,
        };
        rec.on_teardown(&summary);

        let events: Vec<_> = decode(&rec.into_bytes()).collect();
        assert!(matches!(events[0], RecordedEvent::ElementRemoved(_)));
        assert!(matches!(
            events[1],
            RecordedEvent::BitmapLeaked(LeakEvent {
                retain_count: 1,
                ..
            })
        ));
        assert!(matches!(events[2], RecordedEvent::BitmapFreed(_)));
        assert_eq!(events[3], RecordedEvent::Teardown(summary));
    }

    #[test]
    fn empty_buffer_decodes_to_nothing() {
        let events: Vec<_> = decode(&[]).collect();
        assert!(events.is_empty());
    }

    #[test]
    fn truncated_record_stops_iteration() {
        let mut rec = RecorderSink::new();
        rec.on_bitmap_created(&sample_bitmap());
        rec.on_bitmap_created(&sample_bitmap());
        let bytes = rec.as_bytes();
        let events: Vec<_> = decode(&bytes[..bytes.len() - 1]).collect();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn unknown_tag_stops_iteration() {
        let mut bytes = vec![0xee];
        let mut rec = RecorderSink::new();
        rec.on_bitmap_created(&sample_bitmap());
        bytes.extend_from_slice(rec.as_bytes());
        assert_eq!(decode(&bytes).count(), 0);
    }
}
