// Copyright 2026 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Slot storage for a compositor's live elements.

use core::fmt;

/// A handle to an element owned by a [`Compositor`](crate::Compositor).
///
/// Contains both a slot index and a generation counter so that stale handles
/// can be detected after an element is removed and the slot is reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId {
    idx: u32,
    generation: u32,
}

impl ElementId {
    /// Returns the raw slot index (for diagnostics only).
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.idx
    }

    /// Returns the generation counter.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementId({}@gen{})", self.idx, self.generation)
    }
}

/// Generational slots. Removed slots are recycled via a free list.
#[derive(Debug)]
pub(crate) struct Slots<T> {
    values: Vec<Option<T>>,
    generation: Vec<u32>,
    /// Highest generation each slot has ever had.
    issued: Vec<u32>,
    free_list: Vec<u32>,
}

impl<T> Default for Slots<T> {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            generation: Vec::new(),
            issued: Vec::new(),
            free_list: Vec::new(),
        }
    }
}

impl<T> Slots<T> {
    pub(crate) fn insert(&mut self, value: T) -> ElementId {
        if let Some(idx) = self.free_list.pop() {
            self.values[idx as usize] = Some(value);
            return ElementId {
                idx,
                generation: self.generation[idx as usize],
            };
        }
        let idx = u32::try_from(self.values.len()).unwrap_or(u32::MAX);
        self.values.push(Some(value));
        self.generation.push(0);
        self.issued.push(0);
        ElementId { idx, generation: 0 }
    }

    pub(crate) fn get(&self, id: ElementId) -> Option<&T> {
        if self.generation.get(id.idx as usize) != Some(&id.generation) {
            return None;
        }
        self.values.get(id.idx as usize)?.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: ElementId) -> Option<&mut T> {
        if self.generation.get(id.idx as usize) != Some(&id.generation) {
            return None;
        }
        self.values.get_mut(id.idx as usize)?.as_mut()
    }

    pub(crate) fn remove(&mut self, id: ElementId) -> Option<T> {
        self.get(id)?;
        let value = self.values[id.idx as usize].take();
        // Bump generation so old handles immediately fail lookup.
        self.retire(id.idx as usize);
        self.free_list.push(id.idx);
        value
    }

    fn retire(&mut self, idx: usize) {
        let next = self.issued[idx].wrapping_add(1);
        self.generation[idx] = next;
        self.issued[idx] = next;
    }

    /// Puts `value` back under an id that was removed earlier.
    ///
    /// Returns `value` if the slot is taken. Later removals still move the
    /// slot past every generation it has had, so ids issued in between
    /// stay stale.
    pub(crate) fn restore(&mut self, id: ElementId, value: T) -> Result<(), T> {
        let idx = id.idx as usize;
        if !matches!(self.values.get(idx), Some(None)) {
            return Err(value);
        }
        self.values[idx] = Some(value);
        self.generation[idx] = id.generation;
        self.free_list.retain(|&free| free != id.idx);
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.values.len() - self.free_list.len()
    }

    /// Removes every value, in slot order.
    pub(crate) fn drain(&mut self) -> Vec<(ElementId, T)> {
        let mut out = Vec::with_capacity(self.len());
        for idx in 0..self.values.len() {
            if let Some(value) = self.values[idx].take() {
                let idx = u32::try_from(idx).unwrap_or(u32::MAX);
                let generation = self.generation[idx as usize];
                self.retire(idx as usize);
                self.free_list.push(idx);
                out.push((ElementId { idx, generation }, value));
            }
        }
        out
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (ElementId, &T)> {
        self.values.iter().enumerate().filter_map(|(idx, slot)| {
            let value = slot.as_ref()?;
            let idx = u32::try_from(idx).ok()?;
            Some((
                ElementId {
                    idx,
                    generation: self.generation[idx as usize],
                },
                value,
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let mut slots = Slots::default();
        let a = slots.insert("a");
        let b = slots.insert("b");
        assert_eq!(slots.get(a), Some(&"a"));
        assert_eq!(slots.get(b), Some(&"b"));
        assert_eq!(slots.len(), 2);
    }

    #[test]
    fn removed_slot_is_reused_with_new_generation() {
        let mut slots = Slots::default();
        let a = slots.insert(1);
        assert_eq!(slots.remove(a), Some(1));
        let b = slots.insert(2);
        assert_eq!(a.index(), b.index());
        assert_ne!(a.generation(), b.generation());
        assert_eq!(slots.get(a), None);
        assert_eq!(slots.get(b), Some(&2));
    }

    #[test]
    fn stale_remove_is_none() {
        let mut slots = Slots::default();
        let a = slots.insert(1);
        slots.remove(a);
        assert_eq!(slots.remove(a), None);
        assert_eq!(slots.len(), 0);
    }

    #[test]
    fn drain_empties_in_slot_order() {
        let mut slots = Slots::default();
        let a = slots.insert('a');
        let b = slots.insert('b');
        let c = slots.insert('c');
        slots.remove(b);
        let drained = slots.drain();
        assert_eq!(drained, vec![(a, 'a'), (c, 'c')]);
        assert_eq!(slots.len(), 0);
        assert_eq!(slots.get(a), None);
    }

    #[test]
    fn restored_id_is_live_and_later_ids_stay_stale() {
        let mut slots = Slots::default();
        let a = slots.insert('a');
        slots.remove(a);
        let b = slots.insert('b');
        slots.remove(b);
        assert_eq!(slots.restore(a, 'a'), Ok(()));
        assert_eq!(slots.get(a), Some(&'a'));
        assert_eq!(slots.get(b), None);
        assert_eq!(slots.len(), 1);

        slots.remove(a);
        let c = slots.insert('c');
        assert_eq!(c.index(), a.index());
        assert_ne!(c.generation(), a.generation());
        assert_ne!(c.generation(), b.generation());
        assert_eq!(slots.get(b), None);
    }

    #[test]
    fn restore_into_a_taken_slot_fails() {
        let mut slots = Slots::default();
        let a = slots.insert(1);
        assert_eq!(slots.restore(a, 2), Err(2));
        assert_eq!(slots.get(a), Some(&1));
    }

    #[test]
    fn iter_skips_free_slots() {
        let mut slots = Slots::default();
        let a = slots.insert(10);
        let b = slots.insert(20);
        slots.remove(a);
        let seen: Vec<_> = slots.iter().collect();
        assert_eq!(seen, vec![(b, &20)]);
    }
}
