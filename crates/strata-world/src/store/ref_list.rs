use strata_common::FormId;

use super::LiveRef;
use crate::FxHashMap;

/// Insertion-ordered references of one category, indexed by identity.
#[derive(Debug, Clone, Default)]
pub struct RefList {
    refs: Vec<LiveRef>,
    slots: FxHashMap<FormId, usize>,
}

impl RefList {
    /// Get the slot of a reference, deleted or not.
    pub(crate) fn slot_of(&self, id: FormId) -> Option<usize> {
        self.slots.get(&id).copied()
    }

    /// Insert or replace by identity. A replacement keeps its slot.
    pub(crate) fn upsert(&mut self, live: LiveRef) {
        match self.slots.get(&live.ref_num) {
            Some(&slot) => self.refs[slot] = live,
            None => {
                self.slots.insert(live.ref_num, self.refs.len());
                self.refs.push(live);
            }
        }
    }

    /// Remove a reference, shifting later ones down.
    pub(crate) fn remove(&mut self, id: FormId) -> Option<LiveRef> {
        let slot = self.slots.remove(&id)?;
        let removed = self.refs.remove(slot);
        for index in self.slots.values_mut() {
            if *index > slot {
                *index -= 1;
            }
        }
        Some(removed)
    }

    pub(crate) fn get_any(&self, id: FormId) -> Option<&LiveRef> {
        self.slot_of(id).map(|slot| &self.refs[slot])
    }

    pub(crate) fn get_any_mut(&mut self, id: FormId) -> Option<&mut LiveRef> {
        let slot = self.slot_of(id)?;
        Some(&mut self.refs[slot])
    }

    /// Get a reference that is not deleted.
    pub fn get(&self, id: FormId) -> Option<&LiveRef> {
        self.get_any(id).filter(|r| !r.deleted)
    }

    /// Iterate over references that are not deleted, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &LiveRef> {
        self.refs.iter().filter(|r| !r.deleted)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut LiveRef> {
        self.refs.iter_mut().filter(|r| !r.deleted)
    }

    /// Iterate over every entry, deleted ones included.
    pub fn iter_all(&self) -> std::slice::Iter<'_, LiveRef> {
        self.refs.iter()
    }

    /// Number of references that are not deleted.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Drop spent runtime references.
    pub(crate) fn purge_spent(&mut self) -> usize {
        let before = self.refs.len();
        self.refs.retain(|r| !r.is_spent());
        let purged = before - self.refs.len();
        if purged > 0 {
            self.slots = self
                .refs
                .iter()
                .enumerate()
                .map(|(slot, r)| (r.ref_num, slot))
                .collect();
        }
        purged
    }
}
