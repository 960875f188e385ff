//! Per-cell reference store and its lazy loading state machine.
//!
//! A cell moves `Unloaded → Preloaded → Loaded` and never back, except
//! through an explicit [`CellStore::reset`]. Preloading reads only reference
//! identities; loading materializes every reference, merging the files that
//! touch the cell by identity. A load is staged and committed only once every
//! contributing file has been read, so an error or cancellation leaves the
//! store exactly as it was.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use strata_common::{Diagnostic, DiagnosticSink, FormId};
use strata_esm::records::{read_references, CellRef, ReadMode};
use strata_esm::Category;

use super::{HandleAllocator, LiveRef, RefList, RefState, RuntimeHandle};
use crate::index::{CellEntry, CellId};
use crate::readers::ReaderCache;
use crate::{BaseObject, BaseStore, ContentFile, ContentStack, Error, FxHashMap, Result};

const CATEGORY_COUNT: usize = Category::ALL.len();

/// Loading state of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LoadState {
    /// Nothing read.
    Unloaded,
    /// Reference identities known; nothing materialized.
    Preloaded,
    /// Every reference materialized.
    Loaded,
}

/// Shared session state a load needs.
pub(crate) struct LoadContext<'a> {
    pub stack: &'a ContentStack,
    pub bases: &'a BaseStore,
    pub readers: &'a mut ReaderCache,
    pub handles: &'a mut HandleAllocator,
    pub sink: &'a mut dyn DiagnosticSink,
}

/// References of one cell, split by category.
#[derive(Debug, Clone, Default)]
struct CategoryLists {
    lists: [RefList; CATEGORY_COUNT],
    categories: FxHashMap<FormId, Category>,
}

impl CategoryLists {
    fn list(&self, category: Category) -> &RefList {
        &self.lists[category.index()]
    }

    fn list_mut(&mut self, category: Category) -> &mut RefList {
        &mut self.lists[category.index()]
    }

    fn find(&self, id: FormId) -> Option<&LiveRef> {
        let category = *self.categories.get(&id)?;
        self.list(category).get(id)
    }

    fn find_mut(&mut self, id: FormId) -> Option<&mut LiveRef> {
        self.find_any_mut(id).filter(|r| !r.deleted)
    }

    fn find_any_mut(&mut self, id: FormId) -> Option<&mut LiveRef> {
        let category = *self.categories.get(&id)?;
        self.list_mut(category).get_any_mut(id)
    }

    /// Insert or replace by identity. A replacement in the same category
    /// keeps its position and handle; a category change moves the entry to
    /// the end of its new list.
    fn merge(&mut self, mut live: LiveRef) {
        let category = live.base.category;
        match self.categories.get(&live.ref_num).copied() {
            Some(previous) if previous == category => {
                if let Some(existing) = self.list(previous).get_any(live.ref_num) {
                    live.handle = existing.handle;
                }
            }
            Some(previous) => {
                if let Some(existing) = self.list_mut(previous).remove(live.ref_num) {
                    live.handle = existing.handle;
                }
            }
            None => {}
        }
        self.categories.insert(live.ref_num, category);
        self.list_mut(category).upsert(live);
    }

    fn iter(&self) -> impl Iterator<Item = &LiveRef> {
        self.lists.iter().flat_map(RefList::iter)
    }

    fn live_ids(&self) -> Vec<FormId> {
        let mut ids: Vec<FormId> = self.iter().map(|r| r.ref_num).collect();
        ids.sort_unstable();
        ids
    }
}

/// All references of one cell.
#[derive(Debug, Clone)]
pub struct CellStore {
    id: CellId,
    state: LoadState,
    /// Sorted identities of references that are not deleted.
    ids: Vec<FormId>,
    refs: CategoryLists,
}

impl CellStore {
    /// Create an unloaded store.
    pub fn new(id: CellId) -> Self {
        Self {
            id,
            state: LoadState::Unloaded,
            ids: Vec::new(),
            refs: CategoryLists::default(),
        }
    }

    pub fn id(&self) -> &CellId {
        &self.id
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Read reference identities. Returns `false` if the cell was already
    /// preloaded or loaded.
    ///
    /// Identifiers that do not resolve and skipped records go unreported
    /// here; they are reported when the cell loads.
    pub(crate) fn preload(&mut self, entry: &CellEntry, cx: &mut LoadContext<'_>) -> Result<bool> {
        if self.state != LoadState::Unloaded {
            return Ok(false);
        }

        let bases = cx.bases;
        // identity -> deleted, last file wins
        let mut latest: FxHashMap<FormId, bool> = FxHashMap::default();
        for context in &entry.contexts {
            let Some(file) = cx.stack.get(context.file_index()) else {
                continue;
            };
            let reader = cx.readers.restore(context)?;
            let mut skipped: Vec<Diagnostic> = Vec::new();
            read_references(reader, ReadMode::IdsOnly, &mut skipped, |stored: CellRef| {
                let Some(id) = file.remap().remap(stored.ref_num) else {
                    return Ok(());
                };
                let placeable = stored.deleted
                    || file
                        .lookup_id(&stored.base)
                        .is_some_and(|base| bases.contains(&base));
                if placeable {
                    latest.insert(id, stored.deleted);
                }
                Ok::<_, Error>(())
            })?;
        }

        let mut ids: Vec<FormId> = latest
            .into_iter()
            .filter_map(|(id, deleted)| (!deleted).then_some(id))
            .collect();
        ids.sort_unstable();
        tracing::debug!(cell = %self.id, references = ids.len(), "preloaded cell");
        self.ids = ids;
        self.state = LoadState::Preloaded;
        Ok(true)
    }

    /// Materialize every reference. Returns `false` if the cell was already
    /// loaded.
    ///
    /// `cancel` is checked before each reference; once it is set the load
    /// stops with [`Error::Cancelled`] and the store keeps its prior state.
    /// Diagnostics are reported only when the load commits.
    pub(crate) fn load(
        &mut self,
        entry: &CellEntry,
        cx: &mut LoadContext<'_>,
        cancel: Option<&AtomicBool>,
    ) -> Result<bool> {
        if self.state == LoadState::Loaded {
            return Ok(false);
        }

        let cell = self.id.to_string();
        let mut staging = CategoryLists::default();
        let mut pending: Vec<Diagnostic> = Vec::new();
        let mut count = 0usize;

        for context in &entry.contexts {
            let Some(file) = cx.stack.get(context.file_index()) else {
                continue;
            };
            let reader = cx.readers.restore(context)?;
            let handles = &mut *cx.handles;
            let bases = cx.bases;
            let mut skipped: Vec<Diagnostic> = Vec::new();
            let result = read_references(reader, ReadMode::Full, &mut skipped, |stored: CellRef| {
                if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                    return Err(Error::Cancelled);
                }
                count += 1;
                merge_stored(&mut staging, stored, file, &cell, bases, handles, &mut pending);
                Ok(())
            });
            if let Err(err) = result {
                if matches!(err, Error::Cancelled) {
                    tracing::debug!(cell = %self.id, "cell load cancelled");
                }
                return Err(err);
            }
            pending.append(&mut skipped);
        }

        for diagnostic in pending {
            cx.sink.report(diagnostic);
        }
        self.ids = staging.live_ids();
        self.refs = staging;
        self.state = LoadState::Loaded;
        tracing::debug!(
            cell = %self.id,
            read = count,
            live = self.ids.len(),
            "loaded cell"
        );
        Ok(true)
    }

    /// Drop everything and return to [`LoadState::Unloaded`].
    pub fn reset(&mut self) {
        self.state = LoadState::Unloaded;
        self.ids.clear();
        self.refs = CategoryLists::default();
    }

    /// Check whether a reference exists in the cell.
    ///
    /// Always `false` while unloaded. Preloaded cells answer with a binary
    /// search; loaded cells scan every category.
    pub fn has_id(&self, id: FormId) -> bool {
        match self.state {
            LoadState::Unloaded => false,
            LoadState::Preloaded => self.ids.binary_search(&id).is_ok(),
            LoadState::Loaded => self.iter().any(|r| r.ref_num == id),
        }
    }

    /// Sorted identities known to the cell. Empty while unloaded.
    pub fn ids(&self) -> &[FormId] {
        &self.ids
    }

    /// Find a reference that is not deleted.
    pub fn search(&self, id: FormId) -> Option<&LiveRef> {
        self.refs.find(id)
    }

    /// Find a reference that is not deleted, for modification.
    pub fn search_mut(&mut self, id: FormId) -> Option<&mut LiveRef> {
        self.refs.find_mut(id)
    }

    /// Find a reference by its runtime handle.
    pub fn search_by_handle(&self, handle: RuntimeHandle) -> Option<&LiveRef> {
        self.iter().find(|r| r.handle == handle)
    }

    /// Get the references of one category.
    pub fn refs(&self, category: Category) -> &RefList {
        self.refs.list(category)
    }

    /// Iterate over every reference that is not deleted, category by category.
    pub fn iter(&self) -> impl Iterator<Item = &LiveRef> {
        self.refs.iter()
    }

    /// Iterate over references whose state must be persisted.
    pub fn changed(&self) -> impl Iterator<Item = &LiveRef> {
        self.iter().filter(|r| r.is_changed() && !r.is_spent())
    }

    /// Number of references that are not deleted.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    fn require_loaded(&self) -> Result<()> {
        if self.state != LoadState::Loaded {
            return Err(Error::CellNotLoaded(self.id.clone()));
        }
        Ok(())
    }

    /// Add a reference created at runtime.
    pub(crate) fn place(
        &mut self,
        ref_num: FormId,
        base: Arc<BaseObject>,
        state: RefState,
        handles: &mut HandleAllocator,
    ) -> Result<RuntimeHandle> {
        self.require_loaded()?;
        let handle = handles.allocate();
        self.refs.merge(LiveRef {
            ref_num,
            base,
            source: None,
            original: state.clone(),
            state,
            deleted: false,
            handle,
        });
        self.ids = self.refs.live_ids();
        Ok(handle)
    }

    /// Overwrite the state of a reference loaded from content. Deleted
    /// entries are left untouched.
    pub(crate) fn apply_state(&mut self, id: FormId, state: RefState) -> Result<Applied> {
        self.require_loaded()?;
        Ok(match self.refs.find_any_mut(id) {
            Some(live) if live.deleted => Applied::Deleted,
            Some(live) => {
                live.state = state;
                Applied::Updated
            }
            None => Applied::Missing,
        })
    }

    /// Drop runtime references whose count reached zero.
    pub fn purge_spent(&mut self) -> usize {
        let purged: usize = self.refs.lists.iter_mut().map(RefList::purge_spent).sum();
        if purged > 0 {
            let lists = &self.refs.lists;
            self.refs
                .categories
                .retain(|id, category| lists[category.index()].slot_of(*id).is_some());
            self.ids = self.refs.live_ids();
        }
        purged
    }

    /// Iterate mutably over every reference that is not deleted.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut LiveRef> {
        self.refs.lists.iter_mut().flat_map(RefList::iter_mut)
    }
}

/// Outcome of [`CellStore::apply_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Applied {
    Updated,
    /// The active stack deletes the reference.
    Deleted,
    Missing,
}

/// Merge one stored reference into a staged load.
fn merge_stored(
    staging: &mut CategoryLists,
    stored: CellRef,
    file: &ContentFile,
    cell: &str,
    bases: &BaseStore,
    handles: &mut HandleAllocator,
    sink: &mut dyn DiagnosticSink,
) {
    let Some(ref_num) = file.resolve_form(stored.ref_num, sink) else {
        return;
    };

    if stored.deleted {
        // Marked, not removed: a later file may define it again.
        if let Some(existing) = staging.find_any_mut(ref_num) {
            existing.deleted = true;
            existing.source = Some(file.index);
        }
        return;
    }

    let Some(base_id) = file.resolve_id(&stored.base, sink) else {
        return;
    };
    let Some(base) = bases.get(&base_id) else {
        sink.report(Diagnostic::MissingBase {
            cell: cell.to_string(),
            reference: ref_num,
            base: base_id,
        });
        return;
    };

    let state = RefState::from_stored(&stored, file, sink);
    let handle = match staging.find_any_mut(ref_num) {
        Some(existing) => existing.handle,
        None => handles.allocate(),
    };
    staging.merge(LiveRef {
        ref_num,
        base: Arc::clone(base),
        source: Some(file.index),
        original: state.clone(),
        state,
        deleted: false,
        handle,
    });
}

#[cfg(test)]
mod tests {
    use strata_common::RefId;

    use super::*;

    fn base(id: &str, category: Category) -> Arc<BaseObject> {
        Arc::new(BaseObject {
            id: RefId::name(id),
            category,
            editor_id: None,
            model: None,
            name: None,
            file: 0,
        })
    }

    fn live(ref_num: u32, base: Arc<BaseObject>, handle: RuntimeHandle) -> LiveRef {
        LiveRef {
            ref_num: FormId::new(0, ref_num),
            base,
            source: Some(0),
            original: RefState::default(),
            state: RefState::default(),
            deleted: false,
            handle,
        }
    }

    #[test]
    fn test_merge_keeps_position_and_handle() {
        let mut handles = HandleAllocator::new();
        let rock = base("rock", Category::Static);
        let mut lists = CategoryLists::default();
        let first = handles.allocate();
        lists.merge(live(1, Arc::clone(&rock), first));
        lists.merge(live(2, Arc::clone(&rock), handles.allocate()));

        let mut moved = live(1, Arc::clone(&rock), handles.allocate());
        moved.state.scale = 3.0;
        lists.merge(moved);

        let order: Vec<u32> = lists
            .list(Category::Static)
            .iter()
            .map(|r| r.ref_num.local_id())
            .collect();
        assert_eq!(order, [1, 2]);
        let replaced = lists.find(FormId::new(0, 1)).unwrap();
        assert_eq!(replaced.handle, first);
        assert_eq!(replaced.state.scale, 3.0);
    }

    #[test]
    fn test_merge_moves_between_categories() {
        let mut handles = HandleAllocator::new();
        let mut lists = CategoryLists::default();
        let handle = handles.allocate();
        lists.merge(live(1, base("crate", Category::Static), handle));
        lists.merge(live(1, base("chest", Category::Container), handles.allocate()));

        assert!(lists.list(Category::Static).is_empty());
        let moved = lists.list(Category::Container).get(FormId::new(0, 1)).unwrap();
        assert_eq!(moved.handle, handle);
        assert_eq!(lists.live_ids(), [FormId::new(0, 1)]);
    }

    fn loaded_store(refs: impl IntoIterator<Item = LiveRef>) -> CellStore {
        let mut store = CellStore::new(CellId::named("vault"));
        for live in refs {
            store.refs.merge(live);
        }
        store.ids = store.refs.live_ids();
        store.state = LoadState::Loaded;
        store
    }

    #[test]
    fn test_apply_state_skips_deleted() {
        let mut handles = HandleAllocator::new();
        let rock = base("rock", Category::Static);
        let mut gone = live(2, Arc::clone(&rock), handles.allocate());
        gone.deleted = true;
        let mut store = loaded_store([live(1, Arc::clone(&rock), handles.allocate()), gone]);

        let mut state = RefState::default();
        state.scale = 4.0;
        assert_eq!(store.apply_state(FormId::new(0, 1), state.clone()).unwrap(), Applied::Updated);
        assert_eq!(store.apply_state(FormId::new(0, 2), state.clone()).unwrap(), Applied::Deleted);
        assert_eq!(store.apply_state(FormId::new(0, 9), state).unwrap(), Applied::Missing);

        assert_eq!(store.search(FormId::new(0, 1)).unwrap().state.scale, 4.0);
        let deleted = store.refs(Category::Static).iter_all().nth(1).unwrap();
        assert_eq!(deleted.state.scale, 1.0);
    }

    #[test]
    fn test_purge_spent_keeps_remaining_slots() {
        let mut handles = HandleAllocator::new();
        let rock = base("rock", Category::Static);
        let mut store = loaded_store([live(1, Arc::clone(&rock), handles.allocate())]);
        for serial in 1..=2 {
            store
                .place(FormId::runtime(serial), Arc::clone(&rock), RefState::default(), &mut handles)
                .unwrap();
        }
        let kept = store.search(FormId::runtime(2)).unwrap().handle;

        store.search_mut(FormId::runtime(1)).unwrap().state.count = 0;
        assert_eq!(store.changed().count(), 1);
        assert_eq!(store.purge_spent(), 1);
        assert_eq!(store.purge_spent(), 0);

        assert!(!store.has_id(FormId::runtime(1)));
        assert_eq!(store.ids(), [FormId::new(0, 1), FormId::runtime(2)]);
        let statics = store.refs(Category::Static);
        assert_eq!(statics.len(), 2);
        assert_eq!(statics.get(FormId::runtime(2)).unwrap().handle, kept);
        assert!(statics.get(FormId::new(0, 1)).is_some());
        assert!(statics.get(FormId::runtime(1)).is_none());
        assert!(store.search_mut(FormId::runtime(2)).is_some());
    }

    #[test]
    fn test_unloaded_cell_has_nothing() {
        let mut store = CellStore::new(CellId::named("vault"));
        assert_eq!(store.state(), LoadState::Unloaded);
        assert!(!store.has_id(FormId::new(0, 1)));
        assert!(store.is_empty());

        let mut handles = HandleAllocator::new();
        let err = store
            .place(
                FormId::runtime(1),
                base("rock", Category::Static),
                RefState::default(),
                &mut handles,
            )
            .unwrap_err();
        assert!(matches!(err, Error::CellNotLoaded(_)));
    }
}
