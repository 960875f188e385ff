//! The session: one content stack, its index and every cell loaded from it.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use strata_common::{Diagnostic, DiagnosticSink, Diagnostics, FormId, RefId, Transcoder};
use strata_esm::records::{Destination, Teleport};
use strata_esm::{EsmReader, FileHeader};

use crate::index::{CellId, WorldIndex};
use crate::readers::ReaderCache;
use crate::save::{self, RestoreSummary, SaveSummary, SavedCellId};
use crate::store::{
    Applied, CellStore, HandleAllocator, LiveRef, LoadContext, LoadState, RefState, RuntimeHandle,
};
use crate::{BaseStore, ContentStack, Error, FxHashMap, IndexRemap, Result, SessionConfig};

/// Largest serial a runtime reference id can carry.
const MAX_RUNTIME_SERIAL: u32 = 0x00FF_FFFF;

/// An opened content stack and the world loaded from it.
///
/// # Example
///
/// ```no_run
/// use strata_world::{CellId, Session, SessionConfig};
///
/// let mut session = Session::open(SessionConfig::new("Data/Base.esm").with_plugin("Data/Patch.esp"))?;
/// let cell = CellId::named("Vault");
/// if let Some(store) = session.load(&cell)? {
///     for live in store.iter() {
///         println!("{} {}", live.ref_num, live.base.id);
///     }
/// }
/// session.save("quick.sav")?;
/// # Ok::<(), strata_world::Error>(())
/// ```
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    stack: ContentStack,
    bases: BaseStore,
    index: WorldIndex,
    cells: FxHashMap<CellId, CellStore>,
    readers: ReaderCache,
    handles: HandleAllocator,
    runtime_serial: u32,
    diagnostics: Diagnostics,
}

impl Session {
    /// Open every content file in the configuration and index it.
    ///
    /// Only base records and cell locations are read here; references stay on
    /// disk until their cell is preloaded or loaded.
    pub fn open(config: SessionConfig) -> Result<Self> {
        let capacity = config.validate()?;
        let transcoder = Transcoder::new(config.encoding);
        let paths: Vec<PathBuf> = config.files().map(Path::to_path_buf).collect();

        let mut session = Self {
            config,
            stack: ContentStack::default(),
            bases: BaseStore::new(),
            index: WorldIndex::new(),
            cells: FxHashMap::default(),
            readers: ReaderCache::new(capacity, transcoder),
            handles: HandleAllocator::new(),
            runtime_serial: 0,
            diagnostics: Diagnostics::new(),
        };

        for path in &paths {
            let mut reader = EsmReader::open(path, session.stack.len(), transcoder)?;
            let file = session.stack.push(&reader, &mut session.diagnostics)?;
            session.index.add_file(
                &mut reader,
                file,
                &mut session.bases,
                &mut session.diagnostics,
            )?;
            session.readers.insert(reader);
        }

        tracing::info!(
            files = session.stack.len(),
            cells = session.index.cell_count(),
            bases = session.bases.len(),
            diagnostics = session.diagnostics.len(),
            "opened session"
        );
        Ok(session)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn stack(&self) -> &ContentStack {
        &self.stack
    }

    pub fn bases(&self) -> &BaseStore {
        &self.bases
    }

    pub fn index(&self) -> &WorldIndex {
        &self.index
    }

    /// Get the pool of open content file readers.
    pub fn readers(&self) -> &ReaderCache {
        &self.readers
    }

    /// Get every diagnostic reported so far.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.diagnostics.entries()
    }

    /// Remove and return every diagnostic reported so far.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.diagnostics.drain()
    }

    /// Check whether a base record exists in the stack.
    pub fn exists(&self, id: &RefId) -> bool {
        self.bases.contains(id)
    }

    /// Iterate over every indexed cell, in first-seen order.
    pub fn cell_ids(&self) -> impl Iterator<Item = &CellId> {
        self.index.cell_ids()
    }

    /// Get a cell's load state, or `None` if the cell is not indexed.
    pub fn cell_state(&self, id: &CellId) -> Option<LoadState> {
        self.index.cell(id)?;
        Some(
            self.cells
                .get(id)
                .map_or(LoadState::Unloaded, CellStore::state),
        )
    }

    /// Get a cell's store if it has been preloaded or loaded.
    pub fn cell(&self, id: &CellId) -> Option<&CellStore> {
        self.cells.get(id)
    }

    /// Read a cell's reference identities. Returns `false` for a cell that is
    /// not indexed or already past this stage.
    pub fn preload(&mut self, id: &CellId) -> Result<bool> {
        let Some(entry) = self.index.cell(id) else {
            return Ok(false);
        };
        let store = self
            .cells
            .entry(id.clone())
            .or_insert_with(|| CellStore::new(id.clone()));
        let mut cx = LoadContext {
            stack: &self.stack,
            bases: &self.bases,
            readers: &mut self.readers,
            handles: &mut self.handles,
            sink: &mut self.diagnostics,
        };
        store.preload(entry, &mut cx)
    }

    /// Load a cell, returning `None` if it is not indexed.
    pub fn load(&mut self, id: &CellId) -> Result<Option<&CellStore>> {
        self.load_with(id, None)
    }

    /// Load a cell, giving up with [`Error::Cancelled`] once `cancel` is set.
    ///
    /// A cancelled load leaves the cell in the state it had before the call.
    pub fn load_cancellable(
        &mut self,
        id: &CellId,
        cancel: &AtomicBool,
    ) -> Result<Option<&CellStore>> {
        self.load_with(id, Some(cancel))
    }

    fn load_with(&mut self, id: &CellId, cancel: Option<&AtomicBool>) -> Result<Option<&CellStore>> {
        let Some(entry) = self.index.cell(id) else {
            return Ok(None);
        };
        let store = self
            .cells
            .entry(id.clone())
            .or_insert_with(|| CellStore::new(id.clone()));
        let mut cx = LoadContext {
            stack: &self.stack,
            bases: &self.bases,
            readers: &mut self.readers,
            handles: &mut self.handles,
            sink: &mut self.diagnostics,
        };
        store.load(entry, &mut cx, cancel)?;
        Ok(Some(store))
    }

    fn loaded(&self, id: &CellId) -> Result<&CellStore> {
        if self.index.cell(id).is_none() {
            return Err(Error::UnknownCell(id.clone()));
        }
        self.cells
            .get(id)
            .filter(|store| store.state() == LoadState::Loaded)
            .ok_or_else(|| Error::CellNotLoaded(id.clone()))
    }

    /// Find a reference in a loaded cell.
    pub fn search(&self, cell: &CellId, id: FormId) -> Result<Option<&LiveRef>> {
        Ok(self.loaded(cell)?.search(id))
    }

    /// Find a reference in a loaded cell for modification.
    pub fn search_mut(&mut self, cell: &CellId, id: FormId) -> Result<Option<&mut LiveRef>> {
        Ok(loaded_mut(&self.index, &mut self.cells, cell)?.search_mut(id))
    }

    /// Find a reference by runtime handle across every loaded cell.
    pub fn search_by_runtime_handle(&self, handle: RuntimeHandle) -> Option<(&CellId, &LiveRef)> {
        self.cells
            .iter()
            .find_map(|(id, store)| store.search_by_handle(handle).map(|live| (id, live)))
    }

    /// Spawn a new reference of `base` in a loaded cell.
    pub fn place(&mut self, cell: &CellId, base: &RefId, state: RefState) -> Result<RuntimeHandle> {
        let object = self
            .bases
            .get(base)
            .cloned()
            .ok_or_else(|| Error::UnknownBase(base.clone()))?;
        if self.runtime_serial >= MAX_RUNTIME_SERIAL {
            return Err(Error::RuntimeIdsExhausted);
        }
        let ref_num = FormId::runtime(self.runtime_serial + 1);
        let store = loaded_mut(&self.index, &mut self.cells, cell)?;
        let handle = store.place(ref_num, object, state, &mut self.handles)?;
        self.runtime_serial += 1;
        tracing::debug!(%cell, %ref_num, %handle, "placed reference");
        Ok(handle)
    }

    /// Drop everything loaded for a cell. Returns `false` if nothing was loaded.
    pub fn reset(&mut self, cell: &CellId) -> bool {
        match self.cells.get_mut(cell) {
            Some(store) if store.state() != LoadState::Unloaded => {
                store.reset();
                true
            }
            _ => false,
        }
    }

    /// Write every changed reference of every loaded cell to `path`.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<SaveSummary> {
        for store in self.cells.values_mut() {
            store.purge_spent();
        }
        let cells = self
            .index
            .cell_ids()
            .filter_map(|id| self.cells.get(id))
            .filter(|store| store.state() == LoadState::Loaded);
        save::write_save(path.as_ref(), &self.stack, cells)
    }

    /// Read the header of a save without applying it.
    ///
    /// The master list names the stack the save was written against; pass it
    /// to [`IndexRemap::by_name`] to build the table [`Session::restore`] needs.
    pub fn read_save_header(path: impl AsRef<Path>) -> Result<FileHeader> {
        save::open_save(path.as_ref()).map(|reader| reader.header().clone())
    }

    /// Apply a save written by [`Session::save`].
    ///
    /// `remap` maps the save's mod indices onto the active stack. Every cell
    /// named by the save is loaded first. References that cannot be matched
    /// against the active stack are dropped and reported.
    pub fn restore(&mut self, path: impl AsRef<Path>, remap: &IndexRemap) -> Result<RestoreSummary> {
        let path = path.as_ref();
        let mut reader = save::open_save(path)?;
        let saved_cells = save::read_cells(&mut reader)?;
        let source = reader.name().to_string();

        let mut summary = RestoreSummary::default();
        for saved in saved_cells {
            let label = saved.label();
            let id = match saved.id {
                SavedCellId::Named(name) => CellId::named(name),
                SavedCellId::Grid { x, y } => CellId::Grid { x, y },
                SavedCellId::Form(raw) => match remap.remap(raw) {
                    Some(form) => CellId::Form(form),
                    None => {
                        self.diagnostics.report(Diagnostic::UnresolvedIdentifier {
                            file: source.clone(),
                            raw,
                        });
                        summary.dropped += saved.refs.len();
                        continue;
                    }
                },
            };
            if self.load(&id)?.is_none() {
                self.diagnostics.report(Diagnostic::MissingCell { cell: label });
                summary.dropped += saved.refs.len();
                continue;
            }
            summary.cells += 1;

            for saved_ref in saved.refs {
                if self.restore_ref(&id, saved_ref, remap)? {
                    summary.restored += 1;
                } else {
                    summary.dropped += 1;
                }
            }
        }

        tracing::info!(
            path = %path.display(),
            cells = summary.cells,
            restored = summary.restored,
            dropped = summary.dropped,
            "restored save"
        );
        Ok(summary)
    }

    /// Apply one saved reference to a loaded cell. Returns `false` if it was dropped.
    fn restore_ref(&mut self, cell: &CellId, saved: save::SavedRef, remap: &IndexRemap) -> Result<bool> {
        let dropped = |reason| Diagnostic::DroppedSavedReference {
            cell: cell.to_string(),
            reference: saved.ref_num,
            reason,
        };

        let Some(ref_num) = remap.remap(saved.ref_num) else {
            self.diagnostics.report(dropped("originating file not loaded"));
            return Ok(false);
        };
        let Some(base_id) = remap_ref_id(&saved.base, remap) else {
            self.diagnostics.report(dropped("base record file not loaded"));
            return Ok(false);
        };
        let Some(base) = self.bases.get(&base_id).cloned() else {
            self.diagnostics.report(Diagnostic::MissingBase {
                cell: cell.to_string(),
                reference: ref_num,
                base: base_id,
            });
            return Ok(false);
        };
        if base.category != saved.category {
            self.diagnostics.report(dropped("base record changed category"));
            return Ok(false);
        }
        let state = remap_state(saved.state, remap);

        let store = loaded_mut(&self.index, &mut self.cells, cell)?;
        if ref_num.is_runtime() {
            store.place(ref_num, base, state, &mut self.handles)?;
            self.runtime_serial = self.runtime_serial.max(ref_num.local_id());
            return Ok(true);
        }
        let reason = match store.apply_state(ref_num, state)? {
            Applied::Updated => return Ok(true),
            Applied::Deleted => "reference deleted",
            Applied::Missing => "reference no longer exists",
        };
        self.diagnostics.report(dropped(reason));
        Ok(false)
    }
}

fn loaded_mut<'a>(
    index: &WorldIndex,
    cells: &'a mut FxHashMap<CellId, CellStore>,
    id: &CellId,
) -> Result<&'a mut CellStore> {
    if index.cell(id).is_none() {
        return Err(Error::UnknownCell(id.clone()));
    }
    cells
        .get_mut(id)
        .filter(|store| store.state() == LoadState::Loaded)
        .ok_or_else(|| Error::CellNotLoaded(id.clone()))
}

fn remap_ref_id(id: &RefId, remap: &IndexRemap) -> Option<RefId> {
    match id {
        RefId::Name(_) => Some(id.clone()),
        RefId::Form(form) => remap.remap(*form).map(RefId::Form),
    }
}

/// Rewrite the identifiers inside a saved state. Keys and door links whose
/// file is gone are cleared.
fn remap_state(mut state: RefState, remap: &IndexRemap) -> RefState {
    state.key = state.key.and_then(|key| remap_ref_id(&key, remap));
    state.teleport = state.teleport.and_then(|teleport| {
        let destination = match teleport.destination {
            Destination::Door(door) => Destination::Door(remap.remap(door)?),
            other => other,
        };
        Some(Teleport {
            destination,
            position: teleport.position,
        })
    });
    state
}
