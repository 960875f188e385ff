//! Catalog of where every cell and base record lives.
//!
//! The index is built once per session by walking each content file from its
//! first record. For every cell it keeps one [`ReaderContext`] per
//! contributing file, positioned at the cell's first reference; loading the
//! cell later restores those contexts in stack order instead of rescanning.

use std::fmt;
use std::str::FromStr;

use hashbrown::hash_map::Entry;

use strata_common::{Diagnostic, DiagnosticSink, FormId, RefId};
use strata_esm::dialect::tags;
use strata_esm::records::{BaseRecord, CellRecord};
use strata_esm::{
    walk, Category, Descend, Dialect, EsmReader, GroupHeader, GroupKind, ReaderContext,
    RecordHeader, RecordKind, Visitor,
};

use crate::{BaseObject, BaseStore, ContentFile, Error, FxHashMap, Result};

/// Identity of a cell across the stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CellId {
    /// Dialect A interior, by lowercased name.
    Named(String),
    /// Dialect A exterior, by grid coordinates.
    Grid { x: i32, y: i32 },
    /// Dialect B cell, by form id in the active stack.
    Form(FormId),
}

impl CellId {
    /// Build a named id, normalizing case.
    pub fn named(name: impl AsRef<str>) -> Self {
        Self::Named(name.as_ref().to_ascii_lowercase())
    }

    fn of_record(
        file: &ContentFile,
        cell: &CellRecord,
        sink: &mut dyn DiagnosticSink,
    ) -> Option<Self> {
        match file.dialect() {
            Dialect::Tes3 => Some(match cell.grid {
                Some((x, y)) if !cell.is_interior() => Self::Grid { x, y },
                _ => Self::named(&cell.name),
            }),
            Dialect::Tes4 => file.resolve_form(cell.form_id, sink).map(Self::Form),
        }
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Grid { x, y } => write!(f, "{x},{y}"),
            Self::Form(id) => write!(f, "{id}"),
        }
    }
}

impl FromStr for CellId {
    type Err = std::num::ParseIntError;

    /// Parse `x,y` as a grid cell, `#XXXXXXXX` as a form id and anything else
    /// as a name.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if let Some(hex) = s.strip_prefix('#') {
            return hex.parse().map(Self::Form);
        }
        if let Some((x, y)) = s.split_once(',') {
            if let (Ok(x), Ok(y)) = (x.trim().parse(), y.trim().parse()) {
                return Ok(Self::Grid { x, y });
            }
        }
        Ok(Self::named(s))
    }
}

/// Everything known about one cell before it is loaded.
#[derive(Debug, Clone)]
pub struct CellEntry {
    pub id: CellId,
    /// The cell record from the last file that defines it.
    pub record: CellRecord,
    /// One context per contributing file, in stack order.
    pub contexts: Vec<ReaderContext>,
    pub deleted: bool,
}

impl CellEntry {
    /// Stack positions of the files contributing references.
    pub fn files(&self) -> impl Iterator<Item = usize> + '_ {
        self.contexts.iter().map(ReaderContext::file_index)
    }
}

/// Where a base record was last defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLocation {
    pub file: usize,
    pub offset: u64,
}

/// Cell and record catalog for one session.
#[derive(Debug, Default)]
pub struct WorldIndex {
    cells: FxHashMap<CellId, CellEntry>,
    /// Cells in first-seen order.
    order: Vec<CellId>,
    records: FxHashMap<RefId, RecordLocation>,
}

impl WorldIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk one file, adding its cells to the index and its base records to `bases`.
    pub(crate) fn add_file(
        &mut self,
        reader: &mut EsmReader,
        file: &ContentFile,
        bases: &mut BaseStore,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<()> {
        let cells_before = self.order.len();
        let mut indexer = Indexer {
            file,
            index: self,
            bases,
            sink,
        };
        walk(reader, &mut indexer)?;
        tracing::debug!(
            file = %file.name,
            new_cells = self.order.len() - cells_before,
            "indexed content file"
        );
        Ok(())
    }

    /// Get a cell's entry.
    pub fn cell(&self, id: &CellId) -> Option<&CellEntry> {
        self.cells.get(id)
    }

    /// Iterate over cell ids in first-seen order.
    pub fn cell_ids(&self) -> impl Iterator<Item = &CellId> {
        self.order.iter()
    }

    pub fn cell_count(&self) -> usize {
        self.order.len()
    }

    /// Get where a base record was last defined.
    pub fn location(&self, id: &RefId) -> Option<RecordLocation> {
        self.records.get(id).copied()
    }

    fn upsert_cell(&mut self, id: CellId, record: CellRecord) -> &mut CellEntry {
        let deleted = record.deleted;
        match self.cells.entry(id) {
            Entry::Occupied(slot) => {
                let entry = slot.into_mut();
                entry.record = record;
                entry.deleted = deleted;
                entry
            }
            Entry::Vacant(slot) => {
                let id = slot.key().clone();
                self.order.push(id.clone());
                slot.insert(CellEntry {
                    id,
                    record,
                    contexts: Vec::new(),
                    deleted,
                })
            }
        }
    }
}

struct Indexer<'a> {
    file: &'a ContentFile,
    index: &'a mut WorldIndex,
    bases: &'a mut BaseStore,
    sink: &'a mut dyn DiagnosticSink,
}

impl Visitor for Indexer<'_> {
    type Error = Error;

    fn visit_group(&mut self, reader: &mut EsmReader, group: &GroupHeader) -> Result<Descend> {
        Ok(match group.kind {
            GroupKind::Top(tag) => {
                if tag == tags::CELL || tag == tags::WRLD || Category::from_tag(tag).is_some() {
                    Descend::Enter
                } else {
                    Descend::Skip
                }
            }
            GroupKind::WorldChildren(_)
            | GroupKind::InteriorBlock(_)
            | GroupKind::InteriorSubBlock(_)
            | GroupKind::ExteriorBlock { .. }
            | GroupKind::ExteriorSubBlock { .. } => Descend::Enter,
            GroupKind::CellChildren(raw) => {
                if let Some(form) = self.file.resolve_form(raw, self.sink) {
                    if let Some(entry) = self.index.cells.get_mut(&CellId::Form(form)) {
                        entry.contexts.push(reader.save_inside(group));
                    }
                }
                Descend::Skip
            }
            _ => Descend::Skip,
        })
    }

    fn visit_record(
        &mut self,
        reader: &mut EsmReader,
        record: &RecordHeader,
        kind: RecordKind,
    ) -> Result<()> {
        match kind {
            RecordKind::Base(category) => {
                let base = BaseRecord::read(reader, record, category)?;
                let Some(id) = self.file.resolve_id(&base.id, self.sink) else {
                    return Ok(());
                };
                self.index.records.insert(
                    id.clone(),
                    RecordLocation {
                        file: self.file.index,
                        offset: record.offset,
                    },
                );
                if base.deleted {
                    self.bases.remove(&id);
                } else {
                    self.bases
                        .insert(BaseObject::from_record(id, base, self.file.index));
                }
            }
            RecordKind::Cell => {
                let cell = CellRecord::read(reader, record)?;
                let Some(id) = CellId::of_record(self.file, &cell, self.sink) else {
                    return Ok(());
                };
                let entry = self.index.upsert_cell(id, cell);
                if reader.dialect() == Dialect::Tes3 {
                    entry.contexts.push(reader.save());
                }
            }
            RecordKind::Reference | RecordKind::World | RecordKind::Ignored => {}
        }
        Ok(())
    }

    fn diagnostic(&mut self, diagnostic: Diagnostic) {
        self.sink.report(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_id_parse() {
        assert_eq!("-3, 7".parse::<CellId>(), Ok(CellId::Grid { x: -3, y: 7 }));
        assert_eq!(
            "#0100002A".parse::<CellId>(),
            Ok(CellId::Form(FormId::from_raw(0x0100_002A)))
        );
        assert_eq!("Balmora, Guild".parse::<CellId>(), Ok(CellId::named("balmora, guild")));
        assert!("#zz".parse::<CellId>().is_err());
    }

    #[test]
    fn test_cell_id_display_round_trip() {
        for id in [
            CellId::named("Vault"),
            CellId::Grid { x: 1, y: -2 },
            CellId::Form(FormId::from_raw(0x10)),
        ] {
            let text = match &id {
                CellId::Form(_) => format!("#{id}"),
                _ => id.to_string(),
            };
            assert_eq!(text.parse::<CellId>(), Ok(id));
        }
    }
}
