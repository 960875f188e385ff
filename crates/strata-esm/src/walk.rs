//! Recursive traversal of a record stream.
//!
//! [`walk`] drives an [`EsmReader`] over the current nesting level: groups are
//! offered to the visitor, which decides whether to descend, and records are
//! classified through [`RecordKind::classify`] before being handed over.
//! Compressed records are inflated first. Unknown groups, unknown record
//! types and records that fail to inflate are reported as diagnostics and
//! skipped.

use strata_common::Diagnostic;

use crate::header::{GroupHeader, GroupKind, RecordHeader};
use crate::reader::Unit;
use crate::{Dialect, EsmReader, RecordKind};

/// Whether to read a group's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descend {
    Enter,
    Skip,
}

/// Callbacks for [`walk`].
pub trait Visitor {
    type Error: From<crate::Error>;

    /// Called for every group of a known kind.
    fn visit_group(
        &mut self,
        reader: &mut EsmReader,
        group: &GroupHeader,
    ) -> Result<Descend, Self::Error>;

    /// Called for every record with a consumer. Bytes left unread are skipped
    /// afterwards.
    fn visit_record(
        &mut self,
        reader: &mut EsmReader,
        record: &RecordHeader,
        kind: RecordKind,
    ) -> Result<(), Self::Error>;

    /// Receive a non-fatal condition.
    fn diagnostic(&mut self, diagnostic: Diagnostic);
}

/// Visit every unit from the reader's position to the end of the current level.
pub fn walk<V: Visitor>(reader: &mut EsmReader, visitor: &mut V) -> Result<(), V::Error> {
    while let Some(unit) = reader.next_unit()? {
        match unit {
            Unit::Group(group) => {
                if let GroupKind::Unknown(group_type) = group.kind {
                    visitor.diagnostic(Diagnostic::UnknownGroup {
                        file: reader.name().to_string(),
                        group_type,
                        offset: group.offset,
                    });
                    reader.skip_group(&group)?;
                    continue;
                }
                match visitor.visit_group(reader, &group)? {
                    Descend::Enter => {
                        reader.enter_group(&group);
                        walk(reader, visitor)?;
                        reader.leave_group()?;
                    }
                    Descend::Skip => reader.skip_group(&group)?,
                }
            }
            Unit::Record(record) => {
                let Some(kind) = RecordKind::classify(reader.dialect(), record.tag) else {
                    visitor.diagnostic(Diagnostic::UnknownRecordType {
                        file: reader.name().to_string(),
                        tag: record.tag,
                        offset: record.offset,
                    });
                    reader.skip_record()?;
                    continue;
                };
                if kind == RecordKind::Ignored {
                    reader.skip_record()?;
                    continue;
                }
                if reader.dialect() == Dialect::Tes4
                    && record.is_compressed()
                    && !reader.inflate_record(&record)?
                {
                    visitor.diagnostic(Diagnostic::CompressedRecord {
                        file: reader.name().to_string(),
                        tag: record.tag,
                        offset: record.offset,
                    });
                    reader.skip_record()?;
                    continue;
                }
                visitor.visit_record(reader, &record, kind)?;
                reader.skip_record()?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs::File;

    use strata_common::{DiagnosticSink, Diagnostics, FormId, Tag, Transcoder};
    use tempfile::TempDir;

    use super::*;
    use crate::dialect::{flags, tags};
    use crate::records::{read_references, BaseRecord, CellRecord, CellRef, RawId, ReadMode};
    use crate::{Category, EsmWriter, Error, FileHeader, FileKind, ReaderContext, Result};

    const CELL_ID: FormId = FormId::from_raw(0x0000_0010);

    fn write_fixture(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("Base.esm");
        let mut w = EsmWriter::new(File::create(&path).unwrap(), Dialect::Tes4, Transcoder::default());
        let body = |w: &mut EsmWriter<File>| -> Result<()> {
            w.write_header(&FileHeader::new(Dialect::Tes4, FileKind::Master).with_author("tests"))?;

            w.start_group(GroupKind::Top(Category::Static.tag()))?;
            w.start_record(Category::Static.tag(), 0, FormId::from_raw(1))?;
            w.write_sub_string(tags::EDID, "Rock")?;
            w.write_sub_string(tags::MODL, &"a".repeat(70_000))?;
            w.end_record()?;
            w.start_record(Category::Static.tag(), flags::COMPRESSED, FormId::from_raw(2))?;
            w.write_sub(tags::DATA, &[0; 8])?;
            w.end_record()?;
            w.end_group()?;

            w.start_record(Tag::new(*b"ZZZZ"), 0, FormId::from_raw(3))?;
            w.end_record()?;
            w.start_group(GroupKind::Unknown(42))?;
            w.start_record(Category::Door.tag(), 0, FormId::from_raw(4))?;
            w.end_record()?;
            w.end_group()?;

            w.start_group(GroupKind::Top(tags::CELL))?;
            w.start_group(GroupKind::InteriorBlock(0))?;
            w.start_group(GroupKind::InteriorSubBlock(0))?;
            w.start_record(tags::CELL, 0, CELL_ID)?;
            w.write_sub_string(tags::EDID, "Vault")?;
            w.write_sub(tags::DATA, &[1])?;
            w.end_record()?;
            w.start_group(GroupKind::CellChildren(CELL_ID))?;
            w.start_group(GroupKind::CellPersistent(CELL_ID))?;
            CellRef::new(FormId::from_raw(0x20), RawId::Form(FormId::from_raw(1))).write(w)?;
            w.end_group()?;
            w.start_group(GroupKind::CellTemporary(CELL_ID))?;
            let mut locked = CellRef::new(FormId::from_raw(0x21), RawId::Form(FormId::from_raw(1)));
            locked.lock_level = Some(50);
            locked.key = Some(RawId::Form(FormId::from_raw(0x30)));
            locked.write(w)?;
            let mut gone = CellRef::new(FormId::from_raw(0x22), RawId::Form(FormId::from_raw(1)));
            gone.deleted = true;
            gone.write(w)?;
            w.end_group()?;
            w.end_group()?;
            w.end_group()?;
            w.end_group()?;
            w.end_group()
        };
        body(&mut w).unwrap();
        w.finish().unwrap();
        path
    }

    #[derive(Default)]
    struct Collect {
        bases: Vec<BaseRecord>,
        cells: Vec<CellRecord>,
        children: Option<ReaderContext>,
        diagnostics: Diagnostics,
    }

    impl Visitor for Collect {
        type Error = Error;

        fn visit_group(&mut self, reader: &mut EsmReader, group: &GroupHeader) -> Result<Descend> {
            if let GroupKind::CellChildren(_) = group.kind {
                self.children = Some(reader.save_inside(group));
                return Ok(Descend::Skip);
            }
            Ok(Descend::Enter)
        }

        fn visit_record(
            &mut self,
            reader: &mut EsmReader,
            record: &RecordHeader,
            kind: RecordKind,
        ) -> Result<()> {
            match kind {
                RecordKind::Base(category) => {
                    self.bases.push(BaseRecord::read(reader, record, category)?)
                }
                RecordKind::Cell => self.cells.push(CellRecord::read(reader, record)?),
                _ => {}
            }
            Ok(())
        }

        fn diagnostic(&mut self, diagnostic: Diagnostic) {
            self.diagnostics.report(diagnostic);
        }
    }

    fn walk_fixture(dir: &TempDir) -> (EsmReader, Collect) {
        let path = write_fixture(dir);
        let mut reader = EsmReader::open(&path, 0, Transcoder::default()).unwrap();
        let mut visitor = Collect::default();
        walk(&mut reader, &mut visitor).unwrap();
        (reader, visitor)
    }

    #[test]
    fn test_walk_dispatches_records() {
        let dir = TempDir::new().unwrap();
        let (reader, visitor) = walk_fixture(&dir);
        assert!(reader.header().is_master());

        assert_eq!(visitor.bases.len(), 1);
        let rock = &visitor.bases[0];
        assert_eq!(rock.id, RawId::Form(FormId::from_raw(1)));
        assert_eq!(rock.editor_id.as_deref(), Some("Rock"));
        assert_eq!(rock.model.as_ref().map(String::len), Some(70_000));

        assert_eq!(visitor.cells.len(), 1);
        assert_eq!(visitor.cells[0].name, "Vault");
        assert!(visitor.cells[0].is_interior());
        assert!(visitor.children.is_some());
    }

    #[test]
    fn test_walk_reports_and_skips() {
        let dir = TempDir::new().unwrap();
        let (_, visitor) = walk_fixture(&dir);
        let entries = visitor.diagnostics.entries();
        assert_eq!(entries.len(), 3);
        assert!(matches!(&entries[0], Diagnostic::CompressedRecord { tag, .. } if tag.as_bytes() == b"STAT"));
        assert!(matches!(&entries[1], Diagnostic::UnknownRecordType { tag, .. } if tag.as_bytes() == b"ZZZZ"));
        assert!(matches!(&entries[2], Diagnostic::UnknownGroup { group_type: 42, .. }));
    }

    #[test]
    fn test_read_references_from_saved_group() {
        let dir = TempDir::new().unwrap();
        let (mut reader, mut visitor) = walk_fixture(&dir);
        let context = visitor.children.take().unwrap();
        reader.restore(&context).unwrap();

        let mut refs = Vec::new();
        read_references(&mut reader, ReadMode::Full, &mut visitor.diagnostics, |r| {
            refs.push(r);
            Ok::<_, Error>(())
        })
        .unwrap();

        let nums: Vec<u32> = refs.iter().map(|r| r.ref_num.raw()).collect();
        assert_eq!(nums, [0x20, 0x21, 0x22]);
        assert_eq!(refs[1].lock_level, Some(50));
        assert_eq!(refs[1].key, Some(RawId::Form(FormId::from_raw(0x30))));
        assert!(refs[2].deleted);
        assert!(!reader.has_more_recs());
    }

    #[test]
    fn test_ids_only_skips_state() {
        let dir = TempDir::new().unwrap();
        let (mut reader, mut visitor) = walk_fixture(&dir);
        reader.restore(visitor.children.as_ref().unwrap()).unwrap();

        let mut refs = Vec::new();
        read_references(&mut reader, ReadMode::IdsOnly, &mut visitor.diagnostics, |r| {
            refs.push(r);
            Ok::<_, Error>(())
        })
        .unwrap();
        assert_eq!(refs.len(), 3);
        assert_eq!(refs[1].lock_level, None);
        assert_eq!(refs[1].base, RawId::Form(FormId::from_raw(1)));
    }
}
