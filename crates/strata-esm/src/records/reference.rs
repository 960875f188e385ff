//! Placed references.
//!
//! Dialect A stores a cell's references as subrecord runs inside the `CELL`
//! record, each run opened by `FRMR`. Dialect B stores them as `REFR`/`ACHR`
//! records in the persistent/temporary/distant groups under the cell's
//! children group. [`read_references`] hides the difference.

use std::io::{Seek, Write};
use std::marker::PhantomData;

use strata_common::{BinaryReader, Diagnostic, DiagnosticSink, FormId};

use crate::dialect::{flags, tags, Dialect};
use crate::header::{GroupHeader, RecordHeader};
use crate::walk::{walk, Descend, Visitor};
use crate::{EsmReader, EsmWriter, Error, RecordKind, Result};

use super::RawId;

/// Placement of a reference in its cell.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    pub pos: [f32; 3],
    pub rot: [f32; 3],
}

impl Position {
    /// Decode six consecutive f32 values.
    pub fn read(r: &mut BinaryReader<'_>) -> strata_common::Result<Self> {
        Ok(Self {
            pos: r.read_f32_array()?,
            rot: r.read_f32_array()?,
        })
    }

    /// Encode as six consecutive f32 values.
    pub fn to_bytes(&self) -> [u8; 24] {
        let mut out = [0u8; 24];
        for (chunk, value) in out.chunks_exact_mut(4).zip(self.pos.iter().chain(&self.rot)) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        out
    }
}

/// Where a door leads.
#[derive(Debug, Clone, PartialEq)]
pub enum Destination {
    /// Dialect A: a named interior cell.
    Cell(String),
    /// Dialect A: the exterior cell containing the target position.
    Exterior,
    /// Dialect B: the linked door reference, as stored.
    Door(FormId),
}

/// Teleport data of a door reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Teleport {
    pub destination: Destination,
    pub position: Position,
}

/// One reference as stored in a file.
#[derive(Debug, Clone, PartialEq)]
pub struct CellRef {
    /// Reference number as stored.
    pub ref_num: FormId,
    /// Base record the reference places.
    pub base: RawId,
    pub position: Position,
    pub scale: f32,
    pub count: i32,
    pub charge: Option<f32>,
    pub lock_level: Option<i32>,
    pub key: Option<RawId>,
    pub teleport: Option<Teleport>,
    pub deleted: bool,
}

/// How much of each reference to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Decode everything.
    Full,
    /// Decode the reference number, base id and deleted flag only.
    IdsOnly,
}

impl CellRef {
    /// Create a reference with default state.
    pub fn new(ref_num: FormId, base: RawId) -> Self {
        Self {
            ref_num,
            base,
            position: Position::default(),
            scale: 1.0,
            count: 1,
            charge: None,
            lock_level: None,
            key: None,
            teleport: None,
            deleted: false,
        }
    }

    /// Read the next dialect A reference from inside a cell record.
    ///
    /// Moved-reference markers preceding a reference are skipped. Returns
    /// `None` once the record is exhausted.
    pub fn read_tes3(reader: &mut EsmReader, mode: ReadMode) -> Result<Option<Self>> {
        loop {
            if !reader.has_more_subs() {
                return Ok(None);
            }
            if reader.get_sub_name()? == tags::FRMR {
                break;
            }
            reader.skip_h_sub()?;
        }

        let ref_num = FormId::from_raw(reader.get_h_u32()?);
        let mut base = None;
        let mut cell_ref = Self::new(ref_num, RawId::Name(String::new()));

        while reader.has_more_subs() {
            let tag = reader.get_sub_name()?;
            match (tag, mode) {
                (tags::FRMR | tags::MVRF, _) => {
                    reader.cache_sub_name();
                    break;
                }
                (tags::NAME, _) => base = Some(reader.get_h_string()?),
                (tags::DELE, _) => {
                    reader.skip_h_sub()?;
                    cell_ref.deleted = true;
                }
                (_, ReadMode::IdsOnly) => reader.skip_h_sub()?,
                (tags::XSCL, _) => cell_ref.scale = reader.get_h_f32()?,
                (tags::NAM9, _) => cell_ref.count = reader.get_h_i32()?,
                (tags::XCHG, _) => cell_ref.charge = Some(reader.get_h_f32()?),
                (tags::FLTV, _) => cell_ref.lock_level = Some(reader.get_h_i32()?),
                (tags::KNAM, _) => cell_ref.key = Some(RawId::Name(reader.get_h_string()?)),
                (tags::DODT, _) => {
                    let position = reader.get_h_payload(Position::read)?;
                    let destination = match reader.get_hno_string(tags::DNAM)? {
                        Some(cell) => Destination::Cell(cell),
                        None => Destination::Exterior,
                    };
                    cell_ref.teleport = Some(Teleport {
                        destination,
                        position,
                    });
                }
                (tags::DATA, _) => cell_ref.position = reader.get_h_payload(Position::read)?,
                _ => reader.skip_h_sub()?,
            }
        }

        cell_ref.base = RawId::Name(base.ok_or(Error::MissingSubrecord {
            record: reader.record_tag(),
            expected: tags::NAME,
        })?);
        Ok(Some(cell_ref))
    }

    /// Read a dialect B `REFR`/`ACHR` record whose header was just returned.
    pub fn read_tes4(reader: &mut EsmReader, record: &RecordHeader, mode: ReadMode) -> Result<Self> {
        let mut cell_ref = Self::new(record.form_id, RawId::Form(FormId::default()));
        cell_ref.deleted = record.is_deleted();
        let mut has_base = false;

        while reader.has_more_subs() {
            let tag = reader.get_sub_name()?;
            match (tag, mode) {
                (tags::NAME, _) => {
                    cell_ref.base = RawId::Form(reader.get_h_payload(|r| r.read_form_id())?);
                    has_base = true;
                }
                (_, ReadMode::IdsOnly) => reader.skip_h_sub()?,
                (tags::XSCL, _) => cell_ref.scale = reader.get_h_f32()?,
                (tags::XCNT, _) => cell_ref.count = reader.get_h_i32()?,
                (tags::XCHG, _) => cell_ref.charge = Some(reader.get_h_f32()?),
                (tags::XLOC, _) => {
                    let (level, key) =
                        reader.get_h_payload(|r| Ok((r.read_i32()?, r.read_form_id()?)))?;
                    cell_ref.lock_level = Some(level);
                    cell_ref.key = (key.raw() != 0).then_some(RawId::Form(key));
                }
                (tags::XTEL, _) => {
                    let (door, position) = reader
                        .get_h_payload(|r| Ok((r.read_form_id()?, Position::read(r)?)))?;
                    cell_ref.teleport = Some(Teleport {
                        destination: Destination::Door(door),
                        position,
                    });
                }
                (tags::DATA, _) => cell_ref.position = reader.get_h_payload(Position::read)?,
                _ => reader.skip_h_sub()?,
            }
        }

        if !has_base {
            return Err(Error::MissingSubrecord {
                record: record.tag,
                expected: tags::NAME,
            });
        }
        Ok(cell_ref)
    }

    /// Write the reference in the writer's dialect.
    ///
    /// Dialect A writes a subrecord run into the open `CELL` record; dialect B
    /// writes a complete `REFR` record.
    pub fn write<W: Write + Seek>(&self, writer: &mut EsmWriter<W>) -> Result<()> {
        match writer.dialect() {
            Dialect::Tes3 => self.write_tes3(writer),
            Dialect::Tes4 => self.write_tes4(writer),
        }
    }

    fn write_tes3<W: Write + Seek>(&self, writer: &mut EsmWriter<W>) -> Result<()> {
        writer.write_sub_u32(tags::FRMR, self.ref_num.raw())?;
        if let RawId::Name(base) = &self.base {
            writer.write_sub_string(tags::NAME, base)?;
        }
        if self.scale != 1.0 {
            writer.write_sub_f32(tags::XSCL, self.scale)?;
        }
        if self.count != 1 {
            writer.write_sub_i32(tags::NAM9, self.count)?;
        }
        if let Some(charge) = self.charge {
            writer.write_sub_f32(tags::XCHG, charge)?;
        }
        if let Some(level) = self.lock_level {
            writer.write_sub_i32(tags::FLTV, level)?;
        }
        if let Some(RawId::Name(key)) = &self.key {
            writer.write_sub_string(tags::KNAM, key)?;
        }
        if let Some(teleport) = &self.teleport {
            writer.write_sub(tags::DODT, &teleport.position.to_bytes())?;
            if let Destination::Cell(cell) = &teleport.destination {
                writer.write_sub_string(tags::DNAM, cell)?;
            }
        }
        if self.deleted {
            writer.write_sub_u32(tags::DELE, 0)?;
        }
        writer.write_sub(tags::DATA, &self.position.to_bytes())
    }

    fn write_tes4<W: Write + Seek>(&self, writer: &mut EsmWriter<W>) -> Result<()> {
        let record_flags = if self.deleted { flags::DELETED } else { 0 };
        writer.start_record(tags::REFR, record_flags, self.ref_num)?;
        if let RawId::Form(base) = &self.base {
            writer.write_sub_u32(tags::NAME, base.raw())?;
        }
        if self.scale != 1.0 {
            writer.write_sub_f32(tags::XSCL, self.scale)?;
        }
        if self.count != 1 {
            writer.write_sub_i32(tags::XCNT, self.count)?;
        }
        if let Some(charge) = self.charge {
            writer.write_sub_f32(tags::XCHG, charge)?;
        }
        if let Some(level) = self.lock_level {
            let key = self.key.as_ref().and_then(|k| match k {
                RawId::Form(id) => Some(id.raw()),
                RawId::Name(_) => None,
            });
            let mut payload = level.to_le_bytes().to_vec();
            payload.extend_from_slice(&key.unwrap_or(0).to_le_bytes());
            writer.write_sub(tags::XLOC, &payload)?;
        }
        if let Some(Teleport {
            destination: Destination::Door(door),
            position,
        }) = &self.teleport
        {
            let mut payload = door.raw().to_le_bytes().to_vec();
            payload.extend_from_slice(&position.to_bytes());
            writer.write_sub(tags::XTEL, &payload)?;
        }
        writer.write_sub(tags::DATA, &self.position.to_bytes())?;
        writer.end_record()
    }
}

/// Read every reference of a cell, starting from a restored cell context.
///
/// Dialect A expects the reader inside the cell record, dialect B inside the
/// cell's children group. `each` is called once per reference in file order;
/// an error from it stops the read.
pub fn read_references<E, F>(
    reader: &mut EsmReader,
    mode: ReadMode,
    sink: &mut dyn DiagnosticSink,
    mut each: F,
) -> std::result::Result<(), E>
where
    E: From<Error>,
    F: FnMut(CellRef) -> std::result::Result<(), E>,
{
    match reader.dialect() {
        Dialect::Tes3 => {
            while let Some(cell_ref) = CellRef::read_tes3(reader, mode)? {
                each(cell_ref)?;
            }
            Ok(())
        }
        Dialect::Tes4 => {
            let mut visitor = RefVisitor {
                mode,
                sink,
                each,
                _error: PhantomData,
            };
            walk(reader, &mut visitor)
        }
    }
}

struct RefVisitor<'a, F, E> {
    mode: ReadMode,
    sink: &'a mut dyn DiagnosticSink,
    each: F,
    _error: PhantomData<E>,
}

impl<F, E> Visitor for RefVisitor<'_, F, E>
where
    E: From<Error>,
    F: FnMut(CellRef) -> std::result::Result<(), E>,
{
    type Error = E;

    fn visit_group(
        &mut self,
        _reader: &mut EsmReader,
        group: &GroupHeader,
    ) -> std::result::Result<Descend, E> {
        Ok(if group.kind.holds_references() {
            Descend::Enter
        } else {
            Descend::Skip
        })
    }

    fn visit_record(
        &mut self,
        reader: &mut EsmReader,
        record: &RecordHeader,
        kind: RecordKind,
    ) -> std::result::Result<(), E> {
        if kind == RecordKind::Reference {
            let cell_ref = CellRef::read_tes4(reader, record, self.mode)?;
            (self.each)(cell_ref)?;
        }
        Ok(())
    }

    fn diagnostic(&mut self, diagnostic: Diagnostic) {
        self.sink.report(diagnostic);
    }
}
