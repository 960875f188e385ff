//! Changed-only persistence.
//!
//! A save is a dialect A file with file type "save". Its master list is the
//! content stack at save time, so identifiers inside it use stack positions
//! as mod indices and go through an [`IndexRemap`] on restore.
//!
//! Each `CELL` record opens with one identity subrecord (`NAME`, `XCLC` or
//! `CFID`) followed by pairs of a category tag subrecord and an encoded
//! reference. Every value below is little-endian:
//!
//! ```text
//! u32       reference id
//! base id   u8 0 + u16 length + UTF-8 name | u8 1 + u32 form id
//! 6 x f32   position, rotation
//! f32       scale
//! i32       count
//! u8        enabled
//! u8        optional fields: 1 charge, 2 lock level, 4 key, 8 teleport
//! f32       charge
//! i32       lock level
//! base id   key
//! teleport  u8 0 + u16 length + cell name | u8 1 | u8 2 + u32 door, then 6 x f32
//! ```

use std::fs::File;
use std::io::{self, BufWriter, Seek, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use strata_common::{BinaryReader, Encoding, FormId, RefId, Tag, Transcoder};
use strata_esm::dialect::tags;
use strata_esm::records::{Destination, Position, Teleport};
use strata_esm::{Category, Dialect, EsmReader, EsmWriter, FileHeader, FileKind, Unit};

use crate::index::CellId;
use crate::store::{CellStore, LiveRef, RefState};
use crate::{ContentStack, Error, Result};

/// Identity subrecord of a dialect B cell in a save.
pub const CFID: Tag = Tag::new(*b"CFID");

/// Strings in saves are always UTF-8, whatever the content encoding.
const SAVE_TRANSCODER: Transcoder = Transcoder::new(Encoding::Utf8);

const HAS_CHARGE: u8 = 0x1;
const HAS_LOCK: u8 = 0x2;
const HAS_KEY: u8 = 0x4;
const HAS_TELEPORT: u8 = 0x8;

/// What [`crate::Session::save`] wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub cells: usize,
    pub references: usize,
}

/// What [`crate::Session::restore`] applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub cells: usize,
    pub restored: usize,
    pub dropped: usize,
}

/// A reference as stored in a save, identifiers not yet remapped.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SavedRef {
    pub category: Category,
    pub ref_num: FormId,
    pub base: RefId,
    pub state: RefState,
}

/// Cell identity as stored in a save.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SavedCellId {
    Named(String),
    Grid { x: i32, y: i32 },
    Form(FormId),
}

impl SavedCellId {
    fn label(&self) -> String {
        match self {
            Self::Named(name) => name.clone(),
            Self::Grid { x, y } => format!("{x},{y}"),
            Self::Form(id) => id.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SavedCell {
    pub id: SavedCellId,
    pub refs: Vec<SavedRef>,
}

impl SavedCell {
    pub fn label(&self) -> String {
        self.id.label()
    }
}

/// Write every changed reference of the given cells.
pub(crate) fn write_save<'a>(
    path: &Path,
    stack: &ContentStack,
    cells: impl Iterator<Item = &'a CellStore>,
) -> Result<SaveSummary> {
    let mut header = FileHeader::new(Dialect::Tes3, FileKind::Save)
        .with_description("strata save");
    for file in stack {
        let size = std::fs::metadata(&file.path)?.len();
        header = header.with_master(file.name.clone(), size);
    }

    let out = BufWriter::new(File::create(path)?);
    let mut writer = EsmWriter::new(out, Dialect::Tes3, SAVE_TRANSCODER);
    writer.write_header(&header)?;

    let mut summary = SaveSummary::default();
    for cell in cells {
        let written = write_cell(&mut writer, cell)?;
        if written > 0 {
            summary.cells += 1;
            summary.references += written;
        }
    }
    writer.finish()?.flush()?;
    tracing::info!(
        path = %path.display(),
        cells = summary.cells,
        references = summary.references,
        "wrote save"
    );
    Ok(summary)
}

/// Write one cell record if it has changes. Returns the number of references written.
fn write_cell<W: Write + Seek>(writer: &mut EsmWriter<W>, cell: &CellStore) -> Result<usize> {
    let changed: Vec<&LiveRef> = cell.changed().collect();
    if changed.is_empty() {
        return Ok(0);
    }

    writer.start_record(tags::CELL, 0, FormId::default())?;
    match cell.id() {
        CellId::Named(name) => writer.write_sub_string(tags::NAME, name)?,
        CellId::Grid { x, y } => {
            let mut payload = Vec::with_capacity(8);
            payload.write_i32::<LittleEndian>(*x)?;
            payload.write_i32::<LittleEndian>(*y)?;
            writer.write_sub(tags::XCLC, &payload)?;
        }
        CellId::Form(id) => writer.write_sub_u32(CFID, id.raw())?,
    }
    for live in &changed {
        writer.write_sub(live.base.category.tag(), &encode_ref(live)?)?;
    }
    writer.end_record()?;
    Ok(changed.len())
}

fn write_str(out: &mut Vec<u8>, text: &str) -> io::Result<()> {
    let length = u16::try_from(text.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "string too long for save"))?;
    out.write_u16::<LittleEndian>(length)?;
    out.write_all(text.as_bytes())
}

fn write_ref_id(out: &mut Vec<u8>, id: &RefId) -> io::Result<()> {
    match id {
        RefId::Name(name) => {
            out.write_u8(0)?;
            write_str(out, name)
        }
        RefId::Form(form) => {
            out.write_u8(1)?;
            out.write_u32::<LittleEndian>(form.raw())
        }
    }
}

fn invalid(what: &'static str, value: u8, offset: usize) -> strata_common::Error {
    strata_common::Error::InvalidDiscriminant {
        what,
        value,
        offset: offset as u64,
    }
}

fn read_ref_id(r: &mut BinaryReader<'_>) -> strata_common::Result<RefId> {
    let offset = r.position();
    Ok(match r.read_u8()? {
        0 => RefId::name(r.read_prefixed_str()?),
        1 => RefId::Form(r.read_form_id()?),
        value => return Err(invalid("identifier", value, offset)),
    })
}

pub(crate) fn encode_ref(live: &LiveRef) -> io::Result<Vec<u8>> {
    let state = &live.state;
    let mut out = Vec::with_capacity(64);
    out.write_u32::<LittleEndian>(live.ref_num.raw())?;
    write_ref_id(&mut out, &live.base.id)?;
    out.write_all(&state.position.to_bytes())?;
    out.write_f32::<LittleEndian>(state.scale)?;
    out.write_i32::<LittleEndian>(state.count)?;
    out.write_u8(u8::from(state.enabled))?;

    let mut present = 0;
    if state.charge.is_some() {
        present |= HAS_CHARGE;
    }
    if state.lock_level.is_some() {
        present |= HAS_LOCK;
    }
    if state.key.is_some() {
        present |= HAS_KEY;
    }
    if state.teleport.is_some() {
        present |= HAS_TELEPORT;
    }
    out.write_u8(present)?;

    if let Some(charge) = state.charge {
        out.write_f32::<LittleEndian>(charge)?;
    }
    if let Some(level) = state.lock_level {
        out.write_i32::<LittleEndian>(level)?;
    }
    if let Some(key) = &state.key {
        write_ref_id(&mut out, key)?;
    }
    if let Some(teleport) = &state.teleport {
        match &teleport.destination {
            Destination::Cell(name) => {
                out.write_u8(0)?;
                write_str(&mut out, name)?;
            }
            Destination::Exterior => out.write_u8(1)?,
            Destination::Door(door) => {
                out.write_u8(2)?;
                out.write_u32::<LittleEndian>(door.raw())?;
            }
        }
        out.write_all(&teleport.position.to_bytes())?;
    }
    Ok(out)
}

pub(crate) fn decode_ref(category: Category, bytes: &[u8]) -> strata_common::Result<SavedRef> {
    let mut r = BinaryReader::new(bytes);
    let ref_num = r.read_form_id()?;
    let base = read_ref_id(&mut r)?;
    let position = Position::read(&mut r)?;
    let scale = r.read_f32()?;
    let count = r.read_i32()?;
    let enabled = r.read_u8()? != 0;
    let present = r.read_u8()?;

    let charge = (present & HAS_CHARGE != 0).then(|| r.read_f32()).transpose()?;
    let lock_level = (present & HAS_LOCK != 0).then(|| r.read_i32()).transpose()?;
    let key = (present & HAS_KEY != 0)
        .then(|| read_ref_id(&mut r))
        .transpose()?;
    let teleport = if present & HAS_TELEPORT != 0 {
        let offset = r.position();
        let destination = match r.read_u8()? {
            0 => Destination::Cell(r.read_prefixed_str()?.to_string()),
            1 => Destination::Exterior,
            2 => Destination::Door(r.read_form_id()?),
            value => return Err(invalid("destination", value, offset)),
        };
        Some(Teleport {
            destination,
            position: Position::read(&mut r)?,
        })
    } else {
        None
    };

    Ok(SavedRef {
        category,
        ref_num,
        base,
        state: RefState {
            position,
            scale,
            count,
            enabled,
            charge,
            lock_level,
            key,
            teleport,
        },
    })
}

/// Open a save and check its file type.
pub(crate) fn open_save(path: &Path) -> Result<EsmReader> {
    let reader = EsmReader::open(path, 0, SAVE_TRANSCODER)?;
    if reader.dialect() != Dialect::Tes3 || reader.header().kind != FileKind::Save {
        return Err(Error::NotASave {
            path: path.to_path_buf(),
        });
    }
    Ok(reader)
}

/// Decode every cell of a save.
///
/// The whole file is decoded before anything is applied, so an unknown
/// category or a malformed reference leaves the session untouched.
pub(crate) fn read_cells(reader: &mut EsmReader) -> Result<Vec<SavedCell>> {
    let mut cells = Vec::new();
    while let Some(unit) = reader.next_unit()? {
        let record = match unit {
            Unit::Record(record) if record.tag == tags::CELL => record,
            Unit::Record(_) => {
                reader.skip_record()?;
                continue;
            }
            Unit::Group(group) => {
                reader.skip_group(&group)?;
                continue;
            }
        };
        let id = match reader.get_sub_name()? {
            tags::NAME => SavedCellId::Named(reader.get_h_string()?),
            tags::XCLC => {
                let (x, y) = reader.get_h_payload(|r| Ok((r.read_i32()?, r.read_i32()?)))?;
                SavedCellId::Grid { x, y }
            }
            CFID => SavedCellId::Form(FormId::from_raw(reader.get_h_u32()?)),
            actual => {
                return Err(strata_esm::Error::UnexpectedSubrecord {
                    record: record.tag,
                    expected: tags::NAME,
                    actual,
                    offset: reader.position(),
                }
                .into())
            }
        };

        let mut cell = SavedCell { id, refs: Vec::new() };
        while reader.has_more_subs() {
            let tag = reader.get_sub_name()?;
            let category = Category::from_tag(tag).ok_or(Error::UnknownCategory(tag))?;
            let bytes = reader.get_h_bytes()?;
            let saved = decode_ref(category, &bytes).map_err(|source| Error::MalformedSave {
                cell: cell.label(),
                source,
            })?;
            cell.refs.push(saved);
        }
        cells.push(cell);
    }
    Ok(cells)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::store::HandleAllocator;
    use crate::BaseObject;

    use super::*;

    fn live(state: RefState) -> LiveRef {
        LiveRef {
            ref_num: FormId::new(1, 0x42),
            base: Arc::new(BaseObject {
                id: RefId::name("chest_small"),
                category: Category::Container,
                editor_id: None,
                model: None,
                name: None,
                file: 0,
            }),
            source: Some(1),
            original: RefState::default(),
            state,
            deleted: false,
            handle: HandleAllocator::new().allocate(),
        }
    }

    #[test]
    fn test_reference_blob_with_every_field() {
        let state = RefState {
            position: Position {
                pos: [1.0, -2.0, 3.5],
                rot: [0.0, 0.0, 1.5],
            },
            scale: 0.75,
            count: 3,
            enabled: false,
            charge: Some(120.0),
            lock_level: Some(50),
            key: Some(RefId::Form(FormId::new(0, 7))),
            teleport: Some(Teleport {
                destination: Destination::Cell("Vault".to_string()),
                position: Position::default(),
            }),
        };
        let bytes = encode_ref(&live(state.clone())).unwrap();
        let saved = decode_ref(Category::Container, &bytes).unwrap();
        assert_eq!(saved.ref_num, FormId::new(1, 0x42));
        assert_eq!(saved.base, RefId::name("chest_small"));
        assert_eq!(saved.state, state);
    }

    #[test]
    fn test_unknown_discriminant_fails() {
        let mut bytes = encode_ref(&live(RefState::default())).unwrap();
        assert_eq!(bytes[4], 0);
        bytes[4] = 7;
        let err = decode_ref(Category::Container, &bytes).unwrap_err();
        assert!(matches!(
            err,
            strata_common::Error::InvalidDiscriminant { what: "identifier", value: 7, offset: 4 }
        ));

        let mut state = RefState::default();
        state.teleport = Some(Teleport {
            destination: Destination::Door(FormId::new(0, 9)),
            position: Position::default(),
        });
        let mut bytes = encode_ref(&live(state)).unwrap();
        // destination byte, door id, position
        let at = bytes.len() - 24 - 4 - 1;
        assert_eq!(bytes[at], 2);
        bytes[at] = 3;
        let err = decode_ref(Category::Container, &bytes).unwrap_err();
        assert!(matches!(
            err,
            strata_common::Error::InvalidDiscriminant { what: "destination", value: 3, .. }
        ));
    }

    #[test]
    fn test_truncated_blob_fails() {
        let bytes = encode_ref(&live(RefState::default())).unwrap();
        let err = decode_ref(Category::Container, &bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, strata_common::Error::TruncatedStream { .. }));
    }
}
