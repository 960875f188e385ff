//! Content file writer.
//!
//! [`EsmWriter`] emits records, groups and subrecords in either dialect.
//! Sizes are written as placeholders and patched when the record or group
//! is closed, so payloads can be streamed without knowing their length in
//! advance.

use std::io::{Cursor, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use zerocopy::byteorder::little_endian::{I32, U16, U32};
use zerocopy::IntoBytes;

use strata_common::{FormId, Tag, Transcoder};

use crate::dialect::{flags, tags, Dialect};
use crate::header::{GroupKind, RawGroupHeader, RawRecordHeader3, RawRecordHeader4};
use crate::{Error, FileHeader, FileKind, Result};

/// Record format version written into dialect B record headers.
const RECORD_VERSION: u16 = 44;

#[derive(Debug, Clone, Copy)]
struct OpenRecord {
    size_pos: u64,
    payload_start: u64,
}

/// Writer for one content file.
#[derive(Debug)]
pub struct EsmWriter<W> {
    inner: W,
    dialect: Dialect,
    transcoder: Transcoder,
    record: Option<OpenRecord>,
    /// Offsets of open group headers, innermost last.
    groups: Vec<u64>,
    record_count: u32,
    count_pos: Option<u64>,
}

impl<W: Write + Seek> EsmWriter<W> {
    /// Create a writer positioned at the start of `inner`.
    pub fn new(inner: W, dialect: Dialect, transcoder: Transcoder) -> Self {
        Self {
            inner,
            dialect,
            transcoder,
            record: None,
            groups: Vec::new(),
            record_count: 0,
            count_pos: None,
        }
    }

    /// Get the dialect being written.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Write the header record. The record count it declares is patched by
    /// [`EsmWriter::finish`].
    pub fn write_header(&mut self, header: &FileHeader) -> Result<()> {
        let record_flags = match (self.dialect, header.kind) {
            (Dialect::Tes4, FileKind::Master) => flags::MASTER,
            _ => 0,
        };
        self.start_record(self.dialect.magic(), record_flags, FormId::default())?;

        let (payload, count_offset) = match self.dialect {
            Dialect::Tes3 => (header.hedr3_payload(self.transcoder), 296),
            Dialect::Tes4 => (header.hedr4_payload(), 4),
        };
        self.write_sub(tags::HEDR, &payload)?;
        let payload_end = self.inner.stream_position()?;
        self.count_pos = Some(payload_end - payload.len() as u64 + count_offset);

        if self.dialect == Dialect::Tes4 {
            self.write_sub_string(tags::CNAM, &header.author)?;
            if !header.description.is_empty() {
                self.write_sub_string(tags::SNAM, &header.description)?;
            }
        }
        for master in &header.masters {
            self.write_sub_string(tags::MAST, &master.name)?;
            self.write_sub_u64(tags::DATA, master.size)?;
        }
        self.end_record()?;
        // The header record is not part of the count.
        self.record_count = 0;
        Ok(())
    }

    /// Open a record. `form_id` is ignored in dialect A.
    pub fn start_record(&mut self, tag: Tag, record_flags: u32, form_id: FormId) -> Result<()> {
        if self.record.is_some() {
            return Err(Error::WriterState("record already open"));
        }
        self.inner.write_all(tag.as_bytes())?;
        let size_pos = self.inner.stream_position()?;
        match self.dialect {
            Dialect::Tes3 => {
                let raw = RawRecordHeader3 {
                    size: U32::new(0),
                    unused: U32::new(0),
                    flags: U32::new(record_flags),
                };
                self.inner.write_all(raw.as_bytes())?;
            }
            Dialect::Tes4 => {
                let raw = RawRecordHeader4 {
                    size: U32::new(0),
                    flags: U32::new(record_flags),
                    form_id: U32::new(form_id.raw()),
                    version_control: U32::new(0),
                    version: U16::new(RECORD_VERSION),
                    unknown: U16::new(0),
                };
                self.inner.write_all(raw.as_bytes())?;
            }
        }
        let payload_start = self.inner.stream_position()?;
        self.record = Some(OpenRecord {
            size_pos,
            payload_start,
        });
        self.record_count += 1;
        Ok(())
    }

    /// Close the open record and patch its size.
    pub fn end_record(&mut self) -> Result<()> {
        let record = self
            .record
            .take()
            .ok_or(Error::WriterState("no record open"))?;
        let end = self.inner.stream_position()?;
        self.patch_u32(record.size_pos, (end - record.payload_start) as u32)
    }

    /// Write a whole dialect B record with a zlib-compressed payload.
    ///
    /// `body` writes the subrecords into an in-memory writer; the payload is
    /// stored as its inflated size followed by the zlib stream.
    pub fn write_compressed_record<F>(
        &mut self,
        tag: Tag,
        record_flags: u32,
        form_id: FormId,
        body: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut EsmWriter<Cursor<Vec<u8>>>) -> Result<()>,
    {
        if self.dialect != Dialect::Tes4 {
            return Err(Error::WriterState("compressed records exist only in dialect B"));
        }
        let mut payload = EsmWriter::new(Cursor::new(Vec::new()), self.dialect, self.transcoder);
        payload.record = Some(OpenRecord {
            size_pos: 0,
            payload_start: 0,
        });
        body(&mut payload)?;
        let raw = payload.inner.into_inner();

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw)?;
        let compressed = encoder.finish()?;

        self.start_record(tag, record_flags | flags::COMPRESSED, form_id)?;
        self.inner.write_u32::<LittleEndian>(raw.len() as u32)?;
        self.inner.write_all(&compressed)?;
        self.end_record()
    }

    /// Open a group (dialect B only).
    pub fn start_group(&mut self, kind: GroupKind) -> Result<()> {
        if self.dialect != Dialect::Tes4 {
            return Err(Error::WriterState("groups exist only in dialect B"));
        }
        if self.record.is_some() {
            return Err(Error::WriterState("group started inside a record"));
        }
        let offset = self.inner.stream_position()?;
        let (label, group_type) = kind.to_raw();
        self.inner.write_all(tags::GRUP.as_bytes())?;
        let raw = RawGroupHeader {
            size: U32::new(0),
            label,
            group_type: I32::new(group_type),
            stamp: U16::new(0),
            unknown1: U16::new(0),
            version: U16::new(0),
            unknown2: U16::new(0),
        };
        self.inner.write_all(raw.as_bytes())?;
        self.groups.push(offset);
        self.record_count += 1;
        Ok(())
    }

    /// Close the innermost group and patch its size.
    pub fn end_group(&mut self) -> Result<()> {
        if self.record.is_some() {
            return Err(Error::WriterState("group closed inside a record"));
        }
        let offset = self
            .groups
            .pop()
            .ok_or(Error::WriterState("no group open"))?;
        let end = self.inner.stream_position()?;
        self.patch_u32(offset + 4, (end - offset) as u32)
    }

    /// Write one subrecord into the open record.
    ///
    /// Dialect B payloads longer than `u16::MAX` are preceded by an `XXXX`
    /// subrecord carrying the real length.
    pub fn write_sub(&mut self, tag: Tag, payload: &[u8]) -> Result<()> {
        if self.record.is_none() {
            return Err(Error::WriterState("subrecord written outside a record"));
        }
        let len = payload.len();
        match self.dialect {
            Dialect::Tes3 => {
                self.inner.write_all(tag.as_bytes())?;
                self.inner.write_u32::<LittleEndian>(len as u32)?;
            }
            Dialect::Tes4 => match u16::try_from(len) {
                Ok(short) => {
                    self.inner.write_all(tag.as_bytes())?;
                    self.inner.write_u16::<LittleEndian>(short)?;
                }
                Err(_) => {
                    self.inner.write_all(tags::XXXX.as_bytes())?;
                    self.inner.write_u16::<LittleEndian>(4)?;
                    self.inner.write_u32::<LittleEndian>(len as u32)?;
                    self.inner.write_all(tag.as_bytes())?;
                    self.inner.write_u16::<LittleEndian>(0)?;
                }
            },
        }
        self.inner.write_all(payload)?;
        Ok(())
    }

    /// Write a NUL-terminated string subrecord.
    pub fn write_sub_string(&mut self, tag: Tag, text: &str) -> Result<()> {
        let mut payload = self.transcoder.encode(text).into_owned();
        payload.push(0);
        self.write_sub(tag, &payload)
    }

    pub fn write_sub_u32(&mut self, tag: Tag, value: u32) -> Result<()> {
        self.write_sub(tag, &value.to_le_bytes())
    }

    pub fn write_sub_i32(&mut self, tag: Tag, value: i32) -> Result<()> {
        self.write_sub(tag, &value.to_le_bytes())
    }

    pub fn write_sub_f32(&mut self, tag: Tag, value: f32) -> Result<()> {
        self.write_sub(tag, &value.to_le_bytes())
    }

    pub fn write_sub_u64(&mut self, tag: Tag, value: u64) -> Result<()> {
        self.write_sub(tag, &value.to_le_bytes())
    }

    fn patch_u32(&mut self, at: u64, value: u32) -> Result<()> {
        let end = self.inner.stream_position()?;
        self.inner.seek(SeekFrom::Start(at))?;
        self.inner.write_u32::<LittleEndian>(value)?;
        self.inner.seek(SeekFrom::Start(end))?;
        Ok(())
    }

    /// Patch the header's record count and return the inner stream.
    pub fn finish(mut self) -> Result<W> {
        if self.record.is_some() || !self.groups.is_empty() {
            return Err(Error::WriterState("unclosed record or group"));
        }
        if let Some(at) = self.count_pos {
            self.patch_u32(at, self.record_count)?;
        }
        self.inner.flush()?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn writer(dialect: Dialect) -> EsmWriter<Cursor<Vec<u8>>> {
        EsmWriter::new(Cursor::new(Vec::new()), dialect, Transcoder::default())
    }

    #[test]
    fn test_record_size_is_patched() {
        let mut w = writer(Dialect::Tes3);
        w.start_record(Tag::new(*b"STAT"), 0, FormId::default()).unwrap();
        w.write_sub_string(tags::NAME, "rock").unwrap();
        w.end_record().unwrap();
        let bytes = w.finish().unwrap().into_inner();

        // 8-byte subrecord header plus "rock\0".
        assert_eq!(&bytes[0..4], b"STAT");
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 13);
        assert_eq!(bytes.len(), 16 + 13);
    }

    #[test]
    fn test_long_payload_uses_xxxx() {
        let mut w = writer(Dialect::Tes4);
        w.start_record(Tag::new(*b"STAT"), 0, FormId::from_raw(1)).unwrap();
        w.write_sub(tags::MODL, &vec![7u8; 70_000]).unwrap();
        w.end_record().unwrap();
        let bytes = w.finish().unwrap().into_inner();
        assert_eq!(&bytes[24..28], b"XXXX");
        assert_eq!(u32::from_le_bytes(bytes[30..34].try_into().unwrap()), 70_000);
        assert_eq!(&bytes[34..38], b"MODL");
    }

    #[test]
    fn test_unbalanced_calls_fail() {
        let mut w = writer(Dialect::Tes3);
        assert!(matches!(w.end_record(), Err(Error::WriterState(_))));
        assert!(matches!(
            w.start_group(GroupKind::Top(Tag::new(*b"CELL"))),
            Err(Error::WriterState(_))
        ));
        w.start_record(Tag::new(*b"CELL"), 0, FormId::default()).unwrap();
        assert!(w.finish().is_err());
    }
}
