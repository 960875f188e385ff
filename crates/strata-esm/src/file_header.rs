//! The header record that opens every content file.

use strata_common::Transcoder;

use crate::dialect::{flags, tags, Dialect};
use crate::header::RecordHeader;
use crate::{EsmReader, Error, Result};

/// Size of the dialect A `HEDR` payload.
const HEDR3_LEN: usize = 300;
const AUTHOR_LEN: usize = 32;
const DESCRIPTION_LEN: usize = 256;

/// Dialect A file type codes.
const TYPE_PLUGIN: u32 = 0;
const TYPE_MASTER: u32 = 1;
const TYPE_SAVE: u32 = 32;

/// Role of a content file in a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Plugin,
    Master,
    Save,
}

/// A master file named in a header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterFile {
    pub name: String,
    /// Size the master had when the dependent file was written.
    pub size: u64,
}

/// Parsed header record.
#[derive(Debug, Clone, PartialEq)]
pub struct FileHeader {
    pub dialect: Dialect,
    pub version: f32,
    pub kind: FileKind,
    pub author: String,
    pub description: String,
    /// Number of records after the header, as declared by the writer.
    pub record_count: u32,
    /// Dialect B: next free local form id.
    pub next_object_id: u32,
    /// Masters in load order.
    pub masters: Vec<MasterFile>,
}

impl FileHeader {
    /// Create an empty header for a new file.
    pub fn new(dialect: Dialect, kind: FileKind) -> Self {
        Self {
            dialect,
            version: dialect.default_version(),
            kind,
            author: String::new(),
            description: String::new(),
            record_count: 0,
            next_object_id: 0x800,
            masters: Vec::new(),
        }
    }

    /// Append a master.
    pub fn with_master(mut self, name: impl Into<String>, size: u64) -> Self {
        self.masters.push(MasterFile {
            name: name.into(),
            size,
        });
        self
    }

    /// Set the author field.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Set the description field.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Check whether the file declares itself a master.
    pub fn is_master(&self) -> bool {
        self.kind == FileKind::Master
    }

    /// Read the header record's subrecords. The reader is positioned right
    /// after the record header.
    pub(crate) fn read(reader: &mut EsmReader, record: &RecordHeader) -> Result<Self> {
        let dialect = reader.dialect();
        let transcoder = reader.transcoder();
        let mut header = match dialect {
            Dialect::Tes3 => Self::read_hedr3(reader, transcoder)?,
            Dialect::Tes4 => Self::read_hedr4(reader, record)?,
        };

        if !dialect.accepts_version(header.version) {
            return Err(Error::UnsupportedVersion {
                dialect,
                version: header.version,
            });
        }

        while reader.has_more_subs() {
            let tag = reader.get_sub_name()?;
            match tag {
                tags::MAST => {
                    let name = reader.get_h_string()?;
                    header.masters.push(MasterFile { name, size: 0 });
                }
                tags::DATA => {
                    let size = reader.get_h_payload(|r| r.read_u64())?;
                    if let Some(master) = header.masters.last_mut() {
                        master.size = size;
                    }
                }
                tags::CNAM if dialect == Dialect::Tes4 => header.author = reader.get_h_string()?,
                tags::SNAM if dialect == Dialect::Tes4 => {
                    header.description = reader.get_h_string()?
                }
                _ => reader.skip_h_sub()?,
            }
        }
        Ok(header)
    }

    fn read_hedr3(reader: &mut EsmReader, transcoder: Transcoder) -> Result<Self> {
        reader.get_sub_name_is(tags::HEDR)?;
        let (version, file_type, author, description, record_count) = reader.get_h_payload(|r| {
            let version = r.read_f32()?;
            let file_type = r.read_u32()?;
            let author = transcoder.decode(r.read_padded(AUTHOR_LEN)?);
            let description = transcoder.decode(r.read_padded(DESCRIPTION_LEN)?);
            let record_count = r.read_u32()?;
            Ok((version, file_type, author, description, record_count))
        })?;

        let kind = match file_type {
            TYPE_MASTER => FileKind::Master,
            TYPE_SAVE => FileKind::Save,
            _ => FileKind::Plugin,
        };
        Ok(Self {
            version,
            kind,
            author,
            description,
            record_count,
            ..Self::new(Dialect::Tes3, kind)
        })
    }

    fn read_hedr4(reader: &mut EsmReader, record: &RecordHeader) -> Result<Self> {
        reader.get_sub_name_is(tags::HEDR)?;
        let (version, record_count, next_object_id) = reader.get_h_payload(|r| {
            Ok((r.read_f32()?, r.read_i32()?, r.read_u32()?))
        })?;

        let kind = if record.flags & flags::MASTER != 0 {
            FileKind::Master
        } else {
            FileKind::Plugin
        };
        Ok(Self {
            version,
            record_count: u32::try_from(record_count).unwrap_or(0),
            next_object_id,
            ..Self::new(Dialect::Tes4, kind)
        })
    }

    /// Encode the dialect A `HEDR` payload.
    pub(crate) fn hedr3_payload(&self, transcoder: Transcoder) -> Vec<u8> {
        let file_type = match self.kind {
            FileKind::Plugin => TYPE_PLUGIN,
            FileKind::Master => TYPE_MASTER,
            FileKind::Save => TYPE_SAVE,
        };
        let mut payload = Vec::with_capacity(HEDR3_LEN);
        payload.extend_from_slice(&self.version.to_le_bytes());
        payload.extend_from_slice(&file_type.to_le_bytes());
        push_padded(&mut payload, &transcoder.encode(&self.author), AUTHOR_LEN);
        push_padded(&mut payload, &transcoder.encode(&self.description), DESCRIPTION_LEN);
        payload.extend_from_slice(&self.record_count.to_le_bytes());
        payload
    }

    /// Encode the dialect B `HEDR` payload.
    pub(crate) fn hedr4_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(12);
        payload.extend_from_slice(&self.version.to_le_bytes());
        payload.extend_from_slice(&(self.record_count as i32).to_le_bytes());
        payload.extend_from_slice(&self.next_object_id.to_le_bytes());
        payload
    }
}

/// Append `bytes` cut or NUL-padded to exactly `width` bytes.
fn push_padded(out: &mut Vec<u8>, bytes: &[u8], width: usize) {
    let len = bytes.len().min(width);
    out.extend_from_slice(&bytes[..len]);
    out.resize(out.len() + (width - len), 0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hedr3_payload_layout() {
        let header = FileHeader::new(Dialect::Tes3, FileKind::Master)
            .with_author("me")
            .with_description("x".repeat(400));
        let payload = header.hedr3_payload(Transcoder::default());
        assert_eq!(payload.len(), HEDR3_LEN);
        assert_eq!(&payload[4..8], &TYPE_MASTER.to_le_bytes());
        assert_eq!(&payload[8..10], b"me");
        assert_eq!(payload[10], 0);
    }

    #[test]
    fn test_builder() {
        let header = FileHeader::new(Dialect::Tes4, FileKind::Plugin).with_master("Base.esm", 10);
        assert_eq!(header.version, 1.7);
        assert_eq!(header.masters[0].name, "Base.esm");
        assert!(!header.is_master());
    }
}
