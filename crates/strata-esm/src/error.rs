//! Error types for content file reading and writing.
//!
//! Everything here is fatal for the file being read: the framing can no longer
//! be trusted. Conditions scoped to one entity are reported as
//! [`strata_common::Diagnostic`]s instead.

use thiserror::Error;

use strata_common::Tag;

use crate::Dialect;

/// Errors that can occur when reading or writing content files.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Common library error.
    #[error("{0}")]
    Common(#[from] strata_common::Error),

    /// The file does not start with a known header record.
    #[error("invalid file magic: expected TES3 or TES4, got {actual}")]
    InvalidMagic { actual: Tag },

    /// The header declares a format version this reader does not handle.
    #[error("unsupported {dialect} format version {version}")]
    UnsupportedVersion { dialect: Dialect, version: f32 },

    /// Fewer bytes remain than a record or group header needs.
    #[error("truncated header at offset {offset}: only {available} bytes remain")]
    TruncatedHeader { offset: u64, available: u64 },

    /// A record claims more bytes than remain in its file or group.
    #[error("{tag} record at offset {offset} declares {declared} bytes but only {available} remain")]
    RecordOverrun {
        tag: Tag,
        offset: u64,
        declared: u64,
        available: u64,
    },

    /// A group claims more bytes than remain in its parent.
    #[error("group at offset {offset} declares {declared} bytes but only {available} remain")]
    GroupOverrun {
        offset: u64,
        declared: u64,
        available: u64,
    },

    /// A subrecord claims more bytes than remain in its record.
    #[error("{record}.{tag} at offset {offset} declares {declared} bytes but only {remaining} remain in the record")]
    SubrecordOverrun {
        record: Tag,
        tag: Tag,
        offset: u64,
        declared: u32,
        remaining: u32,
    },

    /// A named subrecord read found a different tag.
    #[error("{record} at offset {offset}: expected subrecord {expected}, got {actual}")]
    UnexpectedSubrecord {
        record: Tag,
        expected: Tag,
        actual: Tag,
        offset: u64,
    },

    /// A named subrecord read ran out of subrecords.
    #[error("{record}: missing subrecord {expected}")]
    MissingSubrecord { record: Tag, expected: Tag },

    /// A fixed-size subrecord has the wrong length.
    #[error("{record}.{tag} at offset {offset}: expected {expected} bytes, got {actual}")]
    UnexpectedSubrecordSize {
        record: Tag,
        tag: Tag,
        offset: u64,
        expected: usize,
        actual: u32,
    },

    /// Writer calls were not balanced.
    #[error("writer misuse: {0}")]
    WriterState(&'static str),
}

/// Result type for content file operations.
pub type Result<T> = std::result::Result<T, Error>;
