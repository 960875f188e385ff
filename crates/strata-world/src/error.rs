//! Error types for the world layer.

use std::path::PathBuf;

use thiserror::Error;

use strata_common::{RefId, Tag};

use crate::CellId;

/// Errors that can occur when opening a session or loading, saving and
/// restoring cells.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Content file error.
    #[error("{0}")]
    Esm(#[from] strata_esm::Error),

    /// Common library error.
    #[error("{0}")]
    Common(#[from] strata_common::Error),

    /// More content files than mod indices.
    #[error("too many content files: {count} (at most 255)")]
    TooManyFiles { count: usize },

    /// The configuration cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// A file passed to restore is not a save.
    #[error("{} is not a save file", path.display())]
    NotASave { path: PathBuf },

    /// A save names an object category this build does not know.
    #[error("unknown object category {0} in save")]
    UnknownCategory(Tag),

    /// A saved reference payload is malformed.
    #[error("malformed saved reference in cell {cell}: {source}")]
    MalformedSave {
        cell: String,
        #[source]
        source: strata_common::Error,
    },

    /// A load was abandoned through its cancel flag.
    #[error("cell load cancelled")]
    Cancelled,

    /// The cell is not part of the world index.
    #[error("unknown cell {0}")]
    UnknownCell(CellId),

    /// The operation needs the cell to be loaded first.
    #[error("cell {0} is not loaded")]
    CellNotLoaded(CellId),

    /// No base record with this identity exists.
    #[error("unknown base record {0}")]
    UnknownBase(RefId),

    /// The runtime reference serial space is used up.
    #[error("runtime reference ids exhausted")]
    RuntimeIdsExhausted,
}

/// Result type for world operations.
pub type Result<T> = std::result::Result<T, Error>;
