//! Parsers for the record types the world loader consumes.
//!
//! Identifiers come out of these parsers exactly as stored in the file; the
//! world layer rewrites their file-index component into the active load order.

mod base;
mod cell;
mod reference;

pub use base::BaseRecord;
pub use cell::CellRecord;
pub use reference::{read_references, CellRef, Destination, Position, ReadMode, Teleport};

use std::fmt;

use strata_common::FormId;

/// A base record identifier before load-order remapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RawId {
    /// Dialect A string id, as stored.
    Name(String),
    /// Dialect B form id, as stored.
    Form(FormId),
}

impl fmt::Display for RawId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Form(id) => write!(f, "{id}"),
        }
    }
}

