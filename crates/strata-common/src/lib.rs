//! Common utilities for Strata.
//!
//! This crate provides foundational types and utilities used across all Strata crates:
//!
//! - [`StreamCursor`] - Exact-length reads from a seekable byte stream with a reusable scratch buffer
//! - [`BinaryReader`] - Zero-copy reading of payloads that are already in memory
//! - [`Transcoder`] - Legacy code page to Unicode conversion
//! - [`Tag`], [`FormId`], [`RefId`] - Record tags and entity identifiers
//! - [`Diagnostic`] - Non-fatal conditions reported while loading

mod cursor;
mod diag;
mod encoding;
mod error;
mod ids;
mod reader;
mod tag;

pub use cursor::StreamCursor;
pub use diag::{Diagnostic, DiagnosticSink, Diagnostics};
pub use encoding::{Encoding, Transcoder};
pub use error::{Error, Result};
pub use ids::{FormId, RefId};
pub use reader::BinaryReader;
pub use tag::Tag;

/// Re-export zerocopy traits for convenience
pub use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};
