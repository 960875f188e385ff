//! Record/subrecord reader and writer for layered game content files.
//!
//! Content files come in two binary dialects that share a subrecord model but
//! differ in framing (see [`Dialect`]). This crate abstracts over both while
//! keeping their individual rules intact.
//!
//! # Quick Start
//!
//! ```no_run
//! use strata_common::{Diagnostics, Transcoder};
//! use strata_esm::{walk, Descend, EsmReader, GroupHeader, RecordHeader, RecordKind, Visitor};
//!
//! struct CountCells(usize, Diagnostics);
//!
//! impl Visitor for CountCells {
//!     type Error = strata_esm::Error;
//!
//!     fn visit_group(&mut self, _: &mut EsmReader, _: &GroupHeader) -> strata_esm::Result<Descend> {
//!         Ok(Descend::Enter)
//!     }
//!
//!     fn visit_record(&mut self, _: &mut EsmReader, _: &RecordHeader, kind: RecordKind) -> strata_esm::Result<()> {
//!         if kind == RecordKind::Cell {
//!             self.0 += 1;
//!         }
//!         Ok(())
//!     }
//!
//!     fn diagnostic(&mut self, diagnostic: strata_common::Diagnostic) {
//!         strata_common::DiagnosticSink::report(&mut self.1, diagnostic);
//!     }
//! }
//!
//! let mut reader = EsmReader::open("Base.esm", 0, Transcoder::default())?;
//! let mut visitor = CountCells(0, Diagnostics::new());
//! walk(&mut reader, &mut visitor)?;
//! println!("{} cells", visitor.0);
//! # Ok::<(), strata_esm::Error>(())
//! ```
//!
//! # Resuming
//!
//! [`EsmReader::save`] captures a [`ReaderContext`]; [`EsmReader::restore`]
//! continues from it later, reopening the context's file if the reader has
//! moved on to another one. This is how a cell whose contents are spread over
//! several files is read without rescanning any of them.

pub mod dialect;
pub mod records;

mod context;
mod error;
mod file_header;
mod header;
mod kind;
mod reader;
mod walk;
mod writer;

pub use context::ReaderContext;
pub use dialect::Dialect;
pub use error::{Error, Result};
pub use file_header::{FileHeader, FileKind, MasterFile};
pub use header::{GroupHeader, GroupKind, RecordHeader};
pub use kind::{Category, RecordKind};
pub use reader::{EsmReader, Unit};
pub use walk::{walk, Descend, Visitor};
pub use writer::EsmWriter;
