//! Non-fatal diagnostics.
//!
//! Problems scoped to a single entity (a record of an unknown type, a reference
//! whose identifier cannot be resolved) are reported here and the offending
//! item is skipped. They never abort the surrounding load.

use std::fmt;

use crate::{FormId, RefId, Tag};

/// A recoverable condition observed while loading.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// A record type missing from the dispatch table was skipped.
    UnknownRecordType { file: String, tag: Tag, offset: u64 },
    /// A group with an unrecognized type discriminant was skipped.
    UnknownGroup { file: String, group_type: i32, offset: u64 },
    /// A compressed record whose payload does not inflate was skipped.
    CompressedRecord { file: String, tag: Tag, offset: u64 },
    /// A content file names a master that is not part of the active stack.
    MissingMaster { file: String, master: String },
    /// An identifier points at a content file outside the active stack; the
    /// entity carrying it was dropped.
    UnresolvedIdentifier { file: String, raw: FormId },
    /// A reference names a base record that does not exist; the reference was dropped.
    MissingBase { cell: String, reference: FormId, base: RefId },
    /// A saved reference could not be matched against the loaded content.
    DroppedSavedReference { cell: String, reference: FormId, reason: &'static str },
    /// A saved cell does not exist in the active content stack.
    MissingCell { cell: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownRecordType { file, tag, offset } => {
                write!(f, "{file}@{offset}: unknown record type {tag} - skipped")
            }
            Self::UnknownGroup {
                file,
                group_type,
                offset,
            } => write!(f, "{file}@{offset}: group of unknown kind {group_type} - skipped"),
            Self::CompressedRecord { file, tag, offset } => {
                write!(f, "{file}@{offset}: compressed {tag} record does not inflate - skipped")
            }
            Self::MissingMaster { file, master } => {
                write!(f, "{file}: master {master} is not loaded")
            }
            Self::UnresolvedIdentifier { file, raw } => {
                write!(f, "{file}: reference {raw} could not be resolved - dropped")
            }
            Self::MissingBase {
                cell,
                reference,
                base,
            } => write!(
                f,
                "cell {cell}: reference {reference} names missing base record {base} - dropped"
            ),
            Self::DroppedSavedReference {
                cell,
                reference,
                reason,
            } => write!(f, "cell {cell}: saved reference {reference} dropped ({reason})"),
            Self::MissingCell { cell } => write!(f, "saved cell {cell} no longer exists - dropped"),
        }
    }
}

/// Receiver for diagnostics.
pub trait DiagnosticSink {
    /// Report one diagnostic.
    fn report(&mut self, diagnostic: Diagnostic);
}

/// Collects diagnostics and logs each one as a warning.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get every diagnostic reported so far.
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Number of diagnostics reported so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether nothing has been reported.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and return every collected diagnostic.
    pub fn drain(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.entries)
    }
}

impl DiagnosticSink for Diagnostics {
    fn report(&mut self, diagnostic: Diagnostic) {
        tracing::warn!("{diagnostic}");
        self.entries.push(diagnostic);
    }
}

/// Buffers diagnostics for reporting later.
impl DiagnosticSink for Vec<Diagnostic> {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_and_drains() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.report(Diagnostic::UnknownRecordType {
            file: "Base.esm".to_string(),
            tag: Tag::new(*b"ZZZZ"),
            offset: 42,
        });
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics.entries()[0].to_string(),
            "Base.esm@42: unknown record type ZZZZ - skipped"
        );

        let drained = diagnostics.drain();
        assert_eq!(drained.len(), 1);
        assert!(diagnostics.is_empty());
    }
}
