//! The ordered stack of content files.

use std::path::{Path, PathBuf};

use strata_common::{Diagnostic, DiagnosticSink, FormId, RefId};
use strata_esm::records::RawId;
use strata_esm::{Dialect, EsmReader, FileHeader};

use crate::{Error, IndexRemap, Result};

/// One opened content file.
#[derive(Debug, Clone)]
pub struct ContentFile {
    /// Position in the stack; also the mod index of the entities it introduces.
    pub index: usize,
    pub path: PathBuf,
    pub name: String,
    pub header: FileHeader,
    pub(crate) remap: IndexRemap,
}

impl ContentFile {
    /// Get the file's dialect.
    #[inline]
    pub fn dialect(&self) -> Dialect {
        self.header.dialect
    }

    /// Get the table used to rewrite identifiers stored in this file.
    #[inline]
    pub fn remap(&self) -> &IndexRemap {
        &self.remap
    }

    /// Rewrite a stored form id into the active stack, reporting it when its
    /// file is not loaded.
    pub(crate) fn resolve_form(
        &self,
        raw: FormId,
        sink: &mut dyn DiagnosticSink,
    ) -> Option<FormId> {
        let resolved = self.remap.remap(raw);
        if resolved.is_none() {
            sink.report(Diagnostic::UnresolvedIdentifier {
                file: self.name.clone(),
                raw,
            });
        }
        resolved
    }

    /// Turn a stored base id into an identity valid in the active stack.
    pub fn lookup_id(&self, raw: &RawId) -> Option<RefId> {
        match raw {
            RawId::Name(name) => Some(RefId::name(name)),
            RawId::Form(form) => self.remap.remap(*form).map(RefId::Form),
        }
    }

    /// Like [`ContentFile::lookup_id`], reporting ids that do not resolve.
    pub(crate) fn resolve_id(&self, raw: &RawId, sink: &mut dyn DiagnosticSink) -> Option<RefId> {
        match raw {
            RawId::Name(name) => Some(RefId::name(name)),
            RawId::Form(form) => self.resolve_form(*form, sink).map(RefId::Form),
        }
    }
}

/// Content files in load order: the base master first, overrides after it.
#[derive(Debug, Clone, Default)]
pub struct ContentStack {
    files: Vec<ContentFile>,
}

impl ContentStack {
    /// Largest number of files a stack can hold; index 0xFF is reserved for
    /// runtime references.
    pub const MAX_FILES: usize = FormId::RUNTIME_MOD_INDEX as usize;

    /// Append a file whose header has been read by `reader`.
    ///
    /// Masters are matched by name against the files already in the stack.
    /// A master that is not loaded is reported and identifiers pointing at it
    /// will not resolve.
    pub(crate) fn push(
        &mut self,
        reader: &EsmReader,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<&ContentFile> {
        let index = self.files.len();
        if index >= Self::MAX_FILES {
            return Err(Error::TooManyFiles { count: index + 1 });
        }

        let header = reader.header().clone();
        let name = reader.name().to_string();
        let masters: Vec<Option<u8>> = header
            .masters
            .iter()
            .map(|master| {
                let found = self.index_of(&master.name);
                if found.is_none() {
                    sink.report(Diagnostic::MissingMaster {
                        file: name.clone(),
                        master: master.name.clone(),
                    });
                }
                found
            })
            .collect();

        let remap = IndexRemap::for_file(header.dialect, index as u8, &masters);
        tracing::debug!(file = %name, index, masters = masters.len(), "added content file");
        self.files.push(ContentFile {
            index,
            path: reader.path().to_path_buf(),
            name,
            header,
            remap,
        });
        Ok(&self.files[index])
    }

    /// Find a file by name, case-insensitively.
    pub fn index_of(&self, name: &str) -> Option<u8> {
        self.files
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
            .map(|i| i as u8)
    }

    /// Get a file by stack position.
    pub fn get(&self, index: usize) -> Option<&ContentFile> {
        self.files.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ContentFile> {
        self.files.iter()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Paths of every file, in order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|f| f.path.as_path())
    }
}

impl<'a> IntoIterator for &'a ContentStack {
    type Item = &'a ContentFile;
    type IntoIter = std::slice::Iter<'a, ContentFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}
