//! Bounded pool of open content file readers.
//!
//! A cell's contents can be spread over every file in the stack, so readers
//! are kept open between loads. At most `capacity` files are open at once.
//! When the pool is full, the least recently used reader is taken over: its
//! context restore reopens it on the requested file at the stored offset.

use std::num::NonZeroUsize;

use lru::LruCache;

use strata_common::Transcoder;
use strata_esm::{EsmReader, ReaderContext};

use crate::{Error, Result};

/// Open readers keyed by stack position.
pub struct ReaderCache {
    readers: LruCache<usize, EsmReader>,
    transcoder: Transcoder,
}

impl std::fmt::Debug for ReaderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderCache")
            .field("open", &self.readers.len())
            .field("capacity", &self.readers.cap())
            .finish()
    }
}

impl ReaderCache {
    pub fn new(capacity: NonZeroUsize, transcoder: Transcoder) -> Self {
        Self {
            readers: LruCache::new(capacity),
            transcoder,
        }
    }

    /// Number of files currently open.
    pub fn open_count(&self) -> usize {
        self.readers.len()
    }

    /// Get the transcoder new readers are opened with.
    pub fn transcoder(&self) -> Transcoder {
        self.transcoder
    }

    /// Hand a freshly opened reader to the pool.
    pub(crate) fn insert(&mut self, reader: EsmReader) {
        if let Some((evicted, _)) = self.readers.push(reader.file_index(), reader) {
            tracing::trace!(file_index = evicted, "closed reader");
        }
    }

    /// Get a reader positioned at `context`, reusing or recycling an open one.
    pub(crate) fn restore(&mut self, context: &ReaderContext) -> Result<&mut EsmReader> {
        let index = context.file_index();
        if !self.readers.contains(&index) {
            let reader = if self.readers.len() == self.readers.cap().get() {
                match self.readers.pop_lru() {
                    Some((evicted, mut reader)) => {
                        tracing::trace!(from = evicted, to = index, "recycling reader");
                        reader.restore(context)?;
                        reader
                    }
                    None => EsmReader::open(context.path(), index, self.transcoder)?,
                }
            } else {
                EsmReader::open(context.path(), index, self.transcoder)?
            };
            self.readers.put(index, reader);
        }
        let reader = self.get(index)?;
        reader.restore(context)?;
        Ok(reader)
    }

    fn get(&mut self, index: usize) -> Result<&mut EsmReader> {
        self.readers
            .get_mut(&index)
            .ok_or_else(|| Error::from(std::io::Error::other(format!("reader {index} not open"))))
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;

    use strata_common::FormId;
    use strata_esm::dialect::tags;
    use strata_esm::{Dialect, EsmWriter, FileHeader, FileKind};
    use tempfile::TempDir;

    use super::*;

    fn content_file(dir: &TempDir, name: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let header = FileHeader::new(Dialect::Tes3, FileKind::Plugin);
        let mut w = EsmWriter::new(File::create(&path).unwrap(), Dialect::Tes3, Transcoder::default());
        w.write_header(&header).unwrap();
        w.start_record(tags::CELL, 0, FormId::default()).unwrap();
        w.write_sub_string(tags::NAME, name).unwrap();
        w.end_record().unwrap();
        w.finish().unwrap();
        path
    }

    #[test]
    fn test_pool_recycles_least_recently_used() {
        let dir = TempDir::new().unwrap();
        let files: Vec<_> = (0..3)
            .map(|i| content_file(&dir, &format!("f{i}.esp")))
            .collect();
        let mut cache = ReaderCache::new(NonZeroUsize::new(2).unwrap(), Transcoder::default());

        let contexts: Vec<ReaderContext> = files
            .iter()
            .enumerate()
            .map(|(index, path)| {
                let reader = EsmReader::open(path, index, Transcoder::default()).unwrap();
                let context = reader.save();
                cache.insert(reader);
                context
            })
            .collect();
        assert_eq!(cache.open_count(), 2);

        // File 0 was evicted; restoring it recycles the reader of file 1.
        let reader = cache.restore(&contexts[0]).unwrap();
        assert_eq!(reader.file_index(), 0);
        assert_eq!(reader.path(), files[0].as_path());
        assert_eq!(reader.position(), contexts[0].offset());
        assert_eq!(cache.open_count(), 2);

        let reader = cache.restore(&contexts[2]).unwrap();
        assert_eq!(reader.file_index(), 2);
    }
}
