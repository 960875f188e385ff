//! Saveable reader state.
//!
//! A [`ReaderContext`] captures everything needed to continue reading a file
//! from an exact byte: which file, where in it, how much of the current record
//! and subrecord is left, whether a subrecord tag has been peeked but not
//! consumed, and which groups enclose the position. Restoring a context on a
//! reader that has another file open reopens the saved file first.

use std::path::{Path, PathBuf};

use strata_common::Tag;

use crate::header::GroupHeader;

/// Snapshot of a reader's framing state.
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderContext {
    pub(crate) path: PathBuf,
    pub(crate) file_index: usize,
    pub(crate) file_pos: u64,
    pub(crate) left_file: u64,
    pub(crate) left_rec: u32,
    pub(crate) left_sub: u32,
    pub(crate) record: Tag,
    pub(crate) sub_name: Tag,
    pub(crate) sub_cached: bool,
    /// Length announced by an `XXXX` subrecord for the next subrecord.
    pub(crate) pending_sub_len: Option<u32>,
    /// Groups enclosing the position, outermost first.
    pub(crate) groups: Vec<GroupHeader>,
}

impl ReaderContext {
    pub(crate) fn new(path: PathBuf, file_index: usize, left_file: u64) -> Self {
        Self {
            path,
            file_index,
            file_pos: 0,
            left_file,
            left_rec: 0,
            left_sub: 0,
            record: Tag::new([0; 4]),
            sub_name: Tag::new([0; 4]),
            sub_cached: false,
            pending_sub_len: None,
            groups: Vec::new(),
        }
    }

    /// Path of the file this context belongs to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Position of the file in the content stack.
    pub fn file_index(&self) -> usize {
        self.file_index
    }

    /// Absolute byte offset the reader resumes at.
    pub fn offset(&self) -> u64 {
        self.file_pos
    }

    /// Bytes between the saved position and the end of the file.
    pub fn left_in_file(&self) -> u64 {
        self.left_file
    }

    /// Bytes left in the current record.
    pub fn left_in_record(&self) -> u32 {
        self.left_rec
    }

    /// Number of groups enclosing the saved position.
    pub fn group_depth(&self) -> usize {
        self.groups.len()
    }
}
