//! Mod index remapping.
//!
//! A stored [`FormId`] names its content file by position: in the writer's
//! master list, or in the stack that was active when a save was written.
//! [`IndexRemap`] rewrites that position into the active stack and reports
//! identifiers whose file is no longer loaded.

use strata_common::FormId;
use strata_esm::{Dialect, MasterFile};

use crate::ContentStack;

/// Table from original mod index to active stack position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexRemap {
    table: Vec<Option<u8>>,
}

impl IndexRemap {
    /// Map `0..count` onto itself.
    pub fn identity(count: usize) -> Self {
        Self {
            table: (0..count.min(usize::from(FormId::RUNTIME_MOD_INDEX)))
                .map(|i| Some(i as u8))
                .collect(),
        }
    }

    /// Build a table from explicit `(original, current)` pairs.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (u8, u8)>) -> Self {
        let mut table = Vec::new();
        for (original, current) in pairs {
            let slot = usize::from(original);
            if table.len() <= slot {
                table.resize(slot + 1, None);
            }
            table[slot] = Some(current);
        }
        Self { table }
    }

    /// Match files by name: entry `i` of `saved` maps to the stack position of
    /// the file with the same name, compared case-insensitively.
    pub fn by_name(saved: &[MasterFile], stack: &ContentStack) -> Self {
        Self {
            table: saved.iter().map(|m| stack.index_of(&m.name)).collect(),
        }
    }

    /// Table for identifiers stored in one content file.
    ///
    /// `masters` holds the stack position of each of the file's masters, or
    /// `None` when a master is not loaded. Dialect A writes 0 for the file
    /// itself and `k` for master `k - 1`; dialect B writes `k` for master `k`
    /// and the master count for the file itself.
    pub(crate) fn for_file(dialect: Dialect, own: u8, masters: &[Option<u8>]) -> Self {
        let mut table = Vec::with_capacity(masters.len() + 1);
        match dialect {
            Dialect::Tes3 => {
                table.push(Some(own));
                table.extend_from_slice(masters);
            }
            Dialect::Tes4 => {
                table.extend_from_slice(masters);
                table.push(Some(own));
            }
        }
        Self { table }
    }

    /// Look up the current position of an original mod index.
    #[inline]
    pub fn get(&self, original: u8) -> Option<u8> {
        self.table.get(usize::from(original)).copied().flatten()
    }

    /// Rewrite an identifier. Runtime identifiers pass through unchanged.
    pub fn remap(&self, id: FormId) -> Option<FormId> {
        if id.is_runtime() {
            return Some(id);
        }
        self.get(id.mod_index()).map(|index| id.with_mod_index(index))
    }

    /// Number of original indices covered.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
