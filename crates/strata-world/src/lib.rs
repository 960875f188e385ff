//! Layered world state built from a stack of content files.
//!
//! A [`Session`] opens a base master and its override plugins in load order,
//! indexes where every cell and base record lives, and materializes a cell's
//! references only when asked to:
//!
//! - [`Session::preload`] reads the identities of a cell's references
//! - [`Session::load`] merges every file's view of the cell by identity,
//!   later files overriding earlier ones
//! - [`Session::save`] writes only references whose state changed
//! - [`Session::restore`] applies such a save through an [`IndexRemap`]
//!
//! Problems scoped to one entity are reported as
//! [`strata_common::Diagnostic`]s and never abort a load.

mod base;
mod config;
mod content;
mod error;
mod index;
mod readers;
mod remap;
mod save;
mod session;
pub mod store;

pub use base::{BaseObject, BaseStore};
pub use config::{SessionConfig, DEFAULT_MAX_OPEN_READERS};
pub use content::{ContentFile, ContentStack};
pub use error::{Error, Result};
pub use index::{CellEntry, CellId, RecordLocation, WorldIndex};
pub use readers::ReaderCache;
pub use remap::IndexRemap;
pub use save::{RestoreSummary, SaveSummary, CFID};
pub use session::Session;
pub use store::{CellStore, LiveRef, LoadState, RefList, RefState, RuntimeHandle};

/// Fast hash map used for identity lookups.
pub(crate) type FxHashMap<K, V> =
    hashbrown::HashMap<K, V, std::hash::BuildHasherDefault<rustc_hash::FxHasher>>;
