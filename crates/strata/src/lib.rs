//! Strata - layered game content file loading and persistence.
//!
//! This crate re-exports the Strata library crates:
//!
//! - [`strata_common`] - Binary cursors, transcoding, identifiers, diagnostics
//! - [`strata_esm`] - Record/subrecord reader and writer for both content file dialects
//! - [`strata_world`] - Content stack, world index, per-cell reference store and saves
//!
//! # Example
//!
//! ```no_run
//! use strata::prelude::*;
//!
//! let config = SessionConfig::new("Data/Base.esm").with_plugin("Data/Patch.esp");
//! let mut session = Session::open(config)?;
//!
//! let cell: CellId = "-2,5".parse()?;
//! if let Some(store) = session.load(&cell)? {
//!     for live in store.refs(Category::Door).iter() {
//!         println!("{} -> {}", live.ref_num, live.base.id);
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub use strata_common as common;
pub use strata_esm as esm;
pub use strata_world as world;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use strata_common::{Diagnostic, Encoding, FormId, RefId, Tag, Transcoder};
    pub use strata_esm::{Category, Dialect, EsmReader, EsmWriter, FileHeader, FileKind};
    pub use strata_world::{
        CellId, CellStore, IndexRemap, LiveRef, LoadState, RefState, RuntimeHandle, Session,
        SessionConfig,
    };
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
