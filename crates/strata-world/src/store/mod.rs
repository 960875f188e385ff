//! Loaded references, per cell.

mod cell_store;
mod live_ref;
mod ref_list;

pub(crate) use cell_store::{Applied, LoadContext};
pub use cell_store::{CellStore, LoadState};
pub use live_ref::{HandleAllocator, LiveRef, RefState, RuntimeHandle};
pub use ref_list::RefList;
