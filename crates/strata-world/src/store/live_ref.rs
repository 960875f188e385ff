//! Materialized references and their mutable state.

use std::fmt;
use std::sync::Arc;

use strata_common::{DiagnosticSink, FormId, RefId};
use strata_esm::records::{CellRef, Destination, Position, Teleport};

use crate::{BaseObject, ContentFile};

/// Session-scoped handle assigned to a reference when it materializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RuntimeHandle(u32);

impl RuntimeHandle {
    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Hands out [`RuntimeHandle`]s; one per session.
#[derive(Debug, Default)]
pub struct HandleAllocator {
    next: u32,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> RuntimeHandle {
        self.next += 1;
        RuntimeHandle(self.next)
    }
}

/// Mutable state of a reference, layered over its base record.
#[derive(Debug, Clone, PartialEq)]
pub struct RefState {
    pub position: Position,
    pub scale: f32,
    pub count: i32,
    pub enabled: bool,
    pub charge: Option<f32>,
    pub lock_level: Option<i32>,
    pub key: Option<RefId>,
    /// Door destination; a `Door` destination holds a form id in the active stack.
    pub teleport: Option<Teleport>,
}

impl Default for RefState {
    fn default() -> Self {
        Self {
            position: Position::default(),
            scale: 1.0,
            count: 1,
            enabled: true,
            charge: None,
            lock_level: None,
            key: None,
            teleport: None,
        }
    }
}

impl RefState {
    /// Build the state a stored reference declares, resolving its identifiers
    /// into the active stack. Identifiers that do not resolve are reported and
    /// left out.
    pub(crate) fn from_stored(
        stored: &CellRef,
        file: &ContentFile,
        sink: &mut dyn DiagnosticSink,
    ) -> Self {
        let key = stored
            .key
            .as_ref()
            .and_then(|key| file.resolve_id(key, sink));
        let teleport = stored.teleport.as_ref().and_then(|teleport| {
            let destination = match &teleport.destination {
                Destination::Door(door) => Destination::Door(file.resolve_form(*door, sink)?),
                other => other.clone(),
            };
            Some(Teleport {
                destination,
                position: teleport.position,
            })
        });
        Self {
            position: stored.position,
            scale: stored.scale,
            count: stored.count,
            enabled: true,
            charge: stored.charge,
            lock_level: stored.lock_level,
            key,
            teleport,
        }
    }
}

/// A reference materialized in a loaded cell.
#[derive(Debug, Clone)]
pub struct LiveRef {
    /// Identity within the active stack.
    pub ref_num: FormId,
    pub base: Arc<BaseObject>,
    /// Stack position of the last file that defined the reference, or `None`
    /// for references created at runtime.
    pub source: Option<usize>,
    /// State as loaded from content files.
    pub original: RefState,
    /// Current state.
    pub state: RefState,
    pub deleted: bool,
    pub handle: RuntimeHandle,
}

impl LiveRef {
    /// Check whether the reference must be written to a save.
    pub fn is_changed(&self) -> bool {
        !self.deleted && (self.source.is_none() || self.state != self.original)
    }

    /// Check whether a runtime reference has been used up and should vanish.
    pub fn is_spent(&self) -> bool {
        self.source.is_none() && self.state.count == 0
    }
}

#[cfg(test)]
mod tests {
    use strata_esm::Category;

    use super::*;

    fn live(source: Option<usize>) -> LiveRef {
        LiveRef {
            ref_num: FormId::new(0, 1),
            base: Arc::new(BaseObject {
                id: RefId::name("rock"),
                category: Category::Static,
                editor_id: None,
                model: None,
                name: None,
                file: 0,
            }),
            source,
            original: RefState::default(),
            state: RefState::default(),
            deleted: false,
            handle: HandleAllocator::new().allocate(),
        }
    }

    #[test]
    fn test_changed_detection() {
        let mut r = live(Some(0));
        assert!(!r.is_changed());
        r.state.scale = 2.0;
        assert!(r.is_changed());
        r.deleted = true;
        assert!(!r.is_changed());

        let mut spawned = live(None);
        assert!(spawned.is_changed());
        spawned.state.count = 0;
        assert!(spawned.is_spent());
    }

    #[test]
    fn test_handles_are_unique() {
        let mut handles = HandleAllocator::new();
        let a = handles.allocate();
        let b = handles.allocate();
        assert_ne!(a, b);
        assert_eq!(b.get(), a.get() + 1);
    }
}
