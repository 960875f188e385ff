//! Shared, immutable base records.

use std::sync::Arc;

use strata_common::RefId;
use strata_esm::records::BaseRecord;
use strata_esm::Category;

use crate::FxHashMap;

/// A base record as seen by references. Shared by every reference placing it.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseObject {
    pub id: RefId,
    pub category: Category,
    pub editor_id: Option<String>,
    pub model: Option<String>,
    pub name: Option<String>,
    /// Stack position of the file that last defined the record.
    pub file: usize,
}

impl BaseObject {
    pub(crate) fn from_record(id: RefId, record: BaseRecord, file: usize) -> Self {
        Self {
            id,
            category: record.category,
            editor_id: record.editor_id,
            model: record.model,
            name: record.name,
            file,
        }
    }
}

/// Every live base record, keyed by identity.
#[derive(Debug, Default)]
pub struct BaseStore {
    objects: FxHashMap<RefId, Arc<BaseObject>>,
}

impl BaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing any earlier definition with the same identity.
    pub fn insert(&mut self, object: BaseObject) -> Arc<BaseObject> {
        let object = Arc::new(object);
        self.objects.insert(object.id.clone(), Arc::clone(&object));
        object
    }

    /// Remove a record deleted by a later file.
    pub fn remove(&mut self, id: &RefId) -> Option<Arc<BaseObject>> {
        self.objects.remove(id)
    }

    pub fn get(&self, id: &RefId) -> Option<&Arc<BaseObject>> {
        self.objects.get(id)
    }

    pub fn contains(&self, id: &RefId) -> bool {
        self.objects.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<BaseObject>> {
        self.objects.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(id: &str, model: &str, file: usize) -> BaseObject {
        BaseObject {
            id: RefId::name(id),
            category: Category::Static,
            editor_id: Some(id.to_string()),
            model: Some(model.to_string()),
            name: None,
            file,
        }
    }

    #[test]
    fn test_later_definition_replaces() {
        let mut store = BaseStore::new();
        let first = store.insert(object("Rock", "a.nif", 0));
        store.insert(object("rock", "b.nif", 1));
        assert_eq!(store.len(), 1);

        let current = store.get(&RefId::name("ROCK")).unwrap();
        assert_eq!(current.model.as_deref(), Some("b.nif"));
        // Holders of the old definition keep it.
        assert_eq!(first.model.as_deref(), Some("a.nif"));

        store.remove(&RefId::name("rock"));
        assert!(!store.contains(&RefId::name("rock")));
    }
}
