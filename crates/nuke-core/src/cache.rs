//! Live-item cache shared by resource kinds.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Sorted map from item identifier to the metadata needed to delete it.
///
/// `list(false)` of a kind is answered from here while the kind's own task
/// may be removing items, so the map sits behind a lock.
#[derive(Debug)]
pub struct ItemCache<M> {
    items: Mutex<BTreeMap<String, M>>,
}

impl<M> Default for ItemCache<M> {
    fn default() -> Self {
        Self {
            items: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<M: Clone> ItemCache<M> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, M>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the whole cache, returning the new sorted identifiers.
    pub fn replace(&self, items: impl IntoIterator<Item = (String, M)>) -> Vec<String> {
        let mut guard = self.lock();
        *guard = items.into_iter().collect();
        guard.keys().cloned().collect()
    }

    /// Sorted identifiers currently cached.
    pub fn names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Snapshot of identifiers with their metadata.
    pub fn entries(&self) -> Vec<(String, M)> {
        self.lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn insert(&self, name: impl Into<String>, meta: M) {
        self.lock().insert(name.into(), meta);
    }

    /// Drop an item once the backend confirmed its deletion.
    pub fn remove(&self, name: &str) -> Option<M> {
        self.lock().remove(name)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_returns_sorted_names() {
        let cache = ItemCache::new();
        let names = cache.replace(vec![
            ("vm-b".to_string(), "europe-west1-b"),
            ("vm-a".to_string(), "europe-west1-c"),
        ]);
        assert_eq!(names, vec!["vm-a", "vm-b"]);
        assert_eq!(cache.len(), 2);

        cache.replace(Vec::new());
        assert!(cache.is_empty());
    }

    #[test]
    fn remove_drops_single_item() {
        let cache = ItemCache::new();
        cache.insert("disk-1", "zone-a");
        cache.insert("disk-2", "zone-b");

        assert_eq!(cache.remove("disk-1"), Some("zone-a"));
        assert_eq!(cache.remove("disk-1"), None);
        assert_eq!(cache.entries(), vec![("disk-2".to_string(), "zone-b")]);
    }
}
