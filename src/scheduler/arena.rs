/*!
 * Thread Arena
 * Threads registered with one CPU, indexed by their stable id
 */

use crate::core::types::ThreadId;
use crate::thread::ThreadObject;
use ahash::RandomState;
use std::collections::HashMap;
use std::sync::Arc;

/// Owning table of a CPU's thread objects
///
/// Runqueues hold `ThreadId`s and resolve them here.
#[derive(Default)]
pub struct ThreadArena {
    threads: HashMap<ThreadId, Arc<ThreadObject>, RandomState>,
}

impl ThreadArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve an id that a queue or `current` refers to
    ///
    /// # Panics
    /// If the id is not registered, which means a queue outlived its thread.
    #[inline]
    pub fn get(&self, id: ThreadId) -> &Arc<ThreadObject> {
        match self.threads.get(&id) {
            Some(obj) => obj,
            None => panic!("thread {} is not registered on this pcpu", id),
        }
    }

    #[inline]
    pub fn try_get(&self, id: ThreadId) -> Option<&Arc<ThreadObject>> {
        self.threads.get(&id)
    }

    #[inline]
    pub fn contains(&self, id: ThreadId) -> bool {
        self.threads.contains_key(&id)
    }

    pub(crate) fn insert(&mut self, obj: Arc<ThreadObject>) -> Option<Arc<ThreadObject>> {
        self.threads.insert(obj.id(), obj)
    }

    pub(crate) fn remove(&mut self, id: ThreadId) -> Option<Arc<ThreadObject>> {
        self.threads.remove(&id)
    }

    pub(crate) fn clear(&mut self) {
        self.threads.clear();
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ThreadObject>> {
        self.threads.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut arena = ThreadArena::new();
        let obj = ThreadObject::builder("vcpu0", 0).build();
        let id = obj.id();

        assert!(arena.insert(Arc::clone(&obj)).is_none());
        assert!(arena.contains(id));
        assert!(Arc::ptr_eq(arena.get(id), &obj));
        assert_eq!(arena.len(), 1);

        assert!(arena.remove(id).is_some());
        assert!(arena.try_get(id).is_none());
        assert!(arena.is_empty());
    }

    #[test]
    #[should_panic(expected = "not registered")]
    fn test_get_unknown_panics() {
        let arena = ThreadArena::new();
        arena.get(ThreadId(u64::MAX));
    }
}
