//! Identity cache for habit instances.
//!
//! # Responsibility
//! - Map each persisted habit id to its single in-memory instance.
//! - Answer "is this exact instance tracked, and under which id" for the
//!   structural checks of the habit list.
//!
//! # Invariants
//! - At most one entry per id; an id is never bound to two instances.
//! - No eviction: entries live until explicitly removed. The number of
//!   habits per application is small.

use crate::model::habit::{HabitId, SharedHabit};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Process-lifetime id -> instance map.
#[derive(Debug, Default)]
pub struct IdentityCache {
    entries: BTreeMap<HabitId, SharedHabit>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached instance for `id`, if any.
    pub fn get(&self, id: HabitId) -> Option<SharedHabit> {
        self.entries.get(&id).cloned()
    }

    /// Binds `id` to `habit`. Callers only bind ids that are not cached yet.
    pub fn put(&mut self, id: HabitId, habit: SharedHabit) {
        self.entries.insert(id, habit);
    }

    /// Drops the entry for `id` and returns it.
    pub fn remove(&mut self, id: HabitId) -> Option<SharedHabit> {
        self.entries.remove(&id)
    }

    pub fn contains_id(&self, id: HabitId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Returns the id this exact instance is tracked under.
    pub fn id_of_instance(&self, habit: &SharedHabit) -> Option<HabitId> {
        self.entries
            .iter()
            .find(|(_, cached)| Rc::ptr_eq(cached, habit))
            .map(|(id, _)| *id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::IdentityCache;
    use crate::model::habit::Habit;
    use std::rc::Rc;

    #[test]
    fn get_returns_the_same_instance() {
        let mut cache = IdentityCache::new();
        let habit = Habit::new("Floss").into_shared();
        cache.put(1, habit.clone());

        let cached = cache.get(1).expect("entry should exist");
        assert!(Rc::ptr_eq(&cached, &habit));
        assert!(cache.get(2).is_none());
    }

    #[test]
    fn id_of_instance_uses_identity_not_equality() {
        let mut cache = IdentityCache::new();
        let tracked = Habit::new("Floss").into_shared();
        let lookalike = Habit::new("Floss").into_shared();
        cache.put(1, tracked.clone());

        assert_eq!(cache.id_of_instance(&tracked), Some(1));
        assert_eq!(cache.id_of_instance(&lookalike), None);
    }

    #[test]
    fn put_same_instance_twice_keeps_one_entry() {
        let mut cache = IdentityCache::new();
        let habit = Habit::new("A").into_shared();

        cache.put(1, habit.clone());
        cache.put(1, habit.clone());
        assert_eq!(cache.len(), 1);
        assert!(Rc::ptr_eq(&cache.get(1).unwrap(), &habit));
    }

    #[test]
    fn remove_evicts_entry() {
        let mut cache = IdentityCache::new();
        cache.put(4, Habit::new("Nap").into_shared());
        assert!(cache.contains_id(4));
        assert!(cache.remove(4).is_some());
        assert!(!cache.contains_id(4));
        assert!(cache.is_empty());
    }
}
