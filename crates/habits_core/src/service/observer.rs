//! Change notifications emitted by the habit list.
//!
//! # Invariants
//! - Observers are notified after the mutation is committed, never before.
//! - Notification order follows subscription order.

use crate::model::habit::HabitId;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Structural change applied to the habit list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HabitListChange {
    /// A habit was appended at the end of the order.
    Added(HabitId),
    /// A habit was deleted and the remaining positions were closed up.
    Removed(HabitId),
    /// A habit moved from one position to another.
    Reordered { id: HabitId, from: i64, to: i64 },
    /// Domain fields of these habits were rewritten.
    Updated(Vec<HabitId>),
}

/// Receives [`HabitListChange`] events so derived views can refresh.
pub trait HabitListObserver {
    fn on_habit_list_changed(&self, change: &HabitListChange);
}

impl<F> HabitListObserver for F
where
    F: Fn(&HabitListChange),
{
    fn on_habit_list_changed(&self, change: &HabitListChange) {
        self(change)
    }
}

/// Handle returned by `subscribe`, used to unsubscribe later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub(crate) struct ObserverRegistry {
    observers: BTreeMap<SubscriptionId, Rc<dyn HabitListObserver>>,
    next_id: u64,
}

impl ObserverRegistry {
    pub(crate) fn subscribe(&mut self, observer: Rc<dyn HabitListObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.observers.insert(id, observer);
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.remove(&id).is_some()
    }

    pub(crate) fn notify(&self, change: &HabitListChange) {
        for observer in self.observers.values() {
            observer.on_habit_list_changed(change);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{HabitListChange, HabitListObserver, ObserverRegistry};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn notify_reaches_subscribers_until_unsubscribed() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let observer: Rc<dyn HabitListObserver> =
            Rc::new(move |change: &HabitListChange| sink.borrow_mut().push(change.clone()));

        let mut registry = ObserverRegistry::default();
        let id = registry.subscribe(observer);
        registry.notify(&HabitListChange::Added(1));

        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        registry.notify(&HabitListChange::Removed(1));

        assert_eq!(*seen.borrow(), vec![HabitListChange::Added(1)]);
        assert!(registry.observers.is_empty());
    }
}
