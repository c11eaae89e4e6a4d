//! Ordered habit list: the authoritative, position-ordered habit collection.
//!
//! # Responsibility
//! - Own the total order of habits (a dense `position` per row).
//! - Keep the identity cache consistent with the record store.
//! - Apply structural mutations (add, remove, reorder, update) as single
//!   committed units and notify observers afterwards.
//!
//! # Invariants
//! - Positions of all persisted habits, archived or not, are exactly
//!   `0..N-1` whenever no operation is in flight.
//! - One in-memory instance per cached id (see [`IdentityCache`]).
//! - Position is always re-read from the store; a held habit's `position`
//!   field is only a convenience copy.
//! - Structural checks run before the first write of an operation.
//!
//! # Concurrency
//! Mutations take `&mut self` and habit handles are `Rc`, so the list is
//! confined to one thread and serves one operation at a time. Multi-write
//! operations run inside [`HabitStore::in_transaction`], so a reader of the
//! store never sees a duplicated position or a gap.

use crate::cache::IdentityCache;
use crate::model::habit::{Habit, HabitId, SharedHabit};
use crate::repo::habit_repo::{
    HabitFilter, HabitRecord, HabitRepoError, HabitStore, PositionEntry, PositionShift,
};
use crate::service::observer::{
    HabitListChange, HabitListObserver, ObserverRegistry, SubscriptionId,
};
use log::{debug, error, info, trace};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

pub type HabitListResult<T> = Result<T, HabitListError>;

/// Store/cache divergence detected by the habit list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// Operation needs a persisted habit but the instance has no id.
    HabitWithoutId,
    /// Instance is not the one tracked by this list.
    HabitNotInCache(Option<HabitId>),
    /// A row expected to exist is gone.
    HabitNotInDatabase(HabitId),
}

impl Display for InvariantViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HabitWithoutId => write!(f, "habit has no id"),
            Self::HabitNotInCache(Some(id)) => write!(f, "habit not in cache: {id}"),
            Self::HabitNotInCache(None) => write!(f, "habit not in cache"),
            Self::HabitNotInDatabase(id) => write!(f, "habit not in database: {id}"),
        }
    }
}

/// Errors from ordered habit list operations.
#[derive(Debug)]
pub enum HabitListError {
    /// The exact instance (or its id) is already tracked.
    DuplicateEntry(Option<HabitId>),
    /// Store and cache diverged. Fatal to the running operation.
    InvariantViolation(InvariantViolation),
    /// Record store failure, passed through unchanged.
    Store(HabitRepoError),
}

impl Display for HabitListError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateEntry(Some(id)) => write!(f, "habit already added: {id}"),
            Self::DuplicateEntry(None) => write!(f, "habit already added"),
            Self::InvariantViolation(violation) => {
                write!(f, "habit list invariant violated: {violation}")
            }
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for HabitListError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::DuplicateEntry(_) => None,
            Self::InvariantViolation(_) => None,
        }
    }
}

impl From<HabitRepoError> for HabitListError {
    fn from(value: HabitRepoError) -> Self {
        Self::Store(value)
    }
}

impl From<InvariantViolation> for HabitListError {
    fn from(value: InvariantViolation) -> Self {
        error!("event=invariant_violation module=habit_list status=error violation=\"{value}\"");
        Self::InvariantViolation(value)
    }
}

/// The single authoritative ordered collection of habits.
///
/// Construct one per application from its record store and pass it to every
/// consumer explicitly.
pub struct HabitList<S: HabitStore> {
    store: S,
    cache: IdentityCache,
    observers: ObserverRegistry,
}

impl<S: HabitStore> HabitList<S> {
    /// Creates an empty-cache list over `store`.
    pub fn new(store: S) -> Self {
        Self {
            store,
            cache: IdentityCache::new(),
            observers: ObserverRegistry::default(),
        }
    }

    /// Read access to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Number of habits currently resolved into memory.
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Registers an observer for structural changes.
    pub fn subscribe(&mut self, observer: Rc<dyn HabitListObserver>) -> SubscriptionId {
        self.observers.subscribe(observer)
    }

    /// Removes a previously registered observer. Returns `false` if unknown.
    pub fn unsubscribe(&mut self, subscription: SubscriptionId) -> bool {
        self.observers.unsubscribe(subscription)
    }

    /// Appends `habit` at the end of the order and starts tracking it.
    ///
    /// A habit without id gets a generated one. A habit that carries an id
    /// (for example one removed earlier) is stored back under that id.
    ///
    /// # Errors
    /// - `DuplicateEntry` when this instance is already tracked, or when its
    ///   id is still bound to a cached instance or an existing row.
    pub fn add(&mut self, habit: &SharedHabit) -> HabitListResult<HabitId> {
        if let Some(id) = self.cache.id_of_instance(habit) {
            return Err(HabitListError::DuplicateEntry(Some(id)));
        }

        let existing_id = habit.borrow().id;
        if let Some(id) = existing_id {
            if self.cache.contains_id(id) || self.store.get(id)?.is_some() {
                return Err(HabitListError::DuplicateEntry(Some(id)));
            }
        }

        let mut record = HabitRecord::from_habit(&habit.borrow());
        let (id, position) = self.store.in_transaction(|store| {
            record.position = store.count(HabitFilter::All)?;
            let id = match existing_id {
                None => store.insert(&record)?,
                Some(id) => {
                    store.save(id, &record)?;
                    id
                }
            };
            Ok::<_, HabitRepoError>((id, record.position))
        })?;

        {
            let mut entity = habit.borrow_mut();
            entity.id = Some(id);
            entity.position = position;
        }
        self.cache.put(id, habit.clone());

        info!("event=habit_add module=habit_list status=ok habit_id={id} position={position}");
        self.observers.notify(&HabitListChange::Added(id));
        Ok(id)
    }

    /// Number of non-archived habits.
    pub fn count_active(&self) -> HabitListResult<i64> {
        Ok(self.store.count(HabitFilter::ActiveOnly)?)
    }

    /// Number of habits, archived included.
    pub fn count_with_archived(&self) -> HabitListResult<i64> {
        Ok(self.store.count(HabitFilter::All)?)
    }

    /// Returns habits in ascending position order.
    ///
    /// # Errors
    /// - `InvariantViolation` when a listed row vanishes before it is resolved.
    pub fn get_all(&mut self, include_archived: bool) -> HabitListResult<Vec<SharedHabit>> {
        let entries = self
            .store
            .query_ordered(HabitFilter::include_archived(include_archived))?;

        let mut habits = Vec::with_capacity(entries.len());
        for entry in entries {
            let habit = resolve(&self.store, &mut self.cache, entry.id)?
                .ok_or(InvariantViolation::HabitNotInDatabase(entry.id))?;
            habits.push(habit);
        }
        Ok(habits)
    }

    /// Cache-first lookup. `Ok(None)` when no row has this id.
    pub fn get_by_id(&mut self, id: HabitId) -> HabitListResult<Option<SharedHabit>> {
        resolve(&self.store, &mut self.cache, id)
    }

    /// Returns the habit occupying `position`, if any.
    pub fn get_by_position(&mut self, position: i64) -> HabitListResult<Option<SharedHabit>> {
        match self.store.query_by_position(position)? {
            Some(HabitRecord { id: Some(id), .. }) => self.get_by_id(id),
            _ => Ok(None),
        }
    }

    /// Re-reads the habit's position from the store.
    ///
    /// Returns `None` when the habit has no id or its row no longer exists.
    pub fn index_of(&self, habit: &SharedHabit) -> HabitListResult<Option<i64>> {
        let Some(id) = habit.borrow().id else {
            return Ok(None);
        };
        Ok(self.store.get(id)?.map(|record| record.position))
    }

    /// Renumbers all habits to `0..N-1`, keeping their relative order.
    ///
    /// Only rows whose position changes are written, so a second call in a
    /// row writes nothing. Returns the number of rows rewritten.
    pub fn rebuild_order(&mut self) -> HabitListResult<usize> {
        let moved = self.store.in_transaction(renumber)?;
        let rewritten = moved.len();
        apply_cached_positions(&self.cache, &moved);
        info!("event=habit_rebuild_order module=habit_list status=ok rewritten={rewritten}");
        Ok(rewritten)
    }

    /// Deletes `habit` (and its dependent rows) and closes the position gap.
    ///
    /// The instance keeps its id, so it can be added back later under the
    /// same id.
    ///
    /// # Errors
    /// - `InvariantViolation` when the instance is not tracked by this list or
    ///   its row is missing. Nothing is written in that case.
    pub fn remove(&mut self, habit: &SharedHabit) -> HabitListResult<()> {
        let id = habit
            .borrow()
            .id
            .ok_or(InvariantViolation::HabitNotInCache(None))?;
        match self.cache.get(id) {
            Some(cached) if Rc::ptr_eq(&cached, habit) => {}
            _ => return Err(InvariantViolation::HabitNotInCache(Some(id)).into()),
        }
        if self.store.get(id)?.is_none() {
            return Err(InvariantViolation::HabitNotInDatabase(id).into());
        }

        let moved = self.store.in_transaction(|store| {
            if !store.cascade_delete(id)? {
                return Err(InvariantViolation::HabitNotInDatabase(id).into());
            }
            renumber(store)
        })?;
        let rewritten = moved.len();
        self.cache.remove(id);
        apply_cached_positions(&self.cache, &moved);

        info!("event=habit_remove module=habit_list status=ok habit_id={id} rewritten={rewritten}");
        self.observers.notify(&HabitListChange::Removed(id));
        Ok(())
    }

    /// Moves `from` to the position currently held by `to`.
    ///
    /// Habits strictly between the two slots shift by one toward the slot
    /// `from` vacated. Same instance on both sides is a no-op.
    ///
    /// # Errors
    /// - `InvariantViolation` when either habit has no id or no row.
    pub fn reorder(&mut self, from: &SharedHabit, to: &SharedHabit) -> HabitListResult<()> {
        if Rc::ptr_eq(from, to) {
            return Ok(());
        }

        let (from_id, from_pos) = self.require_position(from)?;
        let (_, to_pos) = self.require_position(to)?;

        let positions = self.store.in_transaction(|store| {
            if to_pos < from_pos {
                store.shift_positions(PositionShift::Increment, to_pos, from_pos)?;
            } else {
                store.shift_positions(PositionShift::Decrement, from_pos, to_pos)?;
            }
            if !store.set_position(from_id, to_pos)? {
                return Err(InvariantViolation::HabitNotInDatabase(from_id).into());
            }
            Ok::<_, HabitListError>(store.query_ordered(HabitFilter::All)?)
        })?;
        apply_cached_positions(&self.cache, &positions);
        from.borrow_mut().position = to_pos;

        info!(
            "event=habit_reorder module=habit_list status=ok habit_id={from_id} from={from_pos} to={to_pos}"
        );
        self.observers.notify(&HabitListChange::Reordered {
            id: from_id,
            from: from_pos,
            to: to_pos,
        });
        Ok(())
    }

    /// Writes the domain fields of one habit back to its row.
    pub fn update(&mut self, habit: &SharedHabit) -> HabitListResult<()> {
        self.update_all(std::slice::from_ref(habit))
    }

    /// Writes the domain fields of every habit back to its row.
    ///
    /// Positions are never touched. Every habit is checked before the first
    /// write; one missing row rejects the whole batch.
    pub fn update_all(&mut self, habits: &[SharedHabit]) -> HabitListResult<()> {
        let mut pending = Vec::with_capacity(habits.len());
        for habit in habits {
            let id = habit.borrow().id.ok_or(InvariantViolation::HabitWithoutId)?;
            let mut record = self
                .store
                .get(id)?
                .ok_or(InvariantViolation::HabitNotInDatabase(id))?;
            record.copy_from(&habit.borrow());
            record.validate().map_err(HabitRepoError::from)?;
            pending.push((id, record, habit));
        }

        self.store.in_transaction(|store| {
            for (id, record, _) in &pending {
                store.save(*id, record)?;
            }
            Ok::<_, HabitRepoError>(())
        })?;

        // Keep a different cached instance for the same id in step with the row.
        for (id, record, habit) in &pending {
            if let Some(cached) = self.cache.get(*id) {
                if !Rc::ptr_eq(&cached, habit) {
                    record.copy_to(&mut cached.borrow_mut());
                }
            }
        }

        let ids: Vec<HabitId> = pending.iter().map(|(id, _, _)| *id).collect();
        debug!(
            "event=habit_update module=habit_list status=ok count={}",
            ids.len()
        );
        self.observers.notify(&HabitListChange::Updated(ids));
        Ok(())
    }

    /// Archives or restores `habit` without moving it in the order.
    ///
    /// The in-memory flag is rolled back if the write fails.
    pub fn set_archived(&mut self, habit: &SharedHabit, archived: bool) -> HabitListResult<()> {
        let previous = habit.borrow().archived;
        if previous == archived {
            return Ok(());
        }
        toggle_archived(&mut habit.borrow_mut(), archived);
        self.update(habit).inspect_err(|_| {
            toggle_archived(&mut habit.borrow_mut(), previous);
        })
    }

    fn require_position(&self, habit: &SharedHabit) -> HabitListResult<(HabitId, i64)> {
        let id = habit.borrow().id.ok_or(InvariantViolation::HabitWithoutId)?;
        let position = self
            .index_of(habit)?
            .ok_or(InvariantViolation::HabitNotInDatabase(id))?;
        Ok((id, position))
    }
}

fn toggle_archived(habit: &mut Habit, archived: bool) {
    if archived {
        habit.archive();
    } else {
        habit.unarchive();
    }
}

fn resolve<S: HabitStore>(
    store: &S,
    cache: &mut IdentityCache,
    id: HabitId,
) -> HabitListResult<Option<SharedHabit>> {
    if let Some(habit) = cache.get(id) {
        trace!("event=habit_resolve module=habit_list status=hit habit_id={id}");
        return Ok(Some(habit));
    }

    let Some(record) = store.get(id)? else {
        return Ok(None);
    };
    let habit = record.to_habit().into_shared();
    cache.put(id, habit.clone());
    debug!("event=habit_resolve module=habit_list status=miss habit_id={id}");
    Ok(Some(habit))
}

/// Computes and writes `0..N-1` over the current order. Returns the rows
/// that moved, with their new positions.
fn renumber<S: HabitStore>(store: &S) -> HabitListResult<Vec<PositionEntry>> {
    let entries = store.query_ordered(HabitFilter::All)?;
    let mut moved = Vec::new();
    for (index, entry) in entries.into_iter().enumerate() {
        let position = index as i64;
        if entry.position == position {
            continue;
        }
        if !store.set_position(entry.id, position)? {
            return Err(InvariantViolation::HabitNotInDatabase(entry.id).into());
        }
        moved.push(PositionEntry {
            id: entry.id,
            position,
        });
    }
    Ok(moved)
}

// Only called with committed positions.
fn apply_cached_positions(cache: &IdentityCache, entries: &[PositionEntry]) {
    for entry in entries {
        if let Some(habit) = cache.get(entry.id) {
            habit.borrow_mut().position = entry.position;
        }
    }
}
