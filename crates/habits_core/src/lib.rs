//! Core of the habits application.
//! Owns the single authoritative, position-ordered habit collection.

pub mod cache;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use cache::IdentityCache;
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::habit::{
    Frequency, Habit, HabitId, HabitValidationError, Reminder, SharedHabit, EVERY_DAY,
};
pub use repo::habit_repo::{
    HabitFilter, HabitRecord, HabitRepoError, HabitRepoResult, HabitStore, PositionEntry,
    PositionShift, SqliteHabitRepository,
};
pub use service::habit_list::{HabitList, HabitListError, HabitListResult, InvariantViolation};
pub use service::observer::{HabitListChange, HabitListObserver, SubscriptionId};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
