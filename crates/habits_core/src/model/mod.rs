//! Domain model for habits tracked by the core.
//!
//! # Responsibility
//! - Define the habit entity and its shared in-memory handle.
//!
//! # Invariants
//! - Every persisted habit is identified by a store-generated `HabitId`.
//! - Deletion is a hard delete; archiving is the soft, reversible state.

pub mod habit;
