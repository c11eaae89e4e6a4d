//! Record store contracts and persistence implementations.
//!
//! # Responsibility
//! - Define the row-level primitives consumed by the habit list.
//! - Isolate SQLite query details from list orchestration.
//!
//! # Invariants
//! - Repository writes validate habit domain fields before persistence.
//! - Absence is reported as `Ok(None)` / `false`, never as an error.

pub mod habit_repo;
