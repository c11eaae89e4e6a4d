//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate record store calls into the ordered habit list API.
//! - Keep application/UI layers decoupled from storage details.

pub mod habit_list;
pub mod observer;
