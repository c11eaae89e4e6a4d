//! Habit domain model.
//!
//! # Responsibility
//! - Define the in-memory habit entity tracked by the ordered habit list.
//! - Validate domain fields before they reach persistence.
//!
//! # Invariants
//! - `id == None` means the habit has never been persisted.
//! - `position` is owned by the habit list; callers must not treat a held
//!   copy as authoritative after a reorder.
//! - Archived habits keep their slot in the shared position space.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

/// Store-generated numeric habit identifier.
pub type HabitId = i64;

/// Shared handle to the single in-memory instance of one habit.
///
/// Identity is pointer identity: two handles denote the same habit only when
/// `Rc::ptr_eq` holds.
pub type SharedHabit = Rc<RefCell<Habit>>;

/// Bitmask covering all seven weekdays.
pub const EVERY_DAY: u8 = 0b111_1111;

/// Target repetition rate: `numerator` times every `denominator` days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frequency {
    pub numerator: u32,
    pub denominator: u32,
}

impl Frequency {
    pub const DAILY: Self = Self {
        numerator: 1,
        denominator: 1,
    };
    pub const WEEKLY: Self = Self {
        numerator: 1,
        denominator: 7,
    };

    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }
}

impl Default for Frequency {
    fn default() -> Self {
        Self::DAILY
    }
}

/// Daily reminder schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    /// 0..=23
    pub hour: u8,
    /// 0..=59
    pub minute: u8,
    /// Weekday bitmask, bit 0 = Sunday.
    pub days: u8,
}

/// Habit entity tracked by the ordered habit list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    /// `None` until the habit is added to a list.
    pub id: Option<HabitId>,
    pub name: String,
    pub description: String,
    pub frequency: Frequency,
    /// Palette index.
    pub color: i32,
    /// Dense order key, see module invariants.
    pub position: i64,
    pub highlight: bool,
    pub archived: bool,
    pub reminder: Option<Reminder>,
}

impl Habit {
    /// Creates a transient daily habit with no id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: String::new(),
            frequency: Frequency::DAILY,
            color: 0,
            position: 0,
            highlight: false,
            archived: false,
            reminder: None,
        }
    }

    /// Wraps this habit into a shared handle.
    pub fn into_shared(self) -> SharedHabit {
        Rc::new(RefCell::new(self))
    }

    pub fn archive(&mut self) {
        self.archived = true;
    }

    pub fn unarchive(&mut self) {
        self.archived = false;
    }

    /// Returns whether the habit shows up in active-only views.
    pub fn is_active(&self) -> bool {
        !self.archived
    }

    /// Checks domain field constraints.
    ///
    /// Structural fields (`id`, `position`) are validated by the habit list,
    /// not here, except that a position may never be negative.
    pub fn validate(&self) -> Result<(), HabitValidationError> {
        if self.name.trim().is_empty() {
            return Err(HabitValidationError::BlankName);
        }

        let Frequency {
            numerator,
            denominator,
        } = self.frequency;
        if numerator == 0 || denominator == 0 || numerator > denominator {
            return Err(HabitValidationError::InvalidFrequency {
                numerator,
                denominator,
            });
        }

        if self.color < 0 {
            return Err(HabitValidationError::NegativeColor(self.color));
        }

        if self.position < 0 {
            return Err(HabitValidationError::NegativePosition(self.position));
        }

        if let Some(reminder) = self.reminder {
            if reminder.hour > 23 || reminder.minute > 59 {
                return Err(HabitValidationError::InvalidReminderTime {
                    hour: reminder.hour,
                    minute: reminder.minute,
                });
            }
            if reminder.days == 0 || reminder.days > EVERY_DAY {
                return Err(HabitValidationError::InvalidReminderDays(reminder.days));
            }
        }

        Ok(())
    }
}

/// Domain validation failures for [`Habit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HabitValidationError {
    BlankName,
    InvalidFrequency { numerator: u32, denominator: u32 },
    NegativeColor(i32),
    NegativePosition(i64),
    InvalidReminderTime { hour: u8, minute: u8 },
    InvalidReminderDays(u8),
}

impl Display for HabitValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "habit name must not be blank"),
            Self::InvalidFrequency {
                numerator,
                denominator,
            } => write!(
                f,
                "invalid frequency {numerator}/{denominator}; expected 1 <= numerator <= denominator"
            ),
            Self::NegativeColor(color) => write!(f, "habit color must be >= 0, got {color}"),
            Self::NegativePosition(position) => {
                write!(f, "habit position must be >= 0, got {position}")
            }
            Self::InvalidReminderTime { hour, minute } => {
                write!(f, "invalid reminder time {hour:02}:{minute:02}")
            }
            Self::InvalidReminderDays(days) => {
                write!(f, "invalid reminder weekday mask {days:#09b}")
            }
        }
    }
}

impl Error for HabitValidationError {}
