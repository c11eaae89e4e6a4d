//! Habit record store contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide the row-level primitives the ordered habit list is built on.
//! - Keep SQL details and position arithmetic inside the repository boundary.
//!
//! # Invariants
//! - Write paths validate the row's domain fields before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.
//! - This layer never renumbers positions on its own; it only applies the
//!   shifts and assignments it is asked for.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::habit::{
    Frequency, Habit, HabitId, HabitValidationError, Reminder, EVERY_DAY,
};
use log::{debug, trace};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};

const HABIT_SELECT_SQL: &str = "SELECT
    id,
    name,
    description,
    freq_num,
    freq_den,
    color,
    position,
    highlight,
    archived,
    reminder_hour,
    reminder_min,
    reminder_days
FROM habits";

const HABIT_COLUMNS: [&str; 12] = [
    "id",
    "name",
    "description",
    "freq_num",
    "freq_den",
    "color",
    "position",
    "highlight",
    "archived",
    "reminder_hour",
    "reminder_min",
    "reminder_days",
];

pub type HabitRepoResult<T> = Result<T, HabitRepoError>;

/// Errors from habit record store operations.
#[derive(Debug)]
pub enum HabitRepoError {
    /// Row failed domain validation before write or after read.
    Validation(HabitValidationError),
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Connection schema is not at the expected version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid record.
    InvalidData(String),
}

impl Display for HabitRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "habit repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "habit repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "habit repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted habit data: {message}"),
        }
    }
}

impl Error for HabitRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::UninitializedConnection { .. } => None,
            Self::MissingRequiredTable(_) => None,
            Self::MissingRequiredColumn { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<HabitValidationError> for HabitRepoError {
    fn from(value: HabitValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for HabitRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for HabitRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Row filter shared by ordered queries and counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HabitFilter {
    /// Every persisted habit, archived or not.
    All,
    /// Only rows with `archived = 0`.
    ActiveOnly,
}

impl HabitFilter {
    pub fn include_archived(include_archived: bool) -> Self {
        if include_archived {
            Self::All
        } else {
            Self::ActiveOnly
        }
    }
}

/// Direction of a range position update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionShift {
    /// `position + 1` for rows in `[lower, upper)`.
    Increment,
    /// `position - 1` for rows in `(lower, upper]`.
    Decrement,
}

/// One entry of the position-ordered id listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionEntry {
    pub id: HabitId,
    pub position: i64,
}

/// Persisted row representation of a habit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HabitRecord {
    /// `None` only for rows that have not been inserted yet.
    pub id: Option<HabitId>,
    pub name: String,
    pub description: String,
    pub freq_num: u32,
    pub freq_den: u32,
    pub color: i32,
    pub position: i64,
    pub highlight: bool,
    pub archived: bool,
    pub reminder_hour: Option<u8>,
    pub reminder_min: Option<u8>,
    pub reminder_days: u8,
}

impl HabitRecord {
    /// Builds a full row image of `habit`, including id and position.
    pub fn from_habit(habit: &Habit) -> Self {
        let mut record = Self {
            id: habit.id,
            name: String::new(),
            description: String::new(),
            freq_num: 1,
            freq_den: 1,
            color: 0,
            position: habit.position,
            highlight: false,
            archived: false,
            reminder_hour: None,
            reminder_min: None,
            reminder_days: EVERY_DAY,
        };
        record.copy_from(habit);
        record
    }

    /// Copies domain fields from `habit`, leaving `id` and `position` alone.
    pub fn copy_from(&mut self, habit: &Habit) {
        self.name.clone_from(&habit.name);
        self.description.clone_from(&habit.description);
        self.freq_num = habit.frequency.numerator;
        self.freq_den = habit.frequency.denominator;
        self.color = habit.color;
        self.highlight = habit.highlight;
        self.archived = habit.archived;
        match habit.reminder {
            Some(reminder) => {
                self.reminder_hour = Some(reminder.hour);
                self.reminder_min = Some(reminder.minute);
                self.reminder_days = reminder.days;
            }
            None => {
                self.reminder_hour = None;
                self.reminder_min = None;
                self.reminder_days = EVERY_DAY;
            }
        }
    }

    /// Overwrites every field of `habit` with this row, id and position included.
    pub fn copy_to(&self, habit: &mut Habit) {
        habit.id = self.id;
        habit.name.clone_from(&self.name);
        habit.description.clone_from(&self.description);
        habit.frequency = Frequency::new(self.freq_num, self.freq_den);
        habit.color = self.color;
        habit.position = self.position;
        habit.highlight = self.highlight;
        habit.archived = self.archived;
        habit.reminder = match (self.reminder_hour, self.reminder_min) {
            (Some(hour), Some(minute)) => Some(Reminder {
                hour,
                minute,
                days: self.reminder_days,
            }),
            _ => None,
        };
    }

    /// Materializes a fresh habit entity from this row.
    pub fn to_habit(&self) -> Habit {
        let mut habit = Habit::new(String::new());
        self.copy_to(&mut habit);
        habit
    }

    /// Validates the row through the domain model rules.
    pub fn validate(&self) -> Result<(), HabitValidationError> {
        self.to_habit().validate()
    }
}

/// Row-level store consumed by the ordered habit list.
///
/// Implementations are expected to be fast local storage; none of these calls
/// retries or times out on its own.
pub trait HabitStore {
    /// Inserts a new row and returns its generated id. `record.id` is ignored.
    fn insert(&self, record: &HabitRecord) -> HabitRepoResult<HabitId>;
    /// Upserts a row under a known id.
    fn save(&self, id: HabitId, record: &HabitRecord) -> HabitRepoResult<()>;
    /// Loads one row by id.
    fn get(&self, id: HabitId) -> HabitRepoResult<Option<HabitRecord>>;
    /// Lists ids with their positions in ascending position order.
    fn query_ordered(&self, filter: HabitFilter) -> HabitRepoResult<Vec<PositionEntry>>;
    /// Loads the row at exactly `position`, if any.
    fn query_by_position(&self, position: i64) -> HabitRepoResult<Option<HabitRecord>>;
    /// Shifts every row inside the bound by one; see [`PositionShift`] for
    /// which end is inclusive. Returns the number of rows shifted.
    fn shift_positions(
        &self,
        shift: PositionShift,
        lower: i64,
        upper: i64,
    ) -> HabitRepoResult<usize>;
    /// Sets the position of one row. Returns `false` when no row matched.
    fn set_position(&self, id: HabitId, position: i64) -> HabitRepoResult<bool>;
    /// Deletes one row and its dependent rows. Returns `false` when no row matched.
    fn cascade_delete(&self, id: HabitId) -> HabitRepoResult<bool>;
    /// Counts rows matching `filter`.
    fn count(&self, filter: HabitFilter) -> HabitRepoResult<i64>;
    /// Runs `op` so that all of its writes become visible together or not at
    /// all. Nested calls join the outer unit.
    fn in_transaction<T, E, F>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<HabitRepoError>;
}

/// SQLite-backed habit record store.
pub struct SqliteHabitRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteHabitRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> HabitRepoResult<Self> {
        ensure_habit_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl HabitStore for SqliteHabitRepository<'_> {
    fn insert(&self, record: &HabitRecord) -> HabitRepoResult<HabitId> {
        record.validate()?;

        self.conn.execute(
            "INSERT INTO habits (
                name,
                description,
                freq_num,
                freq_den,
                color,
                position,
                highlight,
                archived,
                reminder_hour,
                reminder_min,
                reminder_days
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
            params![
                record.name.as_str(),
                record.description.as_str(),
                record.freq_num,
                record.freq_den,
                record.color,
                record.position,
                bool_to_int(record.highlight),
                bool_to_int(record.archived),
                record.reminder_hour,
                record.reminder_min,
                record.reminder_days,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!(
            "event=habit_insert module=habit_repo status=ok habit_id={id} position={}",
            record.position
        );
        Ok(id)
    }

    fn save(&self, id: HabitId, record: &HabitRecord) -> HabitRepoResult<()> {
        record.validate()?;

        self.conn.execute(
            "INSERT INTO habits (
                id,
                name,
                description,
                freq_num,
                freq_den,
                color,
                position,
                highlight,
                archived,
                reminder_hour,
                reminder_min,
                reminder_days
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                freq_num = excluded.freq_num,
                freq_den = excluded.freq_den,
                color = excluded.color,
                position = excluded.position,
                highlight = excluded.highlight,
                archived = excluded.archived,
                reminder_hour = excluded.reminder_hour,
                reminder_min = excluded.reminder_min,
                reminder_days = excluded.reminder_days;",
            params![
                id,
                record.name.as_str(),
                record.description.as_str(),
                record.freq_num,
                record.freq_den,
                record.color,
                record.position,
                bool_to_int(record.highlight),
                bool_to_int(record.archived),
                record.reminder_hour,
                record.reminder_min,
                record.reminder_days,
            ],
        )?;

        debug!(
            "event=habit_save module=habit_repo status=ok habit_id={id} position={}",
            record.position
        );
        Ok(())
    }

    fn get(&self, id: HabitId) -> HabitRepoResult<Option<HabitRecord>> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("{HABIT_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_habit_row(row)?));
        }
        Ok(None)
    }

    fn query_ordered(&self, filter: HabitFilter) -> HabitRepoResult<Vec<PositionEntry>> {
        let sql = match filter {
            HabitFilter::All => {
                "SELECT id, position
                 FROM habits
                 ORDER BY position ASC, id ASC;"
            }
            HabitFilter::ActiveOnly => {
                "SELECT id, position
                 FROM habits
                 WHERE archived = 0
                 ORDER BY position ASC, id ASC;"
            }
        };

        let mut stmt = self.conn.prepare_cached(sql)?;
        let mut rows = stmt.query([])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(PositionEntry {
                id: row.get(0)?,
                position: row.get(1)?,
            });
        }
        Ok(entries)
    }

    fn query_by_position(&self, position: i64) -> HabitRepoResult<Option<HabitRecord>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "{HABIT_SELECT_SQL}
             WHERE position = ?1
             ORDER BY id ASC
             LIMIT 1;"
        ))?;
        let mut rows = stmt.query([position])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_habit_row(row)?));
        }
        Ok(None)
    }

    fn shift_positions(
        &self,
        shift: PositionShift,
        lower: i64,
        upper: i64,
    ) -> HabitRepoResult<usize> {
        let changed = match shift {
            PositionShift::Increment => self.conn.execute(
                "UPDATE habits
                 SET position = position + 1
                 WHERE position >= ?1
                   AND position < ?2;",
                params![lower, upper],
            )?,
            PositionShift::Decrement => self.conn.execute(
                "UPDATE habits
                 SET position = position - 1
                 WHERE position > ?1
                   AND position <= ?2;",
                params![lower, upper],
            )?,
        };

        trace!(
            "event=habit_shift module=habit_repo status=ok shift={shift:?} lower={lower} upper={upper} rows={changed}"
        );
        Ok(changed)
    }

    fn set_position(&self, id: HabitId, position: i64) -> HabitRepoResult<bool> {
        if position < 0 {
            return Err(HabitValidationError::NegativePosition(position).into());
        }
        let changed = self.conn.execute(
            "UPDATE habits
             SET position = ?2
             WHERE id = ?1;",
            params![id, position],
        )?;
        Ok(changed > 0)
    }

    fn cascade_delete(&self, id: HabitId) -> HabitRepoResult<bool> {
        // Dependent rows go through `ON DELETE CASCADE`; requires foreign_keys=ON.
        let changed = self
            .conn
            .execute("DELETE FROM habits WHERE id = ?1;", [id])?;
        debug!("event=habit_delete module=habit_repo status=ok habit_id={id} rows={changed}");
        Ok(changed > 0)
    }

    fn count(&self, filter: HabitFilter) -> HabitRepoResult<i64> {
        let sql = match filter {
            HabitFilter::All => "SELECT COUNT(*) FROM habits;",
            HabitFilter::ActiveOnly => "SELECT COUNT(*) FROM habits WHERE archived = 0;",
        };
        let count = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count)
    }

    fn in_transaction<T, E, F>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<HabitRepoError>,
    {
        if !self.conn.is_autocommit() {
            return op(self);
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(HabitRepoError::from)?;
        // Dropping `tx` on the error path rolls every write of `op` back.
        let value = op(self)?;
        tx.commit().map_err(HabitRepoError::from)?;
        Ok(value)
    }
}

fn parse_habit_row(row: &Row<'_>) -> HabitRepoResult<HabitRecord> {
    let record = HabitRecord {
        id: Some(row.get("id")?),
        name: row.get("name")?,
        description: row.get("description")?,
        freq_num: row.get("freq_num")?,
        freq_den: row.get("freq_den")?,
        color: row.get("color")?,
        position: row.get("position")?,
        highlight: parse_flag(row.get("highlight")?, "habits.highlight")?,
        archived: parse_flag(row.get("archived")?, "habits.archived")?,
        reminder_hour: row.get("reminder_hour")?,
        reminder_min: row.get("reminder_min")?,
        reminder_days: row.get("reminder_days")?,
    };
    record.validate()?;
    Ok(record)
}

fn parse_flag(value: i64, column: &'static str) -> HabitRepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(HabitRepoError::InvalidData(format!(
            "invalid flag value `{other}` in {column}"
        ))),
    }
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

fn ensure_habit_connection_ready(conn: &Connection) -> HabitRepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(HabitRepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "habits")? {
        return Err(HabitRepoError::MissingRequiredTable("habits"));
    }
    for column in HABIT_COLUMNS {
        if !table_has_column(conn, "habits", column)? {
            return Err(HabitRepoError::MissingRequiredColumn {
                table: "habits",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> HabitRepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> HabitRepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::HabitRecord;
    use crate::model::habit::{Frequency, Habit, Reminder};

    #[test]
    fn copy_from_keeps_id_and_position() {
        let mut record = HabitRecord::from_habit(&Habit::new("Walk"));
        record.id = Some(7);
        record.position = 3;

        let mut edited = Habit::new("Walk the dog");
        edited.id = Some(99);
        edited.position = 0;
        edited.frequency = Frequency::WEEKLY;
        record.copy_from(&edited);

        assert_eq!(record.id, Some(7));
        assert_eq!(record.position, 3);
        assert_eq!(record.name, "Walk the dog");
        assert_eq!((record.freq_num, record.freq_den), (1, 7));
    }

    #[test]
    fn copy_to_restores_reminder_only_when_time_is_set() {
        let mut habit = Habit::new("Journal");
        habit.reminder = Some(Reminder {
            hour: 21,
            minute: 15,
            days: 0b000_0110,
        });
        let record = HabitRecord::from_habit(&habit);
        assert_eq!(record.to_habit().reminder, habit.reminder);

        let mut without_time = record.clone();
        without_time.reminder_min = None;
        assert_eq!(without_time.to_habit().reminder, None);
    }
}
