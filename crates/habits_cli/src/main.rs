//! `habits` command-line front end.
//!
//! Opens one database, applies a single list operation and prints the
//! resulting order as `position id [archived] name` lines.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use habits_core::db::open_db;
use habits_core::{
    default_log_level, init_logging, Frequency, Habit, HabitList, HabitStore, SharedHabit,
    SqliteHabitRepository,
};
use log::info;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "habits", version, about = "Manage the ordered habit list")]
struct Cli {
    /// SQLite database file
    #[arg(long, env = "HABITS_DB", default_value = "habits.sqlite3")]
    db: PathBuf,
    /// Directory for rotated log files; logging stays off when omitted
    #[arg(long, env = "HABITS_LOG_DIR")]
    log_dir: Option<PathBuf>,
    /// trace|debug|info|warn|error
    #[arg(long, env = "HABITS_LOG_LEVEL")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print habits in position order
    List {
        /// Include archived habits
        #[arg(long)]
        all: bool,
    },
    /// Append a new habit at the end of the order
    Add {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Repetitions per period, as NUM/DEN
        #[arg(long, value_parser = parse_frequency, default_value = "1/1")]
        freq: Frequency,
        #[arg(long, default_value_t = 0)]
        color: i32,
    },
    /// Move the habit at one position to another
    Move { from: i64, to: i64 },
    /// Delete the habit at a position together with its repetitions
    Remove { position: i64 },
    /// Hide the habit at a position from active listings
    Archive { position: i64 },
    /// Restore an archived habit
    Unarchive { position: i64 },
    /// Renumber positions to 0..N-1
    Rebuild,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(log_dir) = &cli.log_dir {
        let log_dir = absolute(log_dir)?;
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, &log_dir.to_string_lossy()).map_err(|err| anyhow!(err))?;
    }

    let conn = open_db(&cli.db)
        .with_context(|| format!("failed to open database `{}`", cli.db.display()))?;
    let store = SqliteHabitRepository::try_new(&conn).context("database is not ready")?;
    let mut list = HabitList::new(store);

    // Mutations print the full order so archived rows stay visible.
    let include_archived = match &cli.command {
        Command::List { all } => *all,
        _ => true,
    };

    match cli.command {
        Command::List { .. } => {}
        Command::Add {
            name,
            description,
            freq,
            color,
        } => {
            let mut habit = Habit::new(name);
            habit.description = description;
            habit.frequency = freq;
            habit.color = color;
            let id = list.add(&habit.into_shared())?;
            info!("event=cli_add module=cli status=ok habit_id={id}");
        }
        Command::Move { from, to } => {
            let from = habit_at(&mut list, from)?;
            let to = habit_at(&mut list, to)?;
            list.reorder(&from, &to)?;
        }
        Command::Remove { position } => {
            let habit = habit_at(&mut list, position)?;
            list.remove(&habit)?;
        }
        Command::Archive { position } => {
            let habit = habit_at(&mut list, position)?;
            list.set_archived(&habit, true)?;
        }
        Command::Unarchive { position } => {
            let habit = habit_at(&mut list, position)?;
            list.set_archived(&habit, false)?;
        }
        Command::Rebuild => {
            let rewritten = list.rebuild_order()?;
            info!("event=cli_rebuild module=cli status=ok rows={rewritten}");
        }
    }

    print_habits(&mut list, include_archived)
}

fn habit_at<S: HabitStore>(list: &mut HabitList<S>, position: i64) -> Result<SharedHabit> {
    list.get_by_position(position)?
        .ok_or_else(|| anyhow!("no habit at position {position}"))
}

fn print_habits<S: HabitStore>(list: &mut HabitList<S>, include_archived: bool) -> Result<()> {
    for habit in list.get_all(include_archived)? {
        let habit = habit.borrow();
        let id = habit
            .id
            .ok_or_else(|| anyhow!("listed habit has no id"))?;
        let marker = if habit.archived { " [archived]" } else { "" };
        println!("{} {id}{marker} {}", habit.position, habit.name);
    }
    Ok(())
}

fn parse_frequency(raw: &str) -> Result<Frequency> {
    let Some((numerator, denominator)) = raw.split_once('/') else {
        bail!("expected NUM/DEN, got `{raw}`");
    };
    let numerator = numerator.trim().parse().context("invalid numerator")?;
    let denominator = denominator.trim().parse().context("invalid denominator")?;
    Ok(Frequency::new(numerator, denominator))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("failed to resolve working directory")?;
    Ok(cwd.join(path))
}
