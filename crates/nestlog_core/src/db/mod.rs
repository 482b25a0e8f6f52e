//! SQLite bootstrap and schema migrations backing `SqliteStore`.
//!
//! # Responsibility
//! - Open and configure SQLite connections.
//! - Apply schema migrations in deterministic order.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - No baby, invite or event row is touched before migrations succeed.
//! - A failed upgrade names the migration step that broke and leaves the
//!   schema at its previous version.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    /// Database could not be opened or its connection pragmas set.
    Connect {
        mode: &'static str,
        source: rusqlite::Error,
    },
    /// One migration step failed; the whole upgrade was rolled back.
    Migration {
        version: u32,
        name: &'static str,
        source: rusqlite::Error,
    },
    /// The file was written by a newer build of the household store.
    SchemaTooNew { found: u32, supported: u32 },
    /// Bookkeeping query around the migrations failed.
    Sqlite(rusqlite::Error),
}

impl DbError {
    /// Connection-level failures may clear up on retry; schema problems do not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Sqlite(_))
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect { mode, source } => {
                write!(f, "failed to open {mode} database: {source}")
            }
            Self::Migration {
                version,
                name,
                source,
            } => write!(f, "migration {version} ({name}) failed: {source}"),
            Self::SchemaTooNew { found, supported } => write!(
                f,
                "database schema version {found} is newer than supported {supported}"
            ),
            Self::Sqlite(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Connect { source, .. } | Self::Migration { source, .. } => Some(source),
            Self::Sqlite(err) => Some(err),
            Self::SchemaTooNew { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
