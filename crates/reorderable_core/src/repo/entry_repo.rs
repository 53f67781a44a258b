//! Built-in `entries` listing table.
//!
//! # Responsibility
//! - Create entries with an initial rank at the end of their list.
//!
//! # Invariants
//! - A new entry gets `max(sort_order in list) + 1`, or `1` for an empty list,
//!   computed in the same statement as the insert.
//! - Titles are trimmed and must not be blank.

use crate::db::DbError;
use crate::model::record::{RankedRecord, RecordId};
use log::debug;
use rusqlite::{params, Connection};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type EntryRepoResult<T> = Result<T, EntryRepoError>;

#[derive(Debug)]
pub enum EntryRepoError {
    InvalidTitle,
    Db(DbError),
}

impl Display for EntryRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTitle => write!(f, "entry title must not be blank"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for EntryRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidTitle => None,
        }
    }
}

impl From<rusqlite::Error> for EntryRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// SQLite access to the `entries` table.
pub struct SqliteEntryRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEntryRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Inserts one entry at the end of `list_id`.
    pub fn create_entry(
        &self,
        list_id: Option<i64>,
        title: &str,
    ) -> EntryRepoResult<RankedRecord> {
        let title = title.trim();
        if title.is_empty() {
            return Err(EntryRepoError::InvalidTitle);
        }

        let (id, rank): (RecordId, i64) = self.conn.query_row(
            "INSERT INTO entries (list_id, title, sort_order)
             VALUES (
                ?1,
                ?2,
                (SELECT COALESCE(MAX(sort_order), 0) + 1 FROM entries WHERE list_id IS ?1)
             )
             RETURNING id, sort_order;",
            params![list_id, title],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        debug!(
            "event=entry_create module=repo status=ok list_id={} id={} sort_order={}",
            list_id.map_or_else(|| "null".to_string(), |value| value.to_string()),
            id,
            rank
        );

        Ok(RankedRecord {
            id,
            rank: Some(rank),
            label: Some(title.to_string()),
        })
    }
}
