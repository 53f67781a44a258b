//! Rank store contract and SQLite implementation.
//!
//! # Responsibility
//! - Read and rewrite ranks of one partition of a configured table.
//! - Keep SQL generation and identifier quoting inside the repository boundary.
//!
//! # Invariants
//! - Every statement is restricted to the bound partition.
//! - Listing order is deterministic: `rank ASC, id ASC` (null ranks first).
//! - `atomic` is the only place a transaction is opened; it must not nest.

use crate::config::{ConfigError, RankStoreConfig};
use crate::db::DbError;
use crate::model::record::{
    DuplicateGroup, Partition, PartitionValue, Rank, RankRange, RankUpdate, RankedRecord,
    RecordId, ShiftDelta,
};
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::ops::Bound;

/// Pairs per bulk `UPDATE ... CASE` statement; three bound values each keeps
/// one statement under SQLite's default 999-variable limit.
const BULK_UPDATE_CHUNK: usize = 300;

pub type RankStoreResult<T> = Result<T, RankStoreError>;

/// Errors from rank store setup and operations.
#[derive(Debug)]
pub enum RankStoreError {
    /// Underlying SQLite failure; the enclosing transaction is rolled back.
    Db(DbError),
    /// Store setup rejected the configuration.
    Configuration(ConfigError),
    /// Record does not exist in the bound partition.
    NotFound(RecordId),
}

impl Display for RankStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Configuration(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "record not found: {id}"),
        }
    }
}

impl Error for RankStoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Configuration(err) => Some(err),
            Self::NotFound(_) => None,
        }
    }
}

impl From<DbError> for RankStoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<ConfigError> for RankStoreError {
    fn from(value: ConfigError) -> Self {
        Self::Configuration(value)
    }
}

impl From<rusqlite::Error> for RankStoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Partition-scoped rank persistence used by the reorder engine.
pub trait RankStore {
    /// Partition every operation is restricted to.
    fn partition(&self) -> &Partition;
    /// Loads one record of the partition.
    fn get(&self, record_id: RecordId) -> RankStoreResult<Option<RankedRecord>>;
    /// Rank values held by more than one record, ascending.
    fn duplicate_groups(&self) -> RankStoreResult<Vec<DuplicateGroup>>;
    /// Records with rank `>= rank`, ordered by rank then id.
    fn ranked_from(&self, rank: Rank) -> RankStoreResult<Vec<RankedRecord>>;
    /// All records of the partition in listing order.
    fn list(&self) -> RankStoreResult<Vec<RankedRecord>>;
    /// Adds `delta` to every rank inside `range`; returns changed row count.
    fn shift_range(&self, range: RankRange, delta: ShiftDelta) -> RankStoreResult<usize>;
    /// Writes one record's rank.
    fn set_rank(&self, record_id: RecordId, rank: Rank) -> RankStoreResult<()>;
    /// Writes many ranks with conditional bulk statements; returns changed row count.
    fn bulk_set_ranks(&self, updates: &[RankUpdate]) -> RankStoreResult<usize>;
    /// Highest rank in the partition, `0` when empty.
    fn max_rank(&self) -> RankStoreResult<Rank>;
    /// Runs `operation` in one transaction: commit on `Ok`, roll back on `Err`.
    fn atomic<T, E, F>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<RankStoreError>;
}

/// SQLite-backed rank store bound to one partition of one table.
pub struct SqliteRankStore<'conn> {
    conn: &'conn Connection,
    partition: Partition,
    sql: RankSql,
}

impl<'conn> SqliteRankStore<'conn> {
    /// Validates `config` against the connection schema and binds `partition`.
    ///
    /// # Errors
    /// - `Configuration` for invalid identifiers, missing table/columns, or a
    ///   partition that does not match the configured partition column.
    pub fn try_new(
        conn: &'conn Connection,
        config: &RankStoreConfig,
        partition: Partition,
    ) -> RankStoreResult<Self> {
        config.validate_identifiers()?;
        ensure_table_ready(conn, config)?;

        match (&config.partition_column, &partition) {
            (Some(column), Partition::Whole) => {
                return Err(ConfigError::PartitionRequired {
                    column: column.clone(),
                }
                .into());
            }
            (None, Partition::Value(_)) => return Err(ConfigError::PartitionNotConfigured.into()),
            _ => {}
        }

        Ok(Self {
            conn,
            sql: RankSql::new(config),
            partition,
        })
    }

    /// Store over the built-in `entries` table for one `list_id`.
    pub fn entries(conn: &'conn Connection, list_id: Option<i64>) -> RankStoreResult<Self> {
        Self::try_new(
            conn,
            &RankStoreConfig::entries(),
            Partition::Value(PartitionValue::from(list_id)),
        )
    }

    /// Appends the partition parameter, which every scoped statement binds last.
    fn scoped_params(&self, mut values: Vec<Value>) -> Vec<Value> {
        if let Some(value) = self.partition.value() {
            values.push(partition_param(value));
        }
        values
    }

    fn query_records(&self, sql: &str, values: Vec<Value>) -> RankStoreResult<Vec<RankedRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(self.scoped_params(values)))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_record_row(row)?);
        }
        Ok(records)
    }
}

impl RankStore for SqliteRankStore<'_> {
    fn partition(&self) -> &Partition {
        &self.partition
    }

    fn get(&self, record_id: RecordId) -> RankStoreResult<Option<RankedRecord>> {
        let mut records =
            self.query_records(&self.sql.select_by_id, vec![Value::Integer(record_id)])?;
        Ok(records.pop())
    }

    fn duplicate_groups(&self) -> RankStoreResult<Vec<DuplicateGroup>> {
        let mut stmt = self.conn.prepare(&self.sql.duplicate_groups)?;
        let mut rows = stmt.query(params_from_iter(self.scoped_params(Vec::new())))?;
        let mut groups = Vec::new();
        while let Some(row) = rows.next()? {
            groups.push(DuplicateGroup {
                rank: row.get(0)?,
                count: row.get::<_, i64>(1)?.unsigned_abs(),
            });
        }
        Ok(groups)
    }

    fn ranked_from(&self, rank: Rank) -> RankStoreResult<Vec<RankedRecord>> {
        self.query_records(&self.sql.ranked_from, vec![Value::Integer(rank)])
    }

    fn list(&self) -> RankStoreResult<Vec<RankedRecord>> {
        self.query_records(&self.sql.list, Vec::new())
    }

    fn shift_range(&self, range: RankRange, delta: ShiftDelta) -> RankStoreResult<usize> {
        let rank = &self.sql.rank;
        let mut conditions = Vec::new();
        let mut values = vec![Value::Integer(delta.as_i64())];
        match range.start {
            Bound::Included(start) => {
                conditions.push(format!("{rank} >= ?"));
                values.push(Value::Integer(start));
            }
            Bound::Excluded(start) => {
                conditions.push(format!("{rank} > ?"));
                values.push(Value::Integer(start));
            }
            Bound::Unbounded => conditions.push(format!("{rank} IS NOT NULL")),
        }
        match range.end {
            Bound::Included(end) => {
                conditions.push(format!("{rank} <= ?"));
                values.push(Value::Integer(end));
            }
            Bound::Excluded(end) => {
                conditions.push(format!("{rank} < ?"));
                values.push(Value::Integer(end));
            }
            Bound::Unbounded => {}
        }

        let sql = format!(
            "UPDATE {table} SET {rank} = {rank} + ? WHERE {conditions}{scope};",
            table = self.sql.table,
            conditions = conditions.join(" AND "),
            scope = self.sql.scope,
        );
        let changed = self
            .conn
            .execute(&sql, params_from_iter(self.scoped_params(values)))?;
        debug!(
            "event=rank_shift module=repo status=ok table={} partition={} range={:?}..{:?} delta={} changed={}",
            self.sql.table_name,
            self.partition,
            range.start,
            range.end,
            delta.as_i64(),
            changed
        );
        Ok(changed)
    }

    fn set_rank(&self, record_id: RecordId, rank: Rank) -> RankStoreResult<()> {
        let changed = self.conn.execute(
            &self.sql.set_rank,
            params_from_iter(
                self.scoped_params(vec![Value::Integer(rank), Value::Integer(record_id)]),
            ),
        )?;
        if changed == 0 {
            return Err(RankStoreError::NotFound(record_id));
        }
        Ok(())
    }

    fn bulk_set_ranks(&self, updates: &[RankUpdate]) -> RankStoreResult<usize> {
        let mut changed = 0;
        for chunk in updates.chunks(BULK_UPDATE_CHUNK) {
            let cases = " WHEN ? THEN ?".repeat(chunk.len());
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "UPDATE {table} SET {rank} = CASE {id}{cases} ELSE {rank} END WHERE {id} IN ({placeholders}){scope};",
                table = self.sql.table,
                rank = self.sql.rank,
                id = self.sql.id,
                scope = self.sql.scope,
            );

            let mut values = Vec::with_capacity(chunk.len() * 3 + 1);
            for update in chunk {
                values.push(Value::Integer(update.record_id));
                values.push(Value::Integer(update.rank));
            }
            values.extend(chunk.iter().map(|update| Value::Integer(update.record_id)));

            changed += self
                .conn
                .execute(&sql, params_from_iter(self.scoped_params(values)))?;
        }
        debug!(
            "event=rank_bulk_update module=repo status=ok table={} partition={} requested={} changed={}",
            self.sql.table_name,
            self.partition,
            updates.len(),
            changed
        );
        Ok(changed)
    }

    fn max_rank(&self) -> RankStoreResult<Rank> {
        let max = self.conn.query_row(
            &self.sql.max_rank,
            params_from_iter(self.scoped_params(Vec::new())),
            |row| row.get(0),
        )?;
        Ok(max)
    }

    fn atomic<T, E, F>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<RankStoreError>,
    {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(RankStoreError::from)?;
        // Dropping `tx` on the error path rolls the transaction back.
        let output = operation(self)?;
        tx.commit().map_err(RankStoreError::from)?;
        Ok(output)
    }
}

/// Statements derived once from a validated `RankStoreConfig`.
struct RankSql {
    table_name: String,
    table: String,
    id: String,
    rank: String,
    /// ` AND "<partition>" IS ?` or empty.
    scope: String,
    select_by_id: String,
    duplicate_groups: String,
    ranked_from: String,
    list: String,
    set_rank: String,
    max_rank: String,
}

impl RankSql {
    fn new(config: &RankStoreConfig) -> Self {
        let table = quote_identifier(&config.table);
        let id = quote_identifier(&config.id_column);
        let rank = quote_identifier(&config.rank_column);
        let label = config
            .label_column
            .as_deref()
            .map(|column| format!("CAST({} AS TEXT)", quote_identifier(column)))
            .unwrap_or_else(|| "NULL".to_string());
        let scope = config
            .partition_column
            .as_deref()
            .map(|column| format!(" AND {} IS ?", quote_identifier(column)))
            .unwrap_or_default();
        let select = format!("SELECT {id}, {rank}, {label} FROM {table}");

        Self {
            select_by_id: format!("{select} WHERE {id} = ?{scope};"),
            duplicate_groups: format!(
                "SELECT {rank}, COUNT(*) FROM {table}
                 WHERE {rank} IS NOT NULL{scope}
                 GROUP BY {rank}
                 HAVING COUNT(*) > 1
                 ORDER BY {rank} ASC;"
            ),
            ranked_from: format!(
                "{select} WHERE {rank} >= ?{scope} ORDER BY {rank} ASC, {id} ASC;"
            ),
            list: format!("{select} WHERE 1 = 1{scope} ORDER BY {rank} ASC, {id} ASC;"),
            set_rank: format!("UPDATE {table} SET {rank} = ? WHERE {id} = ?{scope};"),
            max_rank: format!("SELECT COALESCE(MAX({rank}), 0) FROM {table} WHERE 1 = 1{scope};"),
            table_name: config.table.clone(),
            table,
            id,
            rank,
            scope,
        }
    }
}

fn quote_identifier(identifier: &str) -> String {
    format!("\"{identifier}\"")
}

fn partition_param(value: &PartitionValue) -> Value {
    match value {
        PartitionValue::Null => Value::Null,
        PartitionValue::Integer(value) => Value::Integer(*value),
        PartitionValue::Text(value) => Value::Text(value.clone()),
    }
}

fn parse_record_row(row: &Row<'_>) -> RankStoreResult<RankedRecord> {
    Ok(RankedRecord {
        id: row.get(0)?,
        rank: row.get(1)?,
        label: row.get(2)?,
    })
}

fn ensure_table_ready(conn: &Connection, config: &RankStoreConfig) -> RankStoreResult<()> {
    if !table_exists(conn, &config.table)? {
        return Err(ConfigError::MissingTable(config.table.clone()).into());
    }
    for column in config.columns() {
        if !table_has_column(conn, &config.table, column)? {
            return Err(ConfigError::MissingColumn {
                table: config.table.clone(),
                column: column.to_string(),
            }
            .into());
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RankStoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type IN ('table', 'view') AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RankStoreResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", quote_identifier(table)))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
