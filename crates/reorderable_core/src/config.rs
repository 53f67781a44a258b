//! Setup-time configuration for rank stores and logging.
//!
//! # Responsibility
//! - Name the ranked table and its id/rank/partition/label columns explicitly.
//! - Load optional JSON settings for command-line collaborators.
//!
//! # Invariants
//! - Configured SQL identifiers are validated before any SQL is built.
//! - Configuration problems surface at setup, never during a move.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

static SQL_IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Built-in listing table created by migration 1.
pub const ENTRIES_TABLE: &str = "entries";

/// Errors raised while validating or loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Identifier is empty or contains characters outside `[A-Za-z0-9_]`.
    InvalidIdentifier { field: &'static str, value: String },
    /// Configured table does not exist.
    MissingTable(String),
    /// Configured column does not exist in the table.
    MissingColumn { table: String, column: String },
    /// A partition column is configured but the store was bound to the whole table.
    PartitionRequired { column: String },
    /// A partition value was supplied but no partition column is configured.
    PartitionNotConfigured,
    /// Settings file cannot be read.
    Io { path: PathBuf, message: String },
    /// Settings document is not valid JSON for `Settings`.
    Parse(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidIdentifier { field, value } => {
                write!(f, "invalid SQL identifier `{value}` for `{field}`")
            }
            Self::MissingTable(table) => write!(f, "ranked table `{table}` does not exist"),
            Self::MissingColumn { table, column } => {
                write!(f, "column `{column}` does not exist in table `{table}`")
            }
            Self::PartitionRequired { column } => write!(
                f,
                "rank store is partitioned by `{column}`; a partition value is required"
            ),
            Self::PartitionNotConfigured => {
                write!(f, "partition value supplied but no partition column is configured")
            }
            Self::Io { path, message } => {
                write!(f, "failed to read settings `{}`: {message}", path.display())
            }
            Self::Parse(message) => write!(f, "invalid settings: {message}"),
        }
    }
}

impl Error for ConfigError {}

/// Explicit selectors for the ranked table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RankStoreConfig {
    pub table: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    #[serde(default = "default_rank_column")]
    pub rank_column: String,
    /// Foreign-key style grouping column; `None` ranks the whole table.
    #[serde(default)]
    pub partition_column: Option<String>,
    /// Column rendered in confirmation messages.
    #[serde(default)]
    pub label_column: Option<String>,
}

impl RankStoreConfig {
    /// Unpartitioned config over `table` with `id` and `sort_order` columns.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            id_column: default_id_column(),
            rank_column: default_rank_column(),
            partition_column: None,
            label_column: None,
        }
    }

    /// Config for the built-in `entries` table, partitioned by `list_id`.
    pub fn entries() -> Self {
        Self::new(ENTRIES_TABLE)
            .with_partition_column("list_id")
            .with_label_column("title")
    }

    pub fn with_rank_column(mut self, column: impl Into<String>) -> Self {
        self.rank_column = column.into();
        self
    }

    pub fn with_id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = column.into();
        self
    }

    pub fn with_partition_column(mut self, column: impl Into<String>) -> Self {
        self.partition_column = Some(column.into());
        self
    }

    pub fn with_label_column(mut self, column: impl Into<String>) -> Self {
        self.label_column = Some(column.into());
        self
    }

    /// Checks every configured name is a plain SQL identifier.
    pub fn validate_identifiers(&self) -> Result<(), ConfigError> {
        validate_identifier("table", &self.table)?;
        validate_identifier("id_column", &self.id_column)?;
        validate_identifier("rank_column", &self.rank_column)?;
        if let Some(column) = &self.partition_column {
            validate_identifier("partition_column", column)?;
        }
        if let Some(column) = &self.label_column {
            validate_identifier("label_column", column)?;
        }
        Ok(())
    }

    /// Every column the store reads or writes.
    pub fn columns(&self) -> Vec<&str> {
        let mut columns = vec![self.id_column.as_str(), self.rank_column.as_str()];
        columns.extend(self.partition_column.as_deref());
        columns.extend(self.label_column.as_deref());
        columns
    }
}

impl Default for RankStoreConfig {
    fn default() -> Self {
        Self::entries()
    }
}

/// File logging settings consumed by `init_logging`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// One of `trace|debug|info|warn|error`.
    pub level: String,
    /// Absolute directory for rolling log files.
    pub log_dir: PathBuf,
    pub file_basename: String,
    pub max_file_size_bytes: u64,
    pub max_files: usize,
}

impl LoggingConfig {
    pub fn new(level: impl Into<String>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            level: level.into(),
            log_dir: log_dir.into(),
            ..Self::default()
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: crate::logging::default_log_level().to_string(),
            log_dir: PathBuf::new(),
            file_basename: "reorderable".to_string(),
            max_file_size_bytes: 10 * 1024 * 1024,
            max_files: 5,
        }
    }
}

/// Top-level JSON settings document.
///
/// ```json
/// { "rank_store": { "table": "chapters", "partition_column": "book_id" },
///   "logging": { "level": "info", "log_dir": "/var/log/reorderable" } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub rank_store: RankStoreConfig,
    pub logging: Option<LoggingConfig>,
}

impl Settings {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let settings: Settings =
            serde_json::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        settings.rank_store.validate_identifiers()?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Self::from_json_str(&raw)
    }
}

fn validate_identifier(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if SQL_IDENTIFIER_RE.is_match(value) {
        return Ok(());
    }
    Err(ConfigError::InvalidIdentifier {
        field,
        value: value.to_string(),
    })
}

fn default_id_column() -> String {
    "id".to_string()
}

fn default_rank_column() -> String {
    "sort_order".to_string()
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, RankStoreConfig, Settings};

    #[test]
    fn validate_identifiers_rejects_injection() {
        let config = RankStoreConfig::new("entries; DROP TABLE entries");
        let err = config.validate_identifiers().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidIdentifier { field: "table", .. }));

        let config = RankStoreConfig::new("chapters").with_partition_column("book id");
        let err = config.validate_identifiers().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidIdentifier {
                field: "partition_column",
                ..
            }
        ));
    }

    #[test]
    fn settings_fill_column_defaults() {
        let settings = Settings::from_json_str(
            r#"{ "rank_store": { "table": "chapters", "partition_column": "book_id" } }"#,
        )
        .unwrap();
        assert_eq!(settings.rank_store.id_column, "id");
        assert_eq!(settings.rank_store.rank_column, "sort_order");
        assert_eq!(settings.rank_store.partition_column.as_deref(), Some("book_id"));
        assert!(settings.logging.is_none());
    }

    #[test]
    fn empty_settings_use_entries_table() {
        let settings = Settings::from_json_str("{}").unwrap();
        assert_eq!(settings.rank_store, RankStoreConfig::entries());
    }

    #[test]
    fn settings_reject_unknown_fields() {
        let err = Settings::from_json_str(r#"{ "rank_store": { "table": "t", "rank": "x" } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
