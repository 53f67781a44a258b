//! `reorderable` command line.
//!
//! # Responsibility
//! - Inspect and repair one partition of a reorderable listing from a shell.
//! - Map engine error categories to stable exit codes.

use clap::{Args, Parser, Subcommand};
use log::info;
use reorderable_core::db::open_db;
use reorderable_core::{
    init_logging, AllowAll, LoggingConfig, MoveResult, Partition, PartitionValue,
    RankStore, RankStoreConfig, RankedRecord, ReorderError, ReorderErrorKind, ReorderService, Settings,
    SqliteEntryRepository, SqliteRankStore,
};
use serde::Serialize;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "reorderable")]
#[command(about = "Inspect and reorder rank-sorted listings")]
struct Cli {
    /// SQLite database file
    #[arg(long, value_name = "PATH", default_value = "reorderable.sqlite3")]
    db: PathBuf,

    /// JSON settings with `rank_store` and `logging` sections
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Partition value; omit for the null partition
    #[arg(long)]
    list_id: Option<i64>,

    /// Directory for rolling log files
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Append a new entry to the list
    Create { title: String },
    /// Print records in listing order
    List {
        /// Emit one JSON document instead of tab-separated lines
        #[arg(long)]
        json: bool,
    },
    /// Move a record next to another one
    Move(MoveArgs),
    /// Repair duplicate ranks
    Dedupe,
}

#[derive(Args, Debug)]
struct MoveArgs {
    record_id: String,

    #[arg(long, value_name = "ID", conflicts_with = "before")]
    after: Option<String>,

    #[arg(long, value_name = "ID")]
    before: Option<String>,
}

#[derive(Debug)]
enum CliError {
    Reorder(ReorderError),
    Setup(Box<dyn Error>),
    /// `create` only writes the built-in `entries` table.
    CustomTable(String),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            Self::Reorder(err) => match err.kind() {
                ReorderErrorKind::InvalidRequest => 2,
                ReorderErrorKind::NotFound => 3,
                ReorderErrorKind::Forbidden => 4,
                ReorderErrorKind::StorageFailure => 5,
                ReorderErrorKind::Configuration => 6,
            },
            Self::Setup(_) | Self::CustomTable(_) => 1,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reorder(err) => write!(f, "{} ({})", err, err.kind().as_str()),
            Self::Setup(err) => write!(f, "{err}"),
            Self::CustomTable(table) => write!(
                f,
                "`create` only supports the built-in entries table, configured table is `{table}`"
            ),
        }
    }
}

impl From<ReorderError> for CliError {
    fn from(value: ReorderError) -> Self {
        Self::Reorder(value)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let settings = match &cli.config {
        Some(path) => Settings::load(path).map_err(|err| CliError::Setup(Box::new(err)))?,
        None => Settings::default(),
    };

    if let Some(logging) = logging_config(&cli, settings.logging.clone()) {
        if let Err(err) = init_logging(&logging) {
            eprintln!("warning: file logging disabled: {err}");
        }
    }

    let conn = open_db(&cli.db).map_err(|err| CliError::Setup(Box::new(err)))?;

    if let Command::Create { title } = &cli.command {
        ensure_entries_table(&settings.rank_store)?;
        let entry = SqliteEntryRepository::new(&conn)
            .create_entry(cli.list_id, title)
            .map_err(|err| CliError::Setup(Box::new(err)))?;
        println!("{}\t{}\t{}", entry.effective_rank(), entry.id, entry.display_label());
        return Ok(());
    }

    let partition = partition_for(&settings.rank_store, cli.list_id);
    let store = SqliteRankStore::try_new(&conn, &settings.rank_store, partition)
        .map_err(ReorderError::from)?;
    let service = ReorderService::new(store, AllowAll);

    match &cli.command {
        Command::List { json: true } => {
            let records = service.list()?;
            let listing = Listing {
                partition: service.store().partition().value(),
                records: &records,
            };
            let rendered = serde_json::to_string_pretty(&listing)
                .map_err(|err| CliError::Setup(Box::new(err)))?;
            println!("{rendered}");
        }
        Command::List { json: false } => {
            for record in service.list()? {
                let rank = record
                    .rank
                    .map_or_else(|| "-".to_string(), |rank| rank.to_string());
                println!("{rank}\t{}\t{}", record.id, record.display_label());
            }
        }
        Command::Move(args) => {
            let result = service.move_from_query(
                &(),
                &args.record_id,
                args.after.as_deref(),
                args.before.as_deref(),
            )?;
            print_move(&result);
        }
        Command::Dedupe => {
            let result = service.deduplicate()?;
            println!("repaired {} record(s)", result.changed_count);
        }
        Command::Create { .. } => {}
    }

    info!("event=cli_command module=cli status=ok db={}", cli.db.display());
    Ok(())
}

/// JSON shape of `list --json`.
#[derive(Serialize)]
struct Listing<'a> {
    partition: Option<&'a PartitionValue>,
    records: &'a [RankedRecord],
}

fn ensure_entries_table(config: &RankStoreConfig) -> Result<(), CliError> {
    if *config == RankStoreConfig::entries() {
        return Ok(());
    }
    Err(CliError::CustomTable(config.table.clone()))
}

fn logging_config(cli: &Cli, from_settings: Option<LoggingConfig>) -> Option<LoggingConfig> {
    let mut config = match (&cli.log_dir, from_settings) {
        (Some(dir), Some(config)) => LoggingConfig {
            log_dir: dir.clone(),
            ..config
        },
        (Some(dir), None) => LoggingConfig::new(reorderable_core::default_log_level(), dir),
        (None, config) => config?,
    };
    if let Some(level) = &cli.log_level {
        config.level = level.clone();
    }
    Some(config)
}

fn partition_for(config: &RankStoreConfig, list_id: Option<i64>) -> Partition {
    if config.partition_column.is_some() {
        Partition::Value(PartitionValue::from(list_id))
    } else {
        Partition::Whole
    }
}

fn print_move(result: &MoveResult) {
    println!("{}", result.message);
    if result.repaired_count > 0 {
        println!("repaired {} duplicate rank(s) first", result.repaired_count);
    }
}

#[cfg(test)]
mod tests {
    use super::{ensure_entries_table, partition_for, Cli, CliError, Command, Listing};
    use clap::Parser;
    use reorderable_core::{Partition, PartitionValue, RankStoreConfig, RankedRecord};

    #[test]
    fn move_requires_single_reference_flag() {
        let cli = Cli::try_parse_from(["reorderable", "move", "3", "--after", "1"]).unwrap();
        assert!(matches!(cli.command, Command::Move(ref args) if args.after.as_deref() == Some("1")));

        let err = Cli::try_parse_from(["reorderable", "move", "3", "--after", "1", "--before", "2"]);
        assert!(err.is_err());
    }

    #[test]
    fn partition_follows_config() {
        assert_eq!(
            partition_for(&RankStoreConfig::entries(), Some(4)),
            Partition::Value(PartitionValue::Integer(4))
        );
        assert_eq!(
            partition_for(&RankStoreConfig::entries(), None),
            Partition::Value(PartitionValue::Null)
        );
        assert_eq!(
            partition_for(&RankStoreConfig::new("slides"), Some(4)),
            Partition::Whole
        );
    }

    #[test]
    fn create_rejects_custom_rank_tables() {
        assert!(ensure_entries_table(&RankStoreConfig::entries()).is_ok());

        let err = ensure_entries_table(
            &RankStoreConfig::new("slides").with_rank_column("position"),
        )
        .unwrap_err();
        assert!(matches!(err, CliError::CustomTable(ref table) if table == "slides"));
        assert_eq!(err.exit_code(), 1);

        let relabeled = RankStoreConfig::entries().with_label_column("created_at");
        assert!(ensure_entries_table(&relabeled).is_err());
    }

    #[test]
    fn json_listing_carries_partition_and_ranks() {
        let partition = PartitionValue::Integer(3);
        let records = vec![
            RankedRecord {
                id: 10,
                rank: Some(1),
                label: Some("Intro".to_string()),
            },
            RankedRecord {
                id: 11,
                rank: None,
                label: None,
            },
        ];
        let listing = Listing {
            partition: Some(&partition),
            records: &records,
        };

        let value = serde_json::to_value(&listing).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "partition": 3,
                "records": [
                    { "id": 10, "rank": 1, "label": "Intro" },
                    { "id": 11, "rank": null, "label": null },
                ],
            })
        );
    }
}
