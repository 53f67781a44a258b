//! Core ordering logic for drag-and-drop reorderable listings.
//! This crate is the single source of truth for rank invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod notify;
pub mod permission;
pub mod repo;
pub mod service;

pub use config::{ConfigError, LoggingConfig, RankStoreConfig, Settings};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::record::{
    DuplicateGroup, MoveReference, MoveRequest, MoveRequestError, Partition, PartitionValue,
    Rank, RankRange, RankUpdate, RankedRecord, RecordId, ShiftDelta,
};
pub use notify::{
    ObserverError, ObserverRegistry, ReorderEvent, ReorderObserver, ReorderOperation,
    ReorderPhase,
};
pub use permission::{permission_fn, AllowAll, EditPermission, PermissionFn};
pub use repo::entry_repo::{EntryRepoError, EntryRepoResult, SqliteEntryRepository};
pub use repo::rank_store::{RankStore, RankStoreError, RankStoreResult, SqliteRankStore};
pub use service::reorder_service::{
    plan_deduplication, plan_move, DeduplicationResult, MovePlan, MoveResult, ReorderError,
    ReorderErrorKind, ReorderResult, ReorderService,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
