//! Reorder engine: move and deduplicate over a `RankStore`.
//!
//! # Responsibility
//! - Turn a validated move request into one range shift plus one rank write.
//! - Repair rank collisions while keeping intentional gaps.
//! - Bracket rank writes with pre/post observer notifications.
//!
//! # Invariants
//! - Every operation runs in exactly one store transaction; any error leaves
//!   the partition unchanged.
//! - A move always deduplicates the partition first, inside its transaction.
//! - The moved record, the permission check and the reference are resolved
//!   before that leading repair, so a rejected move writes and emits nothing.
//! - An unranked record is inserted next to its reference; existing ranks
//!   stay unique.
//! - `Post` events are delivered only after commit.

use crate::config::ConfigError;
use crate::model::record::{
    MoveReference, MoveRequest, MoveRequestError, Rank, RankRange, RankUpdate, RankedRecord,
    RecordId, ShiftDelta,
};
use crate::notify::{
    ObserverError, ObserverRegistry, ReorderEvent, ReorderObserver, ReorderOperation,
    ReorderPhase,
};
use crate::permission::EditPermission;
use crate::repo::rank_store::{RankStore, RankStoreError};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type ReorderResult<T> = Result<T, ReorderError>;

/// Error categories exposed to the listing/transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderErrorKind {
    Configuration,
    InvalidRequest,
    NotFound,
    Forbidden,
    StorageFailure,
}

impl ReorderErrorKind {
    /// HTTP status for `POST /records/{id}/reorder`.
    pub fn http_status(self) -> u16 {
        match self {
            Self::InvalidRequest => 400,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::Configuration | Self::StorageFailure => 500,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::InvalidRequest => "invalid_request",
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::StorageFailure => "storage_failure",
        }
    }
}

/// Errors from reorder engine operations.
#[derive(Debug)]
pub enum ReorderError {
    /// Store configuration rejected at setup.
    Configuration(ConfigError),
    /// Move request input is malformed.
    InvalidRequest(MoveRequestError),
    /// Record to move does not exist in the partition.
    RecordNotFound(RecordId),
    /// `after`/`before` reference does not exist in the partition.
    InvalidMoveTarget(RecordId),
    /// Permission check denied the edit.
    Forbidden(RecordId),
    /// Transaction failed and was rolled back.
    Storage(RankStoreError),
    /// A new rank would fall outside `i64`.
    RankOverflow,
}

impl ReorderError {
    pub fn kind(&self) -> ReorderErrorKind {
        match self {
            Self::Configuration(_) => ReorderErrorKind::Configuration,
            Self::InvalidRequest(_) => ReorderErrorKind::InvalidRequest,
            Self::RecordNotFound(_) | Self::InvalidMoveTarget(_) => ReorderErrorKind::NotFound,
            Self::Forbidden(_) => ReorderErrorKind::Forbidden,
            Self::Storage(_) | Self::RankOverflow => ReorderErrorKind::StorageFailure,
        }
    }

    pub fn http_status(&self) -> u16 {
        self.kind().http_status()
    }
}

impl Display for ReorderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration(err) => write!(f, "{err}"),
            Self::InvalidRequest(err) => write!(f, "invalid move request: {err}"),
            Self::RecordNotFound(id) => write!(f, "record not found: {id}"),
            Self::InvalidMoveTarget(id) => write!(f, "invalid move target: {id}"),
            Self::Forbidden(id) => write!(f, "not allowed to reorder record {id}"),
            Self::Storage(err) => write!(f, "{err}"),
            Self::RankOverflow => write!(f, "rank out of range"),
        }
    }
}

impl Error for ReorderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Configuration(err) => Some(err),
            Self::InvalidRequest(err) => Some(err),
            Self::Storage(err) => Some(err),
            Self::RecordNotFound(_)
            | Self::InvalidMoveTarget(_)
            | Self::Forbidden(_)
            | Self::RankOverflow => None,
        }
    }
}

impl From<RankStoreError> for ReorderError {
    fn from(value: RankStoreError) -> Self {
        match value {
            RankStoreError::Configuration(err) => Self::Configuration(err),
            RankStoreError::NotFound(id) => Self::RecordNotFound(id),
            other => Self::Storage(other),
        }
    }
}

impl From<MoveRequestError> for ReorderError {
    fn from(value: MoveRequestError) -> Self {
        Self::InvalidRequest(value)
    }
}

/// Outcome of a move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveResult {
    /// `false` when the record already sat at the requested position.
    pub moved: bool,
    /// Confirmation for the listing UI, e.g. `"C" moved after "A"`.
    pub message: String,
    pub from_rank: Rank,
    pub to_rank: Rank,
    /// Rows rewritten by the leading deduplication pass.
    pub repaired_count: usize,
}

/// Outcome of a deduplication pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeduplicationResult {
    pub changed_count: usize,
}

/// Rank arithmetic for one move, computed before any write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovePlan {
    /// Target equals the current rank.
    Unchanged { rank: Rank },
    Shift {
        from_rank: Rank,
        to_rank: Rank,
        range: RankRange,
        delta: ShiftDelta,
    },
    /// Unranked record: every rank in `range` moves up to free `to_rank`.
    Insert { to_rank: Rank, range: RankRange },
}

/// Computes target rank and shift range.
///
/// `reference_rank` must be the reference's rank before any shift. Moving up
/// "after X" lands on `X + 1`; moving down "before X" lands on `X - 1`.
/// A record without a rank lands right after or right before the reference.
pub fn plan_move(
    old_rank: Option<Rank>,
    reference: MoveReference,
    reference_rank: Rank,
) -> ReorderResult<MovePlan> {
    let Some(old_rank) = old_rank else {
        let to_rank = match reference {
            MoveReference::After(_) => increment(reference_rank)?,
            MoveReference::Before(_) => reference_rank,
        };
        return Ok(MovePlan::Insert {
            to_rank,
            range: RankRange::at_least(to_rank),
        });
    };

    let mut target = reference_rank;
    match reference {
        MoveReference::After(_) if target < old_rank => target = increment(target)?,
        MoveReference::Before(_) if target > old_rank => target = decrement(target)?,
        _ => {}
    }

    let plan = if target < old_rank {
        MovePlan::Shift {
            from_rank: old_rank,
            to_rank: target,
            range: RankRange::half_open(target, old_rank),
            delta: ShiftDelta::Up,
        }
    } else if target > old_rank {
        MovePlan::Shift {
            from_rank: old_rank,
            to_rank: target,
            range: RankRange::open_closed(old_rank, target),
            delta: ShiftDelta::Down,
        }
    } else {
        MovePlan::Unchanged { rank: old_rank }
    };
    Ok(plan)
}

/// Minimal rank rewrites that make `candidates` strictly increasing.
///
/// `candidates` must be ordered by rank then id, starting at the lowest
/// colliding rank. The first record is the anchor and keeps its rank; records
/// already above the running target keep theirs and advance it.
pub fn plan_deduplication(candidates: &[RankedRecord]) -> ReorderResult<Vec<RankUpdate>> {
    let mut ranked = candidates
        .iter()
        .filter_map(|record| record.rank.map(|rank| (record.id, rank)));
    let Some((_, anchor_rank)) = ranked.next() else {
        return Ok(Vec::new());
    };

    // `None` once the running target has passed `Rank::MAX`.
    let mut next_rank = anchor_rank.checked_add(1);
    let mut updates = Vec::new();
    for (record_id, rank) in ranked {
        let target = next_rank.ok_or(ReorderError::RankOverflow)?;
        if rank >= target {
            next_rank = rank.checked_add(1);
            continue;
        }
        updates.push(RankUpdate {
            record_id,
            rank: target,
        });
        next_rank = target.checked_add(1);
    }
    Ok(updates)
}

fn increment(rank: Rank) -> ReorderResult<Rank> {
    rank.checked_add(1).ok_or(ReorderError::RankOverflow)
}

fn decrement(rank: Rank) -> ReorderResult<Rank> {
    rank.checked_sub(1).ok_or(ReorderError::RankOverflow)
}

/// Reorder engine bound to one partition's rank store.
pub struct ReorderService<S: RankStore, P: EditPermission> {
    store: S,
    permission: P,
    observers: ObserverRegistry,
}

impl<S: RankStore, P: EditPermission> ReorderService<S, P> {
    pub fn new(store: S, permission: P) -> Self {
        Self {
            store,
            permission,
            observers: ObserverRegistry::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn subscribe(&mut self, observer: Box<dyn ReorderObserver>) {
        self.observers.subscribe(observer);
    }

    pub fn subscribe_fn<F>(&mut self, observer: F)
    where
        F: Fn(&ReorderEvent) -> Result<(), ObserverError> + 'static,
    {
        self.observers.subscribe_fn(observer);
    }

    /// Partition records in listing order.
    pub fn list(&self) -> ReorderResult<Vec<RankedRecord>> {
        self.store.list().map_err(Into::into)
    }

    /// Rank for a record about to be created: `max + 1`, or `1` when empty.
    pub fn next_rank(&self) -> ReorderResult<Rank> {
        increment(self.store.max_rank()?)
    }

    /// Parses raw listing input and moves the record.
    pub fn move_from_query(
        &self,
        actor: &P::Actor,
        record_id: &str,
        after: Option<&str>,
        before: Option<&str>,
    ) -> ReorderResult<MoveResult> {
        let request = MoveRequest::from_query(record_id, after, before)?;
        self.move_record(actor, &request)
    }

    /// Moves one record next to its reference record.
    ///
    /// # Errors
    /// - `RecordNotFound` / `InvalidMoveTarget` when either id is unknown.
    /// - `Forbidden` when the permission check denies the edit.
    /// - `Storage` when the transaction fails; nothing is persisted.
    pub fn move_record(
        &self,
        actor: &P::Actor,
        request: &MoveRequest,
    ) -> ReorderResult<MoveResult> {
        let started_at = Instant::now();
        let mut committed_events = Vec::new();

        let outcome = self
            .store
            .atomic(|store| self.move_within(store, actor, request, &mut committed_events));

        match &outcome {
            Ok(result) => {
                for event in &committed_events {
                    self.observers.emit(event);
                }
                info!(
                    "event=reorder_move module=service status=ok partition={} record_id={} reference={}:{} moved={} from_rank={} to_rank={} repaired={} duration_ms={}",
                    self.store.partition(),
                    request.record_id,
                    request.reference.as_str(),
                    request.reference.record_id(),
                    result.moved,
                    result.from_rank,
                    result.to_rank,
                    result.repaired_count,
                    started_at.elapsed().as_millis()
                );
            }
            Err(err) => warn!(
                "event=reorder_move module=service status=error partition={} record_id={} error_code={} duration_ms={} error={}",
                self.store.partition(),
                request.record_id,
                err.kind().as_str(),
                started_at.elapsed().as_millis(),
                err
            ),
        }
        outcome
    }

    /// Repairs rank collisions in the partition.
    pub fn deduplicate(&self) -> ReorderResult<DeduplicationResult> {
        let started_at = Instant::now();
        let mut committed_events = Vec::new();

        let outcome = self
            .store
            .atomic(|store| self.deduplicate_within(store, &mut committed_events));

        match &outcome {
            Ok(result) => {
                for event in &committed_events {
                    self.observers.emit(event);
                }
                info!(
                    "event=reorder_dedupe module=service status=ok partition={} changed={} duration_ms={}",
                    self.store.partition(),
                    result.changed_count,
                    started_at.elapsed().as_millis()
                );
            }
            Err(err) => warn!(
                "event=reorder_dedupe module=service status=error partition={} error_code={} error={}",
                self.store.partition(),
                err.kind().as_str(),
                err
            ),
        }
        outcome
    }

    fn move_within(
        &self,
        store: &S,
        actor: &P::Actor,
        request: &MoveRequest,
        committed_events: &mut Vec<ReorderEvent>,
    ) -> ReorderResult<MoveResult> {
        let record = load_record(store, request.record_id)?;
        if !self.permission.can_edit(actor, &record) {
            return Err(ReorderError::Forbidden(record.id));
        }
        let reference_id = request.reference.record_id();
        let reference = load_reference(store, reference_id)?;

        let repaired = self.deduplicate_within(store, committed_events)?;
        let (record, reference) = if repaired.changed_count == 0 {
            (record, reference)
        } else {
            (
                load_record(store, record.id)?,
                load_reference(store, reference_id)?,
            )
        };

        let direction = request.reference.as_str();
        let plan = if reference.id == record.id {
            MovePlan::Unchanged {
                rank: record.effective_rank(),
            }
        } else {
            plan_move(record.rank, request.reference, reference.effective_rank())?
        };

        let (from_rank, to_rank, range, delta) = match plan {
            MovePlan::Unchanged { rank } => {
                return Ok(MoveResult {
                    moved: false,
                    message: format!(
                        "\"{}\" is already {direction} \"{}\"",
                        record.display_label(),
                        reference.display_label()
                    ),
                    from_rank: rank,
                    to_rank: rank,
                    repaired_count: repaired.changed_count,
                });
            }
            MovePlan::Shift {
                from_rank,
                to_rank,
                range,
                delta,
            } => (from_rank, to_rank, range, delta),
            MovePlan::Insert { to_rank, range } => {
                // The highest rank must still fit once the tail moves up.
                increment(store.max_rank()?)?;
                (record.effective_rank(), to_rank, range, ShiftDelta::Up)
            }
        };

        let event = ReorderEvent {
            phase: ReorderPhase::Pre,
            operation: ReorderOperation::Move,
            from_rank,
            to_rank,
            partition: store.partition().clone(),
        };
        self.observers.emit(&event);

        store.shift_range(range, delta)?;
        store.set_rank(record.id, to_rank)?;
        committed_events.push(event.with_phase(ReorderPhase::Post));

        Ok(MoveResult {
            moved: true,
            message: format!(
                "\"{}\" moved {direction} \"{}\"",
                record.display_label(),
                reference.display_label()
            ),
            from_rank,
            to_rank,
            repaired_count: repaired.changed_count,
        })
    }

    fn deduplicate_within(
        &self,
        store: &S,
        committed_events: &mut Vec<ReorderEvent>,
    ) -> ReorderResult<DeduplicationResult> {
        let groups = store.duplicate_groups()?;
        let Some(lowest) = groups.first() else {
            return Ok(DeduplicationResult::default());
        };

        let candidates = store.ranked_from(lowest.rank)?;
        let updates = plan_deduplication(&candidates)?;
        let Some(highest) = updates.iter().map(|update| update.rank).max() else {
            return Ok(DeduplicationResult::default());
        };

        let event = ReorderEvent {
            phase: ReorderPhase::Pre,
            operation: ReorderOperation::Deduplicate,
            from_rank: lowest.rank,
            to_rank: highest,
            partition: store.partition().clone(),
        };
        self.observers.emit(&event);

        let changed_count = store.bulk_set_ranks(&updates)?;
        committed_events.push(event.with_phase(ReorderPhase::Post));

        Ok(DeduplicationResult { changed_count })
    }
}

fn load_record<S: RankStore>(store: &S, record_id: RecordId) -> ReorderResult<RankedRecord> {
    store
        .get(record_id)?
        .ok_or(ReorderError::RecordNotFound(record_id))
}

fn load_reference<S: RankStore>(store: &S, record_id: RecordId) -> ReorderResult<RankedRecord> {
    store
        .get(record_id)?
        .ok_or(ReorderError::InvalidMoveTarget(record_id))
}

#[cfg(test)]
mod tests {
    use super::{plan_deduplication, plan_move, MovePlan, ReorderError, ReorderErrorKind};
    use crate::model::record::{
        MoveReference, Rank, RankRange, RankUpdate, RankedRecord, ShiftDelta,
    };

    fn records(ranks: &[(i64, i64)]) -> Vec<RankedRecord> {
        ranks
            .iter()
            .map(|&(id, rank)| RankedRecord {
                id,
                rank: Some(rank),
                label: None,
            })
            .collect()
    }

    #[test]
    fn moving_up_after_lands_below_reference_successor() {
        let plan = plan_move(Some(3), MoveReference::After(1), 1).unwrap();
        assert_eq!(
            plan,
            MovePlan::Shift {
                from_rank: 3,
                to_rank: 2,
                range: RankRange::half_open(2, 3),
                delta: ShiftDelta::Up,
            }
        );
    }

    #[test]
    fn moving_down_after_takes_reference_slot() {
        let plan = plan_move(Some(1), MoveReference::After(4), 4).unwrap();
        assert_eq!(
            plan,
            MovePlan::Shift {
                from_rank: 1,
                to_rank: 4,
                range: RankRange::open_closed(1, 4),
                delta: ShiftDelta::Down,
            }
        );
    }

    #[test]
    fn moving_up_before_takes_reference_slot() {
        let plan = plan_move(Some(4), MoveReference::Before(2), 2).unwrap();
        assert!(matches!(
            plan,
            MovePlan::Shift {
                to_rank: 2,
                delta: ShiftDelta::Up,
                ..
            }
        ));
    }

    #[test]
    fn moving_down_before_lands_above_reference() {
        let plan = plan_move(Some(1), MoveReference::Before(4), 4).unwrap();
        assert!(matches!(
            plan,
            MovePlan::Shift {
                to_rank: 3,
                delta: ShiftDelta::Down,
                ..
            }
        ));
    }

    #[test]
    fn adjacent_targets_are_unchanged() {
        assert_eq!(
            plan_move(Some(2), MoveReference::After(1), 1).unwrap(),
            MovePlan::Unchanged { rank: 2 }
        );
        assert_eq!(
            plan_move(Some(2), MoveReference::Before(3), 3).unwrap(),
            MovePlan::Unchanged { rank: 2 }
        );
        assert_eq!(
            plan_move(Some(5), MoveReference::After(9), 5).unwrap(),
            MovePlan::Unchanged { rank: 5 }
        );
    }

    #[test]
    fn unranked_record_is_inserted_beside_reference() {
        assert_eq!(
            plan_move(None, MoveReference::After(2), 1).unwrap(),
            MovePlan::Insert {
                to_rank: 2,
                range: RankRange::at_least(2),
            }
        );
        assert_eq!(
            plan_move(None, MoveReference::Before(2), 0).unwrap(),
            MovePlan::Insert {
                to_rank: 0,
                range: RankRange::at_least(0),
            }
        );
    }

    #[test]
    fn rank_overflow_is_a_storage_failure() {
        let err = plan_move(None, MoveReference::After(1), Rank::MAX).unwrap_err();
        assert!(matches!(err, ReorderError::RankOverflow));
        assert_eq!(err.kind(), ReorderErrorKind::StorageFailure);

        let err = plan_deduplication(&records(&[(1, Rank::MAX), (2, Rank::MAX)])).unwrap_err();
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn deduplication_may_keep_a_record_at_max_rank() {
        let updates =
            plan_deduplication(&records(&[(1, 7), (2, 7), (3, Rank::MAX)])).unwrap();
        assert_eq!(updates, vec![RankUpdate { record_id: 2, rank: 8 }]);
    }

    #[test]
    fn deduplication_keeps_anchor_and_trailing_gap() {
        let updates =
            plan_deduplication(&records(&[(1, 2), (2, 2), (3, 2), (4, 5)])).unwrap();
        assert_eq!(
            updates,
            vec![
                RankUpdate { record_id: 2, rank: 3 },
                RankUpdate { record_id: 3, rank: 4 },
            ]
        );
    }

    #[test]
    fn deduplication_repairs_later_collisions_in_one_pass() {
        let updates =
            plan_deduplication(&records(&[(1, 1), (2, 1), (3, 3), (4, 3), (5, 9)])).unwrap();
        assert_eq!(
            updates,
            vec![
                RankUpdate { record_id: 2, rank: 2 },
                RankUpdate { record_id: 4, rank: 4 },
            ]
        );
    }

    #[test]
    fn deduplication_pushes_overlapping_ranks_forward() {
        let updates =
            plan_deduplication(&records(&[(1, 1), (2, 1), (3, 1), (4, 2), (5, 3)])).unwrap();
        assert_eq!(
            updates,
            vec![
                RankUpdate { record_id: 2, rank: 2 },
                RankUpdate { record_id: 3, rank: 3 },
                RankUpdate { record_id: 4, rank: 4 },
                RankUpdate { record_id: 5, rank: 5 },
            ]
        );
    }

    #[test]
    fn deduplication_of_unique_ranks_is_empty() {
        assert!(plan_deduplication(&records(&[(1, 1), (2, 4), (3, 7)]))
            .unwrap()
            .is_empty());
        assert!(plan_deduplication(&[]).unwrap().is_empty());
    }
}
