//! Ranked record read model and move request types.
//!
//! # Responsibility
//! - Describe the partition-scoped ordering domain independent of storage.
//! - Parse raw listing-layer move input into a validated `MoveRequest`.
//!
//! # Invariants
//! - A `MoveRequest` always carries exactly one reference.
//! - A null stored rank reads as `0` when it is a move reference.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::ops::Bound;

/// Stable record identifier (integer primary key of the ranked table).
pub type RecordId = i64;

/// Integer sort position within one partition.
pub type Rank = i64;

/// Value of the partition key column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PartitionValue {
    /// Rows whose partition column is SQL `NULL`.
    Null,
    Integer(i64),
    Text(String),
}

impl Display for PartitionValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value}"),
        }
    }
}

impl From<i64> for PartitionValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<Option<i64>> for PartitionValue {
    fn from(value: Option<i64>) -> Self {
        value.map_or(Self::Null, Self::Integer)
    }
}

impl From<&str> for PartitionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Ordering domain a rank store is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Partition {
    /// Whole table; only valid when no partition column is configured.
    Whole,
    /// Rows sharing one partition column value.
    Value(PartitionValue),
}

impl Partition {
    pub fn value(&self) -> Option<&PartitionValue> {
        match self {
            Self::Whole => None,
            Self::Value(value) => Some(value),
        }
    }
}

impl Display for Partition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Whole => write!(f, "*"),
            Self::Value(value) => write!(f, "{value}"),
        }
    }
}

/// One row of the ranked table as seen by the reorder engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedRecord {
    pub id: RecordId,
    /// Stored rank; `None` for rows imported without a position.
    pub rank: Option<Rank>,
    /// Optional display label used in confirmation messages.
    pub label: Option<String>,
}

impl RankedRecord {
    /// Rank of a move reference; unranked rows count as `0`.
    pub fn effective_rank(&self) -> Rank {
        self.rank.unwrap_or(0)
    }

    /// Label for user-facing messages, `#<id>` when none is stored.
    pub fn display_label(&self) -> String {
        match self.label.as_deref().map(str::trim) {
            Some(label) if !label.is_empty() => label.to_string(),
            _ => format!("#{}", self.id),
        }
    }
}

/// Rank collision summary: `count` rows share `rank`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub rank: Rank,
    pub count: u64,
}

/// Single rank assignment applied by deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankUpdate {
    pub record_id: RecordId,
    pub rank: Rank,
}

/// Direction of a range shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftDelta {
    /// `+1`, making room below the moved record's old slot.
    Up,
    /// `-1`, closing the moved record's old slot.
    Down,
}

impl ShiftDelta {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
        }
    }
}

/// Rank interval selected by a shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankRange {
    pub start: Bound<Rank>,
    pub end: Bound<Rank>,
}

impl RankRange {
    /// `[start, end)`
    pub fn half_open(start: Rank, end: Rank) -> Self {
        Self {
            start: Bound::Included(start),
            end: Bound::Excluded(end),
        }
    }

    /// `(start, end]`
    pub fn open_closed(start: Rank, end: Rank) -> Self {
        Self {
            start: Bound::Excluded(start),
            end: Bound::Included(end),
        }
    }

    /// `[start, ..)`
    pub fn at_least(start: Rank) -> Self {
        Self {
            start: Bound::Included(start),
            end: Bound::Unbounded,
        }
    }

    pub fn contains(&self, rank: Rank) -> bool {
        let above = match self.start {
            Bound::Included(start) => rank >= start,
            Bound::Excluded(start) => rank > start,
            Bound::Unbounded => true,
        };
        let below = match self.end {
            Bound::Included(end) => rank <= end,
            Bound::Excluded(end) => rank < end,
            Bound::Unbounded => true,
        };
        above && below
    }
}

/// Neighbor a moved record is positioned against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveReference {
    After(RecordId),
    Before(RecordId),
}

impl MoveReference {
    pub fn record_id(self) -> RecordId {
        match self {
            Self::After(id) | Self::Before(id) => id,
        }
    }

    /// `after` or `before`, as used in messages and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::After(_) => "after",
            Self::Before(_) => "before",
        }
    }
}

/// Validated drag-and-drop move request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveRequest {
    pub record_id: RecordId,
    pub reference: MoveReference,
}

impl MoveRequest {
    pub fn after(record_id: RecordId, after_id: RecordId) -> Self {
        Self {
            record_id,
            reference: MoveReference::After(after_id),
        }
    }

    pub fn before(record_id: RecordId, before_id: RecordId) -> Self {
        Self {
            record_id,
            reference: MoveReference::Before(before_id),
        }
    }

    /// Parses raw listing input (`/<id>/reorder?after=<id>|before=<id>`).
    ///
    /// Blank query values count as absent.
    ///
    /// # Errors
    /// - `MissingReference` when neither `after` nor `before` is present.
    /// - `ConflictingReferences` when both are present.
    /// - `MalformedId` when any identifier is not an integer.
    pub fn from_query(
        record_id: &str,
        after: Option<&str>,
        before: Option<&str>,
    ) -> Result<Self, MoveRequestError> {
        let record_id = parse_record_id("record_id", record_id)?;
        let after = non_blank(after);
        let before = non_blank(before);

        let reference = match (after, before) {
            (Some(_), Some(_)) => return Err(MoveRequestError::ConflictingReferences),
            (None, None) => return Err(MoveRequestError::MissingReference),
            (Some(value), None) => MoveReference::After(parse_record_id("after", value)?),
            (None, Some(value)) => MoveReference::Before(parse_record_id("before", value)?),
        };

        Ok(Self {
            record_id,
            reference,
        })
    }
}

/// Malformed move request input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveRequestError {
    /// Neither `after` nor `before` was supplied.
    MissingReference,
    /// Both `after` and `before` were supplied.
    ConflictingReferences,
    /// Identifier is not a valid integer.
    MalformedId { field: &'static str, value: String },
}

impl Display for MoveRequestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingReference => write!(f, "one of `after` or `before` is required"),
            Self::ConflictingReferences => {
                write!(f, "`after` and `before` are mutually exclusive")
            }
            Self::MalformedId { field, value } => {
                write!(f, "`{field}` must be an integer id, got `{value}`")
            }
        }
    }
}

impl Error for MoveRequestError {}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn parse_record_id(field: &'static str, value: &str) -> Result<RecordId, MoveRequestError> {
    value
        .trim()
        .parse::<RecordId>()
        .map_err(|_| MoveRequestError::MalformedId {
            field,
            value: value.to_string(),
        })
}
