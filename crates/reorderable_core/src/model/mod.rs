//! Storage-agnostic ordering model.
//!
//! # Responsibility
//! - Define records, partitions, ranks and move requests shared by the
//!   rank store and the reorder engine.
//!
//! # Invariants
//! - Ordering and rank uniqueness are always scoped to one `Partition`.
//! - Gaps between ranks are valid; duplicates are repairable, not valid.

pub mod record;
