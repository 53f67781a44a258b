//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the partition-scoped rank store contract.
//! - Isolate SQLite query details from the reorder engine.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`, configuration) in
//!   addition to DB transport errors.

pub mod entry_repo;
pub mod rank_store;
