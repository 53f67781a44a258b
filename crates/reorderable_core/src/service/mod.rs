//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate rank store calls into move and deduplicate operations.
//! - Keep listing/transport layers decoupled from storage details.

pub mod reorder_service;
