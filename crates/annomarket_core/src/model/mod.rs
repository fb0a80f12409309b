//! Marketplace domain model.
//!
//! # Responsibility
//! - Define canonical data structures used by ledger and catalog logic.
//!
//! # Invariants
//! - Every persisted record is identified by a stable UUID.
//! - Money is always fixed-point `Amount`, never floating point.

pub mod account;
pub mod amount;
pub mod catalog;
pub mod grade;
