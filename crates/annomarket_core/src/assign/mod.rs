//! Annotator selection for item fan-out.
//!
//! # Responsibility
//! - Choose which annotators receive assignments for one item.
//!
//! # Invariants
//! - A selection never contains the same annotator twice.
//! - A selection has exactly `min(k, pool.len())` members.
//! - A usable policy has `k >= 1`; deserialization rejects `k == 0`.

mod selector;

pub use selector::{AssignmentPolicy, AssignmentSelector, ZeroFanOut, DEFAULT_FAN_OUT};
