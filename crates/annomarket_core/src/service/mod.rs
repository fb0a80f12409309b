//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate ledger and catalog repositories into settlement workflows.
//! - Keep callers decoupled from SQL and transaction handling.

use std::time::{SystemTime, UNIX_EPOCH};

pub mod account_service;
pub mod results_service;
pub mod settlement_service;

/// Wall-clock time in epoch milliseconds; `0` if the clock predates the epoch.
pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}
