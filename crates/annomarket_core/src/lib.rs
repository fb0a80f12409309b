//! Settlement and assignment core for a crowdsourced labeling marketplace.
//! This crate is the single source of truth for money and assignment invariants.

pub mod assign;
pub mod blob;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use assign::{AssignmentPolicy, AssignmentSelector, ZeroFanOut, DEFAULT_FAN_OUT};
pub use blob::{BlobError, BlobStore, DirBlobStore, MemoryBlobStore};
pub use config::{DebitMode, LabelPolicy, MarketConfig};
pub use logging::{init_logging, logging_status, LogConfig, LogLevel, LoggingError};
pub use model::account::{Account, AccountId, NewAccount, Role};
pub use model::amount::{Amount, AmountError};
pub use model::catalog::{
    AddItemOutcome, Assignment, AssignmentId, AssignmentStatus, ContentRef, Dataset, DatasetId,
    DatasetStatus, Item, ItemId,
};
pub use model::grade::{Grade, GradeError};
pub use repo::account_repo::{AccountRepository, SqliteAccountRepository};
pub use repo::catalog_repo::{Catalog, PendingAssignment, SqliteCatalog};
pub use repo::ledger_repo::{Ledger, SqliteLedger};
pub use repo::{RepoError, RepoResult};
pub use service::account_service::AccountService;
pub use service::results_service::{
    DatasetResults, GradeEntry, ItemGrades, ItemResult, ResultsService,
};
pub use service::settlement_service::{
    AnnotatedSubmission, IngestError, IngestReport, IngestRequest, ItemOutcome, ResultUpload,
    SettlementService, SourceFile, SubmitError, SubmitReceipt,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
