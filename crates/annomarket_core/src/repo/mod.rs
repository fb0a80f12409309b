//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define ledger, account and catalog data access contracts.
//! - Isolate SQLite query details from settlement orchestration.
//!
//! # Invariants
//! - Repositories borrow a `&Connection` and never open or commit transactions
//!   themselves; a `rusqlite::Transaction` derefs to `Connection`, so every
//!   repository composes into the caller's unit of work.
//! - Repository APIs return semantic errors (`InsufficientFunds`, `*NotFound`) in
//!   addition to DB transport errors.

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbError;
use crate::model::account::AccountId;
use crate::model::amount::Amount;
use crate::model::catalog::{AssignmentId, DatasetId, ItemId};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod account_repo;
pub mod catalog_repo;
pub mod ledger_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by ledger, account and catalog persistence.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    AccountNotFound(AccountId),
    DatasetNotFound(DatasetId),
    ItemNotFound(ItemId),
    AssignmentNotFound(AssignmentId),
    DuplicateUsername(String),
    InvalidCredentials,
    /// Annotator already holds an assignment for this item.
    DuplicateAssignment {
        item: ItemId,
        annotator: AccountId,
    },
    InsufficientFunds {
        account: AccountId,
        balance: Amount,
        requested: Amount,
    },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "repository requires table `{table}`")
            }
            Self::AccountNotFound(id) => write!(f, "account not found: {id}"),
            Self::DatasetNotFound(id) => write!(f, "dataset not found: {id}"),
            Self::ItemNotFound(id) => write!(f, "item not found: {id}"),
            Self::AssignmentNotFound(id) => write!(f, "assignment not found: {id}"),
            Self::DuplicateUsername(username) => write!(f, "username already exists: {username}"),
            Self::InvalidCredentials => write!(f, "invalid credentials"),
            Self::DuplicateAssignment { item, annotator } => write!(
                f,
                "annotator {annotator} is already assigned to item {item}"
            ),
            Self::InsufficientFunds {
                account,
                balance,
                requested,
            } => write!(
                f,
                "insufficient funds on account {account}: balance {balance}, requested {requested}"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Rejects connections that were not produced by `open_db*` or lack `tables`.
pub(crate) fn ensure_connection_ready(
    conn: &Connection,
    tables: &[&'static str],
) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version < expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for &table in tables {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

pub(crate) fn parse_amount(micros: i64, column: &str) -> RepoResult<Amount> {
    Amount::from_micros(micros)
        .map_err(|_| RepoError::InvalidData(format!("negative amount `{micros}` in {column}")))
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
