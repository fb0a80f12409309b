//! Ledger contract and SQLite implementation.
//!
//! # Responsibility
//! - Own every mutation of `accounts.balance`.
//!
//! # Invariants
//! - A debit that would drive a balance below zero is never applied (guarded
//!   `UPDATE ... WHERE balance >= ?`, backed by a `CHECK` constraint).
//! - Mutations run on the borrowed connection, so they commit or roll back with
//!   the caller's transaction.

use crate::model::account::AccountId;
use crate::model::amount::Amount;
use crate::repo::{ensure_connection_ready, parse_amount, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension};

/// Atomic balance mutation.
pub trait Ledger {
    /// Reduces `account` by `amount`; returns the new balance.
    fn debit(&self, account: AccountId, amount: Amount) -> RepoResult<Amount>;
    /// Increases `account` by `amount`; returns the new balance.
    fn credit(&self, account: AccountId, amount: Amount) -> RepoResult<Amount>;
    fn balance(&self, account: AccountId) -> RepoResult<Amount>;
}

/// SQLite-backed ledger over the `accounts` table.
pub struct SqliteLedger<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLedger<'conn> {
    /// Constructs a ledger from a migrated connection or open transaction.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["accounts"])?;
        Ok(Self { conn })
    }
}

impl Ledger for SqliteLedger<'_> {
    fn debit(&self, account: AccountId, amount: Amount) -> RepoResult<Amount> {
        let changed = self.conn.execute(
            "UPDATE accounts
             SET balance = balance - ?2
             WHERE uuid = ?1
               AND balance >= ?2;",
            params![account.to_string(), amount.micros()],
        )?;

        if changed == 0 {
            let balance = self.balance(account)?;
            return Err(RepoError::InsufficientFunds {
                account,
                balance,
                requested: amount,
            });
        }

        self.balance(account)
    }

    fn credit(&self, account: AccountId, amount: Amount) -> RepoResult<Amount> {
        let changed = self.conn.execute(
            "UPDATE accounts SET balance = balance + ?2 WHERE uuid = ?1;",
            params![account.to_string(), amount.micros()],
        )?;

        if changed == 0 {
            return Err(RepoError::AccountNotFound(account));
        }

        self.balance(account)
    }

    fn balance(&self, account: AccountId) -> RepoResult<Amount> {
        let micros: Option<i64> = self
            .conn
            .query_row(
                "SELECT balance FROM accounts WHERE uuid = ?1;",
                [account.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        match micros {
            Some(micros) => parse_amount(micros, "accounts.balance"),
            None => Err(RepoError::AccountNotFound(account)),
        }
    }
}
