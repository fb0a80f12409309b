//! Account repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Register role-tagged accounts and resolve credentials to ids.
//! - Provide the annotator pool used by assignment fan-out.
//!
//! # Invariants
//! - Usernames are unique across both roles.
//! - Password hashes are compared as opaque strings and never logged.
//! - Balance is written only at registration; later changes go through `Ledger`.

use crate::model::account::{Account, AccountId, NewAccount, Role};
use crate::repo::{
    ensure_connection_ready, is_unique_violation, parse_amount, parse_uuid, RepoError, RepoResult,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

const ACCOUNT_SELECT_SQL: &str = "SELECT
    uuid,
    username,
    email,
    role,
    balance,
    created_at
FROM accounts";

/// Repository interface for account registration and lookup.
pub trait AccountRepository {
    fn create_account(&self, account: &NewAccount) -> RepoResult<AccountId>;
    /// Resolves `username` + `password_hash` to an account id.
    fn verify(&self, username: &str, password_hash: &str) -> RepoResult<AccountId>;
    fn get_account(&self, id: AccountId) -> RepoResult<Option<Account>>;
    /// All annotator accounts in registration order.
    fn list_annotators(&self) -> RepoResult<Vec<AccountId>>;
}

/// SQLite-backed account repository.
pub struct SqliteAccountRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAccountRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["accounts"])?;
        Ok(Self { conn })
    }
}

impl AccountRepository for SqliteAccountRepository<'_> {
    fn create_account(&self, account: &NewAccount) -> RepoResult<AccountId> {
        let id = Uuid::new_v4();
        let inserted = self.conn.execute(
            "INSERT INTO accounts (
                uuid,
                username,
                password_hash,
                email,
                role,
                balance
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                id.to_string(),
                account.username.as_str(),
                account.password_hash.as_str(),
                account.email.as_deref(),
                account.role.as_str(),
                account.opening_balance.micros(),
            ],
        );

        match inserted {
            Ok(_) => Ok(id),
            Err(err) if is_unique_violation(&err) => {
                Err(RepoError::DuplicateUsername(account.username.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn verify(&self, username: &str, password_hash: &str) -> RepoResult<AccountId> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT uuid, password_hash FROM accounts WHERE username = ?1;",
                [username],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((uuid, stored_hash)) if stored_hash == password_hash => {
                parse_uuid(&uuid, "accounts.uuid")
            }
            _ => Err(RepoError::InvalidCredentials),
        }
    }

    fn get_account(&self, id: AccountId) -> RepoResult<Option<Account>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ACCOUNT_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_account_row(row)?));
        }
        Ok(None)
    }

    fn list_annotators(&self) -> RepoResult<Vec<AccountId>> {
        let mut stmt = self.conn.prepare(
            "SELECT uuid
             FROM accounts
             WHERE role = 'annotator'
             ORDER BY created_at ASC, rowid ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let uuid: String = row.get(0)?;
            ids.push(parse_uuid(&uuid, "accounts.uuid")?);
        }
        Ok(ids)
    }
}

fn parse_account_row(row: &Row<'_>) -> RepoResult<Account> {
    let uuid: String = row.get("uuid")?;
    let role_text: String = row.get("role")?;
    let role = Role::parse(&role_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid role `{role_text}` in accounts.role"))
    })?;

    Ok(Account {
        id: parse_uuid(&uuid, "accounts.uuid")?,
        username: row.get("username")?,
        email: row.get("email")?,
        role,
        balance: parse_amount(row.get("balance")?, "accounts.balance")?,
        created_at: row.get("created_at")?,
    })
}
