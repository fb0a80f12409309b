//! Account registration and lookup use-cases.
//!
//! # Responsibility
//! - Apply configured opening balances at registration.
//! - Resolve credentials to account ids for the command surface.

use crate::config::MarketConfig;
use crate::model::account::{Account, AccountId, NewAccount, Role};
use crate::repo::account_repo::AccountRepository;
use crate::repo::RepoResult;
use log::info;

/// Use-case wrapper over an account repository.
pub struct AccountService<R: AccountRepository> {
    repo: R,
    config: MarketConfig,
}

impl<R: AccountRepository> AccountService<R> {
    pub fn new(repo: R, config: MarketConfig) -> Self {
        Self { repo, config }
    }

    /// Registers an account with the opening balance configured for `role`.
    ///
    /// Returns `RepoError::DuplicateUsername` when the name is taken in either role.
    pub fn register(
        &self,
        username: impl Into<String>,
        password_hash: impl Into<String>,
        email: Option<String>,
        role: Role,
    ) -> RepoResult<AccountId> {
        let account = NewAccount {
            username: username.into(),
            password_hash: password_hash.into(),
            email,
            role,
            opening_balance: self.config.opening_balance(role),
        };
        let id = self.repo.create_account(&account)?;
        info!(
            "event=account_register module=accounts status=ok account_id={} role={}",
            id,
            role.as_str()
        );
        Ok(id)
    }

    /// Returns the account id for matching credentials.
    pub fn login(&self, username: &str, password_hash: &str) -> RepoResult<AccountId> {
        self.repo.verify(username, password_hash)
    }

    pub fn get_account(&self, id: AccountId) -> RepoResult<Option<Account>> {
        self.repo.get_account(id)
    }
}
