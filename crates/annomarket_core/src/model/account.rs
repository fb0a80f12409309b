//! Account domain model.
//!
//! # Responsibility
//! - Define one balance-holding identity type for both marketplace roles.
//!
//! # Invariants
//! - `balance` is never negative; it changes only through the ledger.
//! - `role` is fixed at registration.

use crate::model::amount::Amount;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a registered account.
pub type AccountId = Uuid;

/// Marketplace role carried by every account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Pays to have datasets labeled.
    Contributor,
    /// Gets paid per completed assignment.
    Annotator,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contributor => "contributor",
            Self::Annotator => "annotator",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "contributor" => Some(Self::Contributor),
            "annotator" => Some(Self::Annotator),
            _ => None,
        }
    }
}

/// Balance-holding identity resolved by the account store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    pub email: Option<String>,
    pub role: Role,
    pub balance: Amount,
    /// Epoch milliseconds.
    pub created_at: i64,
}

/// Registration input handed over by the credential layer.
///
/// `password_hash` is opaque to the core; hashing happens before this point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub username: String,
    pub password_hash: String,
    pub email: Option<String>,
    pub role: Role,
    pub opening_balance: Amount,
}
