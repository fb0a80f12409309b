//! Settlement configuration.
//!
//! # Responsibility
//! - Collect the policy knobs that change settlement behavior.
//!
//! # Invariants
//! - Configuration is passed explicitly to services; there is no global copy.
//! - Missing fields deserialize to `MarketConfig::default()` values.

use crate::assign::AssignmentPolicy;
use crate::model::account::Role;
use crate::model::amount::Amount;
use serde::{Deserialize, Serialize};

const DEFAULT_CONTRIBUTOR_OPENING_UNITS: u32 = 100;

/// How ingestion charges the contributor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebitMode {
    /// Debit only the shares of items actually stored; the dataset's recorded
    /// total equals that sum.
    #[default]
    CreatedItemsOnly,
    /// Debit the requested total up front regardless of per-item upload failures.
    FullValue,
}

/// How an item's canonical label is chosen among its assignments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelPolicy {
    /// The first accepted submission sets the item label; later grades are kept
    /// on their assignments only.
    #[default]
    FirstSubmissionWins,
    /// Items are never labeled; grades live on assignments only.
    Disabled,
}

/// Marketplace settlement configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub assignment_policy: AssignmentPolicy,
    pub debit_mode: DebitMode,
    pub label_policy: LabelPolicy,
    pub contributor_opening_balance: Amount,
    pub annotator_opening_balance: Amount,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            assignment_policy: AssignmentPolicy::default(),
            debit_mode: DebitMode::default(),
            label_policy: LabelPolicy::default(),
            contributor_opening_balance: Amount::from_units(DEFAULT_CONTRIBUTOR_OPENING_UNITS),
            annotator_opening_balance: Amount::ZERO,
        }
    }
}

impl MarketConfig {
    /// Balance granted at registration for `role`.
    pub fn opening_balance(&self, role: Role) -> Amount {
        match role {
            Role::Contributor => self.contributor_opening_balance,
            Role::Annotator => self.annotator_opening_balance,
        }
    }
}
