//! Pluggable selection policies.

use crate::model::account::AccountId;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Annotators per item used when no policy is configured.
pub const DEFAULT_FAN_OUT: usize = 3;

/// Fan-out of zero: items would be charged for but never assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZeroFanOut;

impl Display for ZeroFanOut {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "assignment fan-out must be at least 1")
    }
}

impl Error for ZeroFanOut {}

/// Strategy for picking annotators per item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    rename_all = "snake_case",
    tag = "kind",
    content = "fan_out",
    try_from = "UncheckedPolicy"
)]
pub enum AssignmentPolicy {
    /// Uniformly random subset of size `k`.
    RandomK(usize),
    /// `k` consecutive pool members starting at `item_index mod pool.len()`.
    RoundRobin(usize),
}

/// Wire shape of [`AssignmentPolicy`] before the fan-out check.
#[derive(Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "fan_out")]
enum UncheckedPolicy {
    RandomK(usize),
    RoundRobin(usize),
}

impl TryFrom<UncheckedPolicy> for AssignmentPolicy {
    type Error = ZeroFanOut;

    fn try_from(value: UncheckedPolicy) -> Result<Self, Self::Error> {
        let policy = match value {
            UncheckedPolicy::RandomK(k) => Self::RandomK(k),
            UncheckedPolicy::RoundRobin(k) => Self::RoundRobin(k),
        };
        policy.validate()?;
        Ok(policy)
    }
}

impl AssignmentPolicy {
    pub fn fan_out(self) -> usize {
        match self {
            Self::RandomK(k) | Self::RoundRobin(k) => k,
        }
    }

    /// Rejects a fan-out of zero.
    pub fn validate(self) -> Result<(), ZeroFanOut> {
        if self.fan_out() == 0 {
            return Err(ZeroFanOut);
        }
        Ok(())
    }
}

impl Default for AssignmentPolicy {
    fn default() -> Self {
        Self::RandomK(DEFAULT_FAN_OUT)
    }
}

/// Applies an [`AssignmentPolicy`] with an injected random source.
pub struct AssignmentSelector<R: Rng> {
    policy: AssignmentPolicy,
    rng: R,
}

impl<R: Rng> AssignmentSelector<R> {
    pub fn new(policy: AssignmentPolicy, rng: R) -> Self {
        Self { policy, rng }
    }

    pub fn policy(&self) -> AssignmentPolicy {
        self.policy
    }

    /// Selects annotators for the item at `item_index` within its dataset.
    ///
    /// Returns an empty selection for an empty pool; callers treat that as
    /// "no annotators available".
    pub fn select_annotators(&mut self, pool: &[AccountId], item_index: usize) -> Vec<AccountId> {
        if pool.is_empty() {
            return Vec::new();
        }

        match self.policy {
            AssignmentPolicy::RandomK(k) => pool
                .choose_multiple(&mut self.rng, k.min(pool.len()))
                .copied()
                .collect(),
            AssignmentPolicy::RoundRobin(k) => {
                let start = item_index % pool.len();
                (0..k.min(pool.len()))
                    .map(|offset| pool[(start + offset) % pool.len()])
                    .collect()
            }
        }
    }
}
