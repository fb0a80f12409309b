//! Dataset, item and assignment records.
//!
//! # Responsibility
//! - Define the catalog shapes persisted by `repo::catalog_repo`.
//!
//! # Invariants
//! - Item `value` is fixed at creation.
//! - An assignment carries `grade` and `completed_at` iff it is `Annotated`.
//! - `Annotated` is terminal.

use crate::model::account::AccountId;
use crate::model::amount::Amount;
use crate::model::grade::Grade;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type DatasetId = Uuid;
pub type ItemId = Uuid;
pub type AssignmentId = Uuid;

/// Opaque identifier returned by the blob store for stored content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentRef(String);

impl ContentRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ContentRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetStatus {
    Pending,
    /// Every assignment of the dataset has been annotated.
    Completed,
}

impl DatasetStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// Contributor-owned collection of priced items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: DatasetId,
    pub owner: AccountId,
    pub name: String,
    pub description: String,
    pub total_value: Amount,
    pub status: DatasetStatus,
    /// Epoch milliseconds.
    pub created_at: i64,
}

/// One unit of content inside a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub dataset_id: DatasetId,
    pub content_ref: ContentRef,
    /// Source file name; unique within the dataset.
    pub file_name: String,
    pub value: Amount,
    /// Canonical label, set by the first accepted submission.
    pub label: Option<Grade>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Pending,
    Annotated,
}

impl AssignmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Annotated => "annotated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "annotated" => Some(Self::Annotated),
            _ => None,
        }
    }
}

/// Pairing of one item with one annotator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub item_id: ItemId,
    pub annotator: AccountId,
    pub status: AssignmentStatus,
    pub grade: Option<Grade>,
    /// Epoch milliseconds; set together with `grade`.
    pub completed_at: Option<i64>,
    /// Annotated output uploaded after submission, if any.
    pub result_ref: Option<ContentRef>,
}

impl Assignment {
    pub fn is_pending(&self) -> bool {
        self.status == AssignmentStatus::Pending
    }
}

/// Result of registering one item in a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddItemOutcome {
    Created(ItemId),
    /// An item with the same file name already exists in the dataset.
    Skipped,
}
