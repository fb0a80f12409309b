//! Read-only projection of grades for a contributor's datasets.
//!
//! # Invariants
//! - Never writes.
//! - Datasets, items and grades follow creation order.
//! - Pending assignments and unassigned items are reported with sentinels, not
//!   numeric placeholders.

use crate::model::account::AccountId;
use crate::model::catalog::{AssignmentStatus, Dataset, Item};
use crate::model::grade::Grade;
use crate::repo::catalog_repo::Catalog;
use crate::repo::{RepoError, RepoResult};
use std::fmt::{Display, Formatter};

/// Grade slot of one assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeEntry {
    NotYetAnnotated,
    Graded(Grade),
}

impl Display for GradeEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotYetAnnotated => write!(f, "<not annotated>"),
            Self::Graded(grade) => write!(f, "{grade}"),
        }
    }
}

/// Grades of all assignments of one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemGrades {
    Unassigned,
    Assigned(Vec<GradeEntry>),
}

impl Display for ItemGrades {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unassigned => write!(f, "<not assigned>"),
            Self::Assigned(entries) => {
                for (index, entry) in entries.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{entry}")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemResult {
    pub item: Item,
    pub grades: ItemGrades,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetResults {
    pub dataset: Dataset,
    pub items: Vec<ItemResult>,
}

/// Results aggregator over any catalog implementation.
///
/// Pass a catalog built on an open transaction to read a consistent snapshot.
pub struct ResultsService<C: Catalog> {
    catalog: C,
}

impl<C: Catalog> ResultsService<C> {
    pub fn new(catalog: C) -> Self {
        Self { catalog }
    }

    /// Grades for every item of every dataset owned by `contributor`.
    pub fn results(&self, contributor: AccountId) -> RepoResult<Vec<DatasetResults>> {
        let mut results = Vec::new();
        for dataset in self.catalog.list_datasets(contributor)? {
            let mut items = Vec::new();
            for item in self.catalog.list_items(dataset.id)? {
                let grades = self.item_grades(&item)?;
                items.push(ItemResult { item, grades });
            }
            results.push(DatasetResults { dataset, items });
        }
        Ok(results)
    }

    fn item_grades(&self, item: &Item) -> RepoResult<ItemGrades> {
        let assignments = self.catalog.list_assignments(item.id)?;
        if assignments.is_empty() {
            return Ok(ItemGrades::Unassigned);
        }

        assignments
            .into_iter()
            .map(|assignment| match (assignment.status, assignment.grade) {
                (AssignmentStatus::Pending, _) => Ok(GradeEntry::NotYetAnnotated),
                (AssignmentStatus::Annotated, Some(grade)) => Ok(GradeEntry::Graded(grade)),
                (AssignmentStatus::Annotated, None) => Err(RepoError::InvalidData(format!(
                    "annotated assignment {} has no grade",
                    assignment.id
                ))),
            })
            .collect::<RepoResult<Vec<_>>>()
            .map(ItemGrades::Assigned)
    }
}
