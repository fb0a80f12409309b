//! Catalog repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist datasets, items and assignments.
//! - Own the single `Pending -> Annotated` transition of an assignment.
//!
//! # Invariants
//! - `(dataset, file_name)` is unique; re-adding a name reports `Skipped`.
//! - `(item, annotator)` is unique across assignments.
//! - `complete_assignment` is a compare-and-swap on `status = 'pending'`; it
//!   succeeds at most once per assignment.
//! - Item and assignment listings follow creation order (`seq ASC`).

use crate::model::account::AccountId;
use crate::model::amount::Amount;
use crate::model::catalog::{
    AddItemOutcome, Assignment, AssignmentId, AssignmentStatus, ContentRef, Dataset, DatasetId,
    DatasetStatus, Item, ItemId,
};
use crate::model::grade::Grade;
use crate::repo::{
    ensure_connection_ready, is_unique_violation, parse_amount, parse_uuid, RepoError, RepoResult,
};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

const DATASET_SELECT_SQL: &str = "SELECT
    uuid,
    owner_uuid,
    name,
    description,
    total_value,
    status,
    created_at
FROM datasets";

const ITEM_SELECT_SQL: &str = "SELECT
    uuid,
    dataset_uuid,
    content_ref,
    file_name,
    value,
    label
FROM items";

const ASSIGNMENT_SELECT_SQL: &str = "SELECT
    uuid,
    item_uuid,
    annotator_uuid,
    status,
    grade,
    completed_at,
    result_ref
FROM assignments";

/// Work-queue row for one pending assignment of an annotator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAssignment {
    pub assignment_id: AssignmentId,
    pub item_id: ItemId,
    pub dataset_id: DatasetId,
    pub file_name: String,
    pub content_ref: ContentRef,
    pub value: Amount,
}

/// Repository interface for dataset/item/assignment storage.
pub trait Catalog {
    fn create_dataset(
        &self,
        owner: AccountId,
        name: &str,
        description: &str,
        total_value: Amount,
    ) -> RepoResult<DatasetId>;
    fn get_dataset(&self, id: DatasetId) -> RepoResult<Option<Dataset>>;
    /// Datasets owned by `owner` in creation order.
    fn list_datasets(&self, owner: AccountId) -> RepoResult<Vec<Dataset>>;
    /// Registers one item; `Skipped` when the file name already exists in the dataset.
    fn add_item(
        &self,
        dataset_id: DatasetId,
        file_name: &str,
        content_ref: &ContentRef,
        value: Amount,
    ) -> RepoResult<AddItemOutcome>;
    fn get_item(&self, id: ItemId) -> RepoResult<Option<Item>>;
    fn list_items(&self, dataset_id: DatasetId) -> RepoResult<Vec<Item>>;
    fn create_assignment(&self, item_id: ItemId, annotator: AccountId)
        -> RepoResult<AssignmentId>;
    fn get_assignment(&self, id: AssignmentId) -> RepoResult<Option<Assignment>>;
    /// Assignments of one item in creation order.
    fn list_assignments(&self, item_id: ItemId) -> RepoResult<Vec<Assignment>>;
    fn list_pending_for(&self, annotator: AccountId) -> RepoResult<Vec<PendingAssignment>>;
    /// Transitions a pending assignment owned by `annotator` to `Annotated`.
    ///
    /// Returns `false` when no pending row matched, leaving storage untouched.
    fn complete_assignment(
        &self,
        id: AssignmentId,
        annotator: AccountId,
        grade: Grade,
        completed_at: i64,
    ) -> RepoResult<bool>;
    /// Records the annotated output of a completed assignment owned by
    /// `annotator`. Returns `false` when the assignment is not annotated, not
    /// owned, or already has a result.
    fn attach_result(
        &self,
        id: AssignmentId,
        annotator: AccountId,
        result_ref: &ContentRef,
    ) -> RepoResult<bool>;
    /// Sets the canonical item label unless one is already present.
    fn set_label_if_absent(&self, item_id: ItemId, grade: Grade) -> RepoResult<bool>;
    /// Marks a dataset `Completed` once it has assignments and all are annotated.
    fn refresh_dataset_status(&self, id: DatasetId) -> RepoResult<DatasetStatus>;
}

/// SQLite-backed catalog repository.
pub struct SqliteCatalog<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCatalog<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["datasets", "items", "assignments"])?;
        Ok(Self { conn })
    }
}

impl Catalog for SqliteCatalog<'_> {
    fn create_dataset(
        &self,
        owner: AccountId,
        name: &str,
        description: &str,
        total_value: Amount,
    ) -> RepoResult<DatasetId> {
        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO datasets (
                uuid,
                owner_uuid,
                name,
                description,
                total_value,
                status
            ) VALUES (?1, ?2, ?3, ?4, ?5, 'pending');",
            params![
                id.to_string(),
                owner.to_string(),
                name,
                description,
                total_value.micros(),
            ],
        )?;
        Ok(id)
    }

    fn get_dataset(&self, id: DatasetId) -> RepoResult<Option<Dataset>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{DATASET_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_dataset_row(row)?));
        }
        Ok(None)
    }

    fn list_datasets(&self, owner: AccountId) -> RepoResult<Vec<Dataset>> {
        let mut stmt = self.conn.prepare(&format!(
            "{DATASET_SELECT_SQL}
             WHERE owner_uuid = ?1
             ORDER BY created_at ASC, rowid ASC;"
        ))?;
        let mut rows = stmt.query([owner.to_string()])?;
        let mut datasets = Vec::new();
        while let Some(row) = rows.next()? {
            datasets.push(parse_dataset_row(row)?);
        }
        Ok(datasets)
    }

    fn add_item(
        &self,
        dataset_id: DatasetId,
        file_name: &str,
        content_ref: &ContentRef,
        value: Amount,
    ) -> RepoResult<AddItemOutcome> {
        let id = Uuid::new_v4();
        let changed = self.conn.execute(
            "INSERT INTO items (
                uuid,
                dataset_uuid,
                content_ref,
                file_name,
                value
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (dataset_uuid, file_name) DO NOTHING;",
            params![
                id.to_string(),
                dataset_id.to_string(),
                content_ref.as_str(),
                file_name,
                value.micros(),
            ],
        )?;

        if changed == 0 {
            return Ok(AddItemOutcome::Skipped);
        }
        Ok(AddItemOutcome::Created(id))
    }

    fn get_item(&self, id: ItemId) -> RepoResult<Option<Item>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ITEM_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_item_row(row)?));
        }
        Ok(None)
    }

    fn list_items(&self, dataset_id: DatasetId) -> RepoResult<Vec<Item>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ITEM_SELECT_SQL} WHERE dataset_uuid = ?1 ORDER BY seq ASC;"
        ))?;
        let mut rows = stmt.query([dataset_id.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_item_row(row)?);
        }
        Ok(items)
    }

    fn create_assignment(
        &self,
        item_id: ItemId,
        annotator: AccountId,
    ) -> RepoResult<AssignmentId> {
        let id = Uuid::new_v4();
        let inserted = self.conn.execute(
            "INSERT INTO assignments (
                uuid,
                item_uuid,
                annotator_uuid,
                status
            ) VALUES (?1, ?2, ?3, 'pending');",
            params![id.to_string(), item_id.to_string(), annotator.to_string()],
        );

        match inserted {
            Ok(_) => Ok(id),
            Err(err) if is_unique_violation(&err) => Err(RepoError::DuplicateAssignment {
                item: item_id,
                annotator,
            }),
            Err(err) => Err(err.into()),
        }
    }

    fn get_assignment(&self, id: AssignmentId) -> RepoResult<Option<Assignment>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ASSIGNMENT_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_assignment_row(row)?));
        }
        Ok(None)
    }

    fn list_assignments(&self, item_id: ItemId) -> RepoResult<Vec<Assignment>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ASSIGNMENT_SELECT_SQL} WHERE item_uuid = ?1 ORDER BY seq ASC;"
        ))?;
        let mut rows = stmt.query([item_id.to_string()])?;
        let mut assignments = Vec::new();
        while let Some(row) = rows.next()? {
            assignments.push(parse_assignment_row(row)?);
        }
        Ok(assignments)
    }

    fn list_pending_for(&self, annotator: AccountId) -> RepoResult<Vec<PendingAssignment>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                a.uuid AS assignment_uuid,
                i.uuid AS item_uuid,
                i.dataset_uuid AS dataset_uuid,
                i.file_name AS file_name,
                i.content_ref AS content_ref,
                i.value AS value
             FROM assignments a
             INNER JOIN items i ON i.uuid = a.item_uuid
             WHERE a.annotator_uuid = ?1
               AND a.status = 'pending'
             ORDER BY a.seq ASC;",
        )?;
        let mut rows = stmt.query([annotator.to_string()])?;
        let mut pending = Vec::new();
        while let Some(row) = rows.next()? {
            let assignment_uuid: String = row.get("assignment_uuid")?;
            let item_uuid: String = row.get("item_uuid")?;
            let dataset_uuid: String = row.get("dataset_uuid")?;
            let content_ref: String = row.get("content_ref")?;
            pending.push(PendingAssignment {
                assignment_id: parse_uuid(&assignment_uuid, "assignments.uuid")?,
                item_id: parse_uuid(&item_uuid, "items.uuid")?,
                dataset_id: parse_uuid(&dataset_uuid, "items.dataset_uuid")?,
                file_name: row.get("file_name")?,
                content_ref: ContentRef::new(content_ref),
                value: parse_amount(row.get("value")?, "items.value")?,
            });
        }
        Ok(pending)
    }

    fn complete_assignment(
        &self,
        id: AssignmentId,
        annotator: AccountId,
        grade: Grade,
        completed_at: i64,
    ) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE assignments
             SET
                status = 'annotated',
                grade = ?3,
                completed_at = ?4
             WHERE uuid = ?1
               AND annotator_uuid = ?2
               AND status = 'pending';",
            params![
                id.to_string(),
                annotator.to_string(),
                i64::from(grade),
                completed_at,
            ],
        )?;
        Ok(changed == 1)
    }

    fn attach_result(
        &self,
        id: AssignmentId,
        annotator: AccountId,
        result_ref: &ContentRef,
    ) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE assignments
             SET result_ref = ?3
             WHERE uuid = ?1
               AND annotator_uuid = ?2
               AND status = 'annotated'
               AND result_ref IS NULL;",
            params![id.to_string(), annotator.to_string(), result_ref.as_str()],
        )?;
        Ok(changed == 1)
    }

    fn set_label_if_absent(&self, item_id: ItemId, grade: Grade) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE items SET label = ?2 WHERE uuid = ?1 AND label IS NULL;",
            params![item_id.to_string(), i64::from(grade)],
        )?;
        Ok(changed == 1)
    }

    fn refresh_dataset_status(&self, id: DatasetId) -> RepoResult<DatasetStatus> {
        let current = self
            .get_dataset(id)?
            .ok_or(RepoError::DatasetNotFound(id))?;
        if current.status == DatasetStatus::Completed {
            return Ok(DatasetStatus::Completed);
        }

        let (total, annotated): (i64, i64) = self.conn.query_row(
            "SELECT
                COUNT(a.uuid),
                COALESCE(SUM(CASE WHEN a.status = 'annotated' THEN 1 ELSE 0 END), 0)
             FROM assignments a
             INNER JOIN items i ON i.uuid = a.item_uuid
             WHERE i.dataset_uuid = ?1;",
            [id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        if total == 0 || annotated < total {
            return Ok(DatasetStatus::Pending);
        }

        self.conn.execute(
            "UPDATE datasets SET status = 'completed' WHERE uuid = ?1;",
            [id.to_string()],
        )?;
        Ok(DatasetStatus::Completed)
    }
}

fn parse_dataset_row(row: &Row<'_>) -> RepoResult<Dataset> {
    let uuid: String = row.get("uuid")?;
    let owner: String = row.get("owner_uuid")?;
    let status_text: String = row.get("status")?;
    let status = DatasetStatus::parse(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid status `{status_text}` in datasets.status"))
    })?;

    Ok(Dataset {
        id: parse_uuid(&uuid, "datasets.uuid")?,
        owner: parse_uuid(&owner, "datasets.owner_uuid")?,
        name: row.get("name")?,
        description: row.get("description")?,
        total_value: parse_amount(row.get("total_value")?, "datasets.total_value")?,
        status,
        created_at: row.get("created_at")?,
    })
}

fn parse_item_row(row: &Row<'_>) -> RepoResult<Item> {
    let uuid: String = row.get("uuid")?;
    let dataset: String = row.get("dataset_uuid")?;
    let content_ref: String = row.get("content_ref")?;

    Ok(Item {
        id: parse_uuid(&uuid, "items.uuid")?,
        dataset_id: parse_uuid(&dataset, "items.dataset_uuid")?,
        content_ref: ContentRef::new(content_ref),
        file_name: row.get("file_name")?,
        value: parse_amount(row.get("value")?, "items.value")?,
        label: parse_grade(row.get("label")?, "items.label")?,
    })
}

fn parse_assignment_row(row: &Row<'_>) -> RepoResult<Assignment> {
    let uuid: String = row.get("uuid")?;
    let item: String = row.get("item_uuid")?;
    let annotator: String = row.get("annotator_uuid")?;
    let status_text: String = row.get("status")?;
    let status = AssignmentStatus::parse(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid status `{status_text}` in assignments.status"
        ))
    })?;
    let grade = parse_grade(row.get("grade")?, "assignments.grade")?;
    let completed_at: Option<i64> = row.get("completed_at")?;
    let result_ref: Option<String> = row.get("result_ref")?;

    let annotated = status == AssignmentStatus::Annotated;
    if annotated != grade.is_some() || annotated != completed_at.is_some() {
        return Err(RepoError::InvalidData(format!(
            "assignment {uuid} has grade/completed_at inconsistent with status `{status_text}`"
        )));
    }

    Ok(Assignment {
        id: parse_uuid(&uuid, "assignments.uuid")?,
        item_id: parse_uuid(&item, "assignments.item_uuid")?,
        annotator: parse_uuid(&annotator, "assignments.annotator_uuid")?,
        status,
        grade,
        completed_at,
        result_ref: result_ref.map(ContentRef::new),
    })
}

fn parse_grade(value: Option<i64>, column: &str) -> RepoResult<Option<Grade>> {
    match value {
        Some(value) => Grade::new(value)
            .map(Some)
            .map_err(|_| RepoError::InvalidData(format!("invalid grade `{value}` in {column}"))),
        None => Ok(None),
    }
}
