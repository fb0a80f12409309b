//! Settlement engine: dataset ingestion and annotation submission.
//!
//! # Responsibility
//! - Debit contributors and fan items out to annotators in one unit of work.
//! - Accept one submission per assignment and pay the annotator for it.
//!
//! # Invariants
//! - Each workflow runs in a single `IMMEDIATE` transaction: every balance and
//!   record change commits together or none does.
//! - Blob transfers never run while that transaction is open.
//! - An assignment is paid only by the call that moves it out of `Pending`.
//! - Per-item upload failures are reported, never raised.
//! - Annotated outputs are uploaded only after their payment has committed.

use crate::assign::AssignmentSelector;
use crate::blob::{BlobError, BlobStore};
use crate::config::{DebitMode, LabelPolicy, MarketConfig};
use crate::logging::sanitize_message;
use crate::model::account::{AccountId, Role};
use crate::model::amount::Amount;
use crate::model::catalog::{
    AddItemOutcome, AssignmentId, ContentRef, DatasetId, DatasetStatus, ItemId,
};
use crate::model::grade::{Grade, GradeError};
use crate::repo::account_repo::{AccountRepository, SqliteAccountRepository};
use crate::repo::catalog_repo::{Catalog, PendingAssignment, SqliteCatalog};
use crate::repo::ledger_repo::{Ledger, SqliteLedger};
use crate::repo::{RepoError, RepoResult};
use crate::service::now_epoch_ms;
use log::{info, warn};
use rand::Rng;
use rusqlite::{Connection, TransactionBehavior};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

const MAX_LOGGED_NAME_CHARS: usize = 80;

/// One source file offered for ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Dataset ingestion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRequest {
    pub contributor: AccountId,
    pub name: String,
    pub description: String,
    pub files: Vec<SourceFile>,
    pub total_value: Amount,
}

/// Per-file result of an ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Created {
        item_id: ItemId,
        file_name: String,
        value: Amount,
        annotators: Vec<AccountId>,
    },
    /// File name already present; no item and no assignments were created.
    Skipped { file_name: String },
    /// Blob upload failed; the file was left out of the dataset.
    UploadFailed { file_name: String, reason: String },
}

impl ItemOutcome {
    pub fn file_name(&self) -> &str {
        match self {
            Self::Created { file_name, .. }
            | Self::Skipped { file_name }
            | Self::UploadFailed { file_name, .. } => file_name,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created { .. })
    }
}

/// Committed ingestion summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub dataset_id: DatasetId,
    /// Amount taken from the contributor.
    pub debited: Amount,
    /// Outcomes in request order.
    pub items: Vec<ItemOutcome>,
}

impl IngestReport {
    pub fn created_count(&self) -> usize {
        self.items.iter().filter(|item| item.is_created()).count()
    }

    /// Non-aborting problems: skipped duplicates and failed uploads.
    pub fn warnings(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.items.iter().filter(|item| !item.is_created())
    }
}

/// Accepted submission summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub assignment_id: AssignmentId,
    pub item_id: ItemId,
    pub grade: Grade,
    pub credited: Amount,
    /// Annotator balance after the credit.
    pub balance: Amount,
    pub completed_at: i64,
    /// Whether this grade became the item's canonical label.
    pub labeled_item: bool,
}

/// Ingestion failure; the whole workflow was rolled back.
#[derive(Debug)]
pub enum IngestError {
    EmptyDataset,
    /// Total value must be greater than zero.
    InvalidValue,
    /// Configured fan-out is zero.
    InvalidFanOut,
    AccountNotFound(AccountId),
    RoleMismatch { account: AccountId, expected: Role },
    InsufficientFunds { balance: Amount, requested: Amount },
    NoAnnotatorsAvailable,
    /// Every upload failed, so there was nothing to charge for.
    NoItemsStored { failed_uploads: usize },
    Repo(RepoError),
}

impl Display for IngestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyDataset => write!(f, "dataset has no files"),
            Self::InvalidValue => write!(f, "dataset total value must be greater than zero"),
            Self::InvalidFanOut => write!(f, "assignment fan-out must be at least 1"),
            Self::AccountNotFound(id) => write!(f, "account not found: {id}"),
            Self::RoleMismatch { account, expected } => {
                write!(f, "account {account} is not a {}", expected.as_str())
            }
            Self::InsufficientFunds { balance, requested } => write!(
                f,
                "insufficient balance: available {balance}, requested {requested}"
            ),
            Self::NoAnnotatorsAvailable => write!(f, "no annotators available"),
            Self::NoItemsStored { failed_uploads } => {
                write!(f, "no items stored: {failed_uploads} uploads failed")
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for IngestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for IngestError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::InsufficientFunds {
                balance, requested, ..
            } => Self::InsufficientFunds { balance, requested },
            RepoError::AccountNotFound(id) => Self::AccountNotFound(id),
            other => Self::Repo(other),
        }
    }
}

impl From<rusqlite::Error> for IngestError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(value.into())
    }
}

/// Outcome of uploading the annotated output after a paid submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultUpload {
    /// Stored and recorded on the assignment.
    Stored(ContentRef),
    /// Not stored; the payment stands.
    Failed { reason: String },
}

/// Paid submission plus the fate of its annotated output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedSubmission {
    pub receipt: SubmitReceipt,
    pub result: ResultUpload,
}

/// Submission or content-fetch failure, local to one request.
#[derive(Debug)]
pub enum SubmitError {
    InvalidGrade(GradeError),
    AccountNotFound(AccountId),
    RoleMismatch { account: AccountId, expected: Role },
    AssignmentNotFound(AssignmentId),
    AssignmentNotOwned {
        assignment: AssignmentId,
        annotator: AccountId,
    },
    AlreadyAnnotated(AssignmentId),
    BlobDownloadFailure(BlobError),
    Repo(RepoError),
}

impl Display for SubmitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidGrade(err) => write!(f, "{err}"),
            Self::AccountNotFound(id) => write!(f, "account not found: {id}"),
            Self::RoleMismatch { account, expected } => {
                write!(f, "account {account} is not a {}", expected.as_str())
            }
            Self::AssignmentNotFound(id) => write!(f, "assignment not found: {id}"),
            Self::AssignmentNotOwned {
                assignment,
                annotator,
            } => write!(f, "assignment {assignment} is not assigned to {annotator}"),
            Self::AlreadyAnnotated(id) => write!(f, "assignment already annotated: {id}"),
            Self::BlobDownloadFailure(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SubmitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidGrade(err) => Some(err),
            Self::BlobDownloadFailure(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for SubmitError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::AccountNotFound(id) => Self::AccountNotFound(id),
            RepoError::AssignmentNotFound(id) => Self::AssignmentNotFound(id),
            other => Self::Repo(other),
        }
    }
}

impl From<rusqlite::Error> for SubmitError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(value.into())
    }
}

/// A file that reached the blob store and awaits registration.
struct StagedItem {
    request_index: usize,
    file_name: String,
    content_ref: ContentRef,
    value: Amount,
}

/// Settlement engine over one SQLite store handle.
pub struct SettlementService<'conn, R: Rng> {
    conn: &'conn mut Connection,
    config: MarketConfig,
    selector: AssignmentSelector<R>,
}

impl<'conn, R: Rng> SettlementService<'conn, R> {
    /// Creates the engine; `rng` drives `RandomK` selection.
    pub fn new(conn: &'conn mut Connection, config: MarketConfig, rng: R) -> Self {
        let selector = AssignmentSelector::new(config.assignment_policy, rng);
        Self {
            conn,
            config,
            selector,
        }
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    /// Ingests a dataset: uploads content, debits the contributor, creates the
    /// dataset and its items, and fans every item out to annotators.
    ///
    /// # Errors
    /// Any returned error means nothing was persisted and no balance changed.
    /// Content already uploaded to `blobs` is left in place.
    pub fn ingest(
        &mut self,
        request: &IngestRequest,
        blobs: &impl BlobStore,
    ) -> Result<IngestReport, IngestError> {
        if request.files.is_empty() {
            return Err(IngestError::EmptyDataset);
        }
        if request.total_value.is_zero() {
            return Err(IngestError::InvalidValue);
        }
        if self.selector.policy().validate().is_err() {
            return Err(IngestError::InvalidFanOut);
        }

        let mut outcomes: Vec<(usize, ItemOutcome)> = Vec::new();
        let mut seen_names = HashSet::new();
        let mut distinct = Vec::new();
        for (index, file) in request.files.iter().enumerate() {
            if seen_names.insert(file.file_name.as_str()) {
                distinct.push((index, file));
            } else {
                outcomes.push((
                    index,
                    ItemOutcome::Skipped {
                        file_name: file.file_name.clone(),
                    },
                ));
            }
        }

        let shares = request.total_value.split_even(distinct.len());
        let mut staged = Vec::with_capacity(distinct.len());
        for ((request_index, file), value) in distinct.into_iter().zip(shares) {
            match blobs.put(&file.file_name, &file.bytes) {
                Ok(content_ref) => staged.push(StagedItem {
                    request_index,
                    file_name: file.file_name.clone(),
                    content_ref,
                    value,
                }),
                Err(err) => {
                    warn!(
                        "event=item_upload module=settlement status=error file={} error={}",
                        sanitize_message(&file.file_name, MAX_LOGGED_NAME_CHARS),
                        err
                    );
                    outcomes.push((
                        request_index,
                        ItemOutcome::UploadFailed {
                            file_name: file.file_name.clone(),
                            reason: err.to_string(),
                        },
                    ));
                }
            }
        }

        let debit = match self.config.debit_mode {
            DebitMode::FullValue => request.total_value,
            DebitMode::CreatedItemsOnly => {
                if staged.is_empty() {
                    let failed_uploads = outcomes
                        .iter()
                        .filter(|(_, outcome)| matches!(outcome, ItemOutcome::UploadFailed { .. }))
                        .count();
                    return Err(IngestError::NoItemsStored { failed_uploads });
                }
                Amount::sum(staged.iter().map(|item| &item.value)).ok_or_else(|| {
                    IngestError::Repo(RepoError::InvalidData(
                        "item shares overflow the dataset total".to_string(),
                    ))
                })?
            }
        };

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let dataset_id = {
            let accounts = SqliteAccountRepository::try_new(&tx)?;
            let ledger = SqliteLedger::try_new(&tx)?;
            let catalog = SqliteCatalog::try_new(&tx)?;

            let contributor = accounts
                .get_account(request.contributor)?
                .ok_or(IngestError::AccountNotFound(request.contributor))?;
            if contributor.role != Role::Contributor {
                return Err(IngestError::RoleMismatch {
                    account: contributor.id,
                    expected: Role::Contributor,
                });
            }

            ledger.debit(contributor.id, debit)?;
            let dataset_id = catalog.create_dataset(
                contributor.id,
                &request.name,
                &request.description,
                debit,
            )?;

            let pool = accounts.list_annotators()?;
            if pool.is_empty() {
                warn!(
                    "event=ingest module=settlement status=error contributor={} error_code=no_annotators",
                    contributor.id
                );
                return Err(IngestError::NoAnnotatorsAvailable);
            }

            for (position, item) in staged.iter().enumerate() {
                let added =
                    catalog.add_item(dataset_id, &item.file_name, &item.content_ref, item.value)?;
                let outcome = match added {
                    AddItemOutcome::Created(item_id) => {
                        let annotators = self.selector.select_annotators(&pool, position);
                        for annotator in &annotators {
                            catalog.create_assignment(item_id, *annotator)?;
                        }
                        ItemOutcome::Created {
                            item_id,
                            file_name: item.file_name.clone(),
                            value: item.value,
                            annotators,
                        }
                    }
                    AddItemOutcome::Skipped => ItemOutcome::Skipped {
                        file_name: item.file_name.clone(),
                    },
                };
                outcomes.push((item.request_index, outcome));
            }

            dataset_id
        };
        tx.commit()?;

        outcomes.sort_by_key(|(index, _)| *index);
        let report = IngestReport {
            dataset_id,
            debited: debit,
            items: outcomes.into_iter().map(|(_, outcome)| outcome).collect(),
        };
        info!(
            "event=ingest module=settlement status=ok dataset_id={} contributor={} created={} warnings={} debited={}",
            report.dataset_id,
            request.contributor,
            report.created_count(),
            report.warnings().count(),
            report.debited
        );
        Ok(report)
    }

    /// Records `grade` for `assignment_id` and credits the item value to
    /// `annotator`, all in one transaction.
    ///
    /// # Errors
    /// - `InvalidGrade` unless `grade` is in `[1, 10]`.
    /// - `AssignmentNotFound`, `AssignmentNotOwned`, `AlreadyAnnotated` from state checks.
    pub fn submit(
        &mut self,
        annotator: AccountId,
        assignment_id: AssignmentId,
        grade: i64,
    ) -> Result<SubmitReceipt, SubmitError> {
        let grade = Grade::new(grade).map_err(SubmitError::InvalidGrade)?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let receipt = {
            let accounts = SqliteAccountRepository::try_new(&tx)?;
            let ledger = SqliteLedger::try_new(&tx)?;
            let catalog = SqliteCatalog::try_new(&tx)?;

            ensure_annotator(&accounts, annotator)?;
            let assignment = catalog
                .get_assignment(assignment_id)?
                .ok_or(SubmitError::AssignmentNotFound(assignment_id))?;
            if assignment.annotator != annotator {
                return Err(SubmitError::AssignmentNotOwned {
                    assignment: assignment_id,
                    annotator,
                });
            }
            if !assignment.is_pending() {
                return Err(SubmitError::AlreadyAnnotated(assignment_id));
            }
            let item = catalog
                .get_item(assignment.item_id)?
                .ok_or(RepoError::ItemNotFound(assignment.item_id))?;

            let completed_at = now_epoch_ms();
            if !catalog.complete_assignment(assignment_id, annotator, grade, completed_at)? {
                return Err(SubmitError::AlreadyAnnotated(assignment_id));
            }
            let balance = ledger.credit(annotator, item.value)?;
            let labeled_item = match self.config.label_policy {
                LabelPolicy::FirstSubmissionWins => catalog.set_label_if_absent(item.id, grade)?,
                LabelPolicy::Disabled => false,
            };

            SubmitReceipt {
                assignment_id,
                item_id: item.id,
                grade,
                credited: item.value,
                balance,
                completed_at,
                labeled_item,
            }
        };
        tx.commit()?;

        info!(
            "event=submit module=settlement status=ok assignment_id={} annotator={} grade={} credited={}",
            receipt.assignment_id, annotator, receipt.grade, receipt.credited
        );
        Ok(receipt)
    }

    /// Submits `grade` like [`Self::submit`], then uploads the annotated
    /// output and records its ref on the assignment.
    ///
    /// The upload runs after the payment has committed and with no transaction
    /// open. Its failure is reported in [`AnnotatedSubmission::result`] and
    /// never undoes the payment; a rejected submission uploads nothing.
    pub fn submit_with_result(
        &mut self,
        annotator: AccountId,
        assignment_id: AssignmentId,
        grade: i64,
        output: &SourceFile,
        blobs: &impl BlobStore,
    ) -> Result<AnnotatedSubmission, SubmitError> {
        let receipt = self.submit(annotator, assignment_id, grade)?;

        let stored = blobs
            .put(&output.file_name, &output.bytes)
            .map_err(|err| err.to_string())
            .and_then(|content_ref| {
                let attached = SqliteCatalog::try_new(self.conn)
                    .and_then(|catalog| {
                        catalog.attach_result(assignment_id, annotator, &content_ref)
                    })
                    .map_err(|err| err.to_string())?;
                if !attached {
                    return Err("assignment already has a result".to_string());
                }
                Ok(content_ref)
            });

        let result = match stored {
            Ok(content_ref) => {
                info!(
                    "event=result_upload module=settlement status=ok assignment_id={} content_ref={}",
                    assignment_id, content_ref
                );
                ResultUpload::Stored(content_ref)
            }
            Err(reason) => {
                warn!(
                    "event=result_upload module=settlement status=error assignment_id={} error={}",
                    assignment_id,
                    sanitize_message(&reason, MAX_LOGGED_NAME_CHARS)
                );
                ResultUpload::Failed { reason }
            }
        };
        Ok(AnnotatedSubmission { receipt, result })
    }

    /// Pending work queue of `annotator`, oldest assignment first.
    pub fn pending_assignments(
        &self,
        annotator: AccountId,
    ) -> Result<Vec<PendingAssignment>, SubmitError> {
        let accounts = SqliteAccountRepository::try_new(self.conn)?;
        ensure_annotator(&accounts, annotator)?;
        let catalog = SqliteCatalog::try_new(self.conn)?;
        Ok(catalog.list_pending_for(annotator)?)
    }

    /// Downloads the content behind a pending assignment of `annotator`.
    ///
    /// Ownership and state are checked first; the download itself runs with no
    /// transaction open.
    pub fn fetch_content(
        &self,
        annotator: AccountId,
        assignment_id: AssignmentId,
        blobs: &impl BlobStore,
    ) -> Result<Vec<u8>, SubmitError> {
        let content_ref = {
            let accounts = SqliteAccountRepository::try_new(self.conn)?;
            let catalog = SqliteCatalog::try_new(self.conn)?;
            ensure_annotator(&accounts, annotator)?;

            let assignment = catalog
                .get_assignment(assignment_id)?
                .ok_or(SubmitError::AssignmentNotFound(assignment_id))?;
            if assignment.annotator != annotator {
                return Err(SubmitError::AssignmentNotOwned {
                    assignment: assignment_id,
                    annotator,
                });
            }
            if !assignment.is_pending() {
                return Err(SubmitError::AlreadyAnnotated(assignment_id));
            }
            catalog
                .get_item(assignment.item_id)?
                .ok_or(RepoError::ItemNotFound(assignment.item_id))?
                .content_ref
        };

        blobs.get(&content_ref).map_err(|err| {
            warn!(
                "event=item_download module=settlement status=error assignment_id={} error={}",
                assignment_id, err
            );
            SubmitError::BlobDownloadFailure(err)
        })
    }

    /// Current balance of any account.
    pub fn balance(&self, account: AccountId) -> RepoResult<Amount> {
        SqliteLedger::try_new(self.conn)?.balance(account)
    }

    /// Recomputes dataset status; `Completed` once every assignment is annotated.
    pub fn refresh_dataset_status(&mut self, dataset_id: DatasetId) -> RepoResult<DatasetStatus> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let status = SqliteCatalog::try_new(&tx)?.refresh_dataset_status(dataset_id)?;
        tx.commit()?;

        info!(
            "event=dataset_status module=settlement status=ok dataset_id={} dataset_status={}",
            dataset_id,
            status.as_str()
        );
        Ok(status)
    }
}

fn ensure_annotator(
    accounts: &impl AccountRepository,
    annotator: AccountId,
) -> Result<(), SubmitError> {
    let account = accounts
        .get_account(annotator)?
        .ok_or(SubmitError::AccountNotFound(annotator))?;
    if account.role != Role::Annotator {
        return Err(SubmitError::RoleMismatch {
            account: annotator,
            expected: Role::Annotator,
        });
    }
    Ok(())
}
