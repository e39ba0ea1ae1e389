//! Relational store boundary.
//!
//! Every component takes an `Arc<dyn RecordStore>` instead of reaching for a global pool,
//! so tests swap in the in-memory implementation. Reads carry a [`ReadPath`] so the
//! resilient read wrapper can fall back to a direct connection when the pool stalls.

pub mod postgres;
pub mod retry;

#[cfg(test)]
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::applicant::{ApplicantProfile, ApplicantRow};
use crate::models::application::{ApplicationDetails, ApplicationRow, ApplicationStatus};
use crate::models::document::DocumentRow;
use crate::models::job::JobRow;

pub use retry::{resilient_read, ReadPolicy};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,

    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Errors worth another attempt: timeouts and dropped connections.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Timeout(_) | StoreError::Unavailable(_) => true,
            StoreError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            StoreError::Conflict => false,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Which connection a read goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPath {
    /// The shared connection pool.
    Primary,
    /// A dedicated connection opened for this read only.
    Direct,
}

#[derive(Debug, Clone)]
pub struct NewApplicant {
    pub identity_key: Option<String>,
    pub email: String,
    pub reference_code: String,
    pub profile: ApplicantProfile,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub applicant_id: Uuid,
    pub application_id: Option<Uuid>,
    pub file_path: String,
    pub file_name: String,
    pub document_type: String,
    pub file_size: i64,
    pub content_type: String,
}

/// Record CRUD the pipeline needs. Implementations guarantee per-row atomicity only.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // Applicants
    async fn find_applicant_by_identity(
        &self,
        identity_key: &str,
        path: ReadPath,
    ) -> StoreResult<Option<ApplicantRow>>;
    async fn find_applicant_by_email(
        &self,
        email: &str,
        path: ReadPath,
    ) -> StoreResult<Option<ApplicantRow>>;
    async fn get_applicant(&self, id: Uuid, path: ReadPath) -> StoreResult<Option<ApplicantRow>>;
    /// Fails with [`StoreError::Conflict`] on a duplicate identity key, email or reference code.
    async fn insert_applicant(&self, applicant: &NewApplicant) -> StoreResult<ApplicantRow>;
    /// Overwrites the supplied profile fields and attaches `identity_key` if the row has none.
    async fn update_applicant_profile(
        &self,
        id: Uuid,
        identity_key: Option<&str>,
        profile: &ApplicantProfile,
    ) -> StoreResult<()>;
    /// Compare-and-set on the reference code. Returns false when `expected` no longer matches.
    async fn replace_reference_code(&self, id: Uuid, expected: &str, code: &str)
        -> StoreResult<bool>;
    async fn next_reference_sequence(&self) -> StoreResult<i64>;

    // Applications
    async fn find_application(
        &self,
        applicant_id: Uuid,
        job_id: Option<Uuid>,
        path: ReadPath,
    ) -> StoreResult<Option<ApplicationRow>>;
    async fn get_application(&self, id: Uuid, path: ReadPath)
        -> StoreResult<Option<ApplicationRow>>;
    async fn list_applications(
        &self,
        job_id: Option<Uuid>,
        path: ReadPath,
    ) -> StoreResult<Vec<ApplicationRow>>;
    /// Inserts at step 1 with status Pending. Conflict if the pair already exists.
    async fn insert_application(
        &self,
        applicant_id: Uuid,
        job_id: Option<Uuid>,
    ) -> StoreResult<ApplicationRow>;
    async fn update_application_details(
        &self,
        id: Uuid,
        details: &ApplicationDetails,
    ) -> StoreResult<()>;
    async fn set_application_step(&self, id: Uuid, step: i16) -> StoreResult<()>;
    /// Moves the application to "submitted". Keeps an existing `submitted_at`.
    async fn mark_submitted(
        &self,
        id: Uuid,
        terminal_step: i16,
        submitted_at: DateTime<Utc>,
    ) -> StoreResult<()>;
    /// Returns false when no application has this id.
    async fn set_application_status(&self, id: Uuid, status: ApplicationStatus)
        -> StoreResult<bool>;

    // Documents
    async fn find_document_for_slot(
        &self,
        applicant_id: Uuid,
        application_id: Option<Uuid>,
        document_type: &str,
        path: ReadPath,
    ) -> StoreResult<Option<DocumentRow>>;
    async fn get_document(&self, id: Uuid, path: ReadPath) -> StoreResult<Option<DocumentRow>>;
    async fn list_documents(&self, applicant_id: Uuid, path: ReadPath)
        -> StoreResult<Vec<DocumentRow>>;
    async fn insert_document(&self, document: &NewDocument) -> StoreResult<DocumentRow>;
    async fn delete_document(&self, id: Uuid) -> StoreResult<()>;

    // Jobs
    async fn get_job(&self, id: Uuid, path: ReadPath) -> StoreResult<Option<JobRow>>;
}
