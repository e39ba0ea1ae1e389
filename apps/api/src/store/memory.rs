//! In-memory `RecordStore` used by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{NewApplicant, NewDocument, ReadPath, RecordStore, StoreError, StoreResult};
use crate::models::applicant::{ApplicantProfile, ApplicantRow};
use crate::models::application::{ApplicationDetails, ApplicationRow, ApplicationStatus};
use crate::models::document::DocumentRow;
use crate::models::job::JobRow;

#[derive(Default)]
struct Tables {
    applicants: HashMap<Uuid, ApplicantRow>,
    applications: HashMap<Uuid, ApplicationRow>,
    documents: HashMap<Uuid, DocumentRow>,
    jobs: HashMap<Uuid, JobRow>,
    sequence: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    /// Primary-path reads never complete.
    pub hang_primary_reads: AtomicBool,
    /// Every read never completes.
    pub hang_all_reads: AtomicBool,
    /// `next_reference_sequence` fails.
    pub fail_sequence: AtomicBool,
    /// `insert_document` fails.
    pub fail_document_inserts: AtomicBool,
    /// Application writes fail.
    pub fail_application_writes: AtomicBool,
    /// The next applicant insert lands but reports a conflict, as if a concurrent session won.
    pub race_next_applicant_insert: AtomicBool,
    /// A concurrent session fills the slot just before the next document insert.
    pub race_next_document_insert: AtomicBool,
    /// `replace_reference_code` fails.
    pub fail_reference_updates: AtomicBool,
    pub direct_reads: AtomicUsize,
}

impl MemoryStore {
    pub fn applicants(&self) -> Vec<ApplicantRow> {
        self.tables().applicants.values().cloned().collect()
    }

    pub fn applications(&self) -> Vec<ApplicationRow> {
        self.tables().applications.values().cloned().collect()
    }

    pub fn documents(&self) -> Vec<DocumentRow> {
        self.tables().documents.values().cloned().collect()
    }

    pub fn insert_job(&self, job: JobRow) {
        self.tables().jobs.insert(job.id, job);
    }

    pub fn seed_applicant(&self, row: ApplicantRow) {
        self.tables().applicants.insert(row.id, row);
    }

    fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().expect("memory store mutex poisoned")
    }

    async fn gate(&self, path: ReadPath) {
        if path == ReadPath::Direct {
            self.direct_reads.fetch_add(1, Ordering::SeqCst);
        }
        let hang = self.hang_all_reads.load(Ordering::SeqCst)
            || (path == ReadPath::Primary && self.hang_primary_reads.load(Ordering::SeqCst));
        if hang {
            std::future::pending::<()>().await;
        }
    }

    fn check_application_writes(&self) -> StoreResult<()> {
        if self.fail_application_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("applications table offline".to_string()));
        }
        Ok(())
    }
}

pub fn applicant_row(email: &str, reference_code: &str) -> ApplicantRow {
    let now = Utc::now();
    ApplicantRow {
        id: Uuid::new_v4(),
        identity_key: None,
        email: email.to_string(),
        reference_code: reference_code.to_string(),
        first_name: None,
        last_name: None,
        phone: None,
        address: None,
        birth_date: None,
        height_cm: None,
        weight_kg: None,
        licenses: Vec::new(),
        status: "Pending".to_string(),
        created_at: now,
        updated_at: now,
    }
}

fn document_row(document: &NewDocument) -> DocumentRow {
    DocumentRow {
        id: Uuid::new_v4(),
        applicant_id: document.applicant_id,
        application_id: document.application_id,
        file_path: document.file_path.clone(),
        file_name: document.file_name.clone(),
        document_type: document.document_type.clone(),
        file_size: document.file_size,
        content_type: document.content_type.clone(),
        created_at: Utc::now(),
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_applicant_by_identity(
        &self,
        identity_key: &str,
        path: ReadPath,
    ) -> StoreResult<Option<ApplicantRow>> {
        self.gate(path).await;
        Ok(self
            .tables()
            .applicants
            .values()
            .find(|a| a.identity_key.as_deref() == Some(identity_key))
            .cloned())
    }

    async fn find_applicant_by_email(
        &self,
        email: &str,
        path: ReadPath,
    ) -> StoreResult<Option<ApplicantRow>> {
        self.gate(path).await;
        Ok(self
            .tables()
            .applicants
            .values()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn get_applicant(&self, id: Uuid, path: ReadPath) -> StoreResult<Option<ApplicantRow>> {
        self.gate(path).await;
        Ok(self.tables().applicants.get(&id).cloned())
    }

    async fn insert_applicant(&self, applicant: &NewApplicant) -> StoreResult<ApplicantRow> {
        let mut tables = self.tables();
        let duplicate = tables.applicants.values().any(|a| {
            a.email.eq_ignore_ascii_case(&applicant.email)
                || a.reference_code == applicant.reference_code
                || (applicant.identity_key.is_some() && a.identity_key == applicant.identity_key)
        });
        if duplicate {
            return Err(StoreError::Conflict);
        }

        let mut row = applicant_row(&applicant.email, &applicant.reference_code);
        row.identity_key = applicant.identity_key.clone();
        row.apply_profile(&applicant.profile);
        tables.applicants.insert(row.id, row.clone());

        if self.race_next_applicant_insert.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Conflict);
        }
        Ok(row)
    }

    async fn update_applicant_profile(
        &self,
        id: Uuid,
        identity_key: Option<&str>,
        profile: &ApplicantProfile,
    ) -> StoreResult<()> {
        let mut tables = self.tables();
        if let Some(row) = tables.applicants.get_mut(&id) {
            if row.identity_key.is_none() {
                row.identity_key = identity_key.map(String::from);
            }
            row.apply_profile(profile);
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn replace_reference_code(
        &self,
        id: Uuid,
        expected: &str,
        code: &str,
    ) -> StoreResult<bool> {
        if self.fail_reference_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("applicants table offline".to_string()));
        }
        let mut tables = self.tables();
        if tables
            .applicants
            .values()
            .any(|a| a.id != id && a.reference_code == code)
        {
            return Err(StoreError::Conflict);
        }
        match tables.applicants.get_mut(&id) {
            Some(row) if row.reference_code == expected => {
                row.reference_code = code.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn next_reference_sequence(&self) -> StoreResult<i64> {
        if self.fail_sequence.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("sequence offline".to_string()));
        }
        let mut tables = self.tables();
        tables.sequence += 1;
        Ok(tables.sequence)
    }

    async fn find_application(
        &self,
        applicant_id: Uuid,
        job_id: Option<Uuid>,
        path: ReadPath,
    ) -> StoreResult<Option<ApplicationRow>> {
        self.gate(path).await;
        Ok(self
            .tables()
            .applications
            .values()
            .find(|a| a.applicant_id == applicant_id && a.job_id == job_id)
            .cloned())
    }

    async fn get_application(
        &self,
        id: Uuid,
        path: ReadPath,
    ) -> StoreResult<Option<ApplicationRow>> {
        self.gate(path).await;
        Ok(self.tables().applications.get(&id).cloned())
    }

    async fn list_applications(
        &self,
        job_id: Option<Uuid>,
        path: ReadPath,
    ) -> StoreResult<Vec<ApplicationRow>> {
        self.gate(path).await;
        let mut rows: Vec<ApplicationRow> = self
            .tables()
            .applications
            .values()
            .filter(|a| job_id.is_none() || a.job_id == job_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn insert_application(
        &self,
        applicant_id: Uuid,
        job_id: Option<Uuid>,
    ) -> StoreResult<ApplicationRow> {
        self.check_application_writes()?;
        let mut tables = self.tables();
        if tables
            .applications
            .values()
            .any(|a| a.applicant_id == applicant_id && a.job_id == job_id)
        {
            return Err(StoreError::Conflict);
        }
        let now = Utc::now();
        let row = ApplicationRow {
            id: Uuid::new_v4(),
            applicant_id,
            job_id,
            current_step: 1,
            status: ApplicationStatus::Pending.label().to_string(),
            position_desired: None,
            expected_salary: None,
            availability: None,
            notes: None,
            submitted_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.applications.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_application_details(
        &self,
        id: Uuid,
        details: &ApplicationDetails,
    ) -> StoreResult<()> {
        self.check_application_writes()?;
        if let Some(row) = self.tables().applications.get_mut(&id) {
            row.apply_details(details);
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_application_step(&self, id: Uuid, step: i16) -> StoreResult<()> {
        self.check_application_writes()?;
        if let Some(row) = self.tables().applications.get_mut(&id) {
            row.current_step = step;
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_submitted(
        &self,
        id: Uuid,
        terminal_step: i16,
        submitted_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.check_application_writes()?;
        if let Some(row) = self.tables().applications.get_mut(&id) {
            row.status = ApplicationStatus::Submitted.label().to_string();
            row.current_step = terminal_step;
            row.submitted_at.get_or_insert(submitted_at);
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_application_status(
        &self,
        id: Uuid,
        status: ApplicationStatus,
    ) -> StoreResult<bool> {
        self.check_application_writes()?;
        match self.tables().applications.get_mut(&id) {
            Some(row) => {
                row.status = status.label().to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_document_for_slot(
        &self,
        applicant_id: Uuid,
        application_id: Option<Uuid>,
        document_type: &str,
        path: ReadPath,
    ) -> StoreResult<Option<DocumentRow>> {
        self.gate(path).await;
        Ok(self
            .tables()
            .documents
            .values()
            .filter(|d| {
                d.applicant_id == applicant_id
                    && d.application_id == application_id
                    && d.document_type.eq_ignore_ascii_case(document_type)
            })
            .max_by_key(|d| d.created_at)
            .cloned())
    }

    async fn get_document(&self, id: Uuid, path: ReadPath) -> StoreResult<Option<DocumentRow>> {
        self.gate(path).await;
        Ok(self.tables().documents.get(&id).cloned())
    }

    async fn list_documents(
        &self,
        applicant_id: Uuid,
        path: ReadPath,
    ) -> StoreResult<Vec<DocumentRow>> {
        self.gate(path).await;
        let mut rows: Vec<DocumentRow> = self
            .tables()
            .documents
            .values()
            .filter(|d| d.applicant_id == applicant_id)
            .cloned()
            .collect();
        rows.sort_by_key(|d| d.created_at);
        Ok(rows)
    }

    async fn insert_document(&self, document: &NewDocument) -> StoreResult<DocumentRow> {
        if self.fail_document_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("documents table offline".to_string()));
        }
        let row = document_row(document);
        let mut tables = self.tables();
        if self.race_next_document_insert.swap(false, Ordering::SeqCst) {
            let mut competing = document_row(document);
            competing.file_path = format!("{}.competing", document.file_path);
            competing.file_name = format!("competing-{}", document.file_name);
            tables.documents.insert(competing.id, competing);
        }
        let slot_taken = tables.documents.values().any(|d| {
            d.applicant_id == row.applicant_id
                && d.application_id == row.application_id
                && d.document_type.eq_ignore_ascii_case(&row.document_type)
        });
        if slot_taken {
            return Err(StoreError::Conflict);
        }
        tables.documents.insert(row.id, row.clone());
        Ok(row)
    }

    async fn delete_document(&self, id: Uuid) -> StoreResult<()> {
        self.tables().documents.remove(&id);
        Ok(())
    }

    async fn get_job(&self, id: Uuid, path: ReadPath) -> StoreResult<Option<JobRow>> {
        self.gate(path).await;
        Ok(self.tables().jobs.get(&id).cloned())
    }
}
