//! Document staging and upload.
//!
//! Two phases. `stage` validates a file against its slot's rules and keeps it in the
//! session's [`StagingArea`] without any network call. `commit` uploads every staged file
//! and registers its record, replacing an existing document of the same type for the same
//! owner scope. The only transition from `Staged` to `Committed` is `commit`.
//!
//! A blob can land while its record insert fails. That half-committed state is reported
//! as [`CommitOutcome::Orphaned`] rather than rolled back; storage lifecycle rules outside
//! this service reap whatever the best-effort cleanup misses.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::blob::{BlobError, BlobStore};
use crate::intake::error::IntakeError;
use crate::models::document::DocumentRow;
use crate::store::{resilient_read, NewDocument, ReadPolicy, RecordStore, StoreError};

const MIB: usize = 1024 * 1024;
const MAX_FILE_NAME_LEN: usize = 100;

const PDF: &str = "application/pdf";
const DOC: &str = "application/msword";
const DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const JPEG: &str = "image/jpeg";
const PNG: &str = "image/png";
const WEBP: &str = "image/webp";

const RESUME_TYPES: &[&str] = &[PDF, DOC, DOCX];
const PICTURE_TYPES: &[&str] = &[JPEG, PNG, WEBP];
const FILE_TYPES: &[&str] = &[PDF, DOC, DOCX, JPEG, PNG];

/// Upload slot a declared document type falls into. Each slot has its own rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSlot {
    Resume,
    IdPicture,
    PersonnelFile,
    /// Free-form supporting documents ("NBI clearance", "bio-data", ...).
    Other,
}

impl DocumentSlot {
    pub fn for_type(document_type: &str) -> Self {
        match document_type.trim().to_lowercase().as_str() {
            "resume" | "cv" => Self::Resume,
            "2x2 id picture" | "id picture" | "2x2" => Self::IdPicture,
            "201 file" | "201" => Self::PersonnelFile,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SlotRule {
    pub max_bytes: usize,
    pub allowed_types: &'static [&'static str],
}

/// Per-slot size ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub resume_max_bytes: usize,
    pub picture_max_bytes: usize,
    pub file_max_bytes: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            resume_max_bytes: 5 * MIB,
            picture_max_bytes: 2 * MIB,
            file_max_bytes: 10 * MIB,
        }
    }
}

impl UploadLimits {
    pub fn rule_for(&self, slot: DocumentSlot) -> SlotRule {
        match slot {
            DocumentSlot::Resume => SlotRule {
                max_bytes: self.resume_max_bytes,
                allowed_types: RESUME_TYPES,
            },
            DocumentSlot::IdPicture => SlotRule {
                max_bytes: self.picture_max_bytes,
                allowed_types: PICTURE_TYPES,
            },
            DocumentSlot::PersonnelFile | DocumentSlot::Other => SlotRule {
                max_bytes: self.file_max_bytes,
                allowed_types: FILE_TYPES,
            },
        }
    }
}

/// A file picked by the applicant, before validation.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub document_type: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// A validated file held only in the session.
#[derive(Debug, Clone)]
pub struct StagedDocument {
    pub staging_id: Uuid,
    pub slot: DocumentSlot,
    pub document_type: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl StagedDocument {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommittedDocument {
    pub document_id: Uuid,
    pub blob_path: String,
    pub document_type: String,
    pub file_name: String,
    /// Document this one overwrote, if any.
    pub replaced: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub enum DocumentState {
    Staged(StagedDocument),
    Committed(CommittedDocument),
}

/// Per-file result of a commit. Sibling files are independent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommitOutcome {
    Committed {
        document: CommittedDocument,
    },
    /// The blob was written but its record was not.
    Orphaned {
        document_type: String,
        file_name: String,
        blob_path: String,
        cleaned_up: bool,
        reason: String,
    },
    Failed {
        document_type: String,
        file_name: String,
        reason: String,
    },
}

impl CommitOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed { .. })
    }
}

/// Who owns a document. `application_id = None` is the applicant-wide scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentOwner {
    pub applicant_id: Uuid,
    pub application_id: Option<Uuid>,
}

/// Session-local document state. Dropping it abandons everything still staged.
#[derive(Debug, Default)]
pub struct StagingArea {
    entries: Vec<DocumentState>,
}

impl StagingArea {
    pub fn staged(&self) -> impl Iterator<Item = &StagedDocument> {
        self.entries.iter().filter_map(|state| match state {
            DocumentState::Staged(doc) => Some(doc),
            DocumentState::Committed(_) => None,
        })
    }

    /// A newly staged file replaces whatever the same document type held locally.
    fn put(&mut self, document: StagedDocument) {
        self.entries.retain(|state| {
            let document_type = match state {
                DocumentState::Staged(doc) => &doc.document_type,
                DocumentState::Committed(doc) => &doc.document_type,
            };
            !document_type.eq_ignore_ascii_case(&document.document_type)
        });
        self.entries.push(DocumentState::Staged(document));
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SignedDocumentUrl {
    pub document_id: Uuid,
    pub url: String,
    pub expires_in_secs: u64,
}

pub struct UploadManager {
    store: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    limits: UploadLimits,
    upload_timeout: Duration,
    signed_url_ttl: Duration,
    reads: ReadPolicy,
}

impl UploadManager {
    pub fn new(
        store: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        limits: UploadLimits,
        upload_timeout: Duration,
        signed_url_ttl: Duration,
        reads: ReadPolicy,
    ) -> Self {
        Self {
            store,
            blobs,
            limits,
            upload_timeout,
            signed_url_ttl,
            reads,
        }
    }

    /// Validates `upload` and stages it. Nothing is recorded on rejection.
    pub fn stage(&self, area: &mut StagingArea, upload: FileUpload) -> Result<Uuid, IntakeError> {
        let document = self.validate(upload)?;
        let staging_id = document.staging_id;
        area.put(document);
        Ok(staging_id)
    }

    pub fn validate(&self, upload: FileUpload) -> Result<StagedDocument, IntakeError> {
        let document_type = upload.document_type.trim().to_string();
        if document_type.is_empty() {
            return Err(IntakeError::Validation(
                "A document type is required".to_string(),
            ));
        }
        let file_name = upload.file_name.trim().to_string();
        if file_name.is_empty() {
            return Err(IntakeError::Validation("The file has no name".to_string()));
        }

        let slot = DocumentSlot::for_type(&document_type);
        let rule = self.limits.rule_for(slot);

        if upload.bytes.is_empty() {
            return Err(IntakeError::Validation(format!("{file_name} is empty")));
        }
        if upload.bytes.len() > rule.max_bytes {
            return Err(IntakeError::Validation(format!(
                "{file_name} is {} but the {} limit is {}",
                human_size(upload.bytes.len()),
                document_type,
                human_size(rule.max_bytes)
            )));
        }

        let content_type = normalize_content_type(&upload.content_type, &file_name);
        if !rule.allowed_types.contains(&content_type.as_str()) {
            return Err(IntakeError::Validation(format!(
                "{file_name} has type {content_type}; {document_type} accepts {}",
                rule.allowed_types.join(", ")
            )));
        }

        Ok(StagedDocument {
            staging_id: Uuid::new_v4(),
            slot,
            document_type,
            file_name,
            content_type,
            bytes: upload.bytes,
        })
    }

    /// Uploads every staged file. Successful files become `Committed` in `area`; failed
    /// and orphaned files stay staged so the applicant can retry them.
    pub async fn commit(&self, owner: DocumentOwner, area: &mut StagingArea) -> Vec<CommitOutcome> {
        let mut outcomes = Vec::new();

        for state in area.entries.iter_mut() {
            let DocumentState::Staged(staged) = &*state else {
                continue;
            };
            let outcome = self.commit_one(owner, staged).await;
            if let CommitOutcome::Committed { document } = &outcome {
                *state = DocumentState::Committed(document.clone());
            }
            outcomes.push(outcome);
        }

        let committed = outcomes.iter().filter(|o| o.is_committed()).count();
        info!(
            "Committed {committed}/{} staged documents for applicant {}",
            outcomes.len(),
            owner.applicant_id
        );
        outcomes
    }

    /// Single-shot flow: validate and commit one file immediately.
    pub async fn upload_now(
        &self,
        owner: DocumentOwner,
        upload: FileUpload,
    ) -> Result<CommitOutcome, IntakeError> {
        let staged = self.validate(upload)?;
        Ok(self.commit_one(owner, &staged).await)
    }

    async fn commit_one(&self, owner: DocumentOwner, staged: &StagedDocument) -> CommitOutcome {
        let failed = |reason: String| CommitOutcome::Failed {
            document_type: staged.document_type.clone(),
            file_name: staged.file_name.clone(),
            reason,
        };

        let path = blob_path(owner, &staged.file_name);
        let upload = self
            .blobs
            .upload(&path, staged.bytes.clone(), &staged.content_type);
        let blob_path = match timeout(self.upload_timeout, upload).await {
            Ok(Ok(stored)) => stored,
            Ok(Err(e)) => {
                warn!("Upload of {} failed: {e}", staged.file_name);
                return failed(e.to_string());
            }
            Err(_) => {
                let e = BlobError::Timeout(self.upload_timeout);
                warn!("Upload of {} failed: {e}", staged.file_name);
                return failed(e.to_string());
            }
        };

        let mut replaced = match self.replace_existing(owner, &staged.document_type).await {
            Ok(replaced) => replaced,
            Err(e) => return self.orphan(staged, blob_path, e.to_string()).await,
        };

        let record = NewDocument {
            applicant_id: owner.applicant_id,
            application_id: owner.application_id,
            file_path: blob_path.clone(),
            file_name: staged.file_name.clone(),
            document_type: staged.document_type.clone(),
            file_size: staged.size() as i64,
            content_type: staged.content_type.clone(),
        };

        let mut inserted = self.store.insert_document(&record).await;
        if matches!(inserted, Err(StoreError::Conflict)) {
            // Another session filled the slot between our lookup and insert.
            warn!(
                "{} slot for applicant {} was taken concurrently; replacing again",
                staged.document_type, owner.applicant_id
            );
            match self.replace_existing(owner, &staged.document_type).await {
                Ok(again) => replaced = again.or(replaced),
                Err(e) => return self.orphan(staged, blob_path, e.to_string()).await,
            }
            inserted = self.store.insert_document(&record).await;
        }

        match inserted {
            Ok(row) => CommitOutcome::Committed {
                document: CommittedDocument {
                    document_id: row.id,
                    blob_path,
                    document_type: row.document_type,
                    file_name: row.file_name,
                    replaced,
                },
            },
            Err(e) => self.orphan(staged, blob_path, e.to_string()).await,
        }
    }

    /// Overwrite semantics: the previous document of this type in this scope loses both
    /// its record and its blob before the new record is written.
    async fn replace_existing(
        &self,
        owner: DocumentOwner,
        document_type: &str,
    ) -> Result<Option<Uuid>, IntakeError> {
        let store = self.store.as_ref();
        let existing = resilient_read(&self.reads, "find_document_for_slot", move |path| {
            store.find_document_for_slot(
                owner.applicant_id,
                owner.application_id,
                document_type,
                path,
            )
        })
        .await?;

        let Some(existing) = existing else {
            return Ok(None);
        };

        self.store.delete_document(existing.id).await?;
        if let Err(e) = self.blobs.remove(&[existing.file_path.clone()]).await {
            warn!("Replaced document {} left its blob behind: {e}", existing.id);
        }
        info!(
            "Replaced {} document {} for applicant {}",
            document_type, existing.id, owner.applicant_id
        );
        Ok(Some(existing.id))
    }

    async fn orphan(&self, staged: &StagedDocument, blob_path: String, reason: String) -> CommitOutcome {
        error!(
            "Document record for {} failed after upload to {blob_path}: {reason}",
            staged.file_name
        );
        let cleaned_up = match self.blobs.remove(&[blob_path.clone()]).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Orphaned blob {blob_path} could not be removed: {e}");
                false
            }
        };
        CommitOutcome::Orphaned {
            document_type: staged.document_type.clone(),
            file_name: staged.file_name.clone(),
            blob_path,
            cleaned_up,
            reason,
        }
    }

    /// Mints a time-limited URL for viewing or downloading a committed document.
    pub async fn signed_url(
        &self,
        document_id: Uuid,
        ttl: Option<Duration>,
    ) -> Result<SignedDocumentUrl, IntakeError> {
        let document = self.get(document_id).await?;
        let ttl = ttl.unwrap_or(self.signed_url_ttl);
        let url = self.blobs.signed_url(&document.file_path, ttl).await?;
        Ok(SignedDocumentUrl {
            document_id,
            url,
            expires_in_secs: ttl.as_secs(),
        })
    }

    /// Deletes a committed document's record and blob.
    pub async fn remove(&self, document_id: Uuid) -> Result<(), IntakeError> {
        let document = self.get(document_id).await?;
        self.store.delete_document(document.id).await?;
        if let Err(e) = self.blobs.remove(&[document.file_path.clone()]).await {
            warn!("Removed document {document_id} left its blob behind: {e}");
        }
        info!("Removed document {document_id}");
        Ok(())
    }

    pub async fn list(&self, applicant_id: Uuid) -> Result<Vec<DocumentRow>, IntakeError> {
        let store = self.store.as_ref();
        Ok(resilient_read(&self.reads, "list_documents", move |path| {
            store.list_documents(applicant_id, path)
        })
        .await?)
    }

    async fn get(&self, document_id: Uuid) -> Result<DocumentRow, IntakeError> {
        let store = self.store.as_ref();
        resilient_read(&self.reads, "get_document", move |path| {
            store.get_document(document_id, path)
        })
        .await?
        .ok_or_else(|| IntakeError::NotFound(format!("document {document_id}")))
    }
}

/// `applicants/<applicant>/<application|shared>/<millis>-<token>-<safe name>`
fn blob_path(owner: DocumentOwner, file_name: &str) -> String {
    let scope = owner
        .application_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "shared".to_string());
    let token = Uuid::new_v4().simple().to_string();
    format!(
        "applicants/{}/{}/{}-{}-{}",
        owner.applicant_id,
        scope,
        Utc::now().timestamp_millis(),
        &token[..8],
        sanitize_file_name(file_name)
    )
}

/// Keeps `[A-Za-z0-9._-]`, replaces everything else with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let mut safe: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    while safe.starts_with('.') {
        safe.remove(0);
    }
    if safe.len() > MAX_FILE_NAME_LEN {
        safe = safe[safe.len() - MAX_FILE_NAME_LEN..].to_string();
    }
    if safe.is_empty() {
        "file".to_string()
    } else {
        safe
    }
}

/// Lower-cases, drops parameters, and falls back to the extension when the browser sent
/// nothing useful.
fn normalize_content_type(declared: &str, file_name: &str) -> String {
    let declared = declared
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    if !declared.is_empty() && declared != "application/octet-stream" {
        return declared;
    }
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "pdf" => PDF,
        "doc" => DOC,
        "docx" => DOCX,
        "jpg" | "jpeg" => JPEG,
        "png" => PNG,
        "webp" => WEBP,
        _ => "application/octet-stream",
    }
    .to_string()
}

fn human_size(bytes: usize) -> String {
    if bytes >= MIB {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    } else {
        format!("{} KB", bytes.div_ceil(1024))
    }
}
