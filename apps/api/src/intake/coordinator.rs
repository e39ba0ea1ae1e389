//! Multi-step application wizard.
//!
//! Each step upserts the (applicant, job) application and persists whatever the step
//! carried. The stored step index only records where the applicant left off: it moves
//! backwards as freely as forwards and has nothing to do with the application status.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::intake::documents::{
    CommitOutcome, DocumentOwner, DocumentSlot, StagingArea, UploadManager,
};
use crate::intake::error::IntakeError;
use crate::models::applicant::{ApplicantProfile, ApplicantRow};
use crate::models::application::{ApplicationDetails, ApplicationRow};
use crate::store::{resilient_read, ReadPolicy, RecordStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Personal details and qualifications on one page.
    Profile,
    Personal,
    Qualifications,
    Documents,
    Review,
}

/// Ordered steps of the wizard. Step numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPlan {
    steps: Vec<StepKind>,
    pub documents_required: bool,
}

impl Default for StepPlan {
    fn default() -> Self {
        Self::three_step()
    }
}

impl StepPlan {
    pub fn three_step() -> Self {
        Self {
            steps: vec![StepKind::Profile, StepKind::Documents, StepKind::Review],
            documents_required: true,
        }
    }

    pub fn four_step() -> Self {
        Self {
            steps: vec![
                StepKind::Personal,
                StepKind::Qualifications,
                StepKind::Documents,
                StepKind::Review,
            ],
            documents_required: true,
        }
    }

    /// Plan for a configured step count. Only 3 and 4 are supported.
    pub fn with_steps(count: u8) -> Option<Self> {
        match count {
            3 => Some(Self::three_step()),
            4 => Some(Self::four_step()),
            _ => None,
        }
    }

    pub fn terminal_step(&self) -> i16 {
        self.steps.len() as i16
    }

    pub fn clamp(&self, step: i16) -> i16 {
        step.clamp(1, self.terminal_step())
    }

    pub fn kind_of(&self, step: i16) -> StepKind {
        self.steps[(self.clamp(step) - 1) as usize]
    }
}

/// Fields a step submits. Either half may be empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepPayload {
    #[serde(default)]
    pub profile: ApplicantProfile,
    #[serde(default)]
    pub details: ApplicationDetails,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdvanceOutcome {
    pub application_id: Uuid,
    pub current_step: i16,
    /// False when a documents step left the required resume uncommitted.
    pub advanced: bool,
    pub uploads: Vec<CommitOutcome>,
}

/// Strict parse of a job reference. Blank means "no job".
pub fn parse_job_id(raw: &str) -> Result<Option<Uuid>, IntakeError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    Uuid::parse_str(raw)
        .map(Some)
        .map_err(|_| IntakeError::Configuration(format!("job reference '{raw}'")))
}

/// Lenient job scope shared by the wizard and finalization. A malformed or unknown job
/// reference degrades to the jobless application instead of failing the step.
pub(crate) async fn resolve_job_scope(
    store: &dyn RecordStore,
    reads: &ReadPolicy,
    job_ref: Option<&str>,
) -> Result<Option<Uuid>, IntakeError> {
    let job_id = match job_ref.map(parse_job_id).transpose() {
        Ok(job_id) => job_id.flatten(),
        Err(e) => {
            warn!("Ignoring job reference: {e}");
            return Ok(None);
        }
    };
    let Some(job_id) = job_id else {
        return Ok(None);
    };

    let job = resilient_read(reads, "get_job", move |path| store.get_job(job_id, path)).await?;
    if job.is_none() {
        warn!("Job {job_id} does not exist; continuing without a job");
        return Ok(None);
    }
    Ok(Some(job_id))
}

/// Find-or-create of the (applicant, job) application. A lost insert race re-reads.
pub(crate) async fn find_or_create_application(
    store: &dyn RecordStore,
    reads: &ReadPolicy,
    applicant_id: Uuid,
    job_id: Option<Uuid>,
) -> Result<ApplicationRow, IntakeError> {
    let existing = find_application(store, reads, applicant_id, job_id).await?;
    if let Some(existing) = existing {
        return Ok(existing);
    }

    match store.insert_application(applicant_id, job_id).await {
        Ok(row) => {
            info!("Created application {} for applicant {applicant_id}", row.id);
            Ok(row)
        }
        Err(StoreError::Conflict) => {
            debug!("Application insert for {applicant_id} conflicted; re-reading");
            find_application(store, reads, applicant_id, job_id)
                .await?
                .ok_or_else(|| {
                    IntakeError::TransientStore(format!(
                        "application for applicant {applicant_id} is not visible yet"
                    ))
                })
        }
        Err(e) => Err(e.into()),
    }
}

pub(crate) async fn find_application(
    store: &dyn RecordStore,
    reads: &ReadPolicy,
    applicant_id: Uuid,
    job_id: Option<Uuid>,
) -> Result<Option<ApplicationRow>, IntakeError> {
    Ok(resilient_read(reads, "find_application", move |path| {
        store.find_application(applicant_id, job_id, path)
    })
    .await?)
}

pub struct StepCoordinator {
    store: Arc<dyn RecordStore>,
    uploads: Arc<UploadManager>,
    plan: StepPlan,
    reads: ReadPolicy,
}

impl StepCoordinator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        uploads: Arc<UploadManager>,
        plan: StepPlan,
        reads: ReadPolicy,
    ) -> Self {
        Self {
            store,
            uploads,
            plan,
            reads,
        }
    }

    pub fn plan(&self) -> &StepPlan {
        &self.plan
    }

    /// Validates and persists one step, then records `step` as the current step. Nothing
    /// is written, not even the application row, when validation fails.
    pub async fn advance(
        &self,
        applicant_id: Uuid,
        job_ref: Option<&str>,
        step: i16,
        payload: &StepPayload,
        staging: Option<&mut StagingArea>,
    ) -> Result<AdvanceOutcome, IntakeError> {
        let store = self.store.as_ref();
        let step = self.plan.clamp(step);
        let kind = self.plan.kind_of(step);

        let applicant = self.applicant(applicant_id).await?;
        let job_id = resolve_job_scope(store, &self.reads, job_ref).await?;
        let existing = find_application(store, &self.reads, applicant_id, job_id).await?;

        validate_fields(kind, &applicant, existing.as_ref(), payload)?;

        let staged_resume = staging
            .as_deref()
            .is_some_and(|area| area.staged().any(|d| d.slot == DocumentSlot::Resume));
        if kind == StepKind::Documents
            && self.plan.documents_required
            && !staged_resume
            && !self.has_committed_resume(applicant_id).await?
        {
            return Err(IntakeError::Validation(
                "A resume is required before continuing".to_string(),
            ));
        }

        let application = match existing {
            Some(application) => application,
            None => find_or_create_application(store, &self.reads, applicant_id, job_id).await?,
        };

        let mut uploads = Vec::new();
        let mut advanced = true;
        if kind == StepKind::Documents {
            let owner = DocumentOwner {
                applicant_id,
                application_id: Some(application.id),
            };
            if let Some(area) = staging {
                uploads = self.uploads.commit(owner, area).await;
            }
            if self.plan.documents_required && staged_resume {
                advanced = self.has_committed_resume(applicant_id).await?;
            }
        }

        self.persist(applicant_id, &application, payload).await?;

        let current_step = if advanced {
            store.set_application_step(application.id, step).await?;
            step
        } else {
            warn!(
                "Resume upload failed for application {}; staying on step {}",
                application.id, application.current_step
            );
            application.current_step
        };

        info!(
            "Application {} at step {current_step} ({kind:?})",
            application.id
        );
        Ok(AdvanceOutcome {
            application_id: application.id,
            current_step,
            advanced,
            uploads,
        })
    }

    /// Persists whatever was filled in without validating and without moving the step.
    pub async fn save_draft(
        &self,
        applicant_id: Uuid,
        job_ref: Option<&str>,
        payload: &StepPayload,
    ) -> Result<AdvanceOutcome, IntakeError> {
        let store = self.store.as_ref();
        self.applicant(applicant_id).await?;
        let job_id = resolve_job_scope(store, &self.reads, job_ref).await?;
        let application =
            find_or_create_application(store, &self.reads, applicant_id, job_id).await?;

        self.persist(applicant_id, &application, payload).await?;
        debug!("Saved draft for application {}", application.id);

        Ok(AdvanceOutcome {
            application_id: application.id,
            current_step: application.current_step,
            advanced: false,
            uploads: Vec::new(),
        })
    }

    /// The stored application for this scope, so a new session picks up where the last
    /// one stopped.
    pub async fn resume(
        &self,
        applicant_id: Uuid,
        job_ref: Option<&str>,
    ) -> Result<Option<ApplicationRow>, IntakeError> {
        let store = self.store.as_ref();
        let job_id = resolve_job_scope(store, &self.reads, job_ref).await?;
        find_application(store, &self.reads, applicant_id, job_id).await
    }

    /// Application `application_id`, provided it belongs to `applicant_id`.
    pub async fn owned_application(
        &self,
        applicant_id: Uuid,
        application_id: Uuid,
    ) -> Result<ApplicationRow, IntakeError> {
        let store = self.store.as_ref();
        let application = resilient_read(&self.reads, "get_application", move |path| {
            store.get_application(application_id, path)
        })
        .await?;
        match application {
            Some(application) if application.applicant_id == applicant_id => Ok(application),
            Some(_) => {
                warn!("Application {application_id} does not belong to applicant {applicant_id}");
                Err(IntakeError::NotFound(format!("application {application_id}")))
            }
            None => Err(IntakeError::NotFound(format!("application {application_id}"))),
        }
    }

    async fn applicant(&self, applicant_id: Uuid) -> Result<ApplicantRow, IntakeError> {
        let store = self.store.as_ref();
        resilient_read(&self.reads, "get_applicant", move |path| {
            store.get_applicant(applicant_id, path)
        })
        .await?
        .ok_or_else(|| IntakeError::NotFound(format!("applicant {applicant_id}")))
    }

    async fn persist(
        &self,
        applicant_id: Uuid,
        application: &ApplicationRow,
        payload: &StepPayload,
    ) -> Result<(), IntakeError> {
        if !payload.profile.is_empty() {
            self.store
                .update_applicant_profile(applicant_id, None, &payload.profile)
                .await?;
        }
        if !payload.details.is_empty() {
            self.store
                .update_application_details(application.id, &payload.details)
                .await?;
        }
        Ok(())
    }

    async fn has_committed_resume(&self, applicant_id: Uuid) -> Result<bool, IntakeError> {
        let documents = self.uploads.list(applicant_id).await?;
        Ok(documents
            .iter()
            .any(|d| DocumentSlot::for_type(&d.document_type) == DocumentSlot::Resume))
    }
}

/// Mandatory fields are checked against the stored record with the payload applied, so a
/// returning applicant only resubmits what changed.
fn validate_fields(
    kind: StepKind,
    applicant: &ApplicantRow,
    application: Option<&ApplicationRow>,
    payload: &StepPayload,
) -> Result<(), IntakeError> {
    let mut merged_applicant = applicant.clone();
    merged_applicant.apply_profile(&payload.profile);
    let position_desired = match application {
        Some(application) => {
            let mut merged = application.clone();
            merged.apply_details(&payload.details);
            merged.position_desired
        }
        None => payload.details.normalized().position_desired,
    };

    let mut missing = Vec::new();
    if matches!(kind, StepKind::Profile | StepKind::Personal) {
        if merged_applicant.first_name.is_none() {
            missing.push("first name");
        }
        if merged_applicant.last_name.is_none() {
            missing.push("last name");
        }
        if merged_applicant.email.trim().is_empty() {
            missing.push("email");
        }
        if merged_applicant.phone.is_none() {
            missing.push("phone");
        }
    }
    if matches!(kind, StepKind::Profile | StepKind::Qualifications)
        && position_desired.is_none()
    {
        missing.push("position desired");
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(IntakeError::Validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )))
    }
}
