//! Axum route handlers for the intake API.

use std::time::Duration;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::intake::coordinator::{AdvanceOutcome, StepKind, StepPayload};
use crate::intake::documents::{
    CommitOutcome, DocumentOwner, FileUpload, SignedDocumentUrl, StagingArea,
};
use crate::intake::finalize::Confirmation;
use crate::intake::resolver::Identity;
use crate::intake::review::{ReviewAction, ScoredApplication};
use crate::intake::scoring::{ApplicantEvidence, ComplianceReport, JobRequirements};
use crate::models::applicant::ApplicantProfile;
use crate::models::application::{ApplicationRow, ApplicationStatus};
use crate::models::document::DocumentRow;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub identity: Identity,
    #[serde(default)]
    pub profile: ApplicantProfile,
}

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub applicant_id: Uuid,
    pub reference_code: String,
}

#[derive(Debug, Deserialize)]
pub struct AdvanceRequest {
    pub applicant_id: Uuid,
    /// Raw job reference from the link the applicant followed. Not validated.
    #[serde(default)]
    pub job_id: Option<String>,
    pub step: i16,
    #[serde(default)]
    pub payload: StepPayload,
}

#[derive(Debug, Deserialize)]
pub struct DraftRequest {
    pub applicant_id: Uuid,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub payload: StepPayload,
}

#[derive(Debug, Deserialize)]
pub struct ScopeQuery {
    pub applicant_id: Uuid,
    #[serde(default)]
    pub job_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResumeResponse {
    pub application: Option<ApplicationRow>,
    pub total_steps: i16,
}

#[derive(Debug, Deserialize)]
pub struct FinalizeRequest {
    pub applicant_id: Uuid,
    #[serde(default)]
    pub job_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub outcomes: Vec<CommitOutcome>,
}

#[derive(Debug, Deserialize)]
pub struct SignedUrlQuery {
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ListingQuery {
    #[serde(default)]
    pub job_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub application_id: Uuid,
    pub status: ApplicationStatus,
}

#[derive(Debug, Deserialize)]
pub struct ScoringPreviewRequest {
    #[serde(default)]
    pub evidence: ApplicantEvidence,
    #[serde(default)]
    pub requirements: JobRequirements,
}

// ────────────────────────────────────────────────────────────────────────────
// Applicant & wizard
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/applicants/resolve
pub async fn handle_resolve(
    State(state): State<AppState>,
    Json(req): Json<ResolveRequest>,
) -> Result<Json<ResolveResponse>, AppError> {
    let applicant_id = state.resolver.resolve(&req.identity, &req.profile).await?;
    let applicant = state.resolver.get(applicant_id).await?;
    Ok(Json(ResolveResponse {
        applicant_id,
        reference_code: applicant.reference_code,
    }))
}

/// POST /api/v1/applications/advance
pub async fn handle_advance(
    State(state): State<AppState>,
    Json(req): Json<AdvanceRequest>,
) -> Result<Json<AdvanceOutcome>, AppError> {
    let outcome = state
        .coordinator
        .advance(
            req.applicant_id,
            req.job_id.as_deref(),
            req.step,
            &req.payload,
            None,
        )
        .await?;
    Ok(Json(outcome))
}

/// POST /api/v1/applications/advance/documents
///
/// Multipart form for the documents step: `applicant_id`, optional `job_id`, `step`, then
/// `document_type` + `file` pairs. Every file is staged and validated before the step
/// commits any of them.
pub async fn handle_advance_documents(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AdvanceOutcome>, AppError> {
    let form = UploadForm::read(&mut multipart).await?;
    let applicant_id = form.applicant_id()?;
    let step = form
        .step
        .ok_or_else(|| AppError::Validation("step is required".to_string()))?;
    if !form.files.is_empty() && state.coordinator.plan().kind_of(step) != StepKind::Documents {
        return Err(AppError::Validation(format!(
            "Step {step} does not accept documents"
        )));
    }

    let mut area = StagingArea::default();
    for upload in form.files {
        state.uploads.stage(&mut area, upload)?;
    }

    let outcome = state
        .coordinator
        .advance(
            applicant_id,
            form.job_id.as_deref(),
            step,
            &StepPayload::default(),
            Some(&mut area),
        )
        .await?;
    Ok(Json(outcome))
}

/// POST /api/v1/applications/draft
pub async fn handle_save_draft(
    State(state): State<AppState>,
    Json(req): Json<DraftRequest>,
) -> Result<Json<AdvanceOutcome>, AppError> {
    let outcome = state
        .coordinator
        .save_draft(req.applicant_id, req.job_id.as_deref(), &req.payload)
        .await?;
    Ok(Json(outcome))
}

/// GET /api/v1/applications/resume
pub async fn handle_resume(
    State(state): State<AppState>,
    Query(params): Query<ScopeQuery>,
) -> Result<Json<ResumeResponse>, AppError> {
    let application = state
        .coordinator
        .resume(params.applicant_id, params.job_id.as_deref())
        .await?;
    Ok(Json(ResumeResponse {
        application,
        total_steps: state.coordinator.plan().terminal_step(),
    }))
}

/// POST /api/v1/applications/finalize
///
/// Always 200 with a confirmation code; `persisted` tells the client whether the
/// submission was recorded.
pub async fn handle_finalize(
    State(state): State<AppState>,
    Json(req): Json<FinalizeRequest>,
) -> Json<Confirmation> {
    Json(
        state
            .finalizer
            .finalize(req.applicant_id, req.job_id.as_deref())
            .await,
    )
}

// ────────────────────────────────────────────────────────────────────────────
// Documents
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/documents
///
/// Single-shot upload outside the wizard. Multipart form: `applicant_id`, optional
/// `application_id`, `document_type` and one `file`. The file is validated before it is
/// uploaded.
pub async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut form = UploadForm::read(&mut multipart).await?;
    let applicant_id = form.applicant_id()?;
    let upload = match form.files.len() {
        0 => return Err(AppError::Validation("No file was attached".to_string())),
        1 => form.files.remove(0),
        _ => {
            return Err(AppError::Validation(
                "Upload one file at a time".to_string(),
            ))
        }
    };

    match form.application_id {
        Some(application_id) => {
            state
                .coordinator
                .owned_application(applicant_id, application_id)
                .await?;
        }
        None => {
            state.resolver.get(applicant_id).await?;
        }
    }

    let owner = DocumentOwner {
        applicant_id,
        application_id: form.application_id,
    };
    let outcome = state.uploads.upload_now(owner, upload).await?;
    Ok(Json(UploadResponse {
        outcomes: vec![outcome],
    }))
}

/// GET /api/v1/documents/:id/url
pub async fn handle_signed_url(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<SignedUrlQuery>,
) -> Result<Json<SignedDocumentUrl>, AppError> {
    let ttl = params.ttl_secs.map(Duration::from_secs);
    Ok(Json(state.uploads.signed_url(id, ttl).await?))
}

/// DELETE /api/v1/documents/:id
pub async fn handle_remove_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.uploads.remove(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/applicants/:id/documents
pub async fn handle_list_documents(
    State(state): State<AppState>,
    Path(applicant_id): Path<Uuid>,
) -> Result<Json<Vec<DocumentRow>>, AppError> {
    Ok(Json(state.uploads.list(applicant_id).await?))
}

// ────────────────────────────────────────────────────────────────────────────
// Review console
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/admin/applications
pub async fn handle_scored_applications(
    State(state): State<AppState>,
    Query(params): Query<ListingQuery>,
) -> Result<Json<Vec<ScoredApplication>>, AppError> {
    Ok(Json(state.review.scored_applications(params.job_id).await?))
}

/// PATCH /api/v1/admin/applications/:id/status
pub async fn handle_set_status(
    State(state): State<AppState>,
    Path(application_id): Path<Uuid>,
    Json(action): Json<ReviewAction>,
) -> Result<Json<StatusResponse>, AppError> {
    let status = state.review.apply(application_id, action).await?;
    Ok(Json(StatusResponse {
        application_id,
        status,
    }))
}

/// POST /api/v1/scoring/preview
///
/// Scores a supplied payload without touching the store.
pub async fn handle_scoring_preview(
    State(state): State<AppState>,
    Json(req): Json<ScoringPreviewRequest>,
) -> Json<ComplianceReport> {
    Json(state.scorer.score(&req.evidence, &req.requirements))
}

/// Fields of a multipart upload form, accepted in any order. A `document_type` part
/// applies to the next `file` part only.
#[derive(Default)]
struct UploadForm {
    applicant_id: Option<Uuid>,
    application_id: Option<Uuid>,
    job_id: Option<String>,
    step: Option<i16>,
    files: Vec<FileUpload>,
}

impl UploadForm {
    async fn read(multipart: &mut Multipart) -> Result<Self, AppError> {
        let mut form = Self::default();
        let mut document_type = None;

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "applicant_id" => {
                    form.applicant_id = Some(parse_uuid("applicant_id", &field.text().await?)?);
                }
                "application_id" => {
                    let raw = field.text().await?;
                    if !raw.trim().is_empty() {
                        form.application_id = Some(parse_uuid("application_id", &raw)?);
                    }
                }
                "job_id" => form.job_id = Some(field.text().await?),
                "step" => {
                    let raw = field.text().await?;
                    let step = raw
                        .trim()
                        .parse::<i16>()
                        .map_err(|_| AppError::Validation("step must be a number".to_string()))?;
                    form.step = Some(step);
                }
                "document_type" => document_type = Some(field.text().await?),
                "file" => form.files.push(FileUpload {
                    document_type: document_type.take().unwrap_or_default(),
                    file_name: field.file_name().unwrap_or_default().to_string(),
                    content_type: field.content_type().unwrap_or_default().to_string(),
                    bytes: field.bytes().await?,
                }),
                _ => {}
            }
        }
        Ok(form)
    }

    fn applicant_id(&self) -> Result<Uuid, AppError> {
        self.applicant_id
            .ok_or_else(|| AppError::Validation("applicant_id is required".to_string()))
    }
}

fn parse_uuid(field: &str, raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::Validation(format!("{field} must be a UUID")))
}
