//! Back-office support: status changes and the scored application listing.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::intake::error::IntakeError;
use crate::intake::scoring::{ApplicantEvidence, ComplianceReport, ComplianceScorer, JobRequirements};
use crate::models::applicant::ApplicantRow;
use crate::models::application::{ApplicationRow, ApplicationStatus};
use crate::models::document::DocumentRow;
use crate::models::job::JobRow;
use crate::store::{resilient_read, ReadPolicy, RecordStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", content = "status", rename_all = "snake_case")]
pub enum ReviewAction {
    Approve,
    Reject,
    Set(ApplicationStatus),
}

impl ReviewAction {
    pub fn target_status(self) -> ApplicationStatus {
        match self {
            ReviewAction::Approve => ApplicationStatus::Interview,
            ReviewAction::Reject => ApplicationStatus::Rejected,
            ReviewAction::Set(status) => status,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredApplication {
    pub application: ApplicationRow,
    pub applicant: Option<ApplicantRow>,
    pub job: Option<JobRow>,
    pub documents: Vec<DocumentRow>,
    pub compliance: ComplianceReport,
}

pub struct ReviewService {
    store: Arc<dyn RecordStore>,
    scorer: Arc<dyn ComplianceScorer>,
    reads: ReadPolicy,
}

impl ReviewService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        scorer: Arc<dyn ComplianceScorer>,
        reads: ReadPolicy,
    ) -> Self {
        Self {
            store,
            scorer,
            reads,
        }
    }

    /// Plain status write. Does not touch the step index.
    pub async fn apply(
        &self,
        application_id: Uuid,
        action: ReviewAction,
    ) -> Result<ApplicationStatus, IntakeError> {
        let status = action.target_status();
        if !self
            .store
            .set_application_status(application_id, status)
            .await?
        {
            return Err(IntakeError::NotFound(format!(
                "application {application_id}"
            )));
        }
        info!("Application {application_id} set to {}", status.label());
        Ok(status)
    }

    /// Every application (optionally for one job) with its compliance score, best first.
    pub async fn scored_applications(
        &self,
        job_id: Option<Uuid>,
    ) -> Result<Vec<ScoredApplication>, IntakeError> {
        let store = self.store.as_ref();
        let applications = resilient_read(&self.reads, "list_applications", move |path| {
            store.list_applications(job_id, path)
        })
        .await?;

        let mut jobs: HashMap<Uuid, Option<JobRow>> = HashMap::new();
        let mut scored = Vec::with_capacity(applications.len());

        for application in applications {
            let applicant_id = application.applicant_id;
            let applicant = resilient_read(&self.reads, "get_applicant", move |path| {
                store.get_applicant(applicant_id, path)
            })
            .await?;

            let documents: Vec<DocumentRow> =
                resilient_read(&self.reads, "list_documents", move |path| {
                    store.list_documents(applicant_id, path)
                })
                .await?
                .into_iter()
                .filter(|d| d.application_id.is_none() || d.application_id == Some(application.id))
                .collect();

            let job = match application.job_id {
                Some(id) => {
                    if !jobs.contains_key(&id) {
                        let job = resilient_read(&self.reads, "get_job", move |path| {
                            store.get_job(id, path)
                        })
                        .await?;
                        jobs.insert(id, job);
                    }
                    jobs.get(&id).cloned().flatten()
                }
                None => None,
            };

            let evidence = match &applicant {
                Some(applicant) => ApplicantEvidence::from_records(applicant, &documents),
                None => ApplicantEvidence::default(),
            };
            let requirements = job.as_ref().map(JobRequirements::from_job).unwrap_or_default();
            let compliance = self.scorer.score(&evidence, &requirements);

            scored.push(ScoredApplication {
                application,
                applicant,
                job,
                documents,
                compliance,
            });
        }

        scored.sort_by(|a, b| b.compliance.score.cmp(&a.compliance.score));
        Ok(scored)
    }
}
