//! Final submission of an application.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::intake::coordinator::{find_application, resolve_job_scope, StepPlan};
use crate::intake::error::IntakeError;
use crate::intake::reference::{
    fallback_reference_code, generate_or_fallback, is_placeholder, ReferenceGenerator,
};
use crate::models::application::ApplicationStatus;
use crate::store::{resilient_read, ReadPolicy, RecordStore, StoreError};

/// Attempts at swapping a placeholder for a permanent code. A second attempt covers a
/// fallback code that collided with one already issued.
const MAX_CODE_ATTEMPTS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Confirmation {
    pub reference_code: String,
    pub application_id: Option<Uuid>,
    /// False when the code shown to the applicant could not be fully recorded.
    pub persisted: bool,
}

pub struct FinalizationService {
    store: Arc<dyn RecordStore>,
    references: Arc<dyn ReferenceGenerator>,
    plan: StepPlan,
    reads: ReadPolicy,
}

impl FinalizationService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        references: Arc<dyn ReferenceGenerator>,
        plan: StepPlan,
        reads: ReadPolicy,
    ) -> Self {
        Self {
            store,
            references,
            plan,
            reads,
        }
    }

    /// Submits the (applicant, job) application and returns the confirmation code.
    ///
    /// This never fails. The applicant always leaves with a code: when the store misbehaves
    /// they get the code we already know, or a locally derived one, with `persisted = false`.
    /// Back-office reconciliation picks those up. Reporting success to the applicant while
    /// the backend write failed is deliberate.
    pub async fn finalize(&self, applicant_id: Uuid, job_ref: Option<&str>) -> Confirmation {
        let mut known_code = None;
        match self.submit(applicant_id, job_ref, &mut known_code).await {
            Ok(confirmation) => confirmation,
            Err(e) => {
                let reference_code = known_code
                    .filter(|code: &String| !is_placeholder(code))
                    .unwrap_or_else(|| fallback_reference_code(Utc::now()));
                error!(
                    "Finalization for applicant {applicant_id} was not persisted ({e}); \
                     confirming with {reference_code}"
                );
                Confirmation {
                    reference_code,
                    application_id: None,
                    persisted: false,
                }
            }
        }
    }

    async fn submit(
        &self,
        applicant_id: Uuid,
        job_ref: Option<&str>,
        known_code: &mut Option<String>,
    ) -> Result<Confirmation, IntakeError> {
        let store = self.store.as_ref();
        let applicant = resilient_read(&self.reads, "get_applicant", move |path| {
            store.get_applicant(applicant_id, path)
        })
        .await?
        .ok_or_else(|| IntakeError::NotFound(format!("applicant {applicant_id}")))?;
        *known_code = Some(applicant.reference_code.clone());

        let reference_code = if is_placeholder(&applicant.reference_code) {
            let code = self
                .replace_placeholder(applicant_id, &applicant.reference_code)
                .await?;
            *known_code = Some(code.clone());
            code
        } else {
            applicant.reference_code
        };

        let job_id = resolve_job_scope(store, &self.reads, job_ref).await?;
        let application = find_application(store, &self.reads, applicant_id, job_id).await?;
        let application_id = match application {
            Some(application) => {
                match application.status() {
                    None | Some(ApplicationStatus::Pending | ApplicationStatus::Submitted) => {
                        store
                            .mark_submitted(application.id, self.plan.terminal_step(), Utc::now())
                            .await?;
                    }
                    // Reviewed applications keep the status the back office gave them.
                    Some(status) => debug!(
                        "Application {} is already {}; not resubmitting",
                        application.id,
                        status.label()
                    ),
                }
                Some(application.id)
            }
            None => {
                warn!("Applicant {applicant_id} finalized without an application");
                None
            }
        };

        info!("Applicant {applicant_id} finalized with {reference_code}");
        Ok(Confirmation {
            reference_code,
            application_id,
            persisted: true,
        })
    }

    /// Compare-and-set, so two finalizations racing on the same placeholder agree on one
    /// code. Only a code the store confirmed is returned.
    async fn replace_placeholder(
        &self,
        applicant_id: Uuid,
        placeholder: &str,
    ) -> Result<String, IntakeError> {
        let store = self.store.as_ref();

        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = generate_or_fallback(self.references.as_ref()).await;

            match store
                .replace_reference_code(applicant_id, placeholder, &code)
                .await
            {
                Ok(true) => return Ok(code),
                Ok(false) => {
                    let current = resilient_read(&self.reads, "get_applicant", move |path| {
                        store.get_applicant(applicant_id, path)
                    })
                    .await?
                    .map(|a| a.reference_code)
                    .filter(|c| !is_placeholder(c))
                    .ok_or_else(|| {
                        IntakeError::NotFound(format!("reference code for {applicant_id}"))
                    })?;
                    return Ok(current);
                }
                Err(StoreError::Conflict) => {
                    warn!("Reference code {code} is already taken; generating another");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(IntakeError::Conflict)
    }
}
