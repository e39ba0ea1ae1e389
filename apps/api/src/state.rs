use std::sync::Arc;

use anyhow::Result;

use crate::blob::BlobStore;
use crate::config::IntakeSettings;
use crate::intake::coordinator::StepCoordinator;
use crate::intake::documents::UploadManager;
use crate::intake::finalize::FinalizationService;
use crate::intake::reference::{ReferenceGenerator, SequenceReferenceGenerator};
use crate::intake::resolver::ApplicantResolver;
use crate::intake::review::ReviewService;
use crate::intake::scoring::{ComplianceScorer, WeightedComplianceScorer};
use crate::store::RecordStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<ApplicantResolver>,
    pub uploads: Arc<UploadManager>,
    pub coordinator: Arc<StepCoordinator>,
    pub finalizer: Arc<FinalizationService>,
    pub review: Arc<ReviewService>,
    /// Pluggable compliance scorer. Default: WeightedComplianceScorer.
    pub scorer: Arc<dyn ComplianceScorer>,
}

impl AppState {
    /// Wires every intake service over the given store and blob handles.
    pub fn build(
        store: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        settings: IntakeSettings,
    ) -> Result<Self> {
        let reads = settings.read_policy();
        let plan = settings.step_plan()?;
        let references: Arc<dyn ReferenceGenerator> =
            Arc::new(SequenceReferenceGenerator::new(store.clone()));
        let scorer: Arc<dyn ComplianceScorer> = Arc::new(WeightedComplianceScorer);

        let uploads = Arc::new(UploadManager::new(
            store.clone(),
            blobs,
            settings.upload_limits,
            settings.upload_timeout,
            settings.signed_url_ttl,
            reads,
        ));

        Ok(Self {
            resolver: Arc::new(ApplicantResolver::new(
                store.clone(),
                references.clone(),
                reads,
            )),
            coordinator: Arc::new(StepCoordinator::new(
                store.clone(),
                uploads.clone(),
                plan.clone(),
                reads,
            )),
            finalizer: Arc::new(FinalizationService::new(
                store.clone(),
                references,
                plan,
                reads,
            )),
            review: Arc::new(ReviewService::new(store, scorer.clone(), reads)),
            uploads,
            scorer,
        })
    }
}
