//! Compliance scoring: how well an applicant's documents and credentials cover a job's
//! requirements.
//!
//! Default: `WeightedComplianceScorer` (pure, deterministic, no I/O).
//!
//! `AppState` holds an `Arc<dyn ComplianceScorer>` so the review console can swap the
//! ranking without touching handlers.

use serde::{Deserialize, Serialize};

use crate::models::applicant::{normalize_tags, ApplicantRow};
use crate::models::document::DocumentRow;
use crate::models::job::{JobRow, RequiredDocument};

// ────────────────────────────────────────────────────────────────────────────
// Inputs
// ────────────────────────────────────────────────────────────────────────────

/// Which parts of the profile are filled in. Only used when a job has no requirements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSignals {
    #[serde(default)]
    pub has_name: bool,
    #[serde(default)]
    pub has_email: bool,
    #[serde(default)]
    pub has_phone: bool,
    #[serde(default)]
    pub has_address: bool,
}

impl ProfileSignals {
    pub fn from_applicant(applicant: &ApplicantRow) -> Self {
        Self {
            has_name: applicant.full_name().is_some(),
            has_email: !applicant.email.trim().is_empty(),
            has_phone: applicant.phone.is_some(),
            has_address: applicant.address.is_some(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicantEvidence {
    /// Types of the applicant's committed documents.
    #[serde(default)]
    pub document_types: Vec<String>,
    #[serde(default)]
    pub credentials: Vec<String>,
    #[serde(default)]
    pub profile: ProfileSignals,
}

impl ApplicantEvidence {
    pub fn from_records(applicant: &ApplicantRow, documents: &[DocumentRow]) -> Self {
        Self {
            document_types: documents.iter().map(|d| d.document_type.clone()).collect(),
            credentials: applicant.licenses.clone(),
            profile: ProfileSignals::from_applicant(applicant),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobRequirements {
    #[serde(default)]
    pub required_documents: Vec<RequiredDocument>,
    #[serde(default)]
    pub required_credentials: Vec<String>,
}

impl JobRequirements {
    pub fn from_job(job: &JobRow) -> Self {
        Self {
            required_documents: job.required_documents(),
            required_credentials: job.required_credentials.clone(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Output
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBasis {
    Blended,
    DocumentsOnly,
    CredentialsOnly,
    ProfileCompleteness,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub score: u8, // 0 – 100
    pub document_score: f64,
    pub document_total: f64,
    pub credential_score: usize,
    pub credential_total: usize,
    pub matched_documents: Vec<String>,
    pub missing_documents: Vec<String>,
    pub matched_credentials: Vec<String>,
    pub missing_credentials: Vec<String>,
    pub basis: ScoreBasis,
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

pub trait ComplianceScorer: Send + Sync {
    fn score(&self, evidence: &ApplicantEvidence, requirements: &JobRequirements)
        -> ComplianceReport;
}

/// Weight-blended document and credential coverage.
///
/// 1. documents: sum of weights of required types the applicant holds, over the sum of
///    all weights (weights need not add up to 100)
/// 2. credentials: matched count over required count
/// 3. both present: document share `dw = min(doc_total / 100, 1)`, credentials get `1 - dw`
/// 4. one present: that side's percentage
/// 5. none: profile completeness baseline
pub struct WeightedComplianceScorer;

impl ComplianceScorer for WeightedComplianceScorer {
    fn score(
        &self,
        evidence: &ApplicantEvidence,
        requirements: &JobRequirements,
    ) -> ComplianceReport {
        compute_compliance(evidence, requirements)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Core algorithm
// ────────────────────────────────────────────────────────────────────────────

const NAME_POINTS: f64 = 25.0;
const EMAIL_POINTS: f64 = 15.0;
const PHONE_POINTS: f64 = 10.0;
const ADDRESS_POINTS: f64 = 10.0;
const DOCUMENT_POINTS: f64 = 25.0;
const CREDENTIAL_POINTS: f64 = 15.0;

pub fn compute_compliance(
    evidence: &ApplicantEvidence,
    requirements: &JobRequirements,
) -> ComplianceReport {
    let held_documents = normalize_tags(&evidence.document_types);
    let held_credentials = normalize_tags(&evidence.credentials);

    let mut document_score = 0.0;
    let mut document_total = 0.0;
    let mut matched_documents = Vec::new();
    let mut missing_documents = Vec::new();
    for required in &requirements.required_documents {
        let weight = required.weight.max(0.0);
        document_total += weight;
        if held_documents.contains(&normalize(&required.document_type)) {
            document_score += weight;
            matched_documents.push(required.document_type.clone());
        } else {
            missing_documents.push(required.document_type.clone());
        }
    }

    let mut matched_credentials = Vec::new();
    let mut missing_credentials = Vec::new();
    for required in &requirements.required_credentials {
        if held_credentials.contains(&normalize(required)) {
            matched_credentials.push(required.clone());
        } else {
            missing_credentials.push(required.clone());
        }
    }
    let credential_score = matched_credentials.len();
    let credential_total = requirements.required_credentials.len();

    let document_pct = if document_total > 0.0 {
        document_score / document_total * 100.0
    } else {
        0.0
    };
    let credential_pct = if credential_total > 0 {
        credential_score as f64 / credential_total as f64 * 100.0
    } else {
        0.0
    };

    let (raw, basis) = match (document_total > 0.0, credential_total > 0) {
        (true, true) => {
            let document_weight = (document_total / 100.0).min(1.0);
            let credential_weight = 1.0 - document_weight;
            (
                document_pct * document_weight + credential_pct * credential_weight,
                ScoreBasis::Blended,
            )
        }
        (true, false) => (document_pct, ScoreBasis::DocumentsOnly),
        (false, true) => (credential_pct, ScoreBasis::CredentialsOnly),
        (false, false) => (
            completeness(evidence, &held_documents, &held_credentials),
            ScoreBasis::ProfileCompleteness,
        ),
    };

    ComplianceReport {
        score: raw.clamp(0.0, 100.0).round() as u8,
        document_score,
        document_total,
        credential_score,
        credential_total,
        matched_documents,
        missing_documents,
        matched_credentials,
        missing_credentials,
        basis,
    }
}

fn completeness(evidence: &ApplicantEvidence, documents: &[String], credentials: &[String]) -> f64 {
    let profile = &evidence.profile;
    [
        (profile.has_name, NAME_POINTS),
        (profile.has_email, EMAIL_POINTS),
        (profile.has_phone, PHONE_POINTS),
        (profile.has_address, ADDRESS_POINTS),
        (!documents.is_empty(), DOCUMENT_POINTS),
        (!credentials.is_empty(), CREDENTIAL_POINTS),
    ]
    .iter()
    .filter(|(present, _)| *present)
    .map(|(_, points)| points)
    .sum()
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}
