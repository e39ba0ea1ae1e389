// Applicant intake pipeline
// Implements: applicant resolution, reference codes, document staging and upload,
// the step wizard, finalization, compliance scoring and the review console.
// Store and blob access goes through the injected trait objects only.

pub mod coordinator;
pub mod documents;
pub mod error;
pub mod finalize;
pub mod handlers;
pub mod reference;
pub mod resolver;
pub mod review;
pub mod scoring;
