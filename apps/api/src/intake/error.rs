use thiserror::Error;

use crate::blob::BlobError;
use crate::store::StoreError;

/// Error taxonomy of the intake pipeline.
///
/// `Conflict` and `Configuration` exist so lower layers can report them, but the resolver,
/// coordinator and finalizer absorb both: conflicts turn into the update path and
/// malformed external identifiers are treated as absent.
#[derive(Debug, Error)]
pub enum IntakeError {
    /// Bad input from the applicant. Never retried, surfaced verbatim.
    #[error("{0}")]
    Validation(String),

    /// The store timed out or dropped the connection after the retry budget.
    #[error("the service is temporarily unavailable, please try again ({0})")]
    TransientStore(String),

    #[error("record already exists")]
    Conflict,

    #[error("invalid identifier: {0}")]
    Configuration(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] BlobError),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for IntakeError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict => IntakeError::Conflict,
            e if e.is_transient() => IntakeError::TransientStore(e.to_string()),
            e => IntakeError::Store(e),
        }
    }
}
