//! Human-readable applicant reference codes.
//!
//! Permanent codes look like `REF-2026-00042` and come from a database sequence. When the
//! sequence is unreachable a local code is derived from the clock instead, so an applicant
//! is never left without a confirmation code. Temporary placeholders (`TEMP-xxxxxxxx`)
//! are replaced at finalization.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::store::{RecordStore, StoreResult};

pub const PLACEHOLDER_PREFIX: &str = "TEMP-";

#[async_trait]
pub trait ReferenceGenerator: Send + Sync {
    async fn next_code(&self) -> StoreResult<String>;
}

/// Primary generator backed by the store's reference sequence.
pub struct SequenceReferenceGenerator {
    store: Arc<dyn RecordStore>,
}

impl SequenceReferenceGenerator {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ReferenceGenerator for SequenceReferenceGenerator {
    async fn next_code(&self) -> StoreResult<String> {
        let sequence = self.store.next_reference_sequence().await?;
        Ok(format!("REF-{}-{:05}", Utc::now().year(), sequence))
    }
}

/// `REF-<year>-<first 3 of the last 6 millisecond digits>`. Deterministic for an instant.
pub fn fallback_reference_code(now: DateTime<Utc>) -> String {
    let millis = now.timestamp_millis().unsigned_abs().to_string();
    let tail = &millis[millis.len().saturating_sub(6)..];
    let head = &tail[..tail.len().min(3)];
    format!("REF-{}-{}", now.year(), head)
}

/// Never fails: any generator error falls back to the local code.
pub async fn generate_or_fallback(generator: &dyn ReferenceGenerator) -> String {
    match generator.next_code().await {
        Ok(code) => code,
        Err(e) => {
            let code = fallback_reference_code(Utc::now());
            warn!("Reference generator unavailable ({e}); using fallback code {code}");
            code
        }
    }
}

pub fn placeholder_code() -> String {
    let token = Uuid::new_v4().simple().to_string();
    format!("{PLACEHOLDER_PREFIX}{}", &token[..8])
}

pub fn is_placeholder(code: &str) -> bool {
    let code = code.trim();
    code.is_empty() || code.starts_with(PLACEHOLDER_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use chrono::TimeZone;
    use std::sync::atomic::Ordering;

    #[test]
    fn fallback_code_uses_year_and_truncated_timestamp() {
        // 1_767_225_600_123 ms -> last six digits "600123" -> "600"
        let now = Utc.timestamp_millis_opt(1_767_225_600_123).unwrap();
        assert_eq!(fallback_reference_code(now), "REF-2026-600");
    }

    #[test]
    fn fallback_code_is_deterministic() {
        let now = Utc::now();
        assert_eq!(fallback_reference_code(now), fallback_reference_code(now));
    }

    #[test]
    fn placeholder_codes_are_recognised() {
        let code = placeholder_code();
        assert!(code.starts_with("TEMP-"));
        assert_eq!(code.len(), "TEMP-".len() + 8);
        assert!(is_placeholder(&code));
        assert!(is_placeholder("  "));
        assert!(!is_placeholder("REF-2026-00001"));
    }

    #[tokio::test]
    async fn sequence_generator_formats_padded_codes() {
        let store = Arc::new(MemoryStore::default());
        let generator = SequenceReferenceGenerator::new(store);
        let year = Utc::now().year();
        assert_eq!(generator.next_code().await.unwrap(), format!("REF-{year}-00001"));
        assert_eq!(generator.next_code().await.unwrap(), format!("REF-{year}-00002"));
    }

    #[tokio::test]
    async fn generator_failure_falls_back_to_local_code() {
        let store = Arc::new(MemoryStore::default());
        store.fail_sequence.store(true, Ordering::SeqCst);
        let generator = SequenceReferenceGenerator::new(store);

        let code = generate_or_fallback(&generator).await;
        let prefix = format!("REF-{}-", Utc::now().year());
        assert!(code.starts_with(&prefix), "unexpected code {code}");
        assert_eq!(code.len(), prefix.len() + 3);
    }
}
