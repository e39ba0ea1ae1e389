//! Find-or-create of the person-level Applicant record.
//!
//! Every wizard step calls through here, so it must be idempotent: the same identity and
//! email always land on one row, and a duplicate-key race with another session is folded
//! into the update path instead of being reported.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::intake::error::IntakeError;
use crate::intake::reference::{generate_or_fallback, placeholder_code, ReferenceGenerator};
use crate::models::applicant::{ApplicantProfile, ApplicantRow};
use crate::store::{resilient_read, NewApplicant, ReadPolicy, RecordStore, StoreError};

/// Insert attempts before giving up. Later attempts use a placeholder code in case the
/// conflict came from a reused fallback reference code rather than a concurrent insert.
const MAX_INSERT_ATTEMPTS: usize = 3;

/// What the identity provider hands us after sign-in. Anonymous applicants only have an email.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LookupStrategy {
    IdentityKey,
    Email,
}

const LOOKUP_ORDER: [LookupStrategy; 2] = [LookupStrategy::IdentityKey, LookupStrategy::Email];

pub struct ApplicantResolver {
    store: Arc<dyn RecordStore>,
    references: Arc<dyn ReferenceGenerator>,
    reads: ReadPolicy,
}

impl ApplicantResolver {
    pub fn new(
        store: Arc<dyn RecordStore>,
        references: Arc<dyn ReferenceGenerator>,
        reads: ReadPolicy,
    ) -> Self {
        Self {
            store,
            references,
            reads,
        }
    }

    /// Returns the id of the one Applicant for this identity, creating it if needed.
    pub async fn resolve(
        &self,
        identity: &Identity,
        profile: &ApplicantProfile,
    ) -> Result<Uuid, IntakeError> {
        let identity_key = identity
            .id
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty());
        let email = normalize_email(&identity.email)?;
        if email.is_none() && identity_key.is_none() {
            return Err(IntakeError::Validation(
                "An email address is required".to_string(),
            ));
        }

        for attempt in 0..MAX_INSERT_ATTEMPTS {
            if let Some(existing) = self.lookup(identity_key, email.as_deref()).await? {
                self.store
                    .update_applicant_profile(existing.id, identity_key, profile)
                    .await?;
                debug!("Resolved existing applicant {}", existing.id);
                return Ok(existing.id);
            }

            let Some(email) = email.as_deref() else {
                return Err(IntakeError::Validation(
                    "An email address is required to start an application".to_string(),
                ));
            };

            let reference_code = if attempt == 0 {
                generate_or_fallback(self.references.as_ref()).await
            } else {
                placeholder_code()
            };

            let applicant = NewApplicant {
                identity_key: identity_key.map(String::from),
                email: email.to_string(),
                reference_code,
                profile: profile.clone(),
            };

            match self.store.insert_applicant(&applicant).await {
                Ok(row) => {
                    info!(
                        "Created applicant {} ({}) for {email}",
                        row.id, row.reference_code
                    );
                    return Ok(row.id);
                }
                Err(StoreError::Conflict) => {
                    debug!("Applicant insert for {email} conflicted; retrying as update");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(IntakeError::TransientStore(format!(
            "applicant could not be resolved after {MAX_INSERT_ATTEMPTS} attempts"
        )))
    }

    /// Loads the applicant row by id.
    pub async fn get(&self, applicant_id: Uuid) -> Result<ApplicantRow, IntakeError> {
        let store = self.store.as_ref();
        resilient_read(&self.reads, "get_applicant", move |path| {
            store.get_applicant(applicant_id, path)
        })
        .await?
        .ok_or_else(|| IntakeError::NotFound(format!("applicant {applicant_id}")))
    }

    async fn lookup(
        &self,
        identity_key: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<ApplicantRow>, IntakeError> {
        let store = self.store.as_ref();

        for strategy in LOOKUP_ORDER {
            let found = match strategy {
                LookupStrategy::IdentityKey => {
                    let Some(key) = identity_key else { continue };
                    resilient_read(&self.reads, "find_applicant_by_identity", move |path| {
                        store.find_applicant_by_identity(key, path)
                    })
                    .await?
                }
                LookupStrategy::Email => {
                    let Some(email) = email else { continue };
                    resilient_read(&self.reads, "find_applicant_by_email", move |path| {
                        store.find_applicant_by_email(email, path)
                    })
                    .await?
                }
            };

            if found.is_some() {
                return Ok(found);
            }
        }

        Ok(None)
    }
}

/// Blank means "not supplied"; anything else must look like an address.
fn normalize_email(raw: &str) -> Result<Option<String>, IntakeError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Ok(None);
    }
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        return Err(IntakeError::Validation(format!(
            "'{}' is not a valid email address",
            raw.trim()
        )));
    }
    Ok(Some(email))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::reference::SequenceReferenceGenerator;
    use crate::store::memory::MemoryStore;
    use std::sync::atomic::Ordering;

    fn resolver(store: &Arc<MemoryStore>) -> ApplicantResolver {
        let references = Arc::new(SequenceReferenceGenerator::new(store.clone()));
        ApplicantResolver::new(store.clone(), references, ReadPolicy::default())
    }

    fn profile(first: &str) -> ApplicantProfile {
        ApplicantProfile {
            first_name: Some(first.to_string()),
            last_name: Some("Santos".to_string()),
            ..Default::default()
        }
    }

    fn anonymous(email: &str) -> Identity {
        Identity {
            id: None,
            email: email.to_string(),
        }
    }

    #[tokio::test]
    async fn resolving_the_same_email_twice_yields_one_applicant() {
        let store = Arc::new(MemoryStore::default());
        let resolver = resolver(&store);

        let first = resolver
            .resolve(&anonymous("maria@example.com"), &profile("Maria"))
            .await
            .unwrap();
        let code = store.applicants()[0].reference_code.clone();
        let second = resolver
            .resolve(&anonymous("Maria@Example.com "), &profile("Maria"))
            .await
            .unwrap();

        assert_eq!(first, second);
        let applicants = store.applicants();
        assert_eq!(applicants.len(), 1);
        assert_eq!(applicants[0].reference_code, code);
        assert_eq!(applicants[0].status, "Pending");
    }

    #[tokio::test]
    async fn existing_applicant_fields_are_updated_in_place() {
        let store = Arc::new(MemoryStore::default());
        let resolver = resolver(&store);

        resolver
            .resolve(&anonymous("juan@example.com"), &profile("Juan"))
            .await
            .unwrap();
        let update = ApplicantProfile {
            phone: Some("09171234567".to_string()),
            ..Default::default()
        };
        resolver
            .resolve(&anonymous("juan@example.com"), &update)
            .await
            .unwrap();

        let row = &store.applicants()[0];
        assert_eq!(row.first_name.as_deref(), Some("Juan"));
        assert_eq!(row.phone.as_deref(), Some("09171234567"));
    }

    #[tokio::test]
    async fn identity_key_is_preferred_over_email() {
        let store = Arc::new(MemoryStore::default());
        let resolver = resolver(&store);

        let signed_in = Identity {
            id: Some("user-123".to_string()),
            email: "old@example.com".to_string(),
        };
        let id = resolver.resolve(&signed_in, &profile("Ana")).await.unwrap();

        let changed_email = Identity {
            id: Some("user-123".to_string()),
            email: "new@example.com".to_string(),
        };
        let again = resolver
            .resolve(&changed_email, &profile("Ana"))
            .await
            .unwrap();

        assert_eq!(id, again);
        assert_eq!(store.applicants().len(), 1);
    }

    #[tokio::test]
    async fn identity_key_is_attached_to_an_email_match() {
        let store = Arc::new(MemoryStore::default());
        let resolver = resolver(&store);

        let id = resolver
            .resolve(&anonymous("leo@example.com"), &profile("Leo"))
            .await
            .unwrap();
        let signed_in = Identity {
            id: Some("user-9".to_string()),
            email: "leo@example.com".to_string(),
        };
        assert_eq!(resolver.resolve(&signed_in, &profile("Leo")).await.unwrap(), id);
        assert_eq!(store.applicants()[0].identity_key.as_deref(), Some("user-9"));
    }

    #[tokio::test]
    async fn concurrent_insert_conflict_is_converted_to_update() {
        let store = Arc::new(MemoryStore::default());
        store.race_next_applicant_insert.store(true, Ordering::SeqCst);
        let resolver = resolver(&store);

        let id = resolver
            .resolve(&anonymous("race@example.com"), &profile("Rae"))
            .await
            .expect("conflict must not surface");

        let applicants = store.applicants();
        assert_eq!(applicants.len(), 1);
        assert_eq!(applicants[0].id, id);
    }

    #[tokio::test]
    async fn generator_outage_still_creates_applicant() {
        let store = Arc::new(MemoryStore::default());
        store.fail_sequence.store(true, Ordering::SeqCst);
        let resolver = resolver(&store);

        resolver
            .resolve(&anonymous("offline@example.com"), &profile("Off"))
            .await
            .unwrap();
        assert!(store.applicants()[0].reference_code.starts_with("REF-"));
    }

    #[tokio::test]
    async fn identity_key_alone_finds_an_existing_applicant() {
        let store = Arc::new(MemoryStore::default());
        let resolver = resolver(&store);
        let signed_in = Identity {
            id: Some("user-7".to_string()),
            email: "kim@example.com".to_string(),
        };
        let id = resolver.resolve(&signed_in, &profile("Kim")).await.unwrap();

        let key_only = Identity {
            id: Some("user-7".to_string()),
            email: String::new(),
        };
        assert_eq!(resolver.resolve(&key_only, &profile("Kim")).await.unwrap(), id);

        let unknown_key = Identity {
            id: Some("user-8".to_string()),
            email: String::new(),
        };
        assert!(matches!(
            resolver.resolve(&unknown_key, &profile("Kim")).await,
            Err(IntakeError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn missing_or_malformed_email_is_a_validation_error() {
        let store = Arc::new(MemoryStore::default());
        let resolver = resolver(&store);

        for email in ["", "   ", "not-an-email", "@example.com"] {
            match resolver.resolve(&anonymous(email), &profile("X")).await {
                Err(IntakeError::Validation(_)) => {}
                other => panic!("expected validation error for {email:?}, got {other:?}"),
            }
        }
        assert!(store.applicants().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_primary_lookup_recovers_through_direct_reads() {
        let store = Arc::new(MemoryStore::default());
        let resolver = resolver(&store);
        let existing = resolver
            .resolve(&anonymous("rosa@example.com"), &profile("Rosa"))
            .await
            .unwrap();
        store.hang_primary_reads.store(true, Ordering::SeqCst);

        let again = resolver
            .resolve(&anonymous("rosa@example.com"), &profile("Rosa"))
            .await
            .unwrap();

        assert_eq!(again, existing);
        assert!(store.direct_reads.load(Ordering::SeqCst) > 0);
        assert_eq!(store.applicants().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_store_is_reported_as_transient_after_retries() {
        let store = Arc::new(MemoryStore::default());
        let resolver = resolver(&store);
        store.hang_all_reads.store(true, Ordering::SeqCst);

        let err = resolver
            .resolve(&anonymous("rosa@example.com"), &profile("Rosa"))
            .await
            .unwrap_err();

        assert!(matches!(err, IntakeError::TransientStore(_)));
        // One initial round plus two retries, each ending on the direct path.
        assert_eq!(store.direct_reads.load(Ordering::SeqCst), 3);
        assert!(store.applicants().is_empty());
    }
}
