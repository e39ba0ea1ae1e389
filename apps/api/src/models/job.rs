use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use tracing::warn;
use uuid::Uuid;

/// Externally managed job posting. Read-only to the intake pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub title: String,
    pub required_credentials: Vec<String>,
    pub required_documents: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredDocument {
    pub document_type: String,
    pub weight: f64,
}

impl JobRow {
    /// Decodes the admin-configured document requirements, skipping malformed entries.
    pub fn required_documents(&self) -> Vec<RequiredDocument> {
        let Some(items) = self.required_documents.as_array() else {
            if !self.required_documents.is_null() {
                warn!("Job {} has non-array required_documents; ignoring", self.id);
            }
            return Vec::new();
        };

        items
            .iter()
            .filter_map(|item| match serde_json::from_value::<RequiredDocument>(item.clone()) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    warn!("Job {} has malformed required document {item}: {e}", self.id);
                    None
                }
            })
            .collect()
    }
}
