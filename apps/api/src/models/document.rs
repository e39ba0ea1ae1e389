use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A committed document. `application_id = None` means the document is applicant-scoped
/// and reusable across applications.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DocumentRow {
    pub id: Uuid,
    pub applicant_id: Uuid,
    pub application_id: Option<Uuid>,
    pub file_path: String,
    pub file_name: String,
    pub document_type: String,
    pub file_size: i64,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}
