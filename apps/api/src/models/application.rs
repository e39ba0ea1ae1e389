use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::applicant::non_blank;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApplicationRow {
    pub id: Uuid,
    pub applicant_id: Uuid,
    pub job_id: Option<Uuid>,
    pub current_step: i16,
    pub status: String,
    pub position_desired: Option<String>,
    pub expected_salary: Option<String>,
    pub availability: Option<String>,
    pub notes: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationRow {
    pub fn status(&self) -> Option<ApplicationStatus> {
        ApplicationStatus::parse(&self.status)
    }

    pub fn apply_details(&mut self, details: &ApplicationDetails) {
        let details = details.normalized();
        if details.position_desired.is_some() {
            self.position_desired = details.position_desired;
        }
        if details.expected_salary.is_some() {
            self.expected_salary = details.expected_salary;
        }
        if details.availability.is_some() {
            self.availability = details.availability;
        }
        if details.notes.is_some() {
            self.notes = details.notes;
        }
    }
}

/// Lifecycle status of an application. Independent of the wizard step index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplicationStatus {
    #[serde(rename = "Pending")]
    Pending,
    #[serde(rename = "submitted")]
    Submitted,
    #[serde(rename = "screening")]
    Screening,
    #[serde(rename = "interview")]
    Interview,
    #[serde(rename = "hired")]
    Hired,
    #[serde(rename = "rejected")]
    Rejected,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "Pending",
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::Screening => "screening",
            ApplicationStatus::Interview => "interview",
            ApplicationStatus::Hired => "hired",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "submitted" => Some(Self::Submitted),
            "screening" => Some(Self::Screening),
            "interview" => Some(Self::Interview),
            "hired" => Some(Self::Hired),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Qualification fields captured on the application itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationDetails {
    #[serde(default)]
    pub position_desired: Option<String>,
    #[serde(default)]
    pub expected_salary: Option<String>,
    #[serde(default)]
    pub availability: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ApplicationDetails {
    pub fn normalized(&self) -> Self {
        Self {
            position_desired: non_blank(&self.position_desired),
            expected_salary: non_blank(&self.expected_salary),
            availability: non_blank(&self.availability),
            notes: non_blank(&self.notes),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.normalized() == Self::default()
    }
}
