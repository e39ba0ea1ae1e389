use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApplicantRow {
    pub id: Uuid,
    pub identity_key: Option<String>,
    pub email: String,
    pub reference_code: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub licenses: Vec<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicantRow {
    /// "First Last", or whichever half is present.
    pub fn full_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }

    /// Applies the supplied profile fields on top of this row. Absent fields keep their value.
    pub fn apply_profile(&mut self, profile: &ApplicantProfile) {
        let profile = profile.normalized();
        if profile.first_name.is_some() {
            self.first_name = profile.first_name;
        }
        if profile.last_name.is_some() {
            self.last_name = profile.last_name;
        }
        if profile.phone.is_some() {
            self.phone = profile.phone;
        }
        if profile.address.is_some() {
            self.address = profile.address;
        }
        if profile.birth_date.is_some() {
            self.birth_date = profile.birth_date;
        }
        if profile.height_cm.is_some() {
            self.height_cm = profile.height_cm;
        }
        if profile.weight_kg.is_some() {
            self.weight_kg = profile.weight_kg;
        }
        if let Some(licenses) = profile.licenses {
            self.licenses = licenses;
        }
    }
}

/// Mutable applicant fields captured by the wizard. Every field is optional so a
/// half-filled form can be saved; blank strings are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicantProfile {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub height_cm: Option<f64>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub licenses: Option<Vec<String>>,
}

impl ApplicantProfile {
    pub fn normalized(&self) -> Self {
        Self {
            first_name: non_blank(&self.first_name),
            last_name: non_blank(&self.last_name),
            phone: non_blank(&self.phone),
            address: non_blank(&self.address),
            birth_date: self.birth_date,
            height_cm: self.height_cm.filter(|v| v.is_finite() && *v > 0.0),
            weight_kg: self.weight_kg.filter(|v| v.is_finite() && *v > 0.0),
            licenses: self.licenses.as_ref().map(|tags| normalize_tags(tags)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.normalized() == Self::default()
    }
}

/// Credential tags are compared case-insensitively; store them trimmed, lower-cased and unique.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = tags
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

pub(crate) fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}
