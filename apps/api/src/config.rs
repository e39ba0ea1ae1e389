use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::intake::coordinator::StepPlan;
use crate::intake::documents::UploadLimits;
use crate::store::ReadPolicy;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub port: u16,
    pub rust_log: String,
    pub intake: IntakeSettings,
}

/// Tunables of the intake pipeline. Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakeSettings {
    pub query_timeout: Duration,
    pub query_retries: u32,
    pub query_backoff: Duration,
    pub upload_timeout: Duration,
    pub signed_url_ttl: Duration,
    pub application_steps: u8,
    pub upload_limits: UploadLimits,
}

impl Default for IntakeSettings {
    fn default() -> Self {
        let reads = ReadPolicy::default();
        Self {
            query_timeout: reads.timeout,
            query_retries: reads.retries,
            query_backoff: reads.backoff,
            upload_timeout: Duration::from_secs(30),
            signed_url_ttl: Duration::from_secs(3600),
            application_steps: 3,
            upload_limits: UploadLimits::default(),
        }
    }
}

impl IntakeSettings {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let settings = Self {
            query_timeout: Duration::from_millis(env_or(
                "QUERY_TIMEOUT_MS",
                defaults.query_timeout.as_millis() as u64,
            )?),
            query_retries: env_or("QUERY_RETRIES", defaults.query_retries)?,
            query_backoff: Duration::from_millis(env_or(
                "QUERY_BACKOFF_MS",
                defaults.query_backoff.as_millis() as u64,
            )?),
            upload_timeout: Duration::from_secs(env_or(
                "UPLOAD_TIMEOUT_SECS",
                defaults.upload_timeout.as_secs(),
            )?),
            signed_url_ttl: Duration::from_secs(env_or(
                "SIGNED_URL_TTL_SECS",
                defaults.signed_url_ttl.as_secs(),
            )?),
            application_steps: env_or("APPLICATION_STEPS", defaults.application_steps)?,
            upload_limits: defaults.upload_limits,
        };
        settings.step_plan()?;
        Ok(settings)
    }

    pub fn read_policy(&self) -> ReadPolicy {
        ReadPolicy {
            timeout: self.query_timeout,
            retries: self.query_retries,
            backoff: self.query_backoff,
        }
    }

    pub fn step_plan(&self) -> Result<StepPlan> {
        match StepPlan::with_steps(self.application_steps) {
            Some(plan) => Ok(plan),
            None => bail!(
                "APPLICATION_STEPS must be 3 or 4, got {}",
                self.application_steps
            ),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            port: env_or("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            intake: IntakeSettings::from_env()?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("{key} has an invalid value '{raw}'"))
}
