use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;
use tracing::warn;

use super::{ReadPath, StoreError, StoreResult};

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_READ_RETRIES: u32 = 2;
const DEFAULT_READ_BACKOFF: Duration = Duration::from_secs(2);

/// Timeout and retry budget for reads against the external store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPolicy {
    pub timeout: Duration,
    pub retries: u32,
    pub backoff: Duration,
}

impl Default for ReadPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_READ_TIMEOUT,
            retries: DEFAULT_READ_RETRIES,
            backoff: DEFAULT_READ_BACKOFF,
        }
    }
}

/// Runs a read that may hang indefinitely against the store.
///
/// Each round tries the primary path under `policy.timeout`; on a timeout or transient
/// failure it tries the direct path under the same timeout. Rounds are repeated up to
/// `policy.retries` more times with a fixed backoff, then the last error surfaces.
/// Non-transient errors (bad SQL, decode failures) return immediately.
pub async fn resilient_read<T, F, Fut>(
    policy: &ReadPolicy,
    label: &str,
    mut read: F,
) -> StoreResult<T>
where
    F: FnMut(ReadPath) -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut last_error: Option<StoreError> = None;

    for attempt in 0..=policy.retries {
        if attempt > 0 {
            warn!(
                "{label}: read attempt {} failed, retrying after {}ms",
                attempt,
                policy.backoff.as_millis()
            );
            tokio::time::sleep(policy.backoff).await;
        }

        for path in [ReadPath::Primary, ReadPath::Direct] {
            match timeout(policy.timeout, read(path)).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if e.is_transient() => {
                    warn!("{label}: {path:?} read failed: {e}");
                    last_error = Some(e);
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    warn!(
                        "{label}: {path:?} read timed out after {}ms",
                        policy.timeout.as_millis()
                    );
                    last_error = Some(StoreError::Timeout(policy.timeout));
                }
            }
        }
    }

    Err(last_error.unwrap_or(StoreError::Timeout(policy.timeout)))
}
