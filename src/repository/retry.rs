//! Fixed-delay retry for writes that hit a locked database.

use std::time::Duration;

use tracing::warn;

use super::{is_busy, Result, StoreError};

/// Default number of attempts for a locked write.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default pause between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Bounded retry policy for lock contention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Run `op`, retrying while it fails with lock contention.
///
/// Other errors are returned immediately. When every attempt is locked out the
/// result is [`StoreError::LockRetriesExhausted`]; there is no fallback target.
pub fn with_retry<T, F>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(StoreError::Sqlite(e)) if is_busy(&e) => {
                if attempt >= attempts {
                    return Err(StoreError::LockRetriesExhausted { attempts, last: e });
                }
                warn!(
                    "{} blocked by another writer (attempt {}/{}), retrying in {:?}",
                    operation, attempt, attempts, policy.delay
                );
                std::thread::sleep(policy.delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
