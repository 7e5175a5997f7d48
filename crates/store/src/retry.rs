//! Bounded retry for transport failures against the system of record.

use {std::time::Duration, tracing::warn};

use crate::error::{Error, Result};

pub const MAX_ATTEMPTS: u32 = 3;
pub const BACKOFF: Duration = Duration::from_secs(2);

/// Run `op` up to [`MAX_ATTEMPTS`] times, backing off between attempts.
/// Only transport errors are retried; query errors (bad SQL, constraint
/// violations) surface immediately.
pub async fn with_retries<T, F, Fut>(label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                warn!(label, attempt, error = %e, "transient store failure, retrying");
                tokio::time::sleep(BACKOFF).await;
                attempt += 1;
            },
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        std::sync::atomic::{AtomicU32, Ordering},
    };

    #[tokio::test(start_paused = true)]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retries("test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::Database(sqlx::Error::PoolTimedOut))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn conflict_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retries("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::conflict("already friends")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retries("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Database(sqlx::Error::PoolTimedOut)) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }
}
