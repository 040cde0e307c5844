//! Retry logic for transient database lock errors
//!
//! WAL allows one writer at a time; a reconciliation pass can briefly
//! collide with report reads or a second service instance. Lock errors
//! are retried with exponential backoff up to a configurable budget,
//! every other error returns immediately.

use rollcall_common::{Error, Result};
use std::time::{Duration, Instant};

/// Retry `operation` while it fails with "database is locked", up to
/// `max_wait_ms` total elapsed time.
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let start = Instant::now();
    let max_duration = Duration::from_millis(max_wait_ms);
    let mut backoff_ms = 10u64;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Database operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) => {
                if !is_lock_error(&err) || start.elapsed() >= max_duration {
                    if is_lock_error(&err) {
                        tracing::error!(
                            operation = operation_name,
                            attempt,
                            "Database still locked after retry budget exhausted"
                        );
                    }
                    return Err(err);
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms,
                    "Database locked, retrying"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(1000);
            }
        }
    }
}

fn is_lock_error(err: &Error) -> bool {
    match err {
        Error::Database(db_err) => db_err.to_string().contains("database is locked"),
        _ => false,
    }
}
