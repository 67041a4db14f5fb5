//! Bounded retry for calls whose output must pass a validity check.
//!
//! Transport errors short-circuit: a provider that is down won't come back
//! within a retry budget measured in round trips, so we fail immediately
//! and let the caller decide. Only *rejected* outputs (call succeeded, output
//! failed validation) consume additional attempts.

use std::future::Future;

/// Outcome of a validated retry loop.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// An attempt produced output that passed validation.
    Accepted(T),
    /// All attempts succeeded at the transport level but none passed
    /// validation; carries the last rejected output.
    Exhausted(T),
}

/// Run `op` up to `attempts` times, accepting the first output for which
/// `accept` returns true.
pub async fn retry_validated<T, E, F, Fut, V>(
    attempts: u32,
    mut op: F,
    accept: V,
) -> Result<RetryOutcome<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    V: Fn(&T) -> bool,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let value = op().await?;
        if accept(&value) {
            return Ok(RetryOutcome::Accepted(value));
        }
        if attempt >= attempts {
            return Ok(RetryOutcome::Exhausted(value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn accepts_first_valid_output() {
        let calls = AtomicU32::new(0);
        let result: Result<RetryOutcome<i32>, ()> = retry_validated(
            2,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(42) }
            },
            |v| *v == 42,
        )
        .await;
        assert!(matches!(result, Ok(RetryOutcome::Accepted(42))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_rejected_output_then_exhausts() {
        let calls = AtomicU32::new(0);
        let result: Result<RetryOutcome<i32>, ()> = retry_validated(
            2,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(7) }
            },
            |v| *v == 42,
        )
        .await;
        assert!(matches!(result, Ok(RetryOutcome::Exhausted(7))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_attempt_can_succeed() {
        let calls = AtomicU32::new(0);
        let result: Result<RetryOutcome<u32>, ()> = retry_validated(
            2,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move { Ok(n) }
            },
            |v| *v == 2,
        )
        .await;
        assert!(matches!(result, Ok(RetryOutcome::Accepted(2))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn transport_error_short_circuits() {
        let calls = AtomicU32::new(0);
        let result: Result<RetryOutcome<i32>, &str> = retry_validated(
            2,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("boom") }
            },
            |_| true,
        )
        .await;
        assert_eq!(result.unwrap_err(), "boom");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
