//! Poll-until-ready primitive for asynchronous hypervisor operations.
//!
//! Clone and stop requests return before the hypervisor has finished the
//! work. Callers wait for completion by probing status at a fixed interval,
//! bounded by a timeout and interruptible by a [`CancellationToken`].

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How often to probe and how long to keep trying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Why a poll loop ended without a value.
#[derive(Debug, Error)]
pub enum WaitError<E> {
    #[error("not ready after {0:?}")]
    TimedOut(Duration),

    #[error("wait cancelled")]
    Cancelled,

    #[error("probe failed: {0}")]
    Probe(#[source] E),
}

/// Call `probe` until it yields `Some`, the policy's timeout elapses, the
/// token is cancelled, or the probe fails.
///
/// The first probe runs immediately. The last sleep is shortened so that a
/// final probe always happens at the deadline, and no probe may run past it.
pub async fn poll_until<T, E, F, Fut>(
    policy: PollPolicy,
    cancel: &CancellationToken,
    mut probe: F,
) -> Result<T, WaitError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let start = Instant::now();
    let deadline = start + policy.timeout;
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        // A check still in flight at the deadline is abandoned.
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WaitError::Cancelled),
            outcome = probe() => outcome,
            _ = tokio::time::sleep_until(deadline) => {
                tracing::debug!(attempts, timeout = ?policy.timeout, "Check outlived the deadline");
                return Err(WaitError::TimedOut(policy.timeout));
            }
        };

        if let Some(value) = outcome.map_err(WaitError::Probe)? {
            tracing::debug!(
                attempts,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Poll condition met"
            );
            return Ok(value);
        }

        let now = Instant::now();
        if now >= deadline {
            tracing::debug!(attempts, timeout = ?policy.timeout, "Poll timed out");
            return Err(WaitError::TimedOut(policy.timeout));
        }

        tracing::trace!(attempt = attempts, "Not ready, polling again");
        let pause = policy.interval.min(deadline - now);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WaitError::Cancelled),
            _ = tokio::time::sleep(pause) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(interval_secs: u64, timeout_secs: u64) -> PollPolicy {
        PollPolicy::new(
            Duration::from_secs(interval_secs),
            Duration::from_secs(timeout_secs),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_some_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let start = Instant::now();

        let value = poll_until(policy(1, 10), &CancellationToken::new(), move || async move {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok::<_, String>((n == 3).then_some(n))
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_with_final_probe_at_deadline() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let start = Instant::now();

        let result = poll_until(policy(2, 3), &CancellationToken::new(), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<Option<()>, String>(None)
        })
        .await;

        assert!(matches!(result, Err(WaitError::TimedOut(t)) if t == Duration::from_secs(3)));
        // Probes at t=0, t=2 and t=3.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_check_is_cut_off_at_deadline() {
        let start = Instant::now();

        let result = poll_until(policy(1, 5), &CancellationToken::new(), || async {
            tokio::time::sleep(Duration::from_secs(1000)).await;
            Ok::<Option<()>, String>(Some(()))
        })
        .await;

        assert!(matches!(result, Err(WaitError::TimedOut(t)) if t == Duration::from_secs(5)));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_error_stops_polling() {
        let result = poll_until(policy(1, 10), &CancellationToken::new(), || async {
            Err::<Option<()>, _>("boom".to_string())
        })
        .await;

        match result {
            Err(WaitError::Probe(e)) => assert_eq!(e, "boom"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_first_probe() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result = poll_until(policy(1, 10), &cancel, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<Option<()>, String>(None)
        })
        .await;

        assert!(matches!(result, Err(WaitError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_while_sleeping() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            trigger.cancel();
        });

        let counter = calls.clone();
        let result = poll_until(policy(1, 60), &cancel, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<Option<()>, String>(None)
            }
        })
        .await;

        assert!(matches!(result, Err(WaitError::Cancelled)));
        // Probes at t=0, 1, 2; cancelled during the third sleep.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
