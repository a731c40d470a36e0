// Execution policies - Timeout, circuit breaker and retry, composed in a fixed order
use crate::domain::error::ExecutionError;
use crate::infrastructure::config::{BreakerSettings, ExecutionSettings, RetrySettings};
use rand::Rng;
use serde::Serialize;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

pub struct TimeoutPolicy {
    limit: Duration,
}

impl TimeoutPolicy {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }

    pub async fn run<T, Fut>(&self, fut: Fut) -> Result<T, ExecutionError>
    where
        Fut: Future<Output = Result<T, ExecutionError>>,
    {
        match tokio::time::timeout(self.limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(ExecutionError::timeout(self.limit.as_secs())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
    pub retry_in_secs: Option<u64>,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// CLOSED until `failure_threshold` consecutive failures, then OPEN (calls
/// rejected without running) until `recovery` has passed. The next call runs
/// in HALF_OPEN: success closes the breaker, failure reopens it.
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            recovery,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remaining(&self, inner: &BreakerInner) -> Duration {
        inner
            .opened_at
            .map(|at| self.recovery.saturating_sub(at.elapsed()))
            .unwrap_or_default()
    }

    /// State as the next call would see it.
    pub fn state(&self) -> BreakerState {
        let inner = self.lock();
        match inner.state {
            BreakerState::Open if self.remaining(&inner).is_zero() => BreakerState::HalfOpen,
            state => state,
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        let remaining = self.remaining(&inner);
        let state = match inner.state {
            BreakerState::Open if remaining.is_zero() => BreakerState::HalfOpen,
            state => state,
        };
        BreakerSnapshot {
            state,
            consecutive_failures: inner.consecutive_failures,
            failure_threshold: self.failure_threshold,
            retry_in_secs: (state == BreakerState::Open).then(|| remaining.as_secs()),
        }
    }

    fn acquire(&self) -> Result<(), ExecutionError> {
        let mut inner = self.lock();
        if inner.state == BreakerState::Open {
            let remaining = self.remaining(&inner);
            if !remaining.is_zero() {
                return Err(ExecutionError::circuit_open(
                    inner.consecutive_failures,
                    remaining.as_secs(),
                ));
            }
            inner.state = BreakerState::HalfOpen;
            tracing::info!("Circuit breaker HALF_OPEN, attempting recovery");
        }
        Ok(())
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        if inner.state != BreakerState::Closed {
            tracing::info!("Circuit breaker CLOSED after successful call");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    fn on_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures += 1;
        if inner.state == BreakerState::HalfOpen || inner.consecutive_failures >= self.failure_threshold {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
            tracing::warn!(
                failures = inner.consecutive_failures,
                recovery_secs = self.recovery.as_secs(),
                "Circuit breaker OPEN"
            );
        }
    }

    pub async fn call<T, Fut>(&self, fut: Fut) -> Result<T, ExecutionError>
    where
        Fut: Future<Output = Result<T, ExecutionError>>,
    {
        self.acquire()?;
        let result = fut.await;
        match &result {
            Ok(_) => self.on_success(),
            Err(_) => self.on_failure(),
        }
        result
    }
}

/// Exponential backoff: `base * multiplier^(attempt-1)`, capped at `max_delay`,
/// scaled into `[0.5, 1.0]` of itself when jitter is on.
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: bool,
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            multiplier: settings.multiplier,
            jitter: settings.jitter,
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let raw = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let mut delay = raw.min(self.max_delay.as_secs_f64());
        if self.jitter {
            delay *= rand::thread_rng().gen_range(0.5..=1.0);
        }
        Duration::from_secs_f64(delay.max(0.0))
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or
    /// attempts run out. The last error is returned.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, ExecutionError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ExecutionError>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() || attempt >= self.max_attempts => {
                    if attempt > 1 {
                        tracing::error!(attempt, code = %e.code, "Giving up after {} attempts", attempt);
                    }
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        code = %e.code,
                        retry_in_ms = delay.as_millis() as u64,
                        "Attempt failed: {}",
                        e.message
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// `retry(breaker(timeout(op)))`: each attempt is bounded by the timeout and
/// counted by the breaker; an open breaker ends the retry loop.
pub struct PolicyPipeline {
    timeout: TimeoutPolicy,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
}

impl PolicyPipeline {
    pub fn new(timeout: TimeoutPolicy, breaker: CircuitBreaker, retry: RetryPolicy) -> Self {
        Self { timeout, breaker, retry }
    }

    pub fn from_settings(settings: &ExecutionSettings) -> Self {
        let BreakerSettings {
            failure_threshold,
            recovery_secs,
        } = settings.breaker;
        Self::new(
            TimeoutPolicy::new(Duration::from_secs(settings.timeout_secs)),
            CircuitBreaker::new(failure_threshold, Duration::from_secs(recovery_secs)),
            RetryPolicy::from(&settings.retry),
        )
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, ExecutionError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ExecutionError>>,
    {
        self.retry
            .run(|attempt| {
                let fut = op(attempt);
                async move { self.breaker.call(self.timeout.run(fut)).await }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ExecutionErrorCode;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn failed() -> ExecutionError {
        ExecutionError::new(ExecutionErrorCode::ExecutionFailed, "pipeline failed")
    }

    fn retry(max_attempts: u32, jitter: bool) -> RetryPolicy {
        RetryPolicy::from(&RetrySettings {
            max_attempts,
            jitter,
            ..RetrySettings::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_policy() {
        let policy = TimeoutPolicy::new(Duration::from_secs(600));

        let err = policy
            .run(async {
                tokio::time::sleep(Duration::from_secs(601)).await;
                Ok::<_, ExecutionError>(())
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, ExecutionErrorCode::Timeout);

        assert_eq!(policy.run(async { Ok::<_, ExecutionError>(7) }).await.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_opens_then_recovers() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(300));
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            let result = breaker
                .call(async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(failed())
                })
                .await;
            assert_eq!(result.unwrap_err().code, ExecutionErrorCode::ExecutionFailed);
        }
        assert_eq!(breaker.state(), BreakerState::Open);

        let rejected = breaker
            .call(async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap_err();
        assert_eq!(rejected.code, ExecutionErrorCode::CircuitOpen);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        tokio::time::advance(Duration::from_secs(300)).await;
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        breaker.call(async { Ok(()) }).await.unwrap();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.snapshot().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        let _ = breaker.call(async { Err::<(), _>(failed()) }).await;
        assert_eq!(breaker.state(), BreakerState::Open);

        tokio::time::advance(Duration::from_secs(60)).await;
        let _ = breaker.call(async { Err::<(), _>(failed()) }).await;

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, BreakerState::Open);
        assert_eq!(snapshot.retry_in_secs, Some(60));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = retry(5, false);
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(16));
        assert_eq!(policy.delay_for(5), Duration::from_secs(30));

        let jittered = retry(5, true);
        for _ in 0..20 {
            let delay = jittered.delay_for(2);
            assert!(delay >= Duration::from_secs(2) && delay <= Duration::from_secs(4));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_from_transient_failures() {
        let attempts = AtomicU32::new(0);
        let result = retry(3, false)
            .run(|attempt| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async move { if attempt < 3 { Err(failed()) } else { Ok(attempt) } }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_on_non_transient() {
        let attempts = AtomicU32::new(0);
        let result = retry(3, false)
            .run(|_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ExecutionError::new(ExecutionErrorCode::DataDirNotFound, "missing")) }
            })
            .await;

        assert_eq!(result.unwrap_err().code, ExecutionErrorCode::DataDirNotFound);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pipeline_timeout_is_counted_and_not_retried() {
        let pipeline = PolicyPipeline::new(
            TimeoutPolicy::new(Duration::from_secs(10)),
            CircuitBreaker::new(3, Duration::from_secs(300)),
            retry(3, false),
        );
        let attempts = AtomicU32::new(0);

        let err = pipeline
            .run(|_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok::<_, ExecutionError>(())
                }
            })
            .await
            .unwrap_err();

        assert_eq!(err.code, ExecutionErrorCode::Timeout);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.breaker().snapshot().consecutive_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pipeline_stops_retrying_once_breaker_opens() {
        let pipeline = PolicyPipeline::new(
            TimeoutPolicy::new(Duration::from_secs(10)),
            CircuitBreaker::new(2, Duration::from_secs(300)),
            retry(3, false),
        );
        let attempts = AtomicU32::new(0);

        let err = pipeline
            .run(|_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(failed()) }
            })
            .await
            .unwrap_err();

        assert_eq!(err.code, ExecutionErrorCode::CircuitOpen);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(pipeline.breaker().state(), BreakerState::Open);
    }
}
