//! # Retry Module
//!
//! A generic retry-with-exponential-backoff combinator. It knows nothing about
//! the embedding API: callers hand it a classification function that decides
//! which errors are worth another attempt.
//!
//! ## Key Components
//!
//! - `RetryPolicy`: attempt budget and backoff shape
//! - `Backoff`: iterator of fuzzed, exponentially growing sleep intervals
//! - `RetryAttempt`: what an observer learns about each scheduled retry
//! - `Retrier`: backoff state driven by a caller-owned loop
//! - `retry_with_backoff`: the combinator for operations that own their state
//!
//! Callers whose attempts borrow `&mut self`, like the request dispatcher, drive
//! a `Retrier` from their own loop. `retry_with_backoff` wraps the same `Retrier`
//! for operations that can hand out an owned future per attempt.
//!
//! Backoff intervals are fuzzed downwards only. Each interval falls in
//! `[current * (1 - fuzz), current)`, and `current` grows by `factor` after every
//! interval. With `factor * (1 - fuzz) >= 1`, which config validation enforces,
//! consecutive delays are strictly increasing until they reach `max_delay_ms`.

use std::future::Future;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ErrorClass;

/// Marker returned when a wait is interrupted by a cancellation token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Attempt budget and backoff shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,

    /// Upper bound of the first backoff interval in milliseconds
    pub initial_delay_ms: u64,

    /// Growth factor applied after every interval
    pub factor: f64,

    /// Fraction of each interval that is randomized, in `[0, 1]`
    pub fuzz: f64,

    /// Cap for a single interval in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 5_000,
            factor: 2.0,
            fuzz: 0.5,
            max_delay_ms: 3_600_000,
        }
    }
}

impl RetryPolicy {
    /// The intervals to sleep between attempts; yields `max_attempts - 1` items.
    pub fn delays(&self) -> Backoff {
        Backoff {
            current_ms: self.initial_delay_ms as f64,
            remaining: self.max_attempts.saturating_sub(1),
            factor: self.factor,
            fuzz: self.fuzz,
            max_delay_ms: self.max_delay_ms as f64,
            last_ms: None,
            rng: StdRng::from_entropy(),
        }
    }
}

/// Iterator of fuzzed exponential backoff intervals
#[derive(Debug)]
pub struct Backoff {
    current_ms: f64,
    remaining: u32,
    factor: f64,
    fuzz: f64,
    max_delay_ms: f64,
    last_ms: Option<u64>,
    rng: StdRng,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let multiplier = 1.0 - self.fuzz + self.fuzz * self.rng.gen_range(0.0..1.0);
        let delay_ms = (self.current_ms * multiplier).min(self.max_delay_ms);
        self.current_ms *= self.factor;

        // Whole milliseconds, matching the timer resolution. Truncation must not
        // make two intervals equal below the cap.
        let mut delay_ms = delay_ms as u64;
        if let Some(last_ms) = self.last_ms {
            delay_ms = delay_ms.max(last_ms + 1).min(self.max_delay_ms as u64);
        }
        self.last_ms = Some(delay_ms);
        Some(Duration::from_millis(delay_ms))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining as usize, Some(self.remaining as usize))
    }
}

/// A retry that is about to be scheduled
#[derive(Debug)]
pub struct RetryAttempt<'a, E> {
    /// The attempt that just failed, starting at 1
    pub attempt: u32,

    /// How long the combinator will sleep before the next attempt
    pub delay: Duration,

    /// Total backoff so far, including `delay`
    pub elapsed_backoff: Duration,

    /// The error that triggered the retry
    pub last_error: &'a E,
}

/// Sleep for `duration`, returning early with [`Cancelled`] if `cancel` fires.
pub async fn sleep_or_cancel(
    duration: Duration,
    cancel: Option<&CancellationToken>,
) -> Result<(), Cancelled> {
    match cancel {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(Cancelled),
                _ = tokio::time::sleep(duration) => Ok(()),
            }
        }
        None => {
            tokio::time::sleep(duration).await;
            Ok(())
        }
    }
}

/// Backoff state for one retried operation.
///
/// The caller owns the loop: run the operation, and on failure hand the error to
/// [`Retrier::backoff`]. It either sleeps and returns `Ok(())` (try again) or
/// gives the error back (stop). This keeps the operation free to borrow whatever
/// it needs mutably between attempts.
#[derive(Debug)]
pub struct Retrier<E> {
    classify: fn(&E) -> ErrorClass,
    delays: Backoff,
    cancel: Option<CancellationToken>,
    attempt: u32,
    elapsed_backoff: Duration,
}

impl<E: From<Cancelled>> Retrier<E> {
    pub fn new(policy: &RetryPolicy, classify: fn(&E) -> ErrorClass) -> Self {
        Self {
            classify,
            delays: policy.delays(),
            cancel: None,
            attempt: 1,
            elapsed_backoff: Duration::ZERO,
        }
    }

    /// Interrupt backoff sleeps when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: Option<CancellationToken>) -> Self {
        self.cancel = cancel;
        self
    }

    /// The 1-based number of the attempt currently being made.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Total time slept so far.
    pub fn elapsed_backoff(&self) -> Duration {
        self.elapsed_backoff
    }

    /// Decide what to do after a failed attempt.
    ///
    /// Terminal errors and errors arriving after the budget is spent are
    /// returned unchanged. Otherwise `on_retry` is told about the retry, the
    /// backoff interval is slept and `Ok(())` asks the caller to try again.
    pub async fn backoff(
        &mut self,
        error: E,
        on_retry: impl FnOnce(&RetryAttempt<'_, E>),
    ) -> Result<(), E> {
        if (self.classify)(&error) == ErrorClass::Terminal {
            return Err(error);
        }
        let Some(delay) = self.delays.next() else {
            return Err(error);
        };
        self.elapsed_backoff += delay;

        on_retry(&RetryAttempt {
            attempt: self.attempt,
            delay,
            elapsed_backoff: self.elapsed_backoff,
            last_error: &error,
        });
        drop(error);

        sleep_or_cancel(delay, self.cancel.as_ref()).await?;
        self.attempt += 1;
        Ok(())
    }
}

/// Run `op` until it succeeds, fails terminally, or the attempt budget runs out.
///
/// `op` receives the 1-based attempt number and returns an owned future. When
/// the budget is exhausted the last transient error is returned. `on_retry` is
/// called once per scheduled retry, before the backoff sleep.
pub async fn retry_with_backoff<T, E, O, F, Fut>(
    policy: &RetryPolicy,
    classify: fn(&E) -> ErrorClass,
    mut on_retry: O,
    cancel: Option<CancellationToken>,
    mut op: F,
) -> Result<T, E>
where
    E: From<Cancelled>,
    O: FnMut(&RetryAttempt<'_, E>),
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut retrier = Retrier::new(policy, classify).with_cancellation(cancel);
    loop {
        match op(retrier.attempt()).await {
            Ok(value) => return Ok(value),
            Err(error) => retrier.backoff(error, &mut on_retry).await?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Flaky(u32),
        Fatal,
        Cancelled,
    }

    impl From<Cancelled> for TestError {
        fn from(_: Cancelled) -> Self {
            TestError::Cancelled
        }
    }

    fn classify(error: &TestError) -> ErrorClass {
        match error {
            TestError::Flaky(_) => ErrorClass::Transient,
            _ => ErrorClass::Terminal,
        }
    }

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            initial_delay_ms: 100,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_delays_strictly_increasing() {
        let delays: Vec<Duration> = RetryPolicy::default().delays().collect();
        assert_eq!(delays.len(), 4);
        for pair in delays.windows(2) {
            assert!(pair[0] < pair[1], "{:?} should be shorter than {:?}", pair[0], pair[1]);
        }
        assert!(delays[0] >= Duration::from_millis(2_500));
        assert!(delays[0] < Duration::from_millis(5_000));
    }

    #[test]
    fn test_delays_without_fuzz() {
        let policy = RetryPolicy {
            max_attempts: 4,
            initial_delay_ms: 10,
            fuzz: 0.0,
            max_delay_ms: 30,
            ..RetryPolicy::default()
        };
        let delays: Vec<Duration> = policy.delays().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(30),
            ]
        );
    }

    #[test]
    fn test_truncated_delays_still_increase() {
        // 1.5 growth yields fractional milliseconds that truncate to equal values
        let policy = RetryPolicy {
            max_attempts: 8,
            initial_delay_ms: 3,
            factor: 1.5,
            fuzz: 1.0 / 3.0,
            ..RetryPolicy::default()
        };
        for _ in 0..50 {
            let delays: Vec<Duration> = policy.delays().collect();
            for pair in delays.windows(2) {
                assert!(pair[0] < pair[1], "{:?} should be shorter than {:?}", pair[0], pair[1]);
            }
        }
    }

    #[test]
    fn test_flat_policy_without_fuzz_still_increases() {
        let policy = RetryPolicy {
            initial_delay_ms: 100,
            factor: 1.0,
            fuzz: 0.0,
            ..RetryPolicy::default()
        };
        let delays: Vec<Duration> = policy.delays().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(101),
                Duration::from_millis(102),
                Duration::from_millis(103),
            ]
        );
    }

    #[test]
    fn test_single_attempt_has_no_delays() {
        let policy = RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delays().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_budget_on_transient_errors() {
        let policy = quick_policy();
        let mut calls = Vec::new();
        let mut retries = Vec::new();

        let result: Result<(), TestError> = retry_with_backoff(
            &policy,
            classify,
            |retry| retries.push((retry.attempt, retry.delay)),
            None,
            |attempt| {
                calls.push(Instant::now());
                async move { Err(TestError::Flaky(attempt)) }
            },
        )
        .await;

        assert_eq!(result, Err(TestError::Flaky(5)));
        assert_eq!(calls.len(), 5);
        assert_eq!(
            retries.iter().map(|(attempt, _)| *attempt).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );

        let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1] - w[0]).collect();
        for pair in gaps.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_error_is_not_retried() {
        let mut calls = 0;
        let result: Result<(), TestError> = retry_with_backoff(
            &quick_policy(),
            classify,
            |_| panic!("terminal errors must not schedule a retry"),
            None,
            |_| {
                calls += 1;
                async { Err(TestError::Fatal) }
            },
        )
        .await;

        assert_eq!(result, Err(TestError::Fatal));
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_errors() {
        let mut retries = 0;
        let result = retry_with_backoff(
            &quick_policy(),
            classify,
            |_| retries += 1,
            None,
            |attempt| async move {
                if attempt < 3 {
                    Err(TestError::Flaky(attempt))
                } else {
                    Ok(attempt)
                }
            },
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_backoff() {
        let token = CancellationToken::new();
        token.cancel();

        let mut calls = 0;
        let result: Result<(), TestError> = retry_with_backoff(
            &quick_policy(),
            classify,
            |_| {},
            Some(token),
            |attempt| {
                calls += 1;
                async move { Err(TestError::Flaky(attempt)) }
            },
        )
        .await;

        assert_eq!(result, Err(TestError::Cancelled));
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrier_tracks_attempts_and_backoff() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay_ms: 100,
            fuzz: 0.0,
            ..RetryPolicy::default()
        };
        let mut retrier = Retrier::new(&policy, classify);
        assert_eq!(retrier.attempt(), 1);

        retrier.backoff(TestError::Flaky(1), |_| {}).await.unwrap();
        retrier.backoff(TestError::Flaky(2), |_| {}).await.unwrap();
        assert_eq!(retrier.attempt(), 3);
        assert_eq!(retrier.elapsed_backoff(), Duration::from_millis(300));

        let last = retrier.backoff(TestError::Flaky(3), |_| {}).await;
        assert_eq!(last, Err(TestError::Flaky(3)));
    }
}
