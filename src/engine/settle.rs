//! Bounded waiting for on-chain state to settle.
//!
//! All waits go through the `Pause` trait so tests can substitute a
//! zero-delay clock. Polling is always capped by a `RetryPolicy`.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Attempt budget for a polled read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    pub fn from_millis(attempts: u32, delay_ms: u64) -> Self {
        Self::new(attempts, Duration::from_millis(delay_ms))
    }

    /// A single attempt with no waiting.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

#[async_trait]
pub trait Pause: Send + Sync {
    async fn pause(&self, duration: Duration);
}

/// Real wall-clock waiting.
pub struct TokioPause;

#[async_trait]
impl Pause for TokioPause {
    async fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Zero-delay clock. Still yields to the scheduler so other tasks run.
pub struct NoPause;

#[async_trait]
impl Pause for NoPause {
    async fn pause(&self, _duration: Duration) {
        tokio::task::yield_now().await;
    }
}

/// Poll `probe` until it yields a value or the attempt budget is spent.
///
/// The first attempt runs immediately; the policy delay is paused between
/// attempts. `probe` receives the 1-based attempt number.
pub async fn poll_until<T, F, Fut>(pause: &dyn Pause, policy: RetryPolicy, mut probe: F) -> Option<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        if attempt > 1 {
            pause.pause(policy.delay).await;
        }
        if let Some(value) = probe(attempt).await {
            return Some(value);
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
