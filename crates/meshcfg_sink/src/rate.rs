//! Admission rate limiting for new streams.

use crate::error::RateLimitError;
use async_trait::async_trait;
use meshcfg_event::CancellationToken;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Wait for a permit; fails if `cancel` fires first.
    async fn wait(&self, cancel: &CancellationToken) -> Result<(), RateLimitError>;
}

/// Never waits.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

#[async_trait]
impl RateLimiter for Unlimited {
    async fn wait(&self, _cancel: &CancellationToken) -> Result<(), RateLimitError> {
        Ok(())
    }
}

/// Token bucket refilled at `rate` permits per second, holding at most `burst`.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last: Instant,
}

impl TokenBucket {
    /// A `rate` of zero admits only the initial burst.
    pub fn new(rate: f64, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            rate: rate.max(0.0),
            burst,
            state: Mutex::new(BucketState {
                tokens: burst,
                last: Instant::now(),
            }),
        }
    }

    /// Take a token now, or report how long until one is available.
    fn reserve(&self) -> Result<(), Option<Duration>> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.burst);
        state.last = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return Ok(());
        }
        if self.rate == 0.0 {
            return Err(None);
        }
        Err(Some(Duration::from_secs_f64((1.0 - state.tokens) / self.rate)))
    }
}

#[async_trait]
impl RateLimiter for TokenBucket {
    async fn wait(&self, cancel: &CancellationToken) -> Result<(), RateLimitError> {
        loop {
            if cancel.is_cancelled() {
                return Err(RateLimitError::Cancelled);
            }
            let delay = match self.reserve() {
                Ok(()) => return Ok(()),
                Err(delay) => delay,
            };
            match delay {
                Some(delay) => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(RateLimitError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => {
                    cancel.cancelled().await;
                    return Err(RateLimitError::Cancelled);
                }
            }
        }
    }
}
