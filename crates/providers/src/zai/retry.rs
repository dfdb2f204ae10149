use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::sleep;
use tracing::{info, warn};
use zchat_core::ChatError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub ceiling: Duration,
}

impl Backoff {
    /// `min(ceiling, base * 2^attempt)` for a 0-indexed attempt.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.ceiling, |d| d.min(self.ceiling))
    }

    /// Perturb the base delay by `jitter` in `[-1, 1]`, scaled to half the
    /// delay, and keep the result under the ceiling.
    pub fn jittered(&self, attempt: u32, jitter: f64) -> Duration {
        let delay = self.base_delay(attempt);
        let j = if jitter.is_finite() {
            jitter.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        let secs = delay.as_secs_f64() * (1.0 + 0.5 * j);
        Duration::from_secs_f64(secs.max(0.0)).min(self.ceiling)
    }
}

/// `sin` of the wall clock in nanoseconds.
pub fn clock_jitter() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    (nanos as f64).sin()
}

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub backoff: Backoff,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff {
                base: Duration::from_secs(1),
                ceiling: Duration::from_secs(30),
            },
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        if self.jitter {
            self.backoff.jittered(attempt, clock_jitter())
        } else {
            self.backoff.base_delay(attempt)
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out. `op` receives the 0-indexed attempt number.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, ChatError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ChatError>>,
    {
        let mut attempt = 0u32;
        loop {
            match op(attempt).await {
                Ok(v) => {
                    if attempt > 0 {
                        info!(target:"providers::zai","request succeeded on attempt {}", attempt + 1);
                    }
                    return Ok(v);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= self.max_retries => {
                    return Err(ChatError::RetriesExhausted {
                        attempts: attempt + 1,
                        source: Box::new(e),
                    });
                }
                Err(e) => {
                    let delay = self.delay(attempt);
                    warn!(target:"providers::zai","attempt {} failed: {}; retrying in {:?}", attempt + 1, e, delay);
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
