//! Bounded consistency sweep.
//!
//! After a transition the record may not be visible yet in the feed that
//! should show it (replica or cache lag). [`ConsistencySweep::run`]
//! re-probes a fixed number of times with exponentially growing,
//! capped and optionally jittered delays, and reports whether the
//! expected state was observed. A miss is not an error: the caller falls
//! back to a full reload, and the miss is logged and counted.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

/// Tunable parameters for the sweep's backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Number of probes; the sweep never issues more.
    pub attempts: u32,
    /// Delay before the first probe.
    pub initial_delay: Duration,
    /// Upper bound on the delay before any probe.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each probe.
    pub multiplier: f64,
    /// Randomize each delay within its upper half.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(4500),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Calculate the next backoff delay from the current delay and policy.
///
/// The result is clamped to [`RetryPolicy::max_delay`].
pub fn next_delay(current: Duration, policy: &RetryPolicy) -> Duration {
    let next_ms = (current.as_millis() as f64 * policy.multiplier) as u64;
    Duration::from_millis(next_ms).min(policy.max_delay)
}

impl RetryPolicy {
    /// The un-jittered delay before each probe.
    pub fn schedule(&self) -> Vec<Duration> {
        let mut delays = Vec::with_capacity(self.attempts as usize);
        let mut delay = self.initial_delay.min(self.max_delay);
        for _ in 0..self.attempts {
            delays.push(delay);
            delay = next_delay(delay, self);
        }
        delays
    }

    /// Apply jitter to `delay`: a uniform pick in `[delay / 2, delay]`.
    fn jittered(&self, delay: Duration) -> Duration {
        if !self.jitter {
            return delay;
        }
        let ms = delay.as_millis() as u64;
        let half = ms / 2;
        Duration::from_millis(half + rand::rng().random_range(0..=ms - half))
    }
}

/// Result of one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// The probe saw the expected state on this (1-based) attempt.
    Observed { attempt: u32 },
    /// Every attempt ran without seeing it.
    Missed { attempts: u32 },
    /// The sweep was cancelled before finishing.
    Cancelled,
}

/// Runs sweeps under one policy and counts misses.
#[derive(Debug, Default)]
pub struct ConsistencySweep {
    policy: RetryPolicy,
    misses: AtomicU64,
}

impl ConsistencySweep {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            misses: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Total consistency misses since creation.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Probe until `probe` returns `Ok(true)` or the attempts run out.
    ///
    /// `probe` receives the 1-based attempt number. Probe errors count as
    /// "not observed yet" and are logged at debug.
    pub async fn run<F, Fut, E>(
        &self,
        label: &str,
        mut probe: F,
        cancel: &CancellationToken,
    ) -> SweepOutcome
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<bool, E>>,
        E: Display,
    {
        for (index, delay) in self.policy.schedule().into_iter().enumerate() {
            let attempt = index as u32 + 1;
            let delay = self.policy.jittered(delay);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(label, attempt, "Consistency sweep cancelled");
                    return SweepOutcome::Cancelled;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            match probe(attempt).await {
                Ok(true) => {
                    tracing::debug!(label, attempt, "Consistency sweep observed expected state");
                    return SweepOutcome::Observed { attempt };
                }
                Ok(false) => {
                    tracing::debug!(
                        label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Expected state not visible yet",
                    );
                }
                Err(e) => {
                    tracing::debug!(label, attempt, error = %e, "Consistency probe failed");
                }
            }
        }

        let total = self.misses.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::warn!(
            label,
            attempts = self.policy.attempts,
            total_misses = total,
            "Consistency miss, falling back to full reload",
        );
        SweepOutcome::Missed {
            attempts: self.policy.attempts,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
