//! Bounded polling policy

use std::future::Future;
use std::time::Duration;

/// Fixed-interval retry policy for the artifact search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    /// 12 attempts, 5 seconds apart
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 12,
        }
    }
}

/// Result of running a [`PollPolicy`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Found { value: T, attempt: u32 },
    Exhausted { attempts: u32 },
}

impl PollPolicy {
    /// Ceiling on time spent polling when nothing is ever found
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }

    /// Call `attempt` until it yields a value or the attempts run out.
    ///
    /// The interval elapses after every unsuccessful attempt, including the
    /// last, so an exhausted poll always takes [`PollPolicy::budget`].
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> PollOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        for n in 1..=self.max_attempts {
            if let Some(value) = attempt(n).await {
                return PollOutcome::Found { value, attempt: n };
            }
            tokio::time::sleep(self.interval).await;
        }
        PollOutcome::Exhausted {
            attempts: self.max_attempts,
        }
    }
}
