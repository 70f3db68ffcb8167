//! Bounded poll-with-backoff
//!
//! Every suspension in the engine goes through [`Poller`]: the caller probes,
//! then asks the poller whether there is time left for another probe. The
//! interval doubles up to a ceiling and the final sleep is clipped to the
//! deadline, so a wait never outlives its timeout.

use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::bridge::{BackendError, BrowserBackend, WaitCondition};
use crate::workflow::config::TimeoutConfig;

/// Poll interval policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub initial: Duration,
    pub max: Duration,
}

/// Shortest interval between probes
const MIN_POLL: Duration = Duration::from_millis(1);

impl PollPolicy {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.max(MIN_POLL);
        Self {
            initial,
            max: max.max(initial),
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(50), Duration::from_millis(500))
    }
}

impl From<&TimeoutConfig> for PollPolicy {
    fn from(config: &TimeoutConfig) -> Self {
        Self::new(
            Duration::from_millis(config.poll_ms),
            Duration::from_millis(config.max_poll_ms),
        )
    }
}

/// Deadline tracker for one bounded wait
#[derive(Debug)]
pub struct Poller {
    deadline: Instant,
    interval: Duration,
    max: Duration,
    probes: u32,
}

impl Poller {
    pub fn new(timeout: Duration, policy: &PollPolicy) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            interval: policy.initial,
            max: policy.max,
            probes: 0,
        }
    }

    /// Sleep before the next probe. Returns `false` once the deadline has
    /// passed, in which case no sleep happens.
    pub async fn tick(&mut self) -> bool {
        self.probes += 1;
        let now = Instant::now();
        if now >= self.deadline {
            return false;
        }
        let pause = self.interval.min(self.deadline - now);
        tokio::time::sleep(pause).await;
        self.interval = (self.interval * 2).min(self.max);
        true
    }

    /// Number of completed probe rounds
    pub fn probes(&self) -> u32 {
        self.probes
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("Timed out after {}ms waiting for {condition}", .timeout.as_millis())]
    Timeout { condition: String, timeout: Duration },

    #[error("{0}")]
    Backend(#[from] BackendError),
}

fn describe(condition: &WaitCondition) -> String {
    match condition {
        WaitCondition::Visible(handle) => format!("element {} to be visible", handle),
        WaitCondition::Hidden(handle) => format!("element {} to be hidden", handle),
        WaitCondition::NavigationComplete => "navigation to complete".to_string(),
        WaitCondition::UrlContains(fragment) => format!("URL to contain '{}'", fragment),
    }
}

/// Probe `condition` until it holds or `timeout` elapses
pub async fn wait_for(
    backend: &mut dyn BrowserBackend,
    condition: &WaitCondition,
    timeout: Duration,
    policy: &PollPolicy,
) -> Result<(), WaitError> {
    let mut poller = Poller::new(timeout, policy);
    loop {
        if backend.probe(condition).await? {
            debug!("Condition met after {} polls: {}", poller.probes(), describe(condition));
            return Ok(());
        }
        if !poller.tick().await {
            return Err(WaitError::Timeout {
                condition: describe(condition),
                timeout,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_poller_respects_deadline() {
        let policy = PollPolicy::new(Duration::from_millis(5), Duration::from_millis(20));
        let timeout = Duration::from_millis(60);
        let started = Instant::now();
        let mut poller = Poller::new(timeout, &policy);
        let mut ticks = 0;
        while poller.tick().await {
            ticks += 1;
        }
        assert!(ticks >= 1);
        assert!(started.elapsed() >= timeout);
        assert_eq!(poller.probes(), ticks + 1);
    }

    #[tokio::test]
    async fn test_zero_timeout_never_sleeps() {
        let mut poller = Poller::new(Duration::ZERO, &PollPolicy::default());
        assert!(!poller.tick().await);
        assert_eq!(poller.probes(), 1);
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let policy = PollPolicy::new(Duration::ZERO, Duration::ZERO);
        assert_eq!(policy.initial, Duration::from_millis(1));
        assert_eq!(policy.max, Duration::from_millis(1));

        let mut poller = Poller::new(Duration::from_millis(20), &policy);
        let ticks = tokio_test::block_on(async {
            let mut ticks = 0;
            while poller.tick().await {
                ticks += 1;
            }
            ticks
        });
        assert!(ticks <= 25, "spun {} times", ticks);
    }

    #[test]
    fn test_policy_ceiling_not_below_initial() {
        let policy = PollPolicy::new(Duration::from_millis(100), Duration::from_millis(10));
        assert_eq!(policy.max, Duration::from_millis(100));
    }
}
