use std::time::Duration;

use super::types::WsReconnectStrategy;

/// Delay between a close and the next connect attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Longest a single handshake may take before it counts as a close.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Constant-delay reconnect strategy with unlimited retries.
///
/// No backoff and no jitter: every close is followed by exactly one attempt after the
/// same delay, however many attempts came before it.
#[derive(Clone, Copy, Debug)]
pub struct FixedDelayReconnect {
    delay: Duration,
}

impl FixedDelayReconnect {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for FixedDelayReconnect {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_DELAY)
    }
}

impl WsReconnectStrategy for FixedDelayReconnect {
    fn next_delay(&mut self) -> Duration {
        self.delay
    }

    fn reset(&mut self) {}

    fn should_retry(&self) -> bool {
        true
    }
}
