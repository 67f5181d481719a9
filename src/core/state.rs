//! Reconnect state machine.
//!
//! Pure bookkeeping: the connection manager feeds lifecycle events in and
//! performs the side effects (connect, clear, append, schedule) itself.

/// Named states of a single logical connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Spawned, `Start` not received yet.
    Idle,
    Connecting,
    Connected,
    /// Closed; a retry timer is pending.
    Reconnecting,
}

/// Lifecycle inputs understood by the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    Start,
    Opened,
    Closed,
    RetryDue,
}

impl ConnectionState {
    /// Transition function. `None` means the event is not valid in this state.
    pub fn on(self, event: LifecycleEvent) -> Option<ConnectionState> {
        use ConnectionState::*;
        use LifecycleEvent::*;
        match (self, event) {
            (Idle, Start) => Some(Connecting),
            (Connecting, Opened) => Some(Connected),
            (Connecting, Closed) | (Connected, Closed) => Some(Reconnecting),
            (Reconnecting, RetryDue) => Some(Connecting),
            _ => None,
        }
    }
}

/// Identifies one connection attempt. Events tagged with an older epoch are stale.
pub type ConnectionEpoch = u64;

/// State, attempt counter and epoch of the current connection handle.
#[derive(Debug)]
pub struct ReconnectMachine {
    state: ConnectionState,
    attempt_count: u64,
    epoch: ConnectionEpoch,
}

impl Default for ReconnectMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconnectMachine {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Idle,
            attempt_count: 0,
            epoch: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempt_count(&self) -> u64 {
        self.attempt_count
    }

    pub fn epoch(&self) -> ConnectionEpoch {
        self.epoch
    }

    /// `Start` from `Idle`. Returns the epoch of the new connection attempt.
    pub fn start(&mut self) -> Option<ConnectionEpoch> {
        self.begin(LifecycleEvent::Start)
    }

    /// Retry timer for `epoch` fired. Returns the epoch of the new connection attempt.
    pub fn retry_due(&mut self, epoch: ConnectionEpoch) -> Option<ConnectionEpoch> {
        if epoch != self.epoch {
            return None;
        }
        self.begin(LifecycleEvent::RetryDue)
    }

    /// The transport for `epoch` opened. Resets the attempt counter.
    pub fn opened(&mut self, epoch: ConnectionEpoch) -> bool {
        if epoch != self.epoch {
            return false;
        }
        let Some(next) = self.state.on(LifecycleEvent::Opened) else {
            return false;
        };
        self.state = next;
        self.attempt_count = 0;
        true
    }

    /// The transport for `epoch` closed (before or after opening).
    ///
    /// Returns the incremented attempt counter when the close is accepted.
    pub fn closed(&mut self, epoch: ConnectionEpoch) -> Option<u64> {
        if epoch != self.epoch {
            return None;
        }
        let next = self.state.on(LifecycleEvent::Closed)?;
        self.state = next;
        self.attempt_count = self.attempt_count.saturating_add(1);
        Some(self.attempt_count)
    }

    /// Whether an inbound frame from `epoch` belongs to the live connection.
    pub fn accepts_frames_from(&self, epoch: ConnectionEpoch) -> bool {
        epoch == self.epoch && self.state == ConnectionState::Connected
    }

    fn begin(&mut self, event: LifecycleEvent) -> Option<ConnectionEpoch> {
        let next = self.state.on(event)?;
        self.state = next;
        self.epoch = self.epoch.wrapping_add(1);
        Some(self.epoch)
    }
}
