//! Status cue driven by connection lifecycle notifications.

use tokio::sync::watch;
use tracing::debug;

/// Receives lifecycle notifications from the connection manager.
pub trait PresentationHook: Send + 'static {
    fn on_connected(&mut self);

    fn on_disconnected(&mut self, reason: &str);

    /// A payload was appended to the log.
    fn on_message(&mut self) {}
}

/// Ignores every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPresentation;

impl PresentationHook for NoPresentation {
    fn on_connected(&mut self) {}

    fn on_disconnected(&mut self, _reason: &str) {}
}

/// Visual cue for the feed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatusCue {
    Offline { reason: Option<String> },
    Live,
    /// At least one message arrived on the current connection.
    Receiving,
}

/// Publishes the current [`StatusCue`] on a watch channel.
#[derive(Debug)]
pub struct StatusLight {
    tx: watch::Sender<StatusCue>,
}

impl Default for StatusLight {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusLight {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(StatusCue::Offline { reason: None });
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusCue> {
        self.tx.subscribe()
    }

    fn publish(&self, cue: StatusCue) {
        self.tx.send_if_modified(|current| {
            if *current == cue {
                return false;
            }
            debug!(cue = ?cue, "status cue changed");
            *current = cue;
            true
        });
    }
}

impl PresentationHook for StatusLight {
    fn on_connected(&mut self) {
        self.publish(StatusCue::Live);
    }

    fn on_disconnected(&mut self, reason: &str) {
        self.publish(StatusCue::Offline {
            reason: Some(reason.to_string()),
        });
    }

    fn on_message(&mut self) {
        self.publish(StatusCue::Receiving);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cue_follows_lifecycle() {
        let mut light = StatusLight::new();
        let mut rx = light.subscribe();
        assert_eq!(*rx.borrow(), StatusCue::Offline { reason: None });

        light.on_connected();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), StatusCue::Live);

        light.on_message();
        light.on_message();
        assert_eq!(*rx.borrow_and_update(), StatusCue::Receiving);

        light.on_message();
        assert!(!rx.has_changed().unwrap());

        light.on_disconnected("code=1006 reason=");
        assert_eq!(
            *rx.borrow_and_update(),
            StatusCue::Offline {
                reason: Some("code=1006 reason=".to_string())
            }
        );
    }
}
