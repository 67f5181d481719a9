//! Reusable test utilities for exercising the connection manager without a real socket.
//!
//! [`MockTransport::channel_pair`] yields the transport handed to the manager and a
//! [`MockServer`] through which a test sees every connect attempt, decides whether the
//! handshake succeeds, and then pushes frames or kills the resulting connection.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::core::{FeedError, WsFrame};
use crate::transport::{WsTransport, WsTransportConnectFuture};

/// A transport backed by in-memory channels.
#[derive(Clone)]
pub struct MockTransport {
    attempts_tx: mpsc::UnboundedSender<MockAttempt>,
}

impl MockTransport {
    /// Build a transport + server control pair.
    pub fn channel_pair() -> (Self, MockServer) {
        let (attempts_tx, attempts_rx) = mpsc::unbounded_channel();
        (Self { attempts_tx }, MockServer { attempts_rx })
    }
}

impl WsTransport for MockTransport {
    type Reader = MockReader;

    fn connect(&self, url: String) -> WsTransportConnectFuture<Self::Reader> {
        let attempts_tx = self.attempts_tx.clone();
        Box::pin(async move {
            let (reply, reply_rx) = oneshot::channel();
            attempts_tx
                .send(MockAttempt {
                    url,
                    at: Instant::now(),
                    reply,
                })
                .map_err(|_| FeedError::InvalidState("mock server dropped".to_string()))?;
            reply_rx.await.map_err(|_| FeedError::Transport {
                context: "mock_connect",
                error: "attempt dropped without an answer".to_string(),
            })?
        })
    }
}

/// Error surface for operations on [`MockConnection`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MockServerError {
    /// The socket was already closed or dropped by the test.
    SocketDropped,
    /// The reader side is gone.
    ChannelClosed,
}

impl std::fmt::Display for MockServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MockServerError::SocketDropped => f.write_str("mock socket already dropped"),
            MockServerError::ChannelClosed => f.write_str("mock reader channel is closed"),
        }
    }
}

impl std::error::Error for MockServerError {}

/// Server-side test handle paired with [`MockTransport`].
pub struct MockServer {
    attempts_rx: mpsc::UnboundedReceiver<MockAttempt>,
}

impl MockServer {
    /// Wait for the manager's next connect attempt.
    pub async fn next_attempt(&mut self) -> Option<MockAttempt> {
        self.attempts_rx.recv().await
    }

    pub async fn next_attempt_timeout(&mut self, timeout: Duration) -> Option<MockAttempt> {
        tokio::time::timeout(timeout, self.attempts_rx.recv())
            .await
            .unwrap_or_default()
    }

    /// Attempt already queued, without waiting.
    pub fn try_next_attempt(&mut self) -> Option<MockAttempt> {
        self.attempts_rx.try_recv().ok()
    }
}

/// One pending handshake.
pub struct MockAttempt {
    url: String,
    at: Instant,
    reply: oneshot::Sender<Result<MockReader, FeedError>>,
}

impl MockAttempt {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// When the manager started this attempt.
    pub fn at(&self) -> Instant {
        self.at
    }

    /// Complete the handshake.
    pub fn accept(self) -> MockConnection {
        let (inbound_tx, rx) = mpsc::unbounded_channel();
        let _ = self.reply.send(Ok(MockReader { rx }));
        MockConnection {
            inbound_tx: Some(inbound_tx),
        }
    }

    /// Fail the handshake.
    pub fn reject(self, error: impl Into<String>) {
        let _ = self.reply.send(Err(FeedError::Transport {
            context: "connect",
            error: error.into(),
        }));
    }
}

/// Server side of an accepted mock connection.
pub struct MockConnection {
    inbound_tx: Option<mpsc::UnboundedSender<WsFrame>>,
}

impl MockConnection {
    /// Push an inbound frame to the client.
    pub fn send_inbound(&self, frame: WsFrame) -> Result<(), MockServerError> {
        let Some(tx) = self.inbound_tx.as_ref() else {
            return Err(MockServerError::SocketDropped);
        };
        tx.send(frame).map_err(|_| MockServerError::ChannelClosed)
    }

    /// Push a UTF-8 payload as websocket text.
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), MockServerError> {
        self.send_inbound(WsFrame::text(text))
    }

    /// Send a close frame and hang up.
    pub fn close(&mut self, code: u16, reason: &str) -> Result<(), MockServerError> {
        let sent = self.send_inbound(WsFrame::close(code, reason));
        self.inbound_tx = None;
        sent
    }

    /// Simulate a dropped socket: the client stream simply ends.
    pub fn drop_socket(&mut self) {
        self.inbound_tx = None;
    }

    /// Whether the client side has released the connection.
    pub fn is_released(&self) -> bool {
        self.inbound_tx.as_ref().is_none_or(|tx| tx.is_closed())
    }
}

/// Reader side for [`MockTransport`].
pub struct MockReader {
    rx: mpsc::UnboundedReceiver<WsFrame>,
}

impl futures_util::Stream for MockReader {
    type Item = Result<WsFrame, FeedError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.rx).poll_recv(cx) {
            Poll::Ready(Some(frame)) => Poll::Ready(Some(Ok(frame))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
