//! Server-side websocket peer used by integration tests and local demos.
//!
//! The feed itself never sends; this wrapper exists so a test can stand up a
//! throwaway endpoint that pushes payloads to the client.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    WebSocketStream, accept_async as tungstenite_accept,
    tungstenite::{
        Message as TungsteniteMessage,
        protocol::{CloseFrame as TungCloseFrame, frame::coding::CloseCode},
    },
};

use crate::core::{FeedError, WsFrame};
use crate::transport::tungstenite::{map_ws_error, msg_to_frame};

/// Accepted websocket connection, hiding tungstenite types.
pub struct WsPeer {
    inner: WebSocketStream<TcpStream>,
}

impl WsPeer {
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<(), FeedError> {
        self.inner
            .send(TungsteniteMessage::text(text.into()))
            .await
            .map_err(|e| map_ws_error("write", e))
    }

    /// Send a close frame and flush it.
    pub async fn close(&mut self, code: u16, reason: &str) -> Result<(), FeedError> {
        let frame = TungCloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        self.inner
            .close(Some(frame))
            .await
            .map_err(|e| map_ws_error("close", e))
    }

    /// Next frame from the client; raw frames are skipped.
    pub async fn next(&mut self) -> Option<Result<WsFrame, FeedError>> {
        loop {
            match self.inner.next().await? {
                Ok(msg) => {
                    if let Some(frame) = msg_to_frame(msg) {
                        return Some(Ok(frame));
                    }
                }
                Err(e) => return Some(Err(map_ws_error("read", e))),
            }
        }
    }
}

/// Accept an incoming websocket connection.
pub async fn accept_async(stream: TcpStream) -> Result<WsPeer, FeedError> {
    let ws = tungstenite_accept(stream)
        .await
        .map_err(|err| map_ws_error("accept", err))?;
    Ok(WsPeer { inner: ws })
}

/// Accept an incoming websocket connection and report the request path (with query).
pub async fn accept_with_path(stream: TcpStream) -> Result<(WsPeer, String), FeedError> {
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    let mut path = String::new();
    let record_path = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        path = req.uri().to_string();
        Ok(resp)
    };
    let ws = tokio_tungstenite::accept_hdr_async(stream, record_path)
        .await
        .map_err(|err| map_ws_error("accept", err))?;
    Ok((WsPeer { inner: ws }, path))
}
