use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async as tungstenite_connect,
    tungstenite::{
        Message as TungsteniteMessage,
        protocol::CloseFrame as TungCloseFrame,
    },
};

use crate::core::{FeedError, WsCloseFrame, WsFrame};
use crate::transport::{WsTransport, WsTransportConnectFuture};

pub(crate) fn map_ws_error(context: &'static str, err: impl ToString) -> FeedError {
    FeedError::Transport {
        context,
        error: err.to_string(),
    }
}

pub(crate) fn close_to_core(frame: Option<TungCloseFrame>) -> Option<WsCloseFrame> {
    frame.map(|f| WsCloseFrame {
        code: u16::from(f.code),
        reason: AsRef::<Bytes>::as_ref(&f.reason).clone(),
    })
}

/// `None` for raw frames, which tungstenite only produces on the write side.
pub(crate) fn msg_to_frame(msg: TungsteniteMessage) -> Option<WsFrame> {
    let frame = match msg {
        TungsteniteMessage::Text(text) => WsFrame::Text(AsRef::<Bytes>::as_ref(&text).clone()),
        TungsteniteMessage::Binary(bytes) => WsFrame::Binary(bytes),
        TungsteniteMessage::Ping(bytes) => WsFrame::Ping(bytes),
        TungsteniteMessage::Pong(bytes) => WsFrame::Pong(bytes),
        TungsteniteMessage::Close(frame) => WsFrame::Close(close_to_core(frame)),
        TungsteniteMessage::Frame(_) => return None,
    };
    Some(frame)
}

/// Plain `ws://` transport over tokio-tungstenite.
#[derive(Clone, Copy, Debug, Default)]
pub struct TungsteniteTransport;

/// Whole (unsplit) websocket stream, so tungstenite keeps answering pings on read.
pub struct TungsteniteReader {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Stream for TungsteniteReader {
    type Item = Result<WsFrame, FeedError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            return match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(msg))) => match msg_to_frame(msg) {
                    Some(frame) => Poll::Ready(Some(Ok(frame))),
                    None => continue,
                },
                Poll::Ready(Some(Err(err))) => Poll::Ready(Some(Err(map_ws_error("read", err)))),
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            };
        }
    }
}

impl WsTransport for TungsteniteTransport {
    type Reader = TungsteniteReader;

    fn connect(&self, url: String) -> WsTransportConnectFuture<Self::Reader> {
        Box::pin(async move {
            let (stream, _) = tungstenite_connect(url)
                .await
                .map_err(|e| map_ws_error("connect", e))?;
            Ok(TungsteniteReader { inner: stream })
        })
    }
}
