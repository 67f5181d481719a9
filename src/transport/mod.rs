use std::future::Future;
use std::pin::Pin;

use futures_util::Stream;

use crate::core::{FeedError, WsFrame};

pub mod tungstenite;

/// Future returned by [`WsTransport::connect`].
pub type WsTransportConnectFuture<R> = Pin<Box<dyn Future<Output = Result<R, FeedError>> + Send>>;

/// Transport boundary for websocket IO.
///
/// The returned stream is the connection handle: dropping it closes the connection.
/// The feed is inbound-only, so no writer half is exposed.
pub trait WsTransport: Clone + Send + Sync + 'static {
    type Reader: Stream<Item = Result<WsFrame, FeedError>> + Send + Unpin + 'static;

    fn connect(&self, url: String) -> WsTransportConnectFuture<Self::Reader>;
}
