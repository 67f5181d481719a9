//! Self-healing websocket live feed.
//!
//! A [`feed::ConnectionManager`] actor keeps one connection to
//! `ws://<host>/ws/<channel>?authorization=<token>` alive forever, appending every
//! inbound payload to a [`sink::MessageSink`] and reconnecting a fixed delay after
//! every close.

pub mod client;
pub mod config;
pub mod core;
pub mod feed;
pub mod identity;
pub mod logging;
pub mod presentation;
pub mod sink;
pub mod testing;
pub mod transport;

pub use feed::{ConnectionManager, ConnectionManagerArgs, GetFeedStatus, StartFeed};
