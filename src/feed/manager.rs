//! Connection manager actor.
//!
//! The websocket read loop runs outside kameo; the actor owns the reconnect state
//! machine and the collaborators, and receives frames and lifecycle events as
//! messages. The mailbox is the single event-dispatch loop, so every state
//! mutation happens one event at a time.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::{
    ConnectionEpoch, ConnectionState, DEFAULT_CONNECT_TIMEOUT, EndpointIdentity, FeedError,
    FeedResult, FeedSnapshot, FixedDelayReconnect, FrameDisposition, ReconnectMachine,
    WsReconnectStrategy, classify_frame,
};
use crate::identity::IdentitySource;
use crate::presentation::PresentationHook;
use crate::sink::MessageSink;
use crate::transport::WsTransport;
use crate::transport::tungstenite::TungsteniteTransport;
use kameo::prelude::{Actor, ActorRef, Context, Message as KameoMessage, WeakActorRef};

/// Arguments passed when spawning a [`ConnectionManager`].
pub struct ConnectionManagerArgs<S, P, R = FixedDelayReconnect, T = TungsteniteTransport>
where
    S: MessageSink,
    P: PresentationHook,
    R: WsReconnectStrategy,
    T: WsTransport,
{
    /// `host[:port]` of the streaming endpoint.
    pub host: String,
    pub identity: Box<dyn IdentitySource>,
    pub sink: S,
    pub presentation: P,
    pub reconnect_strategy: R,
    pub transport: T,
    /// A handshake still pending after this long is abandoned and treated as a close.
    pub connect_timeout: Duration,
}

impl<S, P> ConnectionManagerArgs<S, P>
where
    S: MessageSink,
    P: PresentationHook,
{
    /// Production wiring: tungstenite transport, 5000 ms fixed reconnect delay.
    pub fn new(
        host: impl Into<String>,
        identity: impl IdentitySource,
        sink: S,
        presentation: P,
    ) -> Self {
        Self {
            host: host.into(),
            identity: Box::new(identity),
            sink,
            presentation,
            reconnect_strategy: FixedDelayReconnect::default(),
            transport: TungsteniteTransport,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Keeps one logical connection to the feed endpoint alive, forever.
pub struct ConnectionManager<S, P, R = FixedDelayReconnect, T = TungsteniteTransport>
where
    S: MessageSink,
    P: PresentationHook,
    R: WsReconnectStrategy,
    T: WsTransport,
{
    host: String,
    endpoint: EndpointIdentity,
    url: String,
    transport: T,
    connect_timeout: Duration,
    reconnect: R,
    sink: S,
    presentation: P,
    machine: ReconnectMachine,
    actor_ref: ActorRef<Self>,
    /// Reader task of the current connection; it owns the transport stream.
    connection: Option<JoinHandle<()>>,
    pending_connect: Option<JoinHandle<()>>,
    retry_timer: Option<JoinHandle<()>>,
    connects_started: u64,
    messages_received: u64,
}

impl<S, P, R, T> Actor for ConnectionManager<S, P, R, T>
where
    S: MessageSink,
    P: PresentationHook,
    R: WsReconnectStrategy,
    T: WsTransport,
{
    type Args = ConnectionManagerArgs<S, P, R, T>;
    type Error = FeedError;

    fn name() -> &'static str {
        "ConnectionManager"
    }

    async fn on_start(args: Self::Args, ctx: ActorRef<Self>) -> FeedResult<Self> {
        let ConnectionManagerArgs {
            host,
            identity,
            sink,
            presentation,
            reconnect_strategy,
            transport,
            connect_timeout,
        } = args;

        let endpoint = EndpointIdentity::resolve(identity.as_ref());
        if endpoint.channel_id.is_none() {
            warn!(
                host = %host,
                "no channel id could be derived; connecting with a literal null segment"
            );
        }
        let url = endpoint.url(&host);

        Ok(Self {
            host,
            endpoint,
            url,
            transport,
            connect_timeout,
            reconnect: reconnect_strategy,
            sink,
            presentation,
            machine: ReconnectMachine::new(),
            actor_ref: ctx,
            connection: None,
            pending_connect: None,
            retry_timer: None,
            connects_started: 0,
            messages_received: 0,
        })
    }

    async fn on_stop(
        &mut self,
        _ctx: WeakActorRef<Self>,
        _reason: kameo::error::ActorStopReason,
    ) -> FeedResult<()> {
        for task in [
            self.connection.take(),
            self.pending_connect.take(),
            self.retry_timer.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
        info!(url = %self.url, "live feed stopped");
        Ok(())
    }

    fn on_panic(
        &mut self,
        _actor_ref: kameo::actor::WeakActorRef<Self>,
        err: kameo::prelude::PanicError,
    ) -> impl std::future::Future<
        Output = Result<std::ops::ControlFlow<kameo::prelude::ActorStopReason>, Self::Error>,
    > + Send {
        async move {
            tracing::error!(error = ?err, "ConnectionManager panicked");
            Ok(std::ops::ControlFlow::Break(
                kameo::prelude::ActorStopReason::Panicked(err),
            ))
        }
    }
}

/// Leave `Idle` and open the first connection. Ignored in any other state.
#[derive(Clone, Copy, Debug)]
pub struct StartFeed;

/// Ask for a read-only [`FeedSnapshot`].
#[derive(Clone, Copy, Debug)]
pub struct GetFeedStatus;

pub(crate) struct ConnectionEstablished<TR: WsTransport> {
    pub(crate) epoch: ConnectionEpoch,
    pub(crate) reader: TR::Reader,
}

pub(crate) struct ConnectionFailed {
    pub(crate) epoch: ConnectionEpoch,
    pub(crate) error: FeedError,
}

/// Events emitted by the reader and retry-timer tasks.
#[derive(Debug)]
pub(crate) enum ConnectionEvent {
    Inbound {
        epoch: ConnectionEpoch,
        payload: String,
    },
    Closed {
        epoch: ConnectionEpoch,
        cause: FeedError,
    },
    RetryDue {
        epoch: ConnectionEpoch,
    },
}

impl<S, P, R, T> KameoMessage<StartFeed> for ConnectionManager<S, P, R, T>
where
    S: MessageSink,
    P: PresentationHook,
    R: WsReconnectStrategy,
    T: WsTransport,
{
    type Reply = FeedResult<()>;

    async fn handle(
        &mut self,
        _msg: StartFeed,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        match self.machine.start() {
            Some(epoch) => {
                info!(url = %self.url, "starting live feed");
                self.open_connection(epoch);
            }
            None => {
                debug!(state = ?self.machine.state(), "start ignored; feed already running");
            }
        }
        Ok(())
    }
}

impl<S, P, R, T> KameoMessage<GetFeedStatus> for ConnectionManager<S, P, R, T>
where
    S: MessageSink,
    P: PresentationHook,
    R: WsReconnectStrategy,
    T: WsTransport,
{
    type Reply = FeedResult<FeedSnapshot>;

    async fn handle(
        &mut self,
        _msg: GetFeedStatus,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        Ok(FeedSnapshot {
            state: self.machine.state(),
            attempt_count: self.machine.attempt_count(),
            connects_started: self.connects_started,
            messages_received: self.messages_received,
            url: self.url.clone(),
        })
    }
}

impl<S, P, R, T> KameoMessage<ConnectionEstablished<T>> for ConnectionManager<S, P, R, T>
where
    S: MessageSink,
    P: PresentationHook,
    R: WsReconnectStrategy,
    T: WsTransport,
{
    type Reply = FeedResult<()>;

    async fn handle(
        &mut self,
        msg: ConnectionEstablished<T>,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.on_connection_established(msg.epoch, msg.reader);
        Ok(())
    }
}

impl<S, P, R, T> KameoMessage<ConnectionFailed> for ConnectionManager<S, P, R, T>
where
    S: MessageSink,
    P: PresentationHook,
    R: WsReconnectStrategy,
    T: WsTransport,
{
    type Reply = FeedResult<()>;

    async fn handle(
        &mut self,
        msg: ConnectionFailed,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let cause = FeedError::ConnectionLost {
            reason: format!("handshake failed: {}", msg.error),
        };
        self.on_connection_lost(msg.epoch, cause);
        Ok(())
    }
}

impl<S, P, R, T> KameoMessage<ConnectionEvent> for ConnectionManager<S, P, R, T>
where
    S: MessageSink,
    P: PresentationHook,
    R: WsReconnectStrategy,
    T: WsTransport,
{
    type Reply = FeedResult<()>;

    async fn handle(
        &mut self,
        event: ConnectionEvent,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        match event {
            ConnectionEvent::Inbound { epoch, payload } => self.on_inbound(epoch, payload),
            ConnectionEvent::Closed { epoch, cause } => self.on_connection_lost(epoch, cause),
            ConnectionEvent::RetryDue { epoch } => {
                self.retry_timer = None;
                match self.machine.retry_due(epoch) {
                    Some(next) => self.open_connection(next),
                    None => debug!(epoch, "stale retry timer ignored"),
                }
            }
        }
        Ok(())
    }
}

impl<S, P, R, T> ConnectionManager<S, P, R, T>
where
    S: MessageSink,
    P: PresentationHook,
    R: WsReconnectStrategy,
    T: WsTransport,
{
    /// Build the URL and hand the handshake to a background task.
    fn open_connection(&mut self, epoch: ConnectionEpoch) {
        let url = self.endpoint.url(&self.host);
        self.url = url.clone();
        self.connects_started = self.connects_started.saturating_add(1);
        info!(
            url = %url,
            epoch,
            attempt = self.machine.attempt_count(),
            "opening websocket"
        );

        let transport = self.transport.clone();
        let actor_ref = self.actor_ref.clone();
        let connect_timeout = self.connect_timeout;
        self.pending_connect = Some(tokio::spawn(async move {
            let outcome = tokio::time::timeout(connect_timeout, transport.connect(url))
                .await
                .unwrap_or_else(|_elapsed| {
                    Err(FeedError::Transport {
                        context: "connect",
                        error: format!(
                            "handshake timed out after {:.1} seconds",
                            connect_timeout.as_secs_f64()
                        ),
                    })
                });
            match outcome {
                Ok(reader) => {
                    let _ = actor_ref
                        .tell(ConnectionEstablished::<T> { epoch, reader })
                        .send()
                        .await;
                }
                Err(err) => {
                    let _ = actor_ref
                        .tell(ConnectionFailed { epoch, error: err })
                        .send()
                        .await;
                }
            }
        }));
    }

    fn on_connection_established(&mut self, epoch: ConnectionEpoch, reader: T::Reader) {
        self.pending_connect = None;
        if !self.machine.opened(epoch) {
            debug!(epoch, "dropping superseded connection");
            return;
        }

        info!(url = %self.url, epoch, "websocket connection established");
        self.reconnect.reset();
        // Cleared before the reader exists, so nothing from this connection can precede it.
        self.sink.clear();
        self.presentation.on_connected();
        self.spawn_reader(epoch, reader);
    }

    fn spawn_reader(&mut self, epoch: ConnectionEpoch, reader: T::Reader) {
        let actor_ref = self.actor_ref.clone();
        let mut read = reader;
        self.connection = Some(tokio::spawn(async move {
            let reason = loop {
                match read.next().await {
                    Some(Ok(frame)) => match classify_frame(frame) {
                        FrameDisposition::Payload(payload) => {
                            if actor_ref
                                .tell(ConnectionEvent::Inbound { epoch, payload })
                                .send()
                                .await
                                .is_err()
                            {
                                return;
                            }
                        }
                        FrameDisposition::Skip => {
                            debug!(epoch, "skipping non-payload frame");
                        }
                        FrameDisposition::Closed(reason) => break reason,
                    },
                    Some(Err(err)) => break format!("read error: {err}"),
                    None => break "stream ended".to_string(),
                }
            };
            let cause = FeedError::ConnectionLost { reason };
            let _ = actor_ref
                .tell(ConnectionEvent::Closed { epoch, cause })
                .send()
                .await;
        }));
    }

    fn on_inbound(&mut self, epoch: ConnectionEpoch, payload: String) {
        if !self.machine.accepts_frames_from(epoch) {
            debug!(epoch, "dropping frame from superseded connection");
            return;
        }
        debug!(epoch, payload = %payload, "websocket message");
        self.messages_received = self.messages_received.saturating_add(1);
        self.sink.append(payload);
        self.presentation.on_message();
    }

    fn on_connection_lost(&mut self, epoch: ConnectionEpoch, cause: FeedError) {
        let reason = cause.close_reason();
        let was_open = self.machine.state() == ConnectionState::Connected;
        let Some(attempt) = self.machine.closed(epoch) else {
            debug!(epoch, reason = %reason, "close from superseded connection ignored");
            return;
        };
        if let Some(reader) = self.connection.take() {
            reader.abort();
        }
        if let Some(connect) = self.pending_connect.take() {
            connect.abort();
        }

        warn!(
            url = %self.url,
            reason = %reason,
            was_open,
            attempt,
            "websocket closed"
        );
        self.presentation.on_disconnected(&reason);
        self.schedule_reconnect(epoch, attempt);
    }

    fn schedule_reconnect(&mut self, epoch: ConnectionEpoch, attempt: u64) {
        if !self.reconnect.should_retry() {
            warn!(url = %self.url, attempt, "reconnect suppressed by strategy");
            return;
        }

        let delay = self.reconnect.next_delay();
        info!(
            url = %self.url,
            attempt,
            delay_ms = duration_ms(delay),
            "reconnecting in {:.1} seconds",
            delay.as_secs_f64()
        );

        let actor_ref = self.actor_ref.clone();
        self.retry_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = actor_ref
                .tell(ConnectionEvent::RetryDue { epoch })
                .send()
                .await;
        }));
    }
}

fn duration_ms(d: Duration) -> u64 {
    d.as_millis().min(u64::MAX as u128) as u64
}
