//! Chat connection lifecycle.
//!
//! [`WebSocketChatClient`] drives one WebSocket connection for one room:
//!
//! ```text
//! Idle -> Connecting -> Handshaking -> Streaming -> Closing -> Closed
//!                \____________\_____________\______________-> Failed
//! ```
//!
//! A single driver task owns the socket. Heartbeats, outgoing chat and reads
//! are branches of one `select!`, so writes never interleave and no heartbeat
//! can be written once teardown has started. Platform specifics live behind
//! [`DanmuProtocol`].

use async_trait::async_trait;
use futures::{SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use std::fmt;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, trace, warn};

use crate::error::{PlatformError, Result};
use crate::model::{ChatMessage, RoomDetail};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default time to wait for a handshake acknowledgement before streaming anyway.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Handshaking,
    Streaming,
    Closing,
    Closed,
    Failed,
}

impl ConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

/// What a protocol makes of one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    /// The server accepted the handshake.
    HandshakeAck,
    Message(ChatMessage),
}

/// Wire protocol of one platform's chat server.
#[async_trait]
pub trait DanmuProtocol: Send + Sync + 'static {
    /// Platform id (e.g. "bilibili", "douyu")
    fn platform(&self) -> &str;

    /// Resolve the WebSocket URL for a room.
    async fn websocket_url(&self, detail: &RoomDetail) -> Result<String>;

    /// Extra headers for the WebSocket upgrade request.
    fn headers(&self, _detail: &RoomDetail) -> Vec<(String, String)> {
        vec![]
    }

    /// Frames sent right after the transport opens.
    async fn handshake_messages(&self, detail: &RoomDetail) -> Result<Vec<Message>>;

    /// Keep-alive frame, if the protocol has one.
    fn heartbeat_message(&self) -> Option<Message> {
        None
    }

    fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(30)
    }

    /// Decode one inbound frame. Parsing is synchronous.
    fn decode_message(&self, message: &Message) -> Result<Vec<ProtocolEvent>>;

    /// Encode an outgoing chat line. `None` means the protocol is read-only.
    fn encode_chat(&self, _text: &str) -> Option<Message> {
        None
    }
}

/// A live chat feed for one room.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Connect and return the message stream. Only valid once, from `Idle`.
    async fn start(&self, detail: &RoomDetail) -> Result<ChatStream>;

    /// Tear the connection down and complete the stream. Idempotent.
    async fn stop(&self);

    /// Send a chat line. Read-only platforms return `Unsupported`.
    async fn send_message(&self, text: &str) -> Result<()>;

    fn state(&self) -> ConnectionState;
}

/// Push-based stream of chat messages.
///
/// A transport failure arrives as a final `Err`. Dropping the stream cancels
/// the connection.
pub struct ChatStream {
    rx: mpsc::UnboundedReceiver<Result<ChatMessage>>,
    _guard: Option<DropGuard>,
}

impl ChatStream {
    fn new(rx: mpsc::UnboundedReceiver<Result<ChatMessage>>, guard: DropGuard) -> Self {
        Self {
            rx,
            _guard: Some(guard),
        }
    }
}

impl fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatStream")
            .field("closed", &self.rx.is_closed())
            .finish_non_exhaustive()
    }
}

impl Stream for ChatStream {
    type Item = Result<ChatMessage>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

struct Session {
    cancel: CancellationToken,
    outbound: mpsc::UnboundedSender<Message>,
    task: JoinHandle<()>,
}

/// Generic WebSocket chat client parameterized by a platform protocol.
pub struct WebSocketChatClient<P> {
    protocol: Arc<P>,
    handshake_timeout: Duration,
    state: Arc<Mutex<ConnectionState>>,
    session: Mutex<Option<Session>>,
}

impl<P: DanmuProtocol> WebSocketChatClient<P> {
    pub fn new(protocol: P) -> Self {
        Self {
            protocol: Arc::new(protocol),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            state: Arc::new(Mutex::new(ConnectionState::Idle)),
            session: Mutex::new(None),
        }
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }
}

#[async_trait]
impl<P: DanmuProtocol> ChatClient for WebSocketChatClient<P> {
    async fn start(&self, detail: &RoomDetail) -> Result<ChatStream> {
        if detail.platform_id != self.protocol.platform() {
            return Err(PlatformError::invalid_argument(format!(
                "room detail from {} passed to {} chat client",
                detail.platform_id,
                self.protocol.platform()
            )));
        }

        let mut session = self.session.lock();
        {
            let mut state = self.state.lock();
            if *state != ConnectionState::Idle || session.is_some() {
                return Err(PlatformError::invalid_argument(format!(
                    "chat client already started (state {:?})",
                    *state
                )));
            }
            *state = ConnectionState::Connecting;
        }

        let cancel = CancellationToken::new();
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            protocol: self.protocol.clone(),
            detail: detail.clone(),
            state: self.state.clone(),
            cancel: cancel.clone(),
            messages: message_tx,
            outbound: outbound_rx,
            handshake_timeout: self.handshake_timeout,
        };
        let task = tokio::spawn(driver.run());

        *session = Some(Session {
            cancel: cancel.clone(),
            outbound: outbound_tx,
            task,
        });

        Ok(ChatStream::new(message_rx, cancel.drop_guard()))
    }

    async fn stop(&self) {
        let session = self.session.lock().take();
        let Some(session) = session else {
            trace!(platform = self.protocol.platform(), "stop() on inactive chat client");
            return;
        };

        session.cancel.cancel();
        if let Err(e) = session.task.await {
            warn!(error = %e, "Chat driver task ended abnormally");
            *self.state.lock() = ConnectionState::Failed;
        }
    }

    async fn send_message(&self, text: &str) -> Result<()> {
        let message = self.protocol.encode_chat(text).ok_or_else(|| {
            PlatformError::unsupported(format!(
                "{} chat does not accept outgoing messages",
                self.protocol.platform()
            ))
        })?;

        let session = self.session.lock();
        let session = session
            .as_ref()
            .ok_or_else(|| PlatformError::transport("chat client is not connected"))?;
        session
            .outbound
            .send(message)
            .map_err(|_| PlatformError::transport("chat connection already closed"))
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }
}

/// Client for platforms whose chat protocol is not available.
pub struct UnsupportedChatClient {
    platform: &'static str,
}

impl UnsupportedChatClient {
    pub fn new(platform: &'static str) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl ChatClient for UnsupportedChatClient {
    async fn start(&self, _detail: &RoomDetail) -> Result<ChatStream> {
        Err(PlatformError::unsupported(format!(
            "{} chat is not supported",
            self.platform
        )))
    }

    async fn stop(&self) {}

    async fn send_message(&self, _text: &str) -> Result<()> {
        Err(PlatformError::unsupported(format!(
            "{} chat is not supported",
            self.platform
        )))
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::Idle
    }
}

enum Exit {
    /// Local stop, or the consumer went away.
    Cancelled,
    /// The server sent a close frame.
    ClosedByServer,
    Failed(PlatformError),
}

struct Driver<P> {
    protocol: Arc<P>,
    detail: RoomDetail,
    state: Arc<Mutex<ConnectionState>>,
    cancel: CancellationToken,
    messages: mpsc::UnboundedSender<Result<ChatMessage>>,
    outbound: mpsc::UnboundedReceiver<Message>,
    handshake_timeout: Duration,
}

impl<P: DanmuProtocol> Driver<P> {
    fn set_state(&self, state: ConnectionState) {
        trace!(platform = self.protocol.platform(), ?state, "Chat state change");
        *self.state.lock() = state;
    }

    async fn run(mut self) {
        let room_id = self.detail.room_id.clone();
        let platform = self.protocol.platform().to_string();

        let ws = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = self.connect() => Some(result),
        };

        let ws = match ws {
            None => {
                debug!(%platform, %room_id, "Chat stopped before transport opened");
                self.set_state(ConnectionState::Closed);
                return;
            }
            Some(Err(e)) => {
                self.fail(e);
                return;
            }
            Some(Ok(ws)) => ws,
        };

        info!(%platform, %room_id, "Connected to chat server");
        let (mut ws, exit) = self.stream(ws).await;

        match exit {
            Exit::Cancelled => {
                self.set_state(ConnectionState::Closing);
                match tokio::time::timeout(CLOSE_TIMEOUT, ws.close(None)).await {
                    Ok(Err(e)) => debug!(error = %e, "Error closing chat socket"),
                    Err(_) => debug!("Timed out closing chat socket"),
                    Ok(Ok(())) => {}
                }
                info!(%platform, %room_id, "Chat connection closed");
                self.set_state(ConnectionState::Closed);
            }
            Exit::ClosedByServer => {
                info!(%platform, %room_id, "Chat server closed the connection");
                self.set_state(ConnectionState::Closed);
            }
            Exit::Failed(e) => self.fail(e),
        }
    }

    fn fail(&self, error: PlatformError) {
        warn!(
            platform = self.protocol.platform(),
            room_id = %self.detail.room_id,
            error = %error,
            "Chat connection failed"
        );
        self.set_state(ConnectionState::Failed);
        let error = match error {
            e @ PlatformError::Transport(_) => e,
            other => PlatformError::transport(other.to_string()),
        };
        let _ = self.messages.send(Err(error));
    }

    async fn connect(&self) -> Result<WsStream> {
        crate::http::ensure_crypto_provider();
        let url = self.protocol.websocket_url(&self.detail).await?;
        debug!(%url, "Connecting to chat server");

        let mut request = url.as_str().into_client_request()?;
        for (name, value) in self.protocol.headers(&self.detail) {
            match (HeaderName::from_str(&name), HeaderValue::from_str(&value)) {
                (Ok(name), Ok(value)) => {
                    request.headers_mut().insert(name, value);
                }
                _ => debug!(header = %name, "Invalid WebSocket header; skipping"),
            }
        }

        let (ws, _) = connect_async(request).await?;
        Ok(ws)
    }

    async fn stream(&mut self, mut ws: WsStream) -> (WsStream, Exit) {
        self.set_state(ConnectionState::Handshaking);

        let handshake = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return (ws, Exit::Cancelled),
            result = self.protocol.handshake_messages(&self.detail) => result,
        };
        let handshake = match handshake {
            Ok(frames) => frames,
            Err(e) => return (ws, Exit::Failed(e)),
        };
        for frame in handshake {
            if let Err(exit) = self.send(&mut ws, frame).await {
                return (ws, exit);
            }
        }

        let ack_deadline = tokio::time::sleep(self.handshake_timeout);
        tokio::pin!(ack_deadline);
        // None until streaming starts
        let mut heartbeat: Option<Interval> = None;

        let exit = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break Exit::Cancelled,
                _ = &mut ack_deadline, if heartbeat.is_none() => {
                    debug!("No handshake ack before timeout; streaming anyway");
                    heartbeat = Some(self.enter_streaming());
                }
                _ = tick(&mut heartbeat) => {
                    if let Some(frame) = self.protocol.heartbeat_message() {
                        trace!("Sending heartbeat");
                        if let Err(exit) = self.send(&mut ws, frame).await {
                            break exit;
                        }
                    }
                }
                Some(frame) = self.outbound.recv() => {
                    if let Err(exit) = self.send(&mut ws, frame).await {
                        break exit;
                    }
                }
                frame = ws.next() => match frame {
                    Some(Ok(Message::Close(reason))) => {
                        debug!(?reason, "Received close frame");
                        break Exit::ClosedByServer;
                    }
                    Some(Ok(frame)) => {
                        if !self.dispatch(&frame, &mut heartbeat) {
                            break Exit::Cancelled;
                        }
                    }
                    Some(Err(e)) => break Exit::Failed(e.into()),
                    None => break Exit::Failed(PlatformError::transport("connection closed unexpectedly")),
                },
            }
        };

        (ws, exit)
    }

    /// Write one frame. A stalled peer never holds up cancellation.
    async fn send(&self, ws: &mut WsStream, frame: Message) -> std::result::Result<(), Exit> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Exit::Cancelled),
            result = ws.send(frame) => result.map_err(|e| Exit::Failed(e.into())),
        }
    }

    fn enter_streaming(&self) -> Interval {
        self.set_state(ConnectionState::Streaming);
        let mut interval = tokio::time::interval(self.protocol.heartbeat_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    }

    /// Returns false once the consumer has gone away.
    fn dispatch(&self, frame: &Message, heartbeat: &mut Option<Interval>) -> bool {
        let events = match self.protocol.decode_message(frame) {
            Ok(events) => events,
            Err(e) => {
                debug!(error = %e, "Failed to decode chat frame");
                return true;
            }
        };

        for event in events {
            match event {
                ProtocolEvent::HandshakeAck => {
                    if heartbeat.is_none() {
                        debug!("Handshake acknowledged");
                        *heartbeat = Some(self.enter_streaming());
                    }
                }
                ProtocolEvent::Message(message) => {
                    if self.messages.send(Ok(message)).is_err() {
                        return false;
                    }
                }
            }
        }
        true
    }
}

async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
