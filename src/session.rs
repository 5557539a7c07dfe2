//! Companion socket session
//!
//! A [`ConnectionSession`] owns at most one WebSocket connection at a time.
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──ok──▶ Connected
//!      ▲                        │                  │
//!      └────────── error ───────┘     disconnect / peer close / error
//!      ▲                                           │
//!      └──────────────── Disconnecting ◀───────────┘
//!
//! close() from any state ──▶ Closed (terminal)
//! ```
//!
//! While connected a single receive loop folds every `PLAYER_STATE` frame
//! into the current snapshot and publishes the result on the bus, in frame
//! order. Reconnection is always caller-initiated.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{BusEvent, SharedBus};
use crate::player::{merge, PartialUpdate, PlayerSnapshot};
use crate::protocol::{self, decode_frame, encode_action, Action, DecodeError, Inbound};

/// Default bound on establishing the connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
/// Default bound on waiting for the receive loop during disconnect
pub const DEFAULT_DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    /// Terminal, after [`ConnectionSession::close`]
    Closed,
}

/// Outcome of issuing a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dispatch {
    /// One frame was written
    Sent,
    /// Nothing to do, the player is already in the requested state
    Unchanged,
    /// No open connection; the command was dropped
    NotConnected,
    /// The write failed; details are logged
    Failed,
}

impl Dispatch {
    pub fn was_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
    #[error("connection to {endpoint} timed out after {after:?}")]
    ConnectTimeout { endpoint: String, after: Duration },
    #[error("connection to {0} was cancelled")]
    Cancelled(String),
    #[error("websocket error: {0}")]
    Transport(#[from] tungstenite::Error),
}

/// Where and how to connect
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub disconnect_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: protocol::DEFAULT_HOST.to_string(),
            port: protocol::DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            disconnect_timeout: DEFAULT_DISCONNECT_TIMEOUT,
        }
    }
}

impl SessionConfig {
    pub fn endpoint(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

/// State shared between the session handle and its receive loop
struct Shared {
    endpoint: String,
    /// Replaced wholesale after each merge; never held across an await
    snapshot: StdRwLock<Option<Arc<PlayerSnapshot>>>,
    /// tokio Mutex: held for the duration of one write so frames never interleave
    sink: Mutex<Option<WsSink>>,
    state_tx: watch::Sender<SessionState>,
    bus: SharedBus,
}

/// Why the receive loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    Cancelled,
    PeerClosed,
    Ended,
}

impl Shared {
    fn current(&self) -> Option<Arc<PlayerSnapshot>> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_snapshot(&self, snapshot: Option<Arc<PlayerSnapshot>>) {
        *self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    fn set_state(&self, state: SessionState) {
        self.state_tx.send_replace(state);
    }

    /// Drop the snapshot and announce the disconnect
    fn finish_disconnect(&self) {
        self.replace_snapshot(None);
        self.set_state(SessionState::Disconnected);
        self.bus.publish(BusEvent::Disconnected {
            endpoint: self.endpoint.clone(),
        });
        info!("Disconnected from {}", self.endpoint);
    }

    fn handle_text(&self, text: &str) {
        match decode_frame(text) {
            Ok(Inbound::PlayerState(update)) => self.apply(&update),
            Ok(Inbound::Ignored(kind)) => debug!("Ignoring frame of type {:?}", kind),
            Err(e @ DecodeError::PlayerState(_)) => warn!("Skipping frame: {}", e),
            Err(e) => debug!("Ignoring frame: {}", e),
        }
    }

    /// Merge one update under the snapshot lock, then notify in order:
    /// song change first, full state second.
    fn apply(&self, update: &PartialUpdate) {
        let (next, previous_id, track_changed) = {
            let mut guard = self
                .snapshot
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let Some(current) = guard.as_ref() else {
                debug!("Dropping update received without an active snapshot");
                return;
            };
            let previous_id = current.track.track_id.clone();
            let merged = merge(current, update);
            let next = Arc::new(merged.snapshot);
            *guard = Some(next.clone());
            (next, previous_id, merged.track_changed)
        };

        debug!(
            "Merged update: playing={} position={} volume={}",
            next.is_playing, next.position_seconds, next.volume_percent
        );

        if track_changed {
            info!(
                "Song changed: {:?} -> {:?} ({})",
                previous_id, next.track.track_id, next.track.title
            );
            self.bus.publish(BusEvent::SongChanged {
                track: next.track.clone(),
            });
        }
        self.bus.publish(BusEvent::PlayerStateChanged { snapshot: next });
    }

    /// Cleanup after the loop stopped on its own. When a disconnect is in
    /// progress the caller owns the cleanup instead.
    async fn finish_loop(&self, exit: LoopExit) {
        if exit == LoopExit::Cancelled {
            return;
        }

        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            // Flushes the close reply queued by the transport
            if let Err(e) = sink.close().await {
                debug!("Close handshake incomplete: {}", e);
            }
        }

        let owned = self.state_tx.send_if_modified(|state| {
            if *state == SessionState::Connected {
                *state = SessionState::Disconnecting;
                true
            } else {
                false
            }
        });
        if owned {
            self.finish_disconnect();
        }
    }
}

async fn receive_loop(shared: Arc<Shared>, mut source: WsSource, cancel: CancellationToken) {
    let exit = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Receive loop cancelled");
                break LoopExit::Cancelled;
            }
            frame = source.next() => match frame {
                None => {
                    info!("Connection to {} ended", shared.endpoint);
                    break LoopExit::Ended;
                }
                Some(Err(e)) => {
                    warn!("Connection to {} lost: {}", shared.endpoint, e);
                    break LoopExit::Ended;
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("Server closed the connection: {:?}", frame);
                    break LoopExit::PeerClosed;
                }
                Some(Ok(Message::Text(text))) => shared.handle_text(text.as_str()),
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => shared.handle_text(text),
                    Err(_) => debug!("Ignoring non-UTF-8 binary frame"),
                },
                // Ping/pong are answered by the transport
                Some(Ok(_)) => {}
            }
        }
    };

    shared.finish_loop(exit).await;
}

struct Lifecycle {
    receive_task: Option<JoinHandle<()>>,
}

/// One live connection to the companion, plus the snapshot it maintains
pub struct ConnectionSession {
    config: SessionConfig,
    shared: Arc<Shared>,
    state_rx: watch::Receiver<SessionState>,
    /// Serializes connect/disconnect/close
    lifecycle: Mutex<Lifecycle>,
    /// Wrapped in RwLock to allow creating a fresh token per connection
    cancel: RwLock<CancellationToken>,
}

impl ConnectionSession {
    pub fn new(config: SessionConfig, bus: SharedBus) -> Self {
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);
        let shared = Arc::new(Shared {
            endpoint: config.endpoint(),
            snapshot: StdRwLock::new(None),
            sink: Mutex::new(None),
            state_tx,
            bus,
        });

        Self {
            config,
            shared,
            state_rx,
            lifecycle: Mutex::new(Lifecycle { receive_task: None }),
            cancel: RwLock::new(CancellationToken::new()),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Receiver that observes every state transition
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    pub fn bus(&self) -> &SharedBus {
        &self.shared.bus
    }

    /// Current snapshot, `None` unless a connection is established.
    /// Never waits on network I/O.
    pub fn current(&self) -> Option<Arc<PlayerSnapshot>> {
        self.shared.current()
    }

    /// Open the connection. Only valid while `Disconnected`.
    ///
    /// Failure is not fatal: the session returns to `Disconnected` and may be
    /// connected again.
    pub async fn connect(&self) -> Result<(), SessionError> {
        let mut lifecycle = self.lifecycle.lock().await;

        let state = self.state();
        if state != SessionState::Disconnected {
            return Err(SessionError::InvalidState {
                operation: "connect",
                state,
            });
        }
        if let Some(stale) = lifecycle.receive_task.take() {
            stale.abort();
        }

        // A cancelled token cannot be reused
        let cancel = {
            let mut token = self.cancel.write().await;
            *token = CancellationToken::new();
            token.clone()
        };

        self.shared.set_state(SessionState::Connecting);
        let endpoint = self.shared.endpoint.clone();
        debug!("Connecting to {}", endpoint);

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(SessionError::Cancelled(endpoint.clone())),
            attempt = timeout(
                self.config.connect_timeout,
                tokio_tungstenite::connect_async(endpoint.as_str()),
            ) => match attempt {
                Err(_) => Err(SessionError::ConnectTimeout {
                    endpoint: endpoint.clone(),
                    after: self.config.connect_timeout,
                }),
                Ok(Err(e)) => Err(SessionError::Transport(e)),
                Ok(Ok((stream, _response))) => Ok(stream),
            },
        };

        let stream = match result {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Connection failed: {}", e);
                self.shared.set_state(SessionState::Disconnected);
                return Err(e);
            }
        };

        let (sink, source) = stream.split();
        *self.shared.sink.lock().await = Some(sink);
        self.shared
            .replace_snapshot(Some(Arc::new(PlayerSnapshot::default())));
        self.shared.set_state(SessionState::Connected);

        info!("Connected to WebSocket server at {}", endpoint);
        self.shared.bus.publish(BusEvent::Connected { endpoint });

        let shared = self.shared.clone();
        lifecycle.receive_task = Some(tokio::spawn(receive_loop(shared, source, cancel)));

        Ok(())
    }

    /// Close the connection. Aborts an in-flight connect attempt. Safe to call
    /// in any state and any number of times.
    pub async fn disconnect(&self) {
        self.cancel.read().await.cancel();

        let mut lifecycle = self.lifecycle.lock().await;
        let task = lifecycle.receive_task.take();

        match self.state() {
            SessionState::Connected | SessionState::Connecting => {}
            SessionState::Disconnecting => {
                // The receive loop is tearing down after a peer close
                let mut state_rx = self.state_rx.clone();
                let settled = timeout(
                    self.config.disconnect_timeout,
                    state_rx.wait_for(|state| *state != SessionState::Disconnecting),
                )
                .await;
                if settled.is_err() {
                    warn!("Teardown of {} did not finish in time", self.shared.endpoint);
                    self.shared.finish_disconnect();
                }
                if let Some(task) = task {
                    task.abort();
                }
                return;
            }
            SessionState::Disconnected | SessionState::Closed => {
                if let Some(task) = task {
                    task.abort();
                }
                return;
            }
        }

        self.shared.set_state(SessionState::Disconnecting);
        info!("Disconnecting from {}", self.shared.endpoint);

        // A stalled write releases the sink once the token is cancelled
        let sink = match timeout(self.config.disconnect_timeout, self.shared.sink.lock()).await {
            Ok(mut sink) => sink.take(),
            Err(_) => {
                warn!("Sink still busy, dropping connection without close frame");
                None
            }
        };
        if let Some(mut sink) = sink {
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: "Client closing".into(),
            };
            match timeout(
                self.config.disconnect_timeout,
                sink.send(Message::Close(Some(frame))),
            )
            .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Close frame not delivered: {}", e),
                Err(_) => debug!("Close frame timed out"),
            }
        }

        if let Some(mut task) = task {
            if timeout(self.config.disconnect_timeout, &mut task)
                .await
                .is_err()
            {
                warn!("Receive loop did not stop in time, aborting");
                task.abort();
            }
        }

        self.shared.finish_disconnect();
    }

    /// Disconnect if needed, then connect again
    pub async fn reconnect(&self) -> Result<(), SessionError> {
        self.disconnect().await;
        self.connect().await
    }

    /// Disconnect and refuse any further connection attempts
    pub async fn close(&self) {
        self.disconnect().await;
        let _lifecycle = self.lifecycle.lock().await;
        self.shared.set_state(SessionState::Closed);
        debug!("Session for {} closed", self.shared.endpoint);
    }

    /// Write one `ACTION` frame. Dropped without I/O unless connected.
    pub async fn send_command(&self, action: Action) -> Dispatch {
        if !self.is_connected() {
            debug!("Not connected, dropping action {}", action.name());
            return Dispatch::NotConnected;
        }

        let text = match encode_action(&action) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode action {}: {}", action.name(), e);
                return Dispatch::Failed;
            }
        };

        let cancel = self.cancel.read().await.clone();
        let write = async {
            let mut sink = self.shared.sink.lock().await;
            let Some(sink) = sink.as_mut() else {
                return Dispatch::NotConnected;
            };

            debug!("Sending {}", text);
            match sink.send(Message::text(text)).await {
                Ok(()) => Dispatch::Sent,
                Err(e) => {
                    warn!("Send action {} failed: {}", action.name(), e);
                    Dispatch::Failed
                }
            }
        };

        // Dropping the write releases the sink for disconnect
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Connection closing, abandoned action {}", action.name());
                Dispatch::Failed
            }
            dispatch = write => dispatch,
        }
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        if let Ok(token) = self.cancel.try_read() {
            token.cancel();
        }
    }
}
