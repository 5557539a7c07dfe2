#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]
//! Mock YouTube Music companion
//!
//! Accepts WebSocket connections on a random port, pushes frames on demand
//! and records every frame the client sends.

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// What the test wants the server to do on the live connection
#[derive(Debug)]
enum Outbound {
    Frame(Message),
    /// Drop the TCP stream without a close handshake
    Abort,
}

#[derive(Debug, Default)]
struct MockYtmState {
    /// Accepted WebSocket connections so far
    connections: usize,
    /// Current connection id and its outbound queue
    live: Option<(usize, mpsc::Sender<Outbound>)>,
    /// Parsed text frames received from clients
    received: Vec<Value>,
    /// Close frames received from clients
    closes: usize,
    /// Text frames that did not parse as JSON
    malformed: usize,
}

/// Mock companion server
pub struct MockYtmServer {
    addr: SocketAddr,
    state: Arc<RwLock<MockYtmState>>,
    handle: JoinHandle<()>,
}

impl MockYtmServer {
    /// Start a mock companion on a random port
    pub async fn start() -> Self {
        let state = Arc::new(RwLock::new(MockYtmState::default()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let state_clone = state.clone();
        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        let state = state_clone.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, state).await;
                        });
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub async fn connections(&self) -> usize {
        self.state.read().await.connections
    }

    pub async fn closes(&self) -> usize {
        self.state.read().await.closes
    }

    pub async fn malformed(&self) -> usize {
        self.state.read().await.malformed
    }

    /// Wait until at least `count` connections have been accepted
    pub async fn wait_for_connections(&self, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while self.connections().await < count {
            assert!(
                Instant::now() < deadline,
                "expected {} connections, saw {}",
                count,
                self.connections().await
            );
            sleep(Duration::from_millis(5)).await;
        }
    }

    /// Send a text frame to the live connection
    pub async fn push(&self, frame: &str) {
        self.send(Outbound::Frame(Message::text(frame.to_string())))
            .await;
    }

    /// Close the live connection with a close handshake
    pub async fn close_client(&self) {
        let frame = CloseFrame {
            code: CloseCode::Away,
            reason: "Going away".into(),
        };
        self.send(Outbound::Frame(Message::Close(Some(frame)))).await;
    }

    /// Drop the live connection without a close handshake
    pub async fn abort_client(&self) {
        self.send(Outbound::Abort).await;
    }

    async fn send(&self, outbound: Outbound) {
        self.wait_for_connections(1).await;
        let sender = self
            .state
            .read()
            .await
            .live
            .as_ref()
            .map(|(_, tx)| tx.clone())
            .expect("no live connection");
        sender.send(outbound).await.unwrap();
    }

    /// Frames received so far
    pub async fn received(&self) -> Vec<Value> {
        self.state.read().await.received.clone()
    }

    /// Wait until at least `count` frames were received and return them
    pub async fn wait_for_frames(&self, count: usize) -> Vec<Value> {
        let result = timeout(Duration::from_secs(2), async {
            loop {
                let received = self.received().await;
                if received.len() >= count {
                    return received;
                }
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        result.unwrap_or_else(|_| panic!("expected {} frames", count))
    }

    /// Stop the mock server
    pub async fn stop(self) {
        self.handle.abort();
    }
}

/// Handle a single WebSocket connection
async fn handle_connection(stream: TcpStream, state: Arc<RwLock<MockYtmState>>) {
    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let (mut sink, mut source) = ws.split();
    let (tx, mut rx) = mpsc::channel(64);

    let id = {
        let mut state = state.write().await;
        state.connections += 1;
        state.live = Some((state.connections, tx));
        state.connections
    };

    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(Outbound::Frame(message)) => {
                    if sink.send(message).await.is_err() {
                        break;
                    }
                }
                Some(Outbound::Abort) | None => break,
            },
            inbound = source.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let mut state = state.write().await;
                    match serde_json::from_str::<Value>(text.as_str()) {
                        Ok(value) => state.received.push(value),
                        Err(_) => state.malformed += 1,
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    state.write().await.closes += 1;
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            },
        }
    }

    let mut state = state.write().await;
    if state.live.as_ref().is_some_and(|(live, _)| *live == id) {
        state.live = None;
    }
}
