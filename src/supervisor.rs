//! Reconnect supervisor
//!
//! The session never reconnects on its own. When `auto_reconnect` is enabled
//! the host runs [`supervise`], which watches the bus for `Disconnected` and
//! reconnects with exponential backoff.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::BusEvent;
use crate::client::PlaybackClient;
use crate::session::{SessionError, SessionState};

/// Retry configuration for reconnect attempts
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Initial delay between retry attempts
    pub initial_delay: Duration,
    /// Maximum delay (backoff caps at this value)
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        (delay * 2).min(self.max_delay)
    }
}

/// Keep the client connected until `shutdown` fires, the bus announces
/// `ShuttingDown`, or the session is closed.
pub async fn supervise(client: Arc<PlaybackClient>, config: RetryConfig, shutdown: CancellationToken) {
    let mut events = client.subscribe();
    let mut delay = config.initial_delay;

    loop {
        if shutdown.is_cancelled() {
            info!("supervisor: shutdown before attempt");
            break;
        }

        if !client.is_connected() {
            match client.reconnect().await {
                Ok(()) => {
                    info!("supervisor: connected");
                    delay = config.initial_delay;
                }
                Err(SessionError::InvalidState {
                    state: SessionState::Closed,
                    ..
                }) => {
                    info!("supervisor: session closed");
                    break;
                }
                Err(e) => {
                    warn!("supervisor: connect failed ({}), retrying in {:?}", e, delay);

                    // Wait with shutdown check
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            info!("supervisor: shutdown during backoff");
                            break;
                        }
                        _ = tokio::time::sleep(delay) => {
                            delay = config.next_delay(delay);
                        }
                    }
                    continue;
                }
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("supervisor: cancelled via token");
                break;
            }
            event = events.recv() => match event {
                Ok(BusEvent::Disconnected { endpoint }) => {
                    info!("supervisor: lost {}, reconnecting", endpoint);
                }
                Ok(BusEvent::ShuttingDown) => {
                    info!("supervisor: received ShuttingDown event");
                    break;
                }
                Ok(_) => {}
                // State is re-checked at the top of the loop
                Err(RecvError::Lagged(skipped)) => {
                    debug!("supervisor: skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    info!("supervisor: stopped");
}
