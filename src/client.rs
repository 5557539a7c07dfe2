//! Playback client
//!
//! High-level facade over a [`ConnectionSession`]: typed accessors for the
//! current snapshot and playback commands that skip the round trip when the
//! player is already in the requested state.

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::artwork::{Artwork, ArtworkStore};
use crate::bus::BusEvent;
use crate::player::{PlayerSnapshot, RepeatMode, TrackInfo, UnknownRepeatMode};
use crate::protocol::Action;
use crate::session::{ConnectionSession, Dispatch, SessionError};

/// Title reported when nothing usable is loaded
pub const UNKNOWN_TITLE: &str = "Unknown";

pub struct PlaybackClient {
    session: Arc<ConnectionSession>,
    artwork: Arc<dyn ArtworkStore>,
}

impl PlaybackClient {
    pub fn new(session: Arc<ConnectionSession>, artwork: Arc<dyn ArtworkStore>) -> Self {
        Self { session, artwork }
    }

    pub fn session(&self) -> &Arc<ConnectionSession> {
        &self.session
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn snapshot(&self) -> Option<Arc<PlayerSnapshot>> {
        self.session.current()
    }

    pub fn is_muted(&self) -> bool {
        self.snapshot().is_some_and(|s| s.is_muted)
    }

    /// Repeat mode of the current snapshot, `RepeatMode::None` without one
    pub fn repeat_status(&self) -> Result<RepeatMode, UnknownRepeatMode> {
        match self.snapshot() {
            Some(snapshot) => snapshot.repeat_mode(),
            None => Ok(RepeatMode::None),
        }
    }

    pub fn current_volume(&self) -> Option<u8> {
        self.snapshot().map(|s| s.volume_percent)
    }

    pub fn current_position(&self) -> Option<u32> {
        self.snapshot().map(|s| s.position_seconds)
    }

    pub fn current_playback_name(&self) -> String {
        self.snapshot()
            .map(|s| s.track.title.clone())
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| UNKNOWN_TITLE.to_string())
    }

    /// Mode the player will be in after [`toggle_repeat`](Self::toggle_repeat)
    pub fn next_repeat_mode(mode: RepeatMode) -> RepeatMode {
        mode.next()
    }

    // =========================================================================
    // Commands
    // =========================================================================

    pub async fn play(&self) -> Dispatch {
        match self.snapshot() {
            None => Dispatch::NotConnected,
            Some(s) if s.is_playing => Dispatch::Unchanged,
            Some(_) => self.session.send_command(Action::Play).await,
        }
    }

    pub async fn pause(&self) -> Dispatch {
        match self.snapshot() {
            None => Dispatch::NotConnected,
            Some(s) if !s.is_playing => Dispatch::Unchanged,
            Some(_) => self.session.send_command(Action::Pause).await,
        }
    }

    pub async fn skip(&self) -> Dispatch {
        self.session.send_command(Action::Next).await
    }

    pub async fn skip_back(&self) -> Dispatch {
        self.session.send_command(Action::Previous).await
    }

    /// Absolute volume in percent, clamped to 100
    pub async fn set_volume(&self, percent: u8) -> Dispatch {
        let target = percent.min(100);
        match self.current_volume() {
            None => Dispatch::NotConnected,
            Some(current) if current == target => Dispatch::Unchanged,
            Some(_) => self.session.send_command(Action::SetVolume(target)).await,
        }
    }

    /// Seek to an absolute position. The peer only understands relative
    /// seeks, so the offset from the current position is sent.
    pub async fn set_position(&self, target_seconds: u32) -> Dispatch {
        match self.current_position() {
            None => Dispatch::NotConnected,
            Some(position) if position == target_seconds => Dispatch::Unchanged,
            Some(position) => {
                let offset = i64::from(target_seconds) - i64::from(position);
                self.session.send_command(Action::Seek(offset)).await
            }
        }
    }

    pub async fn shuffle(&self) -> Dispatch {
        self.session.send_command(Action::Shuffle).await
    }

    pub async fn toggle_mute(&self) -> Dispatch {
        self.session.send_command(Action::Mute).await
    }

    pub async fn toggle_repeat(&self) -> Dispatch {
        self.session.send_command(Action::Repeat).await
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub async fn connect(&self) -> Result<(), SessionError> {
        self.session.connect().await
    }

    pub async fn disconnect(&self) {
        self.session.disconnect().await
    }

    pub async fn reconnect(&self) -> Result<(), SessionError> {
        self.session.reconnect().await
    }

    pub async fn close(&self) {
        self.session.close().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.session.bus().subscribe()
    }

    // =========================================================================
    // Artwork
    // =========================================================================

    pub async fn artwork(&self, track: &TrackInfo) -> Artwork {
        if track.track_id.is_empty() && track.artwork_url.is_empty() {
            return Artwork::Unavailable;
        }

        match self.artwork.fetch(&track.track_id, &track.artwork_url).await {
            Ok(Some(path)) => Artwork::Cached(path),
            Ok(None) => Artwork::Unavailable,
            Err(e) => {
                tracing::warn!("Artwork for {:?} unavailable: {}", track.track_id, e);
                Artwork::Unavailable
            }
        }
    }
}
