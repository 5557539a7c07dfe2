//! Launcher-style query surface
//!
//! Maps a free-text query such as `"vol +10"` or `"seek 1:30"` to a list of
//! scored results, each optionally carrying an action that can be run
//! against the [`PlaybackClient`].

use serde::Serialize;
use std::path::PathBuf;

use crate::client::PlaybackClient;
use crate::command::{format_seconds, BoundedCommand};
use crate::player::{PlayerSnapshot, RepeatMode};
use crate::session::{Dispatch, SessionError};

/// Score of the now-playing entry
pub const NOW_PLAYING_SCORE: i32 = 1000;
/// Score of the play/pause toggle in the overview
pub const TOGGLE_SCORE: i32 = 950;
const DEFAULT_SCORE: i32 = 1;

/// Executable facade operation attached to a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClientAction {
    Play,
    Pause,
    TogglePlayPause,
    Next,
    Previous,
    ToggleMute,
    Shuffle,
    ToggleRepeat,
    SetVolume(u8),
    /// Absolute position in seconds
    Seek(u32),
    Reconnect,
}

impl ClientAction {
    /// Run the action. A successful reconnect reports [`Dispatch::Sent`].
    pub async fn execute(&self, client: &PlaybackClient) -> Result<Dispatch, SessionError> {
        let dispatch = match *self {
            Self::Play => client.play().await,
            Self::Pause => client.pause().await,
            Self::TogglePlayPause => {
                if client.snapshot().is_some_and(|s| s.is_playing) {
                    client.pause().await
                } else {
                    client.play().await
                }
            }
            Self::Next => client.skip().await,
            Self::Previous => client.skip_back().await,
            Self::ToggleMute => client.toggle_mute().await,
            Self::Shuffle => client.shuffle().await,
            Self::ToggleRepeat => client.toggle_repeat().await,
            Self::SetVolume(percent) => client.set_volume(percent).await,
            Self::Seek(seconds) => client.set_position(seconds).await,
            Self::Reconnect => {
                client.reconnect().await?;
                Dispatch::Sent
            }
        };
        Ok(dispatch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    pub title: String,
    pub subtitle: String,
    /// Local artwork; `None` means the default icon
    pub icon: Option<PathBuf>,
    pub score: i32,
    pub action: Option<ClientAction>,
}

impl QueryResult {
    fn new(title: impl Into<String>, subtitle: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            subtitle: subtitle.into(),
            icon: None,
            score: DEFAULT_SCORE,
            action: None,
        }
    }

    fn with_action(mut self, action: ClientAction) -> Self {
        self.action = Some(action);
        self
    }

    fn with_score(mut self, score: i32) -> Self {
        self.score = score;
        self
    }
}

/// Leading query word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    Next,
    Last,
    Pause,
    Play,
    Muted,
    Volume,
    Shuffle,
    Repeat,
    Seek,
    Reconnect,
}

impl Keyword {
    fn parse(word: &str) -> Option<Self> {
        let keyword = match word.to_ascii_lowercase().as_str() {
            "next" => Self::Next,
            "last" => Self::Last,
            "pause" => Self::Pause,
            "play" => Self::Play,
            "muted" => Self::Muted,
            "vol" | "volume" => Self::Volume,
            "shuffle" => Self::Shuffle,
            "repeat" => Self::Repeat,
            "seek" => Self::Seek,
            "reconnect" => Self::Reconnect,
            _ => return None,
        };
        Some(keyword)
    }
}

/// Split a query into its keyword and the remaining argument
fn route(text: &str) -> Option<(Keyword, &str)> {
    let text = text.trim();
    let (first, rest) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
    Keyword::parse(first).map(|keyword| (keyword, rest.trim()))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueryEngine;

impl QueryEngine {
    pub fn new() -> Self {
        Self
    }

    pub async fn query(&self, client: &PlaybackClient, text: &str) -> Vec<QueryResult> {
        let snapshot = match client.snapshot() {
            Some(snapshot) if client.is_connected() => snapshot,
            _ => return vec![not_connected()],
        };

        match route(text) {
            Some((keyword, arg)) => keyword_results(keyword, arg, &snapshot),
            None => {
                if !text.trim().is_empty() {
                    tracing::debug!("No keyword in query {:?}, showing overview", text);
                }
                let icon = client
                    .artwork(&snapshot.track)
                    .await
                    .path()
                    .map(|path| path.to_path_buf());
                overview(&snapshot, icon)
            }
        }
    }
}

fn not_connected() -> QueryResult {
    QueryResult::new(
        "Not connected - Reconnect",
        "Not connected to YouTube Music. Reconnect",
    )
    .with_action(ClientAction::Reconnect)
}

fn playback_name(snapshot: &PlayerSnapshot) -> &str {
    if snapshot.track.title.is_empty() {
        crate::client::UNKNOWN_TITLE
    } else {
        &snapshot.track.title
    }
}

/// Now-playing entry followed by every control
fn overview(snapshot: &PlayerSnapshot, icon: Option<PathBuf>) -> Vec<QueryResult> {
    let track = &snapshot.track;
    if !track.is_loaded() && track.title.is_empty() {
        return vec![QueryResult::new(
            "No song playing",
            "Start playback in YouTube Music",
        )];
    }

    let (status, toggle) = if snapshot.is_playing {
        ("Now Playing", "Pause")
    } else {
        ("Paused", "Resume")
    };
    let title = if track.title.is_empty() {
        "Not Available"
    } else {
        track.title.as_str()
    };

    let mut now_playing = QueryResult::new(
        title,
        format!(
            "{} {}/{} | by {}",
            status,
            format_seconds(snapshot.position_seconds),
            format_seconds(track.duration_seconds),
            track.artist
        ),
    )
    .with_score(NOW_PLAYING_SCORE);
    now_playing.icon = icon;

    let mut results = vec![
        now_playing,
        QueryResult::new("Pause / Resume", format!("{}: {}", toggle, track.title))
            .with_action(ClientAction::TogglePlayPause)
            .with_score(TOGGLE_SCORE),
    ];
    for keyword in [
        Keyword::Next,
        Keyword::Last,
        Keyword::Muted,
        Keyword::Shuffle,
        Keyword::Seek,
        Keyword::Repeat,
        Keyword::Volume,
    ] {
        results.extend(keyword_results(keyword, "", snapshot));
    }
    results
}

fn keyword_results(keyword: Keyword, arg: &str, snapshot: &PlayerSnapshot) -> Vec<QueryResult> {
    let name = playback_name(snapshot);
    let result = match keyword {
        Keyword::Next => QueryResult::new("Next", format!("Skip: {}", name))
            .with_action(ClientAction::Next),
        Keyword::Last => {
            QueryResult::new("Last", "Skip Backwards").with_action(ClientAction::Previous)
        }
        Keyword::Play => QueryResult::new("Play", format!("Resume: {}", name))
            .with_action(ClientAction::Play),
        Keyword::Pause => QueryResult::new("Pause", format!("Pause: {}", name))
            .with_action(ClientAction::Pause),
        Keyword::Muted => {
            let toggle = if snapshot.is_muted { "Unmute" } else { "Mute" };
            QueryResult::new("Toggle Mute", format!("{}: {}", toggle, name))
                .with_action(ClientAction::ToggleMute)
        }
        Keyword::Shuffle => {
            QueryResult::new("Shuffle", "Shuffle queue").with_action(ClientAction::Shuffle)
        }
        Keyword::Repeat => {
            let next = snapshot
                .repeat_mode()
                .map(RepeatMode::next)
                .map(|mode| mode.describe())
                .unwrap_or("Unknown repeat status");
            QueryResult::new("Toggle Repeat", format!("{}: {}", next, name))
                .with_action(ClientAction::ToggleRepeat)
        }
        Keyword::Volume => volume_result(arg, snapshot.volume_percent),
        Keyword::Seek => seek_result(arg, snapshot),
        Keyword::Reconnect => QueryResult::new("Reconnect", "Force a reconnection")
            .with_action(ClientAction::Reconnect),
    };
    vec![result]
}

fn volume_result(arg: &str, current: u8) -> QueryResult {
    let cmd = BoundedCommand::volume(arg, u32::from(current));
    let subtitle = format!("Current Volume: {}", current);
    match u8::try_from(cmd.target) {
        Ok(target) if cmd.valid => QueryResult::new(format!("Set Volume to {}", target), subtitle)
            .with_action(ClientAction::SetVolume(target)),
        _ => QueryResult::new("Volume", subtitle),
    }
}

fn seek_result(arg: &str, snapshot: &PlayerSnapshot) -> QueryResult {
    let position = snapshot.position_seconds;
    let cmd = BoundedCommand::seek(arg, position, snapshot.track.duration_seconds);
    let subtitle = format!("Current Position: {}", format_seconds(position));
    if cmd.valid {
        QueryResult::new(format!("Seek to {}", format_seconds(cmd.target)), subtitle)
            .with_action(ClientAction::Seek(cmd.target))
    } else {
        QueryResult::new("Position", subtitle)
    }
}
