//! Player state model
//!
//! A [`PlayerSnapshot`] is the single authoritative, fully populated view of
//! the peer's player at a point in time. Snapshots are immutable once
//! published; the receive loop replaces them wholesale after each merge
//! (see [`merge`]).

pub mod merge;

pub use merge::{merge, Merged, PartialTrack, PartialUpdate};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Wire value for the default repeat mode
pub const REPEAT_NONE: &str = "NONE";
/// Wire value for repeating the current track
pub const REPEAT_ONE: &str = "ONE";
/// Wire value for repeating the whole queue
pub const REPEAT_ALL: &str = "ALL";

/// Currently loaded track
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Remote artwork URL, empty if none
    pub artwork_url: String,
    /// Stable identifier of the loaded track, empty means no track
    pub track_id: String,
    pub duration_seconds: u32,
    pub is_paused: bool,
    pub elapsed_seconds: u32,
}

impl TrackInfo {
    /// True when the peer has reported a track identifier
    pub fn is_loaded(&self) -> bool {
        !self.track_id.is_empty()
    }
}

/// Complete player state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    /// Message type of the last applied update
    pub kind: String,
    pub track: TrackInfo,
    pub is_playing: bool,
    pub is_muted: bool,
    pub position_seconds: u32,
    /// 0-100
    pub volume_percent: u8,
    /// Raw wire value, see [`PlayerSnapshot::repeat_mode`]
    pub repeat: String,
}

impl Default for PlayerSnapshot {
    fn default() -> Self {
        Self {
            kind: String::new(),
            track: TrackInfo::default(),
            is_playing: false,
            is_muted: false,
            position_seconds: 0,
            volume_percent: 100,
            repeat: REPEAT_NONE.to_string(),
        }
    }
}

impl PlayerSnapshot {
    /// Map the wire repeat string to [`RepeatMode`].
    ///
    /// Values outside the protocol vocabulary are a contract violation by the
    /// peer and are reported rather than defaulted.
    pub fn repeat_mode(&self) -> Result<RepeatMode, UnknownRepeatMode> {
        self.repeat.parse()
    }
}

/// Repeat setting of the player queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RepeatMode {
    #[default]
    None,
    One,
    All,
}

impl RepeatMode {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => REPEAT_NONE,
            Self::One => REPEAT_ONE,
            Self::All => REPEAT_ALL,
        }
    }

    /// Mode the peer switches to after one `repeat` action
    pub fn next(self) -> Self {
        match self {
            Self::None => Self::All,
            Self::All => Self::One,
            Self::One => Self::None,
        }
    }

    /// Human-readable description used by the query surface
    pub fn describe(&self) -> &'static str {
        match self {
            Self::None => "Repeat Off",
            Self::All => "Repeat Current Queue",
            Self::One => "Repeat Current Song",
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Repeat value the protocol does not define
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized repeat mode: {0:?}")]
pub struct UnknownRepeatMode(pub String);

impl std::str::FromStr for RepeatMode {
    type Err = UnknownRepeatMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            REPEAT_NONE => Ok(Self::None),
            REPEAT_ONE => Ok(Self::One),
            REPEAT_ALL => Ok(Self::All),
            other => Err(UnknownRepeatMode(other.to_string())),
        }
    }
}
