//! Incremental state merge
//!
//! The peer only sends the fields that changed. [`merge`] folds such a sparse
//! [`PartialUpdate`] into the previous [`PlayerSnapshot`] and reports whether
//! the loaded track changed as a result.
//!
//! Empty strings never clear a known value: the peer sends `""` when it has
//! nothing new to say, not to blank a field.

use serde::{Deserialize, Deserializer, Serialize};

use super::{PlayerSnapshot, TrackInfo};

/// Sparse track update. Absent fields leave the snapshot untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialTrack {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default, rename = "imageSrc")]
    pub artwork_url: Option<String>,
    #[serde(default, rename = "videoId")]
    pub track_id: Option<String>,
    #[serde(default, rename = "songDuration")]
    pub duration_seconds: Option<i64>,
    /// Always sent alongside the track object; applied unconditionally
    #[serde(default, rename = "isPaused", deserialize_with = "null_as_default")]
    pub is_paused: bool,
    /// Always sent alongside the track object; applied unconditionally
    #[serde(
        default,
        rename = "elapsedSeconds",
        deserialize_with = "null_as_default"
    )]
    pub elapsed_seconds: i64,
}

/// Sparse player-state update as decoded from a `PLAYER_STATE` frame
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialUpdate {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default, rename = "song")]
    pub track: Option<PartialTrack>,
    #[serde(default, rename = "isPlaying")]
    pub is_playing: Option<bool>,
    #[serde(default, rename = "muted")]
    pub is_muted: Option<bool>,
    #[serde(default, rename = "position")]
    pub position_seconds: Option<i64>,
    #[serde(default, rename = "volume")]
    pub volume_percent: Option<i64>,
    #[serde(default)]
    pub repeat: Option<String>,
}

/// Result of folding one update into a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merged {
    pub snapshot: PlayerSnapshot,
    /// The track identifier differs from the one before the merge
    pub track_changed: bool,
}

/// Fold `update` into `current`, producing the next snapshot.
///
/// Total over every well-typed update; malformed frames are rejected during
/// decoding and never reach this function.
pub fn merge(current: &PlayerSnapshot, update: &PartialUpdate) -> Merged {
    let mut next = current.clone();
    let old_track_id = current.track.track_id.as_str();

    if let Some(is_playing) = update.is_playing {
        next.is_playing = is_playing;
    }
    if let Some(is_muted) = update.is_muted {
        next.is_muted = is_muted;
    }
    if let Some(position) = update.position_seconds {
        next.position_seconds = to_seconds(position);
    }
    if let Some(volume) = update.volume_percent {
        next.volume_percent = volume.clamp(0, 100) as u8;
    }
    assign_non_empty(&mut next.repeat, update.repeat.as_deref());
    assign_non_empty(&mut next.kind, update.kind.as_deref());

    if let Some(track) = &update.track {
        apply_track(&mut next.track, track);
        next.position_seconds = next.track.elapsed_seconds;
    }

    let track_changed = next.track.track_id != old_track_id;

    Merged {
        snapshot: next,
        track_changed,
    }
}

fn apply_track(target: &mut TrackInfo, update: &PartialTrack) {
    assign_non_empty(&mut target.title, update.title.as_deref());
    assign_non_empty(&mut target.artist, update.artist.as_deref());
    assign_non_empty(&mut target.album, update.album.as_deref());
    assign_non_empty(&mut target.artwork_url, update.artwork_url.as_deref());
    assign_non_empty(&mut target.track_id, update.track_id.as_deref());

    if let Some(duration) = update.duration_seconds {
        target.duration_seconds = to_seconds(duration);
    }
    target.is_paused = update.is_paused;
    target.elapsed_seconds = to_seconds(update.elapsed_seconds);
}

fn assign_non_empty(target: &mut String, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        value.clone_into(target);
    }
}

fn to_seconds(value: i64) -> u32 {
    value.clamp(0, u32::MAX as i64) as u32
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
