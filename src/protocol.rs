//! Companion socket wire protocol
//!
//! Every frame is one JSON object discriminated by its `type` field.
//! Inbound `PLAYER_STATE` frames carry sparse player updates; outbound
//! `ACTION` frames carry commands. Anything else is ignored.

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::player::PartialUpdate;

/// Default companion endpoint host
pub const DEFAULT_HOST: &str = "localhost";
/// Default companion endpoint port
pub const DEFAULT_PORT: u16 = 26539;

/// `type` of inbound player-state frames
pub const PLAYER_STATE: &str = "PLAYER_STATE";
/// `type` of outbound command frames
pub const ACTION: &str = "ACTION";

/// Frame decoding failure
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    NotJson(#[source] serde_json::Error),
    #[error("frame is JSON but not an object")]
    NotObject,
    #[error("malformed PLAYER_STATE payload: {0}")]
    PlayerState(#[source] serde_json::Error),
}

/// Classified inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    PlayerState(PartialUpdate),
    /// A JSON object with some other (or no) `type`
    Ignored(Option<String>),
}

/// Decode one text frame
pub fn decode_frame(text: &str) -> Result<Inbound, DecodeError> {
    let value: Value = serde_json::from_str(text).map_err(DecodeError::NotJson)?;
    let Value::Object(fields) = &value else {
        return Err(DecodeError::NotObject);
    };

    let kind = fields.get("type").and_then(Value::as_str);
    match kind {
        Some(PLAYER_STATE) => serde_json::from_value::<PartialUpdate>(value)
            .map(Inbound::PlayerState)
            .map_err(DecodeError::PlayerState),
        _ => Ok(Inbound::Ignored(kind.map(str::to_string))),
    }
}

/// Command understood by the companion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Play,
    Pause,
    Next,
    Previous,
    /// Toggles mute
    Mute,
    Shuffle,
    /// Advances the repeat mode one step
    Repeat,
    /// Absolute volume in percent
    SetVolume(u8),
    /// Relative seek in seconds
    Seek(i64),
}

impl Action {
    /// Wire name of the action
    pub fn name(&self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Next => "next",
            Self::Previous => "previous",
            Self::Mute => "mute",
            Self::Shuffle => "shuffle",
            Self::Repeat => "repeat",
            Self::SetVolume(_) => "setVolume",
            Self::Seek(_) => "seek",
        }
    }

    /// Payload, if the action takes one
    pub fn data(&self) -> Option<Value> {
        match self {
            Self::SetVolume(percent) => Some(json!(percent)),
            Self::Seek(offset) => Some(json!(offset)),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct ActionFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    action: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

/// Encode an outbound `ACTION` frame. `data` is omitted entirely when absent.
pub fn encode_action(action: &Action) -> Result<String, serde_json::Error> {
    serde_json::to_string(&ActionFrame {
        kind: ACTION,
        action: action.name(),
        data: action.data(),
    })
}
