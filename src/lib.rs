//! YouTube Music companion control
//!
//! Client for the YouTube Music desktop companion WebSocket.
//!
//! This library provides:
//! - A connection session that mirrors the live player state
//! - Sparse state merging with song-change detection
//! - Bounded numeric commands (`+10`, `-5`, `1:30`)
//! - A playback client facade, artwork cache and query surface
//! - An opt-in reconnect supervisor

pub mod artwork;
pub mod bus;
pub mod client;
pub mod command;
pub mod config;
pub mod player;
pub mod protocol;
pub mod query;
pub mod session;
pub mod supervisor;
