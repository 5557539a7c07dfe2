//! Mock servers for integration testing
//!
//! Simulates the YouTube Music companion socket so the session can be
//! exercised end to end without the desktop app.

pub mod ytm;

pub use ytm::MockYtmServer;
