//! Bounded numeric commands
//!
//! Turns free-text deltas such as `"+10"`, `"-5"` or `"45"` into an absolute
//! target relative to a current value, clamped to an inclusive range.
//! Out-of-range targets are pulled to the nearest bound, never rejected.

use std::str::FromStr;

/// How the input relates to the current value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandMode {
    /// No usable input, show the current value
    Display,
    Absolute,
    Increase,
    Decrease,
}

/// Parsed command. `target` is only meaningful when `valid` is true; invalid
/// commands carry the current value as their target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedCommand<T> {
    pub mode: CommandMode,
    pub target: T,
    pub current: T,
    pub valid: bool,
}

/// Arithmetic used while resolving a delta. Implementations must not panic on
/// overflow.
pub trait Bounded: Copy + Ord {
    fn plus(self, other: Self) -> Self;
    fn minus(self, other: Self) -> Self;
}

impl Bounded for i64 {
    fn plus(self, other: Self) -> Self {
        self.saturating_add(other)
    }

    fn minus(self, other: Self) -> Self {
        self.saturating_sub(other)
    }
}

impl Bounded for u32 {
    fn plus(self, other: Self) -> Self {
        self.saturating_add(other)
    }

    fn minus(self, other: Self) -> Self {
        self.saturating_sub(other)
    }
}

impl<T: Bounded> BoundedCommand<T> {
    fn display(current: T) -> Self {
        Self {
            mode: CommandMode::Display,
            target: current,
            current,
            valid: false,
        }
    }

    /// Parse `text` against `current`, clamping the result to `[min, max]`.
    ///
    /// `parser` receives the input with any leading sign removed and returns
    /// `None` when it cannot be read as a magnitude.
    pub fn parse_with<F>(text: &str, current: T, min: T, max: T, parser: F) -> Self
    where
        F: Fn(&str) -> Option<T>,
    {
        let text = text.trim();
        if text.is_empty() {
            return Self::display(current);
        }

        let (mode, magnitude) = match text.as_bytes()[0] {
            b'+' => (CommandMode::Increase, &text[1..]),
            b'-' => (CommandMode::Decrease, &text[1..]),
            _ => (CommandMode::Absolute, text),
        };

        // One sign at most
        let magnitude = magnitude.trim();
        if magnitude.starts_with(['+', '-']) {
            return Self::display(current);
        }
        let Some(value) = parser(magnitude) else {
            return Self::display(current);
        };

        let raw = match mode {
            CommandMode::Increase => current.plus(value),
            CommandMode::Decrease => current.minus(value),
            _ => value,
        };

        Self {
            mode,
            target: raw.clamp(min, max.max(min)),
            current,
            valid: true,
        }
    }
}

impl BoundedCommand<i64> {
    /// Integer command with plain decimal magnitudes
    pub fn parse(text: &str, current: i64, min: i64, max: i64) -> Self {
        Self::parse_with(text, current, min, max, parse_magnitude)
    }
}

impl BoundedCommand<u32> {
    /// Volume command in percent, bounded to 0-100
    pub fn volume(text: &str, current: u32) -> Self {
        Self::parse_with(text, current, 0, 100, unsigned::<u32>)
    }

    /// Seek command in seconds, bounded to the track duration.
    /// Accepts `mm:ss` as well as plain seconds.
    pub fn seek(text: &str, position: u32, duration: u32) -> Self {
        Self::parse_with(text, position, 0, duration, parse_clock)
    }
}

impl<T: Copy + Into<i64>> BoundedCommand<T> {
    /// Signed distance from the current value to the target
    pub fn delta(&self) -> i64 {
        self.target.into().saturating_sub(self.current.into())
    }
}

/// Decimal digits only; `str::parse` would also take a leading `+`
fn unsigned<T: FromStr>(text: &str) -> Option<T> {
    if text.starts_with(|c: char| c.is_ascii_digit()) {
        text.parse().ok()
    } else {
        None
    }
}

fn parse_magnitude(text: &str) -> Option<i64> {
    unsigned::<u64>(text).and_then(|v| i64::try_from(v).ok())
}

/// Parse `mm:ss` or a plain number of seconds
pub fn parse_clock(text: &str) -> Option<u32> {
    match text.split_once(':') {
        Some((minutes, seconds)) => {
            let minutes = unsigned::<u32>(minutes.trim())?;
            let seconds = unsigned::<u32>(seconds.trim())?;
            minutes.checked_mul(60)?.checked_add(seconds)
        }
        None => unsigned::<u32>(text),
    }
}

/// Render seconds as `m:ss`
pub fn format_seconds(total: u32) -> String {
    format!("{}:{:02}", total / 60, total % 60)
}
