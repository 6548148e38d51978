//! Frame positions, frame rates and clock strings.
//!
//! Positions are signed frame indices. Clock strings are only a
//! presentation of a position at a given frame rate; they are parsed back
//! into positions by [`parse_time`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// A frame index on a service's timeline.
pub type Position = i64;

/// Frame rate as a rational number (e.g., 30000/1001 for 29.97 fps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    /// Numerator (e.g., 30000)
    pub numerator: u32,
    /// Denominator (e.g., 1001)
    pub denominator: u32,
}

impl FrameRate {
    /// Create a new frame rate.
    #[inline]
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Convert to frames per second as f64.
    #[inline]
    pub fn to_fps_f64(self) -> f64 {
        if self.denominator == 0 {
            return 0.0;
        }
        self.numerator as f64 / self.denominator as f64
    }

    /// Duration of a single frame.
    #[inline]
    pub fn frame_duration(self) -> std::time::Duration {
        let fps = self.to_fps_f64();
        if fps <= 0.0 {
            return std::time::Duration::from_millis(40);
        }
        std::time::Duration::from_secs_f64(1.0 / fps)
    }

    /// Common frame rates
    pub const FPS_23_976: Self = Self::new(24000, 1001);
    pub const FPS_24: Self = Self::new(24, 1);
    pub const FPS_25: Self = Self::new(25, 1);
    pub const FPS_29_97: Self = Self::new(30000, 1001);
    pub const FPS_30: Self = Self::new(30, 1);
    pub const FPS_50: Self = Self::new(50, 1);
    pub const FPS_59_94: Self = Self::new(60000, 1001);
    pub const FPS_60: Self = Self::new(60, 1);
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::FPS_25
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fps = self.to_fps_f64();
        if (fps - fps.round()).abs() < 0.001 {
            write!(f, "{} fps", fps.round() as u32)
        } else {
            write!(f, "{:.3} fps", fps)
        }
    }
}

/// Format a position as a `hh:mm:ss:ff` timecode.
pub fn to_timecode(position: Position, fps: f64) -> String {
    let sign = if position < 0 { "-" } else { "" };
    let position = position.unsigned_abs();
    let frames_per_second = fps.round().max(1.0) as u64;
    let total_seconds = (position as f64 / fps.max(f64::EPSILON)).floor() as u64;
    let frames = position - (total_seconds as f64 * fps).round() as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds / 60) % 60;
    let seconds = total_seconds % 60;
    format!(
        "{}{:02}:{:02}:{:02}:{:02}",
        sign,
        hours,
        minutes,
        seconds,
        frames.min(frames_per_second.saturating_sub(1))
    )
}

/// Format a position as a `hh:mm:ss.mmm` clock string.
pub fn to_clock(position: Position, fps: f64) -> String {
    let sign = if position < 0 { "-" } else { "" };
    let millis = (position.unsigned_abs() as f64 * 1000.0 / fps.max(f64::EPSILON)).round() as u64;
    format!(
        "{}{:02}:{:02}:{:02}.{:03}",
        sign,
        millis / 3_600_000,
        (millis / 60_000) % 60,
        (millis / 1000) % 60,
        millis % 1000
    )
}

/// Parse a time string into a position.
///
/// Accepts `hh:mm:ss:ff` timecodes, `hh:mm:ss.sss` clock strings (with
/// optional leading hour and minute fields), seconds with an `s` suffix and
/// plain frame counts.
pub fn parse_time(text: &str, fps: f64) -> Option<Position> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let position = if let Some(secs) = body.strip_suffix('s') {
        let seconds: f64 = secs.parse().ok()?;
        (seconds * fps).round() as Position
    } else if body.contains(':') {
        let fields: Vec<&str> = body.split(':').collect();
        if fields.len() > 4 {
            return None;
        }
        let last = fields[fields.len() - 1];
        if fields.len() == 4 {
            let hours: i64 = fields[0].parse().ok()?;
            let minutes: i64 = fields[1].parse().ok()?;
            let seconds: i64 = fields[2].parse().ok()?;
            let frames: i64 = fields[3].parse().ok()?;
            let whole = hours * 3600 + minutes * 60 + seconds;
            (whole as f64 * fps).round() as Position + frames
        } else {
            let mut seconds = 0.0;
            for field in &fields[..fields.len() - 1] {
                let value: f64 = field.parse().ok()?;
                seconds = seconds * 60.0 + value;
            }
            let tail: f64 = last.parse().ok()?;
            seconds = seconds * 60.0 + tail;
            (seconds * fps).round() as Position
        }
    } else {
        body.parse::<Position>().ok()?
    };

    Some(if negative { -position } else { position })
}

/// Number of audio samples accumulated from position 0 up to `position`.
pub fn sample_calculator_to_now(fps: f64, frequency: u32, position: Position) -> i64 {
    if fps <= 0.0 || position <= 0 {
        return 0;
    }
    (position as f64 * frequency as f64 / fps + 0.5).floor() as i64
}

/// Number of audio samples that belong to the frame at `position`.
///
/// Derived from the running total so that a sequence of frames never drifts
/// from the nominal sample rate (29.97 fps at 48 kHz alternates 1601/1602).
pub fn sample_calculator(fps: f64, frequency: u32, position: Position) -> u32 {
    if fps <= 0.0 {
        return 0;
    }
    let position = position.max(0);
    let samples = sample_calculator_to_now(fps, frequency, position + 1)
        - sample_calculator_to_now(fps, frequency, position);
    samples.max(0) as u32
}
