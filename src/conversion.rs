//! Timestamp formatting.
//!
//! Helpers that turn 90 kHz ticks into the textual forms used by BDN XML
//! manifests and by human-readable reports.

use crate::timing::{Ticks, TICKS_PER_SECOND};

fn split_ms(ticks: Ticks) -> (i64, i64, i64, i64) {
    let ms = ticks.max(0) / 90;
    let hours = ms / 3_600_000;
    let minutes = (ms / 60_000) % 60;
    let seconds = (ms / 1000) % 60;
    (hours, minutes, seconds, ms % 1000)
}

/// Format `ticks` as a BDN timecode `HH:MM:SS:FF` at `fps`.
///
/// The frame field counts whole frames of the current second and never
/// reaches the (rounded-up) frame rate.
pub fn ticks_to_timecode(ticks: Ticks, fps: f64) -> String {
    let (hours, minutes, seconds, ms) = split_ms(ticks);
    let frames_per_second = fps.ceil().max(1.0) as i64;
    let frames = ((ms as f64 * fps / 1000.0) + 0.5) as i64;
    let frames = frames.min(frames_per_second - 1);
    format!("{hours:02}:{minutes:02}:{seconds:02}:{frames:02}")
}

/// Parse a BDN timecode `HH:MM:SS:FF` at `fps` back into ticks.
///
/// Returns `None` for anything that is not four colon-separated numbers.
pub fn timecode_to_ticks(timecode: &str, fps: f64) -> Option<Ticks> {
    let fields: Vec<i64> = timecode
        .split(':')
        .map(|f| f.trim().parse().ok())
        .collect::<Option<_>>()?;
    let [hours, minutes, seconds, frames] = fields[..] else {
        return None;
    };
    let whole = (hours * 3600 + minutes * 60 + seconds) * TICKS_PER_SECOND;
    Some(whole + (frames as f64 * TICKS_PER_SECOND as f64 / fps + 0.5) as Ticks)
}

/// Format `ticks` as `HH:MM:SS.mmm`.
pub fn ticks_to_clock(ticks: Ticks) -> String {
    let (hours, minutes, seconds, ms) = split_ms(ticks);
    format!("{hours:02}:{minutes:02}:{seconds:02}.{ms:03}")
}
