//! Timestamp quantisation and caption timing repair.
//!
//! All times are 90 kHz transport ticks. [`sync_time_pts`] snaps a time to
//! the frame grid of a target frame rate; [`TimeValidator`] repairs
//! overlapping, missing and too-short display intervals, processing captions
//! left to right so that each repair sees the already corrected predecessor.

use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::configuration::{ConversionSettings, FPS_24HZ, FPS_24P, FPS_NTSC, FPS_PAL};
use crate::frame::TargetFrame;

/// A timestamp or duration in 90 kHz ticks.
pub type Ticks = i64;

/// Ticks per second of the transport time base.
pub const TICKS_PER_SECOND: Ticks = 90_000;

/// Display time assumed for a caption with a missing or invalid end time.
pub const DEFAULT_MISSING_DURATION: Ticks = 5000 * 90;

/// Convert milliseconds to ticks, rounding half up.
pub fn ms_to_ticks(ms: f64) -> Ticks {
    (ms * 90.0 + 0.5).floor() as Ticks
}

/// Convert ticks to milliseconds.
pub fn ticks_to_ms(ticks: Ticks) -> f64 {
    ticks as f64 / 90.0
}

/// Snap `ticks` to the start of the nearest frame at `fps`.
///
/// 24, 25 and 29.97 fps use an exact integer frame length; 23.976 fps uses
/// the exact 15015/4 ratio. Other rates truncate to the frame that contains
/// the time.
pub fn sync_time_pts(ticks: Ticks, fps: f64) -> Ticks {
    if fps == FPS_NTSC || fps == FPS_PAL || fps == FPS_24HZ {
        let frame = ((TICKS_PER_SECOND as f64 + fps / 2.0) / fps) as Ticks;
        let half = frame / 2;
        ((ticks + half) / frame) * frame
    } else if fps == FPS_24P {
        ((((ticks + 1877) * 4) / 15015) * 15015) / 4
    } else {
        let frame = TICKS_PER_SECOND as f64 / fps;
        (((ticks as f64 / frame).floor() * frame) + 0.5) as Ticks
    }
}

/// A timing problem found (and usually repaired) by [`TimeValidator`].
///
/// Caption numbers in the [`Display`] output are one-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingIssue {
    /// Start time preceded the previous caption's end; moved forward.
    StartBeforePreviousEnd { index: usize },
    /// End time was zero; replaced by the default duration.
    MissingEndTime { index: usize },
    /// End time was not after the start; replaced by the default duration.
    EndNotAfterStart { index: usize },
    /// End time overlapped the next caption; clamped.
    EndAfterNextStart { index: usize },
    /// Caption was shorter than the minimum and was extended.
    ShortDurationFixed { index: usize, min_duration: Ticks },
    /// Caption is shorter than the minimum; left unchanged.
    ShortDuration { index: usize, min_duration: Ticks },
}

impl Display for TimingIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match *self {
            TimingIssue::StartBeforePreviousEnd { index } => write!(
                f,
                "start time of caption {} < end of previous caption -> fixed",
                index + 1
            ),
            TimingIssue::MissingEndTime { index } => {
                write!(f, "missing end time of caption {} -> fixed", index + 1)
            }
            TimingIssue::EndNotAfterStart { index } => {
                write!(f, "end time of caption {} <= start time -> fixed", index + 1)
            }
            TimingIssue::EndAfterNextStart { index } => write!(
                f,
                "end time of caption {} > start time of next caption -> fixed",
                index + 1
            ),
            TimingIssue::ShortDurationFixed {
                index,
                min_duration,
            } => write!(
                f,
                "duration of caption {} was shorter than {:.3}ms -> fixed",
                index + 1,
                ticks_to_ms(min_duration)
            ),
            TimingIssue::ShortDuration {
                index,
                min_duration,
            } => write!(
                f,
                "duration of caption {} is shorter than {:.3}ms",
                index + 1,
                ticks_to_ms(min_duration)
            ),
        }
    }
}

/// Start/end pair produced by [`TimeValidator::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSpan {
    /// Start in ticks.
    pub start: Ticks,
    /// End in ticks.
    pub end: Ticks,
}

/// Repairs caption display intervals.
#[derive(Debug, Clone, Copy)]
pub struct TimeValidator {
    fps_target: f64,
    min_duration: Ticks,
    fix_short_frames: bool,
}

impl TimeValidator {
    /// Create a validator for the given target frame rate and minimum
    /// duration policy.
    pub fn new(fps_target: f64, min_duration: Ticks, fix_short_frames: bool) -> Self {
        Self {
            fps_target,
            min_duration,
            fix_short_frames,
        }
    }

    /// Build a validator from a settings snapshot.
    pub fn from_settings(settings: &ConversionSettings) -> Self {
        Self::new(
            settings.fps_target,
            settings.min_duration,
            settings.fix_short_frames,
        )
    }

    /// Correct the interval of caption `index` given its (already
    /// corrected) predecessor and its successor.
    ///
    /// Only timestamps that changed are re-quantised to the frame grid.
    pub fn validate(
        &self,
        index: usize,
        frame: &TargetFrame,
        previous: Option<&TargetFrame>,
        next: Option<&TargetFrame>,
    ) -> (TimeSpan, Vec<TimingIssue>) {
        let mut issues = Vec::new();
        let mut start = frame.start_time;
        let mut end = frame.end_time;

        if let Some(previous) = previous {
            if start < previous.end_time {
                issues.push(TimingIssue::StartBeforePreviousEnd { index });
                start = previous.end_time;
            }
        }

        // A successor starting at zero carries no usable time.
        let next_start = match next.map(|n| n.start_time).filter(|&t| t != 0) {
            Some(t) => t,
            None if end > start => end,
            None => start + DEFAULT_MISSING_DURATION,
        };

        if end <= start {
            if end == 0 {
                issues.push(TimingIssue::MissingEndTime { index });
            } else {
                issues.push(TimingIssue::EndNotAfterStart { index });
            }
            end = (start + DEFAULT_MISSING_DURATION).min(next_start);
        } else if end > next_start {
            issues.push(TimingIssue::EndAfterNextStart { index });
            end = next_start;
        }

        if end - start < self.min_duration {
            if self.fix_short_frames {
                end = (start + self.min_duration).min(next_start);
                issues.push(TimingIssue::ShortDurationFixed {
                    index,
                    min_duration: self.min_duration,
                });
            } else {
                issues.push(TimingIssue::ShortDuration {
                    index,
                    min_duration: self.min_duration,
                });
            }
        }

        if start != frame.start_time {
            start = sync_time_pts(start, self.fps_target);
        }
        if end != frame.end_time {
            end = sync_time_pts(end, self.fps_target);
        }

        (TimeSpan { start, end }, issues)
    }

    /// Validate every caption in order, writing corrections back.
    pub fn validate_all(&self, frames: &mut [TargetFrame]) -> Vec<TimingIssue> {
        let mut issues = Vec::new();
        for index in 0..frames.len() {
            let previous = index.checked_sub(1).map(|p| &frames[p]);
            let (span, frame_issues) =
                self.validate(index, &frames[index], previous, frames.get(index + 1));
            frames[index].start_time = span.start;
            frames[index].end_time = span.end;
            issues.extend(frame_issues);
        }
        issues
    }
}
