//! Caption geometry and timing derivation.
//!
//! [`scan`] builds the target descriptor of every caption from the source
//! stream: it retimes (frame-rate conversion, delay, frame-grid sync),
//! rescales (resolution change, free scale) and recentres each caption, then
//! repairs the timeline with [`TimeValidator`]. [`rescan`] re-derives the
//! descriptors from already edited ones so that manual edits (position,
//! exclusion, forced flag, erase patches) survive a settings change.

use crate::configuration::{ConversionSettings, ForcedFlagMode, Resolution};
use crate::frame::{MIN_IMAGE_DIMENSION, SourceFrame, TargetFrame};
use crate::timing::{Ticks, TimeValidator, TimingIssue, sync_time_pts};

/// Result of [`scan`] or [`rescan`].
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// One target descriptor per source caption.
    pub frames: Vec<TargetFrame>,
    /// Timing repairs and warnings, in caption order.
    pub issues: Vec<TimingIssue>,
    /// Effective output resolution.
    pub resolution: Resolution,
}

/// Build target descriptors from `sources`.
pub fn scan(sources: &[SourceFrame], settings: &ConversionSettings) -> ScanOutcome {
    log::debug!(
        "Scanning {} captions (convert_fps={}, convert_resolution={})",
        sources.len(),
        settings.convert_fps,
        settings.convert_resolution
    );
    let fact_ts = if settings.convert_fps {
        settings.fps_source / settings.fps_target
    } else {
        1.0
    };

    let mut frames: Vec<TargetFrame> = sources
        .iter()
        .map(|source| {
            let mut target = TargetFrame::from_source(source);
            target.start_time = retime(source.start_time, fact_ts, 0, settings);
            target.end_time = retime(source.end_time, fact_ts, 0, settings);
            apply_forced_flag(&mut target, settings.forced_flag);
            apply_geometry(&mut target, source, settings);
            target
        })
        .collect();

    let issues = TimeValidator::from_settings(settings).validate_all(&mut frames);
    ScanOutcome {
        frames,
        issues,
        resolution: effective_resolution(sources, settings),
    }
}

/// Re-derive target descriptors after a settings change.
///
/// Timing and geometry are derived from the current `targets`: `old`'s delay
/// and frame-rate conversion are undone, and sizes and offsets are scaled by
/// the change of screen size and free scale, so moved captions stay where
/// they were put. Forced flags, exclusion and erase patches are kept;
/// patches are rescaled with the image.
pub fn rescan(
    targets: &[TargetFrame],
    sources: &[SourceFrame],
    settings: &ConversionSettings,
    old: &ConversionSettings,
) -> ScanOutcome {
    log::debug!("Rescanning {} captions", targets.len());
    let fps_source = settings.fps_source;
    let fact_ts = match (settings.convert_fps, old.convert_fps) {
        (true, false) => fps_source / settings.fps_target,
        (false, true) => old.fps_target / fps_source,
        (true, true) if settings.fps_target != old.fps_target => {
            old.fps_target / settings.fps_target
        }
        _ => 1.0,
    };

    let mut frames: Vec<TargetFrame> = targets
        .iter()
        .zip(sources)
        .map(|(previous, source)| {
            let mut target = previous.clone();
            apply_forced_flag(&mut target, settings.forced_flag);
            target.start_time = retime(previous.start_time, fact_ts, old.delay, settings);
            target.end_time = retime(previous.end_time, fact_ts, old.delay, settings);
            rescale_geometry(&mut target, previous, source, settings, old);

            if previous.image_width > 0 && previous.image_height > 0 {
                let fx = target.image_width as f64 / previous.image_width as f64;
                let fy = target.image_height as f64 / previous.image_height as f64;
                for patch in &mut target.erase_patches {
                    *patch = patch.scaled(fx, fy);
                }
            }
            target
        })
        .collect();

    let issues = TimeValidator::from_settings(settings).validate_all(&mut frames);
    ScanOutcome {
        frames,
        issues,
        resolution: effective_resolution(sources, settings),
    }
}

/// Recompute the image size of `target` after its source caption was
/// decoded (decoding may crop transparent borders and change the size).
///
/// A size change recentres the caption by half the difference, then
/// clamps it on screen.
pub fn update_target_image(
    target: &mut TargetFrame,
    source: &SourceFrame,
    settings: &ConversionSettings,
) {
    let (scale_x, scale_y) = scale_factors(target, source);
    let (free_x, free_y) = settings.effective_free_scale();

    let old_width = target.image_width;
    let old_height = target.image_height;
    target.image_width = scaled_dimension(source.image_width, scale_x * free_x, target.width);
    target.image_height = scaled_dimension(source.image_height, scale_y * free_y, target.height);

    if target.image_width != old_width {
        let x = target.x_offset as i64 + (old_width as i64 - target.image_width as i64) / 2;
        target.x_offset = clamp_offset(x, target.width, target.image_width);
    }
    if target.image_height != old_height {
        let y = target.y_offset as i64 + (old_height as i64 - target.image_height as i64) / 2;
        target.y_offset = clamp_offset(y, target.height, target.image_height);
    }
}

/// The output resolution implied by `settings`; without conversion it is
/// inferred from the first caption.
pub fn effective_resolution(sources: &[SourceFrame], settings: &ConversionSettings) -> Resolution {
    match sources.first() {
        Some(first) if !settings.convert_resolution => {
            Resolution::from_dimensions(first.width, first.height)
        }
        _ => settings.resolution,
    }
}

fn retime(time: Ticks, fact_ts: f64, old_delay: Ticks, settings: &ConversionSettings) -> Ticks {
    let scaled = if fact_ts == 1.0 {
        time
    } else {
        (time as f64 * fact_ts + 0.5) as Ticks
    };
    sync_time_pts(scaled - old_delay + settings.delay, settings.fps_target)
}

fn apply_forced_flag(target: &mut TargetFrame, mode: ForcedFlagMode) {
    match mode {
        ForcedFlagMode::Set => target.forced = true,
        ForcedFlagMode::Clear => target.forced = false,
        ForcedFlagMode::Keep => {}
    }
}

fn apply_geometry(target: &mut TargetFrame, source: &SourceFrame, settings: &ConversionSettings) {
    if settings.convert_resolution {
        let (width, height) = settings.resolution.dimensions();
        target.width = width;
        target.height = height;
    } else {
        target.width = source.width;
        target.height = source.height;
    }
    let (scale_x, scale_y) = scale_factors(target, source);
    let (free_x, free_y) = settings.effective_free_scale();

    target.image_width = scaled_dimension(source.image_width, scale_x * free_x, target.width);
    target.image_height = scaled_dimension(source.image_height, scale_y * free_y, target.height);

    target.x_offset = scaled_offset(
        source.x_offset,
        source.width,
        source.image_width,
        scale_x,
        target.width,
        target.image_width,
    );
    target.y_offset = scaled_offset(
        source.y_offset,
        source.height,
        source.image_height,
        scale_y,
        target.height,
        target.image_height,
    );
}

fn rescale_geometry(
    target: &mut TargetFrame,
    previous: &TargetFrame,
    source: &SourceFrame,
    settings: &ConversionSettings,
    old: &ConversionSettings,
) {
    let (width, height) = if settings.convert_resolution {
        settings.resolution.dimensions()
    } else {
        (source.width, source.height)
    };
    target.width = width;
    target.height = height;

    let ratio = |new: u32, old: u32| if old == 0 { 1.0 } else { new as f64 / old as f64 };
    let scale_x = ratio(width, previous.width);
    let scale_y = ratio(height, previous.height);
    let (free_x, free_y) = settings.effective_free_scale();
    let (old_free_x, old_free_y) = old.effective_free_scale();

    target.image_width = rescaled_dimension(
        previous.image_width,
        scale_x * free_x / old_free_x,
        source.image_width,
        width,
    );
    target.image_height = rescaled_dimension(
        previous.image_height,
        scale_y * free_y / old_free_y,
        source.image_height,
        height,
    );

    target.x_offset = scaled_offset(
        previous.x_offset,
        previous.width,
        previous.image_width,
        scale_x,
        width,
        target.image_width,
    );
    target.y_offset = scaled_offset(
        previous.y_offset,
        previous.height,
        previous.image_height,
        scale_y,
        height,
        target.image_height,
    );
}

/// Like [`scaled_dimension`], but a result below [`MIN_IMAGE_DIMENSION`]
/// falls back to the source caption's size.
fn rescaled_dimension(dimension: u32, factor: f64, source: u32, screen: u32) -> u32 {
    if factor == 1.0 {
        return dimension.min(screen);
    }
    let scaled = (dimension as f64 * factor + 0.5) as u32;
    if scaled < MIN_IMAGE_DIMENSION {
        source.min(screen)
    } else {
        scaled.min(screen)
    }
}

fn scale_factors(target: &TargetFrame, source: &SourceFrame) -> (f64, f64) {
    let factor = |t: u32, s: u32| if s == 0 { 1.0 } else { t as f64 / s as f64 };
    (
        factor(target.width, source.width),
        factor(target.height, source.height),
    )
}

/// `round(dimension * factor)`, falling back to the source size below
/// [`MIN_IMAGE_DIMENSION`] and capped at the screen size.
pub(crate) fn scaled_dimension(dimension: u32, factor: f64, screen: u32) -> u32 {
    let scaled = (dimension as f64 * factor + 0.5) as u32;
    if scaled < MIN_IMAGE_DIMENSION {
        dimension
    } else {
        scaled.min(screen)
    }
}

fn scaled_offset(
    offset: u32,
    screen_source: u32,
    image_source: u32,
    scale: f64,
    screen_target: u32,
    image_target: u32,
) -> u32 {
    let space_source = (screen_source as i64 - image_source as i64) as f64 * scale;
    let space_source = (space_source + 0.5) as i64;
    let space_target = screen_target as i64 - image_target as i64;
    let scaled = (offset as f64 * scale + 0.5) as i64;
    clamp_offset(
        scaled + (space_target - space_source) / 2,
        screen_target,
        image_target,
    )
}

fn clamp_offset(offset: i64, screen: u32, image: u32) -> u32 {
    let max = (screen as i64 - image as i64).max(0);
    offset.clamp(0, max) as u32
}
