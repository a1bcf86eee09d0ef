//! Caption placement relative to the screen edges and cinema bars.

use crate::configuration::{ConversionSettings, MoveModeX, MoveModeY};
use crate::frame::TargetFrame;

/// Where a caption sits vertically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionType {
    /// Entirely in the upper half of the screen.
    Up,
    /// Entirely in the lower half of the screen.
    Down,
    /// Crosses the middle of the screen; never moved vertically.
    Full,
}

/// Classify `frame` by the half of the screen it occupies.
pub fn classify(frame: &TargetFrame) -> CaptionType {
    let middle = frame.height / 2;
    let top = frame.y_offset;
    let bottom = frame.bottom();
    if top < middle && bottom < middle {
        CaptionType::Up
    } else if top > middle && bottom > middle {
        CaptionType::Down
    } else {
        CaptionType::Full
    }
}

/// Move `frame` according to the move modes of `settings`.
///
/// Returns the repositioned copy and the caption's classification. Applying
/// the same settings twice gives the same result as applying them once.
///
/// Vertically, captions move to the cinema bar (`Inside`) or screen edge
/// (`Outside`) plus the Y offset, then stay at least `crop_offset_y` away
/// from both edges. Horizontally, `Left`/`Right` fall back to centring when
/// the X offset does not fit.
pub fn position(frame: &TargetFrame, settings: &ConversionSettings) -> (TargetFrame, CaptionType) {
    let mut moved = frame.clone();
    let caption_type = classify(frame);

    let height = frame.height as i64;
    let image_height = frame.image_height as i64;
    let offset_y = settings.move_offset_y as i64;
    let crop = settings.crop_offset_y as i64;
    let bar = (frame.height as f64 * settings.cine_bar_factor + 0.5) as i64;

    if settings.move_mode_y != MoveModeY::Keep {
        let inside = settings.move_mode_y == MoveModeY::Inside;
        let y = match caption_type {
            CaptionType::Full => frame.y_offset as i64,
            CaptionType::Up if inside => bar + offset_y,
            CaptionType::Up => offset_y,
            CaptionType::Down if inside => height - bar - offset_y - image_height,
            CaptionType::Down => height - offset_y - image_height,
        };
        let y_max = height - image_height - crop;
        let y = if y < crop { crop } else { y.min(y_max) };
        moved.y_offset = y.max(0) as u32;
    }

    let width = frame.width as i64;
    let image_width = frame.image_width as i64;
    let offset_x = settings.move_offset_x as i64;
    let space = width - image_width;
    let x = match settings.move_mode_x {
        MoveModeX::Keep => frame.x_offset as i64,
        MoveModeX::Left if space >= offset_x => offset_x,
        MoveModeX::Right if space >= offset_x => space - offset_x,
        MoveModeX::Left | MoveModeX::Right | MoveModeX::Center => space / 2,
    };
    moved.x_offset = x.max(0) as u32;

    (moved, caption_type)
}
