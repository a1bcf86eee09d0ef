//! Caption descriptors.
//!
//! [`SourceFrame`] describes a caption as the input stream decoded it;
//! [`TargetFrame`] is the engine's editable copy, carrying the converted
//! geometry and timing plus per-caption edit state.

use crate::bitmap::ErasePatch;
use crate::timing::Ticks;

/// Captions are never scaled below this many pixels in either direction.
pub const MIN_IMAGE_DIMENSION: u32 = 8;

/// Geometry and timing of one decoded source caption.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFrame {
    /// Screen width in pixels.
    pub width: u32,
    /// Screen height in pixels.
    pub height: u32,
    /// Caption bitmap width.
    pub image_width: u32,
    /// Caption bitmap height.
    pub image_height: u32,
    /// Left edge of the caption on screen.
    pub x_offset: u32,
    /// Top edge of the caption on screen.
    pub y_offset: u32,
    /// Presentation start in 90 kHz ticks.
    pub start_time: Ticks,
    /// Presentation end in 90 kHz ticks.
    pub end_time: Ticks,
    /// Whether the caption is shown even with subtitles switched off.
    pub forced: bool,
}

/// The converted, editable descriptor of one caption.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetFrame {
    /// Screen width in pixels.
    pub width: u32,
    /// Screen height in pixels.
    pub height: u32,
    /// Caption bitmap width after scaling.
    pub image_width: u32,
    /// Caption bitmap height after scaling.
    pub image_height: u32,
    /// Left edge of the caption on screen.
    pub x_offset: u32,
    /// Top edge of the caption on screen.
    pub y_offset: u32,
    /// Presentation start in 90 kHz ticks.
    pub start_time: Ticks,
    /// Presentation end in 90 kHz ticks.
    pub end_time: Ticks,
    /// Forced flag after the override policy.
    pub forced: bool,
    /// Excluded captions are skipped by the exporter.
    pub excluded: bool,
    /// Rectangles painted transparent in the output bitmap, in bitmap
    /// coordinates.
    pub erase_patches: Vec<ErasePatch>,
    /// Set once the caption has gone through [`convert_frame`](crate::ConversionSession::convert_frame).
    pub was_decoded: bool,
    /// Presentation composition counter (Blu-ray SUP export only).
    pub composition_number: u32,
}

impl TargetFrame {
    /// A fresh target descriptor mirroring `source`.
    pub fn from_source(source: &SourceFrame) -> Self {
        Self {
            width: source.width,
            height: source.height,
            image_width: source.image_width,
            image_height: source.image_height,
            x_offset: source.x_offset,
            y_offset: source.y_offset,
            start_time: source.start_time,
            end_time: source.end_time,
            forced: source.forced,
            excluded: false,
            erase_patches: Vec::new(),
            was_decoded: false,
            composition_number: 0,
        }
    }

    /// Display duration in ticks.
    pub fn duration(&self) -> Ticks {
        self.end_time - self.start_time
    }

    /// Bottom edge (exclusive) of the caption.
    pub fn bottom(&self) -> u32 {
        self.y_offset + self.image_height
    }
}
