//! Per-caption palette selection for 4-colour output formats.
//!
//! DVD output allows four colours per caption, chosen from a 16-entry
//! palette. Captions that bring their own DVD frame palette can keep it;
//! everything else is matched against the edit palette: the caption's
//! primary colour picks the nearest light shade, its darker partner becomes
//! the outline colour.

use crate::configuration::{ConversionSettings, PaletteMode};
use crate::error::ConvertError;
use crate::palette::{Palette, PaletteEntry, rgb_distance};
use crate::source::SubtitleStream;

/// Alpha nibbles of a synthesised frame palette: transparent background,
/// opaque pattern, outline and anti-alias colours.
pub const DEFAULT_FRAME_ALPHA: [u8; 4] = [0, 0xf, 0xf, 0xf];

/// The 4-colour palette chosen for one caption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePalette {
    /// Indices into the edit (or DVD source) palette.
    pub indices: [u8; 4],
    /// Alpha nibbles (0–15).
    pub alpha: [u8; 4],
    /// The four resulting colours, alpha already cropped.
    pub render_palette: Palette,
}

/// Index of the edit-palette light shade nearest to `rgb`.
///
/// Index 1 (white) is tried first, then the even light-shade indices 2, 4,
/// 6, …; the search stops at an exact match. Returns 0 for palettes with
/// fewer than two entries.
pub fn nearest_edit_color(edit_palette: &Palette, rgb: [u8; 3]) -> usize {
    let candidates = std::iter::once(1).chain((2..edit_palette.len()).step_by(2));
    let mut best = 0;
    let mut min_distance = u32::MAX;
    for index in candidates.take_while(|&i| i < edit_palette.len()) {
        let distance = rgb_distance(rgb, edit_palette.rgb(index));
        if distance < min_distance {
            best = index;
            min_distance = distance;
            if distance == 0 {
                break;
            }
        }
    }
    best
}

/// Build the four render colours from palette `indices` and alpha nibbles.
///
/// Entries whose byte-scale alpha falls below `alpha_crop` become ARGB 0,
/// whatever their colour.
pub fn decode_frame_palette(
    indices: [u8; 4],
    alpha: [u8; 4],
    palette: &Palette,
    alpha_crop: u8,
) -> Palette {
    let entries = indices
        .iter()
        .zip(alpha.iter())
        .map(|(&index, &nibble)| {
            let a = (nibble.min(0xf) as u32 * 0xff / 0xf) as u8;
            if a >= alpha_crop {
                let [r, g, b] = palette.rgb(index as usize);
                PaletteEntry::new(r, g, b, a)
            } else {
                PaletteEntry::from_argb(0)
            }
        })
        .collect();
    Palette::from_entries(entries)
}

/// Choose the frame palette for the caption `index` currently decoded in
/// `stream`.
///
/// # Errors
///
/// [`ConvertError::Unexpected`] if the stream claims to be DVD-origin but
/// does not expose its DVD capabilities.
pub fn select_palette(
    index: usize,
    stream: &dyn SubtitleStream,
    settings: &ConversionSettings,
) -> Result<FramePalette, ConvertError> {
    if stream.kind().is_dvd() && settings.palette_mode == PaletteMode::KeepExisting {
        let dvd = stream.as_dvd().ok_or_else(|| {
            ConvertError::Unexpected("DVD stream without DVD palette access".to_string())
        })?;
        let indices = dvd.frame_palette(index);
        let alpha = dvd.frame_alpha(index);
        return Ok(FramePalette {
            indices,
            alpha,
            render_palette: decode_frame_palette(
                indices,
                alpha,
                dvd.source_palette(),
                settings.alpha_crop,
            ),
        });
    }

    let primary = stream.palette().rgb(stream.primary_color_index());
    let edit = &settings.edit_palette;
    let color = nearest_edit_color(edit, primary);
    // White pairs with gray, skipping the light gray at index 2.
    let outline = if color == 1 { 3 } else { color + 1 };
    let indices = [0, color.min(255) as u8, outline.min(255) as u8, 0];
    log::debug!(
        "Caption {index}: primary {primary:?} matched edit palette entry {color}"
    );

    Ok(FramePalette {
        indices,
        alpha: DEFAULT_FRAME_ALPHA,
        render_palette: decode_frame_palette(indices, DEFAULT_FRAME_ALPHA, edit, settings.alpha_crop),
    })
}
