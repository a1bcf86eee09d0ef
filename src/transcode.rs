//! Bitmap transcoding: scale a decoded caption to its target size and bring
//! it into the output palette.
//!
//! 4-colour formats (VobSub, SUP/IFO) either keep the caption's DVD palette
//! or reduce it through alpha/luminance thresholds; 256-colour formats
//! (Blu-ray SUP, BDN XML) keep, map into, or regenerate the palette.

use crate::bitmap::{Bitmap, ErasePatch};
use crate::configuration::{ConversionSettings, PaletteMode};
use crate::filter::resample;
use crate::frame::MIN_IMAGE_DIMENSION;
use crate::palette::Palette;
use crate::palette_match::{DEFAULT_FRAME_ALPHA, FramePalette, decode_frame_palette};
use crate::quantize::{self, ReductionThresholds};
use crate::source::SourceKind;

/// A transcoded caption.
///
/// `bitmap` is the transcoder's output before erase patches; `patched`
/// holds the patched copy when patches exist, so patches can be changed
/// without transcoding again.
#[derive(Debug, Clone, Default)]
pub struct TranscodedCaption {
    /// Unpatched bitmap.
    pub bitmap: Bitmap,
    /// Bitmap with erase patches applied, if any.
    pub patched: Option<Bitmap>,
    /// Output palette.
    pub palette: Palette,
}

impl TranscodedCaption {
    /// The bitmap to export: patched if patches were applied.
    pub fn output(&self) -> &Bitmap {
        self.patched.as_ref().unwrap_or(&self.bitmap)
    }

    /// Re-apply `patches` on top of the unpatched bitmap.
    pub fn apply_patches(&mut self, patches: &[ErasePatch]) {
        self.patched = if patches.is_empty() {
            None
        } else {
            Some(apply_erase_patches(
                &self.bitmap,
                patches,
                self.palette.most_transparent_index(),
            ))
        };
    }
}

/// Paint every patch with `transparent_index` on a copy of `bitmap`.
pub fn apply_erase_patches(bitmap: &Bitmap, patches: &[ErasePatch], transparent_index: usize) -> Bitmap {
    let index = u8::try_from(transparent_index).unwrap_or(0);
    let mut patched = bitmap.clone();
    for patch in patches {
        patched.fill_rect(patch, index);
    }
    patched
}

/// The size the caption is actually scaled to: the target size, or the
/// source size if either is degenerate.
pub fn effective_size(bitmap: &Bitmap, target_width: u32, target_height: u32) -> (u32, u32) {
    let degenerate = |d: u32| d < MIN_IMAGE_DIMENSION;
    if degenerate(target_width)
        || degenerate(target_height)
        || degenerate(bitmap.width())
        || degenerate(bitmap.height())
    {
        (bitmap.width(), bitmap.height())
    } else {
        (target_width, target_height)
    }
}

/// Transcode one decoded caption.
///
/// `frame_palette` is the 4-colour palette chosen for the caption and is
/// only consulted for 4-colour output modes; without one, entries 0–3 of
/// the edit palette are used.
pub fn transcode(
    bitmap: &Bitmap,
    palette: &Palette,
    kind: SourceKind,
    frame_palette: Option<&FramePalette>,
    target_width: u32,
    target_height: u32,
    settings: &ConversionSettings,
) -> TranscodedCaption {
    let (width, height) = effective_size(bitmap, target_width, target_height);
    let same_size = (width, height) == (bitmap.width(), bitmap.height());
    let keep_palette = settings.palette_mode == PaletteMode::KeepExisting;

    log::debug!(
        "Transcoding {}x{} -> {width}x{height} ({:?}, {:?})",
        bitmap.width(),
        bitmap.height(),
        settings.output_mode,
        settings.palette_mode
    );

    let (bitmap, palette) = if settings.output_mode.uses_frame_palette() {
        let render_palette = frame_palette.map_or_else(
            || {
                decode_frame_palette(
                    [0, 1, 2, 3],
                    DEFAULT_FRAME_ALPHA,
                    &settings.edit_palette,
                    settings.alpha_crop,
                )
            },
            |fp| fp.render_palette.clone(),
        );
        let thresholds = ReductionThresholds {
            alpha: settings.alpha_threshold,
            luminance: settings.luminance_thresholds,
        };
        let keep_dvd = kind.is_dvd() && keep_palette;

        let reduced = match (same_size, keep_dvd) {
            (true, true) => bitmap.clone(),
            (true, false) => quantize::reduce_indexed(bitmap, palette, thresholds),
            (false, true) => {
                let scaled = scale(bitmap, palette, width, height, settings);
                quantize::match_luminance(&scaled, palette, settings.alpha_threshold)
            }
            (false, false) => {
                let scaled = scale(bitmap, palette, width, height, settings);
                quantize::reduce_to_four(&scaled, thresholds)
            }
        };
        (reduced, render_palette)
    } else if same_size {
        (bitmap.clone(), palette.clone())
    } else {
        let scaled = scale(bitmap, palette, width, height, settings);
        match settings.palette_mode {
            PaletteMode::KeepExisting => (quantize::map_to_palette(&scaled, palette), palette.clone()),
            PaletteMode::CreateNew => quantize::quantize(&scaled, false),
            PaletteMode::CreateDithered => quantize::quantize(&scaled, true),
        }
    };

    TranscodedCaption {
        bitmap,
        patched: None,
        palette,
    }
}

fn scale(
    bitmap: &Bitmap,
    palette: &Palette,
    width: u32,
    height: u32,
    settings: &ConversionSettings,
) -> image::RgbaImage {
    resample(&bitmap.to_rgba_image(palette), width, height, settings.scaling_filter)
}
