//! Conversion configuration.
//!
//! [`ConversionSettings`] is the immutable snapshot every engine call works
//! from: target resolution, frame-rate conversion, timing repair, scaling,
//! palette and placement policies. [`JobOptions`] threads progress callbacks
//! and cancellation tokens through long-running passes without polluting
//! every signature.
//!
//! # Example
//!
//! ```
//! use supconv::{
//!     ConversionSettings, MoveModeY, OutputMode, Resolution, ScalingFilter, FPS_PAL, FPS_24P,
//! };
//!
//! let settings = ConversionSettings::new()
//!     .with_resolution(Resolution::Pal)
//!     .with_frame_rates(FPS_24P, FPS_PAL)
//!     .with_output_mode(OutputMode::VobSub)
//!     .with_scaling_filter(ScalingFilter::Lanczos3)
//!     .with_move_mode_y(MoveModeY::Inside);
//! assert!(settings.validate().is_ok());
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use crate::error::ConvertError;
use crate::palette::Palette;
use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};
use crate::timing::{Ticks, ms_to_ticks};

/// 23.976 fps (24000/1001), the usual Blu-ray film rate.
pub const FPS_24P: f64 = 24000.0 / 1001.0;
/// 23.975 fps, as written by some authoring tools.
pub const FPS_23_975: f64 = 23.975;
/// Exactly 24 fps.
pub const FPS_24HZ: f64 = 24.0;
/// PAL, 25 fps.
pub const FPS_PAL: f64 = 25.0;
/// NTSC, 29.97 fps (30000/1001).
pub const FPS_NTSC: f64 = 30000.0 / 1001.0;
/// PAL interlaced field rate, 50 fps.
pub const FPS_PAL_I: f64 = 50.0;
/// NTSC interlaced field rate, 59.94 fps (60000/1001).
pub const FPS_NTSC_I: f64 = 60000.0 / 1001.0;

/// Smallest free-scale factor accepted by [`ConversionSettings::validate`].
pub const MIN_FREE_SCALE_FACTOR: f64 = 0.5;
/// Largest free-scale factor accepted by [`ConversionSettings::validate`].
pub const MAX_FREE_SCALE_FACTOR: f64 = 2.0;

/// Standard output resolutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    /// 720×480.
    Ntsc,
    /// 720×576.
    Pal,
    /// 1280×720.
    Hd720,
    /// 1440×1080.
    Hd1440x1080,
    /// 1920×1080.
    Hd1080,
}

impl Resolution {
    /// Screen `(width, height)` in pixels.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Resolution::Ntsc => (720, 480),
            Resolution::Pal => (720, 576),
            Resolution::Hd720 => (1280, 720),
            Resolution::Hd1440x1080 => (1440, 1080),
            Resolution::Hd1080 => (1920, 1080),
        }
    }

    /// The smallest standard resolution that contains `width`×`height`.
    pub fn from_dimensions(width: u32, height: u32) -> Resolution {
        [
            Resolution::Ntsc,
            Resolution::Pal,
            Resolution::Hd720,
            Resolution::Hd1440x1080,
        ]
        .into_iter()
        .find(|resolution| {
            let (w, h) = resolution.dimensions();
            width <= w && height <= h
        })
        .unwrap_or(Resolution::Hd1080)
    }
}

/// Container format the converted captions are written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// DVD VobSub (SUB/IDX), 4 colours per caption.
    VobSub,
    /// DVD SUP with IFO, 4 colours per caption.
    SupIfo,
    /// Blu-ray SUP, up to 256 colours.
    #[default]
    BdSup,
    /// Sony BDN XML with PNG images, up to 256 colours.
    Xml,
}

impl OutputMode {
    /// Whether this format limits every caption to a 4-entry frame palette.
    pub fn uses_frame_palette(self) -> bool {
        matches!(self, OutputMode::VobSub | OutputMode::SupIfo)
    }
}

/// How the palette of converted captions is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaletteMode {
    /// Reuse the source palette.
    KeepExisting,
    /// Build a new palette.
    #[default]
    CreateNew,
    /// Build a new palette and dither towards it.
    CreateDithered,
}

/// Resampling kernel used when captions change size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScalingFilter {
    /// Plain bilinear interpolation.
    #[default]
    Bilinear,
    /// Triangle (tent) kernel, support 1.
    Triangle,
    /// Catmull-Rom style bicubic kernel, support 2.
    Bicubic,
    /// Bell kernel, support 1.5.
    Bell,
    /// Hermite kernel, support 1.
    Hermite,
    /// Lanczos kernel with three lobes.
    Lanczos3,
    /// Mitchell–Netravali kernel (B = C = 1/3).
    Mitchell,
    /// Cubic B-spline kernel, support 2.
    BSpline,
}

/// Override applied to each caption's forced flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForcedFlagMode {
    /// Leave the flag as decoded.
    #[default]
    Keep,
    /// Mark every caption as forced.
    Set,
    /// Clear the flag on every caption.
    Clear,
}

/// Horizontal placement policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveModeX {
    /// Keep the current x offset.
    #[default]
    Keep,
    /// Align to the left edge plus offset.
    Left,
    /// Align to the right edge minus offset.
    Right,
    /// Centre horizontally.
    Center,
}

/// Vertical placement policy relative to the cinemascope bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveModeY {
    /// Keep the current y offset.
    #[default]
    Keep,
    /// Move inside the active picture area (between the bars).
    Inside,
    /// Move outside the active picture area (onto the bars).
    Outside,
}

/// Snapshot of all settings that drive a conversion.
///
/// Built with the `with_*` methods; each engine call reads it without
/// mutating it.
#[derive(Debug, Clone)]
pub struct ConversionSettings {
    pub(crate) resolution: Resolution,
    pub(crate) convert_resolution: bool,
    pub(crate) fps_source: f64,
    pub(crate) fps_target: f64,
    pub(crate) convert_fps: bool,
    pub(crate) delay: Ticks,
    pub(crate) min_duration: Ticks,
    pub(crate) fix_short_frames: bool,
    pub(crate) free_scale: (f64, f64),
    pub(crate) apply_free_scale: bool,
    pub(crate) forced_flag: ForcedFlagMode,
    pub(crate) export_forced_only: bool,
    pub(crate) output_mode: OutputMode,
    pub(crate) palette_mode: PaletteMode,
    pub(crate) scaling_filter: ScalingFilter,
    pub(crate) alpha_threshold: u8,
    pub(crate) luminance_thresholds: [u8; 2],
    pub(crate) alpha_crop: u8,
    pub(crate) move_mode_x: MoveModeX,
    pub(crate) move_mode_y: MoveModeY,
    pub(crate) move_offset_x: u32,
    pub(crate) move_offset_y: u32,
    pub(crate) cine_bar_factor: f64,
    pub(crate) crop_offset_y: u32,
    pub(crate) batch_mode: bool,
    pub(crate) edit_palette: Palette,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversionSettings {
    /// Create settings with the stock defaults: no resolution or frame-rate
    /// conversion, 500 ms minimum duration (not enforced), bilinear scaling,
    /// the default DVD edit palette, and no repositioning.
    pub fn new() -> Self {
        Self {
            resolution: Resolution::Hd1080,
            convert_resolution: false,
            fps_source: FPS_24P,
            fps_target: FPS_24P,
            convert_fps: false,
            delay: 0,
            min_duration: ms_to_ticks(500.0),
            fix_short_frames: false,
            free_scale: (1.0, 1.0),
            apply_free_scale: false,
            forced_flag: ForcedFlagMode::Keep,
            export_forced_only: false,
            output_mode: OutputMode::BdSup,
            palette_mode: PaletteMode::CreateNew,
            scaling_filter: ScalingFilter::Bilinear,
            alpha_threshold: 80,
            luminance_thresholds: [210, 160],
            alpha_crop: 14,
            move_mode_x: MoveModeX::Keep,
            move_mode_y: MoveModeY::Keep,
            move_offset_x: 10,
            move_offset_y: 10,
            cine_bar_factor: 5.0 / 42.0,
            crop_offset_y: 0,
            batch_mode: false,
            edit_palette: Palette::default_dvd(),
        }
    }

    /// Convert to the given output resolution.
    #[must_use]
    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self.convert_resolution = true;
        self
    }

    /// Keep every caption at its source resolution.
    #[must_use]
    pub fn without_resolution_conversion(mut self) -> Self {
        self.convert_resolution = false;
        self
    }

    /// Set source and target frame rates and enable frame-rate conversion.
    #[must_use]
    pub fn with_frame_rates(mut self, source: f64, target: f64) -> Self {
        self.fps_source = source;
        self.fps_target = target;
        self.convert_fps = true;
        self
    }

    /// Set the frame rate used for timestamp quantisation without
    /// retiming captions.
    #[must_use]
    pub fn with_target_fps(mut self, fps: f64) -> Self {
        self.fps_target = fps;
        self.fps_source = fps;
        self.convert_fps = false;
        self
    }

    /// Shift every caption by `delay` ticks (may be negative).
    #[must_use]
    pub fn with_delay(mut self, delay: Ticks) -> Self {
        self.delay = delay;
        self
    }

    /// Minimum display duration in ticks. When `fix` is `true`, shorter
    /// captions are extended; otherwise they are only reported.
    #[must_use]
    pub fn with_min_duration(mut self, min_duration: Ticks, fix: bool) -> Self {
        self.min_duration = min_duration.max(0);
        self.fix_short_frames = fix;
        self
    }

    /// Apply additional free-scale factors on top of the resolution change.
    #[must_use]
    pub fn with_free_scale(mut self, x: f64, y: f64) -> Self {
        self.free_scale = (x, y);
        self.apply_free_scale = true;
        self
    }

    /// Override the forced flag of every caption.
    #[must_use]
    pub fn with_forced_flag(mut self, mode: ForcedFlagMode) -> Self {
        self.forced_flag = mode;
        self
    }

    /// Only export captions whose forced flag is set.
    #[must_use]
    pub fn with_export_forced_only(mut self, forced_only: bool) -> Self {
        self.export_forced_only = forced_only;
        self
    }

    /// Select the output container format.
    #[must_use]
    pub fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = mode;
        self
    }

    /// Select how output palettes are produced.
    #[must_use]
    pub fn with_palette_mode(mut self, mode: PaletteMode) -> Self {
        self.palette_mode = mode;
        self
    }

    /// Select the resampling kernel.
    #[must_use]
    pub fn with_scaling_filter(mut self, filter: ScalingFilter) -> Self {
        self.scaling_filter = filter;
        self
    }

    /// Alpha below which a pixel becomes transparent in 4-colour reduction.
    #[must_use]
    pub fn with_alpha_threshold(mut self, threshold: u8) -> Self {
        self.alpha_threshold = threshold;
        self
    }

    /// Luminance thresholds `[light, medium]` used in 4-colour reduction.
    #[must_use]
    pub fn with_luminance_thresholds(mut self, light: u8, medium: u8) -> Self {
        self.luminance_thresholds = [light, medium];
        self
    }

    /// Frame-palette entries whose byte-scale alpha is below this value
    /// render fully transparent.
    #[must_use]
    pub fn with_alpha_crop(mut self, alpha_crop: u8) -> Self {
        self.alpha_crop = alpha_crop;
        self
    }

    /// Horizontal placement policy and offset in pixels.
    #[must_use]
    pub fn with_move_mode_x(mut self, mode: MoveModeX) -> Self {
        self.move_mode_x = mode;
        self
    }

    /// Vertical placement policy.
    #[must_use]
    pub fn with_move_mode_y(mut self, mode: MoveModeY) -> Self {
        self.move_mode_y = mode;
        self
    }

    /// Distances kept from the screen edge (or bar edge) when moving.
    #[must_use]
    pub fn with_move_offsets(mut self, x: u32, y: u32) -> Self {
        self.move_offset_x = x;
        self.move_offset_y = y;
        self
    }

    /// Fraction of the screen height covered by one cinemascope bar.
    #[must_use]
    pub fn with_cine_bar_factor(mut self, factor: f64) -> Self {
        self.cine_bar_factor = factor;
        self
    }

    /// Rows at the top and bottom that captions must never enter.
    #[must_use]
    pub fn with_crop_offset_y(mut self, crop: u32) -> Self {
        self.crop_offset_y = crop;
        self
    }

    /// Non-interactive mode: every converted caption is repositioned
    /// immediately.
    #[must_use]
    pub fn with_batch_mode(mut self, batch: bool) -> Self {
        self.batch_mode = batch;
        self
    }

    /// Replace the edit palette used to synthesise 4-colour frame palettes.
    #[must_use]
    pub fn with_edit_palette(mut self, palette: Palette) -> Self {
        self.edit_palette = palette;
        self
    }

    /// The configured output resolution.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Whether resolution conversion is enabled.
    pub fn converts_resolution(&self) -> bool {
        self.convert_resolution
    }

    /// Target frame rate.
    pub fn fps_target(&self) -> f64 {
        self.fps_target
    }

    /// The output container format.
    pub fn output_mode(&self) -> OutputMode {
        self.output_mode
    }

    /// The edit palette.
    pub fn edit_palette(&self) -> &Palette {
        &self.edit_palette
    }

    /// Free-scale factors in effect (`(1.0, 1.0)` when disabled).
    pub(crate) fn effective_free_scale(&self) -> (f64, f64) {
        if self.apply_free_scale {
            self.free_scale
        } else {
            (1.0, 1.0)
        }
    }

    /// Check that the snapshot can be applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::InvalidSettings`] for non-positive frame
    /// rates, free-scale factors outside
    /// [`MIN_FREE_SCALE_FACTOR`]..=[`MAX_FREE_SCALE_FACTOR`], a cine-bar
    /// factor outside `0.0..0.5`, or an empty edit palette.
    pub fn validate(&self) -> Result<(), ConvertError> {
        if !(self.fps_source > 0.0 && self.fps_target > 0.0) {
            return Err(ConvertError::InvalidSettings(format!(
                "frame rates must be positive (source {}, target {})",
                self.fps_source, self.fps_target
            )));
        }
        if self.apply_free_scale {
            let range = MIN_FREE_SCALE_FACTOR..=MAX_FREE_SCALE_FACTOR;
            if !range.contains(&self.free_scale.0) || !range.contains(&self.free_scale.1) {
                return Err(ConvertError::InvalidSettings(format!(
                    "free-scale factors {:?} outside {MIN_FREE_SCALE_FACTOR}..={MAX_FREE_SCALE_FACTOR}",
                    self.free_scale
                )));
            }
        }
        if !(0.0..0.5).contains(&self.cine_bar_factor) {
            return Err(ConvertError::InvalidSettings(format!(
                "cine-bar factor {} outside 0.0..0.5",
                self.cine_bar_factor
            )));
        }
        if self.edit_palette.is_empty() {
            return Err(ConvertError::InvalidSettings(
                "edit palette has no entries".to_string(),
            ));
        }
        Ok(())
    }
}

/// Operational settings for long-running passes (export, move-all).
///
/// Carries an optional progress callback and cancellation token.
#[derive(Clone)]
pub struct JobOptions {
    /// Progress callback. Defaults to a no-op.
    pub(crate) progress: Arc<dyn ProgressCallback>,
    /// Cancellation token. `None` means never cancelled.
    pub(crate) cancellation: Option<CancellationToken>,
}

impl Debug for JobOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("JobOptions")
            .field("has_cancellation", &self.cancellation.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for JobOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl JobOptions {
    /// No progress reporting, never cancelled.
    pub fn new() -> Self {
        Self {
            progress: Arc::new(NoOpProgress),
            cancellation: None,
        }
    }

    /// Attach a progress callback.
    ///
    /// The callback fires whenever the integer completion percentage
    /// increases.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token.
    ///
    /// The token is checked before every caption; once cancelled, the pass
    /// stops and returns [`ConvertError::Cancelled`].
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Returns [`ConvertError::Cancelled`] if cancellation has been requested.
    pub(crate) fn check_cancelled(&self) -> Result<(), ConvertError> {
        if self
            .cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
        {
            Err(ConvertError::Cancelled)
        } else {
            Ok(())
        }
    }
}
