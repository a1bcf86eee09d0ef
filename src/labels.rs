//! Display names and command-line keys for the configuration enums.
//!
//! The enums in [`configuration`](crate::configuration) carry no
//! presentation logic; everything user-facing is looked up here.
//!
//! # Example
//!
//! ```
//! use supconv::labels::{self, RESOLUTIONS};
//! use supconv::Resolution;
//!
//! assert_eq!(labels::display_name(RESOLUTIONS, Resolution::Pal), "PAL (720x576)");
//! assert_eq!(labels::parse(RESOLUTIONS, "1080p"), Some(Resolution::Hd1080));
//! ```

use crate::configuration::{
    FPS_23_975, FPS_24HZ, FPS_24P, FPS_NTSC, FPS_NTSC_I, FPS_PAL, FPS_PAL_I, ForcedFlagMode,
    MoveModeX, MoveModeY, OutputMode, PaletteMode, Resolution, ScalingFilter,
};

/// One row of a lookup table.
#[derive(Debug, Clone, Copy)]
pub struct Label<T> {
    /// The enum value.
    pub value: T,
    /// Short machine key, as accepted on the command line.
    pub key: &'static str,
    /// Human-readable name.
    pub name: &'static str,
}

const fn label<T>(value: T, key: &'static str, name: &'static str) -> Label<T> {
    Label { value, key, name }
}

/// Output resolutions.
pub const RESOLUTIONS: &[Label<Resolution>] = &[
    label(Resolution::Ntsc, "ntsc", "NTSC (720x480)"),
    label(Resolution::Pal, "pal", "PAL (720x576)"),
    label(Resolution::Hd720, "720p", "720p (1280x720)"),
    label(Resolution::Hd1440x1080, "1440x1080", "1080p- (1440x1080)"),
    label(Resolution::Hd1080, "1080p", "1080p (1920x1080)"),
];

/// Output formats.
pub const OUTPUT_MODES: &[Label<OutputMode>] = &[
    label(OutputMode::VobSub, "vobsub", "SUB/IDX (VobSub)"),
    label(OutputMode::SupIfo, "supifo", "SUP/IFO (SUP DVD)"),
    label(OutputMode::BdSup, "bdsup", "SUP (BD)"),
    label(OutputMode::Xml, "xml", "XML (SONY BDN)"),
];

/// Palette policies.
pub const PALETTE_MODES: &[Label<PaletteMode>] = &[
    label(PaletteMode::KeepExisting, "keep", "keep existing"),
    label(PaletteMode::CreateNew, "create", "create new"),
    label(PaletteMode::CreateDithered, "dither", "dithered"),
];

/// Scaling filters.
pub const SCALING_FILTERS: &[Label<ScalingFilter>] = &[
    label(ScalingFilter::Bilinear, "bilinear", "Bilinear"),
    label(ScalingFilter::Triangle, "triangle", "Triangle"),
    label(ScalingFilter::Bicubic, "bicubic", "Bicubic"),
    label(ScalingFilter::Bell, "bell", "Bell"),
    label(ScalingFilter::Hermite, "hermite", "Hermite"),
    label(ScalingFilter::Lanczos3, "lanczos3", "Lanczos3"),
    label(ScalingFilter::Mitchell, "mitchell", "Mitchell"),
    label(ScalingFilter::BSpline, "bspline", "B-Spline"),
];

/// Forced-flag policies.
pub const FORCED_FLAG_MODES: &[Label<ForcedFlagMode>] = &[
    label(ForcedFlagMode::Keep, "keep", "keep"),
    label(ForcedFlagMode::Set, "set", "set all"),
    label(ForcedFlagMode::Clear, "clear", "clear all"),
];

/// Horizontal move modes.
pub const MOVE_MODES_X: &[Label<MoveModeX>] = &[
    label(MoveModeX::Keep, "keep", "keep"),
    label(MoveModeX::Left, "left", "left"),
    label(MoveModeX::Right, "right", "right"),
    label(MoveModeX::Center, "center", "center"),
];

/// Vertical move modes.
pub const MOVE_MODES_Y: &[Label<MoveModeY>] = &[
    label(MoveModeY::Keep, "keep", "keep"),
    label(MoveModeY::Inside, "inside", "inside bars"),
    label(MoveModeY::Outside, "outside", "outside bars"),
];

/// Named frame rates, with the label BDN XML uses for each.
pub const FRAME_RATES: &[Label<f64>] = &[
    label(FPS_24P, "24p", "23.976"),
    label(FPS_23_975, "23.975", "23.975"),
    label(FPS_24HZ, "24", "24"),
    label(FPS_PAL, "pal", "25"),
    label(FPS_NTSC, "ntsc", "29.97"),
    label(FPS_PAL_I, "pali", "50"),
    label(FPS_NTSC_I, "ntsci", "59.94"),
];

/// Human-readable name of `value`.
pub fn display_name<T: PartialEq + Copy>(table: &[Label<T>], value: T) -> &'static str {
    table
        .iter()
        .find(|l| l.value == value)
        .map_or("unknown", |l| l.name)
}

/// Short key of `value`.
pub fn key<T: PartialEq + Copy>(table: &[Label<T>], value: T) -> &'static str {
    table
        .iter()
        .find(|l| l.value == value)
        .map_or("unknown", |l| l.key)
}

/// Look up a value by key or display name, ignoring ASCII case.
pub fn parse<T: Copy>(table: &[Label<T>], text: &str) -> Option<T> {
    let text = text.trim();
    table
        .iter()
        .find(|l| l.key.eq_ignore_ascii_case(text) || l.name.eq_ignore_ascii_case(text))
        .map(|l| l.value)
}

/// Parse a frame rate given by key (`24p`, `pal`, …), BDN label
/// (`23.976`, `29.97`, …) or any positive number.
pub fn parse_frame_rate(text: &str) -> Option<f64> {
    parse(FRAME_RATES, text).or_else(|| {
        text.trim()
            .parse::<f64>()
            .ok()
            .filter(|fps| fps.is_finite() && *fps > 0.0)
    })
}

/// The BDN label of `fps` (`23.976`, `25`, …), or the number itself with
/// three decimals.
pub fn frame_rate_name(fps: f64) -> String {
    FRAME_RATES
        .iter()
        .find(|l| (l.value - fps).abs() < 1e-9)
        .map_or_else(|| format!("{fps:.3}"), |l| l.name.to_string())
}
