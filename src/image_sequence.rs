//! Caption input from a JSON manifest plus PNG images.
//!
//! The manifest describes the screen and lists one entry per caption:
//!
//! ```json
//! {
//!   "width": 1920, "height": 1080, "fps": 23.976,
//!   "frames": [
//!     { "image": "0001.png", "start_ms": 1000, "end_ms": 3500,
//!       "x": 660, "y": 920, "forced": false }
//!   ]
//! }
//! ```
//!
//! Image paths are relative to the manifest. Every PNG is quantised into an
//! indexed bitmap with its own palette, giving a [`MemoryStream`] of kind
//! [`SourceKind::Xml`].

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};

use crate::error::ConvertError;
use crate::frame::SourceFrame;
use crate::labels::parse_frame_rate;
use crate::quantize::quantize;
use crate::source::{Caption, MemoryStream, SourceKind};
use crate::timing::ms_to_ticks;

/// One caption entry of a manifest.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ManifestEntry {
    /// Image path, resolved against the manifest's directory.
    pub image: PathBuf,
    /// Start time in milliseconds.
    pub start_ms: f64,
    /// End time in milliseconds.
    pub end_ms: f64,
    /// Left edge on screen.
    #[serde(default)]
    pub x: u32,
    /// Top edge on screen.
    #[serde(default)]
    pub y: u32,
    /// Forced flag.
    #[serde(default)]
    pub forced: bool,
}

/// A parsed manifest.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Manifest {
    /// Screen width.
    pub width: u32,
    /// Screen height.
    pub height: u32,
    /// Frame rate the times were authored at, if given. Either a number or
    /// a frame-rate label such as `"pal"` or `"23.976"`.
    #[serde(default, deserialize_with = "frame_rate")]
    pub fps: Option<f64>,
    /// Captions in presentation order.
    #[serde(rename = "frames")]
    pub entries: Vec<ManifestEntry>,
}

/// A loaded image sequence.
pub struct ImageSequence {
    /// The captions, ready for a [`ConversionSession`](crate::ConversionSession).
    pub stream: MemoryStream,
    /// Frame rate declared by the manifest.
    pub fps: Option<f64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FrameRate {
    Number(f64),
    Label(String),
}

fn frame_rate<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<FrameRate>::deserialize(deserializer)? {
        Some(FrameRate::Number(fps)) => Some(fps).filter(|fps| *fps > 0.0),
        Some(FrameRate::Label(label)) => parse_frame_rate(&label),
        None => None,
    })
}

fn invalid(path: &Path, reason: impl Into<String>) -> ConvertError {
    ConvertError::Manifest {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

impl Manifest {
    /// Parse manifest `text`; `path` is used to resolve image paths and in
    /// error messages.
    ///
    /// # Errors
    ///
    /// [`ConvertError::JsonError`] for malformed JSON or missing fields,
    /// [`ConvertError::Manifest`] for a zero screen size.
    pub fn parse(path: &Path, text: &str) -> Result<Self, ConvertError> {
        let mut manifest: Manifest = serde_json::from_str(text)?;
        if manifest.width == 0 || manifest.height == 0 {
            return Err(invalid(path, "screen size must not be zero"));
        }
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for entry in &mut manifest.entries {
            entry.image = base.join(&entry.image);
        }
        Ok(manifest)
    }
}

/// Read a manifest and all of its images.
///
/// # Errors
///
/// I/O and PNG decoding errors, or [`ConvertError::Manifest`] if an image
/// does not fit on the declared screen.
pub fn load<P: AsRef<Path>>(path: P) -> Result<ImageSequence, ConvertError> {
    let path = path.as_ref();
    log::debug!("Loading image sequence {}", path.display());
    let manifest = Manifest::parse(path, &fs::read_to_string(path)?)?;

    let captions = manifest
        .entries
        .iter()
        .map(|entry| {
            let image = image::open(&entry.image)?.to_rgba8();
            if entry.x + image.width() > manifest.width || entry.y + image.height() > manifest.height {
                return Err(invalid(
                    path,
                    format!("{} does not fit on a {}x{} screen", entry.image.display(), manifest.width, manifest.height),
                ));
            }
            let (bitmap, palette) = quantize(&image, false);
            let frame = SourceFrame {
                width: manifest.width,
                height: manifest.height,
                image_width: image.width(),
                image_height: image.height(),
                x_offset: entry.x,
                y_offset: entry.y,
                start_time: ms_to_ticks(entry.start_ms),
                end_time: ms_to_ticks(entry.end_ms),
                forced: entry.forced,
            };
            Ok(Caption {
                frame,
                bitmap,
                palette,
            })
        })
        .collect::<Result<Vec<_>, ConvertError>>()?;

    log::debug!("Loaded {} captions", captions.len());
    Ok(ImageSequence {
        stream: MemoryStream::new(SourceKind::Xml, captions),
        fps: manifest.fps,
    })
}
