//! # supconv
//!
//! Convert bitmap subtitle captions between Blu-ray SUP, DVD (VobSub,
//! SUP/IFO) and Sony BDN XML conventions: retime them to another frame
//! rate, rescale them to another resolution, re-palette them for 4-colour
//! or 256-colour output and move them relative to the cinema bars.
//!
//! The crate is the conversion engine. Container readers hand captions in
//! through the [`SubtitleStream`] trait (an in-memory implementation,
//! [`MemoryStream`], and a JSON + PNG reader, [`image_sequence`], are
//! included); writers receive them through [`Exporter`] (a BDN XML + PNG
//! writer, [`BdnXmlExporter`], is included).
//!
//! ## Quick Start
//!
//! ```no_run
//! use supconv::{
//!     BdnXmlExporter, ConversionSession, ConversionSettings, JobOptions, MoveModeY, Resolution,
//!     FPS_24P, FPS_PAL, image_sequence,
//! };
//!
//! let sequence = image_sequence::load("captions/manifest.json")?;
//! let session = ConversionSession::new(sequence.stream);
//!
//! let settings = ConversionSettings::new()
//!     .with_resolution(Resolution::Pal)
//!     .with_frame_rates(FPS_24P, FPS_PAL)
//!     .with_move_mode_y(MoveModeY::Inside)
//!     .with_batch_mode(true);
//!
//! let report = session.scan(&settings)?;
//! println!("{report}");
//!
//! let mut exporter = BdnXmlExporter::new("out", "movie");
//! session.export(&mut exporter, &settings, &JobOptions::new())?;
//! # Ok::<(), supconv::ConvertError>(())
//! ```
//!
//! ## Features
//!
//! - **Retiming**: frame-rate conversion, delay, frame-grid sync and
//!   repair of overlapping, missing and too-short display times
//! - **Rescaling**: standard resolutions plus free scaling, with bilinear,
//!   bicubic, Lanczos-3, Mitchell and other kernels
//! - **Palette handling**: 4-colour DVD palettes matched against an edit
//!   palette or kept as decoded; 256-colour palettes kept, mapped or
//!   regenerated (optionally dithered)
//! - **Positioning**: move captions inside or outside cinemascope bars,
//!   align left, right or centre
//! - **Erase patches**: paint rectangles of a caption transparent with undo
//! - **Jobs**: one background job at a time with throttled progress,
//!   cooperative cancellation and per-job warning reports
//! - **PGCEdit palettes**: read and write the textual palette format
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `async` | `AsyncJob` and `ProgressStream` for awaiting jobs via Tokio |
//! | `rayon` | Row-parallel resampling on rayon's thread pool |
//! | `full` | Enables all of the above |

pub mod bitmap;
pub mod configuration;
pub mod conversion;
pub mod error;
pub mod export;
pub mod filter;
pub mod frame;
pub mod geometry;
pub mod image_sequence;
pub mod job;
pub mod labels;
pub mod palette;
pub mod palette_match;
pub mod position;
pub mod progress;
pub mod quantize;
#[cfg(feature = "rayon")]
mod rayon;
pub mod report;
pub mod session;
pub mod source;
#[cfg(feature = "async")]
pub mod stream;
pub mod timing;
pub mod transcode;

pub use bitmap::{Bitmap, ErasePatch};
pub use configuration::{
    ConversionSettings, FPS_23_975, FPS_24HZ, FPS_24P, FPS_NTSC, FPS_NTSC_I, FPS_PAL, FPS_PAL_I,
    ForcedFlagMode, JobOptions, MoveModeX, MoveModeY, OutputMode, PaletteMode, Resolution,
    ScalingFilter,
};
pub use error::ConvertError;
pub use export::{BdnXmlExporter, Exporter};
pub use frame::{SourceFrame, TargetFrame};
pub use job::{BatchJob, JobRunner, JobState};
pub use palette::{Palette, PaletteEntry};
pub use palette_match::FramePalette;
pub use position::CaptionType;
pub use progress::{
    CancellationToken, ChannelProgress, OperationType, ProgressCallback, ProgressInfo,
};
pub use report::JobReport;
pub use session::ConversionSession;
pub use source::{Caption, DvdCaption, DvdSubtitleStream, MemoryStream, SourceKind, SubtitleStream};
#[cfg(feature = "async")]
pub use stream::{AsyncJob, ProgressStream};
pub use timing::{Ticks, TimingIssue};
pub use transcode::TranscodedCaption;
