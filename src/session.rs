//! The conversion session: one loaded subtitle stream and its edited
//! target captions.
//!
//! [`ConversionSession`] owns everything a conversion works on (the source
//! stream, the target descriptors and the most recent transcoded caption)
//! behind a single lock. Decoding, palette selection and geometry updates
//! happen under that lock; scaling, patching and positioning run on data
//! captured from it, so a UI thread can keep reading frame descriptors while
//! a worker transcodes.
//!
//! # Example
//!
//! ```
//! use supconv::{
//!     Bitmap, Caption, ConversionSession, ConversionSettings, MemoryStream, Palette,
//!     PaletteEntry, SourceFrame, SourceKind,
//! };
//!
//! let frame = SourceFrame {
//!     width: 720, height: 576, image_width: 16, image_height: 8,
//!     x_offset: 100, y_offset: 500, start_time: 0, end_time: 90_000, forced: false,
//! };
//! let palette = Palette::from_entries(vec![
//!     PaletteEntry::new(0, 0, 0, 0),
//!     PaletteEntry::new(255, 255, 255, 255),
//! ]);
//! let caption = Caption { frame, bitmap: Bitmap::filled(16, 8, 1), palette };
//! let session = ConversionSession::new(MemoryStream::new(SourceKind::BdSup, vec![caption]));
//!
//! let report = session.scan(&ConversionSettings::new())?;
//! assert!(report.errors.is_empty());
//! assert_eq!(session.frame_count()?, 1);
//! # Ok::<(), supconv::ConvertError>(())
//! ```

use std::sync::{Mutex, MutexGuard};

use crate::bitmap::{Bitmap, ErasePatch};
use crate::configuration::{ConversionSettings, JobOptions, MoveModeY, Resolution};
use crate::error::ConvertError;
use crate::export::Exporter;
use crate::frame::{SourceFrame, TargetFrame};
use crate::geometry::{self, ScanOutcome};
use crate::palette::Palette;
use crate::palette_match::{FramePalette, select_palette};
use crate::position::{CaptionType, position};
use crate::progress::{OperationType, ProgressTracker};
use crate::report::JobReport;
use crate::source::{SourceKind, SubtitleStream};
use crate::transcode::{TranscodedCaption, transcode};

struct SessionState {
    stream: Box<dyn SubtitleStream>,
    frames: Vec<TargetFrame>,
    resolution: Option<Resolution>,
    scanned_with: Option<ConversionSettings>,
    current: Option<(usize, TranscodedCaption)>,
}

/// Everything captured under the lock that the unlocked half of
/// [`ConversionSession::convert_frame`] needs.
struct Captured {
    kind: SourceKind,
    bitmap: Bitmap,
    palette: Palette,
    frame_palette: Option<FramePalette>,
    target: TargetFrame,
}

/// One loaded stream plus its converted caption descriptors.
///
/// All methods take `&self`; the session is `Sync` and is usually shared
/// through an `Arc` with a [`JobRunner`](crate::JobRunner).
pub struct ConversionSession {
    state: Mutex<SessionState>,
    report: Mutex<JobReport>,
}

impl ConversionSession {
    /// Wrap a loaded stream. Call [`scan`](Self::scan) before anything else.
    pub fn new<S: SubtitleStream + 'static>(stream: S) -> Self {
        Self::from_boxed(Box::new(stream))
    }

    /// Wrap an already boxed stream.
    pub fn from_boxed(stream: Box<dyn SubtitleStream>) -> Self {
        Self {
            state: Mutex::new(SessionState {
                stream,
                frames: Vec::new(),
                resolution: None,
                scanned_with: None,
                current: None,
            }),
            report: Mutex::new(JobReport::default()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, SessionState>, ConvertError> {
        Ok(self.state.lock()?)
    }

    fn record(&self, f: impl FnOnce(&mut JobReport)) -> Result<(), ConvertError> {
        f(&mut *self.report.lock()?);
        Ok(())
    }

    /// Hand out the accumulated report and reset the counters.
    fn take_report(&self) -> Result<JobReport, ConvertError> {
        let report = self.report.lock()?.take();
        log::info!(
            "Job finished with {} warning(s), {} error(s)",
            report.warning_count(),
            report.error_count()
        );
        Ok(report)
    }

    /// Build target descriptors for every caption of the stream.
    ///
    /// Timing repairs are returned as warnings in the report.
    ///
    /// # Errors
    ///
    /// [`ConvertError::InvalidSettings`] if `settings` do not validate,
    /// [`ConvertError::NoFramesLoaded`] for an empty stream.
    pub fn scan(&self, settings: &ConversionSettings) -> Result<JobReport, ConvertError> {
        self.scan_with_options(settings, &JobOptions::new())
    }

    /// Like [`scan`](Self::scan), reporting [`OperationType::Read`]
    /// progress and checking for cancellation before every caption.
    /// A cancelled scan leaves the previous descriptors in place.
    pub fn scan_with_options(
        &self,
        settings: &ConversionSettings,
        options: &JobOptions,
    ) -> Result<JobReport, ConvertError> {
        settings.validate()?;
        let mut state = self.lock()?;
        let sources = source_frames(state.stream.as_ref(), options)?;
        let outcome = geometry::scan(&sources, settings);
        self.store(&mut state, outcome, settings)?;
        drop(state);
        self.take_report()
    }

    /// Re-derive target descriptors after a settings change, keeping
    /// exclusion, forced flags and erase patches. Falls back to
    /// [`scan`](Self::scan) if nothing was scanned yet.
    pub fn rescan(&self, settings: &ConversionSettings) -> Result<JobReport, ConvertError> {
        self.rescan_with_options(settings, &JobOptions::new())
    }

    /// Like [`rescan`](Self::rescan), with progress and cancellation.
    pub fn rescan_with_options(
        &self,
        settings: &ConversionSettings,
        options: &JobOptions,
    ) -> Result<JobReport, ConvertError> {
        settings.validate()?;
        let mut state = self.lock()?;
        let Some(old) = state.scanned_with.clone() else {
            drop(state);
            return self.scan_with_options(settings, options);
        };
        let sources = source_frames(state.stream.as_ref(), options)?;
        let outcome = geometry::rescan(&state.frames, &sources, settings, &old);
        self.store(&mut state, outcome, settings)?;
        drop(state);
        self.take_report()
    }

    fn store(
        &self,
        state: &mut SessionState,
        outcome: ScanOutcome,
        settings: &ConversionSettings,
    ) -> Result<(), ConvertError> {
        log::debug!(
            "Scanned {} captions, output resolution {:?}",
            outcome.frames.len(),
            outcome.resolution
        );
        self.record(|report| report.extend_timing(&outcome.issues))?;
        state.frames = outcome.frames;
        state.resolution = Some(outcome.resolution);
        state.scanned_with = Some(settings.clone());
        state.current = None;
        Ok(())
    }

    /// Decode and convert caption `index`.
    ///
    /// The decode, palette selection and geometry update run under the
    /// session lock; transcoding and erase patches run outside it. In batch
    /// mode the caption is also repositioned. With `skip_scaling` only the
    /// geometry is updated and `None` is returned.
    ///
    /// # Errors
    ///
    /// [`ConvertError::FrameOutOfRange`], or whatever the stream's decoder
    /// reports.
    pub fn convert_frame(
        &self,
        index: usize,
        skip_scaling: bool,
        settings: &ConversionSettings,
    ) -> Result<Option<TranscodedCaption>, ConvertError> {
        let captured = self.decode_locked(index, settings)?;

        let caption = if skip_scaling {
            None
        } else {
            let mut caption = transcode(
                &captured.bitmap,
                &captured.palette,
                captured.kind,
                captured.frame_palette.as_ref(),
                captured.target.image_width,
                captured.target.image_height,
                settings,
            );
            caption.apply_patches(&captured.target.erase_patches);
            Some(caption)
        };

        let mut target = captured.target;
        if settings.batch_mode {
            target = self.place(index, &target, settings)?;
        }
        target.was_decoded = true;

        let mut state = self.lock()?;
        if let Some(slot) = state.frames.get_mut(index) {
            slot.image_width = target.image_width;
            slot.image_height = target.image_height;
            slot.x_offset = target.x_offset;
            slot.y_offset = target.y_offset;
            slot.was_decoded = true;
        }
        if let Some(caption) = &caption {
            state.current = Some((index, caption.clone()));
        }
        Ok(caption)
    }

    fn decode_locked(&self, index: usize, settings: &ConversionSettings) -> Result<Captured, ConvertError> {
        let mut state = self.lock()?;
        let frame_count = state.frames.len();
        if frame_count == 0 {
            return Err(ConvertError::NoFramesLoaded);
        }
        if index >= frame_count {
            return Err(ConvertError::FrameOutOfRange { index, frame_count });
        }

        log::debug!("Decoding caption {index}");
        state.stream.decode(index)?;
        let stream = state.stream.as_ref();
        let frame_palette = if settings.output_mode.uses_frame_palette() {
            Some(select_palette(index, stream, settings)?)
        } else {
            None
        };
        let source = decoded_source(stream, index)?;
        let kind = stream.kind();
        let bitmap = stream.bitmap().clone();
        let palette = stream.palette().clone();

        let target = &mut state.frames[index];
        geometry::update_target_image(target, &source, settings);
        Ok(Captured {
            kind,
            bitmap,
            palette,
            frame_palette,
            target: target.clone(),
        })
    }

    fn place(
        &self,
        index: usize,
        frame: &TargetFrame,
        settings: &ConversionSettings,
    ) -> Result<TargetFrame, ConvertError> {
        let (moved, caption_type) = position(frame, settings);
        if caption_type == CaptionType::Full && settings.move_mode_y != MoveModeY::Keep {
            self.record(|report| {
                report.warn(format!("Caption {} not moved (too large)", index + 1))
            })?;
        }
        Ok(moved)
    }

    /// Reposition every caption, decoding those not converted yet (without
    /// scaling them).
    ///
    /// A caption that fails to decode is listed in the report's errors and
    /// left where it is; the pass carries on with the next one.
    ///
    /// # Errors
    ///
    /// [`ConvertError::Cancelled`] if the token in `options` fires.
    pub fn move_all(&self, settings: &ConversionSettings, options: &JobOptions) -> Result<JobReport, ConvertError> {
        let count = self.frame_count()?;
        if count == 0 {
            return Err(ConvertError::NoFramesLoaded);
        }
        let mut tracker = ProgressTracker::new(options.progress.clone(), OperationType::MoveAll, count as u64);
        for index in 0..count {
            options.check_cancelled()?;
            if !self.frame(index)?.was_decoded {
                match self.convert_frame(index, true, settings) {
                    Ok(_) => {}
                    Err(e @ ConvertError::Decode { .. }) => {
                        self.record(|report| {
                            report.error(format!("Caption {} not moved: {e}", index + 1))
                        })?;
                        tracker.advance(index);
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }
            let frame = self.frame(index)?;
            let moved = self.place(index, &frame, settings)?;
            self.update_frame(index, |f| {
                f.x_offset = moved.x_offset;
                f.y_offset = moved.y_offset;
            })?;
            tracker.advance(index);
        }
        tracker.finish();
        self.take_report()
    }

    /// Convert and write every exported caption.
    ///
    /// Excluded captions are skipped, as are unforced ones when exporting
    /// forced captions only. Composition numbers are assigned in export
    /// order. On cancellation or failure the exporter is told to remove its
    /// partial output and the error is returned.
    pub fn export(
        &self,
        exporter: &mut dyn Exporter,
        settings: &ConversionSettings,
        options: &JobOptions,
    ) -> Result<JobReport, ConvertError> {
        let frames = self.frames()?;
        if frames.is_empty() {
            return Err(ConvertError::NoFramesLoaded);
        }
        let selected: Vec<usize> = frames
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.excluded && (!settings.export_forced_only || f.forced))
            .map(|(i, _)| i)
            .collect();
        log::debug!(
            "Exporting {} of {} captions as {:?}",
            selected.len(),
            frames.len(),
            settings.output_mode
        );

        exporter.begin(settings, selected.len())?;
        match self.export_selected(exporter, &selected, settings, options) {
            Ok(written) => {
                if let Err(e) = exporter.finish(&written) {
                    exporter.abort();
                    return Err(e);
                }
                self.record(|report| {
                    report.note(format!("Exported {} caption(s)", written.len()))
                })?;
                self.take_report()
            }
            Err(e) => {
                log::debug!("Export aborted: {e}");
                exporter.abort();
                // Counters start fresh for the next job either way.
                self.take_report()?;
                Err(e)
            }
        }
    }

    fn export_selected(
        &self,
        exporter: &mut dyn Exporter,
        selected: &[usize],
        settings: &ConversionSettings,
        options: &JobOptions,
    ) -> Result<Vec<TargetFrame>, ConvertError> {
        let mut tracker =
            ProgressTracker::new(options.progress.clone(), OperationType::Write, selected.len() as u64);
        let mut written = Vec::with_capacity(selected.len());
        for (position, &index) in selected.iter().enumerate() {
            options.check_cancelled()?;
            let caption = self
                .convert_frame(index, false, settings)?
                .ok_or_else(|| ConvertError::Unexpected(format!("caption {index} not transcoded")))?;
            let composition_number = (position as u32) * 2;
            let frame = self.update_frame(index, |f| f.composition_number = composition_number)?;
            exporter.write_frame(&frame, caption.output(), &caption.palette)?;
            written.push(frame);
            tracker.advance(index);
        }
        tracker.finish();
        Ok(written)
    }

    fn update_frame(
        &self,
        index: usize,
        edit: impl FnOnce(&mut TargetFrame),
    ) -> Result<TargetFrame, ConvertError> {
        let mut state = self.lock()?;
        let frame_count = state.frames.len();
        let frame = state
            .frames
            .get_mut(index)
            .ok_or(ConvertError::FrameOutOfRange { index, frame_count })?;
        edit(frame);
        Ok(frame.clone())
    }

    /// Number of scanned captions.
    pub fn frame_count(&self) -> Result<usize, ConvertError> {
        Ok(self.lock()?.frames.len())
    }

    /// A copy of caption `index`'s descriptor.
    pub fn frame(&self, index: usize) -> Result<TargetFrame, ConvertError> {
        let state = self.lock()?;
        state.frames.get(index).cloned().ok_or(ConvertError::FrameOutOfRange {
            index,
            frame_count: state.frames.len(),
        })
    }

    /// Copies of all descriptors.
    pub fn frames(&self) -> Result<Vec<TargetFrame>, ConvertError> {
        Ok(self.lock()?.frames.clone())
    }

    /// Output resolution determined by the last scan.
    pub fn resolution(&self) -> Result<Option<Resolution>, ConvertError> {
        Ok(self.lock()?.resolution)
    }

    /// The most recently transcoded caption and its index.
    pub fn current_caption(&self) -> Result<Option<(usize, TranscodedCaption)>, ConvertError> {
        Ok(self.lock()?.current.clone())
    }

    /// Exclude caption `index` from export (or include it again).
    pub fn set_excluded(&self, index: usize, excluded: bool) -> Result<(), ConvertError> {
        self.update_frame(index, |f| f.excluded = excluded).map(drop)
    }

    /// Set the forced flag of caption `index`.
    pub fn set_forced(&self, index: usize, forced: bool) -> Result<(), ConvertError> {
        self.update_frame(index, |f| f.forced = forced).map(drop)
    }

    /// Add an erase patch to caption `index`. If that caption is the
    /// current one, its patched bitmap is refreshed from the cached
    /// unpatched one.
    pub fn add_erase_patch(&self, index: usize, patch: ErasePatch) -> Result<(), ConvertError> {
        self.edit_patches(index, |patches| patches.push(patch))
    }

    /// Remove the most recently added erase patch of caption `index`.
    pub fn undo_erase_patch(&self, index: usize) -> Result<(), ConvertError> {
        self.edit_patches(index, |patches| {
            patches.pop();
        })
    }

    /// Remove all erase patches of caption `index`.
    pub fn clear_erase_patches(&self, index: usize) -> Result<(), ConvertError> {
        self.edit_patches(index, Vec::clear)
    }

    fn edit_patches(&self, index: usize, edit: impl FnOnce(&mut Vec<ErasePatch>)) -> Result<(), ConvertError> {
        let mut state = self.lock()?;
        let frame_count = state.frames.len();
        let SessionState { frames, current, .. } = &mut *state;
        let frame = frames
            .get_mut(index)
            .ok_or(ConvertError::FrameOutOfRange { index, frame_count })?;
        edit(&mut frame.erase_patches);
        if let Some((current_index, caption)) = current {
            if *current_index == index {
                caption.apply_patches(&frame.erase_patches);
            }
        }
        Ok(())
    }

    /// Run `f` with exclusive access to the source stream, e.g. to replace
    /// a DVD stream's source palette.
    pub fn with_stream<R>(&self, f: impl FnOnce(&mut dyn SubtitleStream) -> R) -> Result<R, ConvertError> {
        let mut state = self.lock()?;
        Ok(f(state.stream.as_mut()))
    }
}

fn source_frames(
    stream: &dyn SubtitleStream,
    options: &JobOptions,
) -> Result<Vec<SourceFrame>, ConvertError> {
    let frame_count = stream.frame_count();
    if frame_count == 0 {
        return Err(ConvertError::NoFramesLoaded);
    }
    let mut tracker = ProgressTracker::new(options.progress.clone(), OperationType::Read, frame_count as u64);
    let mut sources = Vec::with_capacity(frame_count);
    for index in 0..frame_count {
        options.check_cancelled()?;
        let source = stream
            .source_frame(index)
            .cloned()
            .ok_or(ConvertError::FrameOutOfRange { index, frame_count })?;
        sources.push(source);
        tracker.advance(index);
    }
    tracker.finish();
    Ok(sources)
}

/// The source descriptor of caption `index` with the image size the
/// decoder actually produced.
fn decoded_source(stream: &dyn SubtitleStream, index: usize) -> Result<SourceFrame, ConvertError> {
    let mut source = stream
        .source_frame(index)
        .cloned()
        .ok_or(ConvertError::FrameOutOfRange {
            index,
            frame_count: stream.frame_count(),
        })?;
    source.image_width = stream.bitmap().width();
    source.image_height = stream.bitmap().height();
    Ok(source)
}
