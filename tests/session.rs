//! Conversion session integration tests: scanning, per-caption conversion,
//! positioning, export and cancellation.

use std::fs;
use std::sync::Arc;

use supconv::position::classify;
use supconv::{
    BdnXmlExporter, Bitmap, CancellationToken, Caption, CaptionType, ConversionSession,
    ConversionSettings, ConvertError, DvdCaption, ErasePatch, Exporter, FPS_PAL, JobOptions,
    MemoryStream, MoveModeY, OutputMode, Palette, PaletteEntry, PaletteMode, ProgressCallback,
    ProgressInfo, Resolution, SourceFrame, SourceKind, TargetFrame,
};

fn two_tone() -> Palette {
    Palette::from_entries(vec![
        PaletteEntry::new(0, 0, 0, 0),
        PaletteEntry::new(255, 255, 255, 255),
    ])
}

fn source_frame(index: i64, forced: bool) -> SourceFrame {
    let start = index * 180_000;
    SourceFrame {
        width: 720,
        height: 576,
        image_width: 64,
        image_height: 16,
        x_offset: 328,
        y_offset: 520,
        start_time: start,
        end_time: start + 90_000,
        forced,
    }
}

fn caption(index: i64, forced: bool) -> Caption {
    Caption {
        frame: source_frame(index, forced),
        bitmap: Bitmap::filled(64, 16, 1),
        palette: two_tone(),
    }
}

/// Five white captions on the PAL grid, two seconds apart.
fn session_with(forced: &[usize]) -> ConversionSession {
    let captions = (0..5)
        .map(|i| caption(i as i64, forced.contains(&i)))
        .collect();
    ConversionSession::new(MemoryStream::new(SourceKind::BdSup, captions))
}

fn pal_settings() -> ConversionSettings {
    ConversionSettings::new().with_target_fps(FPS_PAL)
}

/// Remembers everything it is given.
#[derive(Default)]
struct RecordingExporter {
    written: Vec<(TargetFrame, Bitmap, Palette)>,
    finished: Vec<TargetFrame>,
    aborted: bool,
}

impl Exporter for RecordingExporter {
    fn begin(&mut self, _settings: &ConversionSettings, _caption_count: usize) -> Result<(), ConvertError> {
        Ok(())
    }

    fn write_frame(&mut self, frame: &TargetFrame, bitmap: &Bitmap, palette: &Palette) -> Result<(), ConvertError> {
        self.written.push((frame.clone(), bitmap.clone(), palette.clone()));
        Ok(())
    }

    fn finish(&mut self, frames: &[TargetFrame]) -> Result<(), ConvertError> {
        self.finished = frames.to_vec();
        Ok(())
    }

    fn abort(&mut self) {
        self.aborted = true;
    }
}

/// Cancels its token once `after` captions are done.
struct CancelAfter {
    token: CancellationToken,
    after: u64,
}

impl ProgressCallback for CancelAfter {
    fn on_progress(&self, info: &ProgressInfo) {
        if info.current >= self.after {
            self.token.cancel();
        }
    }
}

// ── Scan ───────────────────────────────────────────────────────────

#[test]
fn scan_builds_one_descriptor_per_caption() {
    let session = session_with(&[]);

    let report = session.scan(&pal_settings()).expect("Failed to scan");

    assert!(report.is_clean(), "unexpected report: {report}");
    assert_eq!(session.frame_count().expect("count"), 5);
    assert_eq!(session.resolution().expect("resolution"), Some(Resolution::Pal));
    let frame = session.frame(3).expect("frame 3");
    assert_eq!((frame.start_time, frame.end_time), (540_000, 630_000));
}

#[test]
fn scan_reports_timing_repairs() {
    let mut overlapping = caption(0, false);
    overlapping.frame.end_time = 270_000;
    let stream = MemoryStream::new(SourceKind::BdSup, vec![overlapping, caption(1, false)]);
    let session = ConversionSession::new(stream);

    let report = session.scan(&pal_settings()).expect("Failed to scan");

    assert_eq!(report.warning_count(), 1);
    assert!(report.warnings[0].contains("caption 1"), "got: {report}");
    assert_eq!(session.frame(0).expect("frame 0").end_time, 180_000);
}

#[test]
fn report_counters_reset_between_jobs() {
    let mut overlapping = caption(0, false);
    overlapping.frame.end_time = 270_000;
    let stream = MemoryStream::new(SourceKind::BdSup, vec![overlapping, caption(1, false)]);
    let session = ConversionSession::new(stream);

    let first = session.scan(&pal_settings()).expect("Failed to scan");
    let second = session
        .move_all(&pal_settings(), &JobOptions::new())
        .expect("Failed to move");

    assert_eq!(first.warning_count(), 1);
    assert!(second.is_clean(), "warnings leaked into next job: {second}");
}

#[test]
fn scan_of_empty_stream_fails() {
    let session = ConversionSession::new(MemoryStream::new(SourceKind::BdSup, Vec::new()));

    match session.scan(&pal_settings()).unwrap_err() {
        ConvertError::NoFramesLoaded => {}
        other => panic!("Expected NoFramesLoaded, got: {other}"),
    }
}

#[test]
fn rescan_keeps_manual_edits() {
    let session = session_with(&[]);
    session.scan(&pal_settings()).expect("Failed to scan");
    session.set_excluded(3, true).expect("exclude");
    session.set_forced(1, true).expect("force");

    session
        .rescan(&pal_settings().with_resolution(Resolution::Hd1080))
        .expect("Failed to rescan");

    assert!(session.frame(3).expect("frame 3").excluded);
    assert!(session.frame(1).expect("frame 1").forced);
    assert_eq!(session.frame(0).expect("frame 0").width, 1920);
    assert_eq!(session.resolution().expect("resolution"), Some(Resolution::Hd1080));
}

#[test]
fn rescan_before_scan_scans() {
    let session = session_with(&[]);
    session.rescan(&pal_settings()).expect("Failed to rescan");
    assert_eq!(session.frame_count().expect("count"), 5);
}

#[test]
fn rescan_keeps_moved_position() {
    let session = session_with(&[]);
    let settings = pal_settings()
        .with_move_mode_y(MoveModeY::Outside)
        .with_move_offsets(10, 10);
    session.scan(&settings).expect("Failed to scan");
    session
        .move_all(&settings, &JobOptions::new())
        .expect("Failed to move");
    assert_eq!(session.frame(1).expect("frame 1").y_offset, 550);

    // One PAL frame of delay changes timing only.
    session
        .rescan(&settings.clone().with_delay(3_600))
        .expect("Failed to rescan");

    let frame = session.frame(1).expect("frame 1");
    assert_eq!((frame.x_offset, frame.y_offset), (328, 550));
    assert_eq!(frame.start_time, 183_600);
}

#[test]
fn rescan_scales_moved_position_to_new_resolution() {
    let session = session_with(&[]);
    let settings = pal_settings()
        .with_move_mode_y(MoveModeY::Outside)
        .with_move_offsets(10, 10);
    session.scan(&settings).expect("Failed to scan");
    session
        .move_all(&settings, &JobOptions::new())
        .expect("Failed to move");

    session
        .rescan(&settings.with_resolution(Resolution::Hd1080))
        .expect("Failed to rescan");

    let frame = session.frame(0).expect("frame 0");
    assert_eq!((frame.image_width, frame.image_height), (171, 30));
    // The 10-row bottom margin scales with the screen: 1080 - 1031 - 30 = 19.
    assert_eq!((frame.x_offset, frame.y_offset), (875, 1031));
}

// ── convert_frame ──────────────────────────────────────────────────

#[test]
fn convert_at_same_resolution_keeps_bitmap() {
    let session = session_with(&[]);
    let settings = pal_settings();
    session.scan(&settings).expect("Failed to scan");

    let caption = session
        .convert_frame(0, false, &settings)
        .expect("Failed to convert")
        .expect("caption was scaled");

    assert_eq!(caption.bitmap, Bitmap::filled(64, 16, 1));
    assert_eq!(caption.palette, two_tone());
    assert!(session.frame(0).expect("frame 0").was_decoded);
    let (index, current) = session
        .current_caption()
        .expect("current")
        .expect("a current caption");
    assert_eq!(index, 0);
    assert_eq!(current.bitmap, caption.bitmap);
}

#[test]
fn convert_to_1080p_scales_bitmap() {
    let session = session_with(&[]);
    let settings = pal_settings().with_resolution(Resolution::Hd1080);
    session.scan(&settings).expect("Failed to scan");

    let caption = session
        .convert_frame(2, false, &settings)
        .expect("Failed to convert")
        .expect("caption was scaled");

    assert_eq!((caption.bitmap.width(), caption.bitmap.height()), (171, 30));
    let frame = session.frame(2).expect("frame 2");
    assert_eq!((frame.image_width, frame.image_height), (171, 30));
}

#[test]
fn skip_scaling_only_updates_geometry() {
    let session = session_with(&[]);
    let settings = pal_settings();
    session.scan(&settings).expect("Failed to scan");

    let result = session.convert_frame(1, true, &settings).expect("Failed to convert");

    assert!(result.is_none());
    assert!(session.frame(1).expect("frame 1").was_decoded);
    assert!(session.current_caption().expect("current").is_none());
}

#[test]
fn batch_mode_repositions_converted_caption() {
    let session = session_with(&[]);
    let settings = pal_settings()
        .with_batch_mode(true)
        .with_move_mode_y(MoveModeY::Outside)
        .with_move_offsets(10, 10);
    session.scan(&settings).expect("Failed to scan");

    session.convert_frame(0, false, &settings).expect("Failed to convert");

    let frame = session.frame(0).expect("frame 0");
    assert_eq!(frame.y_offset, 576 - 10 - 16);
    assert_eq!(classify(&frame), CaptionType::Down);
    // Untouched captions stay where they were.
    assert_eq!(session.frame(1).expect("frame 1").y_offset, 520);
}

#[test]
fn convert_out_of_range() {
    let session = session_with(&[]);
    session.scan(&pal_settings()).expect("Failed to scan");

    match session.convert_frame(9, false, &pal_settings()).unwrap_err() {
        ConvertError::FrameOutOfRange { index, frame_count } => {
            assert_eq!((index, frame_count), (9, 5));
        }
        other => panic!("Expected FrameOutOfRange, got: {other}"),
    }
}

// ── move_all ───────────────────────────────────────────────────────

#[test]
fn move_all_positions_every_caption() {
    let session = session_with(&[]);
    let settings = pal_settings()
        .with_move_mode_y(MoveModeY::Inside)
        .with_move_offsets(10, 10);
    session.scan(&settings).expect("Failed to scan");

    let report = session
        .move_all(&settings, &JobOptions::new())
        .expect("Failed to move");

    assert!(report.is_clean(), "unexpected report: {report}");
    // One bar is round(576 * 5 / 42) = 69 rows.
    for frame in session.frames().expect("frames") {
        assert_eq!(frame.y_offset, 576 - 69 - 10 - 16);
        assert!(frame.was_decoded);
    }
}

#[test]
fn move_all_warns_about_full_height_captions() {
    let mut tall = caption(0, false);
    tall.frame.image_height = 300;
    tall.frame.y_offset = 200;
    tall.bitmap = Bitmap::filled(64, 300, 1);
    let session = ConversionSession::new(MemoryStream::new(SourceKind::BdSup, vec![tall]));
    let settings = pal_settings().with_move_mode_y(MoveModeY::Inside);
    session.scan(&settings).expect("Failed to scan");

    let report = session
        .move_all(&settings, &JobOptions::new())
        .expect("Failed to move");

    assert_eq!(report.warnings, vec!["Caption 1 not moved (too large)".to_string()]);
    assert_eq!(session.frame(0).expect("frame 0").y_offset, 200);
}

#[test]
fn move_all_reports_undecodable_caption_and_moves_the_rest() {
    let mut captions: Vec<Caption> = (0..3).map(|i| caption(i, false)).collect();
    captions[1].bitmap = Bitmap::filled(63, 16, 1);
    let session = ConversionSession::new(MemoryStream::new(SourceKind::BdSup, captions));
    let settings = pal_settings()
        .with_move_mode_y(MoveModeY::Outside)
        .with_move_offsets(10, 10);
    session.scan(&settings).expect("Failed to scan");

    let report = session
        .move_all(&settings, &JobOptions::new())
        .expect("Failed to move");

    assert_eq!(report.error_count(), 1, "unexpected report: {report}");
    assert!(report.errors[0].starts_with("Caption 2 not moved"), "got: {}", report.errors[0]);
    assert!(report.errors[0].contains("63x16"), "got: {}", report.errors[0]);

    let frames = session.frames().expect("frames");
    assert_eq!(frames[0].y_offset, 576 - 10 - 16);
    assert_eq!(frames[2].y_offset, 576 - 10 - 16);
    assert_eq!(frames[1].y_offset, 520);
    assert!(!frames[1].was_decoded);
}

// ── Export ─────────────────────────────────────────────────────────

#[test]
fn export_writes_pngs_and_manifest() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let session = session_with(&[]);
    let settings = pal_settings();
    session.scan(&settings).expect("Failed to scan");

    let mut exporter = BdnXmlExporter::new(dir.path(), "movie");
    let report = session
        .export(&mut exporter, &settings, &JobOptions::new())
        .expect("Failed to export");

    assert_eq!(report.info, vec!["Exported 5 caption(s)".to_string()]);
    for n in 1..=5 {
        assert!(dir.path().join(format!("movie_{n:04}.png")).is_file(), "missing PNG {n}");
    }
    let xml = fs::read_to_string(exporter.manifest_path()).expect("Failed to read manifest");
    assert!(xml.contains(r#"NumberofEvents="5""#), "{xml}");
    assert!(xml.contains(r#"VideoFormat="576i""#), "{xml}");
    assert!(xml.contains(r#"FrameRate="25""#), "{xml}");
    assert!(xml.contains(r#"InTC="00:00:02:00" OutTC="00:00:03:00""#), "{xml}");
    assert!(xml.contains(r#"<Graphic Width="64" Height="16" X="328" Y="520">movie_0001.png</Graphic>"#), "{xml}");
    assert_eq!(exporter.created_files().len(), 6);
}

#[test]
fn manifest_escapes_names() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let session = session_with(&[]);
    let settings = pal_settings();
    session.scan(&settings).expect("Failed to scan");

    let mut exporter = BdnXmlExporter::new(dir.path(), "Tom & Jerry").with_language("<en>");
    session
        .export(&mut exporter, &settings, &JobOptions::new())
        .expect("Failed to export");

    let xml = fs::read_to_string(exporter.manifest_path()).expect("Failed to read manifest");
    assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#), "{xml}");
    assert!(xml.contains(r#"<Name Title="Tom &amp; Jerry" Content=""/>"#), "{xml}");
    assert!(xml.contains(r#"<Language Code="&lt;en&gt;"/>"#), "{xml}");
    assert!(xml.contains(">Tom &amp; Jerry_0001.png</Graphic>"), "{xml}");
    assert!(!xml.contains("Tom & Jerry"), "{xml}");
}

#[test]
fn exported_png_decodes_to_caption_pixels() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let session = session_with(&[]);
    let settings = pal_settings();
    session.scan(&settings).expect("Failed to scan");

    let mut exporter = BdnXmlExporter::new(dir.path(), "movie");
    session
        .export(&mut exporter, &settings, &JobOptions::new())
        .expect("Failed to export");

    let png = image::open(dir.path().join("movie_0001.png"))
        .expect("Failed to open PNG")
        .to_rgba8();
    assert_eq!(png.dimensions(), (64, 16));
    assert_eq!(png.get_pixel(5, 5).0, [255, 255, 255, 255]);
}

#[test]
fn export_skips_excluded_and_unforced_captions() {
    let session = session_with(&[0, 2, 3]);
    let settings = pal_settings().with_export_forced_only(true);
    session.scan(&settings).expect("Failed to scan");
    session.set_excluded(3, true).expect("exclude");

    let mut exporter = RecordingExporter::default();
    let report = session
        .export(&mut exporter, &settings, &JobOptions::new())
        .expect("Failed to export");

    let starts: Vec<i64> = exporter.written.iter().map(|(f, _, _)| f.start_time).collect();
    assert_eq!(starts, vec![0, 360_000]);
    assert_eq!(exporter.finished.len(), 2);
    assert!(!exporter.aborted);
    assert_eq!(report.info, vec!["Exported 2 caption(s)".to_string()]);

    // Composition numbers follow export order.
    assert_eq!(session.frame(0).expect("frame 0").composition_number, 0);
    assert_eq!(session.frame(2).expect("frame 2").composition_number, 2);
}

#[test]
fn export_applies_erase_patches() {
    let session = session_with(&[]);
    let settings = pal_settings();
    session.scan(&settings).expect("Failed to scan");
    session
        .add_erase_patch(0, ErasePatch::new(0, 0, 8, 8))
        .expect("Failed to add patch");

    let mut exporter = RecordingExporter::default();
    session
        .export(&mut exporter, &settings, &JobOptions::new())
        .expect("Failed to export");

    let (_, bitmap, _) = &exporter.written[0];
    assert_eq!(bitmap.get(3, 3), Some(0));
    assert_eq!(bitmap.get(10, 10), Some(1));
    let (_, untouched, _) = &exporter.written[1];
    assert_eq!(untouched.get(3, 3), Some(1));
}

#[test]
fn cancelled_export_leaves_no_files() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let out = dir.path().join("out");
    let session = session_with(&[]);
    let settings = pal_settings();
    session.scan(&settings).expect("Failed to scan");

    let token = CancellationToken::new();
    let options = JobOptions::new()
        .with_progress(Arc::new(CancelAfter {
            token: token.clone(),
            after: 2,
        }))
        .with_cancellation(token.clone());
    let mut exporter = BdnXmlExporter::new(&out, "movie");

    let result = session.export(&mut exporter, &settings, &options);

    match result.unwrap_err() {
        ConvertError::Cancelled => {}
        other => panic!("Expected Cancelled, got: {other}"),
    }
    assert!(token.is_cancelled());
    let remaining = fs::read_dir(&out).expect("Failed to list output").count();
    assert_eq!(remaining, 0, "partial output left behind");

    // The session stays usable.
    let report = session.scan(&settings).expect("Failed to rescan");
    assert!(report.is_clean());
}

#[test]
fn pre_cancelled_export_writes_nothing() {
    let session = session_with(&[]);
    let settings = pal_settings();
    session.scan(&settings).expect("Failed to scan");
    let token = CancellationToken::new();
    token.cancel();

    let mut exporter = RecordingExporter::default();
    let result = session.export(&mut exporter, &settings, &JobOptions::new().with_cancellation(token));

    assert!(result.unwrap_err().is_cancellation());
    assert!(exporter.written.is_empty());
    assert!(exporter.aborted);
}

// ── 4-colour output ────────────────────────────────────────────────

#[test]
fn four_colour_export_matches_edit_palette() {
    let session = session_with(&[]);
    let settings = pal_settings().with_output_mode(OutputMode::VobSub);
    session.scan(&settings).expect("Failed to scan");

    let mut exporter = RecordingExporter::default();
    session
        .export(&mut exporter, &settings, &JobOptions::new())
        .expect("Failed to export");

    let (_, bitmap, palette) = &exporter.written[0];
    assert_eq!(palette.len(), 4);
    assert_eq!(palette.alpha(0), 0);
    // White matches the edit palette's white, outlined in gray.
    assert_eq!(palette.entry(1).rgba(), [0xf0, 0xf0, 0xf0, 0xff]);
    assert_eq!(palette.rgb(2), [0x99, 0x99, 0x99]);
    assert!(bitmap.pixels().iter().all(|&p| p == 1));
}

fn dvd_session() -> ConversionSession {
    let captions = (0..2)
        .map(|i| DvdCaption {
            frame: source_frame(i, false),
            bitmap: Bitmap::filled(64, 16, 1),
            palette: [0, 6, 7, 0],
            alpha: [0, 15, 15, 15],
        })
        .collect();
    ConversionSession::new(MemoryStream::dvd(
        SourceKind::VobSub,
        Palette::default_dvd(),
        captions,
        0,
    ))
}

#[test]
fn dvd_captions_keep_their_frame_palette() {
    let session = dvd_session();
    let settings = pal_settings()
        .with_output_mode(OutputMode::VobSub)
        .with_palette_mode(PaletteMode::KeepExisting);
    session.scan(&settings).expect("Failed to scan");

    let mut exporter = RecordingExporter::default();
    session
        .export(&mut exporter, &settings, &JobOptions::new())
        .expect("Failed to export");

    let (_, bitmap, palette) = &exporter.written[0];
    assert_eq!(bitmap, &Bitmap::filled(64, 16, 1));
    assert_eq!(palette.entry(0), PaletteEntry::from_argb(0));
    assert_eq!(palette.entry(1).rgba(), [0xfa, 0x33, 0x33, 0xff]);
    assert_eq!(palette.rgb(2), [0xbb, 0x11, 0x11]);
}

#[test]
fn replacing_dvd_source_palette_changes_output() {
    let session = dvd_session();
    let settings = pal_settings()
        .with_output_mode(OutputMode::VobSub)
        .with_palette_mode(PaletteMode::KeepExisting);
    session.scan(&settings).expect("Failed to scan");

    let mut replacement = Palette::default_dvd();
    replacement.set_rgb(6, [1, 2, 3]);
    let replaced = session
        .with_stream(|stream| {
            stream
                .as_dvd_mut()
                .map(|dvd| dvd.set_source_palette(replacement))
                .is_some()
        })
        .expect("stream access");
    assert!(replaced);

    let mut exporter = RecordingExporter::default();
    session
        .export(&mut exporter, &settings, &JobOptions::new())
        .expect("Failed to export");

    assert_eq!(exporter.written[0].2.rgb(1), [1, 2, 3]);
}

// ── Erase patches ──────────────────────────────────────────────────

#[test]
fn erase_patch_refreshes_current_caption_and_undoes() {
    let session = session_with(&[]);
    let settings = pal_settings();
    session.scan(&settings).expect("Failed to scan");
    session.convert_frame(0, false, &settings).expect("Failed to convert");

    session
        .add_erase_patch(0, ErasePatch::new(0, 0, 4, 4))
        .expect("Failed to add patch");
    let (_, current) = session.current_caption().expect("current").expect("caption");
    assert_eq!(current.output().get(1, 1), Some(0));
    assert_eq!(current.bitmap.get(1, 1), Some(1));

    session.undo_erase_patch(0).expect("Failed to undo");
    let (_, current) = session.current_caption().expect("current").expect("caption");
    assert!(current.patched.is_none());
    assert_eq!(current.output().get(1, 1), Some(1));

    session.add_erase_patch(0, ErasePatch::new(0, 0, 4, 4)).expect("add");
    session.add_erase_patch(0, ErasePatch::new(8, 8, 4, 4)).expect("add");
    session.clear_erase_patches(0).expect("Failed to clear");
    assert!(session.frame(0).expect("frame 0").erase_patches.is_empty());
}

#[test]
fn erase_patch_on_missing_caption_fails() {
    let session = session_with(&[]);
    session.scan(&pal_settings()).expect("Failed to scan");

    match session.add_erase_patch(7, ErasePatch::new(0, 0, 1, 1)).unwrap_err() {
        ConvertError::FrameOutOfRange { index: 7, .. } => {}
        other => panic!("Expected FrameOutOfRange, got: {other}"),
    }
}
