//! Frame-grid synchronisation and timing repair tests.

use supconv::timing::{
    DEFAULT_MISSING_DURATION, TimeSpan, TimeValidator, ms_to_ticks, sync_time_pts, ticks_to_ms,
};
use supconv::{
    FPS_24HZ, FPS_24P, FPS_NTSC, FPS_PAL, FPS_PAL_I, SourceFrame, TargetFrame, Ticks, TimingIssue,
};

fn frame(start: Ticks, end: Ticks) -> TargetFrame {
    TargetFrame::from_source(&SourceFrame {
        width: 720,
        height: 576,
        image_width: 100,
        image_height: 40,
        x_offset: 310,
        y_offset: 500,
        start_time: start,
        end_time: end,
        forced: false,
    })
}

// ── Tick helpers ───────────────────────────────────────────────────

#[test]
fn ms_to_ticks_rounds_half_up() {
    assert_eq!(ms_to_ticks(500.0), 45_000);
    assert_eq!(ms_to_ticks(1.0), 90);
    assert_eq!(ms_to_ticks(0.006), 1);
    assert_eq!(ms_to_ticks(0.005), 0);
}

#[test]
fn ticks_to_ms_is_exact_for_whole_milliseconds() {
    assert_eq!(ticks_to_ms(90_000), 1000.0);
    assert_eq!(ticks_to_ms(45), 0.5);
}

// ── sync_time_pts ──────────────────────────────────────────────────

#[test]
fn sync_pal_rounds_to_nearest_frame() {
    // One PAL frame is 3600 ticks.
    assert_eq!(sync_time_pts(90_000, FPS_PAL), 90_000);
    assert_eq!(sync_time_pts(91_799, FPS_PAL), 90_000);
    assert_eq!(sync_time_pts(91_800, FPS_PAL), 93_600);
    assert_eq!(sync_time_pts(0, FPS_PAL), 0);
}

#[test]
fn sync_ntsc_uses_integer_frame_length() {
    // 90000 / 29.97 rounds to 3003 ticks per frame.
    assert_eq!(sync_time_pts(3003, FPS_NTSC), 3003);
    assert_eq!(sync_time_pts(4504, FPS_NTSC), 3003);
    assert_eq!(sync_time_pts(4505, FPS_NTSC), 6006);
}

#[test]
fn sync_24hz_uses_integer_frame_length() {
    assert_eq!(sync_time_pts(3750, FPS_24HZ), 3750);
    assert_eq!(sync_time_pts(5624, FPS_24HZ), 3750);
    assert_eq!(sync_time_pts(5625, FPS_24HZ), 7500);
}

#[test]
fn sync_24p_uses_exact_ratio() {
    assert_eq!(sync_time_pts(0, FPS_24P), 0);
    assert_eq!(sync_time_pts(3754, FPS_24P), 3753);
    // 1001 seconds at 23.976 fps is exactly 24000 frames.
    assert_eq!(sync_time_pts(90_090_000, FPS_24P), 90_090_000);
}

#[test]
fn sync_other_rates_truncate_to_containing_frame() {
    assert_eq!(sync_time_pts(1799, FPS_PAL_I), 0);
    assert_eq!(sync_time_pts(3601, FPS_PAL_I), 3600);
}

#[test]
fn sync_is_idempotent() {
    for fps in [FPS_24P, FPS_24HZ, FPS_PAL, FPS_NTSC] {
        for ticks in (0..2_000_000).step_by(7919) {
            let once = sync_time_pts(ticks, fps);
            assert_eq!(
                sync_time_pts(once, fps),
                once,
                "sync not idempotent at {ticks} ticks, {fps} fps"
            );
        }
    }
}

// ── TimeValidator ──────────────────────────────────────────────────

#[test]
fn overlapping_and_degenerate_captions_are_repaired() {
    let validator = TimeValidator::new(FPS_PAL, ms_to_ticks(500.0), false);
    let mut frames = vec![
        frame(0, 90_000),
        frame(72_000, 180_000),
        frame(180_000, 180_000),
    ];

    let issues = validator.validate_all(&mut frames);

    let spans: Vec<(Ticks, Ticks)> = frames.iter().map(|f| (f.start_time, f.end_time)).collect();
    assert_eq!(
        spans,
        vec![(0, 72_000), (72_000, 180_000), (180_000, 630_000)]
    );
    assert_eq!(
        issues,
        vec![
            TimingIssue::EndAfterNextStart { index: 0 },
            TimingIssue::EndNotAfterStart { index: 2 },
        ]
    );
}

#[test]
fn overlap_is_clamped_on_the_earlier_caption() {
    // One frame per millisecond keeps every repaired time on a 90-tick grid.
    let validator = TimeValidator::new(1000.0, 0, false);
    let mut frames = vec![frame(0, 1000), frame(900, 2000), frame(2100, 2100)];

    let issues = validator.validate_all(&mut frames);

    // Caption 1's end is clamped to caption 2's start before caption 2 is
    // validated, so caption 2 never starts inside its predecessor and no
    // StartBeforePreviousEnd is raised for it.
    let spans: Vec<(Ticks, Ticks)> = frames.iter().map(|f| (f.start_time, f.end_time)).collect();
    assert_eq!(spans, vec![(0, 900), (900, 2000), (2100, 452_070)]);
    assert_eq!(
        issues,
        vec![
            TimingIssue::EndAfterNextStart { index: 0 },
            TimingIssue::EndNotAfterStart { index: 2 },
        ]
    );
}

#[test]
fn start_before_previous_end_moves_forward() {
    let validator = TimeValidator::new(FPS_PAL, 0, false);
    let previous = frame(0, 72_000);

    let (span, issues) = validator.validate(1, &frame(36_000, 180_000), Some(&previous), None);

    assert_eq!(
        span,
        TimeSpan {
            start: 72_000,
            end: 180_000
        }
    );
    assert_eq!(issues, vec![TimingIssue::StartBeforePreviousEnd { index: 1 }]);
}

#[test]
fn missing_end_time_gets_default_duration() {
    let validator = TimeValidator::new(FPS_PAL, 0, false);

    let (span, issues) = validator.validate(0, &frame(36_000, 0), None, None);

    assert_eq!(span.start, 36_000);
    assert_eq!(span.end, 36_000 + DEFAULT_MISSING_DURATION);
    assert_eq!(issues, vec![TimingIssue::MissingEndTime { index: 0 }]);
}

#[test]
fn successor_at_zero_is_ignored() {
    let validator = TimeValidator::new(FPS_PAL, 0, false);

    let (span, issues) = validator.validate(0, &frame(36_000, 72_000), None, Some(&frame(0, 0)));

    assert_eq!((span.start, span.end), (36_000, 72_000));
    assert!(issues.is_empty());
}

#[test]
fn short_caption_is_extended_when_fixing() {
    let validator = TimeValidator::new(FPS_PAL, 36_000, true);
    let next = frame(90_000, 180_000);

    let (span, issues) = validator.validate(0, &frame(0, 18_000), None, Some(&next));

    assert_eq!((span.start, span.end), (0, 36_000));
    assert_eq!(
        issues,
        vec![TimingIssue::ShortDurationFixed {
            index: 0,
            min_duration: 36_000
        }]
    );
}

#[test]
fn short_caption_extension_stops_at_next_start() {
    let validator = TimeValidator::new(FPS_PAL, 36_000, true);
    let next = frame(21_600, 90_000);

    let (span, _) = validator.validate(0, &frame(0, 18_000), None, Some(&next));

    assert_eq!(span.end, 21_600);
}

#[test]
fn short_caption_is_only_reported_without_fixing() {
    let validator = TimeValidator::new(FPS_PAL, 36_000, false);

    let (span, issues) = validator.validate(0, &frame(0, 18_000), None, Some(&frame(90_000, 180_000)));

    assert_eq!((span.start, span.end), (0, 18_000));
    assert_eq!(
        issues,
        vec![TimingIssue::ShortDuration {
            index: 0,
            min_duration: 36_000
        }]
    );
}

#[test]
fn unchanged_times_are_not_requantised() {
    // 1 tick is off the PAL grid, but nothing needs repair.
    let validator = TimeValidator::new(FPS_PAL, 0, false);

    let (span, issues) = validator.validate(0, &frame(1, 90_001), None, None);

    assert_eq!((span.start, span.end), (1, 90_001));
    assert!(issues.is_empty());
}

#[test]
fn fixed_timeline_has_no_overlaps_or_short_captions() {
    let validator = TimeValidator::new(FPS_PAL, 36_000, true);
    let mut frames = vec![
        frame(0, 3_600),
        frame(360_000, 900_000),
        frame(720_000, 0),
        frame(1_800_000, 1_800_000),
        frame(3_600_000, 3_960_000),
    ];

    validator.validate_all(&mut frames);

    for (index, f) in frames.iter().enumerate() {
        assert!(f.end_time > f.start_time, "caption {index} has no duration");
        assert!(f.duration() >= 36_000, "caption {index} is too short");
        if let Some(next) = frames.get(index + 1) {
            assert!(f.end_time <= next.start_time, "caption {index} overlaps");
        }
    }
}

// ── Display ────────────────────────────────────────────────────────

#[test]
fn issue_messages_use_one_based_numbers() {
    let message = TimingIssue::EndAfterNextStart { index: 0 }.to_string();
    assert!(message.contains("caption 1"), "got: {message}");

    let message = TimingIssue::ShortDuration {
        index: 4,
        min_duration: 45_000,
    }
    .to_string();
    assert!(message.contains("caption 5"), "got: {message}");
    assert!(message.contains("500.000ms"), "got: {message}");
}
