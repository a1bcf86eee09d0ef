//! Bitmap transcoding, scaling and colour reduction tests.

use image::{Rgba, RgbaImage};

use supconv::filter::resample;
use supconv::quantize::{
    MAX_PALETTE_SIZE, ReductionThresholds, build_palette, map_to_palette, quantize, reduce_to_four,
};
use supconv::transcode::{apply_erase_patches, effective_size, transcode};
use supconv::{
    Bitmap, ConversionSettings, ErasePatch, OutputMode, Palette, PaletteEntry, PaletteMode,
    ScalingFilter, SourceKind, TranscodedCaption,
};

/// Transparent, white, mid gray (light) and dark gray.
fn four_tone_palette() -> Palette {
    Palette::from_entries(vec![
        PaletteEntry::new(0, 0, 0, 0),
        PaletteEntry::new(255, 255, 255, 255),
        PaletteEntry::new(200, 200, 200, 255),
        PaletteEntry::new(128, 128, 128, 255),
    ])
}

/// A caption with one row per palette index.
fn striped_bitmap(width: u32) -> Bitmap {
    let pixels = (0..4u8)
        .flat_map(|index| std::iter::repeat_n(index, width as usize * 4))
        .collect();
    Bitmap::from_pixels(width, 16, pixels).expect("pixel count matches")
}

const THRESHOLDS: ReductionThresholds = ReductionThresholds {
    alpha: 80,
    luminance: [210, 160],
};

// ── Target size ────────────────────────────────────────────────────

#[test]
fn effective_size_falls_back_below_minimum() {
    let bitmap = Bitmap::new(100, 40);
    assert_eq!(effective_size(&bitmap, 200, 80), (200, 80));
    assert_eq!(effective_size(&bitmap, 4, 80), (100, 40));
    assert_eq!(effective_size(&bitmap, 200, 7), (100, 40));

    let tiny = Bitmap::new(4, 4);
    assert_eq!(effective_size(&tiny, 16, 16), (4, 4));
}

// ── 256-colour output ──────────────────────────────────────────────

#[test]
fn same_size_keeps_bitmap_and_palette() {
    let bitmap = striped_bitmap(32);
    let palette = four_tone_palette();
    let settings = ConversionSettings::new().with_output_mode(OutputMode::Xml);

    let caption = transcode(&bitmap, &palette, SourceKind::BdSup, None, 32, 16, &settings);

    assert_eq!(caption.bitmap, bitmap);
    assert_eq!(caption.palette, palette);
    assert!(caption.patched.is_none());
}

#[test]
fn degenerate_target_is_not_scaled() {
    let bitmap = Bitmap::filled(4, 4, 1);
    let settings = ConversionSettings::new();

    let caption = transcode(&bitmap, &four_tone_palette(), SourceKind::BdSup, None, 16, 16, &settings);

    assert_eq!((caption.bitmap.width(), caption.bitmap.height()), (4, 4));
}

#[test]
fn scaling_with_new_palette_preserves_colour() {
    let bitmap = Bitmap::filled(16, 8, 1);
    let settings = ConversionSettings::new().with_palette_mode(PaletteMode::CreateNew);

    let caption = transcode(&bitmap, &four_tone_palette(), SourceKind::BdSup, None, 32, 16, &settings);

    assert_eq!((caption.bitmap.width(), caption.bitmap.height()), (32, 16));
    assert!(caption.palette.len() <= MAX_PALETTE_SIZE);
    assert_eq!(caption.palette.alpha(0), 0, "entry 0 must be transparent");
    for &index in caption.bitmap.pixels() {
        assert_eq!(caption.palette.entry(index as usize).rgba(), [255, 255, 255, 255]);
    }
}

#[test]
fn scaling_with_kept_palette_maps_into_it() {
    let bitmap = striped_bitmap(16);
    let palette = four_tone_palette();
    let settings = ConversionSettings::new().with_palette_mode(PaletteMode::KeepExisting);

    let caption = transcode(&bitmap, &palette, SourceKind::BdSup, None, 32, 32, &settings);

    assert_eq!(caption.palette, palette);
    assert_eq!((caption.bitmap.width(), caption.bitmap.height()), (32, 32));
    // Rows well inside each stripe keep their index.
    assert_eq!(caption.bitmap.get(10, 0), Some(0));
    assert_eq!(caption.bitmap.get(10, 12), Some(1));
    assert_eq!(caption.bitmap.get(10, 20), Some(2));
    assert_eq!(caption.bitmap.get(10, 31), Some(3));
}

#[test]
fn dithered_palette_stays_within_limit() {
    let image = RgbaImage::from_fn(64, 64, |x, y| Rgba([(x * 4) as u8, (y * 4) as u8, 128, 255]));

    let (bitmap, palette) = quantize(&image, true);

    assert!(palette.len() <= MAX_PALETTE_SIZE);
    assert_eq!((bitmap.width(), bitmap.height()), (64, 64));
    assert!(bitmap.pixels().iter().all(|&p| (p as usize) < palette.len()));
}

#[test]
fn build_palette_is_deterministic() {
    let image = RgbaImage::from_fn(40, 40, |x, y| Rgba([(x * 6) as u8, (y * 6) as u8, (x ^ y) as u8, 255]));

    let first = build_palette(&image, 16);
    let second = build_palette(&image, 16);

    assert_eq!(first, second);
    assert_eq!(first.len(), 16);
    assert_eq!(first.entry(0), PaletteEntry::default());
}

#[test]
fn build_palette_keeps_exact_colours_when_few() {
    let image = RgbaImage::from_fn(4, 1, |x, _| match x {
        0 => Rgba([0, 0, 0, 0]),
        1 => Rgba([255, 0, 0, 255]),
        _ => Rgba([0, 0, 255, 255]),
    });

    let palette = build_palette(&image, MAX_PALETTE_SIZE);
    let bitmap = map_to_palette(&image, &palette);

    assert_eq!(palette.len(), 3);
    assert_eq!(bitmap.pixels()[0], 0);
    assert_eq!(palette.entry(bitmap.pixels()[1] as usize).rgba(), [255, 0, 0, 255]);
    assert_eq!(palette.entry(bitmap.pixels()[3] as usize).rgba(), [0, 0, 255, 255]);
}

// ── 4-colour output ────────────────────────────────────────────────

#[test]
fn four_colour_same_size_classifies_palette_entries() {
    let bitmap = striped_bitmap(8);
    let settings = ConversionSettings::new().with_output_mode(OutputMode::VobSub);

    let caption = transcode(&bitmap, &four_tone_palette(), SourceKind::BdSup, None, 8, 16, &settings);

    // White is light, 200 gray medium, 128 gray dark.
    assert_eq!(caption.bitmap.get(0, 0), Some(0));
    assert_eq!(caption.bitmap.get(0, 4), Some(1));
    assert_eq!(caption.bitmap.get(0, 8), Some(2));
    assert_eq!(caption.bitmap.get(0, 12), Some(3));
    assert_eq!(caption.palette.len(), 4);
    assert_eq!(caption.palette.alpha(0), 0);
}

#[test]
fn four_colour_scaled_output_uses_four_indices() {
    let bitmap = striped_bitmap(8);
    let settings = ConversionSettings::new()
        .with_output_mode(OutputMode::SupIfo)
        .with_scaling_filter(ScalingFilter::Bicubic);

    let caption = transcode(&bitmap, &four_tone_palette(), SourceKind::BdSup, None, 16, 32, &settings);

    assert_eq!((caption.bitmap.width(), caption.bitmap.height()), (16, 32));
    assert!(caption.bitmap.pixels().iter().all(|&p| p < 4));
}

#[test]
fn dvd_caption_keeps_its_bitmap_at_same_size() {
    let bitmap = striped_bitmap(8);
    let settings = ConversionSettings::new()
        .with_output_mode(OutputMode::VobSub)
        .with_palette_mode(PaletteMode::KeepExisting);

    let caption = transcode(&bitmap, &four_tone_palette(), SourceKind::VobSub, None, 8, 16, &settings);

    assert_eq!(caption.bitmap, bitmap);
}

#[test]
fn dvd_caption_scaled_matches_luminance() {
    let bitmap = striped_bitmap(8);
    let settings = ConversionSettings::new()
        .with_output_mode(OutputMode::VobSub)
        .with_palette_mode(PaletteMode::KeepExisting);

    let caption = transcode(&bitmap, &four_tone_palette(), SourceKind::VobSub, None, 16, 32, &settings);

    assert_eq!(caption.bitmap.get(8, 0), Some(0));
    assert_eq!(caption.bitmap.get(8, 12), Some(1));
    assert_eq!(caption.bitmap.get(8, 20), Some(2));
    assert_eq!(caption.bitmap.get(8, 31), Some(3));
}

#[test]
fn reduce_to_four_thresholds() {
    let image = RgbaImage::from_fn(4, 1, |x, _| match x {
        0 => Rgba([255, 255, 255, 40]),
        1 => Rgba([255, 255, 255, 255]),
        2 => Rgba([200, 200, 200, 255]),
        _ => Rgba([60, 60, 60, 255]),
    });

    let bitmap = reduce_to_four(&image, THRESHOLDS);

    assert_eq!(bitmap.pixels(), &[0, 1, 2, 3]);
}

// ── Resampling ─────────────────────────────────────────────────────

#[test]
fn every_filter_preserves_uniform_colour() {
    let image = RgbaImage::from_pixel(20, 10, Rgba([30, 120, 240, 255]));
    for filter in [
        ScalingFilter::Bilinear,
        ScalingFilter::Triangle,
        ScalingFilter::Bicubic,
        ScalingFilter::Bell,
        ScalingFilter::Hermite,
        ScalingFilter::Lanczos3,
        ScalingFilter::Mitchell,
        ScalingFilter::BSpline,
    ] {
        for (width, height) in [(40, 20), (9, 5)] {
            let scaled = resample(&image, width, height, filter);
            assert_eq!(scaled.dimensions(), (width, height));
            for pixel in scaled.pixels() {
                assert_eq!(pixel.0, [30, 120, 240, 255], "{filter:?} to {width}x{height}");
            }
        }
    }
}

#[test]
fn transparent_pixels_do_not_bleed_colour() {
    // Red opaque on the left, fully transparent green on the right.
    let image = RgbaImage::from_fn(8, 8, |x, _| {
        if x < 4 {
            Rgba([255, 0, 0, 255])
        } else {
            Rgba([0, 255, 0, 0])
        }
    });

    let scaled = resample(&image, 16, 16, ScalingFilter::Bilinear);

    for pixel in scaled.pixels().filter(|p| p.0[3] > 0) {
        assert_eq!(pixel.0[1], 0, "green leaked into {:?}", pixel.0);
    }
}

#[test]
fn resample_to_same_size_is_a_copy() {
    let image = RgbaImage::from_fn(8, 8, |x, y| Rgba([x as u8, y as u8, 0, 255]));
    assert_eq!(resample(&image, 8, 8, ScalingFilter::Lanczos3), image);
}

// ── Erase patches ──────────────────────────────────────────────────

#[test]
fn erase_patches_use_most_transparent_index() {
    let palette = Palette::from_entries(vec![
        PaletteEntry::new(255, 255, 255, 255),
        PaletteEntry::new(128, 128, 128, 255),
        PaletteEntry::new(0, 0, 0, 0),
    ]);
    let mut caption = TranscodedCaption {
        bitmap: Bitmap::filled(8, 8, 0),
        patched: None,
        palette,
    };

    caption.apply_patches(&[ErasePatch::new(2, 2, 3, 3)]);
    let output = caption.output();
    assert_eq!(output.get(2, 2), Some(2));
    assert_eq!(output.get(4, 4), Some(2));
    assert_eq!(output.get(5, 5), Some(0));
    assert_eq!(output.get(1, 2), Some(0));
    assert_eq!(caption.bitmap, Bitmap::filled(8, 8, 0), "unpatched copy must survive");

    caption.apply_patches(&[]);
    assert!(caption.patched.is_none());
    assert_eq!(caption.output(), &Bitmap::filled(8, 8, 0));
}

#[test]
fn default_caption_is_empty() {
    let caption = TranscodedCaption::default();
    assert_eq!(caption.output(), &Bitmap::new(0, 0));
    assert_eq!((caption.bitmap.width(), caption.bitmap.height()), (0, 0));
    assert!(caption.bitmap.pixels().is_empty());
    assert!(caption.patched.is_none());
    assert_eq!(Bitmap::default(), Bitmap::new(0, 0));
}

#[test]
fn erase_patches_are_clipped_to_bitmap() {
    let patched = apply_erase_patches(&Bitmap::filled(4, 4, 1), &[ErasePatch::new(2, 2, 10, 10)], 0);
    let zeros = patched.pixels().iter().filter(|&&p| p == 0).count();
    assert_eq!(zeros, 4);
}
