//! Colour reduction: RGBA images back to indexed bitmaps.
//!
//! Four strategies are provided, one per output situation:
//!
//! * [`reduce_to_four`] / [`reduce_indexed`]: classify pixels by alpha and
//!   luminance into the four DVD slots (transparent, light, medium, dark).
//! * [`match_luminance`]: map into an existing 4-colour palette by
//!   brightness, used when a DVD caption keeps its own palette.
//! * [`map_to_palette`]: nearest-colour mapping into an existing palette.
//! * [`quantize`]: build a new palette of up to 256 colours by median cut,
//!   optionally with Floyd–Steinberg error diffusion.

use std::collections::HashMap;

use image::imageops::{self, ColorMap};
use image::{Rgba, RgbaImage};

use crate::bitmap::Bitmap;
use crate::palette::{Palette, PaletteEntry, luminance};

/// Maximum size of a generated palette.
pub const MAX_PALETTE_SIZE: usize = 256;

/// Alpha/luminance thresholds for 4-colour reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReductionThresholds {
    /// Pixels with alpha below this become index 0.
    pub alpha: u8,
    /// Luminance above `luminance[0]` is index 1, above `luminance[1]`
    /// index 2, anything darker index 3.
    pub luminance: [u8; 2],
}

impl ReductionThresholds {
    fn classify(&self, alpha: u8, lum: u8) -> u8 {
        if alpha < self.alpha {
            0
        } else if lum > self.luminance[0] {
            1
        } else if lum > self.luminance[1] {
            2
        } else {
            3
        }
    }
}

/// Reduce an RGBA image to the four DVD slots.
pub fn reduce_to_four(image: &RgbaImage, thresholds: ReductionThresholds) -> Bitmap {
    let pixels = image
        .pixels()
        .map(|&Rgba([r, g, b, a])| thresholds.classify(a, luminance(r, g, b)))
        .collect();
    Bitmap::from_pixels(image.width(), image.height(), pixels)
        .unwrap_or_else(|| Bitmap::new(image.width(), image.height()))
}

/// Reduce an indexed bitmap to the four DVD slots by classifying each
/// palette entry once.
pub fn reduce_indexed(bitmap: &Bitmap, palette: &Palette, thresholds: ReductionThresholds) -> Bitmap {
    let mut table = [0u8; 256];
    for (index, slot) in table.iter_mut().enumerate() {
        let entry = palette.entry(index);
        *slot = thresholds.classify(entry.alpha, entry.luminance);
    }
    bitmap.remap(&table)
}

/// Map each pixel to the entry of `palette` closest in luminance.
///
/// Pixels with alpha below `alpha_threshold`, and every pixel when no entry
/// is visible, take the palette's most transparent index.
pub fn match_luminance(image: &RgbaImage, palette: &Palette, alpha_threshold: u8) -> Bitmap {
    let transparent = palette.most_transparent_index() as u8;
    let visible: Vec<(u8, u8)> = palette
        .entries()
        .iter()
        .enumerate()
        .filter(|(_, e)| e.alpha >= alpha_threshold)
        .map(|(i, e)| (i as u8, e.luminance))
        .collect();

    let pixels = image
        .pixels()
        .map(|&Rgba([r, g, b, a])| {
            if a < alpha_threshold {
                return transparent;
            }
            let lum = luminance(r, g, b) as i32;
            visible
                .iter()
                .min_by_key(|&&(_, l)| (l as i32 - lum).abs())
                .map_or(transparent, |&(i, _)| i)
        })
        .collect();
    Bitmap::from_pixels(image.width(), image.height(), pixels)
        .unwrap_or_else(|| Bitmap::new(image.width(), image.height()))
}

/// Nearest-colour lookup over a fixed set of RGBA colours.
///
/// Implements [`ColorMap`] so it plugs into [`imageops::dither`] and
/// [`imageops::index_colors`].
pub struct NearestColorMap {
    colors: Vec<[u8; 4]>,
    transparent: usize,
}

impl NearestColorMap {
    /// A map over the entries of `palette`.
    pub fn new(palette: &Palette) -> Self {
        Self {
            colors: palette.entries().iter().map(PaletteEntry::rgba).collect(),
            transparent: palette.most_transparent_index(),
        }
    }

    fn nearest(&self, [r, g, b, a]: [u8; 4]) -> usize {
        if a == 0 {
            return self.transparent;
        }
        let mut best = self.transparent;
        let mut best_distance = u32::MAX;
        for (index, color) in self.colors.iter().enumerate() {
            let distance: u32 = [r, g, b, a]
                .iter()
                .zip(color)
                .map(|(&x, &y)| {
                    let d = x as i32 - y as i32;
                    (d * d) as u32
                })
                .sum();
            if distance < best_distance {
                best = index;
                best_distance = distance;
                if distance == 0 {
                    break;
                }
            }
        }
        best
    }
}

impl ColorMap for NearestColorMap {
    type Color = Rgba<u8>;

    fn index_of(&self, color: &Rgba<u8>) -> usize {
        self.nearest(color.0)
    }

    fn lookup(&self, index: usize) -> Option<Rgba<u8>> {
        self.colors.get(index).map(|&c| Rgba(c))
    }

    fn has_lookup(&self) -> bool {
        true
    }

    fn map_color(&self, color: &mut Rgba<u8>) {
        if let Some(&mapped) = self.colors.get(self.nearest(color.0)) {
            color.0 = mapped;
        }
    }
}

fn index_image(image: &RgbaImage, map: &NearestColorMap) -> Bitmap {
    let indexed = imageops::index_colors(image, map);
    Bitmap::from_pixels(image.width(), image.height(), indexed.into_raw())
        .unwrap_or_else(|| Bitmap::new(image.width(), image.height()))
}

/// Map every pixel to the nearest (RGBA) entry of `palette`.
pub fn map_to_palette(image: &RgbaImage, palette: &Palette) -> Bitmap {
    index_image(image, &NearestColorMap::new(palette))
}

/// Build a new palette for `image` and index it.
///
/// Entry 0 is always fully transparent. With `dither`, quantisation error is
/// diffused Floyd–Steinberg style before indexing.
pub fn quantize(image: &RgbaImage, dither: bool) -> (Bitmap, Palette) {
    let palette = build_palette(image, MAX_PALETTE_SIZE);
    let map = NearestColorMap::new(&palette);
    let bitmap = if dither {
        let mut diffused = image.clone();
        imageops::dither(&mut diffused, &map);
        index_image(&diffused, &map)
    } else {
        index_image(image, &map)
    };
    (bitmap, palette)
}

/// Median-cut palette of at most `max_colors` entries (transparent entry
/// included).
pub fn build_palette(image: &RgbaImage, max_colors: usize) -> Palette {
    let mut histogram: HashMap<[u8; 4], u32> = HashMap::new();
    for pixel in image.pixels().filter(|p| p.0[3] > 0) {
        *histogram.entry(pixel.0).or_insert(0) += 1;
    }

    let budget = max_colors.clamp(1, MAX_PALETTE_SIZE) - 1;
    let mut colors: Vec<([u8; 4], u32)> = histogram.into_iter().collect();
    // HashMap order is random; sort for reproducible palettes.
    colors.sort_unstable();

    let mut entries = vec![PaletteEntry::default()];
    let picked = if colors.len() <= budget {
        colors.into_iter().map(|(c, _)| c).collect()
    } else {
        median_cut(colors, budget)
    };
    entries.extend(picked.into_iter().map(|[r, g, b, a]| PaletteEntry::new(r, g, b, a)));
    Palette::from_entries(entries)
}

type ColorBox = Vec<([u8; 4], u32)>;

fn channel_range(colors: &ColorBox) -> (usize, u8) {
    (0..4)
        .map(|c| {
            let (min, max) = colors
                .iter()
                .fold((u8::MAX, u8::MIN), |(lo, hi), (color, _)| {
                    (lo.min(color[c]), hi.max(color[c]))
                });
            (c, max.saturating_sub(min))
        })
        .max_by_key(|&(_, range)| range)
        .unwrap_or((0, 0))
}

fn median_cut(colors: ColorBox, target: usize) -> Vec<[u8; 4]> {
    let mut boxes: Vec<ColorBox> = vec![colors];
    while boxes.len() < target {
        let Some((index, channel)) = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.len() > 1)
            .map(|(i, b)| {
                let (channel, range) = channel_range(b);
                (i, channel, range)
            })
            .filter(|&(_, _, range)| range > 0)
            .max_by_key(|&(_, _, range)| range)
            .map(|(i, channel, _)| (i, channel))
        else {
            break;
        };

        let mut split = boxes.swap_remove(index);
        split.sort_unstable_by_key(|(color, _)| color[channel]);
        let total: u64 = split.iter().map(|&(_, n)| n as u64).sum();
        let mut running = 0u64;
        let mut cut = split.len() / 2;
        for (i, &(_, n)) in split.iter().enumerate() {
            running += n as u64;
            if running * 2 >= total {
                cut = i + 1;
                break;
            }
        }
        let cut = cut.clamp(1, split.len() - 1);
        let upper = split.split_off(cut);
        boxes.push(split);
        boxes.push(upper);
    }

    boxes.iter().map(|b| average(b)).collect()
}

fn average(colors: &[([u8; 4], u32)]) -> [u8; 4] {
    let mut sums = [0u64; 4];
    let mut total = 0u64;
    for &(color, n) in colors {
        for c in 0..4 {
            sums[c] += color[c] as u64 * n as u64;
        }
        total += n as u64;
    }
    if total == 0 {
        return [0; 4];
    }
    sums.map(|s| ((s + total / 2) / total) as u8)
}
