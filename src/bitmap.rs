//! Indexed caption bitmaps and erase patches.

use image::{Rgba, RgbaImage};

use crate::palette::Palette;

/// A rectangle forced fully transparent in the output bitmap.
///
/// Coordinates are relative to the caption bitmap, not the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErasePatch {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl ErasePatch {
    /// Create a patch.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The patch with every coordinate multiplied by `fx`/`fy`, rounding
    /// half up.
    pub fn scaled(&self, fx: f64, fy: f64) -> Self {
        let scale = |v: u32, f: f64| (v as f64 * f + 0.5) as u32;
        Self {
            x: scale(self.x, fx),
            y: scale(self.y, fy),
            width: scale(self.width, fx),
            height: scale(self.height, fy),
        }
    }
}

/// An 8-bit indexed image.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bitmap {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Bitmap {
    /// A bitmap filled with index 0.
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, 0)
    }

    /// A bitmap filled with `index`.
    pub fn filled(width: u32, height: u32, index: u8) -> Self {
        Self {
            width,
            height,
            pixels: vec![index; width as usize * height as usize],
        }
    }

    /// Wrap row-major pixel indices. Returns `None` if the buffer length
    /// does not match the dimensions.
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        (pixels.len() == width as usize * height as usize).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major pixel indices.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Index at `(x, y)`, or `None` outside the bitmap.
    pub fn get(&self, x: u32, y: u32) -> Option<u8> {
        (x < self.width && y < self.height)
            .then(|| self.pixels[y as usize * self.width as usize + x as usize])
    }

    /// Set the index at `(x, y)`; ignored outside the bitmap.
    pub fn set(&mut self, x: u32, y: u32, index: u8) {
        if x < self.width && y < self.height {
            self.pixels[y as usize * self.width as usize + x as usize] = index;
        }
    }

    /// Paint `patch` with `index`, clipped to the bitmap.
    pub fn fill_rect(&mut self, patch: &ErasePatch, index: u8) {
        let x_end = patch.x.saturating_add(patch.width).min(self.width);
        let y_end = patch.y.saturating_add(patch.height).min(self.height);
        for y in patch.y.min(y_end)..y_end {
            let row = y as usize * self.width as usize;
            self.pixels[row + patch.x.min(x_end) as usize..row + x_end as usize].fill(index);
        }
    }

    /// Expand to RGBA through `palette`.
    pub fn to_rgba_image(&self, palette: &Palette) -> RgbaImage {
        let lookup: Vec<[u8; 4]> = (0..256).map(|i| palette.entry(i).rgba()).collect();
        RgbaImage::from_fn(self.width, self.height, |x, y| {
            Rgba(lookup[self.pixels[y as usize * self.width as usize + x as usize] as usize])
        })
    }

    /// Replace every index through a 256-entry lookup table.
    pub fn remap(&self, table: &[u8; 256]) -> Bitmap {
        Bitmap {
            width: self.width,
            height: self.height,
            pixels: self.pixels.iter().map(|&p| table[p as usize]).collect(),
        }
    }

    /// The visually dominant palette index.
    ///
    /// Each index's pixel count is weighted by its luminance and alpha;
    /// entries with alpha below `alpha_threshold` do not count.
    pub fn primary_color_index(&self, palette: &Palette, alpha_threshold: u8) -> usize {
        let mut histogram = [0u64; 256];
        for &p in &self.pixels {
            histogram[p as usize] += 1;
        }
        let mut best = 0;
        let mut best_weight = 0u64;
        for (index, &count) in histogram.iter().enumerate() {
            let entry = palette.entry(index);
            if count == 0 || entry.alpha < alpha_threshold {
                continue;
            }
            let weight = count * entry.luminance as u64 * entry.alpha as u64;
            if weight > best_weight {
                best_weight = weight;
                best = index;
            }
        }
        best
    }
}
