//! Indexed colour palettes.
//!
//! A [`Palette`] maps bitmap indices to RGB + alpha, and caches the BT.601
//! luminance of every entry because 4-colour reduction classifies pixels by
//! brightness. This module also reads and writes the textual PGCEdit palette
//! format used by DVD authoring tools.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::error::ConvertError;

/// Header line written at the top of PGCEdit palette files.
pub const PGCEDIT_HEADER: &str =
    "# Palette file for PGCEdit - colors given as R,G,B components (0..255)";

/// One palette slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaletteEntry {
    /// Red, 0–255.
    pub red: u8,
    /// Green, 0–255.
    pub green: u8,
    /// Blue, 0–255.
    pub blue: u8,
    /// Alpha, 0 (transparent) – 255 (opaque).
    pub alpha: u8,
    /// BT.601 studio-range luminance (16–235).
    pub luminance: u8,
}

impl PaletteEntry {
    /// Create an entry and compute its luminance.
    pub fn new(red: u8, green: u8, blue: u8, alpha: u8) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
            luminance: luminance(red, green, blue),
        }
    }

    /// Unpack `0xAARRGGBB`.
    pub fn from_argb(argb: u32) -> Self {
        let [a, r, g, b] = argb.to_be_bytes();
        Self::new(r, g, b, a)
    }

    /// Pack as `0xAARRGGBB`.
    pub fn argb(&self) -> u32 {
        u32::from_be_bytes([self.alpha, self.red, self.green, self.blue])
    }

    /// `[r, g, b, a]`, the layout of [`image::Rgba`].
    pub fn rgba(&self) -> [u8; 4] {
        [self.red, self.green, self.blue, self.alpha]
    }
}

/// BT.601 studio-range luma of an RGB triple.
pub fn luminance(red: u8, green: u8, blue: u8) -> u8 {
    let y = 16.0 + (65.738 * red as f64 + 129.057 * green as f64 + 25.064 * blue as f64) / 256.0;
    y.round().clamp(16.0, 235.0) as u8
}

/// Squared Euclidean RGB distance.
pub fn rgb_distance(a: [u8; 3], b: [u8; 3]) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x as i32 - y as i32;
            (d * d) as u32
        })
        .sum()
}

/// An indexed colour table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Palette {
    entries: Vec<PaletteEntry>,
}

impl Palette {
    /// A palette of `size` fully transparent black entries.
    pub fn new(size: usize) -> Self {
        Self {
            entries: vec![PaletteEntry::new(0, 0, 0, 0); size],
        }
    }

    /// Build a palette from explicit entries.
    pub fn from_entries(entries: Vec<PaletteEntry>) -> Self {
        Self { entries }
    }

    /// The 16-entry DVD edit palette.
    ///
    /// Index 0 is black, 1 white; from index 2 on, pairs of a light shade
    /// (even index) and its darker variant (odd index).
    pub fn default_dvd() -> Self {
        const RGB: [[u8; 3]; 16] = [
            [0x00, 0x00, 0x00], // black
            [0xf0, 0xf0, 0xf0], // white
            [0xcc, 0xcc, 0xcc], // light gray
            [0x99, 0x99, 0x99], // gray
            [0x33, 0x33, 0xfa], // light blue
            [0x11, 0x11, 0xbb], // blue
            [0xfa, 0x33, 0x33], // light red
            [0xbb, 0x11, 0x11], // red
            [0x33, 0xfa, 0x33], // light green
            [0x11, 0xbb, 0x11], // green
            [0xfa, 0xfa, 0x33], // light yellow
            [0xbb, 0xbb, 0x11], // yellow
            [0xfa, 0x33, 0xfa], // light magenta
            [0xbb, 0x11, 0xbb], // magenta
            [0x33, 0xfa, 0xfa], // light cyan
            [0x11, 0xbb, 0xbb], // cyan
        ];
        Self {
            entries: RGB
                .iter()
                .map(|&[r, g, b]| PaletteEntry::new(r, g, b, 0xff))
                .collect(),
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the palette has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in index order.
    pub fn entries(&self) -> &[PaletteEntry] {
        &self.entries
    }

    /// Entry at `index`; out-of-range indices read as transparent black.
    pub fn entry(&self, index: usize) -> PaletteEntry {
        self.entries.get(index).copied().unwrap_or_default()
    }

    /// `[r, g, b]` of entry `index`.
    pub fn rgb(&self, index: usize) -> [u8; 3] {
        let entry = self.entry(index);
        [entry.red, entry.green, entry.blue]
    }

    /// Alpha of entry `index`.
    pub fn alpha(&self, index: usize) -> u8 {
        self.entry(index).alpha
    }

    /// Replace the colour of entry `index`, keeping its alpha.
    pub fn set_rgb(&mut self, index: usize, [r, g, b]: [u8; 3]) {
        if let Some(entry) = self.entries.get_mut(index) {
            *entry = PaletteEntry::new(r, g, b, entry.alpha);
        }
    }

    /// Replace the alpha of entry `index`.
    pub fn set_alpha(&mut self, index: usize, alpha: u8) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.alpha = alpha;
        }
    }

    /// Replace entry `index` from a packed `0xAARRGGBB` value.
    pub fn set_argb(&mut self, index: usize, argb: u32) {
        if let Some(entry) = self.entries.get_mut(index) {
            *entry = PaletteEntry::from_argb(argb);
        }
    }

    /// Index of the entry with the lowest alpha (first one wins on ties).
    pub fn most_transparent_index(&self) -> usize {
        let mut best = 0;
        let mut min_alpha = u16::MAX;
        for (index, entry) in self.entries.iter().enumerate() {
            if (entry.alpha as u16) < min_alpha {
                min_alpha = entry.alpha as u16;
                best = index;
                if min_alpha == 0 {
                    break;
                }
            }
        }
        best
    }

    /// Render as a PGCEdit palette file.
    pub fn to_pgcedit(&self) -> String {
        let mut out = String::with_capacity(16 + self.entries.len() * 24);
        out.push_str(PGCEDIT_HEADER);
        out.push('\n');
        for (index, entry) in self.entries.iter().enumerate() {
            let _ = writeln!(
                out,
                "Color {index}={}, {}, {}",
                entry.red, entry.green, entry.blue
            );
        }
        out
    }

    /// Parse a PGCEdit palette file.
    ///
    /// Comment (`#`) and blank lines are skipped. Missing indices below the
    /// highest listed one stay opaque black.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::InvalidSettings`] for a malformed `Color`
    /// line or an index above 255.
    pub fn parse_pgcedit(text: &str) -> Result<Self, ConvertError> {
        let mut colors: Vec<(usize, [u8; 3])> = Vec::new();
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let malformed =
                || ConvertError::InvalidSettings(format!("malformed palette line: {line}"));
            let rest = line.strip_prefix("Color").ok_or_else(malformed)?;
            let (index, components) = rest.split_once('=').ok_or_else(malformed)?;
            let index: usize = index.trim().parse().map_err(|_| malformed())?;
            if index > 255 {
                return Err(malformed());
            }
            let parts: Vec<u8> = components
                .split(',')
                .map(|c| c.trim().parse::<u8>())
                .collect::<Result<_, _>>()
                .map_err(|_| malformed())?;
            let [r, g, b] = <[u8; 3]>::try_from(parts).map_err(|_| malformed())?;
            colors.push((index, [r, g, b]));
        }

        let size = colors.iter().map(|(i, _)| i + 1).max().unwrap_or(0);
        let mut palette = Palette::from_entries(vec![PaletteEntry::new(0, 0, 0, 0xff); size]);
        for (index, rgb) in colors {
            palette.set_rgb(index, rgb);
        }
        Ok(palette)
    }

    /// Write a PGCEdit palette file to `path`.
    pub fn save_pgcedit<P: AsRef<Path>>(&self, path: P) -> Result<(), ConvertError> {
        fs::write(path, self.to_pgcedit())?;
        Ok(())
    }

    /// Read a PGCEdit palette file from `path`.
    pub fn load_pgcedit<P: AsRef<Path>>(path: P) -> Result<Self, ConvertError> {
        let text = fs::read_to_string(path)?;
        Self::parse_pgcedit(&text)
    }
}
