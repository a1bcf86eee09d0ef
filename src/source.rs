//! Input-side capabilities.
//!
//! The engine never parses container formats itself. Readers hand it
//! captions through [`SubtitleStream`]; DVD-origin readers additionally
//! implement [`DvdSubtitleStream`] to expose the per-caption 4-colour
//! palette they decoded. [`MemoryStream`] is a ready-made implementation
//! over in-memory captions, used by the image-sequence reader and by tests.

use crate::bitmap::Bitmap;
use crate::error::ConvertError;
use crate::frame::SourceFrame;
use crate::palette::{Palette, PaletteEntry};

/// Alpha threshold used when picking a caption's primary colour.
pub(crate) const PRIMARY_ALPHA_THRESHOLD: u8 = 80;

/// The container family a stream was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Blu-ray / HD-DVD SUP.
    BdSup,
    /// Sony BDN XML with PNG images.
    Xml,
    /// DVD VobSub (SUB/IDX).
    VobSub,
    /// DVD SUP with IFO.
    SupIfo,
}

impl SourceKind {
    /// Whether captions carry a 4-entry DVD frame palette.
    pub fn is_dvd(self) -> bool {
        matches!(self, SourceKind::VobSub | SourceKind::SupIfo)
    }
}

/// A decoded subtitle stream.
///
/// `decode` makes one caption current; `palette`, `bitmap` and
/// `primary_color_index` then describe that caption until the next decode.
pub trait SubtitleStream: Send {
    /// Container family.
    fn kind(&self) -> SourceKind;

    /// Number of captions.
    fn frame_count(&self) -> usize;

    /// Number of captions with the forced flag set.
    fn forced_frame_count(&self) -> usize;

    /// Decode caption `index` and make it current.
    ///
    /// # Errors
    ///
    /// [`ConvertError::Decode`] on malformed data,
    /// [`ConvertError::FrameOutOfRange`] for a bad index.
    fn decode(&mut self, index: usize) -> Result<(), ConvertError>;

    /// Geometry and timing of caption `index`.
    fn source_frame(&self, index: usize) -> Option<&SourceFrame>;

    /// Palette of the current caption.
    fn palette(&self) -> &Palette;

    /// Bitmap of the current caption.
    fn bitmap(&self) -> &Bitmap;

    /// Dominant palette index of the current caption.
    fn primary_color_index(&self) -> usize;

    /// Byte offset of caption `index` in the source file (diagnostics only).
    fn start_offset(&self, index: usize) -> u64;

    /// DVD-specific capabilities, if this is a DVD-origin stream.
    fn as_dvd(&self) -> Option<&dyn DvdSubtitleStream> {
        None
    }

    /// Mutable DVD-specific capabilities.
    fn as_dvd_mut(&mut self) -> Option<&mut dyn DvdSubtitleStream> {
        None
    }
}

/// Extra capabilities of DVD-origin (VobSub, SUP/IFO) streams.
///
/// Frame palettes are four indices into the 16-entry source palette; frame
/// alpha values are nibbles (0–15).
pub trait DvdSubtitleStream {
    /// Current (possibly edited) frame palette of caption `index`.
    fn frame_palette(&self, index: usize) -> [u8; 4];
    /// Current (possibly edited) frame alpha of caption `index`.
    fn frame_alpha(&self, index: usize) -> [u8; 4];
    /// Frame palette as decoded from the file.
    fn original_frame_palette(&self, index: usize) -> [u8; 4];
    /// Frame alpha as decoded from the file.
    fn original_frame_alpha(&self, index: usize) -> [u8; 4];
    /// The stream's 16-entry palette.
    fn source_palette(&self) -> &Palette;
    /// Replace the stream's 16-entry palette.
    fn set_source_palette(&mut self, palette: Palette);
    /// Language slot from the index/IFO file.
    fn language_index(&self) -> usize;
}

/// A caption of a non-DVD [`MemoryStream`].
#[derive(Debug, Clone)]
pub struct Caption {
    /// Geometry and timing.
    pub frame: SourceFrame,
    /// Indexed image; must be `image_width`×`image_height`.
    pub bitmap: Bitmap,
    /// Palette the bitmap indexes into.
    pub palette: Palette,
}

/// A caption of a DVD-origin [`MemoryStream`].
#[derive(Debug, Clone)]
pub struct DvdCaption {
    /// Geometry and timing.
    pub frame: SourceFrame,
    /// 2-bit image (indices 0–3).
    pub bitmap: Bitmap,
    /// Indices into the source palette.
    pub palette: [u8; 4],
    /// Alpha nibbles.
    pub alpha: [u8; 4],
}

enum Content {
    Plain {
        kind: SourceKind,
        captions: Vec<Caption>,
    },
    Dvd {
        kind: SourceKind,
        source_palette: Palette,
        captions: Vec<DvdCaption>,
        original: Vec<([u8; 4], [u8; 4])>,
        language_index: usize,
    },
}

/// A [`SubtitleStream`] over captions held in memory.
pub struct MemoryStream {
    content: Content,
    current_palette: Palette,
    current_bitmap: Bitmap,
    current_primary: usize,
}

impl MemoryStream {
    /// A Blu-ray or XML style stream with per-caption palettes.
    pub fn new(kind: SourceKind, captions: Vec<Caption>) -> Self {
        Self::with_content(Content::Plain { kind, captions })
    }

    /// A DVD-origin stream sharing one 16-entry `source_palette`.
    pub fn dvd(
        kind: SourceKind,
        source_palette: Palette,
        captions: Vec<DvdCaption>,
        language_index: usize,
    ) -> Self {
        let original = captions.iter().map(|c| (c.palette, c.alpha)).collect();
        Self::with_content(Content::Dvd {
            kind,
            source_palette,
            captions,
            original,
            language_index,
        })
    }

    fn with_content(content: Content) -> Self {
        Self {
            content,
            current_palette: Palette::new(0),
            current_bitmap: Bitmap::new(0, 0),
            current_primary: 0,
        }
    }

    /// Edit the frame palette and alpha of DVD caption `index`. Ignored for
    /// non-DVD streams.
    pub fn set_frame_palette(&mut self, index: usize, palette: [u8; 4], alpha: [u8; 4]) {
        if let Content::Dvd { captions, .. } = &mut self.content {
            if let Some(caption) = captions.get_mut(index) {
                caption.palette = palette;
                caption.alpha = alpha;
            }
        }
    }

    fn frames(&self) -> Box<dyn Iterator<Item = &SourceFrame> + '_> {
        match &self.content {
            Content::Plain { captions, .. } => Box::new(captions.iter().map(|c| &c.frame)),
            Content::Dvd { captions, .. } => Box::new(captions.iter().map(|c| &c.frame)),
        }
    }
}

fn check_bitmap(index: usize, frame: &SourceFrame, bitmap: &Bitmap) -> Result<(), ConvertError> {
    if bitmap.width() != frame.image_width || bitmap.height() != frame.image_height {
        return Err(ConvertError::Decode {
            index,
            reason: format!(
                "bitmap is {}x{} but caption declares {}x{}",
                bitmap.width(),
                bitmap.height(),
                frame.image_width,
                frame.image_height
            ),
        });
    }
    Ok(())
}

impl SubtitleStream for MemoryStream {
    fn kind(&self) -> SourceKind {
        match &self.content {
            Content::Plain { kind, .. } | Content::Dvd { kind, .. } => *kind,
        }
    }

    fn frame_count(&self) -> usize {
        match &self.content {
            Content::Plain { captions, .. } => captions.len(),
            Content::Dvd { captions, .. } => captions.len(),
        }
    }

    fn forced_frame_count(&self) -> usize {
        self.frames().filter(|f| f.forced).count()
    }

    fn decode(&mut self, index: usize) -> Result<(), ConvertError> {
        let frame_count = self.frame_count();
        match &self.content {
            Content::Plain { captions, .. } => {
                let caption = captions.get(index).ok_or(ConvertError::FrameOutOfRange {
                    index,
                    frame_count,
                })?;
                check_bitmap(index, &caption.frame, &caption.bitmap)?;
                self.current_palette = caption.palette.clone();
                self.current_bitmap = caption.bitmap.clone();
            }
            Content::Dvd {
                source_palette,
                captions,
                ..
            } => {
                let caption = captions.get(index).ok_or(ConvertError::FrameOutOfRange {
                    index,
                    frame_count,
                })?;
                check_bitmap(index, &caption.frame, &caption.bitmap)?;
                if let Some(bad) = caption.bitmap.pixels().iter().find(|&&p| p > 3) {
                    return Err(ConvertError::Decode {
                        index,
                        reason: format!("2-bit caption contains index {bad}"),
                    });
                }
                let entries = (0..4)
                    .map(|i| {
                        let [r, g, b] = source_palette.rgb(caption.palette[i] as usize);
                        let alpha = (caption.alpha[i] as u32 * 0xff / 0xf) as u8;
                        PaletteEntry::new(r, g, b, alpha)
                    })
                    .collect();
                self.current_palette = Palette::from_entries(entries);
                self.current_bitmap = caption.bitmap.clone();
            }
        }
        self.current_primary = self
            .current_bitmap
            .primary_color_index(&self.current_palette, PRIMARY_ALPHA_THRESHOLD);
        Ok(())
    }

    fn source_frame(&self, index: usize) -> Option<&SourceFrame> {
        match &self.content {
            Content::Plain { captions, .. } => captions.get(index).map(|c| &c.frame),
            Content::Dvd { captions, .. } => captions.get(index).map(|c| &c.frame),
        }
    }

    fn palette(&self) -> &Palette {
        &self.current_palette
    }

    fn bitmap(&self) -> &Bitmap {
        &self.current_bitmap
    }

    fn primary_color_index(&self) -> usize {
        self.current_primary
    }

    fn start_offset(&self, index: usize) -> u64 {
        index as u64
    }

    fn as_dvd(&self) -> Option<&dyn DvdSubtitleStream> {
        match self.content {
            Content::Dvd { .. } => Some(self),
            Content::Plain { .. } => None,
        }
    }

    fn as_dvd_mut(&mut self) -> Option<&mut dyn DvdSubtitleStream> {
        match self.content {
            Content::Dvd { .. } => Some(self),
            Content::Plain { .. } => None,
        }
    }
}

impl DvdSubtitleStream for MemoryStream {
    fn frame_palette(&self, index: usize) -> [u8; 4] {
        match &self.content {
            Content::Dvd { captions, .. } => captions.get(index).map_or([0; 4], |c| c.palette),
            Content::Plain { .. } => [0; 4],
        }
    }

    fn frame_alpha(&self, index: usize) -> [u8; 4] {
        match &self.content {
            Content::Dvd { captions, .. } => captions.get(index).map_or([0; 4], |c| c.alpha),
            Content::Plain { .. } => [0; 4],
        }
    }

    fn original_frame_palette(&self, index: usize) -> [u8; 4] {
        match &self.content {
            Content::Dvd { original, .. } => original.get(index).map_or([0; 4], |o| o.0),
            Content::Plain { .. } => [0; 4],
        }
    }

    fn original_frame_alpha(&self, index: usize) -> [u8; 4] {
        match &self.content {
            Content::Dvd { original, .. } => original.get(index).map_or([0; 4], |o| o.1),
            Content::Plain { .. } => [0; 4],
        }
    }

    fn source_palette(&self) -> &Palette {
        match &self.content {
            Content::Dvd { source_palette, .. } => source_palette,
            Content::Plain { .. } => &self.current_palette,
        }
    }

    fn set_source_palette(&mut self, palette: Palette) {
        if let Content::Dvd { source_palette, .. } = &mut self.content {
            *source_palette = palette;
        }
    }

    fn language_index(&self) -> usize {
        match &self.content {
            Content::Dvd { language_index, .. } => *language_index,
            Content::Plain { .. } => 0,
        }
    }
}
