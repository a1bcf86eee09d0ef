//! Output side: the [`Exporter`] capability and a BDN XML + PNG writer.
//!
//! An export pass calls [`Exporter::begin`] once, [`Exporter::write_frame`]
//! for every exported caption, then [`Exporter::finish`]. If the pass is
//! cancelled or fails, [`Exporter::abort`] is called instead of `finish`
//! and must remove everything written so far.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::bitmap::Bitmap;
use crate::configuration::{ConversionSettings, Resolution};
use crate::conversion::ticks_to_timecode;
use crate::error::ConvertError;
use crate::frame::TargetFrame;
use crate::labels;
use crate::palette::Palette;

/// Receives converted captions and writes them in some container format.
pub trait Exporter: Send {
    /// Prepare output for `caption_count` captions.
    fn begin(&mut self, settings: &ConversionSettings, caption_count: usize) -> Result<(), ConvertError>;

    /// Write one caption. `frame` carries final timing, position and
    /// composition number.
    fn write_frame(
        &mut self,
        frame: &TargetFrame,
        bitmap: &Bitmap,
        palette: &Palette,
    ) -> Result<(), ConvertError>;

    /// Write indices/manifests once all captions are written.
    fn finish(&mut self, frames: &[TargetFrame]) -> Result<(), ConvertError>;

    /// Remove partial output after a failure or cancellation.
    fn abort(&mut self);
}

/// Encode `bitmap` through `palette` as an RGBA PNG.
pub fn encode_png(bitmap: &Bitmap, palette: &Palette) -> Result<Vec<u8>, ConvertError> {
    let image = bitmap.to_rgba_image(palette);
    let mut bytes = Vec::new();
    PngEncoder::new(Cursor::new(&mut bytes)).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ExtendedColorType::Rgba8,
    )?;
    Ok(bytes)
}

/// `VideoFormat` attribute of a BDN manifest.
pub fn bdn_video_format(resolution: Resolution) -> &'static str {
    match resolution {
        Resolution::Ntsc => "480i",
        Resolution::Pal => "576i",
        Resolution::Hd720 => "720p",
        Resolution::Hd1440x1080 => "1440x1080",
        Resolution::Hd1080 => "1080p",
    }
}

struct Written {
    frame: TargetFrame,
    file_name: String,
}

/// Writes Sony BDN XML: one PNG per caption plus `<base>.xml`.
///
/// # Example
///
/// ```no_run
/// use supconv::{BdnXmlExporter, ConversionSession, ConversionSettings, JobOptions};
///
/// # fn run(session: &ConversionSession) -> Result<(), supconv::ConvertError> {
/// let settings = ConversionSettings::new();
/// let mut exporter = BdnXmlExporter::new("out", "movie");
/// session.scan(&settings)?;
/// let report = session.export(&mut exporter, &settings, &JobOptions::new())?;
/// println!("{report}");
/// # Ok(())
/// # }
/// ```
pub struct BdnXmlExporter {
    directory: PathBuf,
    base_name: String,
    title: String,
    language: String,
    fps: f64,
    resolution: Resolution,
    written: Vec<Written>,
    created: Vec<PathBuf>,
}

impl BdnXmlExporter {
    /// Write into `directory`, naming files after `base_name`.
    pub fn new(directory: impl Into<PathBuf>, base_name: impl Into<String>) -> Self {
        let base_name = base_name.into();
        Self {
            directory: directory.into(),
            title: base_name.clone(),
            base_name,
            language: "eng".to_string(),
            fps: crate::configuration::FPS_24P,
            resolution: Resolution::Hd1080,
            written: Vec::new(),
            created: Vec::new(),
        }
    }

    /// Set the ISO 639-2 language code written to the manifest.
    #[must_use]
    pub fn with_language(mut self, code: impl Into<String>) -> Self {
        self.language = code.into();
        self
    }

    /// Path of the XML manifest.
    pub fn manifest_path(&self) -> PathBuf {
        self.directory.join(format!("{}.xml", self.base_name))
    }

    /// Every file written so far.
    pub fn created_files(&self) -> &[PathBuf] {
        &self.created
    }

    fn write_file(&mut self, path: &Path, bytes: &[u8]) -> Result<(), ConvertError> {
        // Record before writing so a partial file is also cleaned up.
        self.created.push(path.to_path_buf());
        fs::write(path, bytes)?;
        Ok(())
    }

    fn manifest(&self) -> Result<Vec<u8>, ConvertError> {
        let fps = self.fps;
        let first = self.written.first().map_or(0, |w| w.frame.start_time);
        let last = self.written.last().map_or(0, |w| w.frame.end_time);
        let event_count = self.written.len().to_string();

        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        emit(
            &mut writer,
            Event::Start(BytesStart::new("BDN").with_attributes([
                ("Version", "0.93"),
                ("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"),
                ("xsi:noNamespaceSchemaLocation", "BD-03-006-0093b BDN File Format.xsd"),
            ])),
        )?;

        emit(&mut writer, Event::Start(BytesStart::new("Description")))?;
        emit(
            &mut writer,
            Event::Empty(
                BytesStart::new("Name").with_attributes([("Title", self.title.as_str()), ("Content", "")]),
            ),
        )?;
        emit(
            &mut writer,
            Event::Empty(BytesStart::new("Language").with_attributes([("Code", self.language.as_str())])),
        )?;
        let frame_rate = labels::frame_rate_name(fps);
        emit(
            &mut writer,
            Event::Empty(BytesStart::new("Format").with_attributes([
                ("VideoFormat", bdn_video_format(self.resolution)),
                ("FrameRate", frame_rate.as_str()),
                ("DropFrame", "False"),
            ])),
        )?;
        let first_in = ticks_to_timecode(first, fps);
        let last_out = ticks_to_timecode(last, fps);
        emit(
            &mut writer,
            Event::Empty(BytesStart::new("Events").with_attributes([
                ("Type", "Graphic"),
                ("FirstEventInTC", first_in.as_str()),
                ("LastEventOutTC", last_out.as_str()),
                ("NumberofEvents", event_count.as_str()),
            ])),
        )?;
        emit(&mut writer, Event::End(BytesEnd::new("Description")))?;

        emit(&mut writer, Event::Start(BytesStart::new("Events")))?;
        for Written { frame, file_name } in &self.written {
            let in_tc = ticks_to_timecode(frame.start_time, fps);
            let out_tc = ticks_to_timecode(frame.end_time, fps);
            emit(
                &mut writer,
                Event::Start(BytesStart::new("Event").with_attributes([
                    ("Forced", if frame.forced { "True" } else { "False" }),
                    ("InTC", in_tc.as_str()),
                    ("OutTC", out_tc.as_str()),
                ])),
            )?;
            let (width, height) = (frame.image_width.to_string(), frame.image_height.to_string());
            let (x, y) = (frame.x_offset.to_string(), frame.y_offset.to_string());
            emit(
                &mut writer,
                Event::Start(BytesStart::new("Graphic").with_attributes([
                    ("Width", width.as_str()),
                    ("Height", height.as_str()),
                    ("X", x.as_str()),
                    ("Y", y.as_str()),
                ])),
            )?;
            emit(&mut writer, Event::Text(BytesText::new(file_name)))?;
            emit(&mut writer, Event::End(BytesEnd::new("Graphic")))?;
            emit(&mut writer, Event::End(BytesEnd::new("Event")))?;
        }
        emit(&mut writer, Event::End(BytesEnd::new("Events")))?;
        emit(&mut writer, Event::End(BytesEnd::new("BDN")))?;

        let mut xml = writer.into_inner().into_inner();
        xml.push(b'\n');
        Ok(xml)
    }
}

fn emit(writer: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> Result<(), ConvertError> {
    writer
        .write_event(event)
        .map_err(|e| ConvertError::Unexpected(format!("failed to write BDN manifest: {e}")))
}

impl Exporter for BdnXmlExporter {
    fn begin(&mut self, settings: &ConversionSettings, caption_count: usize) -> Result<(), ConvertError> {
        log::debug!(
            "Starting BDN export of {caption_count} captions to {}",
            self.directory.display()
        );
        fs::create_dir_all(&self.directory)?;
        self.fps = settings.fps_target();
        self.resolution = settings.resolution();
        self.written.clear();
        self.created.clear();
        Ok(())
    }

    fn write_frame(
        &mut self,
        frame: &TargetFrame,
        bitmap: &Bitmap,
        palette: &Palette,
    ) -> Result<(), ConvertError> {
        if self.written.is_empty() && frame.width > 0 {
            self.resolution = Resolution::from_dimensions(frame.width, frame.height);
        }
        let file_name = format!("{}_{:04}.png", self.base_name, self.written.len() + 1);
        let png = encode_png(bitmap, palette)?;
        let path = self.directory.join(&file_name);
        self.write_file(&path, &png)?;
        self.written.push(Written {
            frame: frame.clone(),
            file_name,
        });
        Ok(())
    }

    fn finish(&mut self, frames: &[TargetFrame]) -> Result<(), ConvertError> {
        // Timing may have been touched after a caption was written.
        for (written, frame) in self.written.iter_mut().zip(frames) {
            written.frame = frame.clone();
        }
        let xml = self.manifest()?;
        let path = self.manifest_path();
        self.write_file(&path, &xml)?;
        log::debug!("Wrote BDN manifest {}", path.display());
        Ok(())
    }

    fn abort(&mut self) {
        for path in self.created.drain(..) {
            if let Err(e) = fs::remove_file(&path) {
                log::debug!("Could not remove {}: {e}", path.display());
            }
        }
        self.written.clear();
    }
}
