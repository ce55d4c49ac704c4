//! # Image sequence backend
//!
//! Reads and writes numbered still images addressed by a printf-style
//! pattern such as `frames/img_%03d.png`. The image format follows the
//! pattern's extension.

use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat};
use tracing::{debug, info};

use crate::backend::{CaptureBackend, Source, WriterBackend, WriterParams};
use crate::config::CaptureConfig;
use crate::error::{Result, VideoIoError};
use crate::frame::{ColorLayout, Frame};
use crate::property::PropertyId;

/// A path with a single `%d` / `%0Nd` placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencePattern {
    prefix: String,
    width: usize,
    suffix: String,
}

impl SequencePattern {
    /// Parse a pattern, or `None` if `path` has no valid placeholder
    pub fn parse(path: &Path) -> Option<Self> {
        let text = path.to_str()?;
        let (prefix, rest) = text.split_once('%')?;
        let digits_len = rest.find('d')?;
        let digits = &rest[..digits_len];
        let suffix = &rest[digits_len + 1..];
        if suffix.contains('%') || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let width = if digits.is_empty() { 0 } else { digits.parse().ok()? };

        Some(Self {
            prefix: prefix.to_string(),
            width,
            suffix: suffix.to_string(),
        })
    }

    pub fn path_for(&self, index: u32) -> PathBuf {
        PathBuf::from(format!("{}{:0width$}{}", self.prefix, index, self.suffix, width = self.width))
    }
}

/// Reader over consecutive images of a pattern
pub struct SequenceCapture {
    pattern: SequencePattern,
    /// Index of the first image, 0 or 1
    first: u32,
    count: u32,
    next: u32,
    size: (u32, u32),
    grabbed: Option<PathBuf>,
}

impl SequenceCapture {
    pub fn open(pattern_path: &Path) -> Result<Self> {
        let target = pattern_path.display().to_string();
        let pattern = SequencePattern::parse(pattern_path)
            .ok_or_else(|| VideoIoError::open_failed(&target, "not an image sequence pattern"))?;

        let first = [0, 1]
            .into_iter()
            .find(|&i| pattern.path_for(i).is_file())
            .ok_or_else(|| VideoIoError::open_failed(&target, "no image matches the pattern"))?;

        let mut count = 0;
        while pattern.path_for(first + count).is_file() {
            count += 1;
        }

        let size = image::image_dimensions(pattern.path_for(first))
            .map_err(|e| VideoIoError::open_failed(&target, e.to_string()))?;

        info!("Opened image sequence {} ({} images from index {})", target, count, first);
        Ok(Self {
            pattern,
            first,
            count,
            next: 0,
            size,
            grabbed: None,
        })
    }
}

impl CaptureBackend for SequenceCapture {
    fn name(&self) -> &'static str {
        "sequence"
    }

    fn grab(&mut self) -> Result<bool> {
        self.grabbed = None;
        let path = self.pattern.path_for(self.first + self.next);
        // images may be appended while reading, so keep looking past the initial count
        if !path.is_file() {
            return Ok(false);
        }
        self.next += 1;
        self.count = self.count.max(self.next);
        self.grabbed = Some(path);
        Ok(true)
    }

    fn retrieve(&mut self) -> Result<Frame> {
        let path = self
            .grabbed
            .take()
            .ok_or_else(|| VideoIoError::decode("no frame has been grabbed"))?;
        let image = image::open(&path).map_err(|e| VideoIoError::decode(format!("{}: {}", path.display(), e)))?;
        let layout = match image {
            DynamicImage::ImageLuma8(_) | DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLuma16(_) => {
                ColorLayout::Gray
            }
            _ => ColorLayout::Rgb,
        };
        Ok(Frame::from_dynamic(image, layout))
    }

    fn get(&self, id: PropertyId) -> Option<f64> {
        match id {
            PropertyId::PosFrames => Some(f64::from(self.next)),
            PropertyId::FrameCount => Some(f64::from(self.count)),
            PropertyId::FrameWidth => Some(f64::from(self.size.0)),
            PropertyId::FrameHeight => Some(f64::from(self.size.1)),
            _ => None,
        }
    }

    fn set(&mut self, id: PropertyId, value: f64) -> bool {
        match id {
            PropertyId::PosFrames if value.is_finite() && value >= 0.0 && value <= f64::from(self.count) => {
                self.next = value.round() as u32;
                self.grabbed = None;
                debug!("Seeked image sequence to index {}", self.first + self.next);
                true
            }
            _ => false,
        }
    }
}

/// Writes one image file per frame
pub struct SequenceWriter {
    pattern: SequencePattern,
    next: u32,
    is_color: bool,
    last_frame_bytes: u64,
}

impl SequenceWriter {
    pub fn create(params: &WriterParams) -> Result<Self> {
        let target = params.path.display().to_string();
        let pattern = SequencePattern::parse(&params.path)
            .ok_or_else(|| VideoIoError::open_failed(&target, "not an image sequence pattern"))?;

        let first = pattern.path_for(0);
        ImageFormat::from_path(&first)
            .map_err(|_| VideoIoError::open_failed(&target, "unknown image format extension"))?;
        if let Some(parent) = first.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                return Err(VideoIoError::open_failed(
                    &target,
                    format!("directory {} does not exist", parent.display()),
                ));
            }
        }

        info!("Writing image sequence {}", target);
        Ok(Self {
            pattern,
            next: 0,
            is_color: params.is_color,
            last_frame_bytes: 0,
        })
    }
}

impl WriterBackend for SequenceWriter {
    fn name(&self) -> &'static str {
        "sequence"
    }

    fn write(&mut self, frame: &Frame) -> Result<()> {
        let path = self.pattern.path_for(self.next);
        frame
            .save(&path)
            .map_err(|e| VideoIoError::encode(format!("{}: {}", path.display(), e)))?;
        self.next += 1;
        self.last_frame_bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        Ok(())
    }

    fn get(&self, id: PropertyId) -> Option<f64> {
        match id {
            PropertyId::FrameBytes => Some(self.last_frame_bytes as f64),
            PropertyId::IsColor => Some(if self.is_color { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    fn set(&mut self, _id: PropertyId, _value: f64) -> bool {
        false
    }

    fn finish(&mut self) -> Result<()> {
        debug!("Image sequence finished after {} images", self.next);
        Ok(())
    }
}

pub(crate) fn open_capture(source: &Source, _config: &CaptureConfig) -> Result<Box<dyn CaptureBackend>> {
    let path = source
        .path()
        .ok_or_else(|| VideoIoError::open_failed(source.to_string(), "not a file path"))?;
    Ok(Box::new(SequenceCapture::open(path)?))
}

pub(crate) fn open_writer(params: &WriterParams) -> Result<Box<dyn WriterBackend>> {
    Ok(Box::new(SequenceWriter::create(params)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fourcc::FourCC;
    use tempfile::tempdir;

    #[test]
    fn test_pattern_parsing() {
        let pattern = SequencePattern::parse(Path::new("out/img_%03d.png")).unwrap();
        assert_eq!(pattern.path_for(7), PathBuf::from("out/img_007.png"));
        assert_eq!(pattern.path_for(1234), PathBuf::from("out/img_1234.png"));

        let plain = SequencePattern::parse(Path::new("f%d.jpg")).unwrap();
        assert_eq!(plain.path_for(12), PathBuf::from("f12.jpg"));

        assert!(SequencePattern::parse(Path::new("movie.avi")).is_none());
        assert!(SequencePattern::parse(Path::new("a_%s.png")).is_none());
        assert!(SequencePattern::parse(Path::new("a_%d_%d.png")).is_none());
    }

    #[test]
    fn test_write_then_read_sequence() {
        let dir = tempdir().unwrap();
        let pattern = dir.path().join("frame_%02d.png");
        let params = WriterParams {
            path: pattern.clone(),
            fourcc: FourCC::from_u32(0),
            fps: 10.0,
            frame_size: (8, 8),
            is_color: true,
            quality: 95,
        };

        let mut writer = SequenceWriter::create(&params).unwrap();
        for shade in [0u8, 100, 200] {
            writer.write(&Frame::new_filled(8, 8, [shade, 0, 0])).unwrap();
        }
        writer.finish().unwrap();
        assert!(dir.path().join("frame_00.png").is_file());
        assert!(dir.path().join("frame_02.png").is_file());

        let mut capture = SequenceCapture::open(&pattern).unwrap();
        assert_eq!(capture.get(PropertyId::FrameCount), Some(3.0));
        assert_eq!(capture.get(PropertyId::FrameWidth), Some(8.0));

        assert!(capture.set(PropertyId::PosFrames, 2.0));
        assert!(capture.grab().unwrap());
        assert_eq!(capture.retrieve().unwrap().get_pixel(0, 0), [200, 0, 0]);
        assert!(!capture.grab().unwrap());
    }

    #[test]
    fn test_sequence_starting_at_one() {
        let dir = tempdir().unwrap();
        Frame::new_gray(4, 4, 9).save(dir.path().join("s1.png")).unwrap();
        Frame::new_gray(4, 4, 9).save(dir.path().join("s2.png")).unwrap();

        let mut capture = SequenceCapture::open(&dir.path().join("s%d.png")).unwrap();
        assert_eq!(capture.get(PropertyId::FrameCount), Some(2.0));
        assert!(capture.grab().unwrap());
        assert_eq!(capture.retrieve().unwrap().layout(), ColorLayout::Gray);
    }

    #[test]
    fn test_missing_sequence() {
        let dir = tempdir().unwrap();
        let result = SequenceCapture::open(&dir.path().join("none_%04d.png"));
        assert!(matches!(result, Err(VideoIoError::OpenFailed { .. })));
    }

    #[test]
    fn test_writer_needs_existing_directory() {
        let dir = tempdir().unwrap();
        let params = WriterParams {
            path: dir.path().join("missing/img_%d.png"),
            fourcc: FourCC::from_u32(0),
            fps: 10.0,
            frame_size: (8, 8),
            is_color: true,
            quality: 95,
        };
        assert!(matches!(SequenceWriter::create(&params), Err(VideoIoError::OpenFailed { .. })));
    }
}
