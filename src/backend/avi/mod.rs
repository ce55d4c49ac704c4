//! # AVI backend
//!
//! Pure-Rust RIFF/AVI muxer and demuxer for intra-only codecs, where every
//! frame is a self-contained image:
//!
//! - `MJPG`: one JPEG per frame, quality set through the writer `Quality`
//!   property
//! - `MPNG`: one PNG per frame, lossless

use std::io::Cursor;

use image::{ImageFormat, ImageOutputFormat};

use crate::backend::{extension_of, CaptureBackend, Source, WriterBackend, WriterParams};
use crate::config::CaptureConfig;
use crate::error::{Result, VideoIoError};
use crate::fourcc::FourCC;
use crate::frame::{ColorLayout, Frame};

mod reader;
mod riff;
mod writer;

pub use reader::AviCapture;
pub use writer::AviWriter;

/// Per-frame payload codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Codec {
    Mjpeg,
    Png,
}

impl Codec {
    pub fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.to_bytes().map(|b| b.to_ascii_uppercase()) {
            b"MJPG" | b"JPEG" => Some(Codec::Mjpeg),
            b"MPNG" | b"PNG " => Some(Codec::Png),
            _ => None,
        }
    }

    pub fn encode(self, frame: &Frame, quality: u8) -> Result<Vec<u8>> {
        let format = match self {
            Codec::Mjpeg => ImageOutputFormat::Jpeg(quality),
            Codec::Png => ImageOutputFormat::Png,
        };
        let mut data = Vec::new();
        frame
            .to_dynamic()
            .write_to(&mut Cursor::new(&mut data), format)
            .map_err(|e| VideoIoError::encode(e.to_string()))?;
        Ok(data)
    }

    pub fn decode(self, data: &[u8], layout: ColorLayout) -> Result<Frame> {
        let format = match self {
            Codec::Mjpeg => ImageFormat::Jpeg,
            Codec::Png => ImageFormat::Png,
        };
        let image = image::load_from_memory_with_format(data, format).map_err(|e| VideoIoError::decode(e.to_string()))?;
        Ok(Frame::from_dynamic(image, layout))
    }
}

/// Codecs the AVI writer can produce
pub fn supported_fourccs() -> [FourCC; 2] {
    [FourCC::MJPG, FourCC::MPNG]
}

pub(crate) fn open_capture(source: &Source, _config: &CaptureConfig) -> Result<Box<dyn CaptureBackend>> {
    let path = source
        .path()
        .ok_or_else(|| VideoIoError::open_failed(source.to_string(), "not a file path"))?;
    Ok(Box::new(AviCapture::open(path)?))
}

pub(crate) fn open_writer(params: &WriterParams) -> Result<Box<dyn WriterBackend>> {
    if extension_of(&params.path).as_deref() != Some("avi") {
        return Err(VideoIoError::open_failed(
            params.path.display().to_string(),
            "container is not .avi",
        ));
    }
    Ok(Box::new(AviWriter::create(params)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyId;
    use std::io::{Seek, SeekFrom, Write};
    use tempfile::tempdir;

    fn params(path: std::path::PathBuf, fourcc: FourCC, is_color: bool) -> WriterParams {
        WriterParams {
            path,
            fourcc,
            fps: 25.0,
            frame_size: (64, 48),
            is_color,
            quality: 90,
        }
    }

    fn gradient(shade: u8) -> Frame {
        let mut frame = Frame::new_black(64, 48);
        for y in 0..48 {
            for x in 0..64 {
                frame.set_pixel(x, y, [shade, (x * 4) as u8, (y * 5) as u8]);
            }
        }
        frame
    }

    #[test]
    fn test_codec_lookup() {
        assert_eq!(Codec::from_fourcc(FourCC::MJPG), Some(Codec::Mjpeg));
        assert_eq!(Codec::from_fourcc(FourCC::new(b"mjpg")), Some(Codec::Mjpeg));
        assert_eq!(Codec::from_fourcc(FourCC::MPNG), Some(Codec::Png));
        assert_eq!(Codec::from_fourcc(FourCC::new(b"H264")), None);
    }

    #[test]
    fn test_png_frames_are_lossless() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lossless.avi");

        let mut writer = AviWriter::create(&params(path.clone(), FourCC::MPNG, true)).unwrap();
        let frames: Vec<Frame> = (0..3).map(|i| gradient(i * 80)).collect();
        for frame in &frames {
            writer.write(frame).unwrap();
        }
        assert!(writer.get(PropertyId::FrameBytes).unwrap() > 0.0);
        assert_eq!(writer.get(PropertyId::Quality), None);
        writer.finish().unwrap();

        let mut capture = AviCapture::open(&path).unwrap();
        assert_eq!(capture.frame_count(), 3);
        assert_eq!(capture.get(PropertyId::Fps), Some(25.0));
        for expected in &frames {
            assert!(capture.grab().unwrap());
            assert_eq!(&capture.retrieve().unwrap(), expected);
        }
        assert!(!capture.grab().unwrap());
    }

    #[test]
    fn test_gray_mjpeg() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gray.avi");

        let mut writer = AviWriter::create(&params(path.clone(), FourCC::MJPG, false)).unwrap();
        assert_eq!(writer.get(PropertyId::IsColor), Some(0.0));
        writer.write(&Frame::new_gray(64, 48, 128)).unwrap();
        writer.finish().unwrap();

        let mut capture = AviCapture::open(&path).unwrap();
        assert_eq!(capture.get(PropertyId::Monochrome), Some(1.0));
        assert!(capture.grab().unwrap());
        let frame = capture.retrieve().unwrap();
        assert_eq!(frame.layout(), ColorLayout::Gray);
        let [l, _, _] = frame.get_pixel(10, 10);
        assert!((i16::from(l) - 128).abs() <= 2);
    }

    #[test]
    fn test_quality_property() {
        let dir = tempdir().unwrap();
        let mut writer = AviWriter::create(&params(dir.path().join("q.avi"), FourCC::MJPG, true)).unwrap();
        assert_eq!(writer.get(PropertyId::Quality), Some(90.0));
        assert!(writer.set(PropertyId::Quality, 40.0));
        assert_eq!(writer.get(PropertyId::Quality), Some(40.0));
        assert!(!writer.set(PropertyId::Quality, 0.0));
        assert!(!writer.set(PropertyId::Quality, 101.0));
        assert!(!writer.set(PropertyId::NStripes, 4.0));
        assert_eq!(writer.get(PropertyId::Quality), Some(40.0));
    }

    #[test]
    fn test_seek_properties() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seek.avi");
        let mut writer = AviWriter::create(&params(path.clone(), FourCC::MPNG, true)).unwrap();
        for i in 0..10 {
            writer.write(&gradient(i * 20)).unwrap();
        }
        writer.finish().unwrap();

        let mut capture = AviCapture::open(&path).unwrap();
        assert!(capture.set(PropertyId::PosFrames, 7.0));
        assert_eq!(capture.get(PropertyId::PosFrames), Some(7.0));
        assert!(capture.grab().unwrap());
        assert_eq!(capture.retrieve().unwrap(), gradient(140));

        assert!(capture.set(PropertyId::PosMsec, 80.0));
        assert_eq!(capture.get(PropertyId::PosFrames), Some(2.0));
        assert!(capture.set(PropertyId::PosAviRatio, 0.5));
        assert_eq!(capture.get(PropertyId::PosFrames), Some(5.0));

        assert!(!capture.set(PropertyId::PosFrames, 11.0));
        assert!(!capture.set(PropertyId::PosFrames, -1.0));
        assert!(!capture.set(PropertyId::Brightness, 0.5));
        assert_eq!(capture.get(PropertyId::PosFrames), Some(5.0));
    }

    #[test]
    fn test_unsupported_writer_codec() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("h264.avi");
        let result = AviWriter::create(&params(path.clone(), FourCC::new(b"H264"), true));
        assert!(matches!(result, Err(VideoIoError::OpenFailed { .. })));
        assert!(!path.exists());
    }

    #[test]
    fn test_extreme_frame_rates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("slow.avi");
        let slow = WriterParams {
            fps: 0.0004,
            ..params(path.clone(), FourCC::MPNG, true)
        };
        let mut writer = AviWriter::create(&slow).unwrap();
        writer.write(&gradient(0)).unwrap();
        writer.finish().unwrap();
        let capture = AviCapture::open(&path).unwrap();
        let fps = capture.get(PropertyId::Fps).unwrap();
        assert!((fps - 0.0004).abs() < 1e-12, "read back {}", fps);

        let fast_path = dir.path().join("fast.avi");
        let fast = WriterParams {
            fps: 1e10,
            ..params(fast_path.clone(), FourCC::MPNG, true)
        };
        assert!(matches!(AviWriter::create(&fast), Err(VideoIoError::OpenFailed { .. })));
        assert!(!fast_path.exists());
    }

    /// Accepts `budget` bytes, then fails every write
    struct FailingSink {
        inner: Cursor<Vec<u8>>,
        budget: usize,
    }

    impl Write for FailingSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.budget == 0 {
                return Err(std::io::Error::other("disk full"));
            }
            let n = buf.len().min(self.budget);
            self.budget -= n;
            self.inner.write(&buf[..n])
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Seek for FailingSink {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    #[test]
    fn test_failed_write_stops_the_writer() {
        let sink = FailingSink {
            inner: Cursor::new(Vec::new()),
            budget: 224 + 40,
        };
        let params = params("sink.avi".into(), FourCC::MPNG, true);
        let mut writer = AviWriter::with_sink(sink, &params).unwrap();

        // the chunk is cut off part way through
        assert!(matches!(writer.write(&gradient(10)), Err(VideoIoError::Io(_))));
        assert_eq!(writer.frames_written(), 0);

        assert!(matches!(writer.write(&gradient(20)), Err(VideoIoError::Io(_))));
        assert_eq!(writer.frames_written(), 0);
        assert!(matches!(writer.finish(), Err(VideoIoError::Io(_))));
        assert!(matches!(writer.write(&gradient(30)), Err(VideoIoError::ClosedHandle)));
        assert!(writer.finish().is_ok());
    }

    #[test]
    fn test_writer_requires_avi_extension() {
        let dir = tempdir().unwrap();
        let result = open_writer(&params(dir.path().join("out.mp4"), FourCC::MJPG, true));
        assert!(matches!(result, Err(VideoIoError::OpenFailed { .. })));
    }

    #[test]
    fn test_open_garbage_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.avi");
        std::fs::write(&path, b"definitely not a video").unwrap();
        assert!(matches!(AviCapture::open(&path), Err(VideoIoError::OpenFailed { .. })));
    }

    #[test]
    fn test_retrieve_without_grab() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("one.avi");
        let mut writer = AviWriter::create(&params(path.clone(), FourCC::MJPG, true)).unwrap();
        writer.write(&gradient(0)).unwrap();
        writer.finish().unwrap();

        let mut capture = AviCapture::open(&path).unwrap();
        assert!(matches!(capture.retrieve(), Err(VideoIoError::DecodeFailed { .. })));
        assert!(capture.grab().unwrap());
        assert!(capture.retrieve().is_ok());
        assert!(matches!(capture.retrieve(), Err(VideoIoError::DecodeFailed { .. })));
    }
}
