//! # Backends
//!
//! A backend is the native subsystem a handle delegates to: a container
//! demuxer/muxer, an image sequence on disk, or a camera driver. Handles only
//! see the [`CaptureBackend`] and [`WriterBackend`] traits; the
//! [`BackendRegistry`] decides which implementation services a given source
//! or output path.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CaptureConfig;
use crate::error::{Result, UnknownBackend, VideoIoError};
use crate::fourcc::FourCC;
use crate::frame::Frame;
use crate::property::PropertyId;

pub mod avi;
pub mod sequence;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

#[cfg(feature = "v4l2")]
pub mod v4l2;

/// Core trait for the read side of a backend
pub trait CaptureBackend: Send {
    /// Short backend name used in logs
    fn name(&self) -> &'static str;

    /// Advance to the next frame without decoding it
    ///
    /// Returns `Ok(false)` at end of stream.
    fn grab(&mut self) -> Result<bool>;

    /// Decode the most recently grabbed frame
    ///
    /// The grabbed frame is consumed: a second call without an intervening
    /// grab fails with [`VideoIoError::DecodeFailed`].
    fn retrieve(&mut self) -> Result<Frame>;

    /// Current value of a property, or `None` if unsupported
    fn get(&self, id: PropertyId) -> Option<f64>;

    /// Best-effort property update; `false` if unsupported or rejected
    fn set(&mut self, id: PropertyId, value: f64) -> bool;

    /// Release any resources held by the backend
    ///
    /// Called once by the owning handle before it is dropped.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Core trait for the write side of a backend
pub trait WriterBackend: Send {
    /// Short backend name used in logs
    fn name(&self) -> &'static str;

    /// Encode and append one frame
    ///
    /// The frame has already been checked against the negotiated size and
    /// layout by the owning handle.
    fn write(&mut self, frame: &Frame) -> Result<()>;

    /// Current value of a property, or `None` if unsupported
    fn get(&self, id: PropertyId) -> Option<f64>;

    /// Best-effort property update; `false` if unsupported or rejected
    fn set(&mut self, id: PropertyId, value: f64) -> bool;

    /// Flush buffered data and finalize the container
    fn finish(&mut self) -> Result<()>;
}

/// Something a capture handle can be opened on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    /// Camera index in platform enumeration order
    Device(u32),
    /// Video file or image-sequence pattern
    Path(PathBuf),
    /// Network stream
    Uri(String),
}

impl Source {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Source::Path(path) => Some(path),
            _ => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Device(index) => write!(f, "device #{}", index),
            Source::Path(path) => write!(f, "{}", path.display()),
            Source::Uri(uri) => f.write_str(uri),
        }
    }
}

impl FromStr for Source {
    type Err = std::convert::Infallible;

    /// All digits is a device index, `scheme://` is a URI, anything else a path
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = s.parse() {
                return Ok(Source::Device(index));
            }
        }
        if let Some((scheme, _)) = s.split_once("://") {
            if !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c)) {
                return Ok(Source::Uri(s.to_string()));
            }
        }
        Ok(Source::Path(PathBuf::from(s)))
    }
}

impl From<u32> for Source {
    fn from(index: u32) -> Self {
        Source::Device(index)
    }
}

impl From<&str> for Source {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(source) => source,
            Err(never) => match never {},
        }
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Source::Path(path.to_path_buf())
    }
}

impl From<&PathBuf> for Source {
    fn from(path: &PathBuf) -> Self {
        Source::Path(path.clone())
    }
}

/// Which backend a handle should be opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// First backend able to service the target
    #[default]
    Any,
    /// Pure-Rust RIFF/AVI container
    Avi,
    /// Numbered image files
    Sequence,
    /// Video4Linux2 cameras
    V4l2,
    /// libavformat/libavcodec through `ffmpeg-next`
    Ffmpeg,
}

impl fmt::Display for BackendPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendPreference::Any => "any",
            BackendPreference::Avi => "avi",
            BackendPreference::Sequence => "sequence",
            BackendPreference::V4l2 => "v4l2",
            BackendPreference::Ffmpeg => "ffmpeg",
        };
        f.write_str(name)
    }
}

impl FromStr for BackendPreference {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "any" => Ok(BackendPreference::Any),
            "avi" => Ok(BackendPreference::Avi),
            "sequence" | "images" => Ok(BackendPreference::Sequence),
            "v4l2" | "v4l" => Ok(BackendPreference::V4l2),
            "ffmpeg" | "libav" => Ok(BackendPreference::Ffmpeg),
            _ => Err(UnknownBackend(s.to_string())),
        }
    }
}

/// Parameters fixed when a writer is opened
#[derive(Debug, Clone, PartialEq)]
pub struct WriterParams {
    pub path: PathBuf,
    pub fourcc: FourCC,
    pub fps: f64,
    pub frame_size: (u32, u32),
    pub is_color: bool,
    /// Initial value of the `Quality` property
    pub quality: u8,
}

type OpenCaptureFn = fn(&Source, &CaptureConfig) -> Result<Box<dyn CaptureBackend>>;
type OpenWriterFn = fn(&WriterParams) -> Result<Box<dyn WriterBackend>>;

/// Ordered table of the backends compiled into this build
///
/// With [`BackendPreference::Any`] every backend is tried in registration
/// order and the first successful open wins.
pub struct BackendRegistry {
    capture: Vec<(BackendPreference, OpenCaptureFn)>,
    writer: Vec<(BackendPreference, OpenWriterFn)>,
}

impl BackendRegistry {
    /// Create a registry with all built-in backends
    pub fn new() -> Self {
        let mut registry = Self {
            capture: Vec::new(),
            writer: Vec::new(),
        };
        registry.register_builtin_backends();
        registry
    }

    fn register_builtin_backends(&mut self) {
        // Image sequences first: a `%d` pattern is never a container file
        self.capture.push((BackendPreference::Sequence, sequence::open_capture));
        self.writer.push((BackendPreference::Sequence, sequence::open_writer));

        // The built-in muxer only takes intra-coded MJPG/MPNG; everything
        // else falls through to FFmpeg
        self.capture.push((BackendPreference::Avi, avi::open_capture));
        self.writer.push((BackendPreference::Avi, avi::open_writer));

        #[cfg(feature = "v4l2")]
        self.capture.push((BackendPreference::V4l2, v4l2::open_capture));

        #[cfg(feature = "ffmpeg")]
        {
            self.capture.push((BackendPreference::Ffmpeg, ffmpeg::open_capture));
            self.writer.push((BackendPreference::Ffmpeg, ffmpeg::open_writer));
        }
    }

    /// Names of the capture backends, in the order they are tried
    pub fn capture_backends(&self) -> Vec<BackendPreference> {
        self.capture.iter().map(|(kind, _)| *kind).collect()
    }

    /// Names of the writer backends, in the order they are tried
    pub fn writer_backends(&self) -> Vec<BackendPreference> {
        self.writer.iter().map(|(kind, _)| *kind).collect()
    }

    /// Open `source` with the preferred backend, or the first that accepts it
    pub fn open_capture(&self, source: &Source, config: &CaptureConfig) -> Result<Box<dyn CaptureBackend>> {
        let preference = config.backend;
        let mut reasons = Vec::new();

        for (kind, open) in self.capture.iter().filter(|(kind, _)| preference.accepts(*kind)) {
            match open(source, config) {
                Ok(backend) => {
                    debug!("Opened {} with {} backend", source, kind);
                    return Ok(backend);
                }
                Err(e) => {
                    debug!("{} backend rejected {}: {}", kind, source, e);
                    reasons.push(format!("{}: {}", kind, reason_of(e)));
                }
            }
        }

        Err(VideoIoError::open_failed(source.to_string(), summarize(preference, reasons)))
    }

    /// Open a writer with the preferred backend, or the first that accepts it
    pub fn open_writer(&self, params: &WriterParams, preference: BackendPreference) -> Result<Box<dyn WriterBackend>> {
        let target = params.path.display().to_string();
        let mut reasons = Vec::new();

        for (kind, open) in self.writer.iter().filter(|(kind, _)| preference.accepts(*kind)) {
            match open(params) {
                Ok(backend) => {
                    debug!("Opened writer {} with {} backend", target, kind);
                    return Ok(backend);
                }
                Err(e) => {
                    debug!("{} backend rejected writer {}: {}", kind, target, e);
                    reasons.push(format!("{}: {}", kind, reason_of(e)));
                }
            }
        }

        Err(VideoIoError::open_failed(target, summarize(preference, reasons)))
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendPreference {
    fn accepts(self, kind: BackendPreference) -> bool {
        self == BackendPreference::Any || self == kind
    }
}

fn reason_of(err: VideoIoError) -> String {
    match err {
        VideoIoError::OpenFailed { reason, .. } => reason,
        other => other.to_string(),
    }
}

fn summarize(preference: BackendPreference, reasons: Vec<String>) -> String {
    if reasons.is_empty() {
        format!("no {} backend available in this build", preference)
    } else {
        reasons.join("; ")
    }
}

/// Lower-case extension of `path`, if any
pub(crate) fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_parsing() {
        assert_eq!(Source::from("0"), Source::Device(0));
        assert_eq!(Source::from("12"), Source::Device(12));
        assert_eq!(
            Source::from("rtsp://camera.local/stream"),
            Source::Uri("rtsp://camera.local/stream".to_string())
        );
        assert_eq!(Source::from("clips/intro.avi"), Source::Path(PathBuf::from("clips/intro.avi")));
        assert_eq!(Source::from("img_%03d.png"), Source::Path(PathBuf::from("img_%03d.png")));
        // too large for a device index
        assert!(matches!(Source::from("99999999999"), Source::Path(_)));
    }

    #[test]
    fn test_builtin_backends_registered() {
        let registry = BackendRegistry::new();
        let capture = registry.capture_backends();
        assert!(capture.contains(&BackendPreference::Avi));
        assert!(capture.contains(&BackendPreference::Sequence));
        assert_eq!(capture.contains(&BackendPreference::V4l2), cfg!(feature = "v4l2"));
        assert_eq!(capture.contains(&BackendPreference::Ffmpeg), cfg!(feature = "ffmpeg"));

        let mut writers = vec![BackendPreference::Sequence, BackendPreference::Avi];
        if cfg!(feature = "ffmpeg") {
            writers.push(BackendPreference::Ffmpeg);
        }
        assert_eq!(registry.writer_backends(), writers);
    }

    #[test]
    fn test_unknown_uri_scheme_fails_to_open() {
        let registry = BackendRegistry::new();
        let source = Source::from("nosuchproto://camera.local/live");
        match registry.open_capture(&source, &CaptureConfig::default()) {
            Err(VideoIoError::OpenFailed { target, .. }) => assert_eq!(target, source.to_string()),
            Err(other) => panic!("expected OpenFailed, got {:?}", other),
            Ok(_) => panic!("an unknown scheme should not open"),
        }
    }

    #[test]
    fn test_preference_parsing() {
        assert_eq!("AVI".parse::<BackendPreference>().unwrap(), BackendPreference::Avi);
        assert_eq!("images".parse::<BackendPreference>().unwrap(), BackendPreference::Sequence);
        assert_eq!("FFmpeg".parse::<BackendPreference>().unwrap(), BackendPreference::Ffmpeg);
        assert_eq!(
            "gstreamer".parse::<BackendPreference>(),
            Err(UnknownBackend("gstreamer".to_string()))
        );
        assert_eq!(BackendPreference::default(), BackendPreference::Any);
    }
}
