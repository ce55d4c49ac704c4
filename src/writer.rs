//! # Writer handles
//!
//! [`VideoWriter`] owns one output and encodes frames into it in order.
//! Codec, frame rate, frame size and colour mode are fixed when the writer
//! is opened and never change for the life of the handle.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::backend::{BackendRegistry, WriterBackend, WriterParams};
use crate::config::WriterConfig;
use crate::error::{Result, VideoIoError};
use crate::fourcc::FourCC;
use crate::frame::{ColorLayout, Frame};
use crate::property::PropertyId;

/// Sequential video encoder
///
/// The container is chosen from the path. `.avi` files with MJPG or MPNG
/// go through the built-in muxer, a path with a `%d` placeholder writes one
/// image per frame, and every other container and codec goes through
/// FFmpeg when that feature is enabled. Dropping the writer closes it.
///
/// A writer made with [`VideoWriter::new`] has no output until
/// [`VideoWriter::open_target`] succeeds; until then it behaves like a
/// closed one.
pub struct VideoWriter {
    path: PathBuf,
    fourcc: FourCC,
    fps: f64,
    frame_size: (u32, u32),
    is_color: bool,
    frames_written: u64,
    backend: Option<Box<dyn WriterBackend>>,
}

impl Default for VideoWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoWriter {
    /// A writer with no output yet
    pub fn new() -> Self {
        Self {
            path: PathBuf::new(),
            fourcc: FourCC::from_u32(0),
            fps: 0.0,
            frame_size: (0, 0),
            is_color: true,
            frames_written: 0,
            backend: None,
        }
    }

    /// Open a writer with the default configuration
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use videoio::{Frame, FourCC, VideoWriter};
    ///
    /// let mut writer = VideoWriter::open("out.avi", FourCC::MJPG, 30.0, (320, 240), true)?;
    /// writer.write(&Frame::new_black(320, 240))?;
    /// writer.close()?;
    /// # Ok::<(), videoio::VideoIoError>(())
    /// ```
    pub fn open<P: AsRef<Path>>(
        path: P,
        fourcc: FourCC,
        fps: f64,
        frame_size: (u32, u32),
        is_color: bool,
    ) -> Result<Self> {
        Self::open_with(path, fourcc, fps, frame_size, is_color, &WriterConfig::default())
    }

    /// Open a writer, taking the backend preference and initial quality
    /// from `config`
    pub fn open_with<P: AsRef<Path>>(
        path: P,
        fourcc: FourCC,
        fps: f64,
        frame_size: (u32, u32),
        is_color: bool,
        config: &WriterConfig,
    ) -> Result<Self> {
        let mut writer = Self::new();
        writer.open_target(path, fourcc, fps, frame_size, is_color, config)?;
        Ok(writer)
    }

    /// Finalize the current output, if any, and start a new one
    ///
    /// On failure the handle is left unopened.
    pub fn open_target<P: AsRef<Path>>(
        &mut self,
        path: P,
        fourcc: FourCC,
        fps: f64,
        frame_size: (u32, u32),
        is_color: bool,
        config: &WriterConfig,
    ) -> Result<()> {
        self.close()?;

        let path = path.as_ref();
        let target = path.display().to_string();

        if !(fps.is_finite() && fps > 0.0) {
            return Err(VideoIoError::open_failed(target, format!("invalid frame rate {}", fps)));
        }
        if frame_size.0 == 0 || frame_size.1 == 0 {
            return Err(VideoIoError::open_failed(
                target,
                format!("invalid frame size {}x{}", frame_size.0, frame_size.1),
            ));
        }

        let params = WriterParams {
            path: path.to_path_buf(),
            fourcc,
            fps,
            frame_size,
            is_color,
            quality: config.quality,
        };
        let backend = BackendRegistry::new().open_writer(&params, config.backend)?;
        info!(
            "Writer opened on {} via {} ({} {}x{} @ {} fps)",
            target,
            backend.name(),
            fourcc,
            frame_size.0,
            frame_size.1,
            fps
        );

        self.path = params.path;
        self.fourcc = fourcc;
        self.fps = fps;
        self.frame_size = frame_size;
        self.is_color = is_color;
        self.frames_written = 0;
        self.backend = Some(backend);
        Ok(())
    }

    /// Name of the backend serving the output
    pub fn backend_name(&self) -> Option<&'static str> {
        self.backend.as_ref().map(|backend| backend.name())
    }

    pub fn is_opened(&self) -> bool {
        self.backend.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fourcc(&self) -> FourCC {
        self.fourcc
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn frame_size(&self) -> (u32, u32) {
        self.frame_size
    }

    pub fn is_color(&self) -> bool {
        self.is_color
    }

    /// Frames accepted since the writer was opened
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn expected_layout(&self) -> ColorLayout {
        if self.is_color {
            ColorLayout::Rgb
        } else {
            ColorLayout::Gray
        }
    }

    /// Encode and append one frame
    ///
    /// The frame must match the negotiated size and colour mode exactly;
    /// otherwise the call fails with [`VideoIoError::EncodeFailed`] before
    /// anything is written, and the writer stays usable.
    pub fn write(&mut self, frame: &Frame) -> Result<()> {
        let expected_layout = self.expected_layout();
        let expected_size = self.frame_size;
        let backend = self.backend.as_mut().ok_or(VideoIoError::ClosedHandle)?;

        if frame.size() != expected_size {
            return Err(VideoIoError::encode(format!(
                "frame is {}x{}, writer expects {}x{}",
                frame.width(),
                frame.height(),
                expected_size.0,
                expected_size.1
            )));
        }
        if frame.layout() != expected_layout {
            return Err(VideoIoError::encode(format!(
                "frame is {:?}, writer expects {:?}",
                frame.layout(),
                expected_layout
            )));
        }

        backend.write(frame)?;
        self.frames_written += 1;
        Ok(())
    }

    /// Current value of a writer property, `Ok(None)` if unsupported
    pub fn get(&self, id: PropertyId) -> Result<Option<f64>> {
        let backend = self.backend.as_ref().ok_or(VideoIoError::ClosedHandle)?;
        if !id.is_writer() {
            debug!("{} is not a writer property", id);
            return Ok(None);
        }
        Ok(backend.get(id))
    }

    /// Best-effort property update; `Ok(false)` if unsupported or rejected
    pub fn set(&mut self, id: PropertyId, value: f64) -> Result<bool> {
        let backend = self.backend.as_mut().ok_or(VideoIoError::ClosedHandle)?;
        if !id.is_writer() || value.is_nan() {
            warn!("Rejected writer property {} = {}", id, value);
            return Ok(false);
        }
        let accepted = backend.set(id, value);
        if !accepted {
            warn!("{} backend rejected {} = {}", backend.name(), id, value);
        }
        Ok(accepted)
    }

    /// Flush and finalize the output
    ///
    /// Idempotent. After the first call every write fails with
    /// [`VideoIoError::ClosedHandle`].
    pub fn close(&mut self) -> Result<()> {
        let Some(mut backend) = self.backend.take() else {
            return Ok(());
        };
        backend.finish()?;
        info!("Writer closed on {} after {} frames", self.path.display(), self.frames_written);
        Ok(())
    }
}

impl Drop for VideoWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to finalize {}: {}", self.path.display(), e);
        }
    }
}

impl std::fmt::Debug for VideoWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoWriter")
            .field("path", &self.path)
            .field("fourcc", &self.fourcc)
            .field("fps", &self.fps)
            .field("frame_size", &self.frame_size)
            .field("is_color", &self.is_color)
            .field("opened", &self.is_opened())
            .finish()
    }
}
