//! # Capture handles
//!
//! [`VideoCapture`] owns one opened source and walks it frame by frame.
//!
//! ```text
//! Unopened --open--> Opened --close/drop--> Closed
//! ```
//!
//! Frame retrieval and property access only succeed while `Opened`; in any
//! other state they fail with [`VideoIoError::ClosedHandle`].

use tracing::{debug, info, warn};

use crate::backend::{BackendRegistry, CaptureBackend, Source};
use crate::config::CaptureConfig;
use crate::error::{Result, VideoIoError};
use crate::frame::Frame;
use crate::property::PropertyId;

enum State {
    Unopened,
    Opened(Box<dyn CaptureBackend>),
    Closed,
}

/// Video capturing from video files, image sequences or cameras
///
/// A handle is exclusively owned and has no internal locking: share it
/// between threads only behind external synchronisation.
pub struct VideoCapture {
    source: Option<Source>,
    state: State,
}

impl VideoCapture {
    /// Create a handle that has not been opened yet
    pub fn new() -> Self {
        Self {
            source: None,
            state: State::Unopened,
        }
    }

    /// Open `source` with the default configuration
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use videoio::VideoCapture;
    ///
    /// let mut capture = VideoCapture::open("clip.avi")?;
    /// while let Some(frame) = capture.read()? {
    ///     println!("{}x{}", frame.width(), frame.height());
    /// }
    /// # Ok::<(), videoio::VideoIoError>(())
    /// ```
    pub fn open<S: Into<Source>>(source: S) -> Result<Self> {
        Self::open_with(source, &CaptureConfig::default())
    }

    /// Open `source` using the backend preference and camera settings in
    /// `config`
    pub fn open_with<S: Into<Source>>(source: S, config: &CaptureConfig) -> Result<Self> {
        let mut capture = Self::new();
        capture.open_source(source, config)?;
        Ok(capture)
    }

    /// Open a camera by index
    pub fn from_device(index: u32) -> Result<Self> {
        Self::open(Source::Device(index))
    }

    /// (Re)open this handle on `source`
    ///
    /// Any source already open is released first. On failure the handle is
    /// left unopened.
    pub fn open_source<S: Into<Source>>(&mut self, source: S, config: &CaptureConfig) -> Result<()> {
        self.close()?;
        self.state = State::Unopened;
        self.source = None;

        let source = source.into();
        let backend = BackendRegistry::new().open_capture(&source, config)?;
        info!("Capture opened on {} via {}", source, backend.name());

        self.source = Some(source);
        self.state = State::Opened(backend);
        Ok(())
    }

    /// Returns true if the handle currently owns an open source
    pub fn is_opened(&self) -> bool {
        matches!(self.state, State::Opened(_))
    }

    /// The source this handle is open on, kept after `close`
    pub fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    /// Name of the backend servicing this handle
    pub fn backend_name(&self) -> Option<&'static str> {
        match &self.state {
            State::Opened(backend) => Some(backend.name()),
            _ => None,
        }
    }

    fn backend(&self) -> Result<&dyn CaptureBackend> {
        match &self.state {
            State::Opened(backend) => Ok(backend.as_ref()),
            _ => Err(VideoIoError::ClosedHandle),
        }
    }

    fn backend_mut(&mut self) -> Result<&mut (dyn CaptureBackend + 'static)> {
        match &mut self.state {
            State::Opened(backend) => Ok(backend.as_mut()),
            _ => Err(VideoIoError::ClosedHandle),
        }
    }

    /// Advance to the next frame without decoding it
    ///
    /// Returns `false` at end of stream or when the backend fails to read;
    /// a live device blocks at most for the configured timeout.
    pub fn grab(&mut self) -> Result<bool> {
        let backend = self.backend_mut()?;
        match backend.grab() {
            Ok(grabbed) => Ok(grabbed),
            Err(e) => {
                warn!("{} backend failed to grab a frame: {}", backend.name(), e);
                Ok(false)
            }
        }
    }

    /// Decode the frame taken by the last [`grab`](Self::grab)
    ///
    /// Fails with [`VideoIoError::DecodeFailed`] if nothing was grabbed or
    /// the payload does not decode. Either way the handle stays usable.
    pub fn retrieve(&mut self) -> Result<Frame> {
        self.backend_mut()?.retrieve()
    }

    /// Grab and decode the next frame
    ///
    /// Returns `Ok(None)` at end of stream. A decode failure still consumes
    /// the frame, so the following call moves on to the next one.
    pub fn read(&mut self) -> Result<Option<Frame>> {
        if !self.grab()? {
            return Ok(None);
        }
        self.retrieve().map(Some)
    }

    /// Current value of a capture property
    ///
    /// `Ok(None)` means the backend does not support the property; values
    /// may be rounded by the backend.
    pub fn get(&self, id: PropertyId) -> Result<Option<f64>> {
        let backend = self.backend()?;
        if !id.is_capture() {
            debug!("{} is not a capture property", id);
            return Ok(None);
        }
        Ok(backend.get(id))
    }

    /// Best-effort property update
    ///
    /// Returns `Ok(false)` when the backend does not support or rejects the
    /// value. Backends may clamp or round, so re-read with [`get`](Self::get)
    /// to see the effective value.
    pub fn set(&mut self, id: PropertyId, value: f64) -> Result<bool> {
        let backend = self.backend_mut()?;
        if !id.is_capture() || value.is_nan() {
            warn!("Rejected capture property {} = {}", id, value);
            return Ok(false);
        }
        let accepted = backend.set(id, value);
        if !accepted {
            warn!("{} backend rejected {} = {}", backend.name(), id, value);
        }
        Ok(accepted)
    }

    /// Iterate over the remaining frames
    ///
    /// Yields decode failures as `Err` and keeps going; stops at end of
    /// stream or after any other error.
    pub fn frames(&mut self) -> Frames<'_> {
        Frames {
            capture: self,
            done: false,
        }
    }

    /// Release the source
    ///
    /// Idempotent: closing a closed or never-opened handle does nothing.
    pub fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Opened(mut backend) => {
                let result = backend.release();
                if let Some(source) = &self.source {
                    info!("Capture closed on {}", source);
                }
                result
            }
            State::Unopened => {
                self.state = State::Unopened;
                Ok(())
            }
            State::Closed => Ok(()),
        }
    }
}

impl Default for VideoCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for VideoCapture {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to release capture: {}", e);
        }
    }
}

impl std::fmt::Debug for VideoCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoCapture")
            .field("source", &self.source)
            .field("opened", &self.is_opened())
            .field("backend", &self.backend_name())
            .finish()
    }
}

/// Iterator returned by [`VideoCapture::frames`]
pub struct Frames<'a> {
    capture: &'a mut VideoCapture,
    done: bool,
}

impl Iterator for Frames<'_> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.capture.read() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = !e.is_frame_local();
                Some(Err(e))
            }
        }
    }
}
