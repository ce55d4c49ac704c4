//! # videoio
//!
//! Video capture and writer handles over pluggable backends.
//!
//! One property-driven API hides where frames come from or go to: AVI files,
//! numbered image sequences, any container or network stream FFmpeg can
//! open (the default `ffmpeg` feature) and, with the `v4l2` feature, Linux
//! cameras. Codecs are named by their FOURCC tag.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use videoio::{fourcc, Frame, FourCC, PropertyId, VideoCapture, VideoWriter};
//!
//! # fn main() -> videoio::Result<()> {
//! let codec = FourCC::from_u32(fourcc::pack("MJPG")?);
//! let mut writer = VideoWriter::open("clip.avi", codec, 30.0, (320, 240), true)?;
//! for _ in 0..10 {
//!     writer.write(&Frame::new_filled(320, 240, [255, 128, 0]))?;
//! }
//! writer.close()?;
//!
//! let mut capture = VideoCapture::open("clip.avi")?;
//! assert_eq!(capture.get(PropertyId::FrameWidth)?, Some(320.0));
//! while let Some(frame) = capture.read()? {
//!     println!("{}x{}", frame.width(), frame.height());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`fourcc`] - packing codec tags to and from `u32`
//! - [`property`] - capture and writer property identifiers
//! - [`capture`] - [`VideoCapture`] handles
//! - [`writer`] - [`VideoWriter`] handles
//! - [`backend`] - backend traits, registry and built-in backends
//! - [`config`] - TOML configuration

pub mod backend;
pub mod capture;
pub mod config;
pub mod error;
pub mod fourcc;
pub mod frame;
pub mod property;
pub mod writer;

// Re-export commonly used types for convenience
pub use crate::{
    backend::{BackendPreference, Source},
    capture::VideoCapture,
    config::Config,
    error::{Result, VideoIoError},
    fourcc::FourCC,
    frame::{ColorLayout, Frame},
    property::PropertyId,
    writer::VideoWriter,
};
