//! # Video4Linux2 camera backend
//!
//! Streams MJPG (preferred) or YUYV frames from `/dev/video<N>` through
//! memory-mapped buffers. Camera controls are exposed as capture
//! properties.

use std::io;
use std::time::Duration;

use image::ImageFormat;
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::control::{Control, Value};
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::CaptureStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC as V4lFourCC};

use crate::backend::{CaptureBackend, Source};
use crate::config::CaptureConfig;
use crate::error::{Result, VideoIoError};
use crate::fourcc::FourCC;
use crate::frame::{ColorLayout, Frame};
use crate::property::PropertyId;

const MJPG: [u8; 4] = *b"MJPG";
const YUYV: [u8; 4] = *b"YUYV";

/// V4L2 control id for a capture property
fn control_id(id: PropertyId) -> Option<u32> {
    let cid = match id {
        PropertyId::Brightness => 0x0098_0900,
        PropertyId::Contrast => 0x0098_0901,
        PropertyId::Saturation => 0x0098_0902,
        PropertyId::Hue => 0x0098_0903,
        PropertyId::Gamma => 0x0098_0910,
        PropertyId::Gain => 0x0098_0913,
        PropertyId::Temperature => 0x0098_091a,
        PropertyId::Sharpness => 0x0098_091b,
        PropertyId::Backlight => 0x0098_091c,
        PropertyId::AutoExposure => 0x009a_0901,
        PropertyId::Exposure => 0x009a_0902,
        PropertyId::Pan => 0x009a_0908,
        PropertyId::Tilt => 0x009a_0909,
        PropertyId::Focus => 0x009a_090a,
        PropertyId::AutoFocus => 0x009a_090c,
        PropertyId::Zoom => 0x009a_090d,
        PropertyId::Iris => 0x009a_0911,
        _ => return None,
    };
    Some(cid)
}

/// Camera opened through V4L2
pub struct V4l2Capture {
    index: u32,
    device: Device,
    stream: Option<MmapStream<'static>>,
    format: Format,
    fps: f64,
    buffer_count: u32,
    timeout: Duration,
    frames_grabbed: u64,
    grabbed: Option<Vec<u8>>,
}

impl V4l2Capture {
    pub fn open(index: u32, config: &CaptureConfig) -> Result<Self> {
        let target = format!("/dev/video{}", index);
        let fail = |e: io::Error| VideoIoError::open_failed(&target, e.to_string());

        let device = Device::new(index as usize).map_err(fail)?;
        let requested = Format::new(config.camera_width, config.camera_height, V4lFourCC::new(&MJPG));
        let format = Capture::set_format(&device, &requested).map_err(fail)?;
        if format.fourcc.repr != MJPG && format.fourcc.repr != YUYV {
            return Err(VideoIoError::open_failed(
                &target,
                format!("camera offers unsupported pixel format {}", format.fourcc),
            ));
        }

        let fps = match Capture::set_params(&device, &Parameters::with_fps(config.camera_fps)) {
            Ok(params) => interval_to_fps(params.interval.numerator, params.interval.denominator),
            Err(e) => {
                warn!("{} rejected frame rate {}: {}", target, config.camera_fps, e);
                f64::from(config.camera_fps)
            }
        };

        let mut capture = Self {
            index,
            device,
            stream: None,
            format,
            fps,
            buffer_count: config.buffer_count,
            timeout: Duration::from_millis(config.device_timeout_ms),
            frames_grabbed: 0,
            grabbed: None,
        };
        capture.start_stream().map_err(fail)?;

        info!(
            "Opened camera {} ({}x{} {} @ {:.1} fps)",
            target, capture.format.width, capture.format.height, capture.format.fourcc, capture.fps
        );
        Ok(capture)
    }

    fn start_stream(&mut self) -> io::Result<()> {
        let mut stream = MmapStream::with_buffers(&self.device, Type::VideoCapture, self.buffer_count)?;
        stream.set_timeout(self.timeout);
        self.stream = Some(stream);
        Ok(())
    }

    /// Apply a new format, restarting the stream around it
    fn reformat(&mut self, width: u32, height: u32) -> bool {
        self.stream = None;
        self.grabbed = None;
        let requested = Format::new(width, height, self.format.fourcc);
        match Capture::set_format(&self.device, &requested) {
            Ok(format) => self.format = format,
            Err(e) => warn!("Camera {} rejected {}x{}: {}", self.index, width, height, e),
        }
        if let Err(e) = self.start_stream() {
            warn!("Camera {} failed to restart streaming: {}", self.index, e);
            return false;
        }
        self.format.width == width && self.format.height == height
    }

    fn set_fps(&mut self, fps: f64) -> bool {
        if !(fps.is_finite() && fps >= 1.0) {
            return false;
        }
        self.stream = None;
        self.grabbed = None;
        let applied = Capture::set_params(&self.device, &Parameters::with_fps(fps.round() as u32));
        let ok = match applied {
            Ok(params) => {
                self.fps = interval_to_fps(params.interval.numerator, params.interval.denominator);
                true
            }
            Err(e) => {
                warn!("Camera {} rejected {} fps: {}", self.index, fps, e);
                false
            }
        };
        ok && self.start_stream().is_ok()
    }

    fn control(&self, cid: u32) -> Option<f64> {
        match self.device.control(cid) {
            Ok(Control { value: Value::Integer(v), .. }) => Some(v as f64),
            Ok(Control { value: Value::Boolean(b), .. }) => Some(if b { 1.0 } else { 0.0 }),
            Ok(_) => None,
            Err(e) => {
                debug!("Camera {} control {:#x} unavailable: {}", self.index, cid, e);
                None
            }
        }
    }

    fn set_control(&self, cid: u32, value: f64) -> bool {
        let control = Control {
            id: cid,
            value: Value::Integer(value.round() as i64),
        };
        match self.device.set_control(control) {
            Ok(()) => true,
            Err(e) => {
                warn!("Camera {} rejected control {:#x} = {}: {}", self.index, cid, value, e);
                false
            }
        }
    }
}

impl CaptureBackend for V4l2Capture {
    fn name(&self) -> &'static str {
        "v4l2"
    }

    fn grab(&mut self) -> Result<bool> {
        self.grabbed = None;
        let Some(stream) = self.stream.as_mut() else {
            return Ok(false);
        };
        let (data, meta) = CaptureStream::next(stream)?;
        let used = (meta.bytesused as usize).min(data.len());
        // the mmap buffer is only valid until the next dequeue
        self.grabbed = Some(data[..used].to_vec());
        self.frames_grabbed += 1;
        Ok(true)
    }

    fn retrieve(&mut self) -> Result<Frame> {
        let data = self
            .grabbed
            .take()
            .ok_or_else(|| VideoIoError::decode("no frame has been grabbed"))?;
        let (width, height) = (self.format.width, self.format.height);

        match self.format.fourcc.repr {
            MJPG => {
                let image = image::load_from_memory_with_format(&data, ImageFormat::Jpeg)
                    .map_err(|e| VideoIoError::decode(e.to_string()))?;
                Ok(Frame::from_dynamic(image, ColorLayout::Rgb))
            }
            YUYV => yuyv_to_rgb(&data, width, height)
                .and_then(|rgb| Frame::from_raw(width, height, ColorLayout::Rgb, rgb))
                .ok_or_else(|| VideoIoError::decode(format!("short YUYV buffer ({} bytes)", data.len()))),
            other => Err(VideoIoError::decode(format!("unsupported pixel format {:?}", other))),
        }
    }

    fn get(&self, id: PropertyId) -> Option<f64> {
        match id {
            PropertyId::FrameWidth => Some(f64::from(self.format.width)),
            PropertyId::FrameHeight => Some(f64::from(self.format.height)),
            PropertyId::Fps => Some(self.fps),
            PropertyId::Fourcc => Some(f64::from(FourCC::new(&self.format.fourcc.repr).as_u32())),
            PropertyId::PosFrames => Some(self.frames_grabbed as f64),
            PropertyId::BufferSize => Some(f64::from(self.buffer_count)),
            other => control_id(other).and_then(|cid| self.control(cid)),
        }
    }

    fn set(&mut self, id: PropertyId, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        match id {
            PropertyId::FrameWidth if value >= 1.0 => self.reformat(value as u32, self.format.height),
            PropertyId::FrameHeight if value >= 1.0 => self.reformat(self.format.width, value as u32),
            PropertyId::Fps => self.set_fps(value),
            PropertyId::BufferSize if value >= 1.0 => {
                self.buffer_count = value as u32;
                self.stream = None;
                self.grabbed = None;
                self.start_stream().is_ok()
            }
            other => control_id(other).is_some_and(|cid| self.set_control(cid, value)),
        }
    }

    fn release(&mut self) -> Result<()> {
        self.stream = None;
        self.grabbed = None;
        debug!("Released camera {}", self.index);
        Ok(())
    }
}

pub(crate) fn open_capture(source: &Source, config: &CaptureConfig) -> Result<Box<dyn CaptureBackend>> {
    match source {
        Source::Device(index) => Ok(Box::new(V4l2Capture::open(*index, config)?)),
        other => Err(VideoIoError::open_failed(other.to_string(), "not a camera index")),
    }
}

fn interval_to_fps(numerator: u32, denominator: u32) -> f64 {
    if numerator == 0 {
        0.0
    } else {
        f64::from(denominator) / f64::from(numerator)
    }
}

/// Converts YUYV (YUV 4:2:2) pixel data to RGB using BT.601 coefficients.
///
/// Returns `None` if `data` is shorter than `width * height * 2` bytes.
pub fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Option<Vec<u8>> {
    let pixel_count = (width as usize) * (height as usize);
    let expected_len = pixel_count * 2;
    if data.len() < expected_len {
        return None;
    }

    let mut rgb = Vec::with_capacity(pixel_count * 3);
    for chunk in data[..expected_len].chunks_exact(4) {
        let u = f32::from(chunk[1]) - 128.0;
        let v = f32::from(chunk[3]) - 128.0;
        for y in [f32::from(chunk[0]), f32::from(chunk[2])] {
            rgb.push((y + 1.402 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y + 1.772 * u).clamp(0.0, 255.0) as u8);
        }
    }
    Some(rgb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_gray_is_neutral() {
        let data = [128u8, 128, 128, 128];
        assert_eq!(yuyv_to_rgb(&data, 2, 1).unwrap(), vec![128; 6]);
        assert!(yuyv_to_rgb(&data, 4, 1).is_none());
    }

    #[test]
    fn test_control_mapping() {
        assert_eq!(control_id(PropertyId::Brightness), Some(0x0098_0900));
        assert_eq!(control_id(PropertyId::FrameWidth), None);
    }

    #[test]
    fn test_missing_camera() {
        let result = V4l2Capture::open(250, &CaptureConfig::default());
        assert!(matches!(result, Err(VideoIoError::OpenFailed { .. })));
    }
}
