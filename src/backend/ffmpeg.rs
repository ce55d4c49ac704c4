//! # FFmpeg backend
//!
//! Demuxing, decoding, encoding and muxing through libavformat and
//! libavcodec. Any container the linked FFmpeg build can guess from a file
//! extension (`.mp4`, `.mkv`, `.mov`, `.avi`, ...) and any protocol it
//! ships (`rtsp://`, `http://`, ...) is reachable from the handles.
//!
//! Codecs are chosen from the FOURCC passed to the writer; see
//! [`codec_for`] for the tags that are understood.

use ffmpeg_next::{
    codec, decoder, encoder, ffi,
    format::{
        self,
        context::{Input, Output},
        Pixel,
    },
    media::Type,
    software::scaling::{context::Context as ScalerContext, flag::Flags as ScalerFlags},
    util::frame::video::Video as VideoFrameFFmpeg,
    Dictionary, Packet, Rational,
};
use tracing::{debug, info, warn};

use crate::backend::{CaptureBackend, Source, WriterBackend, WriterParams};
use crate::config::CaptureConfig;
use crate::error::{Result, VideoIoError};
use crate::fourcc::FourCC;
use crate::frame::{ColorLayout, Frame};
use crate::property::PropertyId;

/// FOURCC tags and the codec each selects, canonical spelling first
const CODEC_TAGS: &[(&[u8; 4], codec::Id)] = &[
    (b"MJPG", codec::Id::MJPEG),
    (b"JPEG", codec::Id::MJPEG),
    (b"avc1", codec::Id::H264),
    (b"H264", codec::Id::H264),
    (b"X264", codec::Id::H264),
    (b"hvc1", codec::Id::HEVC),
    (b"hev1", codec::Id::HEVC),
    (b"HEVC", codec::Id::HEVC),
    (b"H265", codec::Id::HEVC),
    (b"VP80", codec::Id::VP8),
    (b"VP90", codec::Id::VP9),
    (b"VP09", codec::Id::VP9),
    (b"av01", codec::Id::AV1),
    (b"mp4v", codec::Id::MPEG4),
    (b"FMP4", codec::Id::MPEG4),
    (b"XVID", codec::Id::MPEG4),
    (b"DIVX", codec::Id::MPEG4),
    (b"FFV1", codec::Id::FFV1),
    (b"MPNG", codec::Id::PNG),
    (b"PNG ", codec::Id::PNG),
    (b"MPG1", codec::Id::MPEG1VIDEO),
    (b"MPG2", codec::Id::MPEG2VIDEO),
];

/// Codec selected by `fourcc`, matched case-insensitively
pub fn codec_for(fourcc: FourCC) -> Option<codec::Id> {
    let wanted = fourcc.to_bytes().map(|b| b.to_ascii_uppercase());
    CODEC_TAGS
        .iter()
        .find(|(tag, _)| tag.map(|b| b.to_ascii_uppercase()) == wanted)
        .map(|(_, id)| *id)
}

/// Canonical tag reported for a decoded stream
fn fourcc_for(id: codec::Id) -> Option<FourCC> {
    CODEC_TAGS
        .iter()
        .find(|(_, known)| *known == id)
        .map(|(tag, _)| FourCC::new(tag))
}

fn is_again(err: &ffmpeg_next::Error) -> bool {
    matches!(err, ffmpeg_next::Error::Other { errno } if *errno == ffi::EAGAIN)
}

/// Decoding reader over the best video stream of a file or URI
pub struct FfmpegCapture {
    target: String,
    input: Input,
    decoder: decoder::Video,
    stream_index: usize,
    time_base: Rational,
    /// Stream start in `time_base` units
    start: i64,
    fps: f64,
    frame_count: Option<u64>,
    fourcc: Option<FourCC>,
    decoded: VideoFrameFFmpeg,
    grabbed: Option<VideoFrameFFmpeg>,
    /// Frame decoded ahead while seeking, handed out by the next grab
    pending: Option<VideoFrameFFmpeg>,
    /// Index of the next frame to grab
    next: u64,
    draining: bool,
}

// SAFETY: the libav contexts are only reached through `&mut self` and carry
// no thread affinity; a handle is moved between threads, never shared.
unsafe impl Send for FfmpegCapture {}

impl FfmpegCapture {
    pub fn open(source: &Source, config: &CaptureConfig) -> Result<Self> {
        let target = source.to_string();
        let fail = |e: ffmpeg_next::Error| VideoIoError::open_failed(&target, e.to_string());
        ffmpeg_next::init().map_err(fail)?;

        let input = match source {
            Source::Path(path) => format::input(path).map_err(fail)?,
            Source::Uri(uri) => {
                let mut options = Dictionary::new();
                // microseconds
                options.set("rw_timeout", &(config.device_timeout_ms * 1000).to_string());
                format::input_with_dictionary(uri, options).map_err(fail)?
            }
            Source::Device(_) => {
                return Err(VideoIoError::open_failed(&target, "devices are not opened through FFmpeg"));
            }
        };

        let stream = input
            .streams()
            .best(Type::Video)
            .ok_or_else(|| VideoIoError::open_failed(&target, "no video stream"))?;
        let stream_index = stream.index();
        let time_base = stream.time_base();
        let start = match stream.start_time() {
            ffi::AV_NOPTS_VALUE => 0,
            start => start,
        };

        let rate = match stream.avg_frame_rate() {
            rate if rate.numerator() > 0 && rate.denominator() > 0 => rate,
            _ => stream.rate(),
        };
        let fps = if rate.numerator() > 0 && rate.denominator() > 0 {
            f64::from(rate)
        } else {
            0.0
        };

        // containers without a frame count still carry a duration
        let frame_count = match stream.frames() {
            n if n > 0 => Some(n as u64),
            _ if input.duration() > 0 && fps > 0.0 => {
                let seconds = input.duration() as f64 / ffi::AV_TIME_BASE as f64;
                Some((seconds * fps).round() as u64)
            }
            _ => None,
        };

        let context = codec::context::Context::from_parameters(stream.parameters()).map_err(fail)?;
        let decoder = context.decoder().video().map_err(fail)?;
        let fourcc = fourcc_for(decoder.id());

        info!(
            "Opened {} through FFmpeg ({}x{} @ {:.3} fps, {:?})",
            target,
            decoder.width(),
            decoder.height(),
            fps,
            decoder.id()
        );

        Ok(Self {
            target,
            input,
            decoder,
            stream_index,
            time_base,
            start,
            fps,
            frame_count,
            fourcc,
            decoded: VideoFrameFFmpeg::empty(),
            grabbed: None,
            pending: None,
            next: 0,
            draining: false,
        })
    }

    /// Decode the next frame of the video stream, `None` at end of stream
    fn decode_next(&mut self) -> Result<Option<VideoFrameFFmpeg>> {
        loop {
            match self.decoder.receive_frame(&mut self.decoded) {
                Ok(()) => return Ok(Some(std::mem::replace(&mut self.decoded, VideoFrameFFmpeg::empty()))),
                Err(ffmpeg_next::Error::Eof) => return Ok(None),
                Err(e) if is_again(&e) && !self.draining => self.feed()?,
                Err(e) if is_again(&e) => return Ok(None),
                Err(e) => return Err(VideoIoError::decode(e.to_string())),
            }
        }
    }

    /// Send the next packet of our stream, or end-of-stream, to the decoder
    fn feed(&mut self) -> Result<()> {
        loop {
            let Some((stream, packet)) = self.input.packets().next() else {
                self.draining = true;
                return self.decoder.send_eof().map_err(|e| VideoIoError::decode(e.to_string()));
            };
            if stream.index() != self.stream_index {
                continue;
            }
            return self
                .decoder
                .send_packet(&packet)
                .map_err(|e| VideoIoError::decode(e.to_string()));
        }
    }

    fn seek_to_frame(&mut self, index: f64) -> bool {
        let beyond_end = self.frame_count.is_some_and(|count| index > count as f64);
        if !index.is_finite() || index < 0.0 || self.fps <= 0.0 || beyond_end {
            warn!("Seek to frame {} rejected for {}", index, self.target);
            return false;
        }
        let target = index.round() as u64;
        match self.seek_exact(target) {
            Ok(()) => {
                debug!("Seeked {} to frame {}", self.target, target);
                true
            }
            Err(e) => {
                warn!("Seek to frame {} in {} failed: {}", target, self.target, e);
                false
            }
        }
    }

    /// Seek to the keyframe before `target`, then decode forward to it
    fn seek_exact(&mut self, target: u64) -> Result<()> {
        let seconds = target as f64 / self.fps;
        let timestamp = (seconds * ffi::AV_TIME_BASE as f64) as i64;
        self.input
            .seek(timestamp, ..timestamp)
            .map_err(|e| VideoIoError::decode(format!("seek failed: {}", e)))?;
        self.decoder.flush();
        self.draining = false;
        self.grabbed = None;
        self.pending = None;

        let half_frame = 0.5 / self.fps;
        while let Some(frame) = self.decode_next()? {
            let at = frame
                .timestamp()
                .map_or(seconds, |ts| (ts - self.start) as f64 * f64::from(self.time_base));
            if at + half_frame >= seconds {
                self.pending = Some(frame);
                break;
            }
        }
        self.next = target;
        Ok(())
    }
}

impl CaptureBackend for FfmpegCapture {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn grab(&mut self) -> Result<bool> {
        self.grabbed = None;
        let frame = match self.pending.take() {
            Some(frame) => Some(frame),
            None => self.decode_next()?,
        };
        match frame {
            Some(frame) => {
                self.grabbed = Some(frame);
                self.next += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn retrieve(&mut self) -> Result<Frame> {
        let frame = self
            .grabbed
            .take()
            .ok_or_else(|| VideoIoError::decode("no frame has been grabbed"))?;
        to_frame(&frame)
    }

    fn get(&self, id: PropertyId) -> Option<f64> {
        match id {
            PropertyId::PosFrames => Some(self.next as f64),
            PropertyId::PosMsec => Some(if self.fps > 0.0 {
                self.next as f64 * 1000.0 / self.fps
            } else {
                0.0
            }),
            PropertyId::PosAviRatio => self
                .frame_count
                .filter(|count| *count > 0)
                .map(|count| self.next as f64 / count as f64),
            PropertyId::FrameWidth => Some(f64::from(self.decoder.width())),
            PropertyId::FrameHeight => Some(f64::from(self.decoder.height())),
            PropertyId::Fps => Some(self.fps),
            PropertyId::Fourcc => self.fourcc.map(|fourcc| f64::from(fourcc.as_u32())),
            PropertyId::FrameCount => self.frame_count.map(|count| count as f64),
            PropertyId::Monochrome => Some(if self.decoder.format() == Pixel::GRAY8 { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    fn set(&mut self, id: PropertyId, value: f64) -> bool {
        match id {
            PropertyId::PosFrames => self.seek_to_frame(value),
            PropertyId::PosMsec => self.seek_to_frame(value * self.fps / 1000.0),
            PropertyId::PosAviRatio => match self.frame_count {
                Some(count) if (0.0..=1.0).contains(&value) => self.seek_to_frame(value * count as f64),
                _ => false,
            },
            _ => false,
        }
    }

    fn release(&mut self) -> Result<()> {
        self.grabbed = None;
        self.pending = None;
        debug!("Released FFmpeg reader for {}", self.target);
        Ok(())
    }
}

/// Convert a decoded frame to packed RGB, or gray for gray streams
fn to_frame(frame: &VideoFrameFFmpeg) -> Result<Frame> {
    let (width, height) = (frame.width(), frame.height());
    if width == 0 || height == 0 {
        return Err(VideoIoError::decode("frame has zero dimensions"));
    }
    let (pixel, layout) = if frame.format() == Pixel::GRAY8 {
        (Pixel::GRAY8, ColorLayout::Gray)
    } else {
        (Pixel::RGB24, ColorLayout::Rgb)
    };

    let mut converted = VideoFrameFFmpeg::empty();
    let packed = if frame.format() == pixel {
        frame
    } else {
        ScalerContext::get(frame.format(), width, height, pixel, width, height, ScalerFlags::BILINEAR)
            .and_then(|mut scaler| scaler.run(frame, &mut converted))
            .map_err(|e| VideoIoError::decode(e.to_string()))?;
        &converted
    };

    // copy row by row, dropping the stride padding
    let row = width as usize * layout.channels();
    let stride = packed.stride(0);
    let plane = packed.data(0);
    let mut data = Vec::with_capacity(row * height as usize);
    for y in 0..height as usize {
        let start = y * stride;
        let line = plane
            .get(start..start + row)
            .ok_or_else(|| VideoIoError::decode("decoded plane is shorter than the frame"))?;
        data.extend_from_slice(line);
    }

    Frame::from_raw(width, height, layout, data).ok_or_else(|| VideoIoError::decode("frame buffer size mismatch"))
}

/// Encoding muxer for any container and codec FFmpeg can write
pub struct FfmpegWriter {
    target: String,
    output: Output,
    encoder: encoder::Video,
    codec: codec::Id,
    stream_index: usize,
    encoder_time_base: Rational,
    stream_time_base: Rational,
    /// Pixel format the encoder was opened with
    pixel: Pixel,
    frame_size: (u32, u32),
    is_color: bool,
    quality: u8,
    next_pts: i64,
    last_frame_bytes: usize,
    finished: bool,
}

// SAFETY: see `FfmpegCapture`
unsafe impl Send for FfmpegWriter {}

impl FfmpegWriter {
    pub fn create(params: &WriterParams) -> Result<Self> {
        let target = params.path.display().to_string();
        let fail = |e: ffmpeg_next::Error| VideoIoError::open_failed(&target, e.to_string());

        let codec_id = codec_for(params.fourcc).ok_or_else(|| {
            VideoIoError::open_failed(&target, format!("no FFmpeg codec for '{}'", params.fourcc))
        })?;
        ffmpeg_next::init().map_err(fail)?;

        let codec = encoder::find(codec_id)
            .ok_or_else(|| VideoIoError::open_failed(&target, format!("this FFmpeg build has no {:?} encoder", codec_id)))?;
        let pixel = pick_pixel_format(codec, params.is_color);

        let frame_rate = Rational::from(params.fps);
        let stored = f64::from(frame_rate);
        if frame_rate.numerator() <= 0 || ((stored - params.fps) / params.fps).abs() > 1e-6 {
            return Err(VideoIoError::open_failed(
                &target,
                format!("frame rate {} cannot be stored as a rational", params.fps),
            ));
        }
        let time_base = frame_rate.invert();

        let mut output = format::output(&params.path).map_err(fail)?;
        let global_header = output.format().flags().contains(format::Flags::GLOBAL_HEADER);

        let mut stream = output.add_stream(codec).map_err(fail)?;
        let stream_index = stream.index();
        let mut video = codec::context::Context::from_parameters(stream.parameters())
            .map_err(fail)?
            .encoder()
            .video()
            .map_err(fail)?;
        video.set_width(params.frame_size.0);
        video.set_height(params.frame_size.1);
        video.set_format(pixel);
        video.set_frame_rate(Some(frame_rate));
        video.set_time_base(time_base);

        let mut flags = codec::Flags::empty();
        if global_header {
            flags.insert(codec::Flags::GLOBAL_HEADER);
        }
        if codec_id == codec::Id::MJPEG {
            // quality is then taken from each frame
            flags.insert(codec::Flags::QSCALE);
            video.set_global_quality(qscale_lambda(params.quality));
        } else {
            let (width, height) = params.frame_size;
            let bits = f64::from(width) * f64::from(height) * params.fps * 0.2;
            video.set_bit_rate(bits.clamp(64_000.0, 200_000_000.0) as usize);
        }
        video.set_flags(flags);

        let encoder = video.open_as_with(codec, Dictionary::new()).map_err(fail)?;
        stream.set_parameters(&encoder);
        stream.set_time_base(time_base);

        output.write_header().map_err(fail)?;
        let stream_time_base = output
            .stream(stream_index)
            .map(|stream| stream.time_base())
            .ok_or_else(|| VideoIoError::open_failed(&target, "output stream vanished"))?;

        info!(
            "Created {} through FFmpeg ({}x{} @ {:.3} fps, {:?} as {:?})",
            target, params.frame_size.0, params.frame_size.1, params.fps, codec_id, pixel
        );

        Ok(Self {
            target,
            output,
            encoder,
            codec: codec_id,
            stream_index,
            encoder_time_base: time_base,
            stream_time_base,
            pixel,
            frame_size: params.frame_size,
            is_color: params.is_color,
            quality: params.quality.clamp(1, 100),
            next_pts: 0,
            last_frame_bytes: 0,
            finished: false,
        })
    }

    /// Move every packet the encoder has ready into the container
    fn drain(&mut self) -> Result<()> {
        let mut packet = Packet::empty();
        loop {
            match self.encoder.receive_packet(&mut packet) {
                Ok(()) => {
                    self.last_frame_bytes = packet.size();
                    packet.set_stream(self.stream_index);
                    packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
                    packet
                        .write_interleaved(&mut self.output)
                        .map_err(|e| VideoIoError::encode(format!("failed to write packet: {}", e)))?;
                }
                Err(ffmpeg_next::Error::Eof) => return Ok(()),
                Err(e) if is_again(&e) => return Ok(()),
                Err(e) => return Err(VideoIoError::encode(e.to_string())),
            }
        }
    }
}

impl WriterBackend for FfmpegWriter {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn write(&mut self, frame: &Frame) -> Result<()> {
        if self.finished {
            return Err(VideoIoError::ClosedHandle);
        }

        let (width, height) = self.frame_size;
        let input_pixel = if frame.is_color() { Pixel::RGB24 } else { Pixel::GRAY8 };
        let mut input = VideoFrameFFmpeg::new(input_pixel, width, height);
        let row = width as usize * frame.layout().channels();
        let stride = input.stride(0);
        let plane = input.data_mut(0);
        for (y, line) in frame.as_bytes().chunks_exact(row).enumerate() {
            plane[y * stride..y * stride + row].copy_from_slice(line);
        }

        let mut encoded = if input_pixel == self.pixel {
            input
        } else {
            let mut scaled = VideoFrameFFmpeg::empty();
            ScalerContext::get(input_pixel, width, height, self.pixel, width, height, ScalerFlags::BILINEAR)
                .and_then(|mut scaler| scaler.run(&input, &mut scaled))
                .map_err(|e| VideoIoError::encode(e.to_string()))?;
            scaled
        };

        encoded.set_pts(Some(self.next_pts));
        if self.codec == codec::Id::MJPEG {
            unsafe {
                (*encoded.as_mut_ptr()).quality = qscale_lambda(self.quality);
            }
        }

        self.encoder
            .send_frame(&encoded)
            .map_err(|e| VideoIoError::encode(e.to_string()))?;
        self.next_pts += 1;
        self.drain()
    }

    fn get(&self, id: PropertyId) -> Option<f64> {
        match id {
            PropertyId::Quality if self.codec == codec::Id::MJPEG => Some(f64::from(self.quality)),
            PropertyId::FrameBytes => Some(self.last_frame_bytes as f64),
            PropertyId::IsColor => Some(if self.is_color { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    fn set(&mut self, id: PropertyId, value: f64) -> bool {
        match id {
            PropertyId::Quality if self.codec == codec::Id::MJPEG && (1.0..=100.0).contains(&value) => {
                self.quality = value.round() as u8;
                debug!("FFmpeg writer {} quality set to {}", self.target, self.quality);
                true
            }
            _ => false,
        }
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        self.encoder
            .send_eof()
            .map_err(|e| VideoIoError::encode(e.to_string()))?;
        self.drain()?;
        self.output
            .write_trailer()
            .map_err(|e| VideoIoError::encode(format!("failed to write trailer: {}", e)))?;

        info!("Finalized {} after {} frames", self.target, self.next_pts);
        Ok(())
    }
}

/// Gray input keeps a gray encoder format where the codec has one
fn pick_pixel_format(codec: ffmpeg_next::Codec, is_color: bool) -> Pixel {
    let supported: Vec<Pixel> = codec
        .video()
        .ok()
        .and_then(|video| video.formats())
        .map(|formats| formats.collect())
        .unwrap_or_default();
    if !is_color && supported.contains(&Pixel::GRAY8) {
        return Pixel::GRAY8;
    }
    supported.first().copied().unwrap_or(Pixel::YUV420P)
}

/// Map quality 1..=100 onto the MJPEG qscale range 31..=2, in lambda units
fn qscale_lambda(quality: u8) -> i32 {
    let quality = i32::from(quality.clamp(1, 100));
    let qscale = 2 + (100 - quality) * 29 / 99;
    qscale * ffi::FF_QP2LAMBDA as i32
}

pub(crate) fn open_capture(source: &Source, config: &CaptureConfig) -> Result<Box<dyn CaptureBackend>> {
    Ok(Box::new(FfmpegCapture::open(source, config)?))
}

pub(crate) fn open_writer(params: &WriterParams) -> Result<Box<dyn WriterBackend>> {
    Ok(Box::new(FfmpegWriter::create(params)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn params(path: PathBuf, fourcc: FourCC) -> WriterParams {
        WriterParams {
            path,
            fourcc,
            fps: 25.0,
            frame_size: (64, 48),
            is_color: true,
            quality: 90,
        }
    }

    fn write_clip(params: &WriterParams, frames: usize) {
        let mut writer = FfmpegWriter::create(params).unwrap();
        for i in 0..frames {
            let level = (i * 40 % 256) as u8;
            writer.write(&Frame::new_filled(64, 48, [level, 128, 255 - level])).unwrap();
        }
        writer.finish().unwrap();
    }

    fn read_all(capture: &mut FfmpegCapture) -> Vec<Frame> {
        let mut frames = Vec::new();
        while capture.grab().unwrap() {
            frames.push(capture.retrieve().unwrap());
        }
        frames
    }

    #[test]
    fn test_codec_lookup() {
        assert_eq!(codec_for(FourCC::MJPG), Some(codec::Id::MJPEG));
        assert_eq!(codec_for(FourCC::new(b"AVC1")), Some(codec::Id::H264));
        assert_eq!(codec_for(FourCC::new(b"xvid")), Some(codec::Id::MPEG4));
        assert_eq!(codec_for(FourCC::new(b"ZZZZ")), None);
        assert_eq!(fourcc_for(codec::Id::H264), Some(FourCC::new(b"avc1")));
    }

    #[test]
    fn test_qscale_range() {
        let lambda = ffi::FF_QP2LAMBDA as i32;
        assert_eq!(qscale_lambda(100), 2 * lambda);
        assert_eq!(qscale_lambda(1), 31 * lambda);
        assert_eq!(qscale_lambda(0), qscale_lambda(1));
    }

    #[test]
    fn test_mjpeg_in_matroska() {
        let dir = tempdir().unwrap();
        let params = params(dir.path().join("clip.mkv"), FourCC::MJPG);
        write_clip(&params, 5);

        let mut capture = FfmpegCapture::open(&Source::from(params.path.as_path()), &CaptureConfig::default()).unwrap();
        assert_eq!(capture.get(PropertyId::FrameWidth), Some(64.0));
        assert_eq!(capture.get(PropertyId::FrameHeight), Some(48.0));
        assert_eq!(capture.get(PropertyId::Fourcc), Some(f64::from(FourCC::MJPG.as_u32())));

        let frames = read_all(&mut capture);
        assert_eq!(frames.len(), 5);
        assert!(frames.iter().all(|frame| frame.size() == (64, 48) && frame.is_color()));
        assert_eq!(capture.get(PropertyId::PosFrames), Some(5.0));
    }

    #[test]
    fn test_mpeg4_in_avi_and_seek() {
        let dir = tempdir().unwrap();
        let params = params(dir.path().join("xvid.avi"), FourCC::new(b"XVID"));
        write_clip(&params, 10);

        let mut capture = FfmpegCapture::open(&Source::from(params.path.as_path()), &CaptureConfig::default()).unwrap();
        assert_eq!(capture.get(PropertyId::Fps), Some(25.0));
        assert!(capture.set(PropertyId::PosFrames, 6.0));
        assert_eq!(capture.get(PropertyId::PosFrames), Some(6.0));
        assert_eq!(read_all(&mut capture).len(), 4);
        assert!(!capture.set(PropertyId::PosFrames, -1.0));
    }

    #[test]
    fn test_quality_property() {
        let dir = tempdir().unwrap();
        let mut writer = FfmpegWriter::create(&params(dir.path().join("q.mkv"), FourCC::MJPG)).unwrap();
        assert_eq!(writer.get(PropertyId::Quality), Some(90.0));
        assert!(writer.set(PropertyId::Quality, 40.0));
        assert!(!writer.set(PropertyId::Quality, 101.0));
        writer.write(&Frame::new_black(64, 48)).unwrap();
        writer.finish().unwrap();
        assert!(writer.get(PropertyId::FrameBytes).unwrap() > 0.0);
        assert!(matches!(writer.write(&Frame::new_black(64, 48)), Err(VideoIoError::ClosedHandle)));
    }

    #[test]
    fn test_open_failures() {
        let dir = tempdir().unwrap();
        let cases = [
            params(dir.path().join("unknown.avi"), FourCC::new(b"ZZZZ")),
            params(dir.path().join("clip.notacontainer"), FourCC::MJPG),
            params(dir.path().join("missing/clip.mkv"), FourCC::MJPG),
            WriterParams {
                fps: 1e10,
                ..params(dir.path().join("fast.mkv"), FourCC::MJPG)
            },
        ];
        for case in &cases {
            assert!(
                matches!(FfmpegWriter::create(case), Err(VideoIoError::OpenFailed { .. })),
                "{} should not open",
                case.path.display()
            );
        }

        let missing = Source::from(dir.path().join("missing.mp4"));
        assert!(matches!(
            FfmpegCapture::open(&missing, &CaptureConfig::default()),
            Err(VideoIoError::OpenFailed { .. })
        ));
        assert!(matches!(
            FfmpegCapture::open(&Source::Device(0), &CaptureConfig::default()),
            Err(VideoIoError::OpenFailed { .. })
        ));
    }
}
