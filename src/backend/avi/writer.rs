use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::riff::{self, FieldWriter, HeaderCounters, StreamInfo};
use super::Codec;
use crate::backend::{WriterBackend, WriterParams};
use crate::error::{Result, VideoIoError};
use crate::frame::Frame;
use crate::property::PropertyId;

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    /// Relative to the `movi` type tag
    offset: u32,
    len: u32,
}

/// Muxer for intra-only AVI files
///
/// The header is written with zeroed counters on open and rewritten with
/// the final counters by [`WriterBackend::finish`]; frames in between are
/// appended as `00dc` chunks.
///
/// A failed write to the underlying sink leaves a partial chunk behind, so
/// the writer refuses every later frame and never writes an index or header
/// over the damaged tail.
pub struct AviWriter<W: Write + Seek = BufWriter<File>> {
    path: PathBuf,
    file: W,
    info: StreamInfo,
    codec: Codec,
    quality: u8,
    index: Vec<IndexEntry>,
    /// Bytes of `movi` payload written so far, excluding the type tag
    movi_bytes: u64,
    max_chunk: u32,
    last_frame_bytes: usize,
    /// Set once a write to `file` has failed
    broken: bool,
    finished: bool,
}

impl AviWriter {
    pub fn create(params: &WriterParams) -> Result<Self> {
        let target = params.path.display().to_string();
        // validate before touching the filesystem
        stream_info(params)?;
        let file = File::create(&params.path).map_err(|e| VideoIoError::open_failed(&target, e.to_string()))?;
        Self::with_sink(BufWriter::new(file), params)
    }
}

fn stream_info(params: &WriterParams) -> Result<(StreamInfo, Codec)> {
    let target = params.path.display().to_string();
    let codec = Codec::from_fourcc(params.fourcc).ok_or_else(|| {
        VideoIoError::open_failed(&target, format!("codec '{}' is not available for AVI output", params.fourcc))
    })?;
    let (rate, scale) = riff::rate_and_scale(params.fps).ok_or_else(|| {
        VideoIoError::open_failed(&target, format!("frame rate {} cannot be stored in an AVI header", params.fps))
    })?;
    let info = StreamInfo {
        width: params.frame_size.0,
        height: params.frame_size.1,
        fourcc: params.fourcc,
        rate,
        scale,
        bit_count: if params.is_color { 24 } else { 8 },
    };
    Ok((info, codec))
}

impl<W: Write + Seek> AviWriter<W> {
    /// Mux into `file`, which must be positioned at its start
    ///
    /// `params.path` only names the output in logs and errors.
    pub fn with_sink(mut file: W, params: &WriterParams) -> Result<Self> {
        let path = params.path.as_path();
        let target = path.display().to_string();
        let (info, codec) = stream_info(params)?;

        file.write_all(&riff::encode_header(&info, HeaderCounters::default()))
            .map_err(|e| VideoIoError::open_failed(&target, e.to_string()))?;

        info!(
            "Created AVI {} ({}x{} @ {:.3} fps, {})",
            target, info.width, info.height, params.fps, info.fourcc
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            info,
            codec,
            quality: params.quality.clamp(1, 100),
            index: Vec::new(),
            movi_bytes: 0,
            max_chunk: 0,
            last_frame_bytes: 0,
            broken: false,
            finished: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> usize {
        self.index.len()
    }

    fn counters(&self, idx1_len: u64) -> Result<HeaderCounters> {
        let movi_size = riff::HEADER_LEN - riff::MOVI_TAG_OFFSET + self.movi_bytes;
        let riff_size = riff::HEADER_LEN - 8 + self.movi_bytes + idx1_len;
        Ok(HeaderCounters {
            frames: to_u32(self.index.len() as u64)?,
            movi_size: to_u32(movi_size)?,
            riff_size: to_u32(riff_size)?,
            max_chunk: self.max_chunk,
        })
    }
}

impl<W: Write + Seek + Send> WriterBackend for AviWriter<W> {
    fn name(&self) -> &'static str {
        "avi"
    }

    fn write(&mut self, frame: &Frame) -> Result<()> {
        if self.finished {
            return Err(VideoIoError::ClosedHandle);
        }
        if self.broken {
            return Err(broken_output(&self.path));
        }

        let data = self.codec.encode(frame, self.quality)?;
        let len = to_u32(data.len() as u64).map_err(|_| VideoIoError::encode("encoded frame exceeds 4 GiB"))?;
        let chunk_total = 8 + riff::padded(u64::from(len));

        // header + payload + idx1 must stay addressable by 32-bit sizes
        let projected = riff::HEADER_LEN + self.movi_bytes + chunk_total + 8 + 16 * (self.index.len() as u64 + 1);
        if projected > u64::from(u32::MAX) {
            return Err(VideoIoError::encode("AVI file would exceed 4 GiB"));
        }

        let offset = to_u32(riff::HEADER_LEN - riff::MOVI_TAG_OFFSET + self.movi_bytes)?;
        let mut chunk = FieldWriter::default();
        chunk.tag(riff::FRAME_CHUNK).u32(len);
        let mut bytes = chunk.into_bytes();
        bytes.extend_from_slice(&data);
        if len & 1 == 1 {
            bytes.push(0);
        }
        if let Err(e) = self.file.write_all(&bytes) {
            self.broken = true;
            warn!("AVI writer {} stopped after a failed write: {}", self.path.display(), e);
            return Err(e.into());
        }

        self.index.push(IndexEntry { offset, len });
        self.movi_bytes += chunk_total;
        self.max_chunk = self.max_chunk.max(len);
        self.last_frame_bytes = data.len();
        Ok(())
    }

    fn get(&self, id: PropertyId) -> Option<f64> {
        match id {
            PropertyId::Quality if self.codec == Codec::Mjpeg => Some(f64::from(self.quality)),
            PropertyId::FrameBytes => Some(self.last_frame_bytes as f64),
            PropertyId::IsColor => Some(if self.info.is_color() { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    fn set(&mut self, id: PropertyId, value: f64) -> bool {
        match id {
            PropertyId::Quality if self.codec == Codec::Mjpeg => {
                if !(1.0..=100.0).contains(&value) {
                    return false;
                }
                self.quality = value.round() as u8;
                debug!("AVI writer {} quality set to {}", self.path.display(), self.quality);
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
        if self.broken {
            return Err(broken_output(&self.path));
        }

        let idx1_len = 8 + 16 * self.index.len() as u64;
        let counters = self.counters(idx1_len)?;

        let mut idx1 = FieldWriter::default();
        idx1.tag(riff::IDX1).u32(to_u32(idx1_len - 8)?);
        for entry in &self.index {
            idx1.tag(riff::FRAME_CHUNK)
                .u32(riff::AVIIF_KEYFRAME)
                .u32(entry.offset)
                .u32(entry.len);
        }
        self.file.write_all(&idx1.into_bytes())?;

        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&riff::encode_header(&self.info, counters))?;
        self.file.flush()?;

        info!("Finalized AVI {} with {} frames", self.path.display(), self.index.len());
        Ok(())
    }
}

fn broken_output(path: &Path) -> VideoIoError {
    VideoIoError::Io(std::io::Error::other(format!(
        "{} is incomplete after an earlier write failure",
        path.display()
    )))
}

fn to_u32(value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| VideoIoError::encode("AVI file exceeds 4 GiB"))
}
