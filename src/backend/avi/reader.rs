use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::riff::{self, Fields, StreamInfo, Tag};
use super::Codec;
use crate::backend::CaptureBackend;
use crate::error::{Result, VideoIoError};
use crate::fourcc::FourCC;
use crate::frame::{ColorLayout, Frame};
use crate::property::PropertyId;

/// Location of one frame payload inside the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChunkRef {
    offset: u64,
    len: u32,
}

/// Everything the demuxer learns from one pass over the file
#[derive(Debug)]
struct Layout {
    info: StreamInfo,
    frames: Vec<ChunkRef>,
}

/// Sequential reader for intra-only AVI files
pub struct AviCapture {
    path: PathBuf,
    file: BufReader<File>,
    info: StreamInfo,
    codec: Codec,
    frames: Vec<ChunkRef>,
    /// Index of the next frame to grab
    next: usize,
    grabbed: Option<Vec<u8>>,
}

impl AviCapture {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let target = path.display().to_string();

        let file = File::open(path).map_err(|e| VideoIoError::open_failed(&target, e.to_string()))?;
        let file_len = file.metadata()?.len();
        let mut file = BufReader::new(file);

        let layout = scan(&mut file, file_len).map_err(|e| VideoIoError::open_failed(&target, e.to_string()))?;
        let codec = Codec::from_fourcc(layout.info.fourcc).ok_or_else(|| {
            VideoIoError::open_failed(&target, format!("unsupported codec '{}'", layout.info.fourcc))
        })?;

        info!(
            "Opened AVI {} ({}x{} @ {:.3} fps, {}, {} frames)",
            target,
            layout.info.width,
            layout.info.height,
            layout.info.fps(),
            layout.info.fourcc,
            layout.frames.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            info: layout.info,
            codec,
            frames: layout.frames,
            next: 0,
            grabbed: None,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn layout(&self) -> ColorLayout {
        if self.info.is_color() {
            ColorLayout::Rgb
        } else {
            ColorLayout::Gray
        }
    }

    fn seek_to_frame(&mut self, index: f64) -> bool {
        if !index.is_finite() || index < 0.0 || index > self.frames.len() as f64 {
            warn!("Seek to frame {} outside 0..={} in {}", index, self.frames.len(), self.path.display());
            return false;
        }
        self.next = index.round() as usize;
        self.grabbed = None;
        debug!("Seeked {} to frame {}", self.path.display(), self.next);
        true
    }

    fn position_msec(&self) -> f64 {
        let fps = self.info.fps();
        if fps > 0.0 {
            self.next as f64 * 1000.0 / fps
        } else {
            0.0
        }
    }
}

impl CaptureBackend for AviCapture {
    fn name(&self) -> &'static str {
        "avi"
    }

    fn grab(&mut self) -> Result<bool> {
        self.grabbed = None;
        let Some(chunk) = self.frames.get(self.next).copied() else {
            return Ok(false);
        };
        // a failed read still consumes the frame
        self.next += 1;

        let mut data = vec![0u8; chunk.len as usize];
        self.file.seek(SeekFrom::Start(chunk.offset))?;
        self.file.read_exact(&mut data)?;
        self.grabbed = Some(data);
        Ok(true)
    }

    fn retrieve(&mut self) -> Result<Frame> {
        let data = self
            .grabbed
            .take()
            .ok_or_else(|| VideoIoError::decode("no frame has been grabbed"))?;
        self.codec.decode(&data, self.layout())
    }

    fn get(&self, id: PropertyId) -> Option<f64> {
        let total = self.frames.len() as f64;
        match id {
            PropertyId::PosFrames => Some(self.next as f64),
            PropertyId::PosMsec => Some(self.position_msec()),
            PropertyId::PosAviRatio => Some(if total > 0.0 { self.next as f64 / total } else { 0.0 }),
            PropertyId::FrameWidth => Some(f64::from(self.info.width)),
            PropertyId::FrameHeight => Some(f64::from(self.info.height)),
            PropertyId::Fps => Some(self.info.fps()),
            PropertyId::Fourcc => Some(f64::from(self.info.fourcc.as_u32())),
            PropertyId::FrameCount => Some(total),
            PropertyId::Monochrome => Some(if self.info.is_color() { 0.0 } else { 1.0 }),
            _ => None,
        }
    }

    fn set(&mut self, id: PropertyId, value: f64) -> bool {
        match id {
            PropertyId::PosFrames => self.seek_to_frame(value),
            PropertyId::PosMsec => {
                let fps = self.info.fps();
                fps > 0.0 && self.seek_to_frame(value * fps / 1000.0)
            }
            PropertyId::PosAviRatio => {
                (0.0..=1.0).contains(&value) && self.seek_to_frame(value * self.frames.len() as f64)
            }
            _ => false,
        }
    }

    fn release(&mut self) -> Result<()> {
        self.grabbed = None;
        debug!("Released AVI reader for {}", self.path.display());
        Ok(())
    }
}

/// Walk the chunk tree once, collecting stream headers and frame offsets
///
/// `hdrl`, `strl` and `movi` lists are descended into; everything else is
/// skipped. A truncated tail (unfinalized file) ends the scan rather than
/// failing it.
fn scan<R: Read + Seek>(reader: &mut R, file_len: u64) -> io::Result<Layout> {
    let header = riff::read_chunk_header(reader)?;
    let form = riff::read_tag(reader)?;
    if header.id != riff::RIFF || form != riff::AVI {
        return Err(invalid("not a RIFF AVI file"));
    }

    let mut avih: Option<(u32, u32, u32)> = None;
    let mut info: Option<StreamInfo> = None;
    let mut stream_count = 0u32;
    let mut video_stream: Option<u32> = None;
    let mut frame_tags: Option<(Tag, Tag)> = None;
    let mut frames = Vec::new();

    loop {
        let chunk = match riff::read_chunk_header(reader) {
            Ok(chunk) => chunk,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        };
        let payload_start = reader.stream_position()?;
        let size = u64::from(chunk.size);

        match chunk.id {
            riff::LIST | riff::RIFF => {
                let list_type = match riff::read_tag(reader) {
                    Ok(tag) => tag,
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                    Err(e) => return Err(e),
                };
                match list_type {
                    riff::HDRL | riff::MOVI | riff::AVIX => {}
                    riff::STRL => stream_count += 1,
                    _ => riff::skip(reader, size.saturating_sub(4))?,
                }
            }
            riff::AVIH => {
                let payload = read_payload(reader, chunk.size)?;
                let mut fields = Fields::new(&payload);
                let micros = fields.u32();
                for _ in 0..7 {
                    fields.u32();
                }
                avih = Some((micros, fields.u32(), fields.u32()));
            }
            riff::STRH => {
                let payload = read_payload(reader, chunk.size)?;
                let mut fields = Fields::new(&payload);
                let stream = stream_count.saturating_sub(1);
                if fields.tag() == riff::VIDS && video_stream.is_none() {
                    video_stream = Some(stream);
                    frame_tags = Some(chunk_tags(stream));
                    let fourcc = FourCC::from_u32(fields.u32());
                    fields.u32(); // flags
                    fields.u16(); // priority
                    fields.u16(); // language
                    fields.u32(); // initial frames
                    let scale = fields.u32();
                    let rate = fields.u32();
                    info = Some(StreamInfo {
                        width: 0,
                        height: 0,
                        fourcc,
                        rate,
                        scale,
                        bit_count: 24,
                    });
                }
            }
            riff::STRF => {
                let payload = read_payload(reader, chunk.size)?;
                let is_video = video_stream.is_some() && video_stream == stream_count.checked_sub(1);
                if let (true, Some(info)) = (is_video, info.as_mut()) {
                    if info.width == 0 {
                        let mut fields = Fields::new(&payload);
                        fields.u32(); // header size
                        info.width = fields.i32().unsigned_abs();
                        info.height = fields.i32().unsigned_abs();
                        fields.u16(); // planes
                        info.bit_count = fields.u16();
                        let compression = fields.u32();
                        if compression != 0 {
                            info.fourcc = FourCC::from_u32(compression);
                        }
                    }
                }
            }
            id if frame_tags.is_some_and(|(dc, db)| id == dc || id == db) => {
                if chunk.size > 0 && payload_start + size <= file_len {
                    frames.push(ChunkRef {
                        offset: payload_start,
                        len: chunk.size,
                    });
                }
                riff::skip(reader, size)?;
            }
            _ => riff::skip(reader, size)?,
        }
    }

    let mut info = info.ok_or_else(|| invalid("no video stream"))?;
    if let Some((micros, width, height)) = avih {
        if info.width == 0 {
            info.width = width;
            info.height = height;
        }
        if (info.rate == 0 || info.scale == 0) && micros > 0 {
            info.rate = 1_000_000;
            info.scale = micros;
        }
    }

    Ok(Layout { info, frames })
}

fn read_payload<R: Read + Seek>(reader: &mut R, size: u32) -> io::Result<Vec<u8>> {
    let mut payload = vec![0u8; size as usize];
    reader.read_exact(&mut payload)?;
    if size & 1 == 1 {
        reader.seek(SeekFrom::Current(1))?;
    }
    Ok(payload)
}

/// `NNdc` / `NNdb` chunk ids for stream `NN`
fn chunk_tags(stream: u32) -> (Tag, Tag) {
    let tens = b'0' + ((stream / 10) % 10) as u8;
    let ones = b'0' + (stream % 10) as u8;
    ([tens, ones, b'd', b'c'], [tens, ones, b'd', b'b'])
}

fn invalid(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::avi::riff::{encode_header, HeaderCounters};
    use std::io::Cursor;

    #[test]
    fn test_chunk_tags() {
        assert_eq!(chunk_tags(0), (*b"00dc", *b"00db"));
        assert_eq!(chunk_tags(12), (*b"12dc", *b"12db"));
    }

    #[test]
    fn test_rejects_non_avi() {
        let mut data = Cursor::new(b"RIFF\x04\x00\x00\x00WAVE".to_vec());
        assert!(scan(&mut data, 12).is_err());
    }

    #[test]
    fn test_scan_truncated_file() {
        let info = StreamInfo {
            width: 16,
            height: 8,
            fourcc: FourCC::MPNG,
            rate: 25,
            scale: 1,
            bit_count: 8,
        };
        let mut bytes = encode_header(&info, HeaderCounters::default());
        // one complete frame, then a chunk cut short
        bytes.extend_from_slice(b"00dc\x03\x00\x00\x00abc\x00");
        bytes.extend_from_slice(b"00dc\x10\x00\x00\x00xy");
        let len = bytes.len() as u64;

        let layout = scan(&mut Cursor::new(bytes), len).unwrap();
        assert_eq!(layout.info.width, 16);
        assert_eq!(layout.info.fourcc, FourCC::MPNG);
        assert!(!layout.info.is_color());
        assert_eq!(layout.frames, vec![ChunkRef { offset: 232, len: 3 }]);
    }
}
