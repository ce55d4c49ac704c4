//! RIFF chunk primitives and the fixed-size AVI header written by
//! [`super::AviWriter`].

use std::io::{self, Read, Seek, SeekFrom};

use crate::fourcc::FourCC;

pub(crate) type Tag = [u8; 4];

pub(crate) const RIFF: Tag = *b"RIFF";
pub(crate) const LIST: Tag = *b"LIST";
pub(crate) const AVI: Tag = *b"AVI ";
pub(crate) const AVIX: Tag = *b"AVIX";
pub(crate) const HDRL: Tag = *b"hdrl";
pub(crate) const AVIH: Tag = *b"avih";
pub(crate) const STRL: Tag = *b"strl";
pub(crate) const STRH: Tag = *b"strh";
pub(crate) const STRF: Tag = *b"strf";
pub(crate) const MOVI: Tag = *b"movi";
pub(crate) const IDX1: Tag = *b"idx1";
pub(crate) const VIDS: Tag = *b"vids";

/// Compressed video chunk of stream 0
pub(crate) const FRAME_CHUNK: Tag = *b"00dc";

pub(crate) const AVIF_HASINDEX: u32 = 0x10;
pub(crate) const AVIIF_KEYFRAME: u32 = 0x10;

/// Bytes before the first `movi` payload chunk in a file we write
pub(crate) const HEADER_LEN: u64 = 224;
/// Offset of the `movi` list type tag; `idx1` offsets are relative to it
pub(crate) const MOVI_TAG_OFFSET: u64 = 220;

/// Chunk payloads are padded to an even length
pub(crate) fn padded(len: u64) -> u64 {
    len + (len & 1)
}

/// Id and payload size of one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChunkHeader {
    pub id: Tag,
    pub size: u32,
}

pub(crate) fn read_tag<R: Read>(reader: &mut R) -> io::Result<Tag> {
    let mut tag = [0u8; 4];
    reader.read_exact(&mut tag)?;
    Ok(tag)
}

pub(crate) fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    read_tag(reader).map(u32::from_le_bytes)
}

pub(crate) fn read_chunk_header<R: Read>(reader: &mut R) -> io::Result<ChunkHeader> {
    let id = read_tag(reader)?;
    let size = read_u32(reader)?;
    Ok(ChunkHeader { id, size })
}

/// Skip `len` payload bytes plus the pad byte
pub(crate) fn skip<R: Seek>(reader: &mut R, len: u64) -> io::Result<()> {
    let len = i64::try_from(padded(len)).map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "chunk too large"))?;
    reader.seek(SeekFrom::Current(len))?;
    Ok(())
}

/// Little-endian field reader over a chunk payload
pub(crate) struct Fields<'a> {
    data: &'a [u8],
}

impl<'a> Fields<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn tag(&mut self) -> Tag {
        let mut tag = [0u8; 4];
        for slot in tag.iter_mut() {
            *slot = self.byte();
        }
        tag
    }

    pub fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.tag())
    }

    pub fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.tag())
    }

    pub fn u16(&mut self) -> u16 {
        u16::from_le_bytes([self.byte(), self.byte()])
    }

    // short payloads read as zeros
    fn byte(&mut self) -> u8 {
        match self.data.split_first() {
            Some((&b, rest)) => {
                self.data = rest;
                b
            }
            None => 0,
        }
    }
}

/// Appends little-endian fields to a byte buffer
#[derive(Default)]
pub(crate) struct FieldWriter {
    buf: Vec<u8>,
}

impl FieldWriter {
    pub fn tag(&mut self, tag: Tag) -> &mut Self {
        self.buf.extend_from_slice(&tag);
        self
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn i32(&mut self, value: i32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn u16(&mut self, value: u16) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Video stream parameters carried by the AVI headers
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub fourcc: FourCC,
    /// Frames per second is `rate / scale`
    pub rate: u32,
    pub scale: u32,
    /// 24 for colour, 8 for grayscale
    pub bit_count: u16,
}

impl StreamInfo {
    pub fn fps(&self) -> f64 {
        if self.scale == 0 {
            0.0
        } else {
            f64::from(self.rate) / f64::from(self.scale)
        }
    }

    pub fn is_color(&self) -> bool {
        self.bit_count != 8
    }
}

/// `rate / scale` pair for a frame rate, both fitting the header's `u32`
/// fields
///
/// The pair is the closest continued-fraction convergent, so 30, 29.97,
/// 30000/1001 and 1/2500 are all stored exactly. `None` when no pair comes
/// within one part per million of `fps`.
pub(crate) fn rate_and_scale(fps: f64) -> Option<(u32, u32)> {
    if !(fps.is_finite() && fps > 0.0) {
        return None;
    }
    let limit = u64::from(u32::MAX);
    let (mut h2, mut h1) = (0u64, 1u64);
    let (mut k2, mut k1) = (1u64, 0u64);
    let mut best = None;
    let mut x = fps;

    for _ in 0..64 {
        let whole = x.floor();
        if whole > limit as f64 {
            break;
        }
        let a = whole as u64;
        let h = a * h1 + h2;
        let k = a * k1 + k2;
        if h > limit || k > limit {
            break;
        }
        best = Some((h as u32, k as u32));
        if ((h as f64 / k as f64 - fps) / fps).abs() < 1e-12 {
            break;
        }
        (h2, h1) = (h1, h);
        (k2, k1) = (k1, k);
        x = 1.0 / (x - whole);
    }

    best.filter(|&(rate, scale)| {
        rate > 0 && ((f64::from(rate) / f64::from(scale) - fps) / fps).abs() <= 1e-6
    })
}

/// Counters patched into the header when a file is finalized
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct HeaderCounters {
    pub frames: u32,
    /// Size of the `movi` list payload, including its type tag
    pub movi_size: u32,
    /// Size of the whole `RIFF` payload
    pub riff_size: u32,
    pub max_chunk: u32,
}

/// Serialize the `RIFF AVI ` header up to and including the `movi` tag
///
/// The result is always [`HEADER_LEN`] bytes long so it can be rewritten
/// in place once the final counters are known.
pub(crate) fn encode_header(info: &StreamInfo, counters: HeaderCounters) -> Vec<u8> {
    let fps = info.fps();
    let micros_per_frame = if fps > 0.0 { (1_000_000.0 / fps).round() as u32 } else { 0 };
    let bytes_per_sec = (f64::from(counters.max_chunk) * fps).ceil().min(f64::from(u32::MAX)) as u32;
    let channels: u32 = if info.is_color() { 3 } else { 1 };
    let rect_w = info.width.min(u32::from(u16::MAX)) as u16;
    let rect_h = info.height.min(u32::from(u16::MAX)) as u16;

    let mut w = FieldWriter::default();
    w.tag(RIFF).u32(counters.riff_size).tag(AVI);

    w.tag(LIST).u32(192).tag(HDRL);
    w.tag(AVIH).u32(56)
        .u32(micros_per_frame)
        .u32(bytes_per_sec)
        .u32(0) // padding granularity
        .u32(AVIF_HASINDEX)
        .u32(counters.frames)
        .u32(0) // initial frames
        .u32(1) // streams
        .u32(counters.max_chunk)
        .u32(info.width)
        .u32(info.height)
        .u32(0).u32(0).u32(0).u32(0);

    w.tag(LIST).u32(116).tag(STRL);
    w.tag(STRH).u32(56)
        .tag(VIDS)
        .u32(info.fourcc.as_u32())
        .u32(0) // flags
        .u16(0) // priority
        .u16(0) // language
        .u32(0) // initial frames
        .u32(info.scale)
        .u32(info.rate)
        .u32(0) // start
        .u32(counters.frames)
        .u32(counters.max_chunk)
        .u32(u32::MAX) // default quality
        .u32(0) // sample size
        .u16(0).u16(0).u16(rect_w).u16(rect_h);
    w.tag(STRF).u32(40)
        .u32(40)
        .i32(info.width as i32)
        .i32(info.height as i32)
        .u16(1) // planes
        .u16(info.bit_count)
        .u32(info.fourcc.as_u32())
        .u32(info.width.saturating_mul(info.height).saturating_mul(channels))
        .u32(0).u32(0).u32(0).u32(0);

    w.tag(LIST).u32(counters.movi_size).tag(MOVI);

    debug_assert_eq!(w.len() as u64, HEADER_LEN);
    w.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> StreamInfo {
        StreamInfo {
            width: 320,
            height: 240,
            fourcc: FourCC::MJPG,
            rate: 30,
            scale: 1,
            bit_count: 24,
        }
    }

    #[test]
    fn test_header_layout() {
        let header = encode_header(&info(), HeaderCounters::default());
        assert_eq!(header.len() as u64, HEADER_LEN);
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(&header[8..12], b"AVI ");
        assert_eq!(&header[MOVI_TAG_OFFSET as usize..HEADER_LEN as usize], b"movi");
        assert_eq!(&header[212..216], b"LIST");
    }

    #[test]
    fn test_header_fields_readable() {
        let counters = HeaderCounters { frames: 10, movi_size: 4, riff_size: 1000, max_chunk: 512 };
        let header = encode_header(&info(), counters);

        // avih payload starts after 'avih' + size at offset 24
        let mut avih = Fields::new(&header[32..88]);
        assert_eq!(avih.u32(), 33_333);
        avih.u32();
        avih.u32();
        assert_eq!(avih.u32(), AVIF_HASINDEX);
        assert_eq!(avih.u32(), 10);

        // strh payload at 108
        let mut strh = Fields::new(&header[108..164]);
        assert_eq!(strh.tag(), VIDS);
        assert_eq!(strh.tag(), *b"MJPG");
    }

    #[test]
    fn test_rate_and_scale() {
        assert_eq!(rate_and_scale(30.0), Some((30, 1)));
        assert_eq!(rate_and_scale(29.97), Some((2997, 100)));
        assert_eq!(rate_and_scale(30000.0 / 1001.0), Some((30000, 1001)));
        assert_eq!(rate_and_scale(23.976), Some((2997, 125)));
        let info = StreamInfo { rate: 2997, scale: 100, ..info() };
        assert!((info.fps() - 29.97).abs() < 1e-9);
    }

    #[test]
    fn test_extreme_rates() {
        // below one frame per second the rate field must not round to zero
        assert_eq!(rate_and_scale(0.0004), Some((1, 2500)));
        assert_eq!(rate_and_scale(4_000_000_000.0), Some((4_000_000_000, 1)));
        assert_eq!(rate_and_scale(1e10), None);
        assert_eq!(rate_and_scale(1e-12), None);
        assert_eq!(rate_and_scale(0.0), None);
        assert_eq!(rate_and_scale(f64::INFINITY), None);
    }

    #[test]
    fn test_padding() {
        assert_eq!(padded(0), 0);
        assert_eq!(padded(7), 8);
        assert_eq!(padded(8), 8);
    }

    #[test]
    fn test_short_fields_read_as_zero() {
        let mut fields = Fields::new(&[1, 0]);
        assert_eq!(fields.u32(), 1);
        assert_eq!(fields.u16(), 0);
    }
}
