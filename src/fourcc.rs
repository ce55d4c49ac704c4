//! # FOURCC codec tags
//!
//! A FOURCC is four single-byte characters packed little-endian into a
//! `u32`: the first character is the least significant byte, so
//! `pack("abcd") == 0x6463_6261`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VideoIoError};

/// Pack a 4-character code into its integer form.
///
/// Fails with [`VideoIoError::InvalidLength`] unless `code` has exactly four
/// characters, and with [`VideoIoError::InvalidCharacter`] if a character is
/// outside U+0000..=U+00FF.
pub fn pack(code: &str) -> Result<u32> {
    let len = code.chars().count();
    if len != 4 {
        return Err(VideoIoError::InvalidLength { len });
    }

    let mut bytes = [0u8; 4];
    for (slot, ch) in bytes.iter_mut().zip(code.chars()) {
        *slot = u8::try_from(ch).map_err(|_| VideoIoError::InvalidCharacter { ch })?;
    }
    Ok(u32::from_le_bytes(bytes))
}

/// Unpack an integer into its 4-character code.
///
/// Total: every byte maps to the char with the same code point, which may
/// not be printable.
pub fn unpack(value: u32) -> String {
    value.to_le_bytes().iter().map(|&b| char::from(b)).collect()
}

/// A codec or pixel-format tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FourCC(u32);

impl FourCC {
    /// Motion JPEG
    pub const MJPG: FourCC = FourCC::new(b"MJPG");
    /// PNG-compressed frames
    pub const MPNG: FourCC = FourCC::new(b"MPNG");

    pub const fn new(code: &[u8; 4]) -> Self {
        Self(u32::from_le_bytes(*code))
    }

    /// Build a tag from four characters, like the classic `CV_FOURCC` macro
    pub fn from_chars(c1: char, c2: char, c3: char, c4: char) -> Result<Self> {
        let code: String = [c1, c2, c3, c4].iter().collect();
        code.parse()
    }

    pub const fn from_u32(value: u32) -> Self {
        Self(value)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    /// True if every byte is printable ASCII
    pub fn is_printable(self) -> bool {
        self.to_bytes().iter().all(|b| b.is_ascii_graphic() || *b == b' ')
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&unpack(self.0))
    }
}

impl FromStr for FourCC {
    type Err = VideoIoError;

    fn from_str(s: &str) -> Result<Self> {
        pack(s).map(Self)
    }
}

impl TryFrom<String> for FourCC {
    type Error = VideoIoError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<FourCC> for String {
    fn from(value: FourCC) -> Self {
        value.to_string()
    }
}

impl From<FourCC> for u32 {
    fn from(value: FourCC) -> Self {
        value.0
    }
}

impl From<u32> for FourCC {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_is_little_endian() {
        assert_eq!(pack("abcd").unwrap(), 1684234849);
        assert_eq!(unpack(1684234849), "abcd");
        assert_eq!(FourCC::MJPG.to_bytes(), *b"MJPG");
    }

    #[test]
    fn test_ascii_roundtrip() {
        for code in ["MJPG", "XVID", "H264", "avc1", "YUYV", "DIB ", "    ", "0000"] {
            assert_eq!(unpack(pack(code).unwrap()), code);
        }
    }

    #[test]
    fn test_every_u32_roundtrips() {
        let samples = [0u32, 1, 0x80, 0xff, 0x0100, 0x7fff_ffff, 0x8000_0000, 0xdead_beef, u32::MAX];
        for v in samples {
            assert_eq!(pack(&unpack(v)).unwrap(), v);
        }
        // sweep one byte lane through all values
        for b in 0..=255u32 {
            let v = b << 16 | 0x4142;
            assert_eq!(pack(&unpack(v)).unwrap(), v);
        }
    }

    #[test]
    fn test_invalid_length() {
        for code in ["", "MJP", "MJPEG", "toolong!"] {
            match pack(code) {
                Err(VideoIoError::InvalidLength { len }) => assert_eq!(len, code.chars().count()),
                other => panic!("expected InvalidLength for {:?}, got {:?}", code, other),
            }
        }
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        // four chars, five UTF-8 bytes
        assert_eq!(unpack(pack("ab\u{e9}d").unwrap()), "ab\u{e9}d");
    }

    #[test]
    fn test_wide_character_rejected() {
        assert!(matches!(
            pack("ab\u{263a}d"),
            Err(VideoIoError::InvalidCharacter { ch: '\u{263a}' })
        ));
    }

    #[test]
    fn test_from_chars() {
        let tag = FourCC::from_chars('M', 'J', 'P', 'G').unwrap();
        assert_eq!(tag, FourCC::MJPG);
        assert_eq!(tag.to_string(), "MJPG");
        assert!(tag.is_printable());
        assert!(!FourCC::from_u32(0).is_printable());
    }

    #[test]
    fn test_serde_as_text() {
        #[derive(Serialize, Deserialize)]
        struct Holder {
            codec: FourCC,
        }

        let text = toml::to_string(&Holder { codec: FourCC::MPNG }).unwrap();
        assert!(text.contains("\"MPNG\""));
        let back: Holder = toml::from_str(&text).unwrap();
        assert_eq!(back.codec, FourCC::MPNG);

        assert!(toml::from_str::<Holder>("codec = \"MJPEG\"").is_err());
    }
}
