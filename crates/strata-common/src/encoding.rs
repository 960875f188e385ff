//! Legacy code page transcoding.
//!
//! Older content files store text in a Windows code page chosen by the
//! localization that produced them. The reader is configured with one
//! [`Encoding`] for the whole session.

use std::borrow::Cow;

/// Text encoding used by content files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Encoding {
    /// UTF-8; invalid sequences are replaced rather than rejected.
    Utf8,
    /// Windows-1252 (western European).
    #[default]
    Windows1252,
    /// Windows-1251 (cyrillic).
    Windows1251,
}

impl Encoding {
    /// Parse an encoding name as used on the command line (`utf8`, `win1252`, `win1251`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Some(Self::Utf8),
            "win1252" | "windows1252" | "windows-1252" | "cp1252" => Some(Self::Windows1252),
            "win1251" | "windows1251" | "windows-1251" | "cp1251" => Some(Self::Windows1251),
            _ => None,
        }
    }
}

const REPLACEMENT: char = '\u{FFFD}';

/// Windows-1252 code points for bytes 0x80..=0x9F. Bytes 0xA0..=0xFF map to
/// the identical Latin-1 code points.
const WIN1252_HIGH: [char; 32] = [
    '\u{20AC}', REPLACEMENT, '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', REPLACEMENT, '\u{017D}', REPLACEMENT,
    REPLACEMENT, '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', REPLACEMENT, '\u{017E}', '\u{0178}',
];

/// Windows-1251 code points for bytes 0x80..=0xBF. Bytes 0xC0..=0xFF map to
/// U+0410..=U+044F.
const WIN1251_HIGH: [char; 64] = [
    '\u{0402}', '\u{0403}', '\u{201A}', '\u{0453}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{20AC}', '\u{2030}', '\u{0409}', '\u{2039}', '\u{040A}', '\u{040C}', '\u{040B}', '\u{040F}',
    '\u{0452}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    REPLACEMENT, '\u{2122}', '\u{0459}', '\u{203A}', '\u{045A}', '\u{045C}', '\u{045B}', '\u{045F}',
    '\u{00A0}', '\u{040E}', '\u{045E}', '\u{0408}', '\u{00A4}', '\u{0490}', '\u{00A6}', '\u{00A7}',
    '\u{0401}', '\u{00A9}', '\u{0404}', '\u{00AB}', '\u{00AC}', '\u{00AD}', '\u{00AE}', '\u{0407}',
    '\u{00B0}', '\u{00B1}', '\u{0406}', '\u{0456}', '\u{0491}', '\u{00B5}', '\u{00B6}', '\u{00B7}',
    '\u{0451}', '\u{2116}', '\u{0454}', '\u{00BB}', '\u{0458}', '\u{0405}', '\u{0455}', '\u{0457}',
];

/// Converts between a content file encoding and UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Transcoder {
    encoding: Encoding,
}

impl Transcoder {
    /// Create a transcoder for the given encoding.
    pub const fn new(encoding: Encoding) -> Self {
        Self { encoding }
    }

    /// Get the configured encoding.
    pub const fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Decode raw bytes, stopping at the first NUL.
    pub fn decode(&self, bytes: &[u8]) -> String {
        let end = memchr::memchr(0, bytes).unwrap_or(bytes.len());
        let bytes = &bytes[..end];

        if bytes.is_ascii() {
            // ASCII is identical in every supported code page.
            return String::from_utf8_lossy(bytes).into_owned();
        }

        match self.encoding {
            Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Encoding::Windows1252 => bytes.iter().map(|&b| decode_1252(b)).collect(),
            Encoding::Windows1251 => bytes.iter().map(|&b| decode_1251(b)).collect(),
        }
    }

    /// Encode text for writing. Characters the code page cannot represent
    /// become `?`.
    pub fn encode<'a>(&self, text: &'a str) -> Cow<'a, [u8]> {
        if text.is_ascii() || self.encoding == Encoding::Utf8 {
            return Cow::Borrowed(text.as_bytes());
        }

        let encoded = text
            .chars()
            .map(|c| match self.encoding {
                Encoding::Windows1252 => encode_1252(c),
                Encoding::Windows1251 => encode_1251(c),
                Encoding::Utf8 => unreachable!("handled above"),
            })
            .collect();
        Cow::Owned(encoded)
    }
}

fn decode_1252(b: u8) -> char {
    match b {
        0x80..=0x9F => WIN1252_HIGH[(b - 0x80) as usize],
        _ => b as char,
    }
}

fn decode_1251(b: u8) -> char {
    match b {
        0x00..=0x7F => b as char,
        0x80..=0xBF => WIN1251_HIGH[(b - 0x80) as usize],
        _ => char::from_u32(0x0410 + (b - 0xC0) as u32).unwrap_or(REPLACEMENT),
    }
}

fn encode_1252(c: char) -> u8 {
    let code = c as u32;
    if code < 0x80 || (0xA0..=0xFF).contains(&code) {
        return code as u8;
    }
    WIN1252_HIGH
        .iter()
        .position(|&mapped| mapped == c && mapped != REPLACEMENT)
        .map_or(b'?', |i| 0x80 + i as u8)
}

fn encode_1251(c: char) -> u8 {
    let code = c as u32;
    if code < 0x80 {
        return code as u8;
    }
    if (0x0410..=0x044F).contains(&code) {
        return (code - 0x0410) as u8 + 0xC0;
    }
    WIN1251_HIGH
        .iter()
        .position(|&mapped| mapped == c && mapped != REPLACEMENT)
        .map_or(b'?', |i| 0x80 + i as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_stops_at_nul() {
        let t = Transcoder::new(Encoding::Windows1252);
        assert_eq!(t.decode(b"Balmora\0junk"), "Balmora");
    }

    #[test]
    fn test_decode_1252_specials() {
        let t = Transcoder::new(Encoding::Windows1252);
        assert_eq!(t.decode(&[0x80, b' ', 0xE9, 0x99]), "\u{20AC} \u{E9}\u{2122}");
    }

    #[test]
    fn test_decode_1251_cyrillic() {
        let t = Transcoder::new(Encoding::Windows1251);
        // "Мир"
        assert_eq!(t.decode(&[0xCC, 0xE8, 0xF0]), "Мир");
        assert_eq!(t.decode(&[0xA8]), "Ё");
    }

    #[test]
    fn test_encode_matches_decode() {
        for encoding in [Encoding::Windows1252, Encoding::Windows1251] {
            let t = Transcoder::new(encoding);
            let bytes: Vec<u8> = (0x20..=0xFFu8).filter(|&b| b != 0x7F).collect();
            let text = t.decode(&bytes);
            let back = t.encode(&text);
            for (original, encoded) in bytes.iter().zip(back.iter()) {
                if t.decode(&[*original]) != "\u{FFFD}" {
                    assert_eq!(original, encoded, "{encoding:?} byte {original:#04x}");
                }
            }
        }
    }

    #[test]
    fn test_unrepresentable_becomes_question_mark() {
        let t = Transcoder::new(Encoding::Windows1252);
        assert_eq!(t.encode("a\u{4E16}b").as_ref(), b"a?b");
    }

    #[test]
    fn test_encoding_names() {
        assert_eq!(Encoding::from_name("UTF-8"), Some(Encoding::Utf8));
        assert_eq!(Encoding::from_name("win1251"), Some(Encoding::Windows1251));
        assert_eq!(Encoding::from_name("latin9"), None);
    }
}
