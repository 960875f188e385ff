//! Four-byte record and subrecord tags.

use std::fmt;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// A four-character code naming a record, group or subrecord type.
///
/// Tags are compared byte-for-byte; they are usually printable ASCII such as
/// `CELL` or `NPC_`, but nothing in the format guarantees it.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned,
)]
#[repr(transparent)]
pub struct Tag([u8; 4]);

impl Tag {
    /// Create a tag from raw bytes.
    #[inline]
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes of the tag.
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Interpret the tag as a little-endian u32.
    #[inline]
    pub const fn to_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }
}

impl From<&[u8; 4]> for Tag {
    #[inline]
    fn from(bytes: &[u8; 4]) -> Self {
        Self(*bytes)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_escapes_unprintable() {
        assert_eq!(Tag::new(*b"NPC_").to_string(), "NPC_");
        assert_eq!(Tag::new([b'A', 0, b'B', 0xff]).to_string(), "A\\x00B\\xff");
    }

    #[test]
    fn test_u32_view() {
        assert_eq!(Tag::new(*b"XXXX").to_u32(), 0x5858_5858);
    }
}
