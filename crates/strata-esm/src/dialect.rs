//! The two supported binary dialects and their shared constants.

use std::fmt;

use strata_common::Tag;

/// Binary dialect of a content file.
///
/// Both dialects share the byte cursor and the subrecord model but differ in
/// header shape and nesting rules:
///
/// - [`Dialect::Tes3`]: flat record stream, 16-byte record headers, u32
///   subrecord lengths. Cell references are subrecord runs inside `CELL`.
/// - [`Dialect::Tes4`]: records nested in `GRUP` groups, 24-byte record
///   headers carrying a form id, u16 subrecord lengths with an `XXXX` escape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Tes3,
    Tes4,
}

impl Dialect {
    /// Detect the dialect from the tag of the first record in a file.
    pub fn from_magic(tag: Tag) -> Option<Self> {
        match tag.as_bytes() {
            b"TES3" => Some(Self::Tes3),
            b"TES4" => Some(Self::Tes4),
            _ => None,
        }
    }

    /// Tag of the header record.
    pub const fn magic(self) -> Tag {
        match self {
            Self::Tes3 => tags::TES3,
            Self::Tes4 => tags::TES4,
        }
    }

    /// Size of a record header, tag included.
    pub const fn record_header_len(self) -> u64 {
        match self {
            Self::Tes3 => 16,
            Self::Tes4 => 24,
        }
    }

    /// Size of a subrecord header, tag included.
    pub const fn sub_header_len(self) -> u32 {
        match self {
            Self::Tes3 => 8,
            Self::Tes4 => 6,
        }
    }

    /// Check whether a header version is one this reader understands.
    pub fn accepts_version(self, version: f32) -> bool {
        let known: &[f32] = match self {
            Self::Tes3 => &[1.2, 1.3],
            Self::Tes4 => &[0.94, 0.95, 1.0, 1.7],
        };
        known.iter().any(|v| (v - version).abs() < 0.001)
    }

    /// Version written into new files.
    pub const fn default_version(self) -> f32 {
        match self {
            Self::Tes3 => 1.3,
            Self::Tes4 => 1.7,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tes3 => "TES3",
            Self::Tes4 => "TES4",
        })
    }
}

/// Record flag bits.
pub mod flags {
    /// Header record: the file is a master.
    pub const MASTER: u32 = 0x0000_0001;
    /// The record is deleted.
    pub const DELETED: u32 = 0x0000_0020;
    /// Dialect B: the record payload is zlib-compressed.
    pub const COMPRESSED: u32 = 0x0004_0000;
}

/// Record and subrecord tags used by the readers and writers.
pub mod tags {
    use strata_common::Tag;

    pub const TES3: Tag = Tag::new(*b"TES3");
    pub const TES4: Tag = Tag::new(*b"TES4");
    pub const GRUP: Tag = Tag::new(*b"GRUP");
    pub const XXXX: Tag = Tag::new(*b"XXXX");

    pub const HEDR: Tag = Tag::new(*b"HEDR");
    pub const MAST: Tag = Tag::new(*b"MAST");
    pub const DATA: Tag = Tag::new(*b"DATA");
    pub const CNAM: Tag = Tag::new(*b"CNAM");
    pub const SNAM: Tag = Tag::new(*b"SNAM");

    pub const CELL: Tag = Tag::new(*b"CELL");
    pub const WRLD: Tag = Tag::new(*b"WRLD");
    pub const REFR: Tag = Tag::new(*b"REFR");
    pub const ACHR: Tag = Tag::new(*b"ACHR");

    pub const NAME: Tag = Tag::new(*b"NAME");
    pub const EDID: Tag = Tag::new(*b"EDID");
    pub const MODL: Tag = Tag::new(*b"MODL");
    pub const FNAM: Tag = Tag::new(*b"FNAM");
    pub const FULL: Tag = Tag::new(*b"FULL");
    pub const DELE: Tag = Tag::new(*b"DELE");
    pub const XCLC: Tag = Tag::new(*b"XCLC");

    pub const FRMR: Tag = Tag::new(*b"FRMR");
    pub const MVRF: Tag = Tag::new(*b"MVRF");
    pub const CNDT: Tag = Tag::new(*b"CNDT");
    pub const XSCL: Tag = Tag::new(*b"XSCL");
    pub const NAM9: Tag = Tag::new(*b"NAM9");
    pub const XCNT: Tag = Tag::new(*b"XCNT");
    pub const XCHG: Tag = Tag::new(*b"XCHG");
    pub const FLTV: Tag = Tag::new(*b"FLTV");
    pub const KNAM: Tag = Tag::new(*b"KNAM");
    pub const XLOC: Tag = Tag::new(*b"XLOC");
    pub const DODT: Tag = Tag::new(*b"DODT");
    pub const DNAM: Tag = Tag::new(*b"DNAM");
    pub const XTEL: Tag = Tag::new(*b"XTEL");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_round_trip() {
        for dialect in [Dialect::Tes3, Dialect::Tes4] {
            assert_eq!(Dialect::from_magic(dialect.magic()), Some(dialect));
        }
        assert_eq!(Dialect::from_magic(Tag::new(*b"RIFF")), None);
    }

    #[test]
    fn test_versions() {
        assert!(Dialect::Tes3.accepts_version(1.3));
        assert!(!Dialect::Tes3.accepts_version(1.7));
        assert!(Dialect::Tes4.accepts_version(0.94));
        assert!(!Dialect::Tes4.accepts_version(2.0));
    }
}
