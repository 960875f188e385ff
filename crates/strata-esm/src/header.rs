//! Record and group header structures.

use zerocopy::byteorder::little_endian::{I32, U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use strata_common::{FormId, Tag};

use crate::dialect::flags;

/// Dialect A record header, following the four-byte tag.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub(crate) struct RawRecordHeader3 {
    pub size: U32,
    pub unused: U32,
    pub flags: U32,
}

/// Dialect B record header, following the four-byte tag.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub(crate) struct RawRecordHeader4 {
    pub size: U32,
    pub flags: U32,
    pub form_id: U32,
    pub version_control: U32,
    pub version: U16,
    pub unknown: U16,
}

/// Dialect B group header, following the `GRUP` tag.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub(crate) struct RawGroupHeader {
    /// Total group size including this header.
    pub size: U32,
    pub label: [u8; 4],
    pub group_type: I32,
    pub stamp: U16,
    pub unknown1: U16,
    pub version: U16,
    pub unknown2: U16,
}

/// Size of a group header, tag included.
pub const GROUP_HEADER_LEN: u64 = 24;

/// Header of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Record type.
    pub tag: Tag,
    /// Payload size in bytes, header excluded.
    pub size: u32,
    /// Record flags.
    pub flags: u32,
    /// Form id as stored in the file (dialect B only; zero in dialect A).
    pub form_id: FormId,
    /// Absolute offset of the header in the file.
    pub offset: u64,
}

impl RecordHeader {
    /// Check the deleted flag.
    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.flags & flags::DELETED != 0
    }

    /// Check the compressed flag.
    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.flags & flags::COMPRESSED != 0
    }
}

/// What a group contains, decoded from its type discriminant and label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    /// Top-level bucket for one record type.
    Top(Tag),
    /// Children of a worldspace record.
    WorldChildren(FormId),
    /// Block of interior cells.
    InteriorBlock(i32),
    /// Sub-block of interior cells.
    InteriorSubBlock(i32),
    /// Block of exterior cells.
    ExteriorBlock { x: i16, y: i16 },
    /// Sub-block of exterior cells.
    ExteriorSubBlock { x: i16, y: i16 },
    /// All references placed in one cell.
    CellChildren(FormId),
    /// Children of a dialogue topic.
    TopicChildren(FormId),
    /// Persistent references of a cell.
    CellPersistent(FormId),
    /// Temporary references of a cell.
    CellTemporary(FormId),
    /// Visible-when-distant references of a cell.
    CellVisibleDistant(FormId),
    /// A discriminant this reader does not know.
    Unknown(i32),
}

impl GroupKind {
    /// Decode a group's label and type discriminant.
    pub fn from_raw(label: [u8; 4], group_type: i32) -> Self {
        let form = FormId::from_raw(u32::from_le_bytes(label));
        let number = i32::from_le_bytes(label);
        let y = i16::from_le_bytes([label[0], label[1]]);
        let x = i16::from_le_bytes([label[2], label[3]]);
        match group_type {
            0 => Self::Top(Tag::new(label)),
            1 => Self::WorldChildren(form),
            2 => Self::InteriorBlock(number),
            3 => Self::InteriorSubBlock(number),
            4 => Self::ExteriorBlock { x, y },
            5 => Self::ExteriorSubBlock { x, y },
            6 => Self::CellChildren(form),
            7 => Self::TopicChildren(form),
            8 => Self::CellPersistent(form),
            9 => Self::CellTemporary(form),
            10 => Self::CellVisibleDistant(form),
            other => Self::Unknown(other),
        }
    }

    /// Encode back into a label and type discriminant.
    pub fn to_raw(self) -> ([u8; 4], i32) {
        let grid = |x: i16, y: i16| {
            let [y0, y1] = y.to_le_bytes();
            let [x0, x1] = x.to_le_bytes();
            [y0, y1, x0, x1]
        };
        match self {
            Self::Top(tag) => (*tag.as_bytes(), 0),
            Self::WorldChildren(id) => (id.raw().to_le_bytes(), 1),
            Self::InteriorBlock(n) => (n.to_le_bytes(), 2),
            Self::InteriorSubBlock(n) => (n.to_le_bytes(), 3),
            Self::ExteriorBlock { x, y } => (grid(x, y), 4),
            Self::ExteriorSubBlock { x, y } => (grid(x, y), 5),
            Self::CellChildren(id) => (id.raw().to_le_bytes(), 6),
            Self::TopicChildren(id) => (id.raw().to_le_bytes(), 7),
            Self::CellPersistent(id) => (id.raw().to_le_bytes(), 8),
            Self::CellTemporary(id) => (id.raw().to_le_bytes(), 9),
            Self::CellVisibleDistant(id) => (id.raw().to_le_bytes(), 10),
            Self::Unknown(n) => ([0; 4], n),
        }
    }

    /// Check whether this group directly holds a cell's references.
    pub fn holds_references(self) -> bool {
        matches!(
            self,
            Self::CellPersistent(_) | Self::CellTemporary(_) | Self::CellVisibleDistant(_)
        )
    }
}

/// Header of one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupHeader {
    /// Decoded group kind.
    pub kind: GroupKind,
    /// Total size in bytes, header included.
    pub size: u32,
    /// Absolute offset of the header in the file.
    pub offset: u64,
}

impl GroupHeader {
    /// Absolute offset one past the last byte of the group.
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset + u64::from(self.size)
    }

    /// Size of the group's children in bytes.
    #[inline]
    pub fn body_len(&self) -> u64 {
        u64::from(self.size).saturating_sub(GROUP_HEADER_LEN)
    }
}
