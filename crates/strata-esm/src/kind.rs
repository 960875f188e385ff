//! Record type dispatch table.
//!
//! Every record tag is classified exactly once, when its header is read. The
//! result is a closed enum, so downstream code matches on [`Category`] rather
//! than inspecting tags again.

use std::fmt;

use strata_common::Tag;

use crate::dialect::{tags, Dialect};

/// Object category of a base record, and of the references placed from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Category {
    Activator,
    Container,
    Door,
    Light,
    Misc,
    Npc,
    Static,
    Weapon,
}

impl Category {
    /// Every category, in storage order.
    pub const ALL: [Category; 8] = [
        Self::Activator,
        Self::Container,
        Self::Door,
        Self::Light,
        Self::Misc,
        Self::Npc,
        Self::Static,
        Self::Weapon,
    ];

    /// Record tag shared by both dialects.
    pub const fn tag(self) -> Tag {
        Tag::new(match self {
            Self::Activator => *b"ACTI",
            Self::Container => *b"CONT",
            Self::Door => *b"DOOR",
            Self::Light => *b"LIGH",
            Self::Misc => *b"MISC",
            Self::Npc => *b"NPC_",
            Self::Static => *b"STAT",
            Self::Weapon => *b"WEAP",
        })
    }

    /// Look up the category stored under `tag`.
    pub fn from_tag(tag: Tag) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.tag() == tag)
    }

    /// Position in [`Category::ALL`].
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Activator => "activator",
            Self::Container => "container",
            Self::Door => "door",
            Self::Light => "light",
            Self::Misc => "misc",
            Self::Npc => "npc",
            Self::Static => "static",
            Self::Weapon => "weapon",
        })
    }
}

/// How a record is handled by the loaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// A base record the reference store can place.
    Base(Category),
    /// A cell.
    Cell,
    /// A placed reference (dialect B; dialect A stores them inside cells).
    Reference,
    /// A worldspace.
    World,
    /// A known type with no consumer here; skipped silently.
    Ignored,
}

/// Known record types nothing here consumes.
const IGNORED: &[&[u8; 4]] = &[
    b"GMST", b"GLOB", b"CLAS", b"FACT", b"RACE", b"SOUN", b"SKIL", b"MGEF", b"SCPT", b"REGN",
    b"BSGN", b"LTEX", b"SPEL", b"ALCH", b"APPA", b"ARMO", b"BODY", b"CLOT", b"BOOK", b"INGR",
    b"LOCK", b"PROB", b"REPA", b"LEVI", b"LEVC", b"CREA", b"DIAL", b"INFO", b"PGRD", b"SNDG",
    b"LAND", b"ENCH", b"SSCR", b"TXST", b"MICN", b"HAIR", b"EYES", b"FLOR", b"FURN", b"AMMO",
    b"KEYM", b"SLGM", b"LVLN", b"LVLI", b"WTHR", b"CLMT", b"IDLE", b"PACK", b"CSTY",
    b"LSCR", b"LVSP", b"ANIO", b"WATR", b"EFSH", b"NAVM", b"NAVI", b"QUST", b"TREE", b"GRAS",
    b"ACHE", b"ACRE", b"PGRE", b"ROAD",
];

impl RecordKind {
    /// Classify a record tag. `None` means the tag is unknown to both the
    /// consumers and the ignore list.
    pub fn classify(dialect: Dialect, tag: Tag) -> Option<Self> {
        if let Some(category) = Category::from_tag(tag) {
            return Some(Self::Base(category));
        }
        match tag {
            tags::CELL => Some(Self::Cell),
            tags::REFR | tags::ACHR if dialect == Dialect::Tes4 => Some(Self::Reference),
            tags::WRLD if dialect == Dialect::Tes4 => Some(Self::World),
            _ if IGNORED.contains(&tag.as_bytes()) => Some(Self::Ignored),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_tags_round_trip() {
        for category in Category::ALL {
            assert_eq!(Category::from_tag(category.tag()), Some(category));
            assert_eq!(Category::ALL[category.index()], category);
        }
    }

    #[test]
    fn test_classify() {
        let classify = RecordKind::classify;
        assert_eq!(
            classify(Dialect::Tes3, Tag::new(*b"STAT")),
            Some(RecordKind::Base(Category::Static))
        );
        assert_eq!(classify(Dialect::Tes3, Tag::new(*b"CELL")), Some(RecordKind::Cell));
        assert_eq!(classify(Dialect::Tes4, Tag::new(*b"REFR")), Some(RecordKind::Reference));
        assert_eq!(classify(Dialect::Tes3, Tag::new(*b"REFR")), None);
        assert_eq!(classify(Dialect::Tes3, Tag::new(*b"GMST")), Some(RecordKind::Ignored));
        assert_eq!(classify(Dialect::Tes4, Tag::new(*b"ZZZZ")), None);
    }
}
