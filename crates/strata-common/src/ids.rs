//! Entity identifiers shared by every content file dialect.
//!
//! A [`FormId`] packs the index of the content file that introduced an entity
//! into its high byte and a file-local serial into the low 24 bits. The high
//! byte is only meaningful relative to a particular load order, so identifiers
//! are rewritten whenever they move between "as stored" and "as loaded".

use std::fmt;
use std::str::FromStr;

/// A 32-bit identifier for one logical entity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FormId(u32);

impl FormId {
    /// Mod index reserved for entities created at runtime rather than read
    /// from a content file.
    pub const RUNTIME_MOD_INDEX: u8 = 0xFF;

    const LOCAL_MASK: u32 = 0x00FF_FFFF;

    /// Wrap a raw identifier as stored in a file.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Build an identifier from its mod index and local serial.
    #[inline]
    pub const fn new(mod_index: u8, local_id: u32) -> Self {
        Self(((mod_index as u32) << 24) | (local_id & Self::LOCAL_MASK))
    }

    /// Build a runtime identifier.
    #[inline]
    pub const fn runtime(local_id: u32) -> Self {
        Self::new(Self::RUNTIME_MOD_INDEX, local_id)
    }

    /// Get the raw 32-bit value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Get the content file index component.
    #[inline]
    pub const fn mod_index(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Get the file-local serial component.
    #[inline]
    pub const fn local_id(self) -> u32 {
        self.0 & Self::LOCAL_MASK
    }

    /// Return a copy with the content file index replaced.
    #[inline]
    pub const fn with_mod_index(self, mod_index: u8) -> Self {
        Self::new(mod_index, self.local_id())
    }

    /// Check whether this identifier belongs to a runtime-created entity.
    #[inline]
    pub const fn is_runtime(self) -> bool {
        self.mod_index() == Self::RUNTIME_MOD_INDEX
    }
}

impl fmt::Display for FormId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

impl fmt::Debug for FormId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FormId({:02X}:{:06X})", self.mod_index(), self.local_id())
    }
}

impl FromStr for FormId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        u32::from_str_radix(digits, 16).map(Self)
    }
}

/// Identity of a base record.
///
/// Dialect A names base records with case-insensitive strings, dialect B with
/// form identifiers.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RefId {
    /// String identifier, stored lowercased.
    Name(String),
    /// Form identifier, already remapped into the active load order.
    Form(FormId),
}

impl RefId {
    /// Build a string identifier, normalizing case.
    pub fn name(id: impl AsRef<str>) -> Self {
        Self::Name(id.as_ref().to_ascii_lowercase())
    }

    /// Get the form identifier, if this is one.
    pub fn as_form(&self) -> Option<FormId> {
        match self {
            Self::Form(id) => Some(*id),
            Self::Name(_) => None,
        }
    }
}

impl fmt::Display for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Form(id) => write!(f, "{id}"),
        }
    }
}

impl fmt::Debug for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "RefId({name:?})"),
            Self::Form(id) => write!(f, "RefId({id:?})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_id_components() {
        let id = FormId::new(0x02, 0x00_1234);
        assert_eq!(id.raw(), 0x0200_1234);
        assert_eq!(id.mod_index(), 2);
        assert_eq!(id.local_id(), 0x1234);
        assert_eq!(id.with_mod_index(5).raw(), 0x0500_1234);
    }

    #[test]
    fn test_local_id_is_masked() {
        let id = FormId::new(1, 0xAB00_0001);
        assert_eq!(id.mod_index(), 1);
        assert_eq!(id.local_id(), 0x0000_0001);
    }

    #[test]
    fn test_runtime_ids() {
        assert!(FormId::runtime(7).is_runtime());
        assert!(!FormId::new(0, 7).is_runtime());
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!("0x01000ABC".parse::<FormId>().unwrap(), FormId::from_raw(0x0100_0ABC));
        assert_eq!("ff000001".parse::<FormId>().unwrap(), FormId::runtime(1));
        assert!("not-hex".parse::<FormId>().is_err());
    }

    #[test]
    fn test_ref_id_names_are_case_insensitive() {
        assert_eq!(RefId::name("Iron_Dagger"), RefId::name("iron_dagger"));
        assert_eq!(RefId::name("Iron_Dagger").to_string(), "iron_dagger");
    }
}
