//! Session configuration.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use strata_common::Encoding;

use crate::{Error, Result};

/// Default number of content files kept open at once.
pub const DEFAULT_MAX_OPEN_READERS: usize = 16;

/// What to load and how.
///
/// # Example
///
/// ```
/// use strata_common::Encoding;
/// use strata_world::SessionConfig;
///
/// let config = SessionConfig::new("Data/Base.esm")
///     .with_plugin("Data/Patch.esp")
///     .with_encoding(Encoding::Windows1251)
///     .with_max_open_readers(4);
/// assert_eq!(config.files().count(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SessionConfig {
    /// The base master.
    pub base: PathBuf,
    /// Override files, in load order.
    pub plugins: Vec<PathBuf>,
    /// Code page of strings stored in the content files.
    pub encoding: Encoding,
    /// Upper bound on simultaneously open content files.
    pub max_open_readers: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base: PathBuf::new(),
            plugins: Vec::new(),
            encoding: Encoding::default(),
            max_open_readers: DEFAULT_MAX_OPEN_READERS,
        }
    }
}

impl SessionConfig {
    /// Create a configuration with only a base file.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            ..Self::default()
        }
    }

    /// Append an override file.
    pub fn with_plugin(mut self, plugin: impl Into<PathBuf>) -> Self {
        self.plugins.push(plugin.into());
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_max_open_readers(mut self, max: usize) -> Self {
        self.max_open_readers = max;
        self
    }

    /// Iterate over every content file, base first.
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.base.as_path()).chain(self.plugins.iter().map(PathBuf::as_path))
    }

    pub(crate) fn validate(&self) -> Result<NonZeroUsize> {
        if self.base.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("no base file"));
        }
        NonZeroUsize::new(self.max_open_readers)
            .ok_or(Error::InvalidConfig("max_open_readers must be at least 1"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(SessionConfig::default().validate().is_err());
        assert!(SessionConfig::new("a.esm")
            .with_max_open_readers(0)
            .validate()
            .is_err());
        assert_eq!(
            SessionConfig::new("a.esm").validate().unwrap().get(),
            DEFAULT_MAX_OPEN_READERS
        );
    }
}
