//! Source image descriptors and selection limits.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A still selected by the caller, referenced (not copied) until staged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceImage {
    /// Filesystem path or `file://` URI.
    pub uri: String,

    /// Stable identifier assigned by the caller.
    pub id: String,

    /// Declared pixel dimensions (0 when unknown).
    pub width: u32,
    pub height: u32,

    /// Original file name, when the picker reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl SourceImage {
    pub fn new(uri: impl Into<String>, id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            uri: uri.into(),
            id: id.into(),
            width,
            height,
            file_name: None,
        }
    }

    /// Filesystem path with any `file://` scheme removed.
    pub fn local_path(&self) -> PathBuf {
        let raw = self.uri.strip_prefix("file://").unwrap_or(&self.uri);
        PathBuf::from(raw)
    }

    /// Lowercased extension of the source, if any.
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.local_path())
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Bounds on how many stills a caller accepts for one slideshow.
///
/// The render core does not enforce these; front ends check them before
/// starting a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionLimits {
    pub min: usize,
    pub max: usize,
}

/// Selection count outside of [`SelectionLimits`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("Select at least {min} images (got {count})")]
    TooFew { min: usize, count: usize },

    #[error("Select at most {max} images (got {count})")]
    TooMany { max: usize, count: usize },
}

impl Default for SelectionLimits {
    fn default() -> Self {
        Self { min: 3, max: 5 }
    }
}

impl SelectionLimits {
    pub fn check(&self, count: usize) -> Result<(), SelectionError> {
        if count < self.min {
            return Err(SelectionError::TooFew {
                min: self.min,
                count,
            });
        }
        if count > self.max {
            return Err(SelectionError::TooMany {
                max: self.max,
                count,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_path_strips_file_scheme() {
        let image = SourceImage::new("file:///var/mobile/IMG_0001.HEIC", "img_1", 4032, 3024);
        assert_eq!(
            image.local_path(),
            PathBuf::from("/var/mobile/IMG_0001.HEIC")
        );
        assert_eq!(image.extension().as_deref(), Some("heic"));
    }

    #[test]
    fn test_plain_path_is_untouched() {
        let image = SourceImage::new("/photos/beach.jpg", "img_2", 0, 0);
        assert_eq!(image.local_path(), PathBuf::from("/photos/beach.jpg"));
    }

    #[test]
    fn test_selection_limits() {
        let limits = SelectionLimits::default();
        assert_eq!(
            limits.check(2),
            Err(SelectionError::TooFew { min: 3, count: 2 })
        );
        assert!(limits.check(3).is_ok());
        assert!(limits.check(5).is_ok());
        assert_eq!(
            limits.check(6),
            Err(SelectionError::TooMany { max: 5, count: 6 })
        );
    }
}
