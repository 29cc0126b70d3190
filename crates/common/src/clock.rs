//! Timestamp utilities for naming render artifacts.
//!
//! Every render attempt is stamped once at start. The stamp qualifies the
//! workspace directory name and the persisted output file name so that
//! retries never collide with each other.

use std::path::{Path, PathBuf};

/// A wall-clock stamp taken when a render attempt begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderStamp {
    /// Milliseconds since the Unix epoch.
    millis: i64,
}

impl RenderStamp {
    /// Stamp the current instant.
    pub fn now() -> Self {
        Self {
            millis: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Build a stamp from a known millisecond value (tests, replays).
    pub fn from_millis(millis: i64) -> Self {
        Self { millis }
    }

    /// Milliseconds since the Unix epoch.
    pub fn millis(&self) -> i64 {
        self.millis
    }

    /// `<prefix>_<millis>`.
    pub fn qualify(&self, prefix: &str) -> String {
        format!("{prefix}_{}", self.millis)
    }
}

/// Pick a path inside `dir` named `<stem>.<ext>` that does not exist yet.
///
/// Falls back to `<stem>_1.<ext>`, `<stem>_2.<ext>`, ... on collision.
pub fn collision_free_path(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let candidate = dir.join(format!("{stem}.{ext}"));
    if !candidate.exists() {
        return candidate;
    }

    let mut suffix = 1u32;
    loop {
        let candidate = dir.join(format!("{stem}_{suffix}.{ext}"));
        if !candidate.exists() {
            return candidate;
        }
        suffix += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualify_uses_millis() {
        let stamp = RenderStamp::from_millis(1_700_000_000_123);
        assert_eq!(stamp.qualify("render"), "render_1700000000123");
    }

    #[test]
    fn test_now_is_recent() {
        let before = chrono::Utc::now().timestamp_millis();
        let stamp = RenderStamp::now();
        assert!(stamp.millis() >= before);
    }

    #[test]
    fn test_collision_free_path_appends_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let first = collision_free_path(dir.path(), "slideshow_1", "mp4");
        assert_eq!(first, dir.path().join("slideshow_1.mp4"));

        std::fs::write(&first, b"x").unwrap();
        let second = collision_free_path(dir.path(), "slideshow_1", "mp4");
        assert_eq!(second, dir.path().join("slideshow_1_1.mp4"));

        std::fs::write(&second, b"x").unwrap();
        let third = collision_free_path(dir.path(), "slideshow_1", "mp4");
        assert_eq!(third, dir.path().join("slideshow_1_2.mp4"));
    }
}
