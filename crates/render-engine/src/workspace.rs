//! Per-attempt scratch directories and output finalization.
//!
//! Each render attempt gets its own `render_<millis>` directory under the
//! workspace root. Staged stills and the intermediate video live there until
//! the attempt ends; the directory is removed on every exit path.

use std::path::{Path, PathBuf};

use stillmotion_common::clock::{collision_free_path, RenderStamp};
use stillmotion_common::error::{StillmotionError, StillmotionResult};

const WORKSPACE_PREFIX: &str = "render";
const OUTPUT_PREFIX: &str = "slideshow";
const OUTPUT_EXTENSION: &str = "mp4";
const INTERMEDIATE_NAME: &str = "output.mp4";

/// Creates and sweeps workspaces below a root directory.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh, empty workspace for the attempt stamped `stamp`.
    ///
    /// The workspace path is absolute even when the root is relative.
    pub fn create(&self, stamp: &RenderStamp) -> StillmotionResult<Workspace> {
        let root = absolutize(&self.root)?;
        std::fs::create_dir_all(&root).map_err(|e| {
            StillmotionError::workspace(format!(
                "failed to create workspace root {}: {e}",
                root.display()
            ))
        })?;

        let base = stamp.qualify(WORKSPACE_PREFIX);
        let mut suffix = 0u32;
        loop {
            let name = if suffix == 0 {
                base.clone()
            } else {
                format!("{base}_{suffix}")
            };
            let path = root.join(name);
            match std::fs::create_dir(&path) {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "Workspace created");
                    return Ok(Workspace {
                        path,
                        removed: false,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => suffix += 1,
                Err(e) => {
                    return Err(StillmotionError::workspace(format!(
                        "failed to create workspace {}: {e}",
                        path.display()
                    )))
                }
            }
        }
    }

    /// The workspace `create` would make for `stamp`, without touching the
    /// filesystem. Dropping it removes nothing.
    pub fn preview(&self, stamp: &RenderStamp) -> StillmotionResult<Workspace> {
        Ok(Workspace {
            path: absolutize(&self.root)?.join(stamp.qualify(WORKSPACE_PREFIX)),
            removed: true,
        })
    }

    /// Remove workspaces left behind by attempts that never cleaned up.
    ///
    /// Only call while no attempt is in flight. Returns how many directories
    /// were removed.
    pub fn sweep_stale(&self) -> StillmotionResult<usize> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let prefix = format!("{WORKSPACE_PREFIX}_");
        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            let is_workspace = entry.file_type()?.is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with(&prefix));
            if !is_workspace {
                continue;
            }
            match std::fs::remove_dir_all(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(
                    path = %entry.path().display(),
                    error = %e,
                    "Failed to remove stale workspace"
                ),
            }
        }

        if removed > 0 {
            tracing::info!(removed, root = %self.root.display(), "Swept stale workspaces");
        }
        Ok(removed)
    }
}

/// A scratch directory owned by exactly one render attempt.
///
/// Dropping the workspace removes it.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    removed: bool,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Staged still for selection `index`.
    pub fn staged_path(&self, index: usize, extension: &str) -> PathBuf {
        self.path.join(staged_file_name(index, extension))
    }

    /// Where the engine writes the encoded video.
    pub fn output_path(&self) -> PathBuf {
        self.path.join(INTERMEDIATE_NAME)
    }

    /// Remove the directory and everything in it.
    ///
    /// Failures are logged and never escalate; calling it twice is a no-op.
    pub fn cleanup(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Workspace removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove workspace"
            ),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Resolve `path` against the current directory when it is relative.
fn absolutize(path: &Path) -> StillmotionResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| {
        StillmotionError::workspace(format!("cannot resolve {}: {e}", path.display()))
    })?;
    Ok(cwd.join(path))
}

/// Canonical staged name: `image_000.<ext>`, zero-padded to three digits.
fn staged_file_name(index: usize, extension: &str) -> String {
    format!("image_{index:03}.{extension}")
}

/// Move an encoded video out of its workspace into `output_dir`.
///
/// The destination is `slideshow_<millis>.mp4`, suffixed when that name is
/// already taken. Rename is tried first; across filesystems the file is
/// copied and the source removed.
pub fn finalize_output(
    encoded: &Path,
    output_dir: &Path,
    stamp: &RenderStamp,
) -> StillmotionResult<PathBuf> {
    if !encoded.is_file() {
        return Err(StillmotionError::unexpected(format!(
            "encoded video missing at {}",
            encoded.display()
        )));
    }

    let output_dir = absolutize(output_dir)?;
    std::fs::create_dir_all(&output_dir).map_err(|e| {
        StillmotionError::unexpected(format!(
            "failed to create output directory {}: {e}",
            output_dir.display()
        ))
    })?;

    let dest = collision_free_path(
        &output_dir,
        &stamp.qualify(OUTPUT_PREFIX),
        OUTPUT_EXTENSION,
    );

    if std::fs::rename(encoded, &dest).is_err() {
        std::fs::copy(encoded, &dest).map_err(|e| {
            StillmotionError::unexpected(format!(
                "failed to move video to {}: {e}",
                dest.display()
            ))
        })?;
        let _ = std::fs::remove_file(encoded);
    }

    tracing::info!(path = %dest.display(), "Video persisted");
    Ok(dest)
}
