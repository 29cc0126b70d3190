//! Staging source images into a workspace.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use stillmotion_common::config::{EngineConfig, StillConverterKind};
use stillmotion_common::error::{StillmotionError, StillmotionResult};
use stillmotion_model::{SourceImage, CONVERSION_QUALITY};
use tokio_util::sync::CancellationToken;

use crate::workspace::Workspace;

/// Source formats the encoding engine cannot ingest directly.
const CONVERTED_EXTENSIONS: [&str; 2] = ["heic", "heif"];

/// Extension for stills that were re-encoded before staging.
const BASELINE_EXTENSION: &str = "jpg";

/// Re-encodes a still into a baseline JPEG.
pub trait ImageConverter: Send + Sync {
    /// Converter name for logs.
    fn name(&self) -> &str;

    /// Write `source` as a JPEG at `dest` with `quality` in `(0, 1]`.
    fn convert(&self, source: &Path, dest: &Path, quality: f32) -> StillmotionResult<()>;
}

/// Decodes with the `image` crate and writes a JPEG in process.
///
/// Handles the formats the crate was built with; anything else fails with
/// a preparation error.
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterConverter;

impl ImageConverter for RasterConverter {
    fn name(&self) -> &str {
        "raster"
    }

    fn convert(&self, source: &Path, dest: &Path, quality: f32) -> StillmotionResult<()> {
        use image::codecs::jpeg::JpegEncoder;

        let decoded = image::open(source).map_err(|e| {
            StillmotionError::preparation(format!("cannot decode {}: {e}", source.display()))
        })?;
        let rgb = decoded.to_rgb8();

        let file = std::fs::File::create(dest).map_err(|e| {
            StillmotionError::preparation(format!("cannot create {}: {e}", dest.display()))
        })?;
        let writer = std::io::BufWriter::new(file);
        let mut encoder = JpegEncoder::new_with_quality(writer, jpeg_quality(quality));
        encoder.encode_image(&rgb).map_err(|e| {
            StillmotionError::preparation(format!("JPEG encode failed for {}: {e}", source.display()))
        })
    }
}

/// Re-encodes through the ffmpeg binary, which handles HEIC where the
/// build supports it.
#[derive(Debug, Clone)]
pub struct FfmpegStillConverter {
    binary: PathBuf,
}

impl FfmpegStillConverter {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl ImageConverter for FfmpegStillConverter {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn convert(&self, source: &Path, dest: &Path, quality: f32) -> StillmotionResult<()> {
        let output = Command::new(&self.binary)
            .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(source)
            .args(["-frames:v", "1", "-q:v"])
            .arg(ffmpeg_qscale(quality).to_string())
            .arg(dest)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                StillmotionError::preparation(format!(
                    "failed to start {}: {e}",
                    self.binary.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StillmotionError::preparation(format!(
                "conversion of {} failed ({}): {}",
                source.display(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Converter selected by configuration.
pub fn converter_from_config(
    config: &EngineConfig,
    ffmpeg_binary: &Path,
) -> Arc<dyn ImageConverter> {
    match config.still_converter {
        StillConverterKind::Raster => Arc::new(RasterConverter),
        StillConverterKind::Ffmpeg => Arc::new(FfmpegStillConverter::new(ffmpeg_binary)),
    }
}

fn jpeg_quality(quality: f32) -> u8 {
    (quality.clamp(0.01, 1.0) * 100.0).round() as u8
}

/// Map a `(0, 1]` quality factor onto ffmpeg's JPEG q-scale (2 best, 31 worst).
fn ffmpeg_qscale(quality: f32) -> u32 {
    let q = quality.clamp(0.0, 1.0);
    (2.0 + (1.0 - q) * 29.0).round() as u32
}

/// A still copied into the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedImage {
    /// Position in the selection.
    pub index: usize,
    /// Absolute path inside the workspace.
    pub path: PathBuf,
    /// Whether the source was re-encoded.
    pub converted: bool,
}

/// Result of a preparation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preparation {
    /// Every image was staged, in selection order.
    Staged(Vec<StagedImage>),
    /// Cancellation was observed between images.
    Interrupted,
}

/// Normalizes and stages source images.
#[derive(Clone)]
pub struct ImagePreparer {
    converter: Arc<dyn ImageConverter>,
    quality: f32,
}

impl ImagePreparer {
    pub fn new(converter: Arc<dyn ImageConverter>) -> Self {
        Self {
            converter,
            quality: CONVERSION_QUALITY,
        }
    }

    /// Whether `image` must be re-encoded before the engine can read it.
    pub fn needs_conversion(image: &SourceImage) -> bool {
        image
            .extension()
            .is_some_and(|ext| CONVERTED_EXTENSIONS.contains(&ext.as_str()))
    }

    /// Extension of the staged copy: `jpg` for converted sources and for
    /// sources without one, otherwise the lowercased source extension.
    pub fn staged_extension(image: &SourceImage) -> String {
        if Self::needs_conversion(image) {
            return BASELINE_EXTENSION.to_string();
        }
        image
            .extension()
            .unwrap_or_else(|| BASELINE_EXTENSION.to_string())
    }

    /// Stage `images` into `workspace` as `image_000.<ext>`, ...
    ///
    /// Sources are copied, never moved. Blocking; run it off the async
    /// runtime. Partially staged files are left for workspace cleanup.
    pub fn prepare(
        &self,
        images: &[SourceImage],
        workspace: &Workspace,
        interrupt: &CancellationToken,
    ) -> StillmotionResult<Preparation> {
        let mut staged = Vec::with_capacity(images.len());

        for (index, image) in images.iter().enumerate() {
            if interrupt.is_cancelled() {
                tracing::debug!(index, "Preparation interrupted");
                return Ok(Preparation::Interrupted);
            }

            let source = image.local_path();
            if !source.is_file() {
                return Err(StillmotionError::FileNotFound { path: source });
            }

            let converted = Self::needs_conversion(image);
            let dest = workspace.staged_path(index, &Self::staged_extension(image));

            if converted {
                tracing::debug!(
                    index,
                    converter = self.converter.name(),
                    source = %source.display(),
                    "Converting still"
                );
                self.converter.convert(&source, &dest, self.quality)?;
            } else {
                std::fs::copy(&source, &dest).map_err(|e| {
                    StillmotionError::preparation(format!(
                        "failed to copy {} into workspace: {e}",
                        source.display()
                    ))
                })?;
            }

            if !dest.is_file() {
                return Err(StillmotionError::preparation(format!(
                    "staged image missing at {}",
                    dest.display()
                )));
            }

            staged.push(StagedImage {
                index,
                path: dest,
                converted,
            });
        }

        tracing::info!(count = staged.len(), "Images staged");
        Ok(Preparation::Staged(staged))
    }
}

/// Describe a file on disk, reading its dimensions when the format is known.
pub fn describe_source(path: &Path, id: impl Into<String>) -> SourceImage {
    let (width, height) = image::image_dimensions(path).unwrap_or((0, 0));
    let mut source = SourceImage::new(path.to_string_lossy(), id, width, height);
    source.file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());
    source
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::WorkspaceManager;
    use parking_lot::Mutex;
    use std::fs;
    use stillmotion_common::clock::RenderStamp;

    #[derive(Default)]
    struct RecordingConverter {
        calls: Mutex<Vec<(PathBuf, PathBuf, f32)>>,
    }

    impl ImageConverter for RecordingConverter {
        fn name(&self) -> &str {
            "recording"
        }

        fn convert(&self, source: &Path, dest: &Path, quality: f32) -> StillmotionResult<()> {
            self.calls
                .lock()
                .push((source.to_path_buf(), dest.to_path_buf(), quality));
            fs::write(dest, b"converted")?;
            Ok(())
        }
    }

    struct FailingConverter;

    impl ImageConverter for FailingConverter {
        fn name(&self) -> &str {
            "failing"
        }

        fn convert(&self, _: &Path, _: &Path, _: f32) -> StillmotionResult<()> {
            Err(StillmotionError::preparation("decoder exploded"))
        }
    }

    fn workspace_in(root: &Path) -> Workspace {
        WorkspaceManager::new(root)
            .create(&RenderStamp::from_millis(1))
            .unwrap()
    }

    fn source(dir: &Path, name: &str, bytes: &[u8]) -> SourceImage {
        let path = dir.join(name);
        fs::write(&path, bytes).unwrap();
        SourceImage::new(format!("file://{}", path.display()), name, 10, 10)
    }

    #[test]
    fn test_stages_in_order_with_canonical_names() {
        let photos = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let workspace = workspace_in(root.path());
        let converter = Arc::new(RecordingConverter::default());
        let preparer = ImagePreparer::new(converter.clone());

        let images = vec![
            source(photos.path(), "b.PNG", b"png"),
            source(photos.path(), "a.heic", b"heic"),
            source(photos.path(), "c.jpeg", b"jpeg"),
        ];

        let result = preparer
            .prepare(&images, &workspace, &CancellationToken::new())
            .unwrap();
        let Preparation::Staged(staged) = result else {
            panic!("expected staged images");
        };

        let names: Vec<_> = staged
            .iter()
            .map(|s| s.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["image_000.png", "image_001.jpg", "image_002.jpeg"]);
        assert_eq!(
            staged.iter().map(|s| s.converted).collect::<Vec<_>>(),
            vec![false, true, false]
        );
        assert!(staged.iter().all(|s| s.path.starts_with(workspace.path())));
        assert_eq!(fs::read(&staged[0].path).unwrap(), b"png");
        assert_eq!(fs::read(&staged[1].path).unwrap(), b"converted");

        // Sources are copied, not moved.
        assert!(photos.path().join("b.PNG").exists());

        let calls = converter.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].2, CONVERSION_QUALITY);
    }

    #[test]
    fn test_staged_paths_are_absolute_under_relative_root() {
        let photos = tempfile::tempdir().unwrap();
        let root = format!("relative-staging-{}", std::process::id());
        let mut workspace = workspace_in(Path::new(&root));
        let preparer = ImagePreparer::new(Arc::new(RecordingConverter::default()));
        let images = vec![
            source(photos.path(), "a.jpg", b"a"),
            source(photos.path(), "b.heic", b"b"),
        ];

        let result = preparer
            .prepare(&images, &workspace, &CancellationToken::new())
            .unwrap();
        workspace.cleanup();
        fs::remove_dir_all(&root).unwrap();

        let Preparation::Staged(staged) = result else {
            panic!("expected staged images");
        };
        assert!(staged.iter().all(|s| s.path.is_absolute()));
        assert!(staged[1].path.ends_with("image_001.jpg"));
    }

    #[test]
    fn test_staged_extension() {
        let plain = SourceImage::new("/p/IMG_1.JPEG", "a", 0, 0);
        let heic = SourceImage::new("/p/IMG_2.HEIC", "b", 0, 0);
        let bare = SourceImage::new("/p/scan", "c", 0, 0);
        assert_eq!(ImagePreparer::staged_extension(&plain), "jpeg");
        assert_eq!(ImagePreparer::staged_extension(&heic), "jpg");
        assert_eq!(ImagePreparer::staged_extension(&bare), "jpg");
    }

    #[test]
    fn test_missing_source_is_preparation_failure() {
        let root = tempfile::tempdir().unwrap();
        let workspace = workspace_in(root.path());
        let preparer = ImagePreparer::new(Arc::new(RecordingConverter::default()));
        let images = vec![SourceImage::new("/definitely/not/here.jpg", "x", 0, 0)];

        let err = preparer
            .prepare(&images, &workspace, &CancellationToken::new())
            .unwrap_err();
        assert_eq!(err.kind(), stillmotion_common::FailureKind::Preparation);
    }

    #[test]
    fn test_conversion_error_propagates() {
        let photos = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let workspace = workspace_in(root.path());
        let preparer = ImagePreparer::new(Arc::new(FailingConverter));
        let images = vec![source(photos.path(), "x.HEIF", b"heif")];

        let err = preparer
            .prepare(&images, &workspace, &CancellationToken::new())
            .unwrap_err();
        assert!(err.to_string().contains("decoder exploded"));
    }

    #[test]
    fn test_cancelled_token_interrupts() {
        let photos = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let workspace = workspace_in(root.path());
        let preparer = ImagePreparer::new(Arc::new(RecordingConverter::default()));
        let images = vec![source(photos.path(), "a.jpg", b"a")];
        let token = CancellationToken::new();
        token.cancel();

        let result = preparer.prepare(&images, &workspace, &token).unwrap();
        assert_eq!(result, Preparation::Interrupted);
        assert!(!workspace.path().join("image_000.jpg").exists());
    }

    #[test]
    fn test_raster_converter_writes_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("in.png");
        image::RgbImage::from_pixel(8, 6, image::Rgb([200, 40, 10]))
            .save(&png)
            .unwrap();

        let jpg = dir.path().join("out.jpg");
        RasterConverter.convert(&png, &jpg, 0.9).unwrap();

        let bytes = fs::read(&jpg).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        assert_eq!(image::image_dimensions(&jpg).unwrap(), (8, 6));

        let described = describe_source(&png, "img");
        assert_eq!((described.width, described.height), (8, 6));
        assert_eq!(described.file_name.as_deref(), Some("in.png"));
    }

    #[test]
    fn test_quality_mappings() {
        assert_eq!(jpeg_quality(0.9), 90);
        assert_eq!(jpeg_quality(1.5), 100);
        assert_eq!(ffmpeg_qscale(1.0), 2);
        assert_eq!(ffmpeg_qscale(0.9), 5);
        assert_eq!(ffmpeg_qscale(0.0), 31);
    }
}
