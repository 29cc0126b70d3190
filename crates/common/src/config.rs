//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::StillmotionResult;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory where finished videos are persisted.
    pub output_dir: PathBuf,

    /// Parent directory for per-attempt render workspaces.
    pub workspace_root: PathBuf,

    /// Encoding engine settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Encoding engine parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Explicit path to the ffmpeg binary. Looked up on `PATH` when unset.
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Use the hardware-accelerated encoder instead of the software one.
    #[serde(default = "default_hardware_encoder")]
    pub hardware_encoder: bool,

    /// Codec name used when `hardware_encoder` is set.
    #[serde(default = "default_hardware_codec")]
    pub hardware_codec: String,

    /// Codec name used otherwise.
    #[serde(default = "default_software_codec")]
    pub software_codec: String,

    /// How HEIC/HEIF stills are converted before staging.
    #[serde(default)]
    pub still_converter: StillConverterKind,
}

/// Available still-image converters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StillConverterKind {
    /// Re-encode through the ffmpeg binary.
    #[default]
    Ffmpeg,
    /// Decode and re-encode in process.
    Raster,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "stillmotion=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            workspace_root: default_workspace_root(),
            engine: EngineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            hardware_encoder: default_hardware_encoder(),
            hardware_codec: default_hardware_codec(),
            software_codec: default_software_codec(),
            still_converter: StillConverterKind::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> StillmotionResult<()> {
        self.save_to(&config_file_path())
    }

    /// Write config as pretty JSON to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> StillmotionResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

// Apple devices ship a hardware H.264 encoder; everything else defaults to
// the software path.
fn default_hardware_encoder() -> bool {
    cfg!(any(target_os = "macos", target_os = "ios"))
}

fn default_hardware_codec() -> String {
    "h264_videotoolbox".to_string()
}

fn default_software_codec() -> String {
    "mpeg4".to_string()
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    xdg_dir("XDG_CONFIG_HOME", &[".config"])
        .join("stillmotion")
        .join("config.json")
}

fn default_output_dir() -> PathBuf {
    xdg_dir("XDG_DATA_HOME", &[".local", "share"])
        .join("stillmotion")
        .join("videos")
}

fn default_workspace_root() -> PathBuf {
    xdg_dir("XDG_CACHE_HOME", &[".cache"]).join("stillmotion")
}

fn xdg_dir(var: &str, home_fallback: &[&str]) -> PathBuf {
    std::env::var(var).map(PathBuf::from).unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        home_fallback
            .iter()
            .fold(PathBuf::from(home), |path, part| path.join(part))
    })
}
