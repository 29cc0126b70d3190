//! Render settings and pipeline constants.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Length of every pairwise transition, in seconds.
pub const TRANSITION_DURATION_SECS: f64 = 0.5;

/// Output frame rate.
pub const VIDEO_FPS: u32 = 30;

/// Target video bitrate, in the engine's notation.
pub const VIDEO_BITRATE: &str = "4M";

/// Output pixel format (4:2:0 chroma subsampling).
pub const PIXEL_FORMAT: &str = "yuv420p";

/// Quality factor used when re-encoding stills the engine cannot ingest.
pub const CONVERSION_QUALITY: f32 = 0.9;

/// Output resolution preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Resolution {
    #[default]
    #[serde(rename = "720p")]
    Hd720,
    #[serde(rename = "1080p")]
    Hd1080,
}

impl Resolution {
    /// Canvas size in pixels.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Self::Hd720 => (1280, 720),
            Self::Hd1080 => (1920, 1080),
        }
    }

    /// Human-readable label, e.g. `720p (1280x720)`.
    pub fn label(self) -> String {
        let (w, h) = self.dimensions();
        format!("{self} ({w}x{h})")
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hd720 => f.write_str("720p"),
            Self::Hd1080 => f.write_str("1080p"),
        }
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "720p" | "720" | "1280x720" => Ok(Self::Hd720),
            "1080p" | "1080" | "1920x1080" => Ok(Self::Hd1080),
            other => Err(format!("Unknown resolution: {other}. Use: 720p, 1080p")),
        }
    }
}

/// How long each still is held on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum ImageDuration {
    Two,
    #[default]
    Three,
    Four,
}

impl ImageDuration {
    pub const ALL: [ImageDuration; 3] = [Self::Two, Self::Three, Self::Four];

    pub fn secs(self) -> u32 {
        match self {
            Self::Two => 2,
            Self::Three => 3,
            Self::Four => 4,
        }
    }
}

impl TryFrom<u32> for ImageDuration {
    type Error = String;

    fn try_from(secs: u32) -> Result<Self, Self::Error> {
        match secs {
            2 => Ok(Self::Two),
            3 => Ok(Self::Three),
            4 => Ok(Self::Four),
            other => Err(format!(
                "Unsupported image duration: {other}s. Use: 2, 3, 4"
            )),
        }
    }
}

impl From<ImageDuration> for u32 {
    fn from(duration: ImageDuration) -> Self {
        duration.secs()
    }
}

impl FromStr for ImageDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches('s');
        let secs = trimmed
            .parse::<u32>()
            .map_err(|_| format!("Invalid image duration: {s}. Use: 2, 3, 4"))?;
        Self::try_from(secs)
    }
}

impl fmt::Display for ImageDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.secs())
    }
}

/// Transition style applied between consecutive stills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionStyle {
    #[default]
    Crossfade,
    #[serde(alias = "ken-burns")]
    KenBurns,
    Slide,
}

impl TransitionStyle {
    pub const ALL: [TransitionStyle; 3] = [Self::Crossfade, Self::KenBurns, Self::Slide];

    pub fn label(self) -> &'static str {
        match self {
            Self::Crossfade => "Crossfade",
            Self::KenBurns => "Ken Burns",
            Self::Slide => "Slide",
        }
    }
}

impl fmt::Display for TransitionStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crossfade => f.write_str("crossfade"),
            Self::KenBurns => f.write_str("kenburns"),
            Self::Slide => f.write_str("slide"),
        }
    }
}

impl FromStr for TransitionStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "crossfade" | "fade" => Ok(Self::Crossfade),
            "kenburns" | "ken-burns" | "ken_burns" => Ok(Self::KenBurns),
            "slide" => Ok(Self::Slide),
            other => Err(format!(
                "Unknown transition: {other}. Use: crossfade, kenburns, slide"
            )),
        }
    }
}

/// Immutable settings for one render attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RenderSettings {
    pub resolution: Resolution,
    pub image_duration: ImageDuration,
    pub transition: TransitionStyle,
}

impl RenderSettings {
    /// Expected length used for progress reporting: one hold per image.
    pub fn expected_duration_secs(&self, image_count: usize) -> f64 {
        image_count as f64 * self.image_duration.secs() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_dimensions() {
        assert_eq!(Resolution::Hd720.dimensions(), (1280, 720));
        assert_eq!(Resolution::Hd1080.dimensions(), (1920, 1080));
        assert_eq!(Resolution::Hd1080.label(), "1080p (1920x1080)");
    }

    #[test]
    fn test_defaults_match_first_run_settings() {
        let settings = RenderSettings::default();
        assert_eq!(settings.resolution, Resolution::Hd720);
        assert_eq!(settings.image_duration.secs(), 3);
        assert_eq!(settings.transition, TransitionStyle::Crossfade);
    }

    #[test]
    fn test_settings_json_shape() {
        let settings = RenderSettings {
            resolution: Resolution::Hd1080,
            image_duration: ImageDuration::Four,
            transition: TransitionStyle::KenBurns,
        };
        let json = serde_json::to_value(settings).unwrap();
        assert_eq!(json["resolution"], "1080p");
        assert_eq!(json["image_duration"], 4);
        assert_eq!(json["transition"], "kenburns");

        let back: RenderSettings = serde_json::from_value(json).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn test_rejects_unsupported_duration() {
        let result: Result<RenderSettings, _> = serde_json::from_str(
            r#"{"resolution":"720p","image_duration":5,"transition":"slide"}"#,
        );
        assert!(result.is_err());
        assert!("7".parse::<ImageDuration>().is_err());
        assert_eq!("2s".parse::<ImageDuration>().unwrap(), ImageDuration::Two);
    }

    #[test]
    fn test_parse_transition_aliases() {
        assert_eq!(
            "ken-burns".parse::<TransitionStyle>().unwrap(),
            TransitionStyle::KenBurns
        );
        assert_eq!(
            "Crossfade".parse::<TransitionStyle>().unwrap(),
            TransitionStyle::Crossfade
        );
        assert!("wipe".parse::<TransitionStyle>().is_err());
    }

    #[test]
    fn test_expected_duration_counts_full_holds() {
        let settings = RenderSettings {
            image_duration: ImageDuration::Two,
            ..RenderSettings::default()
        };
        assert_eq!(settings.expected_duration_secs(3), 6.0);
        assert_eq!(settings.expected_duration_secs(0), 0.0);
    }
}
