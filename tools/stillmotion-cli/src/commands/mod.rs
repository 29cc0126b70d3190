//! CLI command implementations.

pub mod check;
pub mod clean;
pub mod config;
pub mod plan;
pub mod render;

use stillmotion_model::RenderSettings;

use crate::SlideshowArgs;

/// Settings from the command line's string options.
pub fn parse_settings(args: &SlideshowArgs) -> anyhow::Result<RenderSettings> {
    Ok(RenderSettings {
        resolution: args.resolution.parse().map_err(anyhow::Error::msg)?,
        image_duration: args.duration.parse().map_err(anyhow::Error::msg)?,
        transition: args.transition.parse().map_err(anyhow::Error::msg)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stillmotion_model::{ImageDuration, Resolution, TransitionStyle};

    fn args(resolution: &str, duration: &str, transition: &str) -> SlideshowArgs {
        SlideshowArgs {
            images: vec!["a.jpg".into()],
            resolution: resolution.into(),
            duration: duration.into(),
            transition: transition.into(),
            hardware: false,
            software: true,
            json: false,
        }
    }

    #[test]
    fn test_parse_settings() {
        let settings = parse_settings(&args("1080p", "4s", "ken-burns")).unwrap();
        assert_eq!(settings.resolution, Resolution::Hd1080);
        assert_eq!(settings.image_duration, ImageDuration::Four);
        assert_eq!(settings.transition, TransitionStyle::KenBurns);
        assert_eq!(args("720p", "3", "slide").hardware_override(), Some(false));
    }

    #[test]
    fn test_parse_settings_rejects_unknown_values() {
        let err = parse_settings(&args("4k", "3", "fade")).unwrap_err();
        assert!(err.to_string().contains("Unknown resolution"));
        assert!(parse_settings(&args("720p", "9", "fade")).is_err());
    }
}
