//! Stillmotion CLI: turn a handful of photos into a video slideshow.
//!
//! Usage:
//!   stillmotion render <IMAGES>...   Render a slideshow
//!   stillmotion plan <IMAGES>...     Print the filter graph and command
//!   stillmotion check                Check encoder availability
//!   stillmotion clean                Remove leftover render workspaces
//!   stillmotion config               Show or initialize configuration

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use stillmotion_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "stillmotion",
    about = "Photo slideshows with crossfade, Ken Burns, and slide transitions",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Slideshow look, shared by `render` and `plan`.
#[derive(Args, Debug, Clone)]
pub struct SlideshowArgs {
    /// Images in display order
    #[arg(required = true)]
    pub images: Vec<PathBuf>,

    /// Output resolution: 720p or 1080p
    #[arg(short, long, default_value = "720p")]
    pub resolution: String,

    /// Seconds each image is held: 2, 3 or 4
    #[arg(short, long, default_value = "3")]
    pub duration: String,

    /// Transition style: crossfade, kenburns or slide
    #[arg(short, long, default_value = "crossfade")]
    pub transition: String,

    /// Force the hardware encoder
    #[arg(long, conflicts_with = "software")]
    pub hardware: bool,

    /// Force the software encoder
    #[arg(long)]
    pub software: bool,

    /// Print machine-readable JSON instead of progress text
    #[arg(long)]
    pub json: bool,
}

impl SlideshowArgs {
    /// Encoder override from the command line, if any.
    pub fn hardware_override(&self) -> Option<bool> {
        match (self.hardware, self.software) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Render a slideshow video
    Render {
        #[command(flatten)]
        slideshow: SlideshowArgs,

        /// Directory for the finished video
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Accept any number of images instead of 3 to 5
        #[arg(long)]
        any_count: bool,
    },

    /// Print the filter graph and encoder command without running it
    Plan {
        #[command(flatten)]
        slideshow: SlideshowArgs,
    },

    /// Check encoder availability and configuration
    Check,

    /// Remove workspaces left behind by interrupted renders
    Clean,

    /// Show the active configuration
    Config {
        /// Write the defaults to the config file if none exists
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load();

    // Initialize logging
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    stillmotion_common::logging::init_logging(&logging);
    tracing::debug!(output_dir = %config.output_dir.display(), "Configuration loaded");

    match cli.command {
        Commands::Render {
            slideshow,
            output_dir,
            any_count,
        } => commands::render::run(slideshow, output_dir, any_count, config).await,
        Commands::Plan { slideshow } => commands::plan::run(slideshow, config),
        Commands::Check => commands::check::run(&config),
        Commands::Clean => commands::clean::run(&config),
        Commands::Config { init } => commands::config::run(config, init),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_render_flags_parse() {
        let cli = Cli::try_parse_from([
            "stillmotion",
            "render",
            "a.jpg",
            "b.jpg",
            "--transition",
            "slide",
            "--software",
            "--any-count",
        ])
        .unwrap();
        match cli.command {
            Commands::Render {
                slideshow,
                any_count,
                ..
            } => {
                assert_eq!(slideshow.images.len(), 2);
                assert_eq!(slideshow.transition, "slide");
                assert_eq!(slideshow.hardware_override(), Some(false));
                assert!(any_count);
            }
            _ => panic!("expected render"),
        }

        assert!(Cli::try_parse_from([
            "stillmotion",
            "render",
            "a.jpg",
            "--hardware",
            "--software",
        ])
        .is_err());
        assert!(Cli::try_parse_from(["stillmotion", "plan"]).is_err());
    }
}
