//! Render a slideshow video.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use stillmotion_common::config::AppConfig;
use stillmotion_model::{RenderStatus, SelectionLimits};
use stillmotion_render_engine::{
    converter_from_config, describe_source, ControllerConfig, EncodeEngine,
    EncodeSessionController, FfmpegEngine, RenderCallbacks,
};

use crate::SlideshowArgs;

pub async fn run(
    args: SlideshowArgs,
    output_dir: Option<PathBuf>,
    any_count: bool,
    mut config: AppConfig,
) -> anyhow::Result<()> {
    let settings = super::parse_settings(&args)?;
    if !any_count {
        SelectionLimits::default().check(args.images.len())?;
    }

    if let Some(dir) = output_dir {
        config.output_dir = dir;
    }
    if let Some(hardware) = args.hardware_override() {
        config.engine.hardware_encoder = hardware;
    }

    let engine = FfmpegEngine::from_config(&config.engine);
    if !engine.is_available() {
        anyhow::bail!("ffmpeg not found. Install it or set engine.ffmpeg_path (see `stillmotion check`)");
    }
    let converter = converter_from_config(&config.engine, &engine.program());
    let controller = EncodeSessionController::new(
        Arc::new(engine),
        converter,
        ControllerConfig::from_app_config(&config),
    );

    let sources = args
        .images
        .iter()
        .enumerate()
        .map(|(index, path)| describe_source(path, format!("img_{index}")))
        .collect::<Vec<_>>();

    let quiet = args.json;
    if !quiet {
        println!(
            "Rendering {} images at {} ({} each, {})",
            sources.len(),
            settings.resolution.label(),
            settings.image_duration,
            settings.transition.label()
        );
        println!("  Output directory: {}", config.output_dir.display());
    }

    let callbacks = if quiet {
        RenderCallbacks::new()
    } else {
        RenderCallbacks::new()
            .on_progress(|percent| {
                print!("\r  Progress: {percent:5.1}%  ");
                let _ = std::io::stdout().flush();
            })
            .on_complete(|path| println!("\nVideo created: {}", path.display()))
            .on_error(|message| eprintln!("\nRender failed: {message}"))
    };

    let mut status_rx = controller.subscribe();
    let handle = controller
        .start(sources, settings, callbacks)
        .ok_or_else(|| anyhow::anyhow!("A render is already in progress"))?;

    let status_printer = tokio::spawn(async move {
        let mut last = RenderStatus::Idle;
        while status_rx.changed().await.is_ok() {
            let status = status_rx.borrow_and_update().status;
            if status != last && status.is_active() && !quiet {
                println!("  {}", status.message());
            }
            last = status;
        }
    });

    let canceller = controller.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() && canceller.cancel() {
            eprintln!("\nCancelling, waiting for the encoder to stop...");
        }
    });

    let snapshot = handle.wait().await;
    interrupt.abort();
    status_printer.abort();

    if quiet {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }

    match snapshot.status {
        RenderStatus::Completed => Ok(()),
        RenderStatus::Cancelled => {
            if !quiet {
                println!("\n{}", RenderStatus::Cancelled.message());
            }
            Ok(())
        }
        RenderStatus::Failed => Err(anyhow::anyhow!(
            "{}",
            snapshot.error.unwrap_or_else(|| "render failed".to_string())
        )),
        other => Err(anyhow::anyhow!("render ended in unexpected state {other:?}")),
    }
}
