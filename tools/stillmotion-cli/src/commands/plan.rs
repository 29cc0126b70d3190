//! Dry run: print the filter graph and the encoder command.

use std::path::PathBuf;

use serde::Serialize;
use stillmotion_common::clock::RenderStamp;
use stillmotion_common::config::AppConfig;
use stillmotion_render_engine::{
    assemble, describe_source, EncodeCommand, EncoderSelection, FfmpegEngine, FilterGraph,
    FilterGraphBuilder, ImagePreparer, WorkspaceManager,
};

use crate::SlideshowArgs;

#[derive(Serialize)]
struct PlanReport {
    graph: FilterGraph,
    filter_complex: String,
    command: EncodeCommand,
    command_line: String,
}

pub fn run(args: SlideshowArgs, config: AppConfig) -> anyhow::Result<()> {
    let settings = super::parse_settings(&args)?;

    let mut encoder = EncoderSelection::from(&config.engine);
    if let Some(hardware) = args.hardware_override() {
        encoder = encoder.with_hardware(hardware);
    }

    // Paths the images would be staged under; nothing is created.
    let workspace = WorkspaceManager::new(&config.workspace_root).preview(&RenderStamp::now())?;
    let staged: Vec<PathBuf> = args
        .images
        .iter()
        .enumerate()
        .map(|(index, path)| {
            let source = describe_source(path, format!("img_{index}"));
            workspace.staged_path(index, &ImagePreparer::staged_extension(&source))
        })
        .collect();

    let graph = FilterGraphBuilder::from_settings(&settings).build(staged.len())?;
    let command = assemble(
        &staged,
        &graph,
        &settings,
        &encoder,
        &workspace.output_path(),
    )?;
    let program = FfmpegEngine::from_config(&config.engine).program();
    let command_line = command.to_command_line(&program.to_string_lossy());

    if args.json {
        let report = PlanReport {
            filter_complex: graph.to_string(),
            graph,
            command,
            command_line,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "Slideshow plan: {} images, {}, {} per image, {}",
        staged.len(),
        settings.resolution.label(),
        settings.image_duration,
        settings.transition.label()
    );
    println!(
        "  Expected length: {:.1}s",
        settings.expected_duration_secs(staged.len())
    );
    println!();
    println!("Filter graph ({} nodes):", graph.nodes().len());
    for node in graph.nodes() {
        println!("  {node}");
    }
    println!();
    println!("Command:");
    println!("  {command_line}");

    Ok(())
}
