//! Check encoder availability and configuration.

use stillmotion_common::config::AppConfig;
use stillmotion_render_engine::{EncodeEngine, EncoderSelection, FfmpegEngine};

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Stillmotion System Check");
    println!("{}", "=".repeat(50));

    let engine = FfmpegEngine::from_config(&config.engine);
    let ready = match engine.locate() {
        Some(path) => {
            println!("[OK] Encoder binary: {}", path.display());
            match engine.version() {
                Ok(version) => println!("     {version}"),
                Err(e) => println!("[WARN] Could not read encoder version: {e}"),
            }
            engine.is_available()
        }
        None => {
            println!("[FAIL] ffmpeg not found on PATH");
            println!("       Install ffmpeg or set engine.ffmpeg_path in the config file");
            false
        }
    };

    let encoder = EncoderSelection::from(&config.engine);
    println!(
        "[OK] Video codec: {} ({})",
        encoder.codec(),
        if encoder.hardware { "hardware" } else { "software" }
    );
    println!("[OK] Still converter: {:?}", config.engine.still_converter);
    println!("     Output directory: {}", config.output_dir.display());
    println!("     Workspace root:   {}", config.workspace_root.display());

    println!();
    if ready {
        println!("Stillmotion is ready to render.");
    } else {
        println!("The encoder is missing. See above for fixes.");
    }

    Ok(())
}
