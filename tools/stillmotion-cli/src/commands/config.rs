//! Show or initialize configuration.

use stillmotion_common::config::{config_file_path, AppConfig};

pub fn run(config: AppConfig, init: bool) -> anyhow::Result<()> {
    let path = config_file_path();

    if init {
        if path.exists() {
            println!("Config already exists at {}", path.display());
        } else {
            config.save()?;
            println!("Wrote default config to {}", path.display());
        }
    } else if !path.exists() {
        println!("# No config file at {} (using defaults)", path.display());
    }

    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
