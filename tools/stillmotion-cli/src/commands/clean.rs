//! Remove leftover render workspaces.

use stillmotion_common::config::AppConfig;
use stillmotion_render_engine::WorkspaceManager;

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    let manager = WorkspaceManager::new(&config.workspace_root);
    let removed = manager.sweep_stale()?;
    match removed {
        0 => println!("No stale workspaces in {}", manager.root().display()),
        1 => println!("Removed 1 stale workspace from {}", manager.root().display()),
        n => println!("Removed {n} stale workspaces from {}", manager.root().display()),
    }
    Ok(())
}
