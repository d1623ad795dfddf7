// Tandem Desktop - Configuration
// Loads host settings from the app data directory

use host_core::HostConfig;
use std::path::PathBuf;
use tauri::{AppHandle, Manager};

fn settings_path(app: &AppHandle) -> anyhow::Result<PathBuf> {
    let data_dir = app
        .path()
        .app_data_dir()
        .map_err(|e| anyhow::anyhow!("Failed to get app data dir: {}", e))?;
    std::fs::create_dir_all(&data_dir)?;
    Ok(data_dir.join("settings.json"))
}

/// Load settings from file, then apply `TANDEM_*` environment overrides
pub fn load(app: &AppHandle) -> anyhow::Result<HostConfig> {
    let path = settings_path(app)?;
    let config = HostConfig::load(&path)?.with_env_overrides()?;
    tracing::debug!(path = %path.display(), ?config, "settings loaded");
    Ok(config)
}

/// Directory containing the packaged backend
pub fn resources_dir(app: &AppHandle, config: &HostConfig) -> anyhow::Result<PathBuf> {
    let bundled = app
        .path()
        .resource_dir()
        .map_err(|e| anyhow::anyhow!("Failed to get resource dir: {}", e))?
        .join("resources");
    Ok(config.resources_dir_or(&bundled))
}
