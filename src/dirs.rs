//! XDG directory helpers.

use anyhow::{Context, Result};
use std::path::PathBuf;
use xdg::BaseDirectories;

const APP_PREFIX: &str = "voicescribe";

/// Get the config directory, creating it if needed.
/// `~/.config/voicescribe/` (or `$XDG_CONFIG_HOME/voicescribe/`)
pub fn config_dir() -> Result<PathBuf> {
    let xdg = BaseDirectories::with_prefix(APP_PREFIX);
    let dir = xdg
        .get_config_home()
        .context("Failed to get XDG config directory (HOME not set?)")?;
    std::fs::create_dir_all(&dir).context("Failed to create config directory")?;
    Ok(dir)
}

/// Get the data directory, creating it if needed.
/// `~/.local/share/voicescribe/` (or `$XDG_DATA_HOME/voicescribe/`)
pub fn data_dir() -> Result<PathBuf> {
    let xdg = BaseDirectories::with_prefix(APP_PREFIX);
    let dir = xdg
        .get_data_home()
        .context("Failed to get XDG data directory (HOME not set?)")?;
    std::fs::create_dir_all(&dir).context("Failed to create data directory")?;
    Ok(dir)
}
