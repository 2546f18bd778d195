mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./transboxer.toml",
        "~/.config/transboxer/config.toml",
        "/etc/transboxer/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    let transbox = &config.transbox;

    if transbox.timescale == 0 {
        anyhow::bail!("Timescale cannot be 0");
    }
    if transbox.initial_size == 0 {
        anyhow::bail!("Initial buffer size cannot be 0");
    }
    if transbox.track_id == 0 {
        anyhow::bail!("Track id cannot be 0");
    }
    if transbox.media_type.trim().is_empty() {
        anyhow::bail!("Media type cannot be empty");
    }
    if transbox.max_leaf_size == 0 {
        anyhow::bail!("Maximum leaf size cannot be 0");
    }
    if config.input.chunk_size == 0 {
        anyhow::bail!("Input chunk size cannot be 0");
    }

    if !transbox.media_type.starts_with("video/mp4") {
        tracing::warn!(
            "Media type {:?} does not describe MP4 output",
            transbox.media_type
        );
    }

    Ok(())
}
