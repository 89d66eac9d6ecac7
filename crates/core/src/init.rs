//! Initialize the configuration directory: create `~/.osaurus` and a default
//! config file so the gateway has discoverable configuration before it starts.

use crate::config::{self, Config};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Gate `osaurus serve` on a config file existing; a gateway with no
/// discoverable configuration defeats the well-known-location contract.
pub fn require_initialized(config_path: &Path) -> Result<()> {
    if !config_path.exists() {
        anyhow::bail!(
            "configuration not initialized; run `osaurus init` first (config file not found: {})",
            config_path.display()
        );
    }
    Ok(())
}

/// Create the config directory and a default `config.json` if one does not exist.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        config::save_config(&Config::default(), config_path)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    }

    Ok(config_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_default_config_when_missing() {
        let dir = std::env::temp_dir().join(format!("osaurus-init-test-{}", uuid::Uuid::new_v4()));
        let config_path = dir.join("config.json");
        init_config_dir(&config_path).unwrap();
        assert!(config_path.exists());
        require_initialized(&config_path).unwrap();
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn require_initialized_fails_when_missing() {
        let dir = std::env::temp_dir().join(format!("osaurus-init-missing-{}", uuid::Uuid::new_v4()));
        let config_path = dir.join("config.json");
        assert!(require_initialized(&config_path).is_err());
    }
}
