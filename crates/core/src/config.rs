//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.osaurus/config.json`) and environment.
//! Kept minimal; extend as needed for backend-specific settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config, persisted as JSON at a well-known location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Listen port. Overridden by `OSU_PORT`.
    #[serde(default = "default_port")]
    pub port: u16,

    /// When true, bind `0.0.0.0` instead of `127.0.0.1`.
    #[serde(default)]
    pub expose_to_network: bool,

    /// CORS origins. Empty disables CORS headers entirely; `["*"]` echoes any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Generation settings forwarded to the inference backend.
    #[serde(default)]
    pub generation: GenerationConfig,
}

/// Generation knobs named in the gateway's request/response contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default)]
    pub kv_bits: Option<u32>,
    #[serde(default = "default_kv_group_size")]
    pub kv_group_size: u32,
    #[serde(default)]
    pub quantized_kv_start: u32,
    #[serde(default)]
    pub max_kv_size: Option<u32>,
    #[serde(default = "default_prefill_step_size")]
    pub prefill_step_size: u32,
}

fn default_port() -> u16 {
    1337
}
fn default_top_p() -> f32 {
    1.0
}
fn default_kv_group_size() -> u32 {
    64
}
fn default_prefill_step_size() -> u32 {
    512
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            top_p: default_top_p(),
            kv_bits: None,
            kv_group_size: default_kv_group_size(),
            quantized_kv_start: 0,
            max_kv_size: None,
            prefill_step_size: default_prefill_step_size(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            expose_to_network: false,
            allowed_origins: Vec::new(),
            generation: GenerationConfig::default(),
        }
    }
}

impl Config {
    /// Host to bind, derived from `expose_to_network`.
    pub fn host(&self) -> &'static str {
        if self.expose_to_network {
            "0.0.0.0"
        } else {
            "127.0.0.1"
        }
    }
}

/// Resolve the effective port: `OSU_PORT` env overrides config.
pub fn resolve_port(config: &Config) -> u16 {
    std::env::var("OSU_PORT")
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(config.port)
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("OSU_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".osaurus").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, or the default path if `None`. Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

/// Write the config to disk as pretty JSON, creating the parent directory if needed.
pub fn save_config(config: &Config, path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }
    }
    let body = serde_json::to_string_pretty(config).context("serializing config")?;
    std::fs::write(path, body).with_context(|| format!("writing config to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_and_host() {
        let c = Config::default();
        assert_eq!(c.port, 1337);
        assert_eq!(c.host(), "127.0.0.1");
    }

    #[test]
    fn expose_to_network_binds_all_interfaces() {
        let mut c = Config::default();
        c.expose_to_network = true;
        assert_eq!(c.host(), "0.0.0.0");
    }

    #[test]
    fn resolve_port_env_override() {
        std::env::set_var("OSU_PORT", "4242");
        let c = Config::default();
        assert_eq!(resolve_port(&c), 4242);
        std::env::remove_var("OSU_PORT");
    }

    #[test]
    fn loopback_detection() {
        assert!(is_loopback_bind("127.0.0.1"));
        assert!(is_loopback_bind("localhost"));
        assert!(!is_loopback_bind("0.0.0.0"));
    }

    #[test]
    fn generation_defaults() {
        let g = GenerationConfig::default();
        assert_eq!(g.top_p, 1.0);
        assert_eq!(g.kv_group_size, 64);
        assert_eq!(g.prefill_step_size, 512);
    }
}
