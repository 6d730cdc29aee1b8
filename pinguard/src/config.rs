//! Configuration file handling.
//!
//! TOML at `$XDG_CONFIG_HOME/pinguard/config.toml` (default:
//! `~/.config/pinguard/config.toml`).  Every field has a default so a missing
//! file is a valid configuration; a corrupt file is logged and replaced by
//! the defaults rather than blocking the agent's signing flow.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub vault: VaultConfig,
}

/// External presence-verifier command.
///
/// Arguments may contain a `{{prompt}}` placeholder, replaced with the
/// request's display text.  Exit status 0 means the user verified.
///
/// ```toml
/// [gate]
/// command = "fprintd-verify"
/// args = []
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default = "default_gate_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            command: default_gate_command(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Override for the vault file location.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_gate_command() -> String {
    "fprintd-verify".to_string()
}

pub fn config_path() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(base.join("pinguard").join("config.toml"))
}

pub fn load() -> Config {
    let Some(path) = config_path() else {
        return Config::default();
    };
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(_) => return Config::default(),
    };
    match toml::from_str(&contents) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "invalid config file, using defaults");
            Config::default()
        }
    }
}
