//! Configuration types and loading
//!
//! Defines the schema for an agent's `init` parameters so they can be
//! loaded from a JSON file instead of passed individually on the command
//! line.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::agent::{AgentMode, DEFAULT_PORT};

fn default_mode() -> AgentMode {
    AgentMode::Solo
}

fn default_log_path() -> PathBuf {
    PathBuf::from("dualsensitive.log")
}

fn default_enable_debug() -> bool {
    true
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

// AgentMode needs to be (de)serialisable to sit in AgentConfig; it carries
// no payload so a plain tag representation is the natural shape.
impl Serialize for AgentMode {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let s = match self {
            AgentMode::Solo => "solo",
            AgentMode::Server => "server",
            AgentMode::Client => "client",
        };
        serializer.serialize_str(s)
    }
}

impl<'de> Deserialize<'de> for AgentMode {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.to_ascii_lowercase().as_str() {
            "solo" => Ok(AgentMode::Solo),
            "server" => Ok(AgentMode::Server),
            "client" => Ok(AgentMode::Client),
            other => Err(serde::de::Error::custom(format!("unknown agent mode: {other}"))),
        }
    }
}

/// Root configuration for `Agent::init`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Operating mode: solo, server, or client.
    #[serde(default = "default_mode")]
    pub mode: AgentMode,

    /// Path the logging layer appends to, mirroring the original's
    /// `setLogFile`.
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    /// Whether debug-level logging is enabled.
    #[serde(default = "default_enable_debug")]
    pub enable_debug: bool,

    /// Loopback UDP port used by server and client modes.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            log_path: default_log_path(),
            enable_debug: default_enable_debug(),
            port: default_port(),
        }
    }
}

impl AgentConfig {
    /// Loads configuration from a JSON file, filling in defaults for any
    /// field the file omits.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: AgentConfig = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)
            .context("failed to serialize agent configuration")?;
        fs::write(path, text)
            .with_context(|| format!("failed to write config file {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_init_parameters() {
        let config = AgentConfig::default();
        assert_eq!(config.mode, AgentMode::Solo);
        assert_eq!(config.log_path, PathBuf::from("dualsensitive.log"));
        assert!(config.enable_debug);
        assert_eq!(config.port, 28472);
    }

    #[test]
    fn round_trips_through_json_with_partial_fields() {
        let json = r#"{ "port": 9000 }"#;
        let config: AgentConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.mode, AgentMode::Solo);
        assert!(config.enable_debug);
    }

    #[test]
    fn rejects_unknown_mode_string() {
        let json = r#"{ "mode": "bogus" }"#;
        assert!(serde_json::from_str::<AgentConfig>(json).is_err());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("agent-config-test-{:p}.json", &dir));
        let config = AgentConfig {
            mode: AgentMode::Server,
            port: 12345,
            ..AgentConfig::default()
        };
        config.save(&path).unwrap();
        let loaded = AgentConfig::load(&path).unwrap();
        assert_eq!(loaded.mode, AgentMode::Server);
        assert_eq!(loaded.port, 12345);
        let _ = fs::remove_file(&path);
    }
}
