//! Configuration management

use crate::history::{FileHistory, HistoryHandle, MemoryHistory};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub host: HostConfig,
    pub client: ClientConfig,
    pub history: HistoryConfig,
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Name shown to other participants
    pub display_name: String,

    /// Default log level when RUST_LOG is not set
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            display_name: std::env::var("USER").unwrap_or_else(|_| "guest".to_string()),
            log_level: "warn".to_string(),
        }
    }
}

/// Hosting settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Address to listen on
    pub bind_address: IpAddr,

    /// Port to listen on (0 = ephemeral)
    pub port: u16,

    /// Lines buffered per participant before it counts as unreachable
    pub outbound_queue: usize,

    /// How long closing the room waits for each participant
    pub drain_timeout_ms: u64,

    /// Consecutive accept failures before the room shuts itself down
    pub max_accept_failures: u32,

    /// Pause after a failed accept
    pub accept_backoff_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
            outbound_queue: 256,
            drain_timeout_ms: 2000,
            max_accept_failures: 32,
            accept_backoff_ms: 50,
        }
    }
}

/// Joining settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub connect_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
        }
    }
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Where the host keeps room history
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    #[default]
    File,
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub backend: HistoryBackend,

    /// Directory for history files
    pub data_dir: Option<PathBuf>,
}

impl Config {
    /// Load config from the default path, or return defaults if not found
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load config from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lanchat")
            .join("config.toml")
    }

    /// Get the directory holding history files
    pub fn data_dir(&self) -> PathBuf {
        self.history
            .data_dir
            .clone()
            .unwrap_or_else(|| {
                dirs::data_dir()
                    .unwrap_or_else(std::env::temp_dir)
                    .join("lanchat")
            })
    }

    /// Start the history worker for the configured backend
    pub fn open_history(&self) -> Result<HistoryHandle> {
        let handle = match self.history.backend {
            HistoryBackend::File => {
                let dir = self.data_dir();
                tracing::info!("Keeping history in {}", dir.display());
                HistoryHandle::spawn(FileHistory::new(dir)?)?
            }
            HistoryBackend::Memory => HistoryHandle::spawn(MemoryHistory::new())?,
        };
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.host.port, 0);
        assert_eq!(config.host.outbound_queue, 256);
        assert_eq!(config.history.backend, HistoryBackend::File);
        assert_eq!(config.client.connect_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [general]
            display_name = "alice"

            [host]
            bind_address = "127.0.0.1"
            port = 4040

            [history]
            backend = "memory"
            "#,
        )
        .unwrap();

        assert_eq!(config.general.display_name, "alice");
        assert_eq!(config.host.port, 4040);
        assert_eq!(config.host.bind_address, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.host.drain_timeout_ms, 2000);
        assert_eq!(config.history.backend, HistoryBackend::Memory);
    }

    #[test]
    fn test_load_from_reports_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[host]\nport = \"not a number\"\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid config"));
    }
}
