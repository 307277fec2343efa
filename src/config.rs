use std::{path::PathBuf, time::Duration};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    pub link: LinkConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub audio: AudioConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LinkConfig {
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_port")]
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_audio_enabled")]
    pub enabled: bool,
}

impl Config {
    pub async fn load(path: &str) -> Result<Self> {
        let data = fs::read(path)
            .await
            .wrap_err_with(|| format!("Failed to read config file {path}"))?;

        serde_yaml::from_slice(&data).wrap_err("Failed to parse config")
    }
}

impl LinkConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl PipelineConfig {
    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            queue_capacity: default_queue_capacity(),
            drain_interval_ms: default_drain_interval_ms(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            path: default_store_path(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: default_server_port(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        AudioConfig {
            enabled: default_audio_enabled(),
        }
    }
}

const fn default_baud_rate() -> u32 {
    9600
}

const fn default_write_timeout_ms() -> u64 {
    500
}

const fn default_queue_capacity() -> usize {
    256
}

const fn default_drain_interval_ms() -> u64 {
    100
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data")
}

const fn default_server_port() -> u16 {
    8080
}

const fn default_audio_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = serde_yaml::from_str("link:\n  port: /dev/ttyUSB0\n").unwrap();

        assert_eq!(config.link.port, "/dev/ttyUSB0");
        assert_eq!(config.link.baud_rate, 9600);
        assert_eq!(config.pipeline.queue_capacity, 256);
        assert_eq!(config.pipeline.drain_interval(), Duration::from_millis(100));
        assert_eq!(config.store.path, PathBuf::from("data"));
        assert_eq!(config.server.port, 8080);
        assert!(config.audio.enabled);
    }

    #[test]
    fn test_overrides_are_honoured() {
        let yaml = "
link:
  port: COM3
  baud_rate: 115200
  write_timeout_ms: 250
pipeline:
  queue_capacity: 32
audio:
  enabled: false
";

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.link.port, "COM3");
        assert_eq!(config.link.write_timeout(), Duration::from_millis(250));
        assert_eq!(config.pipeline.queue_capacity, 32);
        assert!(!config.audio.enabled);
    }
}
