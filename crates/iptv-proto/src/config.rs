use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Where the catalog JSON lives and how it is requested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Channels joined per progressive batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Load percentage at which `iptv play` without a channel id starts the
    /// first channel. 100 waits for the whole catalog.
    #[serde(default = "default_preview_threshold")]
    pub preview_threshold: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Attempts per stream candidate before moving on to the next one.
    #[serde(default = "default_attempts")]
    pub attempts_per_candidate: u32,
    /// Fixed delay before each retry of the same candidate.
    #[serde(default = "default_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_volume")]
    pub volume: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Key-value file holding favorites.
    #[serde(default = "default_store_file")]
    pub store_file: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            preview_threshold: default_preview_threshold(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            attempts_per_candidate: default_attempts(),
            retry_backoff_ms: default_backoff_ms(),
            volume: default_volume(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            store_file: default_store_file(),
        }
    }
}

fn default_base_url() -> String {
    "https://iptv-org.github.io/api".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("iptv/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_batch_size() -> usize {
    500
}

fn default_preview_threshold() -> u8 {
    20
}

fn default_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    1000
}

fn default_volume() -> f32 {
    0.8
}

fn default_store_file() -> PathBuf {
    platform::data_dir().join("store.json")
}

impl CatalogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl LoaderConfig {
    pub fn batch_size(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.batch_size).unwrap_or(NonZeroUsize::MIN)
    }
}

impl PlaybackConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("invalid config {}", config_path.display()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.loader.batch_size == 0 {
            anyhow::bail!("loader.batch_size must be at least 1");
        }
        if self.playback.attempts_per_candidate == 0 {
            anyhow::bail!("playback.attempts_per_candidate must be at least 1");
        }
        if self.loader.preview_threshold > 100 {
            anyhow::bail!("loader.preview_threshold is a percentage (0-100)");
        }
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.catalog.base_url, "https://iptv-org.github.io/api");
        assert_eq!(config.catalog.timeout(), Duration::from_secs(30));
        assert_eq!(config.loader.batch_size().get(), 500);
        assert_eq!(config.playback.attempts_per_candidate, 3);
        assert_eq!(config.playback.retry_backoff(), Duration::from_secs(1));
        assert!(config.paths.store_file.ends_with("iptv/store.json"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [loader]
            batch_size = 50

            [playback]
            retry_backoff_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.loader.batch_size().get(), 50);
        assert_eq!(config.loader.preview_threshold, 20);
        assert_eq!(config.playback.retry_backoff(), Duration::from_millis(250));
        assert_eq!(config.playback.attempts_per_candidate, 3);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let err = Config::from_toml_str("[loader]\nbatch_size = 0\n").unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        assert!(Config::from_toml_str("[playback]\nattempts_per_candidate = 0\n").is_err());
    }

    #[test]
    fn test_roundtrips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed = Config::from_toml_str(&text).unwrap();
        assert_eq!(parsed.catalog.user_agent, config.catalog.user_agent);
        assert_eq!(parsed.loader.batch_size, config.loader.batch_size);
    }
}
