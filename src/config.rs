// Configuration management module
// Handles loading, saving, environment overrides and validation

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Poll interval in seconds for the player status
    pub poll_interval: u64,

    /// Scrobble after playing this percentage of the track (50% default)
    pub scrobble_threshold: u8,

    pub bluos: BluOsConfig,

    pub lastfm: LastFmConfig,

    pub queue: QueueConfig,

    /// Text cleanup configuration
    pub cleanup: CleanupConfig,

    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BluOsConfig {
    pub host: String,
    pub port: u16,
    pub timeout_secs: u64,
}

impl Default for BluOsConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 11000,
            timeout_secs: 5,
        }
    }
}

/// Either `session_key`, or `username` + `password_md5`, is needed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LastFmConfig {
    pub api_key: String,
    pub api_secret: String,
    pub session_key: String,
    pub username: String,
    pub password_md5: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Where pending scrobbles are kept between runs
    pub path: PathBuf,

    /// Maximum number of pending scrobbles; the oldest are dropped beyond this
    pub capacity: usize,

    /// Occupancy ratio that triggers a warning alert
    pub high_water_mark: f64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        let path = dirs::data_dir()
            .map(|dir| dir.join("bluos-scrobbler"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("scrobble_queue.json");

        Self {
            path,
            capacity: 500,
            high_water_mark: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Enable text cleanup
    pub enabled: bool,

    /// Regex patterns to remove from track/album/artist names
    /// Applied in order, each pattern is removed from the text
    pub patterns: Vec<String>,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            patterns: vec![
                r"\s*\[Explicit\]".to_string(),
                r"\s*\[Clean\]".to_string(),
                r"\s*\(Explicit\)".to_string(),
                r"\s*\(Clean\)".to_string(),
                r"\s*- Explicit".to_string(),
                r"\s*- Clean".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Prefix for alert titles
    pub app_tag: String,
    pub webhook: Option<WebhookConfig>,
    pub gotify: Option<GotifyConfig>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            app_tag: "BluOS→Last.fm".to_string(),
            webhook: None,
            gotify: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default = "default_min_level")]
    pub min_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GotifyConfig {
    pub url: String,
    pub token: String,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default = "default_min_level")]
    pub min_level: String,
}

fn default_min_level() -> String {
    "WARNING".to_string()
}

fn default_priority() -> u8 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval: 3,
            scrobble_threshold: 50,
            bluos: BluOsConfig::default(),
            lastfm: LastFmConfig::default(),
            queue: QueueConfig::default(),
            cleanup: CleanupConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

impl Config {
    /// Get the default path to the configuration file
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;

        Ok(config_dir.join("bluos_scrobbler.conf"))
    }

    /// Load and validate configuration
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Read configuration from file, or create a default one if it doesn't exist.
    /// Environment variables are applied on top.
    pub fn read(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file {:?}", config_path))?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            log::info!("Config file not found, creating default at {:?}", config_path);
            let default_config = Self::default();
            if let Err(e) = default_config.save(&config_path) {
                log::warn!("Could not write default config: {:#}", e);
            }
            default_config
        };

        config.apply_env(|key| std::env::var(key).ok())?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, content).context("Failed to write config file")?;

        log::info!("Config saved to {:?}", path);

        Ok(())
    }

    /// Override values from environment variables (container deployments)
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let number = |key: &str| -> Result<Option<u64>> {
            var(key)
                .map(|v| v.trim().parse::<u64>())
                .transpose()
                .with_context(|| format!("{} must be a non-negative integer", key))
        };

        if let Some(host) = var("BLUOS_HOST") {
            self.bluos.host = host;
        }
        if let Some(port) = number("BLUOS_PORT")? {
            self.bluos.port = u16::try_from(port).context("BLUOS_PORT is out of range")?;
        }
        if let Some(interval) = number("POLL_INTERVAL")? {
            self.poll_interval = interval.max(1);
        }

        let lastfm = &mut self.lastfm;
        for (key, field) in [
            ("LASTFM_API_KEY", &mut lastfm.api_key),
            ("LASTFM_API_SECRET", &mut lastfm.api_secret),
            ("LASTFM_SESSION_KEY", &mut lastfm.session_key),
            ("LASTFM_USERNAME", &mut lastfm.username),
            ("LASTFM_PASSWORD_MD5", &mut lastfm.password_md5),
        ] {
            if let Some(value) = var(key) {
                *field = value;
            }
        }

        if let Some(path) = var("SCROBBLE_CACHE_PATH") {
            self.queue.path = PathBuf::from(path);
        }
        if let Some(limit) = number("SCROBBLE_CACHE_LIMIT")? {
            self.queue.capacity = limit as usize;
        }

        if let Some(tag) = var("APP_TAG") {
            self.notify.app_tag = tag;
        }
        if let Some(url) = var("NOTIFY_WEBHOOK_URL") {
            self.notify.webhook = Some(WebhookConfig {
                url,
                min_level: var("NOTIFY_MIN_LEVEL").unwrap_or_else(default_min_level),
            });
        }
        if let (Some(url), Some(token)) = (var("GOTIFY_URL"), var("GOTIFY_TOKEN")) {
            let priority = match number("GOTIFY_PRIORITY")? {
                Some(p) => u8::try_from(p).context("GOTIFY_PRIORITY is out of range")?,
                None => default_priority(),
            };
            self.notify.gotify = Some(GotifyConfig {
                url,
                token,
                priority,
                min_level: var("GOTIFY_MIN_LEVEL").unwrap_or_else(default_min_level),
            });
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval == 0 {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        // Validate scrobble threshold (should be 1-100%)
        if self.scrobble_threshold == 0 || self.scrobble_threshold > 100 {
            anyhow::bail!("scrobble_threshold must be between 1 and 100");
        }

        if self.bluos.host.trim().is_empty() {
            anyhow::bail!("bluos.host is required");
        }

        if self.queue.capacity == 0 {
            anyhow::bail!("queue.capacity must be greater than 0");
        }
        if !(self.queue.high_water_mark > 0.0 && self.queue.high_water_mark <= 1.0) {
            anyhow::bail!("queue.high_water_mark must be in (0, 1]");
        }

        let lastfm = &self.lastfm;
        if lastfm.api_key.is_empty() || lastfm.api_secret.is_empty() {
            anyhow::bail!("Last.fm api_key and api_secret are required");
        }
        let has_password = !lastfm.username.is_empty() && !lastfm.password_md5.is_empty();
        if lastfm.session_key.is_empty() && !has_password {
            anyhow::bail!("Provide a Last.fm session_key or username + password_md5");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn valid() -> Config {
        let mut config = Config::default();
        config.lastfm.api_key = "key".into();
        config.lastfm.api_secret = "secret".into();
        config.lastfm.session_key = "session".into();
        config
    }

    #[test]
    fn defaults_need_credentials() {
        let err = Config::default().validate().unwrap_err();
        assert!(err.to_string().contains("api_key"));
        valid().validate().unwrap();
    }

    #[test]
    fn username_and_hash_replace_session_key() {
        let mut config = valid();
        config.lastfm.session_key.clear();
        assert!(config.validate().is_err());

        config.lastfm.username = "alice".into();
        config.lastfm.password_md5 = "2ab96390c7dbe3439de74d0c9b0b1767".into();
        config.validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut config = valid();
        config.scrobble_threshold = 101;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.queue.capacity = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.queue.high_water_mark = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = valid();
        config
            .apply_env(env(&[
                ("BLUOS_HOST", "192.168.1.40"),
                ("BLUOS_PORT", "11001"),
                ("POLL_INTERVAL", "0"),
                ("LASTFM_SESSION_KEY", "from-env"),
                ("SCROBBLE_CACHE_PATH", "/data/queue.json"),
                ("SCROBBLE_CACHE_LIMIT", "50"),
                ("GOTIFY_URL", "http://nas:8080"),
                ("GOTIFY_TOKEN", "abc"),
                ("LASTFM_USERNAME", "  "),
            ]))
            .unwrap();

        assert_eq!(config.bluos.host, "192.168.1.40");
        assert_eq!(config.bluos.port, 11001);
        assert_eq!(config.poll_interval, 1);
        assert_eq!(config.lastfm.session_key, "from-env");
        assert_eq!(config.lastfm.username, "");
        assert_eq!(config.queue.path, PathBuf::from("/data/queue.json"));
        assert_eq!(config.queue.capacity, 50);
        let gotify = config.notify.gotify.unwrap();
        assert_eq!(gotify.priority, 5);
        assert_eq!(gotify.min_level, "WARNING");
        assert!(config.notify.webhook.is_none());
    }

    #[test]
    fn bad_numbers_in_env_are_errors() {
        let mut config = valid();
        assert!(config.apply_env(env(&[("BLUOS_PORT", "eleven")])).is_err());
        assert!(config.apply_env(env(&[("BLUOS_PORT", "70000")])).is_err());
    }

    #[test]
    fn partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bluos_scrobbler.conf");
        fs::write(
            &path,
            r#"
poll_interval = 10

[bluos]
host = "node.local"

[lastfm]
api_key = "k"
api_secret = "s"
session_key = "sk"

[notify.webhook]
url = "https://hooks.example/bridge"
"#,
        )
        .unwrap();

        let config: Config = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(config.poll_interval, 10);
        assert_eq!(config.bluos.host, "node.local");
        assert_eq!(config.bluos.port, 11000);
        assert_eq!(config.queue.capacity, 500);
        assert_eq!(config.notify.webhook.unwrap().min_level, "WARNING");
        assert!(config.cleanup.enabled);
    }

    #[test]
    fn save_then_parse_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("bluos_scrobbler.conf");
        valid().save(&path).unwrap();

        let parsed: Config = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.lastfm.session_key, "session");
        assert_eq!(parsed.scrobble_threshold, 50);
    }
}
