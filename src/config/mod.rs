//! Configuration management for Lorax.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// Polling configuration (legacy firmware and ambient reads).
    #[serde(default)]
    pub polling: PollingConfig,

    /// Watch and watchdog configuration.
    #[serde(default)]
    pub watch: WatchConfig,

    /// Diagnostics reporting configuration.
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| Error::Config(format!("Failed to write config: {e}")))?;

        Ok(())
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.session.max_busy_retries == 0 {
            return Err(Error::InvalidConfig(
                "max_busy_retries must be at least 1".into(),
            ));
        }

        for (name, interval) in [
            ("watch.state_interval", self.watch.state_interval),
            ("watch.ambient_interval", self.watch.ambient_interval),
            ("watch.high_frequency_interval", self.watch.high_frequency_interval),
        ] {
            if interval.is_zero() || interval.as_millis() > u128::from(u16::MAX) {
                return Err(Error::InvalidConfig(format!(
                    "{name} must be between 1ms and {}ms",
                    u16::MAX
                )));
            }
        }

        if self.polling.interval.is_zero() || self.polling.high_frequency_interval.is_zero() {
            return Err(Error::InvalidConfig("poll intervals must be non-zero".into()));
        }

        Ok(())
    }

    /// Get default config path.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "lorax", "lorax").map_or_else(
            || PathBuf::from("lorax.toml"),
            |dirs| dirs.config_dir().join("config.toml"),
        )
    }

    /// Create example configuration.
    pub fn example() -> Self {
        Self {
            session: SessionConfig {
                reply_timeout: Some(Duration::from_secs(5)),
                ..Default::default()
            },
            logging: LoggingConfig {
                level: "debug".into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Give up on a write after this many busy rejections.
    #[serde(default = "default_max_busy_retries")]
    pub max_busy_retries: u32,

    /// Abandon a request when no reply arrives in time. Unset waits forever.
    #[serde(default, with = "humantime_serde")]
    pub reply_timeout: Option<Duration>,

    /// How long the device must stay idle before high-frequency watches close.
    #[serde(default = "default_idle_debounce", with = "humantime_serde")]
    pub idle_debounce: Duration,

    /// Read identity and profiles right after the handshake.
    #[serde(default = "default_bootstrap")]
    pub bootstrap: bool,
}

fn default_max_busy_retries() -> u32 {
    1000
}
fn default_idle_debounce() -> Duration {
    Duration::from_secs(15)
}
fn default_bootstrap() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_busy_retries: default_max_busy_retries(),
            reply_timeout: None,
            idle_debounce: default_idle_debounce(),
            bootstrap: default_bootstrap(),
        }
    }
}

/// Polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Base interval for legacy characteristic polls.
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Upper bound of random jitter added to each poll.
    #[serde(default = "default_poll_jitter", with = "humantime_serde")]
    pub jitter: Duration,

    /// Interval of the ambient heater temperature poll.
    #[serde(default = "default_ambient_temp_interval", with = "humantime_serde")]
    pub ambient_temp_interval: Duration,

    /// Interval for legacy high-frequency polls while heating.
    #[serde(default = "default_hf_poll_interval", with = "humantime_serde")]
    pub high_frequency_interval: Duration,
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(1000)
}
fn default_poll_jitter() -> Duration {
    Duration::from_millis(250)
}
fn default_ambient_temp_interval() -> Duration {
    Duration::from_secs(5)
}
fn default_hf_poll_interval() -> Duration {
    Duration::from_millis(250)
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: default_poll_interval(),
            jitter: default_poll_jitter(),
            ambient_temp_interval: default_ambient_temp_interval(),
            high_frequency_interval: default_hf_poll_interval(),
        }
    }
}

/// Watch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Interval of the always-open operating state watch.
    #[serde(default = "default_state_interval", with = "humantime_serde")]
    pub state_interval: Duration,

    /// Interval of low-frequency watches (battery, charge, uses).
    #[serde(default = "default_ambient_interval", with = "humantime_serde")]
    pub ambient_interval: Duration,

    /// Interval of the watches opened while heating.
    #[serde(default = "default_hf_interval", with = "humantime_serde")]
    pub high_frequency_interval: Duration,

    /// Pause between unwatching and rewatching a stalled watch.
    #[serde(default = "default_rewatch_delay", with = "humantime_serde")]
    pub rewatch_delay: Duration,
}

fn default_state_interval() -> Duration {
    Duration::from_millis(1000)
}
fn default_ambient_interval() -> Duration {
    Duration::from_millis(1000)
}
fn default_hf_interval() -> Duration {
    Duration::from_millis(250)
}
fn default_rewatch_delay() -> Duration {
    Duration::from_millis(500)
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            state_interval: default_state_interval(),
            ambient_interval: default_ambient_interval(),
            high_frequency_interval: default_hf_interval(),
            rewatch_delay: default_rewatch_delay(),
        }
    }
}

/// Diagnostics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Emit periodic reports.
    #[serde(default = "default_diagnostics_enabled")]
    pub enabled: bool,

    /// Report interval.
    #[serde(default = "default_diagnostics_interval", with = "humantime_serde")]
    pub interval: Duration,
}

fn default_diagnostics_enabled() -> bool {
    true
}
fn default_diagnostics_interval() -> Duration {
    Duration::from_secs(30)
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: default_diagnostics_enabled(),
            interval: default_diagnostics_interval(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text or json).
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Enable colored output.
    #[serde(default = "default_color")]
    pub color: bool,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}
fn default_color() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            color: default_color(),
        }
    }
}

/// Initialize logging.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to init logging: {e}")))?;
    } else {
        subscriber
            .with(fmt::layer().with_ansi(config.color))
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to init logging: {e}")))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.session.idle_debounce, Duration::from_secs(15));
        assert_eq!(config.session.reply_timeout, None);
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [session]
            idle_debounce = "20s"

            [watch]
            high_frequency_interval = "100ms"
            "#,
        )
        .unwrap();

        assert_eq!(config.session.idle_debounce, Duration::from_secs(20));
        assert_eq!(config.watch.high_frequency_interval, Duration::from_millis(100));
        assert_eq!(config.watch.state_interval, Duration::from_secs(1));
        assert_eq!(config.polling.jitter, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_watch_interval() {
        let mut config = Config::default();
        config.watch.state_interval = Duration::from_secs(120);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lorax.toml");

        let config = Config::example();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.session.reply_timeout, Some(Duration::from_secs(5)));
        assert_eq!(loaded.logging.level, "debug");
    }
}
