//! claimchat configuration file handling
//!
//! Configuration is TOML, read from `--config` or from
//! `<config_dir>/claimchat/config.toml`. A missing default file means
//! built-in defaults; nothing is written to disk. Command-line flags take
//! precedence over file values.
//!
//! ```toml
//! [server]
//! url = "connect.ngs.global"
//!
//! [chat]
//! prefix = "chat.demo"
//! presence_interval = "1m"
//! channels = ["general", "random", "help"]
//!
//! [logging]
//! level = "info"
//! file = "/tmp/claimchat.log"
//! ```

use claimchat::bus::topics::is_valid_channel;
use claimchat::session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_SERVER: &str = "connect.ngs.global";
const DEFAULT_PREFIX: &str = "chat.demo";
const DEFAULT_PRESENCE_INTERVAL: &str = "1m";
const DEFAULT_LOG_LEVEL: &str = "info";

/// Shortest accepted presence interval
const MIN_PRESENCE_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub chat: ProtocolConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// NATS server URL
    #[serde(default = "default_server")]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Subject prefix shared by everyone in the chat
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Expected audience of incoming claims, stamped on outgoing ones
    pub audience: Option<String>,

    /// How long a presence announcement stays fresh, e.g. "1m" or "90s"
    #[serde(default = "default_presence_interval")]
    pub presence_interval: String,

    /// Channels joined at startup; the first one is shown first
    #[serde(default = "default_channels")]
    pub channels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs go to stderr if not specified)
    pub file: Option<PathBuf>,
}

fn default_server() -> String {
    DEFAULT_SERVER.to_string()
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_presence_interval() -> String {
    DEFAULT_PRESENCE_INTERVAL.to_string()
}

fn default_channels() -> Vec<String> {
    ["general", "random", "help"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_server(),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            audience: None,
            presence_interval: default_presence_interval(),
            channels: default_channels(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl ChatConfig {
    /// Load and validate configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: ChatConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;

        config
            .validate()
            .map_err(|e| format!("Invalid config file '{}': {}", path.display(), e))?;
        Ok(config)
    }

    /// Load `path` if given (it must exist), else the default file if present,
    /// else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, Box<dyn std::error::Error>> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default_path = default_config_path();
                if default_path.exists() {
                    Self::load(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn presence_interval(&self) -> Result<Duration, String> {
        humantime::parse_duration(&self.chat.presence_interval)
            .map_err(|e| format!("presence_interval '{}': {}", self.chat.presence_interval, e))
    }

    pub fn validate(&self) -> Result<(), String> {
        let prefix = &self.chat.prefix;
        if prefix.is_empty() || prefix.contains(['*', '>', ' ']) {
            return Err(format!("prefix '{}' is not a valid subject", prefix));
        }
        if self.presence_interval()? < MIN_PRESENCE_INTERVAL {
            return Err(format!(
                "presence_interval must be at least {}",
                humantime::format_duration(MIN_PRESENCE_INTERVAL)
            ));
        }
        if self.chat.channels.is_empty() {
            return Err("at least one channel is required".to_string());
        }
        if let Some(bad) = self.chat.channels.iter().find(|c| !is_valid_channel(c)) {
            return Err(format!("channel '{}' is not a valid name", bad));
        }
        Ok(())
    }

    pub fn session_config(&self) -> Result<SessionConfig, String> {
        Ok(SessionConfig {
            prefix: self.chat.prefix.clone(),
            audience: self.chat.audience.clone(),
            presence_interval: self.presence_interval()?,
            channels: self.chat.channels.clone(),
        })
    }
}

/// `<config_dir>/claimchat/config.toml`, e.g. `~/.config/claimchat/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("claimchat")
        .join("config.toml")
}
