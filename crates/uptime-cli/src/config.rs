//! Setup document loading.
//!
//! The document is JSON by default; files ending in `.toml` are read as TOML.
//!
//! ```json
//! {
//!   "interval": 30,
//!   "timeout": 5,
//!   "log_format": "json",
//!   "targets": [
//!     { "name": "api", "url": "https://api.example.com/health", "timeout": 2 },
//!     { "name": "web", "url": "https://www.example.com",
//!       "notification_webhooks": ["https://hooks.slack.com/services/T000/B000/web"] }
//!   ],
//!   "notification_webhooks": ["https://hooks.slack.com/services/T000/B000/ops"]
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use uptime_core::{ConfigError, MonitorConfig};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_log_format")]
    pub log_format: String,

    #[serde(flatten)]
    pub monitor: MonitorConfig,
}

fn default_log_format() -> String {
    "pretty".into()
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
    #[error("invalid config file {}: {source}", .path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },
    #[error(
        "invalid log_format '{value}' in {}: must be 'pretty' or 'json'",
        .path.display()
    )]
    LogFormat { path: PathBuf, value: String },
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::parse(path, &content)?;
        config.validate(path)?;
        Ok(config)
    }

    fn parse(path: &Path, content: &str) -> Result<Self, LoadError> {
        let is_toml = path.extension().is_some_and(|ext| ext == "toml");
        let parsed = if is_toml {
            toml::from_str(content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(content).map_err(|e| e.to_string())
        };
        parsed.map_err(|message| LoadError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    fn validate(&self, path: &Path) -> Result<(), LoadError> {
        match self.log_format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(LoadError::LogFormat {
                    path: path.to_path_buf(),
                    value: other.to_string(),
                })
            }
        }
        self.monitor.validate().map_err(|source| LoadError::Invalid {
            path: path.to_path_buf(),
            source,
        })
    }
}
