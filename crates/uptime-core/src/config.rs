use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Upper bound on the tick period: one week.
pub const MAX_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

/// Monitoring configuration as it appears in the setup document.
///
/// All durations are whole seconds. The document is validated by
/// [`MonitorConfig::validate`] before any target is resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between scheduler ticks. Required.
    #[serde(default)]
    pub interval: Option<u64>,
    /// Global probe deadline, used by targets without their own (default: 10).
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub targets: Vec<TargetDef>,
    /// Webhooks notified for targets that declare none.
    #[serde(default)]
    pub notification_webhooks: Vec<String>,
    /// Deadline for a single webhook POST.
    #[serde(default = "default_webhook_timeout")]
    pub webhook_timeout: u64,
    /// How long to wait for in-flight cycles on shutdown.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: None,
            timeout: None,
            targets: Vec::new(),
            notification_webhooks: Vec::new(),
            webhook_timeout: default_webhook_timeout(),
            shutdown_grace: default_shutdown_grace(),
        }
    }
}

fn default_webhook_timeout() -> u64 {
    5
}

fn default_shutdown_grace() -> u64 {
    5
}

/// A target as declared in the setup document, before defaults are merged in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetDef {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub notification_webhooks: Vec<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("interval is missing")]
    MissingInterval,
    #[error("interval must be greater than zero")]
    ZeroInterval,
    #[error("interval of {secs}s exceeds the maximum of {max}s")]
    IntervalTooLong { secs: u64, max: u64 },
    #[error("timeout must be greater than zero")]
    ZeroTimeout,
    #[error("webhook_timeout must be greater than zero")]
    ZeroWebhookTimeout,
    #[error("no targets configured")]
    NoTargets,
    #[error("target at index {index} has an empty name")]
    EmptyName { index: usize },
    #[error("duplicate target name: {name}")]
    DuplicateName { name: String },
    #[error("target '{name}' has a zero timeout")]
    ZeroTargetTimeout { name: String },
    #[error("invalid url for target '{name}': {url} ({reason})")]
    InvalidTargetUrl {
        name: String,
        url: String,
        reason: String,
    },
    #[error("invalid webhook url {url} ({reason})")]
    InvalidWebhookUrl { url: String, reason: String },
}

impl MonitorConfig {
    pub fn with_interval(mut self, secs: u64) -> Self {
        self.interval = Some(secs);
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(secs);
        self
    }

    pub fn with_target(mut self, target: TargetDef) -> Self {
        self.targets.push(target);
        self
    }

    pub fn with_webhooks<I, S>(mut self, webhooks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.notification_webhooks = webhooks.into_iter().map(Into::into).collect();
        self
    }

    /// Tick period. Only meaningful after [`validate`](Self::validate) succeeded.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval.unwrap_or_default())
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.interval {
            None => return Err(ConfigError::MissingInterval),
            Some(0) => return Err(ConfigError::ZeroInterval),
            Some(secs) if secs > MAX_INTERVAL_SECS => {
                return Err(ConfigError::IntervalTooLong {
                    secs,
                    max: MAX_INTERVAL_SECS,
                })
            }
            Some(_) => {}
        }
        if self.timeout == Some(0) {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.webhook_timeout == 0 {
            return Err(ConfigError::ZeroWebhookTimeout);
        }
        if self.targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }

        for url in &self.notification_webhooks {
            check_webhook_url(url)?;
        }

        let mut names = HashSet::new();
        for (index, t) in self.targets.iter().enumerate() {
            if t.name.trim().is_empty() {
                return Err(ConfigError::EmptyName { index });
            }
            if !names.insert(t.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    name: t.name.clone(),
                });
            }
            if t.timeout == Some(0) {
                return Err(ConfigError::ZeroTargetTimeout {
                    name: t.name.clone(),
                });
            }
            check_target_url(t)?;
            for url in &t.notification_webhooks {
                check_webhook_url(url)?;
            }
        }

        Ok(())
    }
}

impl TargetDef {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            timeout: None,
            notification_webhooks: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(secs);
        self
    }

    pub fn with_webhooks<I, S>(mut self, webhooks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.notification_webhooks = webhooks.into_iter().map(Into::into).collect();
        self
    }
}

fn check_target_url(t: &TargetDef) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidTargetUrl {
        name: t.name.clone(),
        url: t.url.clone(),
        reason,
    };
    let parsed = url::Url::parse(&t.url).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme '{}'", other))),
    }
}

fn check_webhook_url(url: &str) -> Result<(), ConfigError> {
    url::Url::parse(url)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidWebhookUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })
}
