//! Resolved monitoring targets.
//!
//! The registry is built once from a validated [`MonitorConfig`] by merging the
//! global defaults into every target declaration. It is never restructured
//! afterwards; only each target's [`TargetStatus`] changes, behind its own lock.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::config::{ConfigError, MonitorConfig, TargetDef};
use crate::monitor::state::{TargetSnapshot, TargetStatus};

/// A fully resolved endpoint. Immutable after load.
#[derive(Debug, Clone)]
pub struct Target {
    pub name: String,
    pub url: String,
    pub timeout: Duration,
    pub webhooks: Arc<Vec<String>>,
}

impl Target {
    pub fn new(name: impl Into<String>, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            timeout,
            webhooks: Arc::new(Vec::new()),
        }
    }

    pub fn with_webhooks(mut self, webhooks: Arc<Vec<String>>) -> Self {
        self.webhooks = webhooks;
        self
    }

    /// Merge the global defaults into a single declaration.
    pub fn resolve(
        def: &TargetDef,
        default_timeout: Duration,
        default_webhooks: &Arc<Vec<String>>,
    ) -> Self {
        let timeout = def.timeout.map(Duration::from_secs).unwrap_or(default_timeout);
        let webhooks = if def.notification_webhooks.is_empty() {
            Arc::clone(default_webhooks)
        } else {
            Arc::new(def.notification_webhooks.clone())
        };
        Self {
            name: def.name.clone(),
            url: def.url.clone(),
            timeout,
            webhooks,
        }
    }
}

/// A target together with its lock-guarded recorded state.
#[derive(Debug)]
pub struct TrackedTarget {
    pub target: Target,
    pub(crate) status: Arc<Mutex<TargetStatus>>,
}

impl TrackedTarget {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            status: Arc::new(Mutex::new(TargetStatus::new())),
        }
    }

    pub async fn snapshot(&self) -> TargetSnapshot {
        self.status
            .lock()
            .await
            .snapshot(&self.target.name, &self.target.url)
    }
}

#[derive(Debug, Clone)]
pub struct TargetRegistry {
    entries: Arc<Vec<Arc<TrackedTarget>>>,
}

impl TargetRegistry {
    /// Validate the configuration and resolve every declared target.
    pub fn from_config(config: &MonitorConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let default_timeout = config.default_timeout();
        let default_webhooks = Arc::new(config.notification_webhooks.clone());
        let targets = config
            .targets
            .iter()
            .map(|def| Target::resolve(def, default_timeout, &default_webhooks))
            .collect();

        Ok(Self::from_targets(targets))
    }

    pub fn from_targets(targets: Vec<Target>) -> Self {
        let entries = targets
            .into_iter()
            .map(|t| Arc::new(TrackedTarget::new(t)))
            .collect();
        Self {
            entries: Arc::new(entries),
        }
    }

    pub fn entries(&self) -> &[Arc<TrackedTarget>] {
        &self.entries
    }

    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.entries.iter().map(|e| &e.target)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
