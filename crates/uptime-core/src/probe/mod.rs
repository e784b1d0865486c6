mod http;

pub use http::{ClientError, HttpProber};

use std::time::Duration;

use async_trait::async_trait;

use crate::registry::Target;

/// Classified result of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Response received in time with status 200.
    Success { status_code: u16, latency: Duration },
    /// Response received in time with any other status.
    HttpError { status_code: u16, latency: Duration },
    /// No response: deadline expired or transport error.
    Failure { reason: String, latency: Duration },
}

impl Outcome {
    pub fn is_up(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Observed status code, `0` when no response was received.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Success { status_code, .. } | Self::HttpError { status_code, .. } => *status_code,
            Self::Failure { .. } => 0,
        }
    }

    pub fn latency(&self) -> Duration {
        match self {
            Self::Success { latency, .. }
            | Self::HttpError { latency, .. }
            | Self::Failure { latency, .. } => *latency,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::Failure { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// One-line poll summary, e.g. `api => 200 (12ms)`.
    pub fn summary(&self, name: &str) -> String {
        format!("{} => {} ({:.0?})", name, self.status_code(), self.latency())
    }
}

/// Performs a single bounded health check against a target.
///
/// Implementations must not retry and must return within `target.timeout`.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, target: &Target) -> Outcome;
}
