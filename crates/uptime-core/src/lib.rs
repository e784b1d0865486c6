#![forbid(unsafe_code)]

pub mod config;
pub mod monitor;
pub mod probe;
pub mod registry;
pub mod webhook;

pub use config::{ConfigError, MonitorConfig, TargetDef};
pub use monitor::{CycleReport, Monitor, MonitorState, TargetSnapshot, TargetStatus, Transition};
pub use probe::{ClientError, HttpProber, Outcome, Prober};
pub use registry::{Target, TargetRegistry, TrackedTarget};
pub use webhook::{
    Alert, AlertStatus, DeliveryError, DispatchSummary, Notifier, WebhookNotifier, WebhookPayload,
};
