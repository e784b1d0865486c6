use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::probe::Outcome;

/// Lifecycle of the scheduling engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    Idle,
    Active,
    Stopping,
    Stopped,
}

impl MonitorState {
    pub fn can_transition_to(self, target: MonitorState) -> bool {
        matches!(
            (self, target),
            (MonitorState::Idle, MonitorState::Active)
                | (MonitorState::Active, MonitorState::Stopping)
                | (MonitorState::Stopping, MonitorState::Stopped)
                | (MonitorState::Stopped, MonitorState::Active)
        )
    }
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Active => write!(f, "active"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Edge detected between two consecutive probe cycles of one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    NoChange,
    WentDown,
    CameBackUp,
}

impl Transition {
    pub fn evaluate(was_up: bool, is_up: bool) -> Self {
        match (was_up, is_up) {
            (true, false) => Self::WentDown,
            (false, true) => Self::CameBackUp,
            _ => Self::NoChange,
        }
    }

    pub fn is_change(self) -> bool {
        self != Self::NoChange
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoChange => write!(f, "no change"),
            Self::WentDown => write!(f, "went down"),
            Self::CameBackUp => write!(f, "came back up"),
        }
    }
}

/// Recorded state of one target. Only [`TargetStatus::apply`] mutates it.
#[derive(Debug, Clone)]
pub struct TargetStatus {
    is_up: bool,
    last_checked: Option<DateTime<Utc>>,
    last_status_code: Option<u16>,
    last_latency: Option<Duration>,
    transitions: u64,
}

impl TargetStatus {
    /// Targets start out assumed up, so the first real failure alerts.
    pub fn new() -> Self {
        Self {
            is_up: true,
            last_checked: None,
            last_status_code: None,
            last_latency: None,
            transitions: 0,
        }
    }

    pub fn is_up(&self) -> bool {
        self.is_up
    }

    pub fn last_checked(&self) -> Option<DateTime<Utc>> {
        self.last_checked
    }

    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Fold a probe outcome into the recorded state and report the edge, if any.
    pub fn apply(&mut self, outcome: &Outcome) -> Transition {
        let transition = Transition::evaluate(self.is_up, outcome.is_up());

        self.is_up = outcome.is_up();
        self.last_checked = Some(Utc::now());
        self.last_status_code = Some(outcome.status_code());
        self.last_latency = Some(outcome.latency());
        if transition.is_change() {
            self.transitions += 1;
        }

        transition
    }

    pub fn snapshot(&self, name: &str, url: &str) -> TargetSnapshot {
        TargetSnapshot {
            name: name.to_string(),
            url: url.to_string(),
            is_up: self.is_up,
            last_checked: self.last_checked,
            last_status_code: self.last_status_code,
            last_latency_ms: self.last_latency.map(|d| d.as_millis() as u64),
            transitions: self.transitions,
        }
    }
}

impl Default for TargetStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of a target's recorded state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSnapshot {
    pub name: String,
    pub url: String,
    pub is_up: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_latency_ms: Option<u64>,
    pub transitions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok() -> Outcome {
        Outcome::Success {
            status_code: 200,
            latency: Duration::from_millis(12),
        }
    }

    fn http(code: u16) -> Outcome {
        Outcome::HttpError {
            status_code: code,
            latency: Duration::from_millis(12),
        }
    }

    fn failed() -> Outcome {
        Outcome::Failure {
            reason: "connection refused".into(),
            latency: Duration::from_millis(3),
        }
    }

    fn status(is_up: bool) -> TargetStatus {
        TargetStatus {
            is_up,
            ..TargetStatus::new()
        }
    }

    #[test]
    fn starts_up() {
        let s = TargetStatus::new();
        assert!(s.is_up());
        assert!(s.last_checked().is_none());
        assert_eq!(s.transitions(), 0);
    }

    #[test]
    fn decision_table() {
        let cases = [
            (true, ok(), true, Transition::NoChange),
            (true, http(503), false, Transition::WentDown),
            (true, failed(), false, Transition::WentDown),
            (false, ok(), true, Transition::CameBackUp),
            (false, http(500), false, Transition::NoChange),
            (false, failed(), false, Transition::NoChange),
        ];

        for (was_up, outcome, now_up, expected) in cases {
            let mut s = status(was_up);
            let transition = s.apply(&outcome);
            assert_eq!(transition, expected, "was_up={} outcome={:?}", was_up, outcome);
            assert_eq!(s.is_up(), now_up);
            assert!(s.last_checked().is_some());
        }
    }

    #[test]
    fn repeated_identical_outcomes_change_once() {
        let mut s = TargetStatus::new();
        let edges: Vec<_> = [http(503), http(503), failed(), ok(), ok()]
            .iter()
            .map(|o| s.apply(o))
            .filter(|t| t.is_change())
            .collect();
        assert_eq!(edges, vec![Transition::WentDown, Transition::CameBackUp]);
        assert_eq!(s.transitions(), 2);
    }

    #[test]
    fn snapshot_reflects_last_outcome() {
        let mut s = TargetStatus::new();
        s.apply(&http(503));
        let snap = s.snapshot("api", "https://example.test/health");
        assert!(!snap.is_up);
        assert_eq!(snap.last_status_code, Some(503));
        assert_eq!(snap.last_latency_ms, Some(12));
        assert_eq!(snap.transitions, 1);
    }

    #[test]
    fn valid_state_transitions() {
        assert!(MonitorState::Idle.can_transition_to(MonitorState::Active));
        assert!(MonitorState::Active.can_transition_to(MonitorState::Stopping));
        assert!(MonitorState::Stopping.can_transition_to(MonitorState::Stopped));
        assert!(MonitorState::Stopped.can_transition_to(MonitorState::Active));
    }

    #[test]
    fn invalid_state_transitions() {
        assert!(!MonitorState::Idle.can_transition_to(MonitorState::Stopping));
        assert!(!MonitorState::Active.can_transition_to(MonitorState::Active));
        assert!(!MonitorState::Stopping.can_transition_to(MonitorState::Active));
    }
}
