//! Alert notifications.
//!
//! When a target changes state the engine builds an [`Alert`] and hands it to a
//! [`Notifier`]. The [`WebhookNotifier`] renders it as a chat-style attachment
//! payload and POSTs it to every webhook of the target. Delivery failures are
//! logged per destination and never propagate.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::monitor::state::Transition;
use crate::probe::Outcome;
use crate::registry::Target;

const DOWN_COLOR: &str = "#D00000";
const UP_COLOR: &str = "#00B802";
const DOWN_HEADLINE: &str = "Website is down ❌";
const UP_HEADLINE: &str = "Website is up ✅";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Up,
    Down,
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

/// Record of one detected state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub target_name: String,
    pub target_url: String,
    pub status: AlertStatus,
    /// `0` when no response was received.
    pub status_code: u16,
    pub message: String,
}

impl Alert {
    /// Build the alert for a transition; `None` for [`Transition::NoChange`].
    pub fn from_transition(target: &Target, transition: Transition, outcome: &Outcome) -> Option<Self> {
        let status = match transition {
            Transition::NoChange => return None,
            Transition::WentDown => AlertStatus::Down,
            Transition::CameBackUp => AlertStatus::Up,
        };
        let message = match (status, outcome) {
            (_, Outcome::Failure { reason, .. }) => reason.clone(),
            (AlertStatus::Up, _) => outcome.summary(&target.name),
            (AlertStatus::Down, _) => String::new(),
        };

        Some(Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            target_name: target.name.clone(),
            target_url: target.url.clone(),
            status,
            status_code: outcome.status_code(),
            message,
        })
    }

    pub fn headline(&self) -> &'static str {
        match self.status {
            AlertStatus::Up => UP_HEADLINE,
            AlertStatus::Down => DOWN_HEADLINE,
        }
    }
}

/// The JSON body POSTed to webhook endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub fallback: String,
    pub pretext: String,
    pub color: String,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub title: String,
    pub value: String,
    pub short: bool,
}

impl Field {
    fn new(title: &str, value: impl Into<String>, short: bool) -> Self {
        Self {
            title: title.to_string(),
            value: value.into(),
            short,
        }
    }
}

impl WebhookPayload {
    pub fn from_alert(alert: &Alert) -> Self {
        let summary = format!("{}: <{}|{}>", alert.headline(), alert.target_url, alert.target_name);
        let color = match alert.status {
            AlertStatus::Up => UP_COLOR,
            AlertStatus::Down => DOWN_COLOR,
        };
        let message = if alert.message.is_empty() {
            alert.headline().to_string()
        } else {
            alert.message.clone()
        };

        Self {
            attachments: vec![Attachment {
                fallback: summary.clone(),
                pretext: summary,
                color: color.to_string(),
                fields: vec![
                    Field::new("Message", message, false),
                    Field::new("Status Code", alert.status_code.to_string(), true),
                    Field::new("Time", alert.timestamp.to_rfc3339(), true),
                ],
            }],
        }
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Outcome of fanning one alert out to a target's webhooks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub delivered: usize,
    pub failed: usize,
}

/// Delivers alerts for a target. Must not fail the caller.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, target: &Target, alert: &Alert) -> DispatchSummary;
}

/// Posts alerts to each webhook of the target, concurrently and independently.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, target: &Target, alert: &Alert) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        if target.webhooks.is_empty() {
            debug!(name = %target.name, "No webhooks configured, alert not sent");
            return summary;
        }

        let body = match serde_json::to_vec(&WebhookPayload::from_alert(alert)) {
            Ok(b) => b,
            Err(e) => {
                warn!(alert_id = %alert.id, error = %DeliveryError::from(e), "Dropping alert");
                summary.failed = target.webhooks.len();
                return summary;
            }
        };

        let deliveries = target
            .webhooks
            .iter()
            .map(|url| deliver(&self.client, url, &body, self.timeout));

        for (url, result) in target.webhooks.iter().zip(join_all(deliveries).await) {
            match result {
                Ok(()) => {
                    debug!(url = %url, alert_id = %alert.id, "Webhook delivered");
                    summary.delivered += 1;
                }
                Err(e) => {
                    warn!(
                        url = %url,
                        name = %target.name,
                        alert_id = %alert.id,
                        error = %e,
                        "Webhook delivery failed"
                    );
                    summary.failed += 1;
                }
            }
        }

        summary
    }
}

async fn deliver(client: &Client, url: &str, body: &[u8], timeout: Duration) -> Result<(), DeliveryError> {
    let resp = client
        .post(url)
        .header("Content-Type", "application/json")
        .timeout(timeout)
        .body(body.to_vec())
        .send()
        .await
        .map_err(|source| DeliveryError::Request {
            url: url.to_string(),
            source,
        })?;

    if resp.status().is_success() {
        Ok(())
    } else {
        Err(DeliveryError::Status {
            url: url.to_string(),
            status: resp.status().as_u16(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn target() -> Target {
        Target::new("api", "https://example.test/health", Duration::from_secs(3))
    }

    fn down_503() -> Outcome {
        Outcome::HttpError {
            status_code: 503,
            latency: Duration::from_millis(80),
        }
    }

    #[test]
    fn no_alert_without_change() {
        assert!(Alert::from_transition(&target(), Transition::NoChange, &down_503()).is_none());
    }

    #[test]
    fn down_alert_for_http_error_has_empty_message() {
        let alert = Alert::from_transition(&target(), Transition::WentDown, &down_503()).unwrap();
        assert_eq!(alert.status, AlertStatus::Down);
        assert_eq!(alert.status_code, 503);
        assert!(alert.message.is_empty());
        assert_eq!(alert.target_name, "api");
    }

    #[test]
    fn down_alert_for_transport_failure_carries_reason() {
        let outcome = Outcome::Failure {
            reason: "request deadline of 3 seconds exceeded".into(),
            latency: Duration::from_secs(3),
        };
        let alert = Alert::from_transition(&target(), Transition::WentDown, &outcome).unwrap();
        assert_eq!(alert.status_code, 0);
        assert_eq!(alert.message, "request deadline of 3 seconds exceeded");
    }

    #[test]
    fn up_alert_carries_poll_summary() {
        let outcome = Outcome::Success {
            status_code: 200,
            latency: Duration::from_millis(15),
        };
        let alert = Alert::from_transition(&target(), Transition::CameBackUp, &outcome).unwrap();
        assert_eq!(alert.status, AlertStatus::Up);
        assert_eq!(alert.message, "api => 200 (15ms)");
    }

    #[test]
    fn payload_shape() {
        let alert = Alert::from_transition(&target(), Transition::WentDown, &down_503()).unwrap();
        let json = serde_json::to_value(WebhookPayload::from_alert(&alert)).unwrap();

        let att = &json["attachments"][0];
        assert_eq!(att["fallback"], "Website is down ❌: <https://example.test/health|api>");
        assert_eq!(att["pretext"], att["fallback"]);
        assert_eq!(att["color"], "#D00000");

        let fields = att["fields"].as_array().unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0]["title"], "Message");
        assert_eq!(fields[0]["value"], "Website is down ❌");
        assert_eq!(fields[0]["short"], false);
        assert_eq!(fields[1]["title"], "Status Code");
        assert_eq!(fields[1]["value"], "503");
        assert_eq!(fields[1]["short"], true);
        assert_eq!(fields[2]["title"], "Time");
        assert_eq!(fields[2]["value"], alert.timestamp.to_rfc3339());
    }

    #[test]
    fn up_payload_uses_up_color() {
        let outcome = Outcome::Success {
            status_code: 200,
            latency: Duration::from_millis(15),
        };
        let alert = Alert::from_transition(&target(), Transition::CameBackUp, &outcome).unwrap();
        let payload = WebhookPayload::from_alert(&alert);
        assert_eq!(payload.attachments[0].color, "#00B802");
        assert!(payload.attachments[0].pretext.starts_with("Website is up ✅"));
    }

    #[tokio::test]
    async fn one_failing_webhook_does_not_block_others() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ok"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let webhooks = vec![
            format!("{}/broken", server.uri()),
            "http://127.0.0.1:1/unreachable".to_string(),
            format!("{}/ok", server.uri()),
        ];
        let target = target().with_webhooks(Arc::new(webhooks));
        let alert = Alert::from_transition(&target, Transition::WentDown, &down_503()).unwrap();

        let notifier = WebhookNotifier::new(Client::new(), Duration::from_secs(2));
        let summary = notifier.notify(&target, &alert).await;

        assert_eq!(summary, DispatchSummary { delivered: 1, failed: 2 });

        let received = server.received_requests().await.unwrap();
        let ok = received.iter().find(|r| r.url.path() == "/ok").unwrap();
        let body: WebhookPayload = serde_json::from_slice(&ok.body).unwrap();
        assert_eq!(body.attachments[0].fields[1].value, "503");
    }

    #[tokio::test]
    async fn slow_webhook_is_bounded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
            .mount(&server)
            .await;

        let target = target().with_webhooks(Arc::new(vec![server.uri()]));
        let alert = Alert::from_transition(&target, Transition::WentDown, &down_503()).unwrap();
        let notifier = WebhookNotifier::new(Client::new(), Duration::from_millis(200));

        let summary = tokio::time::timeout(Duration::from_secs(3), notifier.notify(&target, &alert))
            .await
            .expect("webhook timeout should bound delivery");
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn no_webhooks_is_silent() {
        let alert = Alert::from_transition(&target(), Transition::WentDown, &down_503()).unwrap();
        let notifier = WebhookNotifier::new(Client::new(), Duration::from_secs(1));
        assert_eq!(notifier.notify(&target(), &alert).await, DispatchSummary::default());
    }
}
