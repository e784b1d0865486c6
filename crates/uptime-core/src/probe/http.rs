use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{redirect, Client, StatusCode};
use thiserror::Error;
use tracing::debug;

use super::{Outcome, Prober};
use crate::registry::Target;

#[derive(Debug, Error)]
#[error("failed to build HTTP client: {0}")]
pub struct ClientError(#[from] reqwest::Error);

/// HTTP prober sharing one pooled client across all targets.
///
/// Redirects are not followed: a 3xx is reported as the target's own status.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
}

impl HttpProber {
    pub fn new() -> Result<Self, ClientError> {
        Ok(Self::with_client(Self::build_client()?))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    pub fn build_client() -> Result<Client, ClientError> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .pool_max_idle_per_host(20)
            .user_agent(concat!("uptime-monitor/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(client)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, target: &Target) -> Outcome {
        let start = Instant::now();
        debug!(name = %target.name, url = %target.url, "Probing target");

        let request = self.client.get(&target.url).send();
        match tokio::time::timeout(target.timeout, request).await {
            Ok(Ok(response)) => {
                let latency = start.elapsed();
                let status_code = response.status().as_u16();
                if response.status() == StatusCode::OK {
                    Outcome::Success { status_code, latency }
                } else {
                    Outcome::HttpError { status_code, latency }
                }
            }
            Ok(Err(e)) => Outcome::Failure {
                reason: describe_error(&e),
                latency: start.elapsed(),
            },
            Err(_) => Outcome::Failure {
                reason: format!(
                    "request deadline of {} exceeded",
                    format_deadline(target.timeout)
                ),
                latency: start.elapsed(),
            },
        }
    }
}

fn describe_error(e: &reqwest::Error) -> String {
    if e.is_connect() {
        format!("connection failed: {}", e)
    } else if e.is_timeout() {
        format!("request timed out: {}", e)
    } else {
        format!("request failed: {}", e)
    }
}

fn format_deadline(d: Duration) -> String {
    if d.subsec_millis() == 0 {
        format!("{} seconds", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn target(url: String, timeout: Duration) -> Target {
        Target::new("api", url, timeout)
    }

    async fn server_with(status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn status_200_is_success() {
        let server = server_with(200).await;
        let prober = HttpProber::new().unwrap();
        let outcome = prober
            .probe(&target(format!("{}/health", server.uri()), Duration::from_secs(5)))
            .await;
        assert!(matches!(outcome, Outcome::Success { status_code: 200, .. }), "{:?}", outcome);
    }

    #[tokio::test]
    async fn non_200_is_http_error() {
        let server = server_with(503).await;
        let prober = HttpProber::new().unwrap();
        let outcome = prober
            .probe(&target(format!("{}/health", server.uri()), Duration::from_secs(5)))
            .await;
        assert_eq!(outcome.status_code(), 503);
        assert!(matches!(outcome, Outcome::HttpError { .. }));
    }

    #[tokio::test]
    async fn redirects_are_not_followed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(
                ResponseTemplate::new(301).insert_header("Location", "/elsewhere"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/elsewhere"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let prober = HttpProber::new().unwrap();
        let outcome = prober
            .probe(&target(format!("{}/health", server.uri()), Duration::from_secs(5)))
            .await;
        assert!(matches!(outcome, Outcome::HttpError { status_code: 301, .. }), "{:?}", outcome);
    }

    #[tokio::test]
    async fn slow_response_fails_at_deadline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
            .mount(&server)
            .await;

        let prober = HttpProber::new().unwrap();
        let started = Instant::now();
        let outcome = prober
            .probe(&target(format!("{}/health", server.uri()), Duration::from_millis(300)))
            .await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(outcome.status_code(), 0);
        let reason = outcome.failure_reason().unwrap();
        assert!(reason.contains("deadline of 300ms exceeded"), "{}", reason);
        assert!(outcome.latency() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn connection_refused_is_failure() {
        // Bind then drop to get a port with nothing listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let prober = HttpProber::new().unwrap();
        let outcome = prober
            .probe(&target(format!("http://{}/health", addr), Duration::from_secs(5)))
            .await;
        assert!(matches!(outcome, Outcome::Failure { .. }), "{:?}", outcome);
        assert!(!outcome.is_up());
    }

    #[test]
    fn deadline_formatting() {
        assert_eq!(format_deadline(Duration::from_secs(3)), "3 seconds");
        assert_eq!(format_deadline(Duration::from_millis(1500)), "1500ms");
    }
}
