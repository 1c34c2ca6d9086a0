//! Resilient External Client
//!
//! Generic request executor used for every exchange and market-data call:
//! - Hard per-attempt deadline
//! - Bounded retries with exponential backoff honouring `Retry-After`
//! - Fixed error classification, upstream bodies never surfaced
//! - Schema validation before any value is returned
//!
//! Dropping the future returned by [`ResilientClient::execute`] cancels the
//! in-flight attempt and any pending backoff sleep.

use chrono::Utc;
use std::sync::Arc;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use super::error::ClientError;
use super::retry::{parse_retry_after, RetryDecision, RetryPolicy, RetryState};
use super::schema::{parse_response, ResponseSchema};
use super::transport::{ApiRequest, HttpTransport, ReqwestTransport, TransportErrorKind};

/// Stateless request executor over a shared transport.
#[derive(Clone)]
pub struct ResilientClient {
    transport: Arc<dyn HttpTransport>,
}

impl std::fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient").finish_non_exhaustive()
    }
}

impl Default for ResilientClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ResilientClient {
    /// Client over the production reqwest transport.
    pub fn new() -> Self {
        Self::with_transport(Arc::new(ReqwestTransport::new()))
    }

    pub fn with_transport(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Run `request` under `policy` and return a validated `T`.
    pub async fn execute<T: ResponseSchema>(
        &self,
        request: &ApiRequest,
        policy: &RetryPolicy,
    ) -> Result<T, ClientError> {
        let mut state = RetryState::new();

        loop {
            let attempt = state.begin_attempt();
            debug!(
                request = %request.fingerprint(),
                attempt,
                max_attempts = policy.attempts(),
                "Sending request"
            );

            let error = match self.attempt::<T>(request, policy).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            match state.record_failure(error, policy, request.is_idempotent()) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        request = %request.fingerprint(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Request failed with a retryable error, backing off"
                    );
                    sleep(delay).await;
                }
                RetryDecision::GiveUp(error) => {
                    warn!(
                        request = %request.fingerprint(),
                        attempts = state.attempts(),
                        kind = %error.kind(),
                        "Request failed"
                    );
                    return Err(error);
                }
            }
        }
    }

    async fn attempt<T: ResponseSchema>(
        &self,
        request: &ApiRequest,
        policy: &RetryPolicy,
    ) -> Result<T, ClientError> {
        let response = match timeout(policy.attempt_timeout, self.transport.send(request)).await {
            Err(_) => return Err(ClientError::Timeout(policy.attempt_timeout)),
            Ok(Err(err)) => {
                return Err(match err.kind {
                    TransportErrorKind::Timeout => ClientError::Timeout(policy.attempt_timeout),
                    TransportErrorKind::Connect => ClientError::Network {
                        detail: err.detail,
                        connected: false,
                    },
                    TransportErrorKind::Other => ClientError::Network {
                        detail: err.detail,
                        connected: true,
                    },
                })
            }
            Ok(Ok(response)) => response,
        };

        if !response.is_success() {
            let retry_after = response
                .header("retry-after")
                .and_then(|value| parse_retry_after(value, Utc::now()));
            let error =
                ClientError::from_status(response.status, retry_after, &policy.retryable_statuses);
            debug!(
                request = %request.fingerprint(),
                status = response.status,
                kind = %error.kind(),
                "Upstream returned non-success status"
            );
            return Err(error);
        }

        parse_response::<T>(&response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::testkit::{ScriptedTransport, Step};
    use crate::common::{ErrorKind, HttpResponse, SchemaViolation};
    use serde::Deserialize;
    use serde_json::json;
    use std::time::Duration;
    use url::Url;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Ping {
        ok: bool,
    }

    impl crate::common::ResponseSchema for Ping {
        const NAME: &'static str = "ping";

        fn validate(&self) -> Result<(), SchemaViolation> {
            if !self.ok {
                return Err(SchemaViolation::new("ok", "must be true"));
            }
            Ok(())
        }
    }

    fn request() -> ApiRequest {
        ApiRequest::get(Url::parse("https://api.example.com/ping").unwrap())
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(3)
            .with_initial_backoff(Duration::from_millis(100))
            .with_timeout(Duration::from_secs(1))
    }

    fn client(transport: &Arc<ScriptedTransport>) -> ResilientClient {
        ResilientClient::with_transport(transport.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_503_then_succeeds() {
        let transport = Arc::new(ScriptedTransport::with_steps([
            Step::status(503),
            Step::status(503),
            Step::json(200, json!({"ok": true})),
        ]));

        let result: Ping = client(&transport).execute(&request(), &policy()).await.unwrap();
        assert_eq!(result, Ping { ok: true });
        assert_eq!(transport.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_not_retried() {
        let transport = Arc::new(ScriptedTransport::with_steps([
            Step::status(401),
            Step::json(200, json!({"ok": true})),
        ]));

        let err = client(&transport)
            .execute::<Ping>(&request(), &policy())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert_eq!(transport.attempts(), 1);
        assert!(!err.to_string().contains("upstream internal detail"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_surfaces_last_error() {
        let transport = Arc::new(ScriptedTransport::with_steps([
            Step::status(503),
            Step::status(502),
            Step::status(429),
        ]));

        let err = client(&transport)
            .execute::<Ping>(&request(), &policy())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(transport.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_retried() {
        let transport = Arc::new(ScriptedTransport::with_steps([
            Step::Delay(
                Duration::from_secs(5),
                HttpResponse::new(200, json!({"ok": true}).to_string()),
            ),
            Step::json(200, json!({"ok": true})),
        ]));

        let result: Ping = client(&transport).execute(&request(), &policy()).await.unwrap();
        assert!(result.ok);
        assert_eq!(transport.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_exhaust_to_timeout_error() {
        let slow = || {
            Step::Delay(
                Duration::from_secs(5),
                HttpResponse::new(200, json!({"ok": true}).to_string()),
            )
        };
        let transport = Arc::new(ScriptedTransport::with_steps([slow(), slow(), slow()]));

        let err = client(&transport)
            .execute::<Ping>(&request(), &policy())
            .await
            .unwrap_err();
        assert_eq!(err, ClientError::Timeout(Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_error_is_retried() {
        let transport = Arc::new(ScriptedTransport::with_steps([
            Step::connect_refused(),
            Step::json(200, json!({"ok": true})),
        ]));

        let result: Ping = client(&transport).execute(&request(), &policy()).await.unwrap();
        assert!(result.ok);
        assert_eq!(transport.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_failure_not_retried() {
        let transport = Arc::new(ScriptedTransport::with_steps([
            Step::json(200, json!({"ok": false})),
            Step::json(200, json!({"ok": true})),
        ]));

        let err = client(&transport)
            .execute::<Ping>(&request(), &policy())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResponseValidation);
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_header_is_honoured() {
        let transport = Arc::new(ScriptedTransport::with_steps([
            Step::Respond(HttpResponse::new(429, "").with_header("Retry-After", "7")),
            Step::json(200, json!({"ok": true})),
        ]));

        let started = tokio::time::Instant::now();
        let _: Ping = client(&transport).execute(&request(), &policy()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_between_attempts() {
        let transport = Arc::new(ScriptedTransport::with_steps([
            Step::status(503),
            Step::status(503),
            Step::json(200, json!({"ok": true})),
        ]));

        let started = tokio::time::Instant::now();
        let _: Ping = client(&transport).execute(&request(), &policy()).await.unwrap();
        // 100ms after the first failure, 200ms after the second
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_idempotent_request_not_retried_on_503() {
        let transport = Arc::new(ScriptedTransport::with_steps([
            Step::status(503),
            Step::json(200, json!({"ok": true})),
        ]));
        let post = ApiRequest::post(
            Url::parse("https://api.example.com/orders").unwrap(),
            json!({"side": "buy"}),
        );

        let err = client(&transport).execute::<Ping>(&post, &policy()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_4xx_is_invalid_request() {
        let transport = Arc::new(ScriptedTransport::with_steps([Step::status(422)]));
        let err = client(&transport)
            .execute::<Ping>(&request(), &policy())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_status_becomes_retryable() {
        let transport = Arc::new(ScriptedTransport::with_steps([
            Step::status(500),
            Step::json(200, json!({"ok": true})),
        ]));
        let policy = policy().with_retryable_statuses(vec![500]);

        let result: Ping = client(&transport).execute(&request(), &policy).await.unwrap();
        assert!(result.ok);
        assert_eq!(transport.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_future_cancels_backoff() {
        let transport = Arc::new(ScriptedTransport::with_steps([
            Step::Respond(HttpResponse::new(503, "").with_header("Retry-After", "30")),
            Step::json(200, json!({"ok": true})),
        ]));
        let client = client(&transport);
        let req = request();
        let policy = policy();

        let outcome = timeout(Duration::from_secs(1), client.execute::<Ping>(&req, &policy)).await;
        assert!(outcome.is_err());
        assert_eq!(transport.attempts(), 1);
    }
}
