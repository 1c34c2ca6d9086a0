//! Test doubles: a scripted HTTP transport and a manually advanced clock.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Method;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

use super::cache::Clock;
use super::transport::{ApiRequest, HttpResponse, HttpTransport, TransportError, TransportErrorKind};

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

/// One scripted outcome.
#[derive(Debug, Clone)]
pub enum Step {
    Respond(HttpResponse),
    Fail(TransportError),
    /// Respond only after the delay; used to trip attempt timeouts
    Delay(Duration, HttpResponse),
}

impl Step {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Step::Respond(HttpResponse::new(status, body.to_string()))
    }

    pub fn status(status: u16) -> Self {
        Step::Respond(HttpResponse::new(status, "upstream internal detail"))
    }

    pub fn connect_refused() -> Self {
        Step::Fail(TransportError::new(
            TransportErrorKind::Connect,
            "connection refused",
        ))
    }
}

/// What the transport saw.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub body: Option<serde_json::Value>,
    pub bearer: Option<String>,
}

struct Route {
    method: Method,
    path: String,
    step: Step,
}

/// Transport that replays scripted steps.
///
/// Routed steps answer every request matching method and path; everything
/// else consumes the sequential queue in order.
#[derive(Default)]
pub struct ScriptedTransport {
    queue: Mutex<VecDeque<Step>>,
    routes: Mutex<Vec<Route>>,
    recorded: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_steps(steps: impl IntoIterator<Item = Step>) -> Self {
        let transport = Self::new();
        transport.queue.lock().extend(steps);
        transport
    }

    pub fn push(&self, step: Step) {
        self.queue.lock().push_back(step);
    }

    pub fn route(&self, method: Method, path: &str, step: Step) {
        self.routes.lock().push(Route {
            method,
            path: path.to_string(),
            step,
        });
    }

    /// Number of requests sent so far.
    pub fn attempts(&self) -> usize {
        self.recorded.lock().len()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.recorded.lock().clone()
    }

    fn next_step(&self, request: &ApiRequest) -> Option<Step> {
        let routed = self
            .routes
            .lock()
            .iter()
            .find(|route| route.method == request.method && route.path == request.url.path())
            .map(|route| route.step.clone());
        routed.or_else(|| self.queue.lock().pop_front())
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<HttpResponse, TransportError> {
        self.recorded.lock().push(RecordedRequest {
            method: request.method.clone(),
            path: request.url.path().to_string(),
            query: request.url.query().map(str::to_string),
            body: request.body.clone(),
            bearer: request.bearer().map(|token| token.expose().to_string()),
        });

        match self.next_step(request) {
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Fail(err)) => Err(err),
            Some(Step::Delay(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            None => Err(TransportError::new(
                TransportErrorKind::Other,
                "scripted transport exhausted",
            )),
        }
    }
}
