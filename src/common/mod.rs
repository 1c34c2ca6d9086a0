//! Shared plumbing for outbound calls: transport, retries, validation and caching.

pub mod cache;
pub mod client;
pub mod error;
pub mod retry;
pub mod schema;
pub mod transport;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use cache::{Clock, SystemClock, TtlCache};
pub use client::ResilientClient;
pub use error::{ClientError, ClientResult, ErrorKind};
pub use retry::{parse_retry_after, RetryDecision, RetryPolicy, RetryState};
pub use schema::{parse_response, ResponseSchema, SchemaViolation};
pub use transport::{
    ApiRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError, TransportErrorKind,
};
