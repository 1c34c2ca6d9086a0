//! Classified errors for external calls
//!
//! Every failure of the resilient client ends up as exactly one of these
//! kinds. Messages are fixed summaries; upstream bodies are never included.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Terminal error of an external call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("network error: {detail}")]
    Network {
        detail: String,
        /// False when the connection was never established
        connected: bool,
    },

    #[error("rate limited by upstream")]
    RateLimited { retry_after: Option<Duration> },

    #[error("upstream service unavailable (HTTP {status})")]
    ServiceUnavailable {
        status: u16,
        retry_after: Option<Duration>,
    },

    #[error("authentication failed: check the API key")]
    Auth,

    #[error("permission denied: the API key lacks the required permission")]
    Permission,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unexpected upstream status (HTTP {0})")]
    UnexpectedStatus(u16),

    #[error("response failed validation: {0}")]
    ResponseValidation(String),
}

/// Fieldless mirror of [`ClientError`] for logging and matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    Network,
    RateLimited,
    ServiceUnavailable,
    Auth,
    Permission,
    InvalidRequest,
    UnexpectedStatus,
    ResponseValidation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Network => "network",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::Auth => "auth",
            ErrorKind::Permission => "permission",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::UnexpectedStatus => "unexpected_status",
            ErrorKind::ResponseValidation => "response_validation",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Timeout(_) => ErrorKind::Timeout,
            ClientError::Network { .. } => ErrorKind::Network,
            ClientError::RateLimited { .. } => ErrorKind::RateLimited,
            ClientError::ServiceUnavailable { .. } => ErrorKind::ServiceUnavailable,
            ClientError::Auth => ErrorKind::Auth,
            ClientError::Permission => ErrorKind::Permission,
            ClientError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ClientError::UnexpectedStatus(_) => ErrorKind::UnexpectedStatus,
            ClientError::ResponseValidation(_) => ErrorKind::ResponseValidation,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Timeout(_)
                | ClientError::Network { .. }
                | ClientError::RateLimited { .. }
                | ClientError::ServiceUnavailable { .. }
        )
    }

    /// True only when the failure proves the upstream never acted on the
    /// request, so a non-idempotent call may be sent again.
    pub fn request_not_processed(&self) -> bool {
        matches!(
            self,
            ClientError::RateLimited { .. } | ClientError::Network { connected: false, .. }
        )
    }

    /// Server-supplied retry hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ClientError::RateLimited { retry_after }
            | ClientError::ServiceUnavailable { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Generic text safe to show to an end user.
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Auth => "Exchange rejected the API key",
            ErrorKind::Permission => "API key is missing a required permission",
            ErrorKind::RateLimited => "Exchange is rate limiting requests, try again shortly",
            ErrorKind::Timeout | ErrorKind::Network | ErrorKind::ServiceUnavailable => {
                "Exchange is temporarily unreachable"
            }
            ErrorKind::InvalidRequest => "Request was rejected",
            ErrorKind::UnexpectedStatus | ErrorKind::ResponseValidation => {
                "Unexpected response from upstream service"
            }
        }
    }

    /// Map a non-success HTTP status to its fixed kind.
    ///
    /// Auth and permission statuses are matched before anything else, so an
    /// entry in `extra_retryable` can never turn them into retryable errors.
    pub fn from_status(
        status: u16,
        retry_after: Option<Duration>,
        extra_retryable: &[u16],
    ) -> Self {
        match status {
            401 => ClientError::Auth,
            403 => ClientError::Permission,
            429 => ClientError::RateLimited { retry_after },
            502..=504 => ClientError::ServiceUnavailable {
                status,
                retry_after,
            },
            s if extra_retryable.contains(&s) => ClientError::ServiceUnavailable {
                status,
                retry_after,
            },
            400..=499 => {
                ClientError::InvalidRequest(format!("upstream rejected request (HTTP {})", status))
            }
            _ => ClientError::UnexpectedStatus(status),
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ClientError::from_status(401, None, &[]), ClientError::Auth);
        assert_eq!(ClientError::from_status(403, None, &[]), ClientError::Permission);
        assert_eq!(ClientError::from_status(429, None, &[]).kind(), ErrorKind::RateLimited);
        for status in [502, 503, 504] {
            assert_eq!(
                ClientError::from_status(status, None, &[]).kind(),
                ErrorKind::ServiceUnavailable
            );
        }
        assert_eq!(ClientError::from_status(404, None, &[]).kind(), ErrorKind::InvalidRequest);
        assert_eq!(ClientError::from_status(500, None, &[]), ClientError::UnexpectedStatus(500));
        assert_eq!(ClientError::from_status(302, None, &[]), ClientError::UnexpectedStatus(302));
    }

    #[test]
    fn test_override_cannot_mask_auth() {
        let overrides = [401, 403, 500];
        assert_eq!(ClientError::from_status(401, None, &overrides), ClientError::Auth);
        assert_eq!(ClientError::from_status(403, None, &overrides), ClientError::Permission);
        assert!(ClientError::from_status(500, None, &overrides).is_retryable());
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ClientError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(ClientError::RateLimited { retry_after: None }.is_retryable());
        assert!(!ClientError::Auth.is_retryable());
        assert!(!ClientError::Permission.is_retryable());
        assert!(!ClientError::InvalidRequest("x".into()).is_retryable());
        assert!(!ClientError::ResponseValidation("x".into()).is_retryable());
        assert!(!ClientError::UnexpectedStatus(500).is_retryable());
    }

    #[test]
    fn test_request_not_processed() {
        let refused = ClientError::Network {
            detail: "connection refused".into(),
            connected: false,
        };
        let reset = ClientError::Network {
            detail: "connection reset".into(),
            connected: true,
        };
        assert!(refused.request_not_processed());
        assert!(!reset.request_not_processed());
        assert!(!ClientError::Timeout(Duration::from_secs(1)).request_not_processed());
        assert!(ClientError::RateLimited { retry_after: None }.request_not_processed());
    }

    #[test]
    fn test_retry_after_passthrough() {
        let hint = Some(Duration::from_secs(7));
        assert_eq!(ClientError::from_status(429, hint, &[]).retry_after(), hint);
        assert_eq!(ClientError::from_status(503, hint, &[]).retry_after(), hint);
        assert_eq!(ClientError::Auth.retry_after(), None);
    }

    #[test]
    fn test_messages_are_fixed() {
        assert_eq!(
            ClientError::Auth.to_string(),
            "authentication failed: check the API key"
        );
        assert_eq!(ErrorKind::Auth.to_string(), "auth");
    }
}
