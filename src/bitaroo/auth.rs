//! Authentication for the Bitaroo API
//!
//! Bitaroo issues API keys as `keyId.secret` and expects the whole string as a
//! bearer token.

use std::fmt;

use crate::vault::{SecretString, CREDENTIAL_SEPARATOR};

/// Environment variable holding a plaintext API key for CLI use.
pub const ENV_API_KEY: &str = "BITAROO_API_KEY";

/// Plaintext exchange API key, zeroized on drop.
#[derive(Clone)]
pub struct ApiCredential {
    token: SecretString,
}

impl ApiCredential {
    pub fn new(token: impl Into<SecretString>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Join a key id and its secret with the `.` separator.
    pub fn from_parts(key_id: &str, secret: &str) -> Self {
        Self::new(format!("{}{}{}", key_id, CREDENTIAL_SEPARATOR, secret))
    }

    /// Create credentials from environment variables
    ///
    /// Looks for `BITAROO_API_KEY`
    pub fn from_env() -> Result<Self, std::env::VarError> {
        let token = std::env::var(ENV_API_KEY)?;
        Ok(Self::new(token))
    }

    /// Public key id part, if the key has the `keyId.secret` shape.
    pub fn key_id(&self) -> Option<&str> {
        self.split().map(|(key_id, _)| key_id)
    }

    /// Split into key id and secret at the first separator.
    pub fn split(&self) -> Option<(&str, &str)> {
        self.token
            .expose()
            .split_once(CREDENTIAL_SEPARATOR)
            .filter(|(key_id, secret)| !key_id.is_empty() && !secret.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.token.expose().trim().is_empty()
    }

    pub(crate) fn bearer(&self) -> SecretString {
        self.token.clone()
    }
}

impl From<SecretString> for ApiCredential {
    fn from(token: SecretString) -> Self {
        Self::new(token)
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("key_id", &self.key_id().unwrap_or("<unknown>"))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split() {
        let credential = ApiCredential::new("abc123.s3cr3t.with.dots");
        assert_eq!(credential.split(), Some(("abc123", "s3cr3t.with.dots")));
        assert_eq!(credential.key_id(), Some("abc123"));
    }

    #[test]
    fn test_split_rejects_malformed() {
        assert_eq!(ApiCredential::new("no-separator").split(), None);
        assert_eq!(ApiCredential::new(".secret").split(), None);
        assert_eq!(ApiCredential::new("id.").split(), None);
    }

    #[test]
    fn test_from_parts() {
        let credential = ApiCredential::from_parts("id", "secret");
        assert_eq!(credential.bearer().expose(), "id.secret");
    }

    #[test]
    fn test_debug_shows_only_key_id() {
        let printed = format!("{:?}", ApiCredential::new("abc123.s3cr3t"));
        assert!(printed.contains("abc123"));
        assert!(!printed.contains("s3cr3t"));
    }

    #[test]
    fn test_empty() {
        assert!(ApiCredential::new("  ").is_empty());
        assert!(!ApiCredential::new("a.b").is_empty());
    }
}
