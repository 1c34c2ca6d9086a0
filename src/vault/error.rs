//! Vault error types
//!
//! Configuration problems and decryption failures are kept apart: the first is
//! an operator problem that no retry fixes, the second is a per-token failure.

use thiserror::Error;

/// Key configuration could not be resolved into a usable keyring.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("no encryption key configured: set ENCRYPTION_KEYS or ENCRYPTION_KEY")]
    NoKeySource,

    #[error("{source_name} must be a 64-character hex string (32 bytes)")]
    InvalidKeyLength { source_name: String },

    #[error("{source_name} must be a hex string")]
    InvalidKeyHex { source_name: String },

    #[error("ENCRYPTION_KEYS must be a JSON object map of keyId to 64-char hex: {0}")]
    InvalidKeyMap(String),

    #[error("invalid key id {0:?}: key ids must be non-empty and must not contain ':'")]
    InvalidKeyId(String),

    #[error("ENCRYPTION_KEYS must include at least one key")]
    EmptyKeyring,

    #[error("ENCRYPTION_PRIMARY_KEY_ID {0:?} not found in ENCRYPTION_KEYS")]
    PrimaryNotFound(String),

    #[error("ENCRYPTION_PRIMARY_KEY_ID is required when more than one key is configured")]
    PrimaryNotSpecified,
}

/// A ciphertext could not be turned back into plaintext.
///
/// Messages name the failing check only; they never echo token contents.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecryptionError {
    #[error("invalid encrypted data format")]
    InvalidFormat,

    #[error("invalid hex encoding in {0} field")]
    InvalidEncoding(&'static str),

    #[error("invalid IV length: expected 16 bytes, got {0}")]
    InvalidIvLength(usize),

    #[error("invalid auth tag length: expected 16 bytes, got {0}")]
    InvalidTagLength(usize),

    #[error("unsupported encrypted data version {0:?}")]
    UnsupportedVersion(String),

    #[error("encryption key {0:?} not found")]
    UnknownKeyId(String),

    #[error("no configured key could decrypt the legacy ciphertext")]
    NoMatchingKey,

    #[error("authentication failed: ciphertext was tampered with or the key is wrong")]
    AuthenticationFailed,

    #[error("decrypted plaintext is not valid UTF-8")]
    InvalidUtf8,
}

/// Any failure surfaced by a vault operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("decryption error: {0}")]
    Decryption(#[from] DecryptionError),
}

impl VaultError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    pub fn is_decryption(&self) -> bool {
        matches!(self, Self::Decryption(_))
    }
}

/// Failure to obtain a usable credential from an inbound encrypted header.
///
/// `Missing` and `Vault` are distinct kinds even though both present the same
/// uninformative message to end users.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("encrypted API key header is missing")]
    Missing,

    #[error(transparent)]
    Vault(#[from] VaultError),
}

impl CredentialError {
    /// Text safe to show to an end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Missing => "API key required",
            Self::Vault(VaultError::Configuration(_)) => "Server configuration error",
            Self::Vault(VaultError::Decryption(_)) => "API key could not be read",
        }
    }

    /// Stable tag for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Missing => "credential_missing",
            Self::Vault(VaultError::Configuration(_)) => "configuration_error",
            Self::Vault(VaultError::Decryption(_)) => "decryption_error",
        }
    }
}

pub type VaultResult<T> = Result<T, VaultError>;
