//! Crate-level error type

use thiserror::Error;

use crate::common::ClientError;
use crate::vault::{CredentialError, VaultError};

/// Any failure surfaced by the library.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl Error {
    /// Stable short label for logs and API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Vault(err) if err.is_configuration() => "configuration",
            Error::Vault(_) => "decryption",
            Error::Credential(err) => err.kind(),
            Error::Client(err) => err.kind().as_str(),
        }
    }

    /// Generic text safe to show to an end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Error::Vault(err) if err.is_configuration() => "Server encryption is not configured",
            Error::Vault(_) => "Stored credential could not be read",
            Error::Credential(err) => err.user_message(),
            Error::Client(err) => err.user_message(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
