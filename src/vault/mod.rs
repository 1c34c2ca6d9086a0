//! Credential Vault
//!
//! Authenticated, versioned encryption of long-lived exchange credentials.
//!
//! # Features
//!
//! - **AES-256-GCM**: 16-byte random IV, 128-bit tag, every segment authenticated
//! - **Multi-key keyring**: new tokens name the key that sealed them
//! - **Lazy rotation**: tokens under a retired key or an older format are
//!   re-sealed under the current primary on read
//! - **Back-compat**: legacy 3-field tokens and composite key/secret pairs
//!
//! # Example
//!
//! ```
//! use dca_core::vault::{KeySource, Vault};
//!
//! let old_key = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
//! let new_key = "fedcba9876543210fedcba9876543210fedcba9876543210fedcba9876543210";
//!
//! let before = Vault::new(KeySource::from_pairs([("a", old_key)], "a").resolve().unwrap());
//! let token = before.encrypt("key-id.secret").unwrap().to_string();
//!
//! let after = Vault::new(
//!     KeySource::from_pairs([("a", old_key), ("b", new_key)], "b").resolve().unwrap(),
//! );
//! let opened = after.rotate_if_needed(&token).unwrap();
//! assert_eq!(opened.plaintext.expose(), "key-id.secret");
//! assert_eq!(opened.rotated.unwrap().key_id(), Some("b"));
//! ```

pub mod cipher;
pub mod ciphertext;
pub mod error;
pub mod keyring;
pub mod secret;

pub use ciphertext::{Ciphertext, FormatVersion, SealedBox, TokenShape};
pub use error::{ConfigurationError, CredentialError, DecryptionError, VaultError, VaultResult};
pub use keyring::{generate_key, KeyMaterial, KeySource, Keyring, LEGACY_KEY_ID};
pub use secret::SecretString;

use tracing::{debug, info, warn};

/// Request header carrying the encrypted credential.
pub const ENCRYPTED_API_KEY_HEADER: &str = "X-Encrypted-Api-Key";

/// Response header carrying a rotated ciphertext for the caller to persist.
pub const ROTATED_API_KEY_HEADER: &str = "X-Rotated-Api-Key";

/// Separator between API key id and secret in the composite credential.
pub const CREDENTIAL_SEPARATOR: char = '.';

/// Result of opening a token.
#[derive(Debug, Clone)]
pub struct Opened {
    pub plaintext: SecretString,
    /// New token under the current primary, if the input was not already current
    pub rotated: Option<Ciphertext>,
}

/// Encrypt/decrypt/rotate over one resolved keyring.
///
/// Build one per logical operation from a freshly resolved [`KeySource`]; the
/// vault holds no other state, so concurrent use needs no locking.
#[derive(Debug, Clone)]
pub struct Vault {
    keyring: Keyring,
}

impl Vault {
    pub fn new(keyring: Keyring) -> Self {
        Self { keyring }
    }

    /// Resolve the process environment and build a vault from it.
    pub fn from_env() -> VaultResult<Self> {
        Ok(Self::new(KeySource::from_env().resolve()?))
    }

    pub fn keyring(&self) -> &Keyring {
        &self.keyring
    }

    /// Seal `plaintext` under the primary key in the current versioned format.
    pub fn encrypt(&self, plaintext: &str) -> VaultResult<Ciphertext> {
        let sealed = cipher::seal(self.keyring.primary_key(), plaintext.as_bytes());
        Ok(Ciphertext::Versioned {
            version: FormatVersion::CURRENT,
            key_id: self.keyring.primary_id().to_string(),
            sealed,
        })
    }

    /// Parse and decrypt a single 3- or 5-field token.
    pub fn decrypt(&self, token: &str) -> VaultResult<SecretString> {
        let ciphertext: Ciphertext = token.parse()?;
        self.decrypt_ciphertext(&ciphertext)
    }

    pub fn decrypt_ciphertext(&self, ciphertext: &Ciphertext) -> VaultResult<SecretString> {
        let bytes = match ciphertext {
            Ciphertext::Versioned { key_id, sealed, .. } => {
                let key = self
                    .keyring
                    .get(key_id)
                    .ok_or_else(|| DecryptionError::UnknownKeyId(key_id.clone()))?;
                cipher::open(key, sealed)?
            }
            Ciphertext::Legacy(sealed) => self.open_legacy(sealed)?,
        };

        String::from_utf8(bytes)
            .map(SecretString::from)
            .map_err(|_| DecryptionError::InvalidUtf8.into())
    }

    /// Legacy tokens carry no key id: prefer the reserved legacy key, else try
    /// every key. Cost grows with keyring size; legacy tokens are transitional.
    fn open_legacy(&self, sealed: &SealedBox) -> Result<Vec<u8>, DecryptionError> {
        if let Some(key) = self.keyring.get(LEGACY_KEY_ID) {
            return cipher::open(key, sealed);
        }

        for (key_id, key) in self.keyring.iter() {
            if let Ok(bytes) = cipher::open(key, sealed) {
                debug!(key_id, "Legacy ciphertext matched keyring entry");
                return Ok(bytes);
            }
        }

        Err(DecryptionError::NoMatchingKey)
    }

    /// Decrypt and, unless already current, re-seal under the primary key.
    pub fn rotate_if_needed(&self, token: &str) -> VaultResult<Opened> {
        let ciphertext: Ciphertext = token.parse()?;
        let plaintext = self.decrypt_ciphertext(&ciphertext)?;

        if ciphertext.is_current(self.keyring.primary_id()) {
            return Ok(Opened {
                plaintext,
                rotated: None,
            });
        }

        let rotated = self.encrypt(plaintext.expose())?;
        if rotated == ciphertext {
            return Ok(Opened {
                plaintext,
                rotated: None,
            });
        }

        info!(
            from_key = ciphertext.key_id().unwrap_or("<legacy>"),
            to_key = self.keyring.primary_id(),
            "Rotated ciphertext onto primary key"
        );
        Ok(Opened {
            plaintext,
            rotated: Some(rotated),
        })
    }

    /// Open a stored credential token, including the composite pair shapes
    /// written by older releases.
    ///
    /// Composite shapes are only considered after the single-token path
    /// fails. They are always rotated into one single-token ciphertext.
    pub fn open_credential(&self, token: &str) -> VaultResult<Opened> {
        let primary_error = match self.rotate_if_needed(token) {
            Ok(opened) => return Ok(opened),
            Err(err) => err,
        };

        let (key_part, secret_part) = match TokenShape::parse(token) {
            Ok(TokenShape::Pair(key_part, secret_part)) => (key_part, secret_part),
            _ => return Err(primary_error),
        };

        let key_id = self.decrypt_ciphertext(&key_part)?;
        let secret = self.decrypt_ciphertext(&secret_part)?;
        let combined = SecretString::new(format!(
            "{}{}{}",
            key_id.expose(),
            CREDENTIAL_SEPARATOR,
            secret.expose()
        ));

        let rotated = self.encrypt(combined.expose())?;
        info!(
            to_key = self.keyring.primary_id(),
            "Collapsed composite credential into a single ciphertext"
        );
        Ok(Opened {
            plaintext: combined,
            rotated: Some(rotated),
        })
    }

    /// Open the value of an inbound encrypted-credential header.
    ///
    /// A missing or blank header is [`CredentialError::Missing`]; anything
    /// that fails after that is [`CredentialError::Vault`].
    pub fn open_credential_header(&self, header: Option<&str>) -> Result<Opened, CredentialError> {
        let token = header
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(CredentialError::Missing)?;

        self.open_credential(token).map_err(|err| {
            warn!(kind = "credential", error = %err, "Failed to open credential header");
            CredentialError::Vault(err)
        })
    }
}
