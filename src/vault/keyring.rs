//! Keyring loading
//!
//! Resolves the set of symmetric keys available to the process and which of
//! them is primary. Two configuration modes are supported, in precedence
//! order:
//!
//! - **Multi-key**: `ENCRYPTION_KEYS` holds a JSON object of `keyId -> hex key`
//!   and `ENCRYPTION_PRIMARY_KEY_ID` names the key used for new encryptions.
//! - **Single-key (legacy)**: `ENCRYPTION_KEY` holds one hex key, registered
//!   under the reserved id [`LEGACY_KEY_ID`] and used as primary.
//!
//! Nothing is cached: a [`KeySource`] is read and resolved on every logical
//! operation so a redeploy with a new primary takes effect immediately.

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::error::ConfigurationError;

/// Reserved key id for the single-key configuration mode.
pub const LEGACY_KEY_ID: &str = "legacy";

/// Key length in bytes (AES-256).
pub const KEY_LENGTH: usize = 32;

pub const ENV_KEYS: &str = "ENCRYPTION_KEYS";
pub const ENV_PRIMARY_KEY_ID: &str = "ENCRYPTION_PRIMARY_KEY_ID";
pub const ENV_LEGACY_KEY: &str = "ENCRYPTION_KEY";

/// 32 bytes of key material. Zeroized on drop, redacted in `Debug`.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial([u8; KEY_LENGTH]);

impl KeyMaterial {
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Parse a 64-character hex key. `source_name` only feeds error messages.
    pub fn from_hex(value: &str, source_name: &str) -> Result<Self, ConfigurationError> {
        if value.len() != KEY_LENGTH * 2 {
            return Err(ConfigurationError::InvalidKeyLength {
                source_name: source_name.to_string(),
            });
        }

        let mut bytes = [0u8; KEY_LENGTH];
        hex::decode_to_slice(value, &mut bytes).map_err(|_| {
            ConfigurationError::InvalidKeyHex {
                source_name: source_name.to_string(),
            }
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }

    /// Short SHA-256 fingerprint, safe to display.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        hex::encode(&digest[..8])
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyMaterial(<redacted>)")
    }
}

/// Generate a fresh random key as 64 lowercase hex characters.
pub fn generate_key() -> String {
    let mut bytes = [0u8; KEY_LENGTH];
    OsRng.fill_bytes(&mut bytes);
    let encoded = hex::encode(bytes);
    bytes.zeroize();
    encoded
}

/// Resolved set of keys plus the primary designation.
#[derive(Clone, Debug)]
pub struct Keyring {
    keys: BTreeMap<String, KeyMaterial>,
    primary: String,
}

impl Keyring {
    /// Build a keyring from already-parsed material.
    pub fn new(
        keys: BTreeMap<String, KeyMaterial>,
        primary: impl Into<String>,
    ) -> Result<Self, ConfigurationError> {
        let primary = primary.into();
        if keys.is_empty() {
            return Err(ConfigurationError::EmptyKeyring);
        }
        for id in keys.keys() {
            validate_key_id(id)?;
        }
        if !keys.contains_key(&primary) {
            return Err(ConfigurationError::PrimaryNotFound(primary));
        }
        Ok(Self { keys, primary })
    }

    /// Single-key keyring under [`LEGACY_KEY_ID`].
    pub fn legacy(key: KeyMaterial) -> Self {
        let mut keys = BTreeMap::new();
        keys.insert(LEGACY_KEY_ID.to_string(), key);
        Self {
            keys,
            primary: LEGACY_KEY_ID.to_string(),
        }
    }

    pub fn primary_id(&self) -> &str {
        &self.primary
    }

    pub fn primary_key(&self) -> &KeyMaterial {
        // Constructors guarantee the primary id is present.
        &self.keys[&self.primary]
    }

    pub fn get(&self, key_id: &str) -> Option<&KeyMaterial> {
        self.keys.get(key_id)
    }

    pub fn contains(&self, key_id: &str) -> bool {
        self.keys.contains_key(key_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &KeyMaterial)> {
        self.keys.iter().map(|(id, key)| (id.as_str(), key))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn fingerprint(&self, key_id: &str) -> Option<String> {
        self.keys.get(key_id).map(KeyMaterial::fingerprint)
    }
}

fn validate_key_id(id: &str) -> Result<(), ConfigurationError> {
    if id.trim().is_empty() || id.contains(':') {
        return Err(ConfigurationError::InvalidKeyId(id.to_string()));
    }
    Ok(())
}

/// Raw key configuration, as read from the environment or supplied directly.
#[derive(Clone, Default)]
pub struct KeySource {
    /// JSON object of key id to hex key
    pub keys_json: Option<String>,
    /// Primary key id for multi-key mode
    pub primary_key_id: Option<String>,
    /// Single legacy hex key
    pub legacy_key: Option<String>,
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySource")
            .field("keys_json", &self.keys_json.as_ref().map(|_| "<redacted>"))
            .field("primary_key_id", &self.primary_key_id)
            .field("legacy_key", &self.legacy_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl KeySource {
    /// Read the current process environment. Blank values count as unset.
    pub fn from_env() -> Self {
        fn read(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.trim().is_empty())
        }

        Self {
            keys_json: read(ENV_KEYS),
            primary_key_id: read(ENV_PRIMARY_KEY_ID),
            legacy_key: read(ENV_LEGACY_KEY),
        }
    }

    /// Single-key legacy configuration.
    pub fn single(key_hex: impl Into<String>) -> Self {
        Self {
            legacy_key: Some(key_hex.into()),
            ..Self::default()
        }
    }

    /// Multi-key configuration from a JSON map.
    pub fn multi(keys_json: impl Into<String>, primary_key_id: Option<&str>) -> Self {
        Self {
            keys_json: Some(keys_json.into()),
            primary_key_id: primary_key_id.map(str::to_string),
            legacy_key: None,
        }
    }

    /// Multi-key configuration from `(id, hex)` pairs.
    pub fn from_pairs<'a>(
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
        primary_key_id: &str,
    ) -> Self {
        let map: serde_json::Map<String, serde_json::Value> = pairs
            .into_iter()
            .map(|(id, key)| (id.to_string(), serde_json::Value::String(key.to_string())))
            .collect();
        Self::multi(serde_json::Value::Object(map).to_string(), Some(primary_key_id))
    }

    /// Resolve into a [`Keyring`]. Multi-key mode wins when both are set.
    pub fn resolve(&self) -> Result<Keyring, ConfigurationError> {
        if let Some(keys_json) = &self.keys_json {
            return self.resolve_multi(keys_json);
        }

        let legacy = self
            .legacy_key
            .as_deref()
            .ok_or(ConfigurationError::NoKeySource)?;
        let key = KeyMaterial::from_hex(legacy.trim(), ENV_LEGACY_KEY)?;
        Ok(Keyring::legacy(key))
    }

    fn resolve_multi(&self, keys_json: &str) -> Result<Keyring, ConfigurationError> {
        let parsed: serde_json::Value = serde_json::from_str(keys_json)
            .map_err(|_| ConfigurationError::InvalidKeyMap("not valid JSON".to_string()))?;

        let object = parsed
            .as_object()
            .ok_or_else(|| ConfigurationError::InvalidKeyMap("not a JSON object".to_string()))?;

        let mut keys = BTreeMap::new();
        for (key_id, value) in object {
            validate_key_id(key_id)?;
            let hex_key = value.as_str().ok_or_else(|| {
                ConfigurationError::InvalidKeyMap(format!("value for {} must be a string", key_id))
            })?;
            let source_name = format!("{}[{}]", ENV_KEYS, key_id);
            keys.insert(key_id.clone(), KeyMaterial::from_hex(hex_key, &source_name)?);
        }

        if keys.is_empty() {
            return Err(ConfigurationError::EmptyKeyring);
        }

        let primary = match self.primary_key_id.as_deref().map(str::trim) {
            Some(id) => id.to_string(),
            None if keys.len() == 1 => keys.keys().next().cloned().unwrap_or_default(),
            None => return Err(ConfigurationError::PrimaryNotSpecified),
        };

        Keyring::new(keys, primary)
    }
}
