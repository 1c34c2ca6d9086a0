//! Ciphertext wire formats
//!
//! Every token is parsed into a typed shape before any cryptographic work:
//!
//! | fields | shape                                     |
//! |--------|-------------------------------------------|
//! | 3      | legacy `iv:cipher:tag`                    |
//! | 5      | versioned `v1:keyId:iv:cipher:tag`        |
//! | 6      | two legacy tokens (read-only back-compat) |
//! | 10     | two versioned tokens (read-only)          |
//!
//! Anything else is rejected up front.

use std::fmt;
use std::str::FromStr;

use super::error::DecryptionError;

pub const IV_LENGTH: usize = 16;
pub const TAG_LENGTH: usize = 16;

const SEPARATOR: char = ':';

/// Wire format version of a versioned token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatVersion {
    V1,
}

impl FormatVersion {
    /// Version written by new encryptions.
    pub const CURRENT: FormatVersion = FormatVersion::V1;

    pub fn as_str(&self) -> &'static str {
        match self {
            FormatVersion::V1 => "v1",
        }
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormatVersion {
    type Err = DecryptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "v1" => Ok(FormatVersion::V1),
            other => Err(DecryptionError::UnsupportedVersion(other.to_string())),
        }
    }
}

/// IV, ciphertext body and authentication tag of one AEAD encryption.
#[derive(Clone, PartialEq, Eq)]
pub struct SealedBox {
    pub iv: [u8; IV_LENGTH],
    pub data: Vec<u8>,
    pub tag: [u8; TAG_LENGTH],
}

impl SealedBox {
    fn parse(iv_hex: &str, data_hex: &str, tag_hex: &str) -> Result<Self, DecryptionError> {
        let iv = hex::decode(iv_hex).map_err(|_| DecryptionError::InvalidEncoding("iv"))?;
        let data =
            hex::decode(data_hex).map_err(|_| DecryptionError::InvalidEncoding("ciphertext"))?;
        let tag = hex::decode(tag_hex).map_err(|_| DecryptionError::InvalidEncoding("tag"))?;

        let iv: [u8; IV_LENGTH] = iv
            .as_slice()
            .try_into()
            .map_err(|_| DecryptionError::InvalidIvLength(iv.len()))?;
        let tag: [u8; TAG_LENGTH] = tag
            .as_slice()
            .try_into()
            .map_err(|_| DecryptionError::InvalidTagLength(tag.len()))?;

        Ok(Self { iv, data, tag })
    }
}

impl fmt::Display for SealedBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            hex::encode(self.iv),
            hex::encode(&self.data),
            hex::encode(self.tag)
        )
    }
}

impl fmt::Debug for SealedBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealedBox")
            .field("iv", &hex::encode(self.iv))
            .field("data_len", &self.data.len())
            .finish()
    }
}

/// A single encrypted secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ciphertext {
    /// Three-field token under an unnamed key
    Legacy(SealedBox),
    /// Five-field token naming its key
    Versioned {
        version: FormatVersion,
        key_id: String,
        sealed: SealedBox,
    },
}

impl Ciphertext {
    pub fn sealed(&self) -> &SealedBox {
        match self {
            Ciphertext::Legacy(sealed) => sealed,
            Ciphertext::Versioned { sealed, .. } => sealed,
        }
    }

    pub fn key_id(&self) -> Option<&str> {
        match self {
            Ciphertext::Legacy(_) => None,
            Ciphertext::Versioned { key_id, .. } => Some(key_id),
        }
    }

    pub fn version(&self) -> Option<FormatVersion> {
        match self {
            Ciphertext::Legacy(_) => None,
            Ciphertext::Versioned { version, .. } => Some(*version),
        }
    }

    /// True when the token is already in the current format under `primary_id`.
    pub fn is_current(&self, primary_id: &str) -> bool {
        self.version() == Some(FormatVersion::CURRENT) && self.key_id() == Some(primary_id)
    }

    fn from_fields(fields: &[&str]) -> Result<Self, DecryptionError> {
        match fields {
            [iv, data, tag] => Ok(Ciphertext::Legacy(SealedBox::parse(iv, data, tag)?)),
            [version, key_id, iv, data, tag] => {
                let version = version.parse()?;
                Ok(Ciphertext::Versioned {
                    version,
                    key_id: key_id.to_string(),
                    sealed: SealedBox::parse(iv, data, tag)?,
                })
            }
            _ => Err(DecryptionError::InvalidFormat),
        }
    }
}

impl fmt::Display for Ciphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ciphertext::Legacy(sealed) => write!(f, "{}", sealed),
            Ciphertext::Versioned {
                version,
                key_id,
                sealed,
            } => write!(f, "{}:{}:{}", version, key_id, sealed),
        }
    }
}

impl FromStr for Ciphertext {
    type Err = DecryptionError;

    /// Parse a single 3- or 5-field token.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.trim().split(SEPARATOR).collect();
        Ciphertext::from_fields(&fields)
    }
}

/// Any accepted token shape, including the read-only composite pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenShape {
    Single(Ciphertext),
    /// Key id and secret sealed separately, in that order
    Pair(Ciphertext, Ciphertext),
}

impl TokenShape {
    pub fn parse(s: &str) -> Result<Self, DecryptionError> {
        let fields: Vec<&str> = s.trim().split(SEPARATOR).collect();
        match fields.len() {
            3 | 5 => Ok(TokenShape::Single(Ciphertext::from_fields(&fields)?)),
            6 | 10 => {
                let (first, second) = fields.split_at(fields.len() / 2);
                Ok(TokenShape::Pair(
                    Ciphertext::from_fields(first)?,
                    Ciphertext::from_fields(second)?,
                ))
            }
            _ => Err(DecryptionError::InvalidFormat),
        }
    }
}
