//! Response schema validation
//!
//! A response type describes its expected shape twice: structurally through
//! serde (field names and JSON types) and semantically through
//! [`ResponseSchema::validate`] (signs, ranges, non-empty identifiers).
//! Only a value that passes both crosses into business logic.

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::fmt;

use super::error::ClientError;

/// A semantic rule broken by an otherwise well-formed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    pub field: String,
    pub reason: String,
}

impl SchemaViolation {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Prefix the field path, e.g. `bids[0]` + `price` -> `bids[0].price`.
    pub fn within(self, parent: impl fmt::Display) -> Self {
        Self {
            field: format!("{}.{}", parent, self.field),
            reason: self.reason,
        }
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// A response type with a declared, checkable shape.
pub trait ResponseSchema: DeserializeOwned {
    /// Name used in validation error messages.
    const NAME: &'static str;

    fn validate(&self) -> Result<(), SchemaViolation> {
        Ok(())
    }
}

impl<T: ResponseSchema> ResponseSchema for Vec<T> {
    const NAME: &'static str = T::NAME;

    fn validate(&self) -> Result<(), SchemaViolation> {
        for (index, item) in self.iter().enumerate() {
            item.validate().map_err(|v| v.within(format!("[{}]", index)))?;
        }
        Ok(())
    }
}

/// Parse and validate a response body.
///
/// Error messages carry the schema name and the failing location only, never
/// fragments of the body.
pub fn parse_response<T: ResponseSchema>(body: &[u8]) -> Result<T, ClientError> {
    let value: T = serde_json::from_slice(body).map_err(|err| {
        ClientError::ResponseValidation(format!(
            "{}: {:?} error at line {} column {}",
            T::NAME,
            err.classify(),
            err.line(),
            err.column()
        ))
    })?;

    value
        .validate()
        .map_err(|violation| {
            ClientError::ResponseValidation(format!("{}: {}", T::NAME, violation))
        })?;

    Ok(value)
}

pub fn ensure_non_negative(field: &str, value: Decimal) -> Result<(), SchemaViolation> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(SchemaViolation::new(field, "must not be negative"));
    }
    Ok(())
}

pub fn ensure_positive(field: &str, value: Decimal) -> Result<(), SchemaViolation> {
    if value <= Decimal::ZERO {
        return Err(SchemaViolation::new(field, "must be positive"));
    }
    Ok(())
}

pub fn ensure_finite_positive(field: &str, value: f64) -> Result<(), SchemaViolation> {
    if !value.is_finite() || value <= 0.0 {
        return Err(SchemaViolation::new(field, "must be a finite positive number"));
    }
    Ok(())
}

pub fn ensure_not_blank(field: &str, value: &str) -> Result<(), SchemaViolation> {
    if value.trim().is_empty() {
        return Err(SchemaViolation::new(field, "must not be empty"));
    }
    Ok(())
}
