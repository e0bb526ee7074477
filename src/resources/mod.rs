//! Resource and data source implementations.
//!
//! Each submodule owns one dbt Cloud object type: its schema, how planning
//! treats it, and how state maps onto [`DbtCloudClient`](crate::client::DbtCloudClient)
//! calls.

pub mod extended_attributes;
pub mod job;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::client::ClientError;
use crate::error::ProviderError;
use crate::schema::Schema;
use crate::validation::validate;

/// Deserialize a state or config document, treating null attributes as unset.
pub(crate) fn decode<T: DeserializeOwned>(value: &Value) -> Result<T, ProviderError> {
    let mut cleaned = value.clone();
    if let Value::Object(map) = &mut cleaned {
        map.retain(|_, v| !v.is_null());
    }
    Ok(serde_json::from_value(cleaned)?)
}

/// Serialize a state document.
pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Value, ProviderError> {
    Ok(serde_json::to_value(value)?)
}

/// Validate `config` and turn the first error into a [`ProviderError`].
pub(crate) fn ensure_valid(schema: &Schema, config: &Value) -> Result<(), ProviderError> {
    let diagnostics = validate(schema, config);
    let Some(first) = diagnostics.into_iter().find(|d| d.is_error()) else {
        return Ok(());
    };
    let message = match first.detail {
        Some(detail) => format!("{}: {}", first.summary, detail),
        None => first.summary,
    };
    Err(match first.attribute {
        Some(attribute) => ProviderError::InvalidAttribute { attribute, message },
        None => ProviderError::Validation(message),
    })
}

/// Read an integer id out of a state document.
pub(crate) fn state_id(state: &Value, key: &str) -> Result<i64, ProviderError> {
    state
        .get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| ProviderError::InvalidRequest(format!("state has no '{}'", key)))
}

/// Map a client "not found" to `None`, for reads that detect deletion.
pub(crate) fn found<T>(result: Result<T, ClientError>) -> Result<Option<T>, ProviderError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ClientError::NotFound(_)) => Ok(None),
        Err(err) => Err(err.into()),
    }
}
