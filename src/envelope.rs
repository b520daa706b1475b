//! Case-insensitive decoding of response bodies.
//!
//! The remote source is not consistent about key casing (`hasMore`,
//! `HasMore`, `ITEMS`, ...). Rather than teach every model about every
//! casing, the body is parsed into a `serde_json::Value`, every object key is
//! folded to lowercase, and the result is deserialized into models whose
//! field names are lowercase.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::RemoteEnvelope;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("body is not valid JSON: {0}")]
    Syntax(#[source] serde_json::Error),
    #[error("body does not match the expected shape: {0}")]
    Shape(#[source] serde_json::Error),
}

/// Decode a success body as a [`RemoteEnvelope`].
pub fn decode_envelope<I: DeserializeOwned>(body: &[u8]) -> Result<RemoteEnvelope<I>, DecodeError> {
    let raw: Value = serde_json::from_slice(body).map_err(DecodeError::Syntax)?;
    serde_json::from_value(fold_keys(raw)).map_err(DecodeError::Shape)
}

/// Decode a list of items stored either as a bare JSON array or wrapped in
/// an envelope.
pub fn decode_items<I: DeserializeOwned>(body: &[u8]) -> Result<Vec<I>, DecodeError> {
    let raw: Value = serde_json::from_slice(body).map_err(DecodeError::Syntax)?;
    match fold_keys(raw) {
        list @ Value::Array(_) => serde_json::from_value(list).map_err(DecodeError::Shape),
        other => serde_json::from_value::<RemoteEnvelope<I>>(other)
            .map(|env| env.items)
            .map_err(DecodeError::Shape),
    }
}

/// Lowercase every object key, recursively. On a collision after folding
/// the later key wins.
fn fold_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let folded: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), fold_keys(v)))
                .collect();
            Value::Object(folded)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(fold_keys).collect()),
        other => other,
    }
}
