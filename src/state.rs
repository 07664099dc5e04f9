//! Conversions between JSON state and typed resource models.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::ProviderError;

/// Remove null members from objects, recursively.
///
/// Hosts send unset attributes as null; serde fills those from defaults only
/// when the member is absent.
pub fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nulls).collect()),
        other => other,
    }
}

/// Deserialize a typed model from JSON state.
pub fn from_state<T: DeserializeOwned>(state: &Value) -> Result<T, ProviderError> {
    let value = match state {
        Value::Null => Value::Object(Default::default()),
        other => strip_nulls(other.clone()),
    };
    Ok(serde_json::from_value(value)?)
}

/// Serialize a typed model into JSON state.
pub fn to_state<T: Serialize>(model: &T) -> Result<Value, ProviderError> {
    Ok(serde_json::to_value(model)?)
}

/// The non-empty `id` attribute of a state object.
pub fn require_id(state: &Value) -> Result<&str, ProviderError> {
    match state.get("id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(ProviderError::InvalidRequest(
            "state has no \"id\" attribute".to_string(),
        )),
    }
}
