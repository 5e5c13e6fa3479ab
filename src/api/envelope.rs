//! Response envelope decoding.
//!
//! Every service response has the shape `{status, data?, message?}`. Anything
//! other than an explicit `"success"` status is a failure, and `message` is the
//! text surfaced to the caller.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::ApiError;

/// Raw HTTP response handed back by a transport
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Parse the body as JSON; an empty body is `null`
    pub fn json(&self) -> Result<Value, ApiError> {
        if self.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&self.body)
            .map_err(|e| ApiError::transport(format!("Malformed response body: {}", e)))
    }
}

/// Server-provided `message`, if any
pub fn message_of(body: &Value) -> Option<String> {
    body.get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.trim().is_empty())
        .map(str::to_string)
}

/// Whether the envelope carries a status other than success
fn has_failure_status(body: &Value) -> bool {
    match body.get("status") {
        Some(Value::String(status)) => !status.eq_ignore_ascii_case("success"),
        Some(Value::Bool(ok)) => !ok,
        _ => false,
    }
}

/// Decode a response into its payload.
///
/// Returns `data` when present, otherwise the whole body. Non-2xx statuses
/// and failure envelopes become [`ApiError::Remote`] carrying the server
/// message, or `fallback` when there is none.
pub fn decode(response: &HttpResponse, fallback: &str) -> Result<Value, ApiError> {
    let body = match response.json() {
        Ok(body) => body,
        Err(e) if response.is_success() => return Err(e),
        Err(_) => return Err(ApiError::remote(response.status, fallback)),
    };

    if !response.is_success() || has_failure_status(&body) {
        let message = message_of(&body).unwrap_or_else(|| fallback.to_string());
        return Err(ApiError::remote(response.status, message));
    }

    Ok(match body {
        Value::Object(mut map) => match map.remove("data") {
            Some(data) => data,
            None => Value::Object(map),
        },
        other => other,
    })
}

/// Like [`decode`], but the envelope must carry an explicit success status.
///
/// Used for sign-in style endpoints, where a bare body is not proof of success.
pub fn decode_strict(response: &HttpResponse, fallback: &str) -> Result<Value, ApiError> {
    if response.is_success() {
        if let Ok(body) = response.json() {
            let explicit = body
                .get("status")
                .and_then(Value::as_str)
                .is_some_and(|status| status.eq_ignore_ascii_case("success"));
            if !explicit {
                let message = message_of(&body).unwrap_or_else(|| fallback.to_string());
                return Err(ApiError::remote(response.status, message));
            }
        }
    }
    decode(response, fallback)
}

/// Decode and deserialize a payload into `T`
pub fn decode_as<T: DeserializeOwned>(response: &HttpResponse, fallback: &str) -> Result<T, ApiError> {
    let payload = decode(response, fallback)?;
    from_payload(payload)
}

/// Deserialize an already-decoded payload
pub fn from_payload<T: DeserializeOwned>(payload: Value) -> Result<T, ApiError> {
    serde_json::from_value(payload)
        .map_err(|e| ApiError::transport(format!("Unexpected response shape: {}", e)))
}

/// Decode a list payload; `null` is an empty list
pub fn list_from_payload<T: DeserializeOwned>(payload: Value) -> Result<Vec<T>, ApiError> {
    if payload.is_null() {
        return Ok(Vec::new());
    }
    from_payload(payload)
}
