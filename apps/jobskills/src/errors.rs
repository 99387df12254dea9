use std::collections::BTreeMap;

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Per-field validation messages reported by the backend, keyed by field name.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Keys that carry a human-readable message rather than a field error.
const MESSAGE_KEYS: &[&str] = &["message", "detail", "error", "non_field_errors", "status"];

/// Normalized error produced by every call through the API transport.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api {
        status: u16,
        message: String,
        fields: FieldErrors,
    },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// HTTP status of the failed response, if the request got that far.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Api { status, .. } => Some(*status),
            ApiError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// 404 or 405: the route does not exist on this backend.
    pub fn is_endpoint_absent(&self) -> bool {
        matches!(self.status(), Some(404) | Some(405))
    }

    /// Field-level validation errors, empty for transport failures.
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            ApiError::Api { fields, .. } if !fields.is_empty() => Some(fields),
            _ => None,
        }
    }

    /// The message shown to a user, without the status prefix of `Display`.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Builds an `Api` error from a non-2xx status and its raw body.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let fallback = status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));

        let Ok(json) = serde_json::from_str::<Value>(body) else {
            let message = if body.trim().is_empty() {
                fallback
            } else {
                body.trim().to_string()
            };
            return ApiError::Api {
                status: status.as_u16(),
                message,
                fields: FieldErrors::new(),
            };
        };

        let message = extract_message(&json).unwrap_or(fallback);
        let is_validation_status = matches!(status.as_u16(), 400 | 422);
        let fields = extract_field_errors(&json, is_validation_status);

        ApiError::Api {
            status: status.as_u16(),
            message,
            fields,
        }
    }
}

fn extract_message(json: &Value) -> Option<String> {
    let obj = json.as_object()?;
    for key in ["message", "detail"] {
        if let Some(text) = obj.get(key).and_then(Value::as_str) {
            return Some(text.to_string());
        }
    }
    match obj.get("error") {
        Some(Value::String(text)) => Some(text.clone()),
        Some(Value::Object(inner)) => inner
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => obj
            .get("non_field_errors")
            .and_then(messages_of)
            .and_then(|msgs| msgs.into_iter().next()),
    }
}

/// Reads `errors: {field: [..]}`, or on validation statuses the top-level
/// `{field: [..]}` shape used by DRF-style backends.
fn extract_field_errors(json: &Value, top_level_allowed: bool) -> FieldErrors {
    let mut fields = FieldErrors::new();

    if let Some(errors) = json.get("errors").and_then(Value::as_object) {
        for (field, value) in errors {
            if let Some(msgs) = messages_of(value) {
                fields.insert(field.clone(), msgs);
            }
        }
        return fields;
    }

    if !top_level_allowed {
        return fields;
    }

    if let Some(obj) = json.as_object() {
        for (field, value) in obj {
            if MESSAGE_KEYS.contains(&field.as_str()) {
                continue;
            }
            if let Some(msgs) = messages_of(value) {
                fields.insert(field.clone(), msgs);
            }
        }
    }
    fields
}

fn messages_of(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) => Some(vec![s.clone()]),
        Value::Array(items) => {
            let msgs: Vec<String> = items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            (!msgs.is_empty()).then_some(msgs)
        }
        _ => None,
    }
}
