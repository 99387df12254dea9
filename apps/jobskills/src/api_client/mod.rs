//! API client: the single point of entry for every backend call made by the
//! skill workflow.
//!
//! The resolver and the store only ever see `Arc<dyn ApiTransport>`; `HttpTransport`
//! is the production implementation and tests swap in an in-memory backend.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::errors::ApiError;

pub mod endpoints;

/// One request against the backend, relative to the configured base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Performs requests and returns the parsed body, or a normalized `ApiError`.
/// An empty response body is returned as `Value::Null`.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<Value, ApiError>;

    async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.send(ApiRequest::new(Method::GET, path)).await
    }

    async fn get_with_query(&self, path: &str, key: &str, value: &str) -> Result<Value, ApiError> {
        self.send(ApiRequest::new(Method::GET, path).query(key, value))
            .await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.send(ApiRequest::new(Method::POST, path).body(body))
            .await
    }

    async fn put(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.send(ApiRequest::new(Method::PUT, path).body(body)).await
    }

    async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.send(ApiRequest::new(Method::DELETE, path)).await
    }
}

/// reqwest-backed transport. No retries: a failure is reported once, normalized.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        Self::new(
            &config.api_base_url,
            config.api_token.clone(),
            Duration::from_secs(config.http_timeout_secs),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl ApiTransport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let url = self.url(&request.path);
        debug!("{} {}", request.method, url);

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .header("accept", "application/json");
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            warn!("{} {} returned {}: {}", request.method, url, status, text);
            return Err(ApiError::from_response(status, &text));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(ApiError::Parse)
    }
}

/// Strips a `{"data": ...}` envelope if present.
pub fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut obj) if obj.contains_key("data") => {
            obj.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Unwraps a listing that may be a bare array, `{data: [..]}` or a paginated
/// `{results: [..]}`.
pub fn unwrap_list(value: Value) -> Result<Vec<Value>, ApiError> {
    match unwrap_envelope(value) {
        Value::Array(items) => Ok(items),
        Value::Object(mut obj) => match obj.remove("results") {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(ApiError::UnexpectedResponse(
                "expected a list of records".to_string(),
            )),
        },
        Value::Null => Ok(Vec::new()),
        other => Err(ApiError::UnexpectedResponse(format!(
            "expected a list of records, got {other}"
        ))),
    }
}
