//! Height-query platforms.
//!
//! Each platform speaks to a different third-party API but exposes the same
//! [`PlatformHandler`] trait. The [`registry::PlatformRegistry`] owns the
//! handlers, resolves user-facing aliases to platform ids and normalizes
//! every result, including timeouts, into a [`QueryOutcome`].

pub mod mango;
pub mod ovoav;
pub mod registry;
pub mod yingtian;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;
use serde_json::Value;

pub use registry::{PlatformRegistry, PlatformRegistryError};

/// One height query, fully resolved: endpoint, key and validated
/// identifiers.
#[derive(Clone, Debug)]
pub struct QueryRequest {
    pub url: String,
    pub key: String,
    /// Long game id (lowercase UUID), when the platform uses one.
    pub game_id: Option<String>,
    /// Friend code (`XXXX-XXXX-XXXX`), when provided.
    pub friend_code: Option<String>,
    pub timeout: Duration,
}

/// Errors a platform handler can produce. The registry turns these into
/// user-facing text.
#[derive(Debug)]
pub enum QueryError {
    /// The request is missing an identifier the platform needs.
    InvalidArguments(String),
    Network(String),
    Timeout,
    Http(u16, String),
    /// The provider answered but reported an error of its own.
    Rejected(String),
    Malformed(String),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::InvalidArguments(detail) => write!(f, "invalid arguments: {detail}"),
            QueryError::Network(detail) => write!(f, "network error: {detail}"),
            QueryError::Timeout => write!(f, "request timed out"),
            QueryError::Http(status, detail) => write!(f, "HTTP {status}: {detail}"),
            QueryError::Rejected(detail) => write!(f, "provider error: {detail}"),
            QueryError::Malformed(detail) => write!(f, "malformed reply: {detail}"),
        }
    }
}

impl std::error::Error for QueryError {}

/// The normalized result of a platform query.
#[derive(Clone, Debug)]
pub struct QueryOutcome {
    pub success: bool,
    /// User-facing text, ready to dispatch.
    pub message: String,
    /// Diagnostic detail for logs and not-found heuristics.
    pub error: Option<String>,
}

/// A height-query backend.
#[automock]
#[async_trait]
pub trait PlatformHandler: Send + Sync {
    /// Runs one query and returns the formatted report text.
    async fn query(&self, request: &QueryRequest) -> Result<String, QueryError>;
}

pub(crate) fn map_request_error(error: reqwest::Error) -> QueryError {
    if error.is_timeout() {
        QueryError::Timeout
    } else {
        QueryError::Network(error.to_string())
    }
}

/// Extracts a human-readable detail from a non-200 provider response,
/// preferring a JSON `message`/`msg` field over the raw body.
pub(crate) async fn error_detail(response: reqwest::Response) -> String {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    if let Ok(parsed) = serde_json::from_str::<Value>(&body) {
        for field in ["message", "msg"] {
            if let Some(detail) = parsed.get(field).and_then(Value::as_str) {
                return detail.to_string();
            }
        }
    }
    if body.is_empty() {
        format!("status code {status}")
    } else {
        body
    }
}

pub(crate) fn safe_float(value: Option<&Value>) -> Option<f64> {
    let value = value?;
    if let Some(number) = value.as_f64() {
        return Some(number);
    }
    value.as_str()?.trim().parse().ok()
}
