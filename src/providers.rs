//! Shared HTTP client for the media and status providers.
//!
//! All the image providers speak the same dialect: `GET url?key=...&time=...`
//! returning raw image bytes. The status provider returns JSON with a `msg`
//! field. Responses that are empty or suspiciously small are treated as
//! failures rather than forwarded to the chat.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use log::debug;
use serde_json::Value;

/// Image responses smaller than this are considered provider errors in
/// disguise (HTML error pages, truncated bodies).
const MIN_IMAGE_BYTES: usize = 1024;

#[derive(Debug)]
pub enum ProviderError {
    Network(String),
    Timeout,
    Http(u16, String),
    /// The provider returned an empty body.
    Empty,
    /// The provider returned fewer bytes than a plausible image.
    TooSmall(usize),
    Malformed(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Network(detail) => write!(f, "network error: {detail}"),
            ProviderError::Timeout => write!(f, "request timed out"),
            ProviderError::Http(status, detail) => write!(f, "HTTP {status}: {detail}"),
            ProviderError::Empty => write!(f, "provider returned an empty response"),
            ProviderError::TooSmall(size) => {
                write!(f, "provider returned {size} bytes, too small for an image")
            }
            ProviderError::Malformed(detail) => write!(f, "malformed provider reply: {detail}"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Client for the image and status providers.
pub struct ProviderClient {
    client: reqwest::Client,
}

impl Default for ProviderClient {
    fn default() -> Self {
        ProviderClient::new()
    }
}

impl ProviderClient {
    pub fn new() -> ProviderClient {
        ProviderClient {
            client: reqwest::Client::new(),
        }
    }

    /// Fetches an image and returns it base64-encoded.
    ///
    /// # Arguments
    ///
    /// * `url` - Provider endpoint
    /// * `key` - API key, sent as the `key` query parameter
    /// * `timeout` - Hard deadline for the whole request
    pub async fn fetch_image(
        &self,
        url: &str,
        key: &str,
        timeout: Duration,
    ) -> Result<String, ProviderError> {
        let time = unix_time();
        let response = self
            .client
            .get(url)
            .query(&[("key", key), ("time", time.as_str())])
            .timeout(timeout)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http(status.as_u16(), detail));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|error| ProviderError::Network(error.to_string()))?;
        if bytes.is_empty() {
            return Err(ProviderError::Empty);
        }
        if bytes.len() < MIN_IMAGE_BYTES {
            return Err(ProviderError::TooSmall(bytes.len()));
        }

        debug!("fetched {} image bytes from {url}", bytes.len());
        Ok(STANDARD.encode(&bytes))
    }

    /// Fetches the server status text (the `msg` field of the JSON reply).
    pub async fn fetch_status(
        &self,
        url: &str,
        key: &str,
        timeout: Duration,
    ) -> Result<String, ProviderError> {
        let time = unix_time();
        let response = self
            .client
            .get(url)
            .query(&[("key", key), ("time", time.as_str())])
            .timeout(timeout)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http(status.as_u16(), detail));
        }

        let reply: Value = response
            .json()
            .await
            .map_err(|error| ProviderError::Malformed(error.to_string()))?;
        match reply.get("msg").and_then(Value::as_str) {
            Some(message) => Ok(message.to_string()),
            None => Err(ProviderError::Malformed("missing msg field".to_string())),
        }
    }
}

fn map_request_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Network(error.to_string())
    }
}

fn unix_time() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
        .to_string()
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;

    use super::*;

    #[tokio::test]
    async fn test_fetch_image_encodes_body() {
        let mut server = mockito::Server::new_async().await;
        let body = vec![0xAAu8; 2048];
        let mock = server
            .mock("GET", "/image")
            .match_query(Matcher::Regex("key=secret&time=\\d+".to_string()))
            .with_status(200)
            .with_body(body.clone())
            .create_async()
            .await;

        let client = ProviderClient::new();
        let encoded = client
            .fetch_image(
                &format!("{}/image", server.url()),
                "secret",
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(encoded, STANDARD.encode(&body));
    }

    #[tokio::test]
    async fn test_fetch_image_rejects_empty_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/image")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("")
            .create_async()
            .await;

        let client = ProviderClient::new();
        let result = client
            .fetch_image(
                &format!("{}/image", server.url()),
                "secret",
                Duration::from_secs(5),
            )
            .await;

        assert!(matches!(result, Err(ProviderError::Empty)));
    }

    #[tokio::test]
    async fn test_fetch_image_rejects_tiny_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/image")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("nope")
            .create_async()
            .await;

        let client = ProviderClient::new();
        let result = client
            .fetch_image(
                &format!("{}/image", server.url()),
                "secret",
                Duration::from_secs(5),
            )
            .await;

        assert!(matches!(result, Err(ProviderError::TooSmall(4))));
    }

    #[tokio::test]
    async fn test_fetch_image_reports_http_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/image")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body("bad key")
            .create_async()
            .await;

        let client = ProviderClient::new();
        let result = client
            .fetch_image(
                &format!("{}/image", server.url()),
                "secret",
                Duration::from_secs(5),
            )
            .await;

        match result {
            Err(ProviderError::Http(403, detail)) => assert_eq!(detail, "bad key"),
            other => panic!("expected Http(403), got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_status_extracts_msg_field() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/status")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"msg":"all servers operational"}"#)
            .create_async()
            .await;

        let client = ProviderClient::new();
        let message = client
            .fetch_status(
                &format!("{}/status", server.url()),
                "secret",
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert_eq!(message, "all servers operational");
    }

    #[tokio::test]
    async fn test_fetch_status_rejects_missing_msg() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/status")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"code":200}"#)
            .create_async()
            .await;

        let client = ProviderClient::new();
        let result = client
            .fetch_status(
                &format!("{}/status", server.url()),
                "secret",
                Duration::from_secs(5),
            )
            .await;

        assert!(matches!(result, Err(ProviderError::Malformed(_))));
    }
}
