//! Ovoav platform handler.
//!
//! The API takes a single `id` parameter that can be either a long game id
//! or a friend code, and answers with an HTML fragment that is flattened to
//! plain text.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use crate::platforms::{
    PlatformHandler, QueryError, QueryRequest, error_detail, map_request_error,
};
use crate::utils::{is_friend_code, is_game_id};

pub struct OvoavPlatform {
    client: reqwest::Client,
}

impl Default for OvoavPlatform {
    fn default() -> Self {
        OvoavPlatform::new()
    }
}

impl OvoavPlatform {
    pub fn new() -> OvoavPlatform {
        OvoavPlatform {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl PlatformHandler for OvoavPlatform {
    async fn query(&self, request: &QueryRequest) -> Result<String, QueryError> {
        let id = select_identifier(
            request.game_id.as_deref(),
            request.friend_code.as_deref(),
        )
        .ok_or_else(|| {
            QueryError::InvalidArguments(
                "a valid long game id or friend code is required".to_string(),
            )
        })?;

        let response = self
            .client
            .get(&request.url)
            .query(&[("key", request.key.as_str()), ("id", id.as_str())])
            .timeout(request.timeout)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let detail = error_detail(response).await;
            return Err(QueryError::Http(status.as_u16(), detail));
        }

        let body = response
            .text()
            .await
            .map_err(|error| QueryError::Malformed(error.to_string()))?;
        Ok(strip_html(&body))
    }
}

/// Picks the `id` parameter: a friend code passed in the game-id slot is
/// accepted too, since users routinely mix the two up.
fn select_identifier(game_id: Option<&str>, friend_code: Option<&str>) -> Option<String> {
    if let Some(game_id) = game_id {
        if is_game_id(game_id) {
            return Some(game_id.to_lowercase());
        }
        if is_friend_code(game_id) {
            return Some(game_id.to_uppercase());
        }
    }
    friend_code
        .filter(|code| is_friend_code(code))
        .map(str::to_uppercase)
}

fn strip_html(html: &str) -> String {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    static SPACES: OnceLock<Regex> = OnceLock::new();
    let tags = TAGS.get_or_init(|| Regex::new(r"<[^>]+>").expect("tag pattern is valid"));
    let spaces = SPACES.get_or_init(|| Regex::new(r" +").expect("space pattern is valid"));

    let without_tags = tags.replace_all(html, "");
    spaces.replace_all(&without_tags, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mockito::Matcher;

    use super::*;

    const GAME_ID: &str = "01234567-89ab-cdef-0123-456789abcdef";

    fn request(url: String, game_id: Option<&str>, friend_code: Option<&str>) -> QueryRequest {
        QueryRequest {
            url,
            key: "secret".to_string(),
            game_id: game_id.map(str::to_string),
            friend_code: friend_code.map(str::to_string),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_query_strips_html_from_reply() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/query")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("key".to_string(), "secret".to_string()),
                Matcher::UrlEncoded("id".to_string(), GAME_ID.to_string()),
            ]))
            .with_status(200)
            .with_body("<html><body>height:   <b>7.5</b><br>type: medium</body></html>")
            .create_async()
            .await;

        let platform = OvoavPlatform::new();
        let report = platform
            .query(&request(format!("{}/query", server.url()), Some(GAME_ID), None))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(report, "height: 7.5type: medium");
    }

    #[tokio::test]
    async fn test_query_accepts_friend_code_in_game_id_slot() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/query")
            .match_query(Matcher::UrlEncoded(
                "id".to_string(),
                "ABCD-1234-EF56".to_string(),
            ))
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let platform = OvoavPlatform::new();
        platform
            .query(&request(
                format!("{}/query", server.url()),
                Some("abcd-1234-ef56"),
                None,
            ))
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_query_requires_some_valid_identifier() {
        let platform = OvoavPlatform::new();
        let result = platform
            .query(&request(
                "http://127.0.0.1:9/query".to_string(),
                Some("garbage"),
                None,
            ))
            .await;
        assert!(matches!(result, Err(QueryError::InvalidArguments(_))));
    }

    #[test]
    fn test_select_identifier_priorities() {
        assert_eq!(
            select_identifier(Some(GAME_ID), Some("ABCD-1234-EF56")),
            Some(GAME_ID.to_string())
        );
        assert_eq!(
            select_identifier(Some("abcd-1234-ef56"), None),
            Some("ABCD-1234-EF56".to_string())
        );
        assert_eq!(
            select_identifier(None, Some("abcd-1234-ef56")),
            Some("ABCD-1234-EF56".to_string())
        );
        assert_eq!(select_identifier(None, None), None);
        assert_eq!(select_identifier(Some("garbage"), None), None);
    }
}
