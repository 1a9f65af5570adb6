//! Message delivery with a preferred and a degraded channel.
//!
//! Results are built as a [`DispatchPayload`] of text and image segments.
//! The [`MessageDispatcher`] first tries the merged-forward gateway (one
//! aggregated message for the whole payload) and, when the gateway is
//! disabled or fails, falls back to sending each segment individually
//! through the host's [`ChatSink`], followed by a one-line degraded-mode
//! notice. The degraded pass counts as delivered if at least one segment
//! went through; every segment is attempted exactly once.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use log::{debug, error, info, warn};
use mockall::automock;
use serde_json::{Value, json};

use crate::config::{ConfigSnapshot, ForwardSettings};

/// How many segments are summarized in the merged-message preview.
const PREVIEW_SEGMENTS: usize = 4;
/// Maximum characters per preview line.
const PREVIEW_CHARS: usize = 50;

/// One unit of output.
#[derive(Clone, Debug, PartialEq)]
pub enum Segment {
    Text(String),
    /// Base64-encoded image bytes (no scheme prefix).
    Image(String),
}

/// An ordered list of segments produced by a command.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DispatchPayload {
    pub segments: Vec<Segment>,
}

impl DispatchPayload {
    /// Builds a payload holding a single text segment.
    pub fn text(text: impl Into<String>) -> DispatchPayload {
        DispatchPayload {
            segments: vec![Segment::Text(text.into())],
        }
    }

    pub fn from_segments(segments: Vec<Segment>) -> DispatchPayload {
        DispatchPayload { segments }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Which channel ended up delivering the payload.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DispatchChannel {
    /// The merged-forward gateway took the whole payload.
    Preferred,
    /// Segments were sent individually through the chat sink.
    Degraded,
}

/// The result of one delivery attempt, kept for execution reports.
#[derive(Clone, Debug)]
pub struct DispatchOutcome {
    /// `None` when both channels failed.
    pub channel: Option<DispatchChannel>,
    pub delivered: bool,
    pub detail: String,
}

/// The host chat surface. The dispatcher only needs to push individual
/// text and image messages through it; everything else about the chat
/// runtime stays opaque.
#[automock]
#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn send_text(&self, text: &str) -> anyhow::Result<()>;

    /// Sends one image. `image` is a sink-ready reference, for example a
    /// `base64://` data URL.
    async fn send_image(&self, image: &str) -> anyhow::Result<()>;
}

/// Errors from the merged-forward gateway.
#[derive(Debug)]
enum ForwardError {
    Network(String),
    Timeout,
    Http(u16, String),
    Rejected(String),
}

impl std::fmt::Display for ForwardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForwardError::Network(detail) => write!(f, "network error: {detail}"),
            ForwardError::Timeout => write!(f, "request timed out"),
            ForwardError::Http(status, detail) => write!(f, "HTTP {status}: {detail}"),
            ForwardError::Rejected(detail) => write!(f, "gateway rejected the message: {detail}"),
        }
    }
}

/// Delivers payloads, preferring the merged-forward gateway.
pub struct MessageDispatcher {
    client: reqwest::Client,
    sink: Arc<dyn ChatSink>,
}

impl MessageDispatcher {
    /// Creates a dispatcher sending degraded traffic through `sink`.
    pub fn new(sink: Arc<dyn ChatSink>) -> MessageDispatcher {
        MessageDispatcher {
            client: reqwest::Client::new(),
            sink,
        }
    }

    /// Delivers `payload` under the rules of the given snapshot.
    ///
    /// An empty payload is replaced by a short notice so the requester
    /// always sees a response. This method never returns an error: failures
    /// are folded into the [`DispatchOutcome`].
    pub async fn send(&self, payload: &DispatchPayload, config: &ConfigSnapshot) -> DispatchOutcome {
        let fallback;
        let payload = if payload.is_empty() {
            fallback = DispatchPayload::text("❌ the query returned no content");
            &fallback
        } else {
            payload
        };

        if config.forward.enabled {
            match self.send_merged(&payload.segments, &config.forward).await {
                Ok(()) => {
                    info!(
                        "delivered {} segment(s) through the merged-forward gateway",
                        payload.segments.len()
                    );
                    return DispatchOutcome {
                        channel: Some(DispatchChannel::Preferred),
                        delivered: true,
                        detail: format!("merged forward of {} segment(s)", payload.segments.len()),
                    };
                }
                Err(error) => {
                    warn!("merged forward failed ({error}), falling back to per-segment delivery");
                }
            }
        } else {
            debug!("merged forward disabled, using per-segment delivery");
        }

        let mut sent = 0usize;
        for segment in &payload.segments {
            let result = match segment {
                Segment::Text(text) => self.sink.send_text(text).await,
                Segment::Image(image) => self.sink.send_image(&ensure_image_reference(image)).await,
            };
            match result {
                Ok(()) => sent += 1,
                Err(error) => warn!("degraded delivery of one segment failed: {error}"),
            }
        }

        if sent > 0 {
            // one-line heads-up that the merged view was not available
            if let Err(error) = self
                .sink
                .send_text("⚠️ delivery is running in degraded mode, results were sent as separate messages")
                .await
            {
                warn!("could not deliver the degraded-mode notice: {error}");
            }
            info!(
                "delivered {sent}/{} segment(s) through the degraded channel",
                payload.segments.len()
            );
            DispatchOutcome {
                channel: Some(DispatchChannel::Degraded),
                delivered: true,
                detail: format!("degraded delivery of {sent}/{} segment(s)", payload.segments.len()),
            }
        } else {
            error!("both delivery channels failed, nothing was sent");
            DispatchOutcome {
                channel: None,
                delivered: false,
                detail: "both delivery channels failed".to_string(),
            }
        }
    }

    async fn send_merged(
        &self,
        segments: &[Segment],
        forward: &ForwardSettings,
    ) -> Result<(), ForwardError> {
        let url = format!("{}/send_forward_msg", forward.api_url);
        let body = build_forward_body(segments);

        let mut request = self
            .client
            .post(&url)
            .timeout(forward.timeout)
            .json(&body);
        if !forward.token.is_empty() {
            request = request.bearer_auth(&forward.token);
        }

        let response = request.send().await.map_err(|error| {
            if error.is_timeout() {
                ForwardError::Timeout
            } else {
                ForwardError::Network(error.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ForwardError::Http(status.as_u16(), detail));
        }

        let reply: Value = response
            .json()
            .await
            .map_err(|error| ForwardError::Rejected(format!("unparseable reply: {error}")))?;
        if reply.get("status").and_then(Value::as_str) == Some("ok") {
            Ok(())
        } else {
            let detail = reply
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("no status field")
                .to_string();
            Err(ForwardError::Rejected(detail))
        }
    }
}

/// Builds the `send_forward_msg` request body: one node per segment plus a
/// short text preview of the first few segments.
fn build_forward_body(segments: &[Segment]) -> Value {
    let nodes: Vec<Value> = segments
        .iter()
        .map(|segment| {
            let content = match segment {
                Segment::Text(text) => json!({ "type": "text", "data": { "text": text } }),
                Segment::Image(image) => json!({
                    "type": "image",
                    "data": { "file": ensure_image_reference(image), "summary": "[image]" }
                }),
            };
            json!({ "type": "node", "data": { "nickname": "skytools", "content": [content] } })
        })
        .collect();

    let news: Vec<Value> = segments
        .iter()
        .take(PREVIEW_SEGMENTS)
        .map(|segment| json!({ "text": format!("skytools: {}", preview_line(segment)) }))
        .collect();

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);

    json!({
        "messages": nodes,
        "news": news,
        "prompt": format!("[skytools] {} message(s)", segments.len()),
        "summary": format!("view {} forwarded message(s)", segments.len()),
        "source": "skytools query results",
        "time": timestamp,
    })
}

/// One preview line for a segment, flattened and truncated.
fn preview_line(segment: &Segment) -> String {
    match segment {
        Segment::Text(text) => {
            let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if flat.chars().count() > PREVIEW_CHARS {
                let mut truncated: String = flat.chars().take(PREVIEW_CHARS - 3).collect();
                truncated.push_str("...");
                truncated
            } else {
                flat
            }
        }
        Segment::Image(_) => "[image]".to_string(),
    }
}

/// Normalizes an image segment into a reference the sink understands. Bare
/// base64 gets the `base64://` scheme; URLs and already-schemed references
/// pass through.
pub fn ensure_image_reference(image: &str) -> String {
    if image.starts_with("base64://")
        || image.starts_with("http://")
        || image.starts_with("https://")
        || image.starts_with("file://")
    {
        image.to_string()
    } else {
        format!("base64://{image}")
    }
}

#[cfg(test)]
mod tests {
    use mockall::Sequence;

    use super::*;
    use crate::config::Config;

    fn snapshot_with_forward(api_url: &str, enabled: bool) -> ConfigSnapshot {
        let mut snapshot = Config::default().into_snapshot(None).unwrap();
        snapshot.forward.api_url = api_url.trim_end_matches('/').to_string();
        snapshot.forward.enabled = enabled;
        snapshot
    }

    fn sample_payload() -> DispatchPayload {
        DispatchPayload::from_segments(vec![
            Segment::Text("daily tasks".to_string()),
            Segment::Image("aGVsbG8=".to_string()),
        ])
    }

    #[tokio::test]
    async fn test_send_uses_preferred_channel_when_gateway_accepts() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/send_forward_msg")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_body(r#"{"status":"ok"}"#)
            .create_async()
            .await;

        let mut snapshot = snapshot_with_forward(&server.url(), true);
        snapshot.forward.token = "secret".to_string();

        // no sink expectations: the degraded channel must stay untouched
        let dispatcher = MessageDispatcher::new(Arc::new(MockChatSink::new()));
        let outcome = dispatcher.send(&sample_payload(), &snapshot).await;

        mock.assert_async().await;
        assert!(outcome.delivered);
        assert_eq!(outcome.channel, Some(DispatchChannel::Preferred));
    }

    #[tokio::test]
    async fn test_send_falls_back_when_gateway_rejects() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/send_forward_msg")
            .with_status(200)
            .with_body(r#"{"status":"failed","message":"forward unsupported"}"#)
            .create_async()
            .await;

        let mut sink = MockChatSink::new();
        let mut order = Sequence::new();
        sink.expect_send_text()
            .withf(|text| text == "daily tasks")
            .times(1)
            .in_sequence(&mut order)
            .returning(|_| Ok(()));
        sink.expect_send_image()
            .withf(|image| image == "base64://aGVsbG8=")
            .times(1)
            .in_sequence(&mut order)
            .returning(|_| Ok(()));
        sink.expect_send_text()
            .withf(|text| text.contains("degraded mode"))
            .times(1)
            .in_sequence(&mut order)
            .returning(|_| Ok(()));

        let dispatcher = MessageDispatcher::new(Arc::new(sink));
        let snapshot = snapshot_with_forward(&server.url(), true);
        let outcome = dispatcher.send(&sample_payload(), &snapshot).await;

        assert!(outcome.delivered);
        assert_eq!(outcome.channel, Some(DispatchChannel::Degraded));
    }

    #[tokio::test]
    async fn test_send_falls_back_when_gateway_times_out() {
        use std::time::Duration;

        // a listener that accepts the connection but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let _socket = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let mut sink = MockChatSink::new();
        sink.expect_send_text().times(2).returning(|_| Ok(()));
        sink.expect_send_image().times(1).returning(|_| Ok(()));

        let dispatcher = MessageDispatcher::new(Arc::new(sink));
        let mut snapshot = snapshot_with_forward(&format!("http://{address}"), true);
        snapshot.forward.timeout = Duration::from_millis(200);
        let outcome = dispatcher.send(&sample_payload(), &snapshot).await;

        assert!(outcome.delivered);
        assert_eq!(outcome.channel, Some(DispatchChannel::Degraded));
        server.abort();
    }

    #[tokio::test]
    async fn test_send_falls_back_when_gateway_is_unreachable() {
        let mut sink = MockChatSink::new();
        // the text segment plus the degraded-mode notice
        sink.expect_send_text().times(2).returning(|_| Ok(()));
        sink.expect_send_image().times(1).returning(|_| Ok(()));

        let dispatcher = MessageDispatcher::new(Arc::new(sink));
        // nothing listens on port 9 (discard)
        let snapshot = snapshot_with_forward("http://127.0.0.1:9", true);
        let outcome = dispatcher.send(&sample_payload(), &snapshot).await;

        assert!(outcome.delivered);
        assert_eq!(outcome.channel, Some(DispatchChannel::Degraded));
    }

    #[tokio::test]
    async fn test_send_skips_gateway_when_disabled() {
        let mut sink = MockChatSink::new();
        sink.expect_send_text().times(2).returning(|_| Ok(()));
        sink.expect_send_image().times(1).returning(|_| Ok(()));

        let dispatcher = MessageDispatcher::new(Arc::new(sink));
        let snapshot = snapshot_with_forward("http://127.0.0.1:9", false);
        let outcome = dispatcher.send(&sample_payload(), &snapshot).await;

        assert!(outcome.delivered);
        assert_eq!(outcome.channel, Some(DispatchChannel::Degraded));
    }

    #[tokio::test]
    async fn test_degraded_delivery_counts_partial_success() {
        let mut sink = MockChatSink::new();
        sink.expect_send_text()
            .withf(|text| text == "daily tasks")
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("sink closed")));
        sink.expect_send_image().times(1).returning(|_| Ok(()));
        sink.expect_send_text()
            .withf(|text| text.contains("degraded mode"))
            .times(1)
            .returning(|_| Ok(()));

        let dispatcher = MessageDispatcher::new(Arc::new(sink));
        let snapshot = snapshot_with_forward("http://127.0.0.1:9", false);
        let outcome = dispatcher.send(&sample_payload(), &snapshot).await;

        assert!(outcome.delivered);
        assert_eq!(outcome.channel, Some(DispatchChannel::Degraded));
        assert!(outcome.detail.contains("1/2"));
    }

    #[tokio::test]
    async fn test_send_reports_failure_when_both_channels_fail() {
        let mut sink = MockChatSink::new();
        sink.expect_send_text()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("sink closed")));
        sink.expect_send_image()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("sink closed")));

        let dispatcher = MessageDispatcher::new(Arc::new(sink));
        let snapshot = snapshot_with_forward("http://127.0.0.1:9", false);
        let outcome = dispatcher.send(&sample_payload(), &snapshot).await;

        assert!(!outcome.delivered);
        assert_eq!(outcome.channel, None);
    }

    #[tokio::test]
    async fn test_empty_payload_is_replaced_with_a_notice() {
        let mut sink = MockChatSink::new();
        sink.expect_send_text()
            .withf(|text| text.contains("no content"))
            .times(1)
            .returning(|_| Ok(()));
        sink.expect_send_text()
            .withf(|text| text.contains("degraded mode"))
            .times(1)
            .returning(|_| Ok(()));

        let dispatcher = MessageDispatcher::new(Arc::new(sink));
        let snapshot = snapshot_with_forward("http://127.0.0.1:9", false);
        let outcome = dispatcher.send(&DispatchPayload::default(), &snapshot).await;

        assert!(outcome.delivered);
    }

    #[test]
    fn test_build_forward_body_previews_first_segments() {
        let long_text = "word ".repeat(30);
        let segments = vec![
            Segment::Text(long_text),
            Segment::Image("aGVsbG8=".to_string()),
            Segment::Text("a".to_string()),
            Segment::Text("b".to_string()),
            Segment::Text("c".to_string()),
        ];

        let body = build_forward_body(&segments);
        let news = body["news"].as_array().unwrap();
        assert_eq!(news.len(), PREVIEW_SEGMENTS);

        let first = news[0]["text"].as_str().unwrap();
        assert!(first.starts_with("skytools: "));
        assert!(first.ends_with("..."));
        assert_eq!(news[1]["text"].as_str().unwrap(), "skytools: [image]");

        assert_eq!(body["messages"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_ensure_image_reference() {
        assert_eq!(ensure_image_reference("aGVsbG8="), "base64://aGVsbG8=");
        assert_eq!(
            ensure_image_reference("base64://aGVsbG8="),
            "base64://aGVsbG8="
        );
        assert_eq!(
            ensure_image_reference("https://example.com/a.png"),
            "https://example.com/a.png"
        );
    }
}
