//! Yingtian platform handler.
//!
//! The richest of the three backends: besides the height numbers it returns
//! score, outfit and pose information, all folded into one report.

use async_trait::async_trait;
use serde_json::Value;

use crate::platforms::{
    PlatformHandler, QueryError, QueryRequest, error_detail, map_request_error, safe_float,
};
use crate::utils::{is_friend_code, is_game_id};

pub struct YingtianPlatform {
    client: reqwest::Client,
}

impl Default for YingtianPlatform {
    fn default() -> Self {
        YingtianPlatform::new()
    }
}

impl YingtianPlatform {
    pub fn new() -> YingtianPlatform {
        YingtianPlatform {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl PlatformHandler for YingtianPlatform {
    async fn query(&self, request: &QueryRequest) -> Result<String, QueryError> {
        let game_id = request
            .game_id
            .as_deref()
            .filter(|id| is_game_id(id))
            .ok_or_else(|| {
                QueryError::InvalidArguments("a valid long game id is required".to_string())
            })?;

        let mut params = vec![
            ("key", request.key.clone()),
            ("cx", game_id.to_lowercase()),
        ];
        if let Some(friend_code) = request.friend_code.as_deref() {
            if !is_friend_code(friend_code) {
                return Err(QueryError::InvalidArguments(
                    "the friend code format is invalid".to_string(),
                ));
            }
            params.push(("code", friend_code.to_uppercase()));
        }

        let response = self
            .client
            .get(&request.url)
            .query(&params)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let detail = error_detail(response).await;
            return Err(QueryError::Http(status.as_u16(), detail));
        }

        let reply: Value = response
            .json()
            .await
            .map_err(|error| QueryError::Malformed(error.to_string()))?;
        if reply.get("code").and_then(Value::as_i64) != Some(200) {
            let detail = reply
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(QueryError::Rejected(detail));
        }

        Ok(format_report(&reply))
    }
}

fn format_report(reply: &Value) -> String {
    let data = &reply["data"];
    let score = &reply["score"];
    let adorn = &reply["adorn"];
    let action = &reply["action"];

    let mut lines = vec![
        "✨ yingtian platform height report".to_string(),
        "━━━━━━━━━━━━━━━━━━━━".to_string(),
        float_line("📊 scale value (s)", safe_float(data.get("scale"))),
        float_line("📊 height value (h)", safe_float(data.get("height"))),
        float_line("✨ current height", safe_float(data.get("currentHeight"))),
        float_line("📈 tallest height", safe_float(data.get("maxHeight"))),
        float_line("📉 shortest height", safe_float(data.get("minHeight"))),
        format!(
            "🏷️ description: {}",
            data.get("heightDesc").and_then(Value::as_str).unwrap_or("unknown")
        ),
        String::new(),
        "📊 scores:".to_string(),
    ];

    for (label, field) in [
        ("scale", "scaleScore"),
        ("height", "heightScore"),
        ("current height", "currentHeightScore"),
        ("tallest", "maxHeightScore"),
        ("shortest", "minHeightScore"),
    ] {
        lines.push(format!("  • {label}: {}", text_or_unknown(score.get(field))));
    }

    lines.push(String::new());
    lines.push("👗 outfit:".to_string());
    for (label, field) in [
        ("cloak", "cloak"),
        ("hair", "hair"),
        ("mask", "mask"),
        ("pants", "pants"),
        ("prop", "prop"),
        ("horn", "horn"),
        ("necklace", "neck"),
    ] {
        lines.push(format!("  • {label}: {}", text_or_unknown(adorn.get(field))));
    }

    lines.push(String::new());
    lines.push("🎭 poses:".to_string());
    for (label, field) in [("stance", "attitude"), ("call", "voice")] {
        lines.push(format!("  • {label}: {}", text_or_unknown(action.get(field))));
    }
    lines.push("━━━━━━━━━━━━━━━━━━━━".to_string());

    lines.join("\n")
}

fn float_line(label: &str, value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{label}: {value}"),
        None => format!("{label}: unknown"),
    }
}

fn text_or_unknown(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        _ => "unknown".to_string(),
    }
}
