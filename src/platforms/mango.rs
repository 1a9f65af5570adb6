//! Mango platform handler.
//!
//! Queries are POSTed as JSON (`key`, `id`, optional `inviteCode`). The
//! reply carries raw scale/height values that are turned into a readable
//! report, including a coarse height-type bucket.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::platforms::{
    PlatformHandler, QueryError, QueryRequest, error_detail, map_request_error, safe_float,
};
use crate::utils::{is_friend_code, is_game_id};

pub struct MangoPlatform {
    client: reqwest::Client,
}

impl Default for MangoPlatform {
    fn default() -> Self {
        MangoPlatform::new()
    }
}

impl MangoPlatform {
    pub fn new() -> MangoPlatform {
        MangoPlatform {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl PlatformHandler for MangoPlatform {
    async fn query(&self, request: &QueryRequest) -> Result<String, QueryError> {
        let game_id = request
            .game_id
            .as_deref()
            .filter(|id| is_game_id(id))
            .ok_or_else(|| {
                QueryError::InvalidArguments("a valid long game id is required".to_string())
            })?;

        let mut body = json!({
            "key": request.key,
            "id": game_id.to_lowercase(),
        });
        if let Some(friend_code) = request.friend_code.as_deref() {
            if !is_friend_code(friend_code) {
                return Err(QueryError::InvalidArguments(
                    "the friend code format is invalid".to_string(),
                ));
            }
            body["inviteCode"] = Value::String(friend_code.to_uppercase());
        }

        let response = self
            .client
            .post(&request.url)
            .timeout(request.timeout)
            .json(&body)
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
        match reply.get("data") {
            Some(data) if !data.is_null() => Ok(format_report(data)),
            _ => {
                let detail = reply
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string();
                Err(QueryError::Rejected(detail))
            }
        }
    }
}

fn format_report(data: &Value) -> String {
    let s_value = safe_float(data.get("s"));
    let h_value = safe_float(data.get("h"));
    let height = safe_float(data.get("height")).or(h_value);
    let max_height = safe_float(data.get("max")).unwrap_or(1.0);
    let min_height = safe_float(data.get("min")).unwrap_or(14.0);

    let mut lines = vec![
        "✨ mango platform height report".to_string(),
        "━━━━━━━━━━━━━━━━━━━━".to_string(),
        float_line("📊 scale value (s)", s_value),
        float_line("📊 height value (h)", h_value),
        float_line("📈 tallest height", Some(max_height)),
        float_line("📉 shortest height", Some(min_height)),
        float_line("✨ current height", height),
        format!(
            "🏷️ height type: {}",
            height_type(height, min_height, max_height)
        ),
        String::new(),
    ];

    match height {
        // the numeric scale runs from max (tallest) down to min (shortest)
        Some(height) if min_height - height > 0.0 => lines.push(format!(
            "🎯 distance to shortest: {:.8}",
            min_height - height
        )),
        _ => lines.push("🎯 already at the shortest height".to_string()),
    }
    match height {
        Some(height) if height - max_height > 0.0 => lines.push(format!(
            "🎯 distance to tallest: {:.8}",
            height - max_height
        )),
        _ => lines.push("🎯 already at the tallest height".to_string()),
    }
    lines.push("━━━━━━━━━━━━━━━━━━━━".to_string());

    lines.join("\n")
}

fn float_line(label: &str, value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{label}: {value:.8}"),
        None => format!("{label}: unknown"),
    }
}

fn height_type(height: Option<f64>, min_height: f64, max_height: f64) -> &'static str {
    let Some(height) = height else {
        return "unknown";
    };
    let range = min_height - max_height;
    if range <= 0.0 {
        return "medium";
    }
    let position = (height - max_height) / range;
    if position < 0.2 {
        "very tall"
    } else if position < 0.4 {
        "tall"
    } else if position < 0.6 {
        "medium"
    } else if position < 0.8 {
        "short"
    } else {
        "very short"
    }
}
