//! The height command: platform resolution, local argument validation and
//! the provider query itself.

use async_trait::async_trait;
use log::debug;

use crate::commands::{CommandArgs, CommandFailure, CommandHandler, InvocationContext};
use crate::config::is_placeholder_key;
use crate::dispatch::DispatchPayload;
use crate::platforms::QueryRequest;
use crate::utils::{is_friend_code, is_game_id};

/// Substrings (lowercased) in a provider error that mean "this player has
/// never been measured", triggering the friend-code guidance.
const NOT_FOUND_MARKERS: &[&str] = &[
    "record not found",
    "not found",
    "no record",
    "未找到",
    "不存在",
    "无记录",
];

pub struct HeightCommand;

#[async_trait]
impl CommandHandler for HeightCommand {
    async fn execute(
        &self,
        args: &CommandArgs,
        context: &InvocationContext<'_>,
    ) -> Result<DispatchPayload, CommandFailure> {
        let snapshot = context.snapshot;
        let platform_token = args.get("platform").filter(|token| *token != "help");
        let game_id = args.get("game_id");
        let friend_code = args.get("friend_code");

        if game_id.is_none() && platform_token.is_none() {
            return Ok(DispatchPayload::text(usage(context)));
        }

        let available: Vec<&str> = context
            .platforms
            .ids()
            .into_iter()
            .filter(|id| snapshot.height.platform_enabled(id))
            .collect();
        if available.is_empty() {
            return Ok(DispatchPayload::text(
                "❌ no height platforms are enabled right now",
            ));
        }

        let Some(platform) = context.platforms.resolve(platform_token, snapshot) else {
            let token = platform_token.unwrap_or(&snapshot.height.default_platform);
            return Ok(DispatchPayload::text(format!(
                "❌ unknown or disabled platform: {token}\n💡 available platforms: {}",
                available.join(", ")
            )));
        };

        // Validate locally before spending a provider call.
        if let Some(friend_code) = friend_code {
            if !is_friend_code(friend_code) {
                return Ok(DispatchPayload::text(format!(
                    "❌ invalid friend code format: {friend_code}\n💡 friend codes look like XXXX-XXXX-XXXX"
                )));
            }
        }
        if let Some(text) = check_identifiers(&platform, game_id, friend_code, context) {
            return Ok(DispatchPayload::text(text));
        }

        let Some(api) = snapshot.height.api(&platform) else {
            return Ok(DispatchPayload::text(format!(
                "❌ the {platform} platform has no endpoint configured"
            )));
        };
        if is_placeholder_key(&api.key) {
            return Ok(DispatchPayload::text(format!(
                "❌ the {platform} API key is not configured"
            )));
        }

        let request = QueryRequest {
            url: api.url.clone(),
            key: api.key.clone(),
            game_id: game_id.map(str::to_string),
            friend_code: friend_code.map(str::to_string),
            timeout: snapshot.height.timeout,
        };
        debug!("querying platform {platform} for a height report");
        let outcome = context.platforms.query(&platform, &request).await;

        if outcome.success {
            return Ok(DispatchPayload::text(outcome.message));
        }
        if is_record_not_found(outcome.error.as_deref()) {
            return Ok(DispatchPayload::text(format!(
                "{}\n\n💡 no record was found for this player. First-time queries \
                 must include the friend code:\n{}height {platform} <game id> <friend code>",
                outcome.message, snapshot.prefix
            )));
        }
        Ok(DispatchPayload::text(outcome.message))
    }
}

/// Platform-specific identifier rules, checked before any network call.
/// Returns the guidance text when the arguments cannot work.
fn check_identifiers(
    platform: &str,
    game_id: Option<&str>,
    friend_code: Option<&str>,
    context: &InvocationContext<'_>,
) -> Option<String> {
    match platform {
        // ovoav accepts either identifier, in either slot
        "ovoav" => {
            let has_valid = game_id.is_some_and(|id| is_game_id(id) || is_friend_code(id))
                || friend_code.is_some_and(is_friend_code);
            (!has_valid).then(|| {
                format!(
                    "❌ provide a valid long game id or friend code\n\n{}",
                    usage(context)
                )
            })
        }
        _ => match game_id {
            None => Some(usage(context)),
            Some(id) if is_game_id(id) => None,
            Some(id) if is_friend_code(id) => Some(format!(
                "❌ the {platform} platform needs the long game id (UUID), a friend code \
                 alone is not enough\n💡 include both on the first query: {}height {platform} \
                 <game id> {id}",
                context.snapshot.prefix
            )),
            Some(id) => Some(format!(
                "❌ invalid game id: {id}\n💡 the long game id looks like \
                 xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx\n💡 first-time queries should also \
                 include your friend code (XXXX-XXXX-XXXX)"
            )),
        },
    }
}

fn is_record_not_found(error: Option<&str>) -> bool {
    let Some(error) = error else {
        return false;
    };
    let error = error.to_lowercase();
    NOT_FOUND_MARKERS.iter().any(|marker| error.contains(marker))
}

fn usage(context: &InvocationContext<'_>) -> String {
    let prefix = &context.snapshot.prefix;
    let mut lines = vec![
        "📏 height query".to_string(),
        "━━━━━━━━━━━━━━━━━━━━".to_string(),
        format!("usage: {prefix}height [platform] <game id> [friend code]"),
        String::new(),
        "available platforms:".to_string(),
    ];

    for id in context.platforms.ids() {
        if !context.snapshot.height.platform_enabled(id) {
            continue;
        }
        let aliases = context
            .platforms
            .aliases_of(id)
            .unwrap_or(&[])
            .join(", ");
        if aliases.is_empty() {
            lines.push(format!("  • {id}"));
        } else {
            lines.push(format!("  • {id} ({aliases})"));
        }
    }

    lines.push(String::new());
    lines.push(format!(
        "example: {prefix}height xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx"
    ));
    lines.push("💡 include your friend code (XXXX-XXXX-XXXX) on the first query".to_string());
    lines.join("\n")
}
