//! The help command: a command overview, or a detail page for one command.

use async_trait::async_trait;

use crate::commands::registry::RegisteredCommand;
use crate::commands::{CommandArgs, CommandFailure, CommandHandler, InvocationContext};
use crate::dispatch::DispatchPayload;

pub struct HelpCommand;

#[async_trait]
impl CommandHandler for HelpCommand {
    async fn execute(
        &self,
        args: &CommandArgs,
        context: &InvocationContext<'_>,
    ) -> Result<DispatchPayload, CommandFailure> {
        let text = match args.get("command") {
            Some(token) => detail_page(token, context),
            None => overview(context),
        };
        Ok(DispatchPayload::text(text))
    }
}

fn overview(context: &InvocationContext<'_>) -> String {
    let prefix = &context.snapshot.prefix;
    let mut lines = vec![
        "✨ skytools command help ✨".to_string(),
        String::new(),
        "📋 available commands:".to_string(),
    ];

    for command in context
        .registry
        .in_display_order(&context.snapshot.display_order)
    {
        let descriptor = command.descriptor;
        if descriptor.name == "skytools" {
            continue;
        }
        if let Some(key) = descriptor.enable_key {
            if !context.snapshot.is_enabled(key) {
                continue;
            }
        }
        lines.push(format!(
            "{} {}",
            descriptor.icon,
            invocations(prefix, command)
        ));
        lines.push(format!("   → {}", descriptor.description));
    }

    lines.push(String::new());
    lines.push(format!(
        "💡 use {prefix}help <command> for a detailed description"
    ));
    lines.join("\n")
}

fn detail_page(token: &str, context: &InvocationContext<'_>) -> String {
    let prefix = &context.snapshot.prefix;
    let Some(command) = context.registry.find(token) else {
        return format!(
            "❌ unknown command: {token}\n💡 use {prefix}help to list all commands"
        );
    };
    let descriptor = command.descriptor;

    if let Some(key) = descriptor.enable_key {
        if !context.snapshot.is_enabled(key) {
            return format!("❌ the {} command is currently disabled", descriptor.name);
        }
    }

    let mut lines = vec![
        format!("{} {prefix}{}", descriptor.icon, descriptor.name),
        "━━━━━━━━━━━━━━━━━━━━".to_string(),
        format!("📝 {}", descriptor.detailed),
        String::new(),
        format!("📂 category: {}", descriptor.category),
    ];

    if !descriptor.aliases.is_empty() {
        let aliases = descriptor
            .aliases
            .iter()
            .map(|alias| format!("{prefix}{alias}"))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("🏷️ aliases: {aliases}"));
    }

    if !descriptor.parameters.is_empty() {
        lines.push(String::new());
        lines.push("⚙️ parameters:".to_string());
        for (parameter, explanation) in descriptor.parameters {
            lines.push(format!("   {parameter}: {explanation}"));
        }
    }

    if !descriptor.examples.is_empty() {
        lines.push(String::new());
        lines.push("💡 examples:".to_string());
        for example in descriptor.examples {
            lines.push(format!("   {}", reprefix(example, prefix)));
        }
    }

    if !descriptor.notes.is_empty() {
        lines.push(String::new());
        lines.push("📌 notes:".to_string());
        for note in descriptor.notes {
            lines.push(format!("   • {note}"));
        }
    }

    lines.join("\n")
}

/// `#name or #alias1 or ...` for the overview line.
fn invocations(prefix: &str, command: &RegisteredCommand) -> String {
    std::iter::once(command.descriptor.name)
        .chain(command.descriptor.aliases.iter().copied())
        .map(|name| format!("{prefix}{name}"))
        .collect::<Vec<_>>()
        .join(" or ")
}

/// Rewrites an example written with the default `#` prefix for the active
/// prefix.
fn reprefix(example: &str, prefix: &str) -> String {
    match example.strip_prefix('#') {
        Some(rest) => format!("{prefix}{rest}"),
        None => example.to_string(),
    }
}
