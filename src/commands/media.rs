//! The image commands (task, candle, ancestor, magic, season candle,
//! calendar, redstone), the server-status command and the one-shot `all`
//! aggregate.
//!
//! All the image commands share one handler parameterized by
//! [`MediaKind`]: they differ only in the configuration section they read
//! and the title they show.

use async_trait::async_trait;
use log::{debug, info};

use crate::commands::{CommandArgs, CommandFailure, CommandHandler, InvocationContext};
use crate::config::{ConfigSnapshot, ProviderSettings, is_placeholder_key};
use crate::dispatch::{DispatchPayload, Segment};

/// One image-producing query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MediaKind {
    Task,
    Candle,
    Ancestor,
    Magic,
    SeasonCandle,
    Calendar,
    Redstone,
}

impl MediaKind {
    /// The configuration section holding this provider's endpoint and key.
    pub fn section(self) -> &'static str {
        match self {
            MediaKind::Task => "task",
            MediaKind::Candle => "candle",
            MediaKind::Ancestor => "ancestor",
            MediaKind::Magic => "magic",
            MediaKind::SeasonCandle => "season_candle",
            MediaKind::Calendar => "calendar",
            MediaKind::Redstone => "redstone",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            MediaKind::Task => "daily tasks",
            MediaKind::Candle => "big candle locations",
            MediaKind::Ancestor => "returning ancestor",
            MediaKind::Magic => "daily magic",
            MediaKind::SeasonCandle => "season candle locations",
            MediaKind::Calendar => "event calendar",
            MediaKind::Redstone => "redstone locations",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            MediaKind::Task => "🖼️",
            MediaKind::Candle => "💎",
            MediaKind::Ancestor => "🧭",
            MediaKind::Magic => "🔮",
            MediaKind::SeasonCandle => "🕯️",
            MediaKind::Calendar => "📅",
            MediaKind::Redstone => "🔴",
        }
    }

    pub fn enable_key(self) -> &'static str {
        match self {
            MediaKind::Task => "enable_task_query",
            MediaKind::Candle => "enable_candle_query",
            MediaKind::Ancestor => "enable_ancestor_query",
            MediaKind::Magic => "enable_magic_query",
            MediaKind::SeasonCandle => "enable_season_candle_query",
            MediaKind::Calendar => "enable_calendar_query",
            MediaKind::Redstone => "enable_redstone_query",
        }
    }
}

fn provider_settings<'a>(
    snapshot: &'a ConfigSnapshot,
    section: &str,
) -> Result<&'a ProviderSettings, String> {
    let Some(settings) = snapshot.provider(section) else {
        return Err(format!("❌ the {section} provider is not configured"));
    };
    if is_placeholder_key(&settings.key) {
        return Err(format!("❌ the {section} API key is not configured"));
    }
    Ok(settings)
}

/// Handler behind every image command.
pub struct MediaCommand {
    kind: MediaKind,
}

impl MediaCommand {
    pub fn new(kind: MediaKind) -> MediaCommand {
        MediaCommand { kind }
    }
}

#[async_trait]
impl CommandHandler for MediaCommand {
    async fn execute(
        &self,
        _args: &CommandArgs,
        context: &InvocationContext<'_>,
    ) -> Result<DispatchPayload, CommandFailure> {
        let settings = match provider_settings(context.snapshot, self.kind.section()) {
            Ok(settings) => settings,
            Err(text) => return Ok(DispatchPayload::text(text)),
        };

        debug!("fetching the {} image", self.kind.title());
        match context
            .providers
            .fetch_image(&settings.url, &settings.key, settings.timeout)
            .await
        {
            Ok(image) => Ok(DispatchPayload::from_segments(vec![Segment::Image(image)])),
            Err(error) => Err(CommandFailure::new(
                format!("❌ failed to fetch the {} image: {error}", self.kind.title()),
                format!("{} provider: {error}", self.kind.section()),
            )),
        }
    }
}

/// The server-status command.
pub struct SkyTestCommand;

#[async_trait]
impl CommandHandler for SkyTestCommand {
    async fn execute(
        &self,
        _args: &CommandArgs,
        context: &InvocationContext<'_>,
    ) -> Result<DispatchPayload, CommandFailure> {
        let settings = match provider_settings(context.snapshot, "skytest") {
            Ok(settings) => settings,
            Err(text) => return Ok(DispatchPayload::text(text)),
        };

        match context
            .providers
            .fetch_status(&settings.url, &settings.key, settings.timeout)
            .await
        {
            Ok(status) => Ok(DispatchPayload::text(format!(
                "🔍 server status:\n━━━━━━━━━━━━━━━━\n{status}\n━━━━━━━━━━━━━━━━"
            ))),
            Err(error) => Err(CommandFailure::new(
                format!("❌ failed to check the server status: {error}"),
                format!("skytest provider: {error}"),
            )),
        }
    }
}

enum AllStep {
    Media(MediaKind),
    Status,
}

/// Fixed execution order of the aggregate command.
const EXECUTION_ORDER: &[AllStep] = &[
    AllStep::Media(MediaKind::Task),
    AllStep::Media(MediaKind::SeasonCandle),
    AllStep::Media(MediaKind::Candle),
    AllStep::Media(MediaKind::Redstone),
    AllStep::Media(MediaKind::Ancestor),
    AllStep::Media(MediaKind::Magic),
    AllStep::Media(MediaKind::Calendar),
    AllStep::Status,
];

/// The `all` command: every enabled query, one after the other, folded
/// into a single payload. A failing step contributes an error line instead
/// of aborting the rest.
pub struct AllCommand;

#[async_trait]
impl CommandHandler for AllCommand {
    async fn execute(
        &self,
        _args: &CommandArgs,
        context: &InvocationContext<'_>,
    ) -> Result<DispatchPayload, CommandFailure> {
        let snapshot = context.snapshot;
        let mut segments = Vec::new();
        let mut ran = 0usize;

        for step in EXECUTION_ORDER {
            match step {
                AllStep::Media(kind) => {
                    if !snapshot.is_enabled(kind.enable_key()) {
                        debug!("skipping disabled step {}", kind.section());
                        continue;
                    }
                    ran += 1;
                    let settings = match provider_settings(snapshot, kind.section()) {
                        Ok(settings) => settings,
                        Err(text) => {
                            segments.push(Segment::Text(format!(
                                "{} {}: {text}",
                                kind.icon(),
                                kind.title()
                            )));
                            continue;
                        }
                    };
                    match context
                        .providers
                        .fetch_image(&settings.url, &settings.key, settings.timeout)
                        .await
                    {
                        Ok(image) => {
                            segments.push(Segment::Text(format!(
                                "{} {}",
                                kind.icon(),
                                kind.title()
                            )));
                            segments.push(Segment::Image(image));
                        }
                        Err(error) => segments.push(Segment::Text(format!(
                            "{} {}: ❌ {error}",
                            kind.icon(),
                            kind.title()
                        ))),
                    }
                }
                AllStep::Status => {
                    if !snapshot.is_enabled("enable_skytest_query") {
                        continue;
                    }
                    ran += 1;
                    let settings = match provider_settings(snapshot, "skytest") {
                        Ok(settings) => settings,
                        Err(text) => {
                            segments.push(Segment::Text(format!("🔍 server status: {text}")));
                            continue;
                        }
                    };
                    match context
                        .providers
                        .fetch_status(&settings.url, &settings.key, settings.timeout)
                        .await
                    {
                        Ok(status) => segments
                            .push(Segment::Text(format!("🔍 server status:\n{status}"))),
                        Err(error) => segments
                            .push(Segment::Text(format!("🔍 server status: ❌ {error}"))),
                    }
                }
            }
        }

        if ran == 0 {
            return Ok(DispatchPayload::text(
                "❌ every aggregate query is disabled right now",
            ));
        }

        info!("aggregate query ran {ran} step(s)");
        Ok(DispatchPayload::from_segments(segments))
    }
}
