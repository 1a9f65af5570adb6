//! Static metadata for every built-in command.
//!
//! A descriptor is everything the registry and the help command need to
//! know about a command besides its handler: names, argument grammar,
//! help text and the configuration switch that can turn it off. Chinese
//! aliases are kept because the user base types them interchangeably with
//! the English names.

/// Metadata describing one command.
#[derive(Debug)]
pub struct CommandDescriptor {
    /// Canonical name, also the help-ordering key.
    pub name: &'static str,
    /// Alternative names accepted after the prefix.
    pub aliases: &'static [&'static str],
    pub category: &'static str,
    /// One-line description for the help overview.
    pub description: &'static str,
    /// Longer description for the per-command help page.
    pub detailed: &'static str,
    /// Example invocations, written with the default `#` prefix. The help
    /// command rewrites them for the active prefix.
    pub examples: &'static [&'static str],
    /// `(parameter, explanation)` pairs for the help page.
    pub parameters: &'static [(&'static str, &'static str)],
    pub notes: &'static [&'static str],
    /// Emoji shown next to the command in help output.
    pub icon: &'static str,
    /// Regex fragment appended after the name alternation. Must consume the
    /// rest of the line; named groups become the command's arguments.
    pub argument_pattern: &'static str,
    /// `settings` switch controlling the command, `None` for always-on.
    pub enable_key: Option<&'static str>,
}

pub static HELP: CommandDescriptor = CommandDescriptor {
    name: "skytools",
    aliases: &["help"],
    category: "help",
    description: "show this help text",
    detailed: "Shows an overview of every command, or the detailed page for one command when a name is given.",
    examples: &["#skytools", "#help", "#help height"],
    parameters: &[("[command]", "optional, the command to describe in detail")],
    notes: &[],
    icon: "ℹ️",
    argument_pattern: r"(?:\s+(?P<command>\S+))?",
    enable_key: Some("enable_skytools_query"),
};

pub static HEIGHT: CommandDescriptor = CommandDescriptor {
    name: "height",
    aliases: &["身高"],
    category: "data queries",
    description: "query a player's height data",
    detailed: "Queries a player's detailed height data by long game id or friend code: scale value (s), height value (h), current height, shortest/tallest bounds, height type and the distance to each bound. Several query platforms are supported.",
    examples: &[
        "#height xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx",
        "#height mango xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx",
        "#height djs XXXX-XXXX-XXXX",
        "#height yt xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx XXXX-XXXX-XXXX",
    ],
    parameters: &[
        ("[platform]", "optional, the platform to query (mango/ovoav/yingtian or an alias); the default platform is used when omitted"),
        ("<game id>", "the long game id in UUID form, available in-game from settings → ask the sprite"),
        ("[friend code]", "optional, XXXX-XXXX-XXXX; recommended on the first query"),
    ],
    notes: &[
        "mango requires the long game id; the friend code is optional",
        "ovoav accepts either the long game id or the friend code",
        "yingtian requires the long game id; the friend code is optional",
        "include your friend code on the first query",
        "do not block the measuring friend afterwards, later queries would fail",
    ],
    icon: "📏",
    argument_pattern: r"(?:\s+(?P<platform>\w+))?(?:\s+(?P<game_id>\S+)(?:\s+(?P<friend_code>\S+))?)?",
    enable_key: Some("enable_height_query"),
};

pub static TASK: CommandDescriptor = CommandDescriptor {
    name: "task",
    aliases: &["rw", "任务", "每日任务"],
    category: "daily queries",
    description: "fetch today's daily-task image",
    detailed: "Fetches today's daily-task walkthrough image, with task locations and how to complete them.",
    examples: &["#task", "#rw", "#每日任务"],
    parameters: &[],
    notes: &[],
    icon: "🖼️",
    argument_pattern: "",
    enable_key: Some("enable_task_query"),
};

pub static CANDLE: CommandDescriptor = CommandDescriptor {
    name: "candle",
    aliases: &["dl", "大蜡", "大蜡烛"],
    category: "daily queries",
    description: "fetch today's big-candle locations image",
    detailed: "Fetches today's big-candle spawn locations, marked across the maps.",
    examples: &["#candle", "#dl", "#大蜡烛"],
    parameters: &[],
    notes: &[],
    icon: "💎",
    argument_pattern: "",
    enable_key: Some("enable_candle_query"),
};

pub static ANCESTOR: CommandDescriptor = CommandDescriptor {
    name: "ancestor",
    aliases: &["fk", "复刻", "先祖", "复刻先祖"],
    category: "event queries",
    description: "fetch this week's returning-ancestor image",
    detailed: "Fetches this week's returning ancestor: location, tradeable items and candle costs.",
    examples: &["#ancestor", "#fk", "#复刻"],
    parameters: &[],
    notes: &[],
    icon: "🧭",
    argument_pattern: "",
    enable_key: Some("enable_ancestor_query"),
};

pub static MAGIC: CommandDescriptor = CommandDescriptor {
    name: "magic",
    aliases: &["mf", "魔法", "每日魔法"],
    category: "daily queries",
    description: "fetch today's daily-magic image",
    detailed: "Fetches today's magic-shop offers and their candle/heart costs.",
    examples: &["#magic", "#mf", "#每日魔法"],
    parameters: &[],
    notes: &[],
    icon: "🔮",
    argument_pattern: "",
    enable_key: Some("enable_magic_query"),
};

pub static SEASON_CANDLE: CommandDescriptor = CommandDescriptor {
    name: "season_candle",
    aliases: &["scandel", "jl", "季蜡", "季节蜡烛", "季蜡位置"],
    category: "daily queries",
    description: "fetch today's season-candle locations image",
    detailed: "Fetches today's season-candle spawn locations, marked across the maps.",
    examples: &["#scandel", "#jl", "#季蜡"],
    parameters: &[],
    notes: &[],
    icon: "🕯️",
    argument_pattern: "",
    enable_key: Some("enable_season_candle_query"),
};

pub static CALENDAR: CommandDescriptor = CommandDescriptor {
    name: "calendar",
    aliases: &["rl", "日历", "活动日历"],
    category: "event queries",
    description: "fetch the event calendar image",
    detailed: "Fetches the current month's event calendar: returning ancestors, events and season end dates.",
    examples: &["#calendar", "#rl", "#日历"],
    parameters: &[],
    notes: &[],
    icon: "📅",
    argument_pattern: "",
    enable_key: Some("enable_calendar_query"),
};

pub static REDSTONE: CommandDescriptor = CommandDescriptor {
    name: "redstone",
    aliases: &["hs", "红石", "红石位置"],
    category: "daily queries",
    description: "fetch today's redstone locations image",
    detailed: "Fetches where red/dark stones fall today, with the exact maps and coordinates.",
    examples: &["#redstone", "#hs", "#红石"],
    parameters: &[],
    notes: &[],
    icon: "🔴",
    argument_pattern: "",
    enable_key: Some("enable_redstone_query"),
};

pub static SKYTEST: CommandDescriptor = CommandDescriptor {
    name: "skytest",
    aliases: &[],
    category: "utilities",
    description: "check the game server status",
    detailed: "Checks whether the game servers are up and returns the current status text.",
    examples: &["#skytest"],
    parameters: &[],
    notes: &[],
    icon: "🔍",
    argument_pattern: "",
    enable_key: Some("enable_skytest_query"),
};

pub static ALL: CommandDescriptor = CommandDescriptor {
    name: "all",
    aliases: &["所有", "全部", "汇总"],
    category: "daily queries",
    description: "fetch every daily report at once",
    detailed: "Fetches daily tasks, season candles, big candles, redstone, the returning ancestor, daily magic, the event calendar and the server status in one go.",
    examples: &["#all", "#所有", "#汇总"],
    parameters: &[],
    notes: &[
        "runs every enabled query in a fixed order",
        "disabled features are skipped automatically",
    ],
    icon: "📊",
    argument_pattern: "",
    enable_key: Some("enable_all_query"),
};

/// Every built-in descriptor, in registration order.
pub fn builtin_descriptors() -> [&'static CommandDescriptor; 11] {
    [
        &HELP,
        &HEIGHT,
        &TASK,
        &CANDLE,
        &ANCESTOR,
        &MAGIC,
        &SEASON_CANDLE,
        &CALENDAR,
        &REDSTONE,
        &SKYTEST,
        &ALL,
    ]
}
