//! Configuration file structures for skytools.
//!
//! The configuration is loaded from a TOML file, with every field optional:
//! missing sections and fields fall back to the declared defaults, so an
//! empty file is a valid (if unconfigured) setup. Values can also be
//! overridden through environment variables prefixed with `SKYTOOLS_`, using
//! `__` as the section separator (for example `SKYTOOLS_FORWARD__TOKEN`).
//!
//! Loading and validation are split: [`Config::load`] only parses, while
//! [`Config::into_snapshot`] validates and produces the immutable
//! [`ConfigSnapshot`] that the rest of the crate reads. Snapshots are
//! published atomically through the [`ConfigStore`], so an in-flight command
//! keeps the snapshot it started with even while a reload lands.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use log::debug;
use serde::Deserialize;

/// Default provider endpoints, substituted when a section leaves `url` empty.
const DEFAULT_PROVIDER_URLS: &[(&str, &str)] = &[
    ("task", "https://ovoav.com/api/sky/rwtp/rwt"),
    ("candle", "https://ovoav.com/api/sky/dlzwz/dl"),
    ("ancestor", "https://ovoav.com/api/sky/fkxz/xz"),
    ("magic", "https://ovoav.com/api/sky/mftp/mf"),
    ("season_candle", "https://ovoav.com/api/sky/jlwz/jl"),
    ("calendar", "https://ovoav.com/api/sky/rltp/rl"),
    ("redstone", "https://ovoav.com/api/sky/hstp/hs"),
    ("skytest", "https://ovoav.com/api/sky/gyzt/zt"),
];

/// Errors produced while loading or validating the configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read or did not parse as the expected shape.
    Parse(String),
    /// The file parsed but one or more values are unusable.
    Invalid(Vec<String>),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Parse(detail) => write!(f, "failed to parse configuration: {detail}"),
            ConfigError::Invalid(problems) => {
                write!(f, "invalid configuration: {}", problems.join("; "))
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Raw configuration, straight from the file. See [`ConfigSnapshot`] for the
/// validated form the rest of the crate consumes.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub plugin: PluginSection,
    pub forward: ForwardSection,
    pub height: HeightSection,
    pub task: ProviderSection,
    pub candle: ProviderSection,
    pub ancestor: ProviderSection,
    pub magic: ProviderSection,
    pub season_candle: ProviderSection,
    pub calendar: ProviderSection,
    pub redstone: ProviderSection,
    pub skytest: ProviderSection,
    pub settings: SettingsSection,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PluginSection {
    pub enabled: bool,
    pub config_version: String,
    /// Command prefix. Read once at startup; later file edits do not take
    /// effect until restart.
    pub command_prefix: String,
}

impl Default for PluginSection {
    fn default() -> Self {
        PluginSection {
            enabled: true,
            config_version: "2.0.2".to_string(),
            command_prefix: "#".to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ForwardSection {
    pub api_url: String,
    pub token: String,
    pub timeout: u64,
    pub enabled: bool,
}

impl Default for ForwardSection {
    fn default() -> Self {
        ForwardSection {
            api_url: "http://127.0.0.1:5222".to_string(),
            token: String::new(),
            timeout: 30,
            enabled: true,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct HeightSection {
    pub default_platform: String,
    /// `"platform:alias1,alias2"` entries, merged over the built-in aliases.
    pub platform_aliases: Vec<String>,
    pub enable_mango: bool,
    pub enable_ovoav: bool,
    pub enable_yingtian: bool,
    pub mango_url: String,
    pub mango_key: String,
    pub ovoav_url: String,
    pub ovoav_key: String,
    pub yingtian_url: String,
    pub yingtian_key: String,
    pub timeout: u64,
}

impl Default for HeightSection {
    fn default() -> Self {
        HeightSection {
            default_platform: "mango".to_string(),
            platform_aliases: vec![
                "mango:芒果,mg".to_string(),
                "ovoav:独角兽,djs".to_string(),
                "yingtian:应天,yt".to_string(),
            ],
            enable_mango: true,
            enable_ovoav: true,
            enable_yingtian: true,
            mango_url: "https://api.mangotool.cn/sky/out/cn".to_string(),
            mango_key: String::new(),
            ovoav_url: "https://ovoav.com/api/sky/sgwz/sgv1".to_string(),
            ovoav_key: String::new(),
            yingtian_url: "https://api.t1qq.com/api/sky/sc/sg".to_string(),
            yingtian_key: String::new(),
            timeout: 15,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    /// Endpoint URL. Left empty, the built-in endpoint for the section is
    /// used.
    pub url: String,
    pub key: String,
    pub timeout: u64,
}

impl Default for ProviderSection {
    fn default() -> Self {
        ProviderSection {
            url: String::new(),
            key: String::new(),
            timeout: 15,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SettingsSection {
    /// Command names listed first in the help overview, in this order.
    pub command_display_order: Vec<String>,
    /// `enable_*_query` feature switches, plus whatever else operators leave
    /// in the section. Only boolean values act as switches; the rest is
    /// ignored at validation time so an unknown key never breaks a reload.
    #[serde(flatten)]
    pub flags: HashMap<String, serde_json::Value>,
}

impl Default for SettingsSection {
    fn default() -> Self {
        SettingsSection {
            command_display_order: [
                "all",
                "height",
                "task",
                "candle",
                "season_candle",
                "ancestor",
                "magic",
                "calendar",
                "redstone",
                "skytest",
            ]
            .iter()
            .map(|name| name.to_string())
            .collect(),
            flags: HashMap::new(),
        }
    }
}

impl Config {
    /// Loads the configuration from `path`, merging `SKYTOOLS_*` environment
    /// variables over the file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Returns
    ///
    /// The parsed configuration, or a [`ConfigError::Parse`] describing what
    /// could not be read. Validation happens later, in
    /// [`Config::into_snapshot`].
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("SKYTOOLS_").split("__"))
            .extract()
            .map_err(|error| ConfigError::Parse(error.to_string()))
    }

    /// Validates the configuration and builds the immutable snapshot the
    /// rest of the crate reads.
    ///
    /// # Arguments
    ///
    /// * `active_prefix` - When reloading, the prefix pinned at startup. The
    ///   on-disk prefix is ignored in that case; changing the prefix requires
    ///   a restart.
    ///
    /// # Returns
    ///
    /// A snapshot with `version` 0 (the [`ConfigStore`] stamps the real
    /// version on publish), or [`ConfigError::Invalid`] listing every
    /// problem found.
    pub fn into_snapshot(self, active_prefix: Option<&str>) -> Result<ConfigSnapshot, ConfigError> {
        let mut problems = Vec::new();

        if self.plugin.command_prefix.is_empty() {
            problems.push("plugin.command_prefix must not be empty".to_string());
        }
        if self.forward.timeout == 0 {
            problems.push("forward.timeout must be at least 1 second".to_string());
        }
        if self.height.timeout == 0 {
            problems.push("height.timeout must be at least 1 second".to_string());
        }
        if self.height.default_platform.is_empty() {
            problems.push("height.default_platform must not be empty".to_string());
        }
        for entry in &self.height.platform_aliases {
            if !entry.contains(':') {
                problems.push(format!(
                    "height.platform_aliases entry {entry:?} is not in \"platform:alias,alias\" form"
                ));
            }
        }
        for (name, section) in self.provider_sections() {
            if section.timeout == 0 {
                problems.push(format!("{name}.timeout must be at least 1 second"));
            }
        }

        if !problems.is_empty() {
            return Err(ConfigError::Invalid(problems));
        }

        let mut aliases = HashMap::new();
        for entry in &self.height.platform_aliases {
            if let Some((platform, names)) = entry.split_once(':') {
                let platform = platform.trim().to_lowercase();
                for alias in names.split(',') {
                    let alias = alias.trim();
                    if !alias.is_empty() {
                        aliases.insert(alias.to_lowercase(), platform.clone());
                    }
                }
            }
        }

        let enabled = HashMap::from([
            ("mango".to_string(), self.height.enable_mango),
            ("ovoav".to_string(), self.height.enable_ovoav),
            ("yingtian".to_string(), self.height.enable_yingtian),
        ]);
        let apis = HashMap::from([
            (
                "mango".to_string(),
                PlatformApi {
                    url: self.height.mango_url.clone(),
                    key: self.height.mango_key.clone(),
                },
            ),
            (
                "ovoav".to_string(),
                PlatformApi {
                    url: self.height.ovoav_url.clone(),
                    key: self.height.ovoav_key.clone(),
                },
            ),
            (
                "yingtian".to_string(),
                PlatformApi {
                    url: self.height.yingtian_url.clone(),
                    key: self.height.yingtian_key.clone(),
                },
            ),
        ]);

        let mut providers = HashMap::new();
        for (name, section) in self.provider_sections() {
            let url = if section.url.is_empty() {
                DEFAULT_PROVIDER_URLS
                    .iter()
                    .find(|(default_name, _)| *default_name == name)
                    .map(|(_, url)| url.to_string())
                    .unwrap_or_default()
            } else {
                section.url.clone()
            };
            providers.insert(
                name.to_string(),
                ProviderSettings {
                    url,
                    key: section.key.clone(),
                    timeout: Duration::from_secs(section.timeout),
                },
            );
        }

        let mut flags = HashMap::new();
        for (key, value) in &self.settings.flags {
            match value.as_bool() {
                Some(enabled) => {
                    flags.insert(key.clone(), enabled);
                }
                None => debug!("ignoring non-boolean settings key {key:?}"),
            }
        }

        Ok(ConfigSnapshot {
            version: 0,
            prefix: active_prefix
                .unwrap_or(&self.plugin.command_prefix)
                .to_string(),
            plugin_enabled: self.plugin.enabled,
            forward: ForwardSettings {
                api_url: self.forward.api_url.trim_end_matches('/').to_string(),
                token: self.forward.token,
                timeout: Duration::from_secs(self.forward.timeout),
                enabled: self.forward.enabled,
            },
            height: HeightSettings {
                default_platform: self.height.default_platform.to_lowercase(),
                aliases,
                enabled,
                apis,
                timeout: Duration::from_secs(self.height.timeout),
            },
            providers,
            display_order: self.settings.command_display_order,
            flags,
        })
    }

    fn provider_sections(&self) -> [(&'static str, &ProviderSection); 8] {
        [
            ("task", &self.task),
            ("candle", &self.candle),
            ("ancestor", &self.ancestor),
            ("magic", &self.magic),
            ("season_candle", &self.season_candle),
            ("calendar", &self.calendar),
            ("redstone", &self.redstone),
            ("skytest", &self.skytest),
        ]
    }
}

/// Checks whether an API key is missing or still the placeholder shipped in
/// sample configurations.
pub fn is_placeholder_key(key: &str) -> bool {
    let key = key.trim();
    key.is_empty() || key.starts_with("your ") || key.starts_with("你的")
}

/// Endpoint and key for one height platform.
#[derive(Clone, Debug)]
pub struct PlatformApi {
    pub url: String,
    pub key: String,
}

/// Merged-forward gateway settings.
#[derive(Clone, Debug)]
pub struct ForwardSettings {
    pub api_url: String,
    pub token: String,
    pub timeout: Duration,
    pub enabled: bool,
}

/// Endpoint, key and timeout for one media/status provider.
#[derive(Clone, Debug)]
pub struct ProviderSettings {
    pub url: String,
    pub key: String,
    pub timeout: Duration,
}

/// Height-command settings with platform aliases flattened into a lookup
/// map.
#[derive(Clone, Debug)]
pub struct HeightSettings {
    pub default_platform: String,
    aliases: HashMap<String, String>,
    enabled: HashMap<String, bool>,
    apis: HashMap<String, PlatformApi>,
    pub timeout: Duration,
}

impl HeightSettings {
    /// Resolves a configured alias (already lowercased) to a platform id.
    pub fn alias_target(&self, alias: &str) -> Option<&str> {
        self.aliases.get(alias).map(String::as_str)
    }

    /// Whether the platform is enabled. Platforms without a switch (plugged
    /// in by a host) default to enabled.
    pub fn platform_enabled(&self, platform: &str) -> bool {
        self.enabled.get(platform).copied().unwrap_or(true)
    }

    /// Endpoint and key for the platform, if configured.
    pub fn api(&self, platform: &str) -> Option<&PlatformApi> {
        self.apis.get(platform)
    }
}

/// Immutable, validated view of the configuration. Everything that executes
/// a command reads one of these and never the raw [`Config`].
#[derive(Clone, Debug)]
pub struct ConfigSnapshot {
    /// Monotonic version stamped by the [`ConfigStore`] on publish.
    pub version: u64,
    pub prefix: String,
    pub plugin_enabled: bool,
    pub forward: ForwardSettings,
    pub height: HeightSettings,
    providers: HashMap<String, ProviderSettings>,
    pub display_order: Vec<String>,
    flags: HashMap<String, bool>,
}

impl ConfigSnapshot {
    /// Whether the feature behind `key` (an `enable_*_query` switch) is
    /// enabled. Unknown keys default to enabled.
    pub fn is_enabled(&self, key: &str) -> bool {
        self.flags.get(key).copied().unwrap_or(true)
    }

    /// Provider settings for a media/status command section.
    pub fn provider(&self, name: &str) -> Option<&ProviderSettings> {
        self.providers.get(name)
    }
}

/// Holds the current snapshot and swaps it atomically on reload.
///
/// Readers clone an `Arc` out under a momentary read lock; writers replace
/// the pointer under a momentary write lock. Neither side ever holds a lock
/// across I/O.
pub struct ConfigStore {
    current: RwLock<Arc<ConfigSnapshot>>,
}

impl ConfigStore {
    /// Creates a store holding `snapshot` as version 1.
    pub fn new(mut snapshot: ConfigSnapshot) -> ConfigStore {
        snapshot.version = 1;
        ConfigStore {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Returns the current snapshot. The caller keeps this exact snapshot
    /// for the whole operation, regardless of concurrent reloads.
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Publishes a new snapshot, stamping the next version.
    ///
    /// # Returns
    ///
    /// The version assigned to the published snapshot.
    pub fn publish(&self, mut snapshot: ConfigSnapshot) -> u64 {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        snapshot.version = current.version + 1;
        let version = snapshot.version;
        *current = Arc::new(snapshot);
        version
    }
}
