//! The plugin facade: wires the registries, the config store, the watcher
//! and the executor together and drives their lifecycle.
//!
//! Hosts construct a [`SkyPlugin`] from a parsed [`Config`] and a
//! [`ChatSink`], optionally register extra commands and platforms, then
//! call [`SkyPlugin::start`]. Registration is only possible before start:
//! once running, the registries are frozen behind the executor and shared
//! across concurrent invocations.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use log::{debug, info};
use tokio::sync::watch;

use crate::commands::descriptor::{self, CommandDescriptor};
use crate::commands::height::HeightCommand;
use crate::commands::help::HelpCommand;
use crate::commands::media::{AllCommand, MediaCommand, MediaKind, SkyTestCommand};
use crate::commands::registry::CommandRegistry;
use crate::commands::CommandHandler;
use crate::config::{Config, ConfigSnapshot, ConfigStore};
use crate::dispatch::{ChatSink, MessageDispatcher};
use crate::executor::{CommandExecutor, ExecutionReport};
use crate::platforms::mango::MangoPlatform;
use crate::platforms::ovoav::OvoavPlatform;
use crate::platforms::registry::PlatformRegistry;
use crate::platforms::yingtian::YingtianPlatform;
use crate::platforms::PlatformHandler;
use crate::watcher::{ConfigWatcher, ReloadEvent, WatcherSettings};

struct Setup {
    registry: CommandRegistry,
    platforms: PlatformRegistry,
}

struct Running {
    executor: Arc<CommandExecutor>,
    watcher: Option<ConfigWatcher>,
}

/// The assembled plugin. See the module docs for the lifecycle.
pub struct SkyPlugin {
    store: Arc<ConfigStore>,
    sink: Arc<dyn ChatSink>,
    setup: Option<Setup>,
    running: Option<Running>,
}

impl SkyPlugin {
    /// Validates the configuration and assembles the plugin with every
    /// built-in command and platform registered.
    pub fn new(config: Config, sink: Arc<dyn ChatSink>) -> anyhow::Result<SkyPlugin> {
        let schema_tag = config.plugin.config_version.clone();
        let snapshot = config.into_snapshot(None)?;
        debug!("configuration validated (schema tag {schema_tag})");

        let store = Arc::new(ConfigStore::new(snapshot));
        let mut setup = Setup {
            registry: CommandRegistry::new(&store.snapshot().prefix),
            platforms: PlatformRegistry::new(),
        };
        register_builtins(&mut setup)?;

        Ok(SkyPlugin {
            store,
            sink,
            setup: Some(setup),
            running: None,
        })
    }

    /// Registers an extra command. Only allowed before [`SkyPlugin::start`].
    pub fn register_command(
        &mut self,
        descriptor: &'static CommandDescriptor,
        handler: Arc<dyn CommandHandler>,
    ) -> anyhow::Result<()> {
        let setup = self
            .setup
            .as_mut()
            .context("commands must be registered before start()")?;
        setup.registry.register(descriptor, handler)?;
        Ok(())
    }

    /// Registers an extra height platform. Only allowed before
    /// [`SkyPlugin::start`].
    pub fn register_platform(
        &mut self,
        id: &str,
        aliases: &[&str],
        handler: Arc<dyn PlatformHandler>,
    ) -> anyhow::Result<()> {
        let setup = self
            .setup
            .as_mut()
            .context("platforms must be registered before start()")?;
        setup.platforms.register(id, aliases, handler)?;
        Ok(())
    }

    /// Freezes the registries and starts the executor, plus the config
    /// watcher when a path is given. Must run inside a tokio runtime.
    pub fn start(&mut self, config_path: Option<PathBuf>) -> anyhow::Result<()> {
        self.start_with(config_path, WatcherSettings::default())
    }

    /// [`SkyPlugin::start`] with explicit watcher tunables.
    pub fn start_with(
        &mut self,
        config_path: Option<PathBuf>,
        watcher_settings: WatcherSettings,
    ) -> anyhow::Result<()> {
        let setup = self.setup.take().context("the plugin is already started")?;
        let snapshot = self.store.snapshot();

        let executor = Arc::new(CommandExecutor::new(
            Arc::new(setup.registry),
            Arc::new(setup.platforms),
            self.store.clone(),
            MessageDispatcher::new(self.sink.clone()),
        ));

        let watcher = match config_path {
            Some(path) if snapshot.plugin_enabled => Some(ConfigWatcher::spawn(
                path,
                self.store.clone(),
                watcher_settings,
            )),
            Some(_) => {
                info!("the plugin is disabled in the configuration, not watching the file");
                None
            }
            None => None,
        };

        info!(
            "skytools started (prefix {:?}, merged forward {})",
            snapshot.prefix,
            if snapshot.forward.enabled { "on" } else { "off" }
        );
        self.running = Some(Running { executor, watcher });
        Ok(())
    }

    /// Handles one incoming chat line.
    pub async fn handle_message(&self, input: &str) -> anyhow::Result<ExecutionReport> {
        let running = self.running.as_ref().context("the plugin is not started")?;
        Ok(running.executor.handle(input).await)
    }

    /// The executor, for hosts that spawn a task per message.
    pub fn executor(&self) -> Option<Arc<CommandExecutor>> {
        self.running.as_ref().map(|running| running.executor.clone())
    }

    /// The current configuration snapshot.
    pub fn config(&self) -> Arc<ConfigSnapshot> {
        self.store.snapshot()
    }

    /// Reload notifications, when a watcher is running.
    pub fn reload_events(&self) -> Option<watch::Receiver<ReloadEvent>> {
        self.running
            .as_ref()
            .and_then(|running| running.watcher.as_ref())
            .map(ConfigWatcher::subscribe)
    }

    /// Stops the watcher and drops the executor.
    pub async fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            if let Some(watcher) = running.watcher {
                watcher.stop().await;
            }
            info!("skytools stopped");
        }
    }
}

fn register_builtins(setup: &mut Setup) -> anyhow::Result<()> {
    setup
        .platforms
        .register("mango", &["mg", "芒果"], Arc::new(MangoPlatform::new()))?;
    setup
        .platforms
        .register("ovoav", &["独角兽", "djs"], Arc::new(OvoavPlatform::new()))?;
    setup
        .platforms
        .register("yingtian", &["应天", "yt"], Arc::new(YingtianPlatform::new()))?;

    setup
        .registry
        .register(&descriptor::HELP, Arc::new(HelpCommand))?;
    setup
        .registry
        .register(&descriptor::HEIGHT, Arc::new(HeightCommand))?;
    for (command, kind) in [
        (&descriptor::TASK, MediaKind::Task),
        (&descriptor::CANDLE, MediaKind::Candle),
        (&descriptor::ANCESTOR, MediaKind::Ancestor),
        (&descriptor::MAGIC, MediaKind::Magic),
        (&descriptor::SEASON_CANDLE, MediaKind::SeasonCandle),
        (&descriptor::CALENDAR, MediaKind::Calendar),
        (&descriptor::REDSTONE, MediaKind::Redstone),
    ] {
        setup
            .registry
            .register(command, Arc::new(MediaCommand::new(kind)))?;
    }
    setup
        .registry
        .register(&descriptor::SKYTEST, Arc::new(SkyTestCommand))?;
    setup
        .registry
        .register(&descriptor::ALL, Arc::new(AllCommand))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serial_test::serial;

    use super::*;
    use crate::dispatch::MockChatSink;
    use crate::executor::InvocationState;

    fn quiet_config() -> Config {
        let mut config = Config::default();
        config.forward.enabled = false;
        config
    }

    #[tokio::test]
    async fn test_help_round_trip_through_the_plugin() {
        let mut sink = MockChatSink::new();
        sink.expect_send_text()
            .withf(|text| text.contains("available commands") && text.contains("#height"))
            .times(1)
            .returning(|_| Ok(()));
        sink.expect_send_text()
            .withf(|text| text.contains("degraded mode"))
            .times(1)
            .returning(|_| Ok(()));

        let mut plugin = SkyPlugin::new(quiet_config(), Arc::new(sink)).unwrap();
        plugin.start(None).unwrap();

        let report = plugin.handle_message("#help").await.unwrap();
        assert_eq!(report.state, InvocationState::Completed);
        assert_eq!(report.command, Some("skytools"));
        plugin.stop().await;
    }

    #[tokio::test]
    async fn test_registration_is_rejected_after_start() {
        let mut plugin =
            SkyPlugin::new(quiet_config(), Arc::new(MockChatSink::new())).unwrap();
        plugin.start(None).unwrap();

        let result = plugin.register_command(&descriptor::TASK, Arc::new(HelpCommand));
        assert!(result.is_err());
        let result = plugin.register_platform("other", &[], Arc::new(MangoPlatform::new()));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_colliding_registration_fails_closed() {
        let mut plugin =
            SkyPlugin::new(quiet_config(), Arc::new(MockChatSink::new())).unwrap();

        // "task" is a builtin name
        let result = plugin.register_command(&descriptor::TASK, Arc::new(HelpCommand));
        assert!(result.is_err());
        // "mg" is a builtin platform alias
        let result = plugin.register_platform("mymango", &["mg"], Arc::new(MangoPlatform::new()));
        assert!(result.is_err());

        // the plugin still starts and serves the original commands
        plugin.start(None).unwrap();
        assert!(plugin.executor().is_some());
    }

    #[tokio::test]
    async fn test_handle_message_requires_start() {
        let plugin = SkyPlugin::new(quiet_config(), Arc::new(MockChatSink::new())).unwrap();
        assert!(plugin.handle_message("#help").await.is_err());
    }

    #[tokio::test]
    #[serial]
    async fn test_config_reload_applies_to_later_invocations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skytools.toml");
        std::fs::write(&path, "[forward]\nenabled = false\n").unwrap();

        let config = Config::load(&path).unwrap();
        let mut plugin = SkyPlugin::new(config, Arc::new(MockChatSink::new())).unwrap();
        plugin
            .start_with(
                Some(path.clone()),
                WatcherSettings {
                    debounce: Duration::from_millis(100),
                    cooldown: Duration::from_millis(0),
                    poll_interval: Duration::from_millis(50),
                },
            )
            .unwrap();

        let mut events = plugin.reload_events().unwrap();
        std::fs::write(
            &path,
            "[forward]\nenabled = false\n\n[height]\ntimeout = 3\n",
        )
        .unwrap();

        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                events.changed().await.unwrap();
                if matches!(*events.borrow_and_update(), ReloadEvent::Applied { .. }) {
                    break;
                }
            }
        })
        .await
        .expect("the reload never applied");

        let snapshot = plugin.config();
        assert_eq!(snapshot.version, 2);
        assert_eq!(snapshot.height.timeout, Duration::from_secs(3));
        plugin.stop().await;
    }
}
