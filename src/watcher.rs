//! Hot-reload of the configuration file.
//!
//! Two watch modes cover the deployment spectrum: filesystem events
//! (debounced, since editors and sync tools write in bursts) when the
//! platform supports them, and mtime+content-hash polling everywhere else.
//! Mode selection is automatic: if the event backend fails to initialize,
//! the watcher drops to polling.
//!
//! A reload parses and validates the file off to the side and only then
//! publishes the new snapshot through the [`ConfigStore`]; a file that
//! fails validation is rejected wholesale and the previous snapshot stays
//! active. The command prefix is pinned at startup: a changed prefix on
//! disk is logged and ignored until restart.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use log::{debug, error, info, warn};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, ConfigStore};

/// What happened on a reload attempt, broadcast to subscribers.
#[derive(Clone, Debug)]
pub enum ReloadEvent {
    /// Initial value before any reload ran.
    Started,
    /// A new snapshot was published under this version.
    Applied { version: u64 },
    /// The file changed but could not be applied; the old snapshot stays.
    Rejected(String),
}

/// Which watch mode ended up active.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WatchMode {
    Events,
    Polling,
}

/// Tunables for both watch modes.
#[derive(Clone, Debug)]
pub struct WatcherSettings {
    /// Quiet period after the last filesystem event before reloading.
    pub debounce: Duration,
    /// Minimum gap between two reloads in event mode.
    pub cooldown: Duration,
    /// Polling-mode check interval.
    pub poll_interval: Duration,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        WatcherSettings {
            debounce: Duration::from_secs(2),
            cooldown: Duration::from_secs(3),
            poll_interval: Duration::from_secs(30),
        }
    }
}

/// Watches the configuration file and publishes validated snapshots.
pub struct ConfigWatcher {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    events: watch::Receiver<ReloadEvent>,
    mode: WatchMode,
    // keeps the notify backend alive in event mode
    _fs_watcher: Option<RecommendedWatcher>,
}

impl ConfigWatcher {
    /// Starts watching `path`, preferring filesystem events and falling
    /// back to polling when the event backend is unavailable.
    pub fn spawn(path: PathBuf, store: Arc<ConfigStore>, settings: WatcherSettings) -> ConfigWatcher {
        let (event_tx, event_rx) = watch::channel(ReloadEvent::Started);
        let cancel = CancellationToken::new();

        let (raw_tx, raw_rx) = mpsc::channel::<Result<Event, notify::Error>>(64);
        let fs_watcher = init_fs_watcher(&path, raw_tx);

        match fs_watcher {
            Some(fs_watcher) => {
                info!("watching {} for changes (event mode)", path.display());
                let task = tokio::spawn(event_loop(
                    raw_rx,
                    path,
                    store,
                    event_tx,
                    cancel.clone(),
                    settings,
                ));
                ConfigWatcher {
                    cancel,
                    task,
                    events: event_rx,
                    mode: WatchMode::Events,
                    _fs_watcher: Some(fs_watcher),
                }
            }
            None => {
                warn!(
                    "filesystem events unavailable, polling {} every {:?}",
                    path.display(),
                    settings.poll_interval
                );
                // take the baseline before returning, so edits racing the
                // spawn are still seen as changes
                let marker = file_marker_blocking(&path);
                let task = tokio::spawn(poll_loop(
                    path,
                    store,
                    event_tx,
                    cancel.clone(),
                    settings,
                    marker,
                ));
                ConfigWatcher {
                    cancel,
                    task,
                    events: event_rx,
                    mode: WatchMode::Polling,
                    _fs_watcher: None,
                }
            }
        }
    }

    /// Starts watching `path` in polling mode unconditionally.
    pub fn spawn_polling(
        path: PathBuf,
        store: Arc<ConfigStore>,
        settings: WatcherSettings,
    ) -> ConfigWatcher {
        let (event_tx, event_rx) = watch::channel(ReloadEvent::Started);
        let cancel = CancellationToken::new();
        info!(
            "polling {} for changes every {:?}",
            path.display(),
            settings.poll_interval
        );
        let marker = file_marker_blocking(&path);
        let task = tokio::spawn(poll_loop(
            path,
            store,
            event_tx,
            cancel.clone(),
            settings,
            marker,
        ));
        ConfigWatcher {
            cancel,
            task,
            events: event_rx,
            mode: WatchMode::Polling,
            _fs_watcher: None,
        }
    }

    pub fn mode(&self) -> WatchMode {
        self.mode
    }

    /// A receiver for reload notifications.
    pub fn subscribe(&self) -> watch::Receiver<ReloadEvent> {
        self.events.clone()
    }

    /// Stops the watcher and waits for its task to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

fn init_fs_watcher(
    path: &Path,
    raw_tx: mpsc::Sender<Result<Event, notify::Error>>,
) -> Option<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |result: Result<Event, notify::Error>| {
        // called from notify's own thread
        let _ = raw_tx.blocking_send(result);
    })
    .ok()?;

    // watch the parent directory: editors replace files by rename
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    watcher.watch(parent, RecursiveMode::NonRecursive).ok()?;
    Some(watcher)
}

async fn event_loop(
    mut raw_rx: mpsc::Receiver<Result<Event, notify::Error>>,
    path: PathBuf,
    store: Arc<ConfigStore>,
    event_tx: watch::Sender<ReloadEvent>,
    cancel: CancellationToken,
    settings: WatcherSettings,
) {
    let mut last_reload: Option<Instant> = None;

    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            received = raw_rx.recv() => received,
        };
        let Some(received) = received else { break };

        let relevant = match received {
            Ok(event) => event
                .paths
                .iter()
                .any(|event_path| event_path.file_name() == path.file_name()),
            Err(error) => {
                warn!("filesystem watch error: {error}");
                false
            }
        };
        if !relevant {
            continue;
        }
        if last_reload.is_some_and(|at| at.elapsed() < settings.cooldown) {
            debug!("reload cooldown active, ignoring event burst");
            continue;
        }

        // debounce: restart the quiet period on every further event
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(settings.debounce) => break,
                more = raw_rx.recv() => {
                    if more.is_none() {
                        break;
                    }
                }
            }
        }

        reload(&path, &store, &event_tx).await;
        last_reload = Some(Instant::now());
    }
}

async fn poll_loop(
    path: PathBuf,
    store: Arc<ConfigStore>,
    event_tx: watch::Sender<ReloadEvent>,
    cancel: CancellationToken,
    settings: WatcherSettings,
    mut marker: Option<FileMarker>,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(settings.poll_interval) => {}
        }

        let current = file_marker(&path).await;
        if current != marker {
            if current.is_some() {
                debug!("configuration file changed on disk");
                reload(&path, &store, &event_tx).await;
            } else {
                warn!("configuration file disappeared, keeping the current snapshot");
            }
            marker = current;
        }
    }
}

/// Identity of the file contents: modification time plus a content hash,
/// so editors that preserve mtime still trigger a reload.
#[derive(PartialEq)]
struct FileMarker {
    modified: SystemTime,
    digest: [u8; 32],
}

async fn file_marker(path: &Path) -> Option<FileMarker> {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    let modified = metadata.modified().ok()?;
    let contents = tokio::fs::read(path).await.ok()?;
    Some(FileMarker {
        modified,
        digest: Sha256::digest(&contents).into(),
    })
}

/// Startup-time variant of [`file_marker`], taken before the watch task is
/// spawned.
fn file_marker_blocking(path: &Path) -> Option<FileMarker> {
    let metadata = std::fs::metadata(path).ok()?;
    let modified = metadata.modified().ok()?;
    let contents = std::fs::read(path).ok()?;
    Some(FileMarker {
        modified,
        digest: Sha256::digest(&contents).into(),
    })
}

/// Parses, validates and publishes the file, or rejects it and keeps the
/// previous snapshot.
async fn reload(path: &Path, store: &ConfigStore, event_tx: &watch::Sender<ReloadEvent>) {
    let active_prefix = store.snapshot().prefix.clone();

    let config = match Config::load(path) {
        Ok(config) => config,
        Err(error) => {
            error!("configuration reload rejected: {error}");
            let _ = event_tx.send(ReloadEvent::Rejected(error.to_string()));
            return;
        }
    };

    if config.plugin.command_prefix != active_prefix {
        warn!(
            "the command prefix changed on disk ({:?} -> {:?}); prefix changes take effect on restart",
            active_prefix, config.plugin.command_prefix
        );
    }

    match config.into_snapshot(Some(&active_prefix)) {
        Ok(snapshot) => {
            let version = store.publish(snapshot);
            info!("configuration reloaded as version {version}");
            let _ = event_tx.send(ReloadEvent::Applied { version });
        }
        Err(error) => {
            error!("configuration reload rejected: {error}");
            let _ = event_tx.send(ReloadEvent::Rejected(error.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    fn fast_settings() -> WatcherSettings {
        WatcherSettings {
            debounce: Duration::from_millis(100),
            cooldown: Duration::from_millis(0),
            poll_interval: Duration::from_millis(50),
        }
    }

    fn setup(dir: &tempfile::TempDir, contents: &str) -> (PathBuf, Arc<ConfigStore>) {
        let path = dir.path().join("skytools.toml");
        std::fs::write(&path, contents).unwrap();
        let snapshot = Config::load(&path).unwrap().into_snapshot(None).unwrap();
        (path, Arc::new(ConfigStore::new(snapshot)))
    }

    async fn wait_for_event(
        events: &mut watch::Receiver<ReloadEvent>,
        want_applied: bool,
    ) -> ReloadEvent {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                events.changed().await.unwrap();
                let event = events.borrow_and_update().clone();
                match (&event, want_applied) {
                    (ReloadEvent::Applied { .. }, true) | (ReloadEvent::Rejected(_), false) => {
                        return event;
                    }
                    _ => {}
                }
            }
        })
        .await
        .expect("no reload event arrived in time")
    }

    #[tokio::test]
    #[serial]
    async fn test_polling_mode_applies_a_valid_change() {
        let dir = tempfile::tempdir().unwrap();
        let (path, store) = setup(&dir, "[forward]\ntimeout = 30\n");

        let watcher = ConfigWatcher::spawn_polling(path.clone(), store.clone(), fast_settings());
        assert_eq!(watcher.mode(), WatchMode::Polling);
        let mut events = watcher.subscribe();

        std::fs::write(&path, "[forward]\ntimeout = 7\n").unwrap();
        let event = wait_for_event(&mut events, true).await;

        match event {
            ReloadEvent::Applied { version } => assert_eq!(version, 2),
            other => panic!("expected Applied, got {other:?}"),
        }
        assert_eq!(
            store.snapshot().forward.timeout,
            Duration::from_secs(7)
        );
        watcher.stop().await;
    }

    #[tokio::test]
    #[serial]
    async fn test_invalid_file_is_rejected_and_old_snapshot_stays() {
        let dir = tempfile::tempdir().unwrap();
        let (path, store) = setup(&dir, "[forward]\ntimeout = 30\n");

        let watcher = ConfigWatcher::spawn_polling(path.clone(), store.clone(), fast_settings());
        let mut events = watcher.subscribe();

        std::fs::write(&path, "[forward]\ntimeout = 0\n").unwrap();
        let event = wait_for_event(&mut events, false).await;

        match event {
            ReloadEvent::Rejected(reason) => assert!(reason.contains("forward.timeout")),
            other => panic!("expected Rejected, got {other:?}"),
        }
        let snapshot = store.snapshot();
        assert_eq!(snapshot.version, 1);
        assert_eq!(snapshot.forward.timeout, Duration::from_secs(30));
        watcher.stop().await;
    }

    #[tokio::test]
    #[serial]
    async fn test_prefix_change_is_pinned_until_restart() {
        let dir = tempfile::tempdir().unwrap();
        let (path, store) = setup(&dir, "[plugin]\ncommand_prefix = \"#\"\n");

        let watcher = ConfigWatcher::spawn_polling(path.clone(), store.clone(), fast_settings());
        let mut events = watcher.subscribe();

        std::fs::write(
            &path,
            "[plugin]\ncommand_prefix = \"/\"\n\n[forward]\ntimeout = 9\n",
        )
        .unwrap();
        wait_for_event(&mut events, true).await;

        let snapshot = store.snapshot();
        // the rest of the file applied, the prefix did not
        assert_eq!(snapshot.prefix, "#");
        assert_eq!(snapshot.forward.timeout, Duration::from_secs(9));
        watcher.stop().await;
    }

    #[tokio::test]
    #[serial]
    async fn test_event_mode_applies_a_change() {
        let dir = tempfile::tempdir().unwrap();
        let (path, store) = setup(&dir, "[height]\ntimeout = 15\n");

        // spawn() picks event mode where the backend initializes; the small
        // poll interval keeps the test meaningful on platforms where it
        // does not
        let watcher = ConfigWatcher::spawn(path.clone(), store.clone(), fast_settings());
        let mut events = watcher.subscribe();

        std::fs::write(&path, "[height]\ntimeout = 4\n").unwrap();
        wait_for_event(&mut events, true).await;

        assert_eq!(store.snapshot().height.timeout, Duration::from_secs(4));
        watcher.stop().await;
    }
}
