//! skytools - a chat-command aggregator for Sky game-data queries.
//!
//! The crate matches prefixed text commands (`#task`, `#height`, ...),
//! fetches the requested data from third-party HTTP providers and delivers
//! the result through a merged-forward gateway, falling back to per-segment
//! delivery when the gateway is unavailable.
//!
//! The host embeds the crate through [`plugin::SkyPlugin`]: construct it
//! from a [`config::Config`] and a [`dispatch::ChatSink`], optionally
//! register extra commands and height platforms, start it, and feed it
//! incoming chat lines. Configuration changes on disk hot-apply through
//! [`watcher::ConfigWatcher`] without interrupting in-flight commands.

pub mod commands;
pub mod config;
pub mod dispatch;
pub mod executor;
pub mod platforms;
pub mod plugin;
pub mod providers;
pub mod utils;
pub mod watcher;

pub use config::{Config, ConfigSnapshot, ConfigStore};
pub use dispatch::{ChatSink, DispatchChannel, DispatchOutcome, DispatchPayload, Segment};
pub use executor::{CommandExecutor, ExecutionReport, InvocationState};
pub use plugin::SkyPlugin;
pub use watcher::{ConfigWatcher, ReloadEvent, WatchMode, WatcherSettings};
