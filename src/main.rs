//! Console front end for skytools: reads chat lines from stdin and prints
//! replies to stdout, with the full command pipeline (registries, config
//! watcher, merged-forward dispatch) running behind it.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use env_logger::Env;
use log::{debug, info};
use tokio::io::{AsyncBufReadExt, BufReader};

use skytools::config::Config;
use skytools::dispatch::ChatSink;
use skytools::plugin::SkyPlugin;

#[derive(Parser)]
#[command(name = "skytools", about = "Sky game-data query commands over stdin/stdout")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "skytools.toml")]
    config: PathBuf,
}

/// Degraded-channel sink writing to stdout.
struct StdioSink;

#[async_trait]
impl ChatSink for StdioSink {
    async fn send_text(&self, text: &str) -> anyhow::Result<()> {
        println!("{text}");
        Ok(())
    }

    async fn send_image(&self, image: &str) -> anyhow::Result<()> {
        println!("[image: {} characters]", image.len());
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = Config::load(&args.config)?;
    let mut plugin = SkyPlugin::new(config, Arc::new(StdioSink))?;
    plugin.start(Some(args.config))?;
    info!(
        "reading commands from stdin (prefix {:?}), ctrl-d to exit",
        plugin.config().prefix
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let report = plugin.handle_message(line).await?;
        debug!("invocation finished in state {:?}", report.state);
    }

    plugin.stop().await;
    Ok(())
}
