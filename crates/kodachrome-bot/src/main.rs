//! Kodachrome - policy upload and evaluation bot
//!
//! Listens for `!policy` messages on Discord, saves the attached policy under
//! a generated nickname and runs the configured eval against it, replying
//! with the result link when the run finishes.

mod config;
mod discord;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use kodachrome_core::{Coordinator, DockerStyleNames, EvalDispatcher, PolicyStore};
use serenity::Client;
use tracing::{error, info, Level};

use crate::config::{BotConfig, Cli};
use crate::discord::Bot;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    kodachrome_core::init_tracing(cli.json, level);

    let config = match BotConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("{e:#}");
            std::process::exit(1);
        }
    };

    info!(
        version = kodachrome_core::VERSION,
        executable = %config.eval.executable,
        robot = %config.eval.robot,
        motion = %config.eval.eval_name,
        max_concurrency = config.eval.max_concurrency,
        timeout_secs = config.eval.timeout.as_secs_f64(),
        policy_dir = %config.store.store_dir.display(),
        "Starting kodachrome"
    );

    let store = PolicyStore::new(config.store.clone(), Arc::new(DockerStyleNames))
        .context("preparing policy directory")?;
    let dispatcher = EvalDispatcher::new(config.eval.clone());
    let coordinator = Coordinator::new(Arc::new(store), Arc::new(dispatcher));

    let mut client = Client::builder(&config.token, discord::gateway_intents())
        .event_handler(Bot::new(coordinator, config.prefix.clone()))
        .await
        .context("building Discord client")?;

    let shard_manager = Arc::clone(&client.shard_manager);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            shard_manager.shutdown_all().await;
        }
    });

    client.start().await.context("Discord gateway stopped")?;
    Ok(())
}
