use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use secrecy::SecretString;
use tokio::sync::{broadcast, watch};

use guildcast_core::GatewayEvent;
use guildcast_gateway::{GatewayConfig, DEFAULT_INTENTS};
use guildcast_server::ServerConfig;
use guildcast_store::FileTokenStore;

#[derive(Parser)]
#[command(
    name = "guildcast",
    about = "Relay filtered guild events to authenticated subscribers"
)]
struct Cli {
    /// Port to serve HTTP and WebSocket upgrades on.
    #[arg(long, default_value_t = 9090)]
    port: u16,

    /// JSON file holding the token -> guild table.
    #[arg(long, default_value = ".tokens.json")]
    tokens: PathBuf,

    /// Per-connection send queue depth.
    #[arg(long, default_value_t = 256)]
    max_send_queue: usize,

    /// Gateway intents bitmask.
    #[arg(long, default_value_t = DEFAULT_INTENTS)]
    intents: u64,

    /// Override the platform gateway URL.
    #[arg(long)]
    gateway_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let bot_token =
        std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN must be set to the bot token")?;

    let store = Arc::new(FileTokenStore::new(&cli.tokens));
    tracing::info!(path = %cli.tokens.display(), "token store ready");

    let (event_tx, _) = broadcast::channel::<GatewayEvent>(1024);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut gateway_config = GatewayConfig::new(SecretString::from(bot_token));
    gateway_config.intents = cli.intents;
    if let Some(url) = cli.gateway_url {
        gateway_config.url = url;
    }
    let gateway = tokio::spawn(guildcast_gateway::run_gateway(
        gateway_config,
        event_tx.clone(),
        shutdown_rx,
    ));

    let config = ServerConfig {
        port: cli.port,
        max_send_queue: cli.max_send_queue,
    };
    let handle = guildcast_server::start(config, store, event_tx).await?;
    tracing::info!(port = handle.port, "guildcast ready");

    tokio::signal::ctrl_c().await.context("ctrl-c handler")?;
    tracing::info!("shutting down");

    let _ = shutdown_tx.send(true);
    handle.shutdown();
    let _ = gateway.await;

    Ok(())
}
