//! Process wiring for the `run` and `check` commands.

use super::discord::DiscordHandler;
use super::handler::{HandlerSettings, MessageHandler};
use crate::config::Settings;
use crate::synology::{DownloadStation, SynologyClient};
use anyhow::Context as _;
use secrecy::ExposeSecret;
use serenity::Client;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Run the Discord transport until Ctrl-C or a gateway failure.
///
/// # Errors
///
/// Returns an error if the NAS client or the Discord client cannot be built,
/// or the gateway connection fails.
pub async fn run_bot(settings: Arc<Settings>) -> anyhow::Result<()> {
    let client = Arc::new(
        SynologyClient::new(settings.synology.clone())
            .context("Failed to initialize Synology client")?,
    );
    init_session(&client).await;

    let station: Arc<dyn DownloadStation> = client.clone();
    let handler = Arc::new(MessageHandler::new(
        station,
        HandlerSettings::from(settings.as_ref()),
    ));

    let mut discord = Client::builder(
        settings.discord_token.expose_secret(),
        DiscordHandler::intents(),
    )
    .event_handler(DiscordHandler::new(handler))
    .await
    .context("Failed to create Discord client")?;

    let shard_manager = discord.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        info!("Shutdown requested, closing gateway connection...");
        shard_manager.shutdown_all().await;
    });

    info!(channels = settings.channel_ids.len(), "Bot is running...");
    let result = discord.start().await;

    if let Err(e) = client.logout().await {
        warn!("Synology logout failed: {}", e);
    }
    info!("Bot stopped.");

    result.context("Discord gateway connection failed")
}

/// Log in once up front so configuration problems show up at startup.
/// A failure is not fatal; the first submission logs in again.
async fn init_session(client: &SynologyClient) {
    match client.authenticate().await {
        Ok(()) => info!("Synology session established."),
        Err(e) => warn!(
            "Synology login at startup failed, will retry on first download: {}",
            e
        ),
    }
}

/// Verify NAS connectivity: log in, list tasks, log out.
///
/// # Errors
///
/// Returns an error if any of the three steps fails.
pub async fn check_connection(settings: &Settings) -> anyhow::Result<()> {
    let client = SynologyClient::new(settings.synology.clone())
        .context("Failed to initialize Synology client")?;

    client.authenticate().await.context("Synology login failed")?;
    info!("Synology login OK.");

    let tasks = client
        .list_tasks()
        .await
        .context("Listing Download Station tasks failed")?;
    info!(total = tasks.total, "Download Station reachable.");

    client.logout().await.context("Synology logout failed")?;
    info!("Synology logout OK.");
    Ok(())
}
