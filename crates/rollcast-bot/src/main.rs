//! rollcast — chat-triggered dice rolls rendered through an OBS overlay.
//!
//! Startup order matters: OBS first (an unreachable server or unknown
//! scene is fatal), then command registration (bad commands are skipped),
//! then chat (auth failure is fatal). Runs until ctrl-c, then hides every
//! overlay source and disconnects.

use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use rollcast_chat::{ChatApi, ChatClient, CommandHandler};
use rollcast_engine::{BotConfig, Command, Dispatcher};
use rollcast_obs::{ObsApi, ObsClient, OverlayManager};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = BotConfig::load().expect("failed to load configuration");

    // OBS connection; the configured scene must exist before anything else
    // is wired up.
    tracing::info!(url = %config.obs.url(), "connecting to OBS");
    let obs_client = ObsClient::connect(&config.obs.host, config.obs.port, &config.obs.password)
        .await
        .expect("failed to connect to OBS");
    let obs: Arc<dyn ObsApi> = Arc::new(obs_client);
    obs.list_scene_items(&config.obs.scene)
        .await
        .expect("configured OBS scene not found");
    tracing::info!(scene = %config.obs.scene, "OBS scene resolved");

    let overlay = Arc::new(OverlayManager::new(
        obs.clone(),
        config.obs.scene.clone(),
        config.display.colors(),
    ));

    let chat_client = ChatClient::new(config.twitch.clone()).expect("invalid Twitch configuration");
    let chat: Arc<dyn ChatApi> = Arc::new(chat_client.handle());

    let dispatcher = Arc::new(Dispatcher::new(
        obs,
        overlay.clone(),
        chat,
        config.as_script_value(),
    ));

    // Register commands; a bad entry skips that command only.
    let mut registered = 0usize;
    for (name, command_config) in &config.commands {
        let command = match Command::from_config(name, command_config) {
            Ok(command) => Arc::new(command),
            Err(e) => {
                tracing::error!("skipping command: {e}");
                continue;
            }
        };
        let dispatcher = dispatcher.clone();
        let handler: CommandHandler = Arc::new(move |ctx| {
            let dispatcher = dispatcher.clone();
            let command = command.clone();
            Box::pin(async move {
                if let Err(e) = dispatcher.dispatch(&command, &ctx).await {
                    tracing::error!(command = %command.name(), "dispatch failed: {e}");
                }
            })
        });
        chat_client
            .register_command(name.clone(), handler)
            .expect("command registration halted");
        registered += 1;
    }
    if registered == 0 {
        panic!("no valid commands configured");
    }
    tracing::info!(commands = registered, "commands registered");

    let mut chat_client = chat_client;
    chat_client.start().await.expect("failed to connect to Twitch chat");
    chat_client
        .ready()
        .await
        .expect("Twitch chat authentication failed");
    tracing::info!("rollcast is up");

    tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    tracing::info!("shutting down");
    overlay.hide_all().await;
    chat_client.stop();
}
