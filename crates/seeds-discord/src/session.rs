use std::sync::Arc;

use serenity::prelude::*;
use tracing::{info, warn};

use seeds_core::{config::Config, relay::Relay};

use crate::handler::{Handler, SessionFailure};
use crate::DiscordMessenger;

pub fn intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_MESSAGE_REACTIONS
        | GatewayIntents::MESSAGE_CONTENT
}

/// Run one bot session: fresh relay state, fresh gateway connection.
///
/// Returns when the client stops or the first handler error is reported; in
/// the latter case all shards are shut down and the handler error is returned.
pub async fn run_session(cfg: Arc<Config>) -> anyhow::Result<()> {
    let relay = Arc::new(Relay::new(cfg.clone()));
    let failure = Arc::new(SessionFailure::default());

    let mut client = Client::builder(&cfg.discord_token, intents())
        .event_handler(Handler::new(relay, failure.clone()))
        .await
        .map_err(DiscordMessenger::map_err)?;

    info!(
        "Watching #{} and mirroring into #{}",
        cfg.source_channel, cfg.target_channel
    );

    let shard_manager = client.shard_manager.clone();
    tokio::select! {
        res = client.start() => {
            res.map_err(DiscordMessenger::map_err)?;
            Ok(())
        }
        err = failure.wait() => {
            warn!("stopping session after handler failure");
            shard_manager.shutdown_all().await;
            Err(err.into())
        }
    }
}
