use std::sync::Arc;

use seeds_core::{config::Config, retry};
use tracing::{error, info};

mod livecheck;

#[tokio::main]
async fn main() -> Result<(), seeds_core::Error> {
    seeds_core::logging::init("seeds")?;

    // Credentials are checked once, before any session starts.
    let cfg = Arc::new(Config::load()?);

    if cfg.livechecker_enabled {
        match livecheck::spawn(cfg.livechecker_port) {
            Ok(_) => info!("Livechecker enabled on port {}", cfg.livechecker_port),
            Err(e) => error!("Failed to start livechecker: {e}"),
        }
    }

    retry::run_forever(cfg.retry_interval, || {
        let cfg = cfg.clone();
        async move {
            seeds_discord::session::run_session(cfg)
                .await
                .map_err(|e| seeds_core::Error::External(format!("discord bot failed: {e}")))
        }
    })
    .await;

    Ok(())
}
