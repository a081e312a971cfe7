use std::{future::Future, time::Duration};

use tokio::time::sleep;
use tracing::{error, warn};

use crate::Result;

/// Run bot sessions back to back, forever.
///
/// Each call to `session` must build everything it needs from scratch (client,
/// caches); nothing carries over between attempts. Every restart waits
/// `retry_interval`, whether the session failed or ended cleanly.
pub async fn run_forever<F, Fut>(retry_interval: Duration, mut session: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    loop {
        match session().await {
            Ok(()) => warn!(
                "bot session ended, restarting in {}",
                retry_interval.as_secs()
            ),
            Err(e) => {
                error!("{e}");
                error!("Retrying in {}", retry_interval.as_secs());
            }
        }
        sleep(retry_interval).await;
    }
}
