use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Instant,
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::{
    cache::{CachedCopy, MessageCache},
    domain::{GuildId, MessageId, MessageRef},
    messaging::{
        port::MessagingPort,
        types::{GalleryMessage, TextChannel},
    },
    Result,
};

/// Per-guild caches behind one lock.
///
/// The lock is held only for the duration of a single cache operation and
/// never across I/O.
#[derive(Debug)]
pub struct BotState {
    max_cache_size: usize,
    guild_caches: Mutex<HashMap<GuildId, MessageCache>>,
}

impl BotState {
    pub fn new(max_cache_size: usize) -> Self {
        Self {
            max_cache_size,
            guild_caches: Mutex::new(HashMap::new()),
        }
    }

    fn caches(&self) -> MutexGuard<'_, HashMap<GuildId, MessageCache>> {
        // A panic mid-operation leaves the maps structurally valid.
        self.guild_caches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_cache<T>(&self, guild_id: GuildId, f: impl FnOnce(&mut MessageCache) -> T) -> T {
        let mut caches = self.caches();
        let cache = caches
            .entry(guild_id)
            .or_insert_with(|| MessageCache::new(self.max_cache_size));
        f(cache)
    }

    pub fn cached_copy(&self, guild_id: GuildId, original_id: MessageId) -> Option<CachedCopy> {
        self.with_cache(guild_id, |cache| cache.cached_copy(original_id).cloned())
    }

    pub fn cache_message(&self, original: &GalleryMessage, copy: MessageRef, follow_up: bool) {
        self.with_cache(original.guild_id, |cache| {
            cache.cache_message(original, copy, follow_up)
        });
    }

    pub fn cache_message_at(
        &self,
        original: &GalleryMessage,
        copy: MessageRef,
        follow_up: bool,
        now: Instant,
    ) {
        self.with_cache(original.guild_id, |cache| {
            cache.cache_message_at(original, copy, follow_up, now)
        });
    }

    pub fn last_message(&self, guild_id: GuildId) -> Option<(GalleryMessage, Instant)> {
        self.with_cache(guild_id, |cache| {
            cache.last_message().map(|(msg, at)| (msg.clone(), at))
        })
    }

    pub fn forget(&self, guild_id: GuildId, original_id: MessageId) -> Option<CachedCopy> {
        self.with_cache(guild_id, |cache| cache.forget(original_id))
    }

    pub fn forget_copy(&self, guild_id: GuildId, copy: MessageRef) -> Option<MessageId> {
        self.with_cache(guild_id, |cache| cache.forget_copy(copy))
    }
}

/// One async lock per guild, held for a whole event.
///
/// Handlers of the same guild run one after another even when the gateway
/// dispatches them on separate tasks.
#[derive(Debug, Default)]
pub struct GuildLocks {
    inner: Mutex<HashMap<GuildId, Arc<AsyncMutex<()>>>>,
}

impl GuildLocks {
    pub async fn lock_guild(&self, guild_id: GuildId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self
                .inner
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            map.entry(guild_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// First text channel named exactly `name`.
pub fn find_channel<'a>(channels: &'a [TextChannel], name: &str) -> Option<&'a TextChannel> {
    channels.iter().find(|c| c.name == name)
}

/// Look up the mirror target for a guild. Not cached; every call lists the
/// guild's channels again.
pub async fn resolve_target_channel(
    port: &dyn MessagingPort,
    guild_id: GuildId,
    name: &str,
) -> Result<Option<TextChannel>> {
    let channels = port.text_channels(guild_id).await?;
    Ok(find_channel(&channels, name).cloned())
}
