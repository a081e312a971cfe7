//! Event-driven mirroring of gallery posts.
//!
//! Every handler issues at most one outbound call through the messaging port
//! and propagates its error unchanged. The only failure handled locally is a
//! missing target channel. Events of one guild are handled one at a time.

use std::sync::{Arc, Mutex};

use tracing::{debug, error, info};

use crate::{
    cache::CachedCopy,
    config::Config,
    content::{build_content, is_follow_up, should_mirror},
    domain::{MessageRef, UserId},
    messaging::{
        port::MessagingPort,
        types::{BotIdentity, DeletedMessage, GalleryMessage, ReactionAdded},
    },
    state::{resolve_target_channel, BotState, GuildLocks},
    Result,
};

/// What a handler did with an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Not ours to handle: bot-authored, wrong channel, wrong emoji.
    Ignored,
    /// Gallery post that does not qualify for mirroring.
    Skipped,
    /// Qualifying post, but the guild has no target channel.
    NoTargetChannel,
    /// Edit/delete of an original that has no live mirror.
    NotMirrored,
    Mirrored(CachedCopy),
    Edited(MessageRef),
    Deleted(MessageRef),
}

/// Application context for one bot session: config, caches and who we are.
pub struct Relay {
    cfg: Arc<Config>,
    state: BotState,
    locks: GuildLocks,
    identity: Mutex<Option<BotIdentity>>,
}

impl Relay {
    pub fn new(cfg: Arc<Config>) -> Self {
        let state = BotState::new(cfg.max_cache_size);
        Self {
            cfg,
            state,
            locks: GuildLocks::default(),
            identity: Mutex::new(None),
        }
    }

    #[cfg(test)]
    fn state(&self) -> &BotState {
        &self.state
    }

    pub fn identity(&self) -> Option<BotIdentity> {
        self.identity
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn is_self(&self, user_id: UserId) -> bool {
        self.identity().is_some_and(|me| me.id == user_id)
    }

    pub fn is_source(&self, channel_name: &str) -> bool {
        channel_name == self.cfg.source_channel
    }

    pub fn is_deletion_emoji(&self, emoji: &str) -> bool {
        emoji == self.cfg.deletion_emoji
    }

    pub fn on_ready(&self, me: BotIdentity) {
        info!("Bot logged in as {} with ID: {}", me.name, me.id.0);
        *self
            .identity
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(me);
    }

    pub async fn on_message(
        &self,
        port: &dyn MessagingPort,
        message: &GalleryMessage,
    ) -> Result<Outcome> {
        if self.is_self(message.author.id) || !self.is_source(&message.channel_name) {
            return Ok(Outcome::Ignored);
        }
        let _guild = self.locks.lock_guild(message.guild_id).await;

        debug!(
            "gallery post {}: embeds={} attachments={}",
            message.id.0,
            message.embed_count,
            message.attachments.len()
        );

        let last = self.state.last_message(message.guild_id);
        let follow_up = is_follow_up(
            message,
            last.as_ref().map(|(msg, at)| (msg, *at)),
            self.cfg.follow_up_ttl,
        );
        if !should_mirror(message, follow_up) {
            return Ok(Outcome::Skipped);
        }

        let content = build_content(message, follow_up, &self.cfg.source_channel);

        let Some(target) =
            resolve_target_channel(port, message.guild_id, &self.cfg.target_channel).await?
        else {
            error!(
                "Error: no target channel available ({})",
                self.cfg.target_channel
            );
            return Ok(Outcome::NoTargetChannel);
        };

        let copy = port.send_text(target.id, &content).await?;
        self.state.cache_message(message, copy, follow_up);
        info!(
            "mirrored {} -> {} (follow_up={follow_up})",
            message.id.0, copy.message_id.0
        );

        Ok(Outcome::Mirrored(CachedCopy {
            copy,
            follow_up,
            author_name: message.author.display_name.clone(),
        }))
    }

    /// Deletion emoji on a bot-authored message deletes it. Anyone may react.
    pub async fn on_reaction_add(
        &self,
        port: &dyn MessagingPort,
        reaction: &ReactionAdded,
    ) -> Result<Outcome> {
        if !self.is_self(reaction.message_author) || !self.is_deletion_emoji(&reaction.emoji) {
            return Ok(Outcome::Ignored);
        }
        let _guild = match reaction.guild_id {
            Some(guild_id) => Some(self.locks.lock_guild(guild_id).await),
            None => None,
        };

        let initiator = reaction
            .user_name
            .clone()
            .or_else(|| reaction.user_id.map(|u| u.0.to_string()))
            .unwrap_or_else(|| "unknown".to_string());
        info!("Message copy deletion initiated by {initiator}");

        port.delete_message(reaction.message).await?;
        if let Some(guild_id) = reaction.guild_id {
            self.state.forget_copy(guild_id, reaction.message);
        }

        Ok(Outcome::Deleted(reaction.message))
    }

    pub async fn on_message_edit(
        &self,
        port: &dyn MessagingPort,
        after: &GalleryMessage,
    ) -> Result<Outcome> {
        if self.is_self(after.author.id) || !self.is_source(&after.channel_name) {
            return Ok(Outcome::Ignored);
        }
        let _guild = self.locks.lock_guild(after.guild_id).await;

        let Some(cached) = self.state.cached_copy(after.guild_id, after.id) else {
            return Ok(Outcome::NotMirrored);
        };

        // The header names the author as first posted.
        let mut rendered = after.clone();
        rendered.author.display_name = cached.author_name;
        let content = build_content(&rendered, cached.follow_up, &self.cfg.source_channel);
        port.edit_text(cached.copy, &content).await?;

        Ok(Outcome::Edited(cached.copy))
    }

    pub async fn on_message_delete(
        &self,
        port: &dyn MessagingPort,
        deleted: &DeletedMessage,
    ) -> Result<Outcome> {
        if deleted.author.is_some_and(|a| self.is_self(a)) || !self.is_source(&deleted.channel_name)
        {
            return Ok(Outcome::Ignored);
        }
        let _guild = self.locks.lock_guild(deleted.guild_id).await;

        let Some(cached) = self.state.cached_copy(deleted.guild_id, deleted.id) else {
            return Ok(Outcome::NotMirrored);
        };

        port.delete_message(cached.copy).await?;
        self.state.forget(deleted.guild_id, deleted.id);

        Ok(Outcome::Deleted(cached.copy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChannelId, GuildId, MessageId};
    use crate::errors::Error;
    use crate::messaging::types::{Attachment, Author, TextChannel};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    const BOT: UserId = UserId(1);
    const GALLERY: ChannelId = ChannelId(10);
    const DISCUSSION: ChannelId = ChannelId(20);

    #[derive(Default)]
    struct FakeMessenger {
        next_id: Mutex<u64>,
        sends: Mutex<Vec<(ChannelId, String)>>,
        edits: Mutex<Vec<(MessageRef, String)>>,
        deletes: Mutex<Vec<MessageRef>>,
        channels: HashMap<GuildId, Vec<TextChannel>>,
        fail_sends: bool,
        yield_on_send: bool,
    }

    impl FakeMessenger {
        fn with_discussion(guilds: &[u64]) -> Self {
            let mut channels = HashMap::new();
            for g in guilds {
                channels.insert(
                    GuildId(*g),
                    vec![
                        TextChannel {
                            id: GALLERY,
                            name: "art-gallery".to_string(),
                            position: 0,
                        },
                        TextChannel {
                            id: DISCUSSION,
                            name: "art-discussion".to_string(),
                            position: 1,
                        },
                    ],
                );
            }
            Self {
                channels,
                ..Self::default()
            }
        }

        fn sent(&self) -> Vec<(ChannelId, String)> {
            self.sends.lock().unwrap().clone()
        }

        fn edited(&self) -> Vec<(MessageRef, String)> {
            self.edits.lock().unwrap().clone()
        }

        fn deleted(&self) -> Vec<MessageRef> {
            self.deletes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessagingPort for FakeMessenger {
        async fn send_text(&self, channel_id: ChannelId, text: &str) -> Result<MessageRef> {
            if self.yield_on_send {
                for _ in 0..3 {
                    tokio::task::yield_now().await;
                }
            }
            if self.fail_sends {
                return Err(Error::External("send failed".to_string()));
            }
            self.sends
                .lock()
                .unwrap()
                .push((channel_id, text.to_string()));
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            Ok(MessageRef {
                channel_id,
                message_id: MessageId(9000 + *next),
            })
        }

        async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()> {
            self.edits.lock().unwrap().push((msg, text.to_string()));
            Ok(())
        }

        async fn delete_message(&self, msg: MessageRef) -> Result<()> {
            self.deletes.lock().unwrap().push(msg);
            Ok(())
        }

        async fn text_channels(&self, guild_id: GuildId) -> Result<Vec<TextChannel>> {
            Ok(self.channels.get(&guild_id).cloned().unwrap_or_default())
        }
    }

    fn cfg() -> Arc<Config> {
        Arc::new(
            Config::from_lookup(|key| match key {
                "DISCORD_TOKEN" => Some("test-token".to_string()),
                _ => None,
            })
            .unwrap(),
        )
    }

    fn relay() -> Relay {
        let relay = Relay::new(cfg());
        relay.on_ready(BotIdentity {
            id: BOT,
            name: "seedsbot".to_string(),
        });
        relay
    }

    fn post(guild: u64, id: u64, author: u64, content: &str) -> GalleryMessage {
        GalleryMessage {
            id: MessageId(id),
            guild_id: GuildId(guild),
            channel_id: GALLERY,
            channel_name: "art-gallery".to_string(),
            author: Author {
                id: UserId(author),
                display_name: "Alice".to_string(),
            },
            content: content.to_string(),
            attachments: vec![],
            embed_count: 0,
        }
    }

    fn reaction(guild: u64, message: MessageRef, author: UserId, emoji: &str) -> ReactionAdded {
        ReactionAdded {
            guild_id: Some(GuildId(guild)),
            message,
            message_author: author,
            emoji: emoji.to_string(),
            user_id: Some(UserId(42)),
            user_name: Some("mod".to_string()),
        }
    }

    #[tokio::test]
    async fn mirror_edit_delete_lifecycle() {
        let relay = relay();
        let port = FakeMessenger::with_discussion(&[1]);

        let m1 = post(1, 100, 7, "new piece www.test.io");
        let outcome = relay.on_message(&port, &m1).await.unwrap();
        let Outcome::Mirrored(cached) = outcome.clone() else {
            panic!("expected mirror, got {outcome:?}");
        };
        assert!(!cached.follow_up);
        assert_eq!(
            port.sent(),
            vec![(
                DISCUSSION,
                "Post in art-gallery by Alice:\nnew piece www.test.io".to_string()
            )]
        );

        let mut edited = m1.clone();
        edited.content = "fixed typo www.test.io".to_string();
        assert_eq!(
            relay.on_message_edit(&port, &edited).await.unwrap(),
            Outcome::Edited(cached.copy)
        );
        assert_eq!(
            port.edited(),
            vec![(
                cached.copy,
                "Post in art-gallery by Alice:\nfixed typo www.test.io".to_string()
            )]
        );

        let deleted = DeletedMessage {
            id: m1.id,
            guild_id: m1.guild_id,
            channel_name: "art-gallery".to_string(),
            author: None,
        };
        assert_eq!(
            relay.on_message_delete(&port, &deleted).await.unwrap(),
            Outcome::Deleted(cached.copy)
        );
        assert_eq!(port.deleted(), vec![cached.copy]);

        // Terminal: the original is no longer tracked.
        assert_eq!(
            relay.on_message_edit(&port, &edited).await.unwrap(),
            Outcome::NotMirrored
        );
        assert_eq!(
            relay.on_message_delete(&port, &deleted).await.unwrap(),
            Outcome::NotMirrored
        );
        assert_eq!(port.deleted().len(), 1);
    }

    #[tokio::test]
    async fn deletion_emoji_on_bot_message_deletes_copy() {
        let relay = relay();
        let port = FakeMessenger::with_discussion(&[1]);

        let m1 = post(1, 100, 7, "www.test.io");
        let Outcome::Mirrored(cached) = relay.on_message(&port, &m1).await.unwrap() else {
            panic!("expected mirror");
        };

        let r = reaction(1, cached.copy, BOT, "🚫");
        assert_eq!(
            relay.on_reaction_add(&port, &r).await.unwrap(),
            Outcome::Deleted(cached.copy)
        );
        assert_eq!(port.deleted(), vec![cached.copy]);

        // The mirror is gone, so editing the original is a cache miss.
        assert_eq!(
            relay.on_message_edit(&port, &m1).await.unwrap(),
            Outcome::NotMirrored
        );
        assert!(port.edited().is_empty());
    }

    #[tokio::test]
    async fn reactions_that_do_not_qualify_are_ignored() {
        let relay = relay();
        let port = FakeMessenger::with_discussion(&[1]);
        let target = MessageRef {
            channel_id: DISCUSSION,
            message_id: MessageId(5),
        };

        let wrong_emoji = reaction(1, target, BOT, "👍");
        let not_ours = reaction(1, target, UserId(7), "🚫");
        assert_eq!(
            relay.on_reaction_add(&port, &wrong_emoji).await.unwrap(),
            Outcome::Ignored
        );
        assert_eq!(
            relay.on_reaction_add(&port, &not_ours).await.unwrap(),
            Outcome::Ignored
        );
        assert!(port.deleted().is_empty());
    }

    #[tokio::test]
    async fn plain_text_is_skipped_unless_follow_up() {
        let relay = relay();
        let port = FakeMessenger::with_discussion(&[1]);

        assert_eq!(
            relay
                .on_message(&port, &post(1, 1, 7, "just plain text"))
                .await
                .unwrap(),
            Outcome::Skipped
        );

        let mut art = post(1, 2, 7, "");
        art.attachments.push(Attachment {
            url: "https://cdn/a.png".to_string(),
        });
        assert!(matches!(
            relay.on_message(&port, &art).await.unwrap(),
            Outcome::Mirrored(CachedCopy {
                follow_up: false,
                ..
            })
        ));

        // Same author right after: mirrored without header even with no media.
        let outcome = relay
            .on_message(&port, &post(1, 3, 7, "wip, more tomorrow"))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            Outcome::Mirrored(CachedCopy {
                follow_up: true,
                ..
            })
        ));

        // A different author is not a follow-up.
        assert_eq!(
            relay
                .on_message(&port, &post(1, 4, 8, "nice!"))
                .await
                .unwrap(),
            Outcome::Skipped
        );

        let sent: Vec<String> = port.sent().into_iter().map(|(_, text)| text).collect();
        assert_eq!(
            sent,
            vec![
                "Post in art-gallery by Alice:\n\nhttps://cdn/a.png".to_string(),
                "wip, more tomorrow".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn follow_up_flag_is_kept_on_edit() {
        let relay = relay();
        let port = FakeMessenger::with_discussion(&[1]);

        relay
            .on_message(&port, &post(1, 1, 7, "www.a.io"))
            .await
            .unwrap();
        let second = post(1, 2, 7, "part two");
        let Outcome::Mirrored(cached) = relay.on_message(&port, &second).await.unwrap() else {
            panic!("expected follow-up mirror");
        };
        assert!(cached.follow_up);

        let mut edited = second.clone();
        edited.content = "part two (final)".to_string();
        relay.on_message_edit(&port, &edited).await.unwrap();
        assert_eq!(
            port.edited(),
            vec![(cached.copy, "part two (final)".to_string())]
        );
    }

    #[tokio::test]
    async fn expired_window_is_not_a_follow_up() {
        let relay = relay();
        let port = FakeMessenger::with_discussion(&[1]);
        let first = post(1, 1, 7, "www.a.io");

        // Pretend the previous post was cached six minutes ago.
        let long_ago = std::time::Instant::now()
            .checked_sub(Duration::from_secs(360))
            .unwrap();
        relay.state().cache_message_at(
            &first,
            MessageRef {
                channel_id: DISCUSSION,
                message_id: MessageId(1),
            },
            false,
            long_ago,
        );

        assert_eq!(
            relay
                .on_message(&port, &post(1, 2, 7, "no link here"))
                .await
                .unwrap(),
            Outcome::Skipped
        );
    }

    #[tokio::test]
    async fn missing_target_channel_is_not_an_error() {
        let relay = relay();
        let port = FakeMessenger::default();

        assert_eq!(
            relay
                .on_message(&port, &post(1, 1, 7, "http://x"))
                .await
                .unwrap(),
            Outcome::NoTargetChannel
        );
        assert!(port.sent().is_empty());
        assert!(relay.state().last_message(GuildId(1)).is_none());
    }

    #[tokio::test]
    async fn send_errors_propagate_and_nothing_is_cached() {
        let relay = relay();
        let port = FakeMessenger {
            fail_sends: true,
            ..FakeMessenger::with_discussion(&[1])
        };

        let res = relay.on_message(&port, &post(1, 1, 7, "http://x")).await;
        assert!(matches!(res, Err(Error::External(_))));
        assert!(relay.state().cached_copy(GuildId(1), MessageId(1)).is_none());
    }

    #[tokio::test]
    async fn own_and_off_channel_messages_are_ignored() {
        let relay = relay();
        let port = FakeMessenger::with_discussion(&[1]);

        let own = post(1, 1, BOT.0, "http://x");
        let mut elsewhere = post(1, 2, 7, "http://x");
        elsewhere.channel_name = "general".to_string();

        assert_eq!(relay.on_message(&port, &own).await.unwrap(), Outcome::Ignored);
        assert_eq!(
            relay.on_message(&port, &elsewhere).await.unwrap(),
            Outcome::Ignored
        );
        assert_eq!(
            relay.on_message_edit(&port, &elsewhere).await.unwrap(),
            Outcome::Ignored
        );

        let own_delete = DeletedMessage {
            id: MessageId(1),
            guild_id: GuildId(1),
            channel_name: "art-gallery".to_string(),
            author: Some(BOT),
        };
        assert_eq!(
            relay.on_message_delete(&port, &own_delete).await.unwrap(),
            Outcome::Ignored
        );
        assert!(port.sent().is_empty());
    }

    #[tokio::test]
    async fn follow_up_tracking_is_per_guild() {
        let relay = relay();
        let port = FakeMessenger::with_discussion(&[1, 2]);

        relay
            .on_message(&port, &post(1, 1, 7, "www.a.io"))
            .await
            .unwrap();
        assert_eq!(
            relay
                .on_message(&port, &post(2, 2, 7, "plain"))
                .await
                .unwrap(),
            Outcome::Skipped
        );
        assert!(relay.state().cached_copy(GuildId(2), MessageId(1)).is_none());
    }

    #[tokio::test]
    async fn edit_keeps_header_name_from_first_post() {
        let relay = relay();
        let port = FakeMessenger::with_discussion(&[1]);

        let m1 = post(1, 100, 7, "www.test.io");
        let Outcome::Mirrored(cached) = relay.on_message(&port, &m1).await.unwrap() else {
            panic!("expected mirror");
        };

        // The edit event only knows the account name, not the nickname.
        let mut edited = m1.clone();
        edited.author.display_name = "alice_global".to_string();
        edited.content = "www.test.io v2".to_string();
        relay.on_message_edit(&port, &edited).await.unwrap();

        assert_eq!(
            port.edited(),
            vec![(
                cached.copy,
                "Post in art-gallery by Alice:\nwww.test.io v2".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn overlapping_posts_of_one_guild_are_handled_in_order() {
        let relay = relay();
        let port = FakeMessenger {
            yield_on_send: true,
            ..FakeMessenger::with_discussion(&[1])
        };

        let first = post(1, 1, 7, "www.a.io");
        let second = post(1, 2, 7, "part two");
        let (a, b) = tokio::join!(
            relay.on_message(&port, &first),
            relay.on_message(&port, &second)
        );

        assert!(matches!(
            a.unwrap(),
            Outcome::Mirrored(CachedCopy {
                follow_up: false,
                ..
            })
        ));
        assert!(matches!(
            b.unwrap(),
            Outcome::Mirrored(CachedCopy {
                follow_up: true,
                ..
            })
        ));
        let sent: Vec<String> = port.sent().into_iter().map(|(_, text)| text).collect();
        assert_eq!(
            sent,
            vec![
                "Post in art-gallery by Alice:\nwww.a.io".to_string(),
                "part two".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn delete_arriving_during_send_removes_the_copy() {
        let relay = relay();
        let port = FakeMessenger {
            yield_on_send: true,
            ..FakeMessenger::with_discussion(&[1])
        };

        let m1 = post(1, 100, 7, "www.test.io");
        let deleted = DeletedMessage {
            id: m1.id,
            guild_id: m1.guild_id,
            channel_name: "art-gallery".to_string(),
            author: None,
        };
        let (mirrored, removed) = tokio::join!(
            relay.on_message(&port, &m1),
            relay.on_message_delete(&port, &deleted)
        );

        let Outcome::Mirrored(cached) = mirrored.unwrap() else {
            panic!("expected mirror");
        };
        assert_eq!(removed.unwrap(), Outcome::Deleted(cached.copy));
        assert_eq!(port.deleted(), vec![cached.copy]);
        assert!(relay.state().cached_copy(GuildId(1), m1.id).is_none());
    }
}
