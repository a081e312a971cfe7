//! Gateway event handler.
//!
//! Each callback converts the serenity payload into a core event, runs the
//! relay, and reports any error to the session so it can be restarted.

use std::sync::{Arc, Mutex};

use serenity::{
    async_trait,
    model::{
        channel::{Message, Reaction},
        event::MessageUpdateEvent,
        gateway::Ready,
        id::{ChannelId as DcChannelId, GuildId as DcGuildId, MessageId as DcMessageId},
    },
    prelude::*,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use seeds_core::{
    domain::{ChannelId, GuildId, MessageId, MessageRef, UserId},
    errors::Error,
    messaging::types::{
        Attachment, Author, BotIdentity, DeletedMessage, GalleryMessage, ReactionAdded,
    },
    relay::{Outcome, Relay},
    Result,
};

use crate::DiscordMessenger;

/// First handler error of a session. Reporting it stops the session.
#[derive(Default)]
pub struct SessionFailure {
    token: CancellationToken,
    error: Mutex<Option<Error>>,
}

impl SessionFailure {
    pub fn report(&self, e: Error) {
        let mut slot = self
            .error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_none() {
            *slot = Some(e);
        }
        self.token.cancel();
    }

    /// Resolves once a failure has been reported.
    pub async fn wait(&self) -> Error {
        self.token.cancelled().await;
        self.error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .unwrap_or_else(|| Error::External("session stopped".to_string()))
    }
}

pub struct Handler {
    relay: Arc<Relay>,
    failure: Arc<SessionFailure>,
}

impl Handler {
    pub fn new(relay: Arc<Relay>, failure: Arc<SessionFailure>) -> Self {
        Self { relay, failure }
    }

    fn finish(&self, event: &str, res: Result<Outcome>) {
        match res {
            Ok(outcome) => debug!("{event}: {outcome:?}"),
            Err(e) => {
                error!("{event} handler failed: {e}");
                self.failure.report(e);
            }
        }
    }
}

/// Name of a guild channel, from the gateway cache when possible.
async fn channel_name(
    ctx: &Context,
    guild_id: DcGuildId,
    channel_id: DcChannelId,
) -> Result<Option<String>> {
    let cached = ctx
        .cache
        .guild(guild_id)
        .and_then(|g| g.channels.get(&channel_id).map(|c| c.name.clone()));
    if cached.is_some() {
        return Ok(cached);
    }

    let channel = channel_id
        .to_channel(&ctx.http)
        .await
        .map_err(DiscordMessenger::map_err)?;
    Ok(channel.guild().map(|c| c.name))
}

/// Guild nickname, then global display name, then username.
pub(crate) fn display_name(nick: Option<&str>, global_name: Option<&str>, username: &str) -> String {
    nick.or(global_name).unwrap_or(username).to_string()
}

fn to_gallery_message(guild_id: DcGuildId, channel_name: String, msg: &Message) -> GalleryMessage {
    GalleryMessage {
        id: MessageId(msg.id.get()),
        guild_id: GuildId(guild_id.get()),
        channel_id: ChannelId(msg.channel_id.get()),
        channel_name,
        author: Author {
            id: UserId(msg.author.id.get()),
            display_name: display_name(
                msg.member.as_ref().and_then(|m| m.nick.as_deref()),
                msg.author.global_name.as_deref(),
                &msg.author.name,
            ),
        },
        content: msg.content.clone(),
        attachments: attachments_of(msg.attachments.iter().map(|a| a.url.as_str())),
        embed_count: msg.embeds.len(),
    }
}

pub(crate) fn attachments_of<'a>(urls: impl IntoIterator<Item = &'a str>) -> Vec<Attachment> {
    urls.into_iter()
        .map(|url| Attachment {
            url: url.to_string(),
        })
        .collect()
}

async fn on_message(relay: &Relay, ctx: &Context, msg: &Message) -> Result<Outcome> {
    let Some(guild_id) = msg.guild_id else {
        return Ok(Outcome::Ignored);
    };
    let Some(channel_name) = channel_name(ctx, guild_id, msg.channel_id).await? else {
        return Ok(Outcome::Ignored);
    };

    let message = to_gallery_message(guild_id, channel_name, msg);
    let port = DiscordMessenger::from_context(ctx);
    relay.on_message(&port, &message).await
}

async fn on_reaction(relay: &Relay, ctx: &Context, reaction: &Reaction) -> Result<Outcome> {
    let emoji = reaction.emoji.to_string();
    if !relay.is_deletion_emoji(&emoji) {
        return Ok(Outcome::Ignored);
    }
    let Some(message_author) = reaction.message_author_id else {
        debug!("reaction on {} without author id", reaction.message_id);
        return Ok(Outcome::Ignored);
    };

    let event = ReactionAdded {
        guild_id: reaction.guild_id.map(|g| GuildId(g.get())),
        message: MessageRef {
            channel_id: ChannelId(reaction.channel_id.get()),
            message_id: MessageId(reaction.message_id.get()),
        },
        message_author: UserId(message_author.get()),
        emoji,
        user_id: reaction.user_id.map(|u| UserId(u.get())),
        user_name: reaction.member.as_ref().map(|m| m.user.name.clone()),
    };
    let port = DiscordMessenger::from_context(ctx);
    relay.on_reaction_add(&port, &event).await
}

async fn on_update(
    relay: &Relay,
    ctx: &Context,
    new: Option<Message>,
    event: &MessageUpdateEvent,
) -> Result<Outcome> {
    let Some(guild_id) = event.guild_id else {
        return Ok(Outcome::Ignored);
    };
    let Some(channel_name) = channel_name(ctx, guild_id, event.channel_id).await? else {
        return Ok(Outcome::Ignored);
    };
    if !relay.is_source(&channel_name) {
        return Ok(Outcome::Ignored);
    }

    let msg = match new {
        Some(m) => m,
        None => match event.channel_id.message(&ctx.http, event.id).await {
            Ok(m) => m,
            // Deleted right after the edit; the delete event follows.
            Err(e) if DiscordMessenger::is_not_found(&e) => {
                debug!("edited message {} is gone", event.id);
                return Ok(Outcome::Ignored);
            }
            Err(e) => return Err(DiscordMessenger::map_err(e)),
        },
    };

    let after = to_gallery_message(guild_id, channel_name, &msg);
    let port = DiscordMessenger::from_context(ctx);
    relay.on_message_edit(&port, &after).await
}

async fn on_delete(
    relay: &Relay,
    ctx: &Context,
    channel_id: DcChannelId,
    message_id: DcMessageId,
    guild_id: Option<DcGuildId>,
) -> Result<Outcome> {
    let Some(guild_id) = guild_id else {
        return Ok(Outcome::Ignored);
    };
    let Some(channel_name) = channel_name(ctx, guild_id, channel_id).await? else {
        return Ok(Outcome::Ignored);
    };

    // The gateway drops the message from its cache before we see the event.
    let deleted = DeletedMessage {
        id: MessageId(message_id.get()),
        guild_id: GuildId(guild_id.get()),
        channel_name,
        author: None,
    };
    let port = DiscordMessenger::from_context(ctx);
    relay.on_message_delete(&port, &deleted).await
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        self.relay.on_ready(BotIdentity {
            id: UserId(ready.user.id.get()),
            name: ready.user.name.clone(),
        });
    }

    async fn message(&self, ctx: Context, new_message: Message) {
        let res = on_message(&self.relay, &ctx, &new_message).await;
        self.finish("message", res);
    }

    async fn reaction_add(&self, ctx: Context, add_reaction: Reaction) {
        let res = on_reaction(&self.relay, &ctx, &add_reaction).await;
        self.finish("reaction_add", res);
    }

    async fn message_update(
        &self,
        ctx: Context,
        _old_if_available: Option<Message>,
        new: Option<Message>,
        event: MessageUpdateEvent,
    ) {
        let res = on_update(&self.relay, &ctx, new, &event).await;
        self.finish("message_update", res);
    }

    async fn message_delete(
        &self,
        ctx: Context,
        channel_id: DcChannelId,
        deleted_message_id: DcMessageId,
        guild_id: Option<DcGuildId>,
    ) {
        let res = on_delete(&self.relay, &ctx, channel_id, deleted_message_id, guild_id).await;
        self.finish("message_delete", res);
    }
}
