//! Discord adapter (serenity).
//!
//! This crate implements the `seeds-core` MessagingPort over the Discord HTTP
//! API and the gateway cache, and feeds gateway events into the core relay.

use std::sync::Arc;

use async_trait::async_trait;

use serenity::{
    builder::{CreateMessage, EditMessage},
    cache::Cache,
    client::Context,
    http::Http,
    model::channel::{ChannelType, GuildChannel},
};

pub mod handler;
pub mod session;

use seeds_core::{
    domain::{ChannelId, GuildId, MessageId, MessageRef},
    errors::Error,
    messaging::{port::MessagingPort, types::TextChannel},
    Result,
};

#[derive(Clone)]
pub struct DiscordMessenger {
    http: Arc<Http>,
    cache: Arc<Cache>,
}

impl DiscordMessenger {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>) -> Self {
        Self { http, cache }
    }

    pub fn from_context(ctx: &Context) -> Self {
        Self::new(ctx.http.clone(), ctx.cache.clone())
    }

    fn dc_channel(channel_id: ChannelId) -> serenity::model::id::ChannelId {
        serenity::model::id::ChannelId::new(channel_id.0)
    }

    fn dc_msg_id(message_id: MessageId) -> serenity::model::id::MessageId {
        serenity::model::id::MessageId::new(message_id.0)
    }

    fn dc_guild(guild_id: GuildId) -> serenity::model::id::GuildId {
        serenity::model::id::GuildId::new(guild_id.0)
    }

    pub(crate) fn map_err(e: serenity::Error) -> Error {
        Error::External(format!("discord error: {e}"))
    }

    pub(crate) fn is_not_found(e: &serenity::Error) -> bool {
        match e {
            serenity::Error::Http(http) => http.status_code().is_some_and(|s| s.as_u16() == 404),
            _ => false,
        }
    }
}

/// Text and announcement channels count as text channels.
fn is_text_kind(kind: ChannelType) -> bool {
    matches!(kind, ChannelType::Text | ChannelType::News)
}

fn text_channel_entry(c: &GuildChannel) -> (ChannelType, TextChannel) {
    (
        c.kind,
        TextChannel {
            id: ChannelId(c.id.get()),
            name: c.name.clone(),
            position: c.position,
        },
    )
}

/// Keep text channels only, in display order.
pub(crate) fn text_channels_of(
    channels: impl IntoIterator<Item = (ChannelType, TextChannel)>,
) -> Vec<TextChannel> {
    let mut text: Vec<TextChannel> = channels
        .into_iter()
        .filter(|(kind, _)| is_text_kind(*kind))
        .map(|(_, c)| c)
        .collect();
    text.sort_by_key(|c| (c.position, c.id.0));
    text
}

#[async_trait]
impl MessagingPort for DiscordMessenger {
    async fn send_text(&self, channel_id: ChannelId, text: &str) -> Result<MessageRef> {
        let msg = Self::dc_channel(channel_id)
            .send_message(&self.http, CreateMessage::new().content(text))
            .await
            .map_err(Self::map_err)?;

        Ok(MessageRef {
            channel_id,
            message_id: MessageId(msg.id.get()),
        })
    }

    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()> {
        Self::dc_channel(msg.channel_id)
            .edit_message(
                &self.http,
                Self::dc_msg_id(msg.message_id),
                EditMessage::new().content(text),
            )
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        Self::dc_channel(msg.channel_id)
            .delete_message(&self.http, Self::dc_msg_id(msg.message_id))
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    /// Served from the gateway cache; HTTP only for a guild not cached yet.
    async fn text_channels(&self, guild_id: GuildId) -> Result<Vec<TextChannel>> {
        let cached = self
            .cache
            .guild(Self::dc_guild(guild_id))
            .map(|g| text_channels_of(g.channels.values().map(text_channel_entry)));
        if let Some(channels) = cached {
            return Ok(channels);
        }

        let channels = Self::dc_guild(guild_id)
            .channels(&self.http)
            .await
            .map_err(Self::map_err)?;
        Ok(text_channels_of(channels.values().map(text_channel_entry)))
    }
}
