use crate::domain::{ChannelId, GuildId, MessageId, MessageRef, UserId};

/// Who the bot is logged in as. Delivered once per session on ready.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: UserId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Author {
    pub id: UserId,
    /// Guild nickname if set, otherwise the account's display name.
    pub display_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub url: String,
}

/// A guild text-channel message as seen by the relay (new or edited).
///
/// Messages outside a guild never reach the relay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GalleryMessage {
    pub id: MessageId,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub author: Author,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub embed_count: usize,
}

impl GalleryMessage {
    pub fn has_embeds(&self) -> bool {
        self.embed_count > 0
    }

    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct ReactionAdded {
    pub guild_id: Option<GuildId>,
    pub message: MessageRef,
    pub message_author: UserId,
    pub emoji: String,
    pub user_id: Option<UserId>,
    pub user_name: Option<String>,
}

#[derive(Clone, Debug)]
pub struct DeletedMessage {
    pub id: MessageId,
    pub guild_id: GuildId,
    pub channel_name: String,
    /// Known only while the platform cache still holds the message.
    pub author: Option<UserId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextChannel {
    pub id: ChannelId,
    pub name: String,
    pub position: u16,
}
