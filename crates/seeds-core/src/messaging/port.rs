use async_trait::async_trait;

use crate::{
    domain::{ChannelId, GuildId, MessageRef},
    messaging::types::TextChannel,
    Result,
};

/// Outbound side of the chat platform.
///
/// The relay issues at most one of these calls per incoming event. Errors are
/// returned as-is; callers do not retry.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_text(&self, channel_id: ChannelId, text: &str) -> Result<MessageRef>;
    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()>;
    async fn delete_message(&self, msg: MessageRef) -> Result<()>;

    /// Text channels of a guild, in display (position) order.
    async fn text_channels(&self, guild_id: GuildId) -> Result<Vec<TextChannel>>;
}
