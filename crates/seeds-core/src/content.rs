use std::{
    sync::OnceLock,
    time::{Duration, Instant},
};

use regex::Regex;

use crate::messaging::types::GalleryMessage;

/// Anchored at the start of the text, and `.` stops at a newline, so only a
/// marker on the first line counts.
const LINK_DETECTION_PATTERN: &str = r"^.*(?:http://|www\.|\.com|\.net|\.org|\.io|\.eu|\.gl)";

fn link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(LINK_DETECTION_PATTERN).expect("valid regex"))
}

/// Text of the mirror posted for `message`.
///
/// Follow-ups skip the attribution header; attachment URLs go one per line
/// after the content.
pub fn build_content(message: &GalleryMessage, follow_up: bool, source_channel: &str) -> String {
    let mut content = if follow_up {
        String::new()
    } else {
        format!(
            "Post in {source_channel} by {}:\n",
            message.author.display_name
        )
    };

    content.push_str(&message.content);
    for attachment in &message.attachments {
        content.push('\n');
        content.push_str(&attachment.url);
    }
    content
}

pub fn contains_link(message: &GalleryMessage) -> bool {
    text_contains_link(&message.content)
}

pub fn text_contains_link(text: &str) -> bool {
    link_regex().is_match(&text.to_lowercase())
}

/// Whether `message` continues the last cached post of the same author.
pub fn is_follow_up(
    message: &GalleryMessage,
    last: Option<(&GalleryMessage, Instant)>,
    ttl: Duration,
) -> bool {
    is_follow_up_at(message, last, ttl, Instant::now())
}

pub fn is_follow_up_at(
    message: &GalleryMessage,
    last: Option<(&GalleryMessage, Instant)>,
    ttl: Duration,
    now: Instant,
) -> bool {
    let Some((last_message, recorded_at)) = last else {
        return false;
    };
    let elapsed = now.saturating_duration_since(recorded_at);
    last_message.author.id == message.author.id && elapsed < ttl
}

/// Posts worth mirroring: anything with media or a link, plus any follow-up.
pub fn should_mirror(message: &GalleryMessage, follow_up: bool) -> bool {
    message.has_embeds() || message.has_attachments() || contains_link(message) || follow_up
}
