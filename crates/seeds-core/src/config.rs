use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

pub const TOKEN_ENV_VAR: &str = "DISCORD_TOKEN";
pub const TOKEN_FILE_NAME: &str = "discord_token";

pub const DEFAULT_SOURCE_CHANNEL: &str = "art-gallery";
pub const DEFAULT_TARGET_CHANNEL: &str = "art-discussion";
pub const DEFAULT_MAX_CACHE_SIZE: usize = 50;
pub const DEFAULT_FOLLOW_UP_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_DELETION_EMOJI: &str = "🚫";
pub const DEFAULT_LIVECHECKER_PORT: u16 = 8080;

/// Typed configuration for the relay bot.
#[derive(Clone, Debug)]
pub struct Config {
    // Credentials
    pub discord_token: String,

    // Channels
    pub source_channel: String,
    pub target_channel: String,

    // Mirroring behavior
    pub max_cache_size: usize,
    pub follow_up_ttl: Duration,
    pub deletion_emoji: String,

    // Supervision
    pub retry_interval: Duration,

    // Liveness endpoint
    pub livechecker_enabled: bool,
    pub livechecker_port: u16,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (the process environment in
    /// production, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let token_file = lookup("DISCORD_TOKEN_FILE")
            .and_then(non_empty)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(TOKEN_FILE_NAME));
        let discord_token = resolve_token(lookup(TOKEN_ENV_VAR), &token_file)?;

        let source_channel = lookup("ART_SOURCE_CHANNEL")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_SOURCE_CHANNEL.to_string());
        let target_channel = lookup("ART_TARGET_CHANNEL")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_TARGET_CHANNEL.to_string());

        // MessageCache requires a non-zero bound.
        let max_cache_size = parse_usize(lookup("MAX_CACHE_SIZE"))
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_CACHE_SIZE);
        let follow_up_ttl = parse_u64(lookup("FOLLOW_UP_TTL_SECS"))
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_FOLLOW_UP_TTL);
        let deletion_emoji = lookup("DELETION_EMOJI")
            .and_then(non_empty)
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| DEFAULT_DELETION_EMOJI.to_string());

        let retry_interval = parse_u64(lookup("RETRY_INTERVAL_SECS"))
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_RETRY_INTERVAL);

        let livechecker_enabled = parse_flag(lookup("ENABLE_LIVECHECKER")).unwrap_or(false);
        let livechecker_port = lookup("LIVECHECKER_PORT")
            .and_then(|s| s.trim().parse::<u16>().ok())
            .unwrap_or(DEFAULT_LIVECHECKER_PORT);

        Ok(Self {
            discord_token,
            source_channel,
            target_channel,
            max_cache_size,
            follow_up_ttl,
            deletion_emoji,
            retry_interval,
            livechecker_enabled,
            livechecker_port,
        })
    }
}

/// Env token wins when it is longer than 3 characters; otherwise the token file
/// is read and stripped of surrounding whitespace.
fn resolve_token(env_token: Option<String>, token_file: &Path) -> Result<String> {
    if let Some(token) = env_token {
        if token.chars().count() > 3 {
            return Ok(token);
        }
    }

    let missing = || {
        Error::Config(format!(
            "No {TOKEN_ENV_VAR} variable set and failed to load token file, please check if it exists: {}",
            token_file.display()
        ))
    };

    let contents = fs::read_to_string(token_file).map_err(|_| missing())?;
    let token = contents.trim();
    if token.is_empty() {
        return Err(missing());
    }
    Ok(token.to_string())
}

fn parse_flag(v: Option<String>) -> Option<bool> {
    v.map(|s| matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
}

fn parse_u64(v: Option<String>) -> Option<u64> {
    v.and_then(|s| s.trim().parse::<u64>().ok())
}

fn parse_usize(v: Option<String>) -> Option<usize> {
    v.and_then(|s| s.trim().parse::<usize>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
