/// Core error type for the relay bot.
///
/// Adapter crates map their platform errors into this type so the session
/// loop can treat every outbound failure the same way (end session, retry).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
