/// Core error type for the admin bot.
///
/// Adapter crates map their specific errors into this type so the bot core can
/// decide between a user-facing summary and a log line.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("api error: {0}")]
    Api(String),

    #[error("invalid api response: {0}")]
    InvalidResponse(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
