use thiserror::Error;

/// Failures surfaced while handling a single user turn.
#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("storage error: {0}")]
    Persistence(String),
    #[error("invalid argument for {function}: {detail}")]
    InvalidArgument { function: String, detail: String },
    #[error("language model error: {0}")]
    Upstream(String),
    #[error("language model did not answer within {0}s")]
    UpstreamTimeout(u64),
    #[error("configuration error: {0}")]
    Config(String),
}

impl AssistantError {
    /// Whether retrying the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::UpstreamTimeout(_))
    }
}

impl From<rusqlite::Error> for AssistantError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AssistantError>;
