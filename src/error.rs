use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssistError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Upstream returned status {0}")]
    UpstreamStatus(u16),

    #[error("Upstream returned no body")]
    MissingBody,

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    EnvVarError(#[from] std::env::VarError),
}

impl From<reqwest::Error> for AssistError {
    fn from(e: reqwest::Error) -> Self {
        AssistError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AssistError>;
