use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

#[derive(Debug, Error)]
pub enum DiscordError {
    #[error("discord request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("discord API error ({status}): {body}")]
    Api { status: u16, body: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Backend(String),
    #[error("malformed list document: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to encode worker request: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("async invoke failed: {0}")]
    Invoke(String),
    #[error("queue send failed: {0}")]
    Queue(String),
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("unknown worker request type: {0}")]
    UnknownKind(String),
    #[error("malformed worker request: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error(transparent)]
    Discord(#[from] DiscordError),
}
