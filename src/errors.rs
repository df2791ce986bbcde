use thiserror::Error;

#[derive(Error, Debug)]
pub enum CastfeedError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Hub connection failed: {0}")]
    Connection(String),

    #[error("Hub protocol error: {0}")]
    Protocol(String),

    #[error("Event stream terminated: {0}")]
    StreamTerminated(String),

    #[error("Invalid cast hash: {0}")]
    InvalidHash(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Keyword extraction error: {0}")]
    Enrichment(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl From<&str> for CastfeedError {
    fn from(msg: &str) -> Self {
        Self::Custom(msg.to_string())
    }
}

impl From<String> for CastfeedError {
    fn from(msg: String) -> Self {
        Self::Custom(msg)
    }
}

pub type Result<T> = std::result::Result<T, CastfeedError>;
