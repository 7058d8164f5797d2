//! Error types for Murmur

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MurmurError>;

#[derive(Error, Debug)]
pub enum MurmurError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl MurmurError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            MurmurError::InvalidInput(_) => 3,
            MurmurError::Api(ApiError::Authentication(_)) => 2,
            MurmurError::Api(_) => 1,
            MurmurError::Config(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required setting: {0}")]
    MissingField(String),

    #[error("Invalid setting value: {0}")]
    InvalidValue(String),
}

/// Failures at the REST/streaming boundary. Lookup failures are recovered
/// by the derivation engine; write failures propagate to the executor's
/// caller.
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),
}
