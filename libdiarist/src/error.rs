//! Error types for Diarist

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DiaristError>;

#[derive(Error, Debug)]
pub enum DiaristError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiaristError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            DiaristError::InvalidInput(_) => 3,
            DiaristError::Config(_) => 2,
            DiaristError::Backend(BackendError::Api { status, .. })
                if *status == 401 || *status == 403 =>
            {
                2
            }
            DiaristError::Backend(_) => 1,
            DiaristError::Io(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

/// Failures reported by, or while talking to, the backend collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Backend returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Storage transfer failed: {0}")]
    Transfer(String),
}

impl BackendError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Network(_) | BackendError::RateLimit(_) => true,
            BackendError::Api { status, .. } => *status >= 500,
            BackendError::Decode(_) | BackendError::Transfer(_) => false,
        }
    }
}

/// Check if an error is transient and should be retried
pub fn is_transient_error(error: &DiaristError) -> bool {
    match error {
        DiaristError::Backend(backend_error) => backend_error.is_transient(),
        _ => false,
    }
}
