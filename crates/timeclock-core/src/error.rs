use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Card errors
    #[error("Invalid card UID: {0}")]
    InvalidCardUid(String),

    #[error("Invalid admin key: {0}")]
    InvalidAdminKey(String),

    // Backend payload errors
    #[error("Invalid question: {0}")]
    InvalidQuestion(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // State machine errors
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Unknown configuration key: {section}.{key}")]
    UnknownConfigKey { section: String, key: String },
}

pub type Result<T> = std::result::Result<T, Error>;
