use thiserror::Error;

#[derive(Error, Debug)]
pub enum KioskError {
    // Session errors
    #[error("No question is being asked")]
    NoActiveQuestion,

    #[error("Option '{key}' is not offered by question {question}")]
    UnknownOption { question: String, key: String },

    // Collaborator errors
    #[error("Screen capture failed: {0}")]
    Capture(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error(transparent)]
    Core(#[from] timeclock_core::Error),
}

pub type Result<T> = std::result::Result<T, KioskError>;
