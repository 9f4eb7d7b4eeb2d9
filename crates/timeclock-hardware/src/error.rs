//! Error types for tag reader operations.
//!
//! Covers the failure scenarios of a polling cycle (no answer from the tag,
//! collision, authentication refused), device disconnection and the
//! encoding of events crossing the reader pipe.

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur during hardware device operations.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Device is not connected or has been disconnected.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Invalid data received from device.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Tag protocol step failed (request, anticoll, select, auth or read).
    #[error("Tag {step} failed: {message}")]
    TagError { step: &'static str, message: String },

    /// Event line could not be encoded or decoded.
    #[error("Event encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with custom message.
    #[error("{0}")]
    Other(String),
}

impl HardwareError {
    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a new tag protocol error for the given step.
    pub fn tag(step: &'static str, message: impl Into<String>) -> Self {
        Self::TagError {
            step,
            message: message.into(),
        }
    }

    /// Create a generic error with custom message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Whether the device is gone and polling should stop.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected { .. })
    }
}
