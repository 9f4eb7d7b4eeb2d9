//! Common types shared across tag device implementations.

use serde::{Deserialize, Serialize};

/// Tag reader information.
///
/// Contains reader-specific metadata such as supported protocols
/// and maximum baud rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderInfo {
    /// Reader name (e.g., "MFRC522").
    pub name: String,

    /// List of supported protocols (e.g., ["ISO14443A"]).
    pub protocols: Vec<String>,

    /// Maximum supported baud rate in bits per second.
    pub max_baud_rate: Option<u32>,
}

impl ReaderInfo {
    /// Create a new ReaderInfo.
    pub fn new(name: impl Into<String>, protocols: Vec<String>) -> Self {
        Self {
            name: name.into(),
            protocols,
            max_baud_rate: None,
        }
    }

    /// Set the maximum baud rate.
    pub fn with_max_baud_rate(mut self, max_baud_rate: u32) -> Self {
        self.max_baud_rate = Some(max_baud_rate);
        self
    }
}

/// Tag family reported by the request step.
///
/// Derived from the ATQA (answer to request) bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagType {
    /// Mifare Classic 1K (ATQA 0x0004).
    MifareClassic1K,

    /// Mifare Classic 4K (ATQA 0x0002).
    MifareClassic4K,

    /// Mifare Ultralight / NTAG (ATQA 0x0044).
    MifareUltralight,

    /// Anything else, with the raw ATQA.
    Unknown(u16),
}

impl TagType {
    /// Classify a raw ATQA value.
    ///
    /// ```
    /// use timeclock_hardware::TagType;
    ///
    /// assert_eq!(TagType::from_atqa(0x0004), TagType::MifareClassic1K);
    /// assert_eq!(TagType::from_atqa(0x0344), TagType::Unknown(0x0344));
    /// ```
    pub fn from_atqa(atqa: u16) -> Self {
        match atqa {
            0x0004 => Self::MifareClassic1K,
            0x0002 => Self::MifareClassic4K,
            0x0044 => Self::MifareUltralight,
            other => Self::Unknown(other),
        }
    }

    /// Whether the tag has Mifare Classic sectors that can hold the admin marker.
    pub fn has_sectors(&self) -> bool {
        matches!(self, Self::MifareClassic1K | Self::MifareClassic4K)
    }
}
