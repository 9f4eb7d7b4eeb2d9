//! Core constants for the attendance kiosk.
//!
//! This module centralises the fixed intervals, timeouts, tag layout values
//! and user-facing messages used throughout the workspace. Durations that an
//! operator may want to tune are mirrored as defaults in [`crate::config`];
//! the values here are the factory settings.
//!
//! # Usage
//!
//! ```
//! use timeclock_core::constants::*;
//! use std::time::Duration;
//!
//! assert_eq!(CARD_ID_BYTES, 4);
//! let window = Duration::from_secs(DEFAULT_DEBOUNCE_SECS);
//! assert_eq!(window.as_secs(), 10);
//! ```

// ============================================================================
// Tag Reader
// ============================================================================

/// Minimum time before the same UID may produce a second event.
pub const DEFAULT_DEBOUNCE_SECS: u64 = 10;

/// Pause between two poll cycles of the tag reader.
pub const READER_POLL_PAUSE_MS: u64 = 200;

/// Block holding the admin marker on Mifare Classic service cards.
pub const ADMIN_SECTOR_BLOCK: u8 = 4;

/// Factory default key A for Mifare Classic sectors.
pub const DEFAULT_SECTOR_KEY: [u8; 6] = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

/// Number of bytes returned by a single block read.
pub const SECTOR_BLOCK_LENGTH: usize = 16;

/// Number of UID bytes that make up the card id sent to the backend.
///
/// ```
/// use timeclock_core::CardId;
///
/// let id = CardId::from_uid(&[0x04, 0xab, 0x0c, 0xef, 0x99]).unwrap();
/// assert_eq!(id.as_str(), "04AB0CEF");
/// ```
pub const CARD_ID_BYTES: usize = 4;

// ============================================================================
// Orchestrator Intervals
// ============================================================================

/// How often the card event channel is drained.
pub const CARD_POLL_INTERVAL_MS: u64 = 500;

/// How often the clock on screen is refreshed.
pub const CLOCK_INTERVAL_MS: u64 = 1000;

/// How often the network interface snapshot is refreshed.
pub const NETWORK_REFRESH_SECS: u64 = 60;

/// How often a fresh authentication token is requested.
pub const DEFAULT_TOKEN_REFRESH_SECS: u64 = 60;

/// How often diagnostics and screenshots are uploaded.
pub const UPLOAD_INTERVAL_SECS: u64 = 30;

/// How often the screensaver condition is evaluated.
pub const SCREENSAVER_CHECK_SECS: u64 = 5;

/// Inactivity after which the display is blanked.
pub const DEFAULT_SCREENSAVER_SECS: u64 = 60;

// ============================================================================
// Auto-reset Timers
// ============================================================================

/// Time a question stays on screen before the session is abandoned.
pub const DEFAULT_QUESTION_TIMEOUT_SECS: u64 = 10;

/// Time the confirmation stays on screen.
pub const DEFAULT_CONFIRMATION_SECS: u64 = 3;

/// Time an error stays on screen.
pub const DEFAULT_ERROR_SECS: u64 = 2;

// ============================================================================
// Network
// ============================================================================

/// Timeout applied to every backend request.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Token exchange endpoint, relative to the base URL.
pub const TOKEN_PATH: &str = "auth/token/";

/// Prefix of the per-card attendance endpoint.
pub const ATTENDANCE_PATH: &str = "attendance";

/// Prefix of the terminal resource used for diagnostics and screenshots.
pub const TERMINAL_PATH: &str = "v1/attendance/terminal";

// ============================================================================
// Messages
// ============================================================================

/// Shown when the backend does not know the card and sends no detail.
pub const MSG_UNKNOWN_CARD: &str = "Unbekannte Karte";

/// Shown for any other rejected booking.
pub const MSG_BOOKING_ERROR: &str = "Buchungsfehler";

/// Shown when the backend could not be reached.
pub const MSG_NETWORK_ERROR: &str = "Netzwerkfehler";

// ============================================================================
// Display
// ============================================================================

/// Valid range of the backlight brightness value.
pub const MAX_BRIGHTNESS: u16 = 255;

/// Default backlight control file on the Raspberry Pi touch display.
pub const DEFAULT_BACKLIGHT_PATH: &str = "/sys/class/backlight/rpi_backlight/brightness";
