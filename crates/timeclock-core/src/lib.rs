//! Shared domain types for the timeclock attendance kiosk.
//!
//! Everything that crosses a crate (or process) boundary lives here: the
//! [`CardEvent`] emitted by the tag reader, the derived [`CardId`], survey
//! [`Question`]s returned by the backend, admin key matching and the TOML
//! configuration.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use config::{ApiConfig, Config, ConfigStore, TerminalConfig, TimingConfig};
pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
