//! Mock device implementations for testing and development.
//!
//! This module provides simulated device implementations that can be controlled
//! programmatically without requiring physical hardware.

pub mod simulate;
pub mod tag;

// Re-export commonly used types
pub use simulate::{feed_lines, parse_sim_line};
pub use tag::{MockFault, MockTag, MockTagDevice, MockTagHandle};
