//! Tag reader abstraction for the timeclock kiosk.
//!
//! This crate polls identification tags and turns them into
//! [`CardEvent`](timeclock_core::CardEvent)s for the kiosk.
//!
//! # Design Philosophy
//!
//! - **Async-first**: All device I/O uses native `async fn` in traits
//!   (Rust 1.90 + Edition 2024 RPITIT).
//! - **Enum dispatch**: [`AnyTagDevice`] wraps concrete devices because
//!   RPITIT traits cannot be used as trait objects.
//! - **Thread-safe**: Devices are `Send + Sync` so the reader can run as its
//!   own Tokio task.
//! - **Isolated**: The reader owns its debounce state and talks to the rest
//!   of the system only through the [`channel`] module, either in-process or
//!   across a child process pipe.
//!
//! # Example
//!
//! ```no_run
//! use timeclock_hardware::channel::event_channel;
//! use timeclock_hardware::mock::MockTagDevice;
//! use timeclock_hardware::reader::TagReader;
//!
//! # async fn example() -> timeclock_hardware::Result<()> {
//! let (device, handle) = MockTagDevice::new();
//! let (tx, mut rx) = event_channel();
//! tokio::spawn(TagReader::new(device.into()).run(tx));
//!
//! handle.present(vec![0x04, 0xAB, 0xCD, 0xEF]).await?;
//! if let Some(event) = rx.drain_latest() {
//!     println!("card {}", event.uid_hex());
//! }
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod devices;
pub mod error;
pub mod mock;
pub mod reader;
pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use channel::{EventReceiver, EventSender, ProcessBridge, event_channel, write_event};
pub use devices::AnyTagDevice;
pub use error::{HardwareError, Result};
pub use reader::{DebounceCache, ReaderExit, StopHandle, TagReader};
pub use traits::TagDevice;
pub use types::{ReaderInfo, TagType};
