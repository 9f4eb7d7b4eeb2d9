//! Enum wrapper for tag device dispatch.
//!
//! Native `async fn` in traits (RPITIT - Rust Edition 2024) are not
//! object-safe, so `Box<dyn TagDevice>` is not available. [`AnyTagDevice`]
//! provides concrete type dispatch at compile time instead, which also keeps
//! the futures `Send` for spawning the reader task.
//!
//! # Examples
//!
//! ```
//! use timeclock_hardware::devices::AnyTagDevice;
//! use timeclock_hardware::mock::MockTagDevice;
//!
//! let (device, _handle) = MockTagDevice::new();
//! let any_device = AnyTagDevice::Mock(device);
//! ```

use crate::mock::MockTagDevice;
use crate::traits::TagDevice;
use crate::types::{ReaderInfo, TagType};
use crate::Result;

/// Enum wrapper for tag reader device dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyTagDevice {
    /// Mock reader for development, simulation and testing.
    Mock(MockTagDevice),
    // TODO: add an Mfrc522 variant behind the `hardware-spi` feature once an
    // SPI driver crate is chosen for the target board.
}

impl TagDevice for AnyTagDevice {
    async fn wait_for_tag(&mut self) -> Result<()> {
        match self {
            Self::Mock(device) => device.wait_for_tag().await,
        }
    }

    async fn request(&mut self) -> Result<TagType> {
        match self {
            Self::Mock(device) => device.request().await,
        }
    }

    async fn anticoll(&mut self) -> Result<Vec<u8>> {
        match self {
            Self::Mock(device) => device.anticoll().await,
        }
    }

    async fn select_tag(&mut self, uid: &[u8]) -> Result<()> {
        match self {
            Self::Mock(device) => device.select_tag(uid).await,
        }
    }

    async fn card_auth(&mut self, block: u8, key: &[u8; 6], uid: &[u8]) -> Result<()> {
        match self {
            Self::Mock(device) => device.card_auth(block, key, uid).await,
        }
    }

    async fn read_block(&mut self, block: u8) -> Result<Vec<u8>> {
        match self {
            Self::Mock(device) => device.read_block(block).await,
        }
    }

    async fn stop_crypto(&mut self) -> Result<()> {
        match self {
            Self::Mock(device) => device.stop_crypto().await,
        }
    }

    async fn get_reader_info(&self) -> Result<ReaderInfo> {
        match self {
            Self::Mock(device) => device.get_reader_info().await,
        }
    }
}

impl From<MockTagDevice> for AnyTagDevice {
    fn from(device: MockTagDevice) -> Self {
        Self::Mock(device)
    }
}
