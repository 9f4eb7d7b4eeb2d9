//! Mock tag reader implementation for testing and development.
//!
//! This module provides a simulated reader chip that can be controlled
//! programmatically for testing without requiring physical hardware.

use crate::{
    HardwareError, Result,
    traits::TagDevice,
    types::{ReaderInfo, TagType},
};
use timeclock_core::constants::SECTOR_BLOCK_LENGTH;
use tokio::sync::mpsc;

/// Protocol step at which a presented mock tag fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFault {
    /// The request command gets no answer.
    Request,
    /// Anti-collision reports an error.
    Anticoll,
    /// Anti-collision succeeds with an empty UID.
    EmptyUid,
    /// The tag does not acknowledge selection.
    Select,
    /// Key A is refused.
    Auth,
    /// The authenticated block read fails.
    Read,
}

/// A tag placed in the mock reader's field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockTag {
    pub uid: Vec<u8>,
    /// Content of the admin block. Tags without it refuse authentication.
    pub sector: Option<Vec<u8>>,
    pub fault: Option<MockFault>,
}

impl MockTag {
    pub fn new(uid: Vec<u8>) -> Self {
        Self {
            uid,
            sector: None,
            fault: None,
        }
    }

    /// Store data in the admin block, padded or cut to one block.
    pub fn with_sector(mut self, mut sector: Vec<u8>) -> Self {
        sector.resize(SECTOR_BLOCK_LENGTH, 0);
        self.sector = Some(sector);
        self
    }

    pub fn with_fault(mut self, fault: MockFault) -> Self {
        self.fault = Some(fault);
        self
    }
}

/// Mock tag reader for testing and development.
///
/// Each tag sent through the [`MockTagHandle`] is consumed by one call to
/// [`wait_for_tag`](TagDevice::wait_for_tag) and answers the following
/// protocol steps until the next one arrives.
///
/// # Examples
///
/// ```
/// use timeclock_hardware::mock::MockTagDevice;
/// use timeclock_hardware::traits::TagDevice;
///
/// #[tokio::main]
/// async fn main() -> timeclock_hardware::Result<()> {
///     let (mut device, handle) = MockTagDevice::new();
///
///     handle.present(vec![0x04, 0xAB, 0xCD, 0xEF]).await?;
///
///     device.wait_for_tag().await?;
///     device.request().await?;
///     assert_eq!(device.anticoll().await?, vec![0x04, 0xAB, 0xCD, 0xEF]);
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockTagDevice {
    /// Channel receiver for presented tags
    tag_rx: mpsc::Receiver<MockTag>,

    /// Tag currently in the field
    current: Option<MockTag>,

    /// Device name
    name: String,

    /// Whether an authenticated session is open
    crypto_active: bool,

    /// Number of stop_crypto calls, for assertions
    stop_crypto_calls: usize,

    /// Number of select_tag calls, for assertions
    select_calls: usize,
}

impl MockTagDevice {
    /// Create a new mock reader with the default name.
    ///
    /// Returns a tuple of (MockTagDevice, MockTagHandle) where the handle
    /// can be used to simulate tag presentations.
    pub fn new() -> (Self, MockTagHandle) {
        Self::with_name("Mock Tag Reader".to_string())
    }

    /// Create a new mock reader with a custom name.
    pub fn with_name(name: String) -> (Self, MockTagHandle) {
        let (tag_tx, tag_rx) = mpsc::channel(32);

        let device = Self {
            tag_rx,
            current: None,
            name,
            crypto_active: false,
            stop_crypto_calls: 0,
            select_calls: 0,
        };

        (device, MockTagHandle { tag_tx })
    }

    /// Whether an authenticated session is still open.
    pub fn crypto_active(&self) -> bool {
        self.crypto_active
    }

    /// Number of times the crypto session was stopped.
    pub fn stop_crypto_calls(&self) -> usize {
        self.stop_crypto_calls
    }

    /// Number of times a tag was selected.
    pub fn select_calls(&self) -> usize {
        self.select_calls
    }

    fn current(&self, step: &'static str) -> Result<&MockTag> {
        self.current
            .as_ref()
            .ok_or_else(|| HardwareError::tag(step, "no tag in field"))
    }

    fn check_fault(&self, step: &'static str, fault: MockFault) -> Result<&MockTag> {
        let tag = self.current(step)?;
        if tag.fault == Some(fault) {
            return Err(HardwareError::tag(step, "scripted fault"));
        }
        Ok(tag)
    }
}

impl TagDevice for MockTagDevice {
    async fn wait_for_tag(&mut self) -> Result<()> {
        let tag = self
            .tag_rx
            .recv()
            .await
            .ok_or_else(|| HardwareError::disconnected("mock tag channel closed"))?;
        self.current = Some(tag);
        Ok(())
    }

    async fn request(&mut self) -> Result<TagType> {
        let tag = self.check_fault("request", MockFault::Request)?;
        Ok(if tag.sector.is_some() {
            TagType::MifareClassic1K
        } else {
            TagType::MifareUltralight
        })
    }

    async fn anticoll(&mut self) -> Result<Vec<u8>> {
        let tag = self.check_fault("anticoll", MockFault::Anticoll)?;
        if tag.fault == Some(MockFault::EmptyUid) {
            return Ok(Vec::new());
        }
        Ok(tag.uid.clone())
    }

    async fn select_tag(&mut self, uid: &[u8]) -> Result<()> {
        self.select_calls += 1;
        let tag = self.check_fault("select", MockFault::Select)?;
        if tag.uid != uid {
            return Err(HardwareError::tag("select", "UID not in field"));
        }
        Ok(())
    }

    async fn card_auth(&mut self, _block: u8, _key: &[u8; 6], uid: &[u8]) -> Result<()> {
        let tag = self.check_fault("auth", MockFault::Auth)?;
        if tag.uid != uid || tag.sector.is_none() {
            return Err(HardwareError::tag("auth", "key refused"));
        }
        self.crypto_active = true;
        Ok(())
    }

    async fn read_block(&mut self, _block: u8) -> Result<Vec<u8>> {
        if !self.crypto_active {
            return Err(HardwareError::tag("read", "not authenticated"));
        }
        let tag = self.check_fault("read", MockFault::Read)?;
        tag.sector
            .clone()
            .ok_or_else(|| HardwareError::tag("read", "block empty"))
    }

    async fn stop_crypto(&mut self) -> Result<()> {
        self.crypto_active = false;
        self.stop_crypto_calls += 1;
        Ok(())
    }

    async fn get_reader_info(&self) -> Result<ReaderInfo> {
        Ok(ReaderInfo::new(self.name.clone(), vec!["ISO14443A".to_string()])
            .with_max_baud_rate(106_000))
    }
}

/// Handle for presenting tags to a [`MockTagDevice`].
#[derive(Debug, Clone)]
pub struct MockTagHandle {
    tag_tx: mpsc::Sender<MockTag>,
}

impl MockTagHandle {
    /// Present a plain tag with the given UID.
    ///
    /// # Errors
    ///
    /// Returns an error if the device has been dropped.
    pub async fn present(&self, uid: Vec<u8>) -> Result<()> {
        self.present_tag(MockTag::new(uid)).await
    }

    /// Present a tag whose admin block holds `sector`.
    ///
    /// # Errors
    ///
    /// Returns an error if the device has been dropped.
    pub async fn present_with_sector(&self, uid: Vec<u8>, sector: Vec<u8>) -> Result<()> {
        self.present_tag(MockTag::new(uid).with_sector(sector)).await
    }

    /// Present an arbitrary scripted tag.
    ///
    /// # Errors
    ///
    /// Returns an error if the device has been dropped.
    pub async fn present_tag(&self, tag: MockTag) -> Result<()> {
        self.tag_tx
            .send(tag)
            .await
            .map_err(|_| HardwareError::disconnected("mock tag channel closed"))
    }
}
