//! Tag device trait definition.
//!
//! The [`TagDevice`] trait mirrors the step-by-step protocol of an ISO14443A
//! reader chip: wait for a tag in the field, request its type, resolve the
//! UID through anti-collision, then optionally select, authenticate and read
//! a data block. The [`TagReader`](crate::reader::TagReader) drives these
//! steps; implementations only talk to the chip.
//!
//! All methods use native `async fn` (Rust 1.90 + Edition 2024 RPITIT),
//! eliminating the need for the `async_trait` macro.

#![allow(async_fn_in_trait)]

use crate::error::Result;
use crate::types::{ReaderInfo, TagType};

/// Tag reader chip abstraction.
///
/// # Object Safety and Dynamic Dispatch
///
/// **NOTE**: This trait is NOT object-safe because `async fn` methods return
/// `impl Future`. You cannot use `Box<dyn TagDevice>`. For dynamic dispatch
/// use [`AnyTagDevice`](crate::devices::AnyTagDevice).
///
/// # Examples
///
/// ```no_run
/// use timeclock_hardware::traits::TagDevice;
/// use timeclock_hardware::error::Result;
///
/// async fn read_uid<D: TagDevice>(device: &mut D) -> Result<Vec<u8>> {
///     device.wait_for_tag().await?;
///     device.request().await?;
///     device.anticoll().await
/// }
/// ```
pub trait TagDevice: Send + Sync {
    /// Block until a tag enters the field.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::Disconnected` if the device went away.
    async fn wait_for_tag(&mut self) -> Result<()>;

    /// Send a request command and report the tag family.
    ///
    /// # Errors
    ///
    /// Returns an error if no tag answered.
    async fn request(&mut self) -> Result<TagType>;

    /// Run anti-collision and return the UID of the selected tag.
    ///
    /// An empty vector means the tag answered without a UID.
    ///
    /// # Errors
    ///
    /// Returns an error on collision or communication failure.
    async fn anticoll(&mut self) -> Result<Vec<u8>>;

    /// Select the tag with the given UID for authenticated access.
    ///
    /// # Errors
    ///
    /// Returns an error if the tag does not acknowledge the selection.
    async fn select_tag(&mut self, uid: &[u8]) -> Result<()>;

    /// Authenticate a block with key A.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is refused.
    async fn card_auth(&mut self, block: u8, key: &[u8; 6], uid: &[u8]) -> Result<()>;

    /// Read one 16 byte block after successful authentication.
    ///
    /// # Errors
    ///
    /// Returns an error if the block could not be read.
    async fn read_block(&mut self, block: u8) -> Result<Vec<u8>>;

    /// End the crypto session started by [`card_auth`](Self::card_auth).
    ///
    /// # Errors
    ///
    /// Returns an error on communication failure.
    async fn stop_crypto(&mut self) -> Result<()>;

    /// Get reader information.
    ///
    /// # Errors
    ///
    /// Returns an error if a communication error occurs while querying
    /// reader information.
    async fn get_reader_info(&self) -> Result<ReaderInfo>;
}
