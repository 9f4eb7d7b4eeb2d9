//! Tag polling loop.
//!
//! [`TagReader`] owns one [`AnyTagDevice`] and a [`DebounceCache`]. Every
//! cycle it waits for a tag, resolves the UID, suppresses repeats within the
//! debounce window, tries to read the admin block and pushes a
//! [`CardEvent`] into the [`EventSender`]. Hardware errors only abandon the
//! current cycle.

use crate::channel::EventSender;
use crate::devices::AnyTagDevice;
use crate::traits::TagDevice;
use crate::{HardwareError, Result};
use std::time::Duration;
use timeclock_core::CardEvent;
use timeclock_core::constants::{
    ADMIN_SECTOR_BLOCK, DEFAULT_DEBOUNCE_SECS, DEFAULT_SECTOR_KEY, READER_POLL_PAUSE_MS,
};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Suppresses repeated reads of the same UID.
///
/// Only the most recent UID is remembered. A different UID always passes.
#[derive(Debug, Clone)]
pub struct DebounceCache {
    last_uid: Option<Vec<u8>>,
    last_seen: Option<Instant>,
    window: Duration,
}

impl DebounceCache {
    pub fn new(window: Duration) -> Self {
        Self {
            last_uid: None,
            last_seen: None,
            window,
        }
    }

    /// Whether a read of `uid` at `now` should produce an event.
    pub fn should_emit(&self, uid: &[u8], now: Instant) -> bool {
        match (&self.last_uid, self.last_seen) {
            (Some(last), Some(seen)) if last.as_slice() == uid => {
                now.saturating_duration_since(seen) >= self.window
            }
            _ => true,
        }
    }

    /// Remember `uid` as emitted at `now`.
    pub fn record(&mut self, uid: Vec<u8>, now: Instant) {
        self.last_uid = Some(uid);
        self.last_seen = Some(now);
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for DebounceCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_DEBOUNCE_SECS))
    }
}

/// Cloneable, idempotent stop signal for a running [`TagReader`].
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: std::sync::Arc<watch::Sender<bool>>,
}

impl StopHandle {
    /// Request the reader to stop. Calling it again has no effect.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Why [`TagReader::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    /// [`StopHandle::stop`] was called.
    Stopped,
    /// The event receiver was dropped.
    ChannelClosed,
}

/// Polling loop over a tag device.
///
/// # Examples
///
/// ```
/// use timeclock_hardware::channel::event_channel;
/// use timeclock_hardware::mock::MockTagDevice;
/// use timeclock_hardware::reader::TagReader;
///
/// #[tokio::main]
/// async fn main() -> timeclock_hardware::Result<()> {
///     let (device, handle) = MockTagDevice::new();
///     let (tx, mut rx) = event_channel();
///     let reader = TagReader::new(device.into());
///     let stop = reader.stop_handle();
///     let task = tokio::spawn(reader.run(tx));
///
///     handle.present(vec![0x04, 0xAB, 0xCD, 0xEF]).await?;
///     let event = rx.recv().await.unwrap();
///     assert_eq!(event.uid_hex(), "04ABCDEF");
///
///     stop.stop();
///     task.await.unwrap()?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct TagReader {
    device: AnyTagDevice,
    cache: DebounceCache,
    pause: Duration,
    stop_tx: std::sync::Arc<watch::Sender<bool>>,
    stop_rx: watch::Receiver<bool>,
}

impl TagReader {
    pub fn new(device: AnyTagDevice) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            device,
            cache: DebounceCache::default(),
            pause: Duration::from_millis(READER_POLL_PAUSE_MS),
            stop_tx: std::sync::Arc::new(stop_tx),
            stop_rx,
        }
    }

    /// Override the debounce window.
    pub fn with_debounce(mut self, window: Duration) -> Self {
        self.cache = DebounceCache::new(window);
        self
    }

    /// Override the pause between cycles.
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: self.stop_tx.clone(),
        }
    }

    /// Poll until stopped or the receiver is gone.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::Disconnected` if the device goes away.
    pub async fn run(mut self, sender: EventSender) -> Result<ReaderExit> {
        match self.device.get_reader_info().await {
            Ok(info) => info!(
                reader = %info.name,
                protocols = ?info.protocols,
                max_baud_rate = ?info.max_baud_rate,
                "starting tag reader"
            ),
            Err(e) => warn!(error = %e, "reader info unavailable"),
        }

        let mut stop_rx = self.stop_rx.clone();
        loop {
            if *stop_rx.borrow() {
                break;
            }

            let cycle = tokio::select! {
                biased;
                _ = stop_rx.changed() => break,
                cycle = async {
                    tokio::time::sleep(self.pause).await;
                    self.poll_once().await
                } => cycle,
            };

            match cycle {
                Ok(Some(event)) => {
                    if sender.send(event).is_err() {
                        info!("card event receiver gone, stopping reader");
                        return Ok(ReaderExit::ChannelClosed);
                    }
                }
                Ok(None) => {}
                Err(e) if e.is_disconnected() => {
                    warn!(error = %e, "tag device disconnected");
                    return Err(e);
                }
                Err(e) => debug!(error = %e, "read cycle aborted"),
            }
        }

        info!("tag reader stopped");
        Ok(ReaderExit::Stopped)
    }

    /// Run one polling cycle.
    ///
    /// Returns `Ok(None)` when the cycle produced no event (empty or
    /// debounced UID).
    ///
    /// # Errors
    ///
    /// Returns the hardware error that aborted the cycle.
    pub async fn poll_once(&mut self) -> Result<Option<CardEvent>> {
        debug!("waiting for next tag");
        self.device.wait_for_tag().await?;
        let tag_type = self.device.request().await?;
        let uid = self.device.anticoll().await?;
        if uid.is_empty() {
            debug!("no UID present");
            return Ok(None);
        }

        let uid_hex = hex::encode_upper(&uid);
        if !self.cache.should_emit(&uid, Instant::now()) {
            debug!(uid = %uid_hex, "UID within debounce window");
            return Ok(None);
        }
        info!(uid = %uid_hex, tag_type = ?tag_type, "tag_detected");

        let sector = if tag_type.has_sectors() {
            self.read_admin_sector(&uid).await
        } else {
            None
        };
        if let Err(e) = self.device.stop_crypto().await {
            debug!(error = %e, "stop_crypto failed");
        }

        self.cache.record(uid.clone(), Instant::now());
        Ok(Some(CardEvent { uid, sector }))
    }

    async fn read_admin_sector(&mut self, uid: &[u8]) -> Option<Vec<u8>> {
        match self.try_read_admin_sector(uid).await {
            Ok(block) => Some(block),
            Err(HardwareError::Disconnected { device }) => {
                warn!(device = %device, "device lost while reading admin sector");
                None
            }
            Err(e) => {
                debug!(error = %e, block = ADMIN_SECTOR_BLOCK, "admin sector not readable");
                None
            }
        }
    }

    async fn try_read_admin_sector(&mut self, uid: &[u8]) -> Result<Vec<u8>> {
        self.device.select_tag(uid).await?;
        self.device
            .card_auth(ADMIN_SECTOR_BLOCK, &DEFAULT_SECTOR_KEY, uid)
            .await?;
        self.device.read_block(ADMIN_SECTOR_BLOCK).await
    }
}
