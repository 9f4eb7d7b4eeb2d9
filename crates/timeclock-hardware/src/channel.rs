//! Card event transport between the tag reader and the kiosk.
//!
//! The in-process form is an unbounded FIFO with a single producer and a
//! single consumer. The consumer polls it without blocking and only ever
//! acts on the most recent event; older queued events are dropped.
//!
//! The cross-process form runs the reader as a child process that writes
//! one JSON encoded [`CardEvent`] per line to its stdout. [`ProcessBridge`]
//! decodes those lines into an [`EventSender`]. A simulated child reads its
//! tags from stdin, which the bridge can hand to the parent.

use crate::{HardwareError, Result};
use std::process::Stdio;
use timeclock_core::CardEvent;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Create a connected sender/receiver pair.
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventReceiver { rx })
}

/// Producing side of the event channel.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<CardEvent>,
}

impl EventSender {
    /// Queue an event.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::Disconnected` if the receiver is gone.
    pub fn send(&self, event: CardEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| HardwareError::disconnected("card event receiver dropped"))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consuming side of the event channel.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<CardEvent>,
}

impl EventReceiver {
    /// Take every queued event and return only the newest one.
    ///
    /// Never blocks. Returns `None` if nothing is queued. Each discarded
    /// event is logged.
    ///
    /// # Examples
    ///
    /// ```
    /// use timeclock_core::CardEvent;
    /// use timeclock_hardware::channel::event_channel;
    ///
    /// let (tx, mut rx) = event_channel();
    /// assert!(rx.drain_latest().is_none());
    ///
    /// tx.send(CardEvent::new(vec![1])).unwrap();
    /// tx.send(CardEvent::new(vec![2])).unwrap();
    /// assert_eq!(rx.drain_latest().unwrap().uid, vec![2]);
    /// assert!(rx.drain_latest().is_none());
    /// ```
    pub fn drain_latest(&mut self) -> Option<CardEvent> {
        let mut latest = self.rx.try_recv().ok()?;
        while let Ok(next) = self.rx.try_recv() {
            info!(uid = %latest.uid_hex(), "discarding superseded card event");
            latest = next;
        }
        Some(latest)
    }

    /// Wait for the next event. Returns `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<CardEvent> {
        self.rx.recv().await
    }
}

/// Encode one event as a JSON line.
///
/// # Errors
///
/// Returns an error if writing to `writer` fails.
pub async fn write_event<W>(writer: &mut W, event: &CardEvent) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// Decode one JSON line into an event.
///
/// # Errors
///
/// Returns `HardwareError::Encoding` for malformed lines.
pub fn decode_event(line: &str) -> Result<CardEvent> {
    Ok(serde_json::from_str(line.trim())?)
}

/// Forward decoded events from `input` into `sender` until EOF.
///
/// Malformed lines are logged and skipped. Stops early when the receiver
/// is gone. Returns the number of events forwarded.
///
/// # Errors
///
/// Returns an error if reading from `input` fails.
pub async fn pump_lines<R>(input: R, sender: &EventSender) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut forwarded = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match decode_event(&line) {
            Ok(event) => {
                if sender.send(event).is_err() {
                    debug!("receiver gone, stopping pump");
                    break;
                }
                forwarded += 1;
            }
            Err(e) => warn!(line = %line, error = %e, "skipping malformed reader line"),
        }
    }

    Ok(forwarded)
}

/// A reader child process whose stdout feeds an [`EventSender`].
///
/// The child is killed when the bridge is dropped.
#[derive(Debug)]
pub struct ProcessBridge {
    child: Child,
    pump: JoinHandle<()>,
}

impl ProcessBridge {
    /// Spawn `command` with a piped stdout and start forwarding its events.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be started.
    pub fn spawn(command: Command, sender: EventSender) -> Result<Self> {
        Self::start(command, sender, Stdio::null())
    }

    /// Like [`spawn`](Self::spawn), with the child's stdin piped for
    /// [`take_stdin`](Self::take_stdin).
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be started.
    pub fn spawn_piped(command: Command, sender: EventSender) -> Result<Self> {
        Self::start(command, sender, Stdio::piped())
    }

    /// Writer for the child's stdin. Closing it ends a simulated reader.
    ///
    /// Returns `None` unless the bridge was started with
    /// [`spawn_piped`](Self::spawn_piped), or after the first call.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    fn start(mut command: Command, sender: EventSender, stdin: Stdio) -> Result<Self> {
        command
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HardwareError::other("reader stdout not captured"))?;
        info!(pid = ?child.id(), "reader_process_started");

        let pump = tokio::spawn(async move {
            match pump_lines(BufReader::new(stdout), &sender).await {
                Ok(count) => info!(events = count, "reader process output closed"),
                Err(e) => warn!(error = %e, "reader process pipe failed"),
            }
        });

        Ok(Self { child, pump })
    }

    /// Kill the child and wait for it to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the process could not be killed.
    pub async fn shutdown(mut self) -> Result<()> {
        self.pump.abort();
        if self.child.try_wait()?.is_none() {
            self.child.kill().await?;
        }
        info!("reader_process_stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_latest_keeps_only_newest() {
        let (tx, mut rx) = event_channel();
        for uid in 1..=3u8 {
            tx.send(CardEvent::new(vec![uid])).unwrap();
        }

        let latest = rx.drain_latest().unwrap();
        assert_eq!(latest.uid, vec![3]);
        assert!(rx.drain_latest().is_none());
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (tx, rx) = event_channel();
        drop(rx);
        assert!(tx.is_closed());
        assert!(tx.send(CardEvent::new(vec![1])).is_err());
    }

    #[tokio::test]
    async fn test_write_event_is_one_line() {
        let mut buffer = Vec::new();
        let event = CardEvent::new(vec![0x04, 0xAB]).with_sector(vec![0x12]);
        write_event(&mut buffer, &event).await.unwrap();

        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text, "{\"uid\":[4,171],\"sector\":[18]}\n");
        assert_eq!(decode_event(&text).unwrap(), event);
    }

    #[tokio::test]
    async fn test_pump_lines_skips_malformed() {
        let (tx, mut rx) = event_channel();
        let input: &[u8] = b"{\"uid\":[1],\"sector\":null}\ngarbage\n\n{\"uid\":[2],\"sector\":null}\n";

        let forwarded = pump_lines(input, &tx).await.unwrap();
        assert_eq!(forwarded, 2);
        assert_eq!(rx.recv().await.unwrap().uid, vec![1]);
        assert_eq!(rx.recv().await.unwrap().uid, vec![2]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_bridge_forwards_child_output() {
        let (tx, mut rx) = event_channel();
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg("echo '{\"uid\":[222,173],\"sector\":null}'");

        let mut bridge = ProcessBridge::spawn(command, tx).unwrap();
        assert!(bridge.take_stdin().is_none());
        let event = rx.recv().await.unwrap();
        assert_eq!(event.uid, vec![0xDE, 0xAD]);
        bridge.shutdown().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_bridge_piped_stdin() {
        let (tx, mut rx) = event_channel();
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(r#"while read uid; do echo "{\"uid\":[$uid],\"sector\":null}"; done"#);

        let mut bridge = ProcessBridge::spawn_piped(command, tx).unwrap();
        let mut stdin = bridge.take_stdin().unwrap();
        assert!(bridge.take_stdin().is_none());

        stdin.write_all(b"7\n").await.unwrap();
        stdin.flush().await.unwrap();
        assert_eq!(rx.recv().await.unwrap().uid, vec![7]);

        drop(stdin);
        assert!(rx.recv().await.is_none());
        bridge.shutdown().await.unwrap();
    }
}
