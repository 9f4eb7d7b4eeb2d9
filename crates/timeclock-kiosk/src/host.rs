//! Host integrations: display power, backlight, screenshots and system
//! information.
//!
//! Every integration sits behind a small trait or a struct with a
//! configurable command so the orchestrator can be driven without an X
//! server or sysfs.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sysinfo::{Networks, System};
use timeclock_core::constants::MAX_BRIGHTNESS;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{KioskError, Result};

/// Switches the screen on and off for the screensaver.
pub trait DisplayPower {
    fn set_power(&mut self, on: bool);
}

/// DPMS control through `xset`.
///
/// The command runs detached; failures are logged and otherwise ignored.
#[derive(Debug, Clone)]
pub struct XsetDisplay {
    program: PathBuf,
}

impl XsetDisplay {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("/usr/bin/xset"),
        }
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for XsetDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayPower for XsetDisplay {
    fn set_power(&mut self, on: bool) {
        let mode = if on { "on" } else { "off" };
        let mut command = Command::new(&self.program);
        command
            .args(["dpms", "force", mode])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        match command.spawn() {
            Ok(mut child) => {
                tokio::spawn(async move {
                    match child.wait().await {
                        Ok(status) if !status.success() => {
                            warn!(mode, status = %status, "xset failed");
                        }
                        Err(e) => warn!(mode, error = %e, "xset wait failed"),
                        Ok(_) => {}
                    }
                });
            }
            Err(e) => warn!(mode, error = %e, "xset spawn failed"),
        }
    }
}

/// Records power requests instead of acting on them.
#[derive(Debug, Clone, Default)]
pub struct RecordingPower {
    calls: Arc<Mutex<Vec<bool>>>,
}

impl RecordingPower {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<bool> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl DisplayPower for RecordingPower {
    fn set_power(&mut self, on: bool) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(on);
        }
    }
}

/// Facts about the host for diagnostics.
pub trait HostInfo {
    /// Interface name to its MAC and IP addresses. Loopback is omitted.
    fn interfaces(&mut self) -> BTreeMap<String, Vec<String>>;

    /// Operating system description.
    fn platform(&mut self) -> String;
}

/// [`HostInfo`] backed by `sysinfo`.
pub struct SysinfoHost {
    networks: Networks,
}

impl SysinfoHost {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostInfo for SysinfoHost {
    fn interfaces(&mut self) -> BTreeMap<String, Vec<String>> {
        self.networks.refresh(true);

        let mut interfaces = BTreeMap::new();
        for (name, data) in self.networks.list() {
            if name == "lo" {
                continue;
            }
            let mut addresses = vec![data.mac_address().to_string()];
            addresses.extend(
                data.ip_networks()
                    .iter()
                    .map(|net| format!("{}/{}", net.addr, net.prefix)),
            );
            interfaces.insert(name.clone(), addresses);
        }
        debug!(count = interfaces.len(), "network interfaces refreshed");
        interfaces
    }

    fn platform(&mut self) -> String {
        let os = System::long_os_version().unwrap_or_else(|| "unknown".to_string());
        match System::kernel_version() {
            Some(kernel) => format!("{os} (kernel {kernel})"),
            None => os,
        }
    }
}

/// Fixed host facts.
#[derive(Debug, Clone, Default)]
pub struct StaticHost {
    pub interfaces: BTreeMap<String, Vec<String>>,
    pub platform: String,
}

impl HostInfo for StaticHost {
    fn interfaces(&mut self) -> BTreeMap<String, Vec<String>> {
        self.interfaces.clone()
    }

    fn platform(&mut self) -> String {
        self.platform.clone()
    }
}

/// Takes a PNG screenshot by running a command that writes it to stdout.
///
/// Defaults to ImageMagick `import -window root png:-`.
#[derive(Debug, Clone)]
pub struct CommandCapture {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandCapture {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("/usr/bin/import"),
            args: ["-window", "root", "png:-"].map(String::from).to_vec(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_command(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            ..Self::new()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the capture command and return its stdout.
    ///
    /// # Errors
    /// Returns `KioskError::Capture` if the command times out, exits with a
    /// failure status or prints nothing, and `KioskError::Io` if it cannot
    /// be started.
    pub async fn capture(&self) -> Result<Vec<u8>> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                KioskError::Capture(format!("timed out after {}ms", self.timeout.as_millis()))
            })??;

        if !output.status.success() {
            return Err(KioskError::Capture(format!("exited with {}", output.status)));
        }
        if output.stdout.is_empty() {
            return Err(KioskError::Capture("empty image".to_string()));
        }
        Ok(output.stdout)
    }
}

impl Default for CommandCapture {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes brightness values to a sysfs backlight file.
#[derive(Debug, Clone)]
pub struct BacklightWriter {
    path: PathBuf,
}

impl BacklightWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Apply a brightness value given as text.
    ///
    /// Values that are not integers in `0..=255` are ignored. Returns whether
    /// the value was written.
    pub fn apply(&self, value: &str) -> bool {
        let brightness = match value.trim().parse::<i64>() {
            Ok(v) if (0..=i64::from(MAX_BRIGHTNESS)).contains(&v) => v,
            _ => {
                warn!(value, "brightness out of range");
                return false;
            }
        };
        match std::fs::write(&self.path, brightness.to_string()) {
            Ok(()) => {
                debug!(path = %self.path.display(), brightness, "backlight set");
                true
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "backlight write failed");
                false
            }
        }
    }
}
