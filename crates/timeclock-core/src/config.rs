//! Configuration loading from TOML files.
//!
//! The config file is selected via:
//! 1. an explicit path (the `--config` command line argument)
//! 2. the `TIMECLOCK_CONFIG` environment variable
//! 3. default: `~/.timeclock.toml`
//!
//! A missing default file is not an error; the factory settings apply.
//!
//! ```toml
//! [api]
//! base_url = "https://api.example.org/"
//! username = "terminal"
//! password = "secret"
//! terminal = 1
//! screenshots = true
//!
//! [terminal]
//! screensaver_secs = 60
//! admin_keys = "12345678"
//! brightness = 50
//!
//! [timing]
//! debounce_secs = 10
//! ```

use crate::constants::*;
use crate::error::{Error, Result};
use crate::types::AdminKeys;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "TIMECLOCK_CONFIG";

/// File name looked up in the home directory.
pub const DEFAULT_CONFIG_FILE: &str = ".timeclock.toml";

/// Backend access settings.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Terminal number used in attendance and terminal URLs.
    pub terminal: u32,
    /// Upload periodic screenshots.
    pub screenshots: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.medunigraz.at/".to_string(),
            username: "terminal".to_string(),
            password: String::new(),
            terminal: 1,
            screenshots: true,
        }
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("terminal", &self.terminal)
            .field("screenshots", &self.screenshots)
            .finish()
    }
}

/// Kiosk hardware settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Inactivity before the display is blanked.
    pub screensaver_secs: u64,
    /// Comma-separated list of admin sector keys in hex.
    pub admin_keys: String,
    /// Backlight brightness, 0-255.
    pub brightness: u16,
    pub backlight_path: String,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            screensaver_secs: DEFAULT_SCREENSAVER_SECS,
            admin_keys: "12345678".to_string(),
            brightness: 50,
            backlight_path: DEFAULT_BACKLIGHT_PATH.to_string(),
        }
    }
}

/// Durations of the reader and the auto-reset timers, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub debounce_secs: u64,
    pub question_timeout_secs: u64,
    pub confirmation_secs: u64,
    pub error_secs: u64,
    pub request_timeout_secs: u64,
    pub token_refresh_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            debounce_secs: DEFAULT_DEBOUNCE_SECS,
            question_timeout_secs: DEFAULT_QUESTION_TIMEOUT_SECS,
            confirmation_secs: DEFAULT_CONFIRMATION_SECS,
            error_secs: DEFAULT_ERROR_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            token_refresh_secs: DEFAULT_TOKEN_REFRESH_SECS,
        }
    }
}

impl TimingConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    pub fn question_timeout(&self) -> Duration {
        Duration::from_secs(self.question_timeout_secs)
    }

    pub fn confirmation(&self) -> Duration {
        Duration::from_secs(self.confirmation_secs)
    }

    pub fn error(&self) -> Duration {
        Duration::from_secs(self.error_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn token_refresh(&self) -> Duration {
        Duration::from_secs(self.token_refresh_secs)
    }
}

/// Complete kiosk configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub terminal: TerminalConfig,
    pub timing: TimingConfig,
}

impl Config {
    /// Parse configuration from TOML text.
    ///
    /// # Errors
    /// Returns `Error::ConfigParse` for malformed TOML and `Error::Config`
    /// for semantically invalid values.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit file.
    ///
    /// # Errors
    /// Returns `Error::Io` if the file cannot be read.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        info!(path = %path.display(), terminal = config.api.terminal, "config_loaded");
        Ok(config)
    }

    /// Resolve the config location and load it.
    ///
    /// An explicit path or `TIMECLOCK_CONFIG` must exist. The home directory
    /// default falls back to factory settings when absent.
    ///
    /// # Errors
    /// Returns an error if a selected file cannot be read or parsed.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::load_from_path(Path::new(&path));
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from_path(&path),
            _ => {
                debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// `~/.timeclock.toml`, if a home directory is known.
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(DEFAULT_CONFIG_FILE))
    }

    /// Parsed admin keys.
    ///
    /// # Errors
    /// Returns `Error::InvalidAdminKey` if the list contains non-hex entries.
    pub fn admin_keys(&self) -> Result<AdminKeys> {
        AdminKeys::parse(&self.terminal.admin_keys)
    }

    pub fn screensaver(&self) -> Duration {
        Duration::from_secs(self.terminal.screensaver_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(Error::Config("api.base_url must not be empty".to_string()));
        }
        if self.terminal.brightness > MAX_BRIGHTNESS {
            return Err(Error::Config(format!(
                "terminal.brightness must be 0-{MAX_BRIGHTNESS}, got {}",
                self.terminal.brightness
            )));
        }
        self.admin_keys()?;
        Ok(())
    }
}

type Callback = Box<dyn FnMut(&str) + Send>;

struct Observer {
    section: String,
    key: String,
    callback: Callback,
}

/// Runtime-mutable view of the configuration with change observers.
///
/// Observers registered for a `section.key` run synchronously, in
/// registration order, after the value has been stored.
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use timeclock_core::{Config, ConfigStore};
///
/// let mut store = ConfigStore::new(Config::default());
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = seen.clone();
/// store.add_callback("terminal", "brightness", move |v| sink.lock().unwrap().push(v.to_string()));
///
/// store.set("terminal", "brightness", "120").unwrap();
/// assert_eq!(store.config().terminal.brightness, 120);
/// assert_eq!(*seen.lock().unwrap(), vec!["120".to_string()]);
/// ```
pub struct ConfigStore {
    config: Config,
    observers: Vec<Observer>,
}

impl ConfigStore {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            observers: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Register an observer for one key.
    pub fn add_callback<F>(&mut self, section: &str, key: &str, callback: F)
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.observers.push(Observer {
            section: section.to_string(),
            key: key.to_string(),
            callback: Box::new(callback),
        });
    }

    /// Current value of a runtime-mutable key as text.
    pub fn get(&self, section: &str, key: &str) -> Option<String> {
        let c = &self.config;
        match (section, key) {
            ("terminal", "brightness") => Some(c.terminal.brightness.to_string()),
            ("terminal", "screensaver_secs") => Some(c.terminal.screensaver_secs.to_string()),
            ("terminal", "admin_keys") => Some(c.terminal.admin_keys.clone()),
            ("api", "screenshots") => Some(c.api.screenshots.to_string()),
            _ => None,
        }
    }

    /// Update a runtime-mutable key and notify its observers.
    ///
    /// Setting a key to its current value does not notify.
    ///
    /// # Errors
    /// Returns `Error::UnknownConfigKey` for keys that cannot change at
    /// runtime and `Error::Config` for values that fail to parse.
    pub fn set(&mut self, section: &str, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        let previous = self.get(section, key);
        let parse_err = |what: &str| Error::Config(format!("{section}.{key}: invalid {what} '{value}'"));

        match (section, key) {
            ("terminal", "brightness") => {
                let brightness: u16 = value.parse().map_err(|_| parse_err("number"))?;
                if brightness > MAX_BRIGHTNESS {
                    return Err(parse_err("brightness"));
                }
                self.config.terminal.brightness = brightness;
            }
            ("terminal", "screensaver_secs") => {
                self.config.terminal.screensaver_secs =
                    value.parse().map_err(|_| parse_err("number"))?;
            }
            ("terminal", "admin_keys") => {
                AdminKeys::parse(value)?;
                self.config.terminal.admin_keys = value.to_string();
            }
            ("api", "screenshots") => {
                self.config.api.screenshots = match value {
                    "1" | "true" => true,
                    "0" | "false" => false,
                    _ => return Err(parse_err("flag")),
                };
            }
            _ => {
                return Err(Error::UnknownConfigKey {
                    section: section.to_string(),
                    key: key.to_string(),
                });
            }
        }

        let current = self.get(section, key);
        if current == previous {
            return Ok(());
        }
        debug!(section, key, value = ?current, "config_changed");

        let current = current.unwrap_or_default();
        for observer in self
            .observers
            .iter_mut()
            .filter(|o| o.section == section && o.key == key)
        {
            (observer.callback)(&current);
        }
        Ok(())
    }
}

impl fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigStore")
            .field("config", &self.config)
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api.terminal, 1);
        assert_eq!(config.timing.debounce(), Duration::from_secs(10));
        assert_eq!(config.timing.question_timeout(), Duration::from_secs(10));
        assert_eq!(config.timing.confirmation(), Duration::from_secs(3));
        assert_eq!(config.timing.error(), Duration::from_secs(2));
        assert_eq!(config.screensaver(), Duration::from_secs(60));
        assert_eq!(config.admin_keys().unwrap().len(), 1);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [api]
            base_url = "http://localhost:8000/api/"
            terminal = 7

            [terminal]
            admin_keys = "AABB,CCDD"
            "#,
        )
        .unwrap();

        assert_eq!(config.api.base_url, "http://localhost:8000/api/");
        assert_eq!(config.api.terminal, 7);
        assert_eq!(config.api.username, "terminal");
        assert_eq!(config.admin_keys().unwrap().len(), 2);
        assert_eq!(config.timing, TimingConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            Config::from_toml("[terminal]\nbrightness = 300"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_toml("[terminal]\nadmin_keys = \"zz\""),
            Err(Error::InvalidAdminKey(_))
        ));
        assert!(matches!(
            Config::from_toml("[api]\nterminal = \"one\""),
            Err(Error::ConfigParse(_))
        ));
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[timing]\nerror_secs = 5").unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.timing.error(), Duration::from_secs(5));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let result = Config::load(Some(Path::new("/nonexistent/timeclock.toml")));
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_debug_hides_password() {
        let mut config = Config::default();
        config.api.password = "hunter2".to_string();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_store_notifies_matching_observers_only() {
        let mut store = ConfigStore::new(Config::default());
        let calls = Arc::new(Mutex::new(Vec::new()));

        let sink = calls.clone();
        store.add_callback("terminal", "brightness", move |v| {
            sink.lock().unwrap().push(format!("brightness={v}"))
        });
        let sink = calls.clone();
        store.add_callback("api", "screenshots", move |v| {
            sink.lock().unwrap().push(format!("screenshots={v}"))
        });

        store.set("terminal", "brightness", "200").unwrap();
        store.set("terminal", "brightness", "200").unwrap();
        store.set("api", "screenshots", "0").unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec!["brightness=200".to_string(), "screenshots=false".to_string()]
        );
        assert!(!store.config().api.screenshots);
    }

    #[test]
    fn test_store_rejects_invalid_updates() {
        let mut store = ConfigStore::new(Config::default());
        assert!(store.set("terminal", "brightness", "256").is_err());
        assert!(store.set("terminal", "brightness", "bright").is_err());
        assert!(matches!(
            store.set("api", "password", "x"),
            Err(Error::UnknownConfigKey { .. })
        ));
        assert_eq!(store.config().terminal.brightness, 50);
    }
}
