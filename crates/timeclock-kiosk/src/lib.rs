//! Attendance kiosk logic.
//!
//! This crate holds the interaction state machine, the booking session, the
//! backend token lifecycle and the single-task event loop that ties the tag
//! reader, the backend client and the view together.
//!
//! # Example
//!
//! ```no_run
//! use timeclock_core::{Config, ConfigStore};
//! use timeclock_hardware::event_channel;
//! use timeclock_kiosk::{ConsoleView, KioskSettings, Orchestrator, Runtime, TokenManager};
//! use timeclock_network::{ApiClient, ApiClientConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load(None)?;
//! let client = ApiClient::new(ApiClientConfig {
//!     base_url: config.api.base_url.clone(),
//!     timeout: config.timing.request_timeout(),
//! })?;
//! let tokens = TokenManager::new(&config.api.username, &config.api.password);
//! let view = ConsoleView::new(std::io::stdout(), 60);
//! let kiosk = Orchestrator::new(KioskSettings::from_config(&config)?, tokens, Box::new(view));
//!
//! let (_events_tx, events_rx) = event_channel();
//! let runtime = Runtime::new(kiosk, client, events_rx, ConfigStore::new(config));
//! runtime.run(async { let _ = tokio::signal::ctrl_c().await; }).await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod host;
pub mod orchestrator;
pub mod runtime;
pub mod session;
pub mod state_machine;
pub mod timers;
pub mod token;
pub mod view;

pub use error::{KioskError, Result};
pub use host::{
    BacklightWriter, CommandCapture, DisplayPower, HostInfo, RecordingPower, StaticHost,
    SysinfoHost, XsetDisplay,
};
pub use orchestrator::{
    KioskSettings, Orchestrator, Outgoing, RequestKind, Ticket, classify_failure,
};
pub use runtime::{Input, Intervals, Runtime};
pub use session::Session;
pub use state_machine::{KioskState, StateMachine, StateMachineBuilder, StateTransition};
pub use timers::{TimerAction, TimerHandle, TimerPool};
pub use token::{TokenManager, TokenUpdate};
pub use view::{ConsoleView, ErrorIcon, RecordingView, View, ViewUpdate};
