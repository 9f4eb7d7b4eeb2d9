//! Single-task event loop around the [`Orchestrator`].
//!
//! # Architecture
//!
//! ```text
//!   EventReceiver ──drain_latest (card poll)──┐
//!   Input channel (answers, :set, activity) ──┤
//!   interval ticks (clock, token, uploads...) ┼──> Orchestrator ──outbox──> ApiClient::dispatch
//!   TimerPool deadline ───────────────────────┤                                  │
//!   completions <─────────────────────────────┴──────────────────────────────────┘
//! ```
//!
//! Every handler runs on the loop task, one at a time. Network calls and
//! screen captures are spawned and report back through channels.

use std::future::{Future, pending};
use std::time::Duration;

use chrono::Local;
use timeclock_core::constants::{
    CARD_POLL_INTERVAL_MS, CLOCK_INTERVAL_MS, DEFAULT_TOKEN_REFRESH_SECS, NETWORK_REFRESH_SECS,
    SCREENSAVER_CHECK_SECS, UPLOAD_INTERVAL_SECS,
};
use timeclock_core::{Config, ConfigStore};
use timeclock_hardware::EventReceiver;
use timeclock_network::{ApiClient, Completion};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, sleep_until};
use tracing::{debug, info, warn};

use crate::host::CommandCapture;
use crate::orchestrator::{KioskSettings, Orchestrator, Ticket};

/// Periods of the loop's recurring work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intervals {
    pub card_poll: Duration,
    pub clock: Duration,
    pub network: Duration,
    pub token: Duration,
    pub upload: Duration,
    pub screensaver: Duration,
}

impl Intervals {
    /// Default periods with the token refresh taken from the configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            token: config.timing.token_refresh(),
            ..Self::default()
        }
    }
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            card_poll: Duration::from_millis(CARD_POLL_INTERVAL_MS),
            clock: Duration::from_millis(CLOCK_INTERVAL_MS),
            network: Duration::from_secs(NETWORK_REFRESH_SECS),
            token: Duration::from_secs(DEFAULT_TOKEN_REFRESH_SECS),
            upload: Duration::from_secs(UPLOAD_INTERVAL_SECS),
            screensaver: Duration::from_secs(SCREENSAVER_CHECK_SECS),
        }
    }
}

/// Input from the operator side of the terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Option key selected for the current question.
    Answer(String),

    /// Change a runtime setting.
    Set {
        section: String,
        key: String,
        value: String,
    },

    /// Someone is near the terminal.
    Activity,

    /// Open the network diagnostics page.
    ShowNetwork,
}

impl Input {
    /// Parse one line of operator input.
    ///
    /// `:set SECTION.KEY VALUE` changes a setting, `:net` shows the network
    /// page, an empty line signals activity and anything else is an answer.
    ///
    /// ```
    /// use timeclock_kiosk::Input;
    ///
    /// assert_eq!(Input::parse("y"), Some(Input::Answer("y".to_string())));
    /// assert_eq!(
    ///     Input::parse(":set terminal.brightness 80"),
    ///     Some(Input::Set {
    ///         section: "terminal".to_string(),
    ///         key: "brightness".to_string(),
    ///         value: "80".to_string(),
    ///     })
    /// );
    /// assert_eq!(Input::parse(":set brightness"), None);
    /// ```
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Some(Input::Activity);
        }
        if line == ":net" {
            return Some(Input::ShowNetwork);
        }
        if let Some(rest) = line.strip_prefix(":set ") {
            let (target, value) = rest.trim().split_once(char::is_whitespace)?;
            let (section, key) = target.split_once('.')?;
            return Some(Input::Set {
                section: section.to_string(),
                key: key.to_string(),
                value: value.trim().to_string(),
            });
        }
        if line.starts_with(':') {
            return None;
        }
        Some(Input::Answer(line.to_string()))
    }
}

/// Owns the orchestrator and every channel feeding it.
pub struct Runtime {
    orchestrator: Orchestrator,
    client: ApiClient,
    events: EventReceiver,
    store: ConfigStore,
    intervals: Intervals,
    capture: Option<CommandCapture>,
    inputs: Option<mpsc::UnboundedReceiver<Input>>,
    completions_tx: mpsc::UnboundedSender<Completion<Ticket>>,
    completions_rx: mpsc::UnboundedReceiver<Completion<Ticket>>,
    screenshots_tx: mpsc::UnboundedSender<Vec<u8>>,
    screenshots_rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Runtime {
    pub fn new(
        orchestrator: Orchestrator,
        client: ApiClient,
        events: EventReceiver,
        store: ConfigStore,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (screenshots_tx, screenshots_rx) = mpsc::unbounded_channel();
        Self {
            orchestrator,
            client,
            events,
            store,
            intervals: Intervals::default(),
            capture: None,
            inputs: None,
            completions_tx,
            completions_rx,
            screenshots_tx,
            screenshots_rx,
        }
    }

    pub fn with_intervals(mut self, intervals: Intervals) -> Self {
        self.intervals = intervals;
        self
    }

    pub fn with_inputs(mut self, inputs: mpsc::UnboundedReceiver<Input>) -> Self {
        self.inputs = Some(inputs);
        self
    }

    pub fn with_capture(mut self, capture: CommandCapture) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Run until `shutdown` resolves. Returns the orchestrator for
    /// inspection.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Orchestrator {
        tokio::pin!(shutdown);

        let start = Instant::now();
        let mut card_poll = ticker(start, self.intervals.card_poll);
        let mut clock = ticker(start, self.intervals.clock);
        let mut network = ticker(start, self.intervals.network);
        let mut token = ticker(start, self.intervals.token);
        let mut upload = ticker(start, self.intervals.upload);
        let mut screensaver = ticker(start, self.intervals.screensaver);

        info!(terminal = self.orchestrator.settings().terminal, "kiosk_started");
        self.orchestrator.start(start);
        self.orchestrator.on_network_tick();
        self.flush();

        loop {
            let deadline = self.orchestrator.next_deadline();
            tokio::select! {
                _ = &mut shutdown => {
                    info!(state = %self.orchestrator.state(), "kiosk_stopping");
                    break;
                }
                Some(completion) = self.completions_rx.recv() => {
                    self.orchestrator.on_completion(completion, Instant::now());
                }
                _ = sleep_until_deadline(deadline) => {
                    self.orchestrator.on_timers(Instant::now());
                }
                _ = card_poll.tick() => {
                    if let Some(event) = self.events.drain_latest() {
                        self.orchestrator.on_card_event(event, Instant::now());
                    }
                }
                input = recv_input(&mut self.inputs) => match input {
                    Some(input) => self.handle_input(input),
                    None => {
                        debug!("input closed");
                        self.inputs = None;
                    }
                },
                Some(png) = self.screenshots_rx.recv() => {
                    self.orchestrator.on_screenshot(&png);
                }
                _ = clock.tick() => self.orchestrator.on_clock_tick(&Local::now()),
                _ = screensaver.tick() => self.orchestrator.on_screensaver_tick(Instant::now()),
                _ = network.tick() => self.orchestrator.on_network_tick(),
                _ = token.tick() => self.orchestrator.on_token_tick(),
                _ = upload.tick() => {
                    self.orchestrator.on_upload_tick(&Local::now());
                    if self.orchestrator.wants_screenshot() {
                        self.spawn_capture();
                    }
                }
            }
            self.flush();
        }

        self.orchestrator
    }

    fn handle_input(&mut self, input: Input) {
        let now = Instant::now();
        match input {
            Input::Answer(key) => self.orchestrator.on_answer(&key, now),
            Input::Activity => self.orchestrator.on_activity(now),
            Input::ShowNetwork => self.orchestrator.show_network(),
            Input::Set {
                section,
                key,
                value,
            } => {
                if let Err(e) = self.store.set(&section, &key, &value) {
                    warn!(section, key, error = %e, "config_rejected");
                    return;
                }
                match KioskSettings::from_config(self.store.config()) {
                    Ok(settings) => self.orchestrator.update_settings(settings),
                    Err(e) => warn!(error = %e, "settings not applied"),
                }
            }
        }
    }

    /// Dispatch everything the orchestrator queued.
    fn flush(&mut self) {
        for outgoing in self.orchestrator.take_outbox() {
            debug!(kind = ?outgoing.ticket.kind, path = %outgoing.request.path, "dispatch");
            self.client.dispatch(
                outgoing.ticket,
                outgoing.request,
                outgoing.token,
                self.completions_tx.clone(),
            );
        }
    }

    fn spawn_capture(&self) {
        let Some(capture) = self.capture.clone() else {
            return;
        };
        let screenshots = self.screenshots_tx.clone();
        tokio::spawn(async move {
            match capture.capture().await {
                Ok(png) => {
                    let _ = screenshots.send(png);
                }
                Err(e) => warn!(error = %e, "screenshot failed"),
            }
        });
    }
}

/// Interval whose first tick is one period after `start`.
fn ticker(start: Instant, period: Duration) -> Interval {
    let mut interval = interval_at(start + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

async fn recv_input(inputs: &mut Option<mpsc::UnboundedReceiver<Input>>) -> Option<Input> {
    match inputs {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("a", Some(Input::Answer("a".to_string())))]
    #[case("  n \n", Some(Input::Answer("n".to_string())))]
    #[case("", Some(Input::Activity))]
    #[case(":net", Some(Input::ShowNetwork))]
    #[case(":set api.screenshots   true", Some(Input::Set {
        section: "api".to_string(),
        key: "screenshots".to_string(),
        value: "true".to_string(),
    }))]
    #[case(":set terminal.admin_keys 11, 22", Some(Input::Set {
        section: "terminal".to_string(),
        key: "admin_keys".to_string(),
        value: "11, 22".to_string(),
    }))]
    #[case(":set nodot 1", None)]
    #[case(":quit", None)]
    fn test_input_parse(#[case] line: &str, #[case] expected: Option<Input>) {
        assert_eq!(Input::parse(line), expected);
    }

    #[test]
    fn test_intervals_from_config() {
        let config = Config::from_toml("[timing]\ntoken_refresh_secs = 120\n").unwrap();
        let intervals = Intervals::from_config(&config);
        assert_eq!(intervals.token, Duration::from_secs(120));
        assert_eq!(intervals.card_poll, Duration::from_millis(500));
        assert_eq!(intervals.screensaver, Duration::from_secs(5));
    }
}
