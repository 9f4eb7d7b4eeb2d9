//! Attendance workflow driver.
//!
//! The [`Orchestrator`] reacts to card events, answers, backend completions
//! and periodic ticks. It never performs I/O itself: backend calls are queued
//! as [`Outgoing`] requests for the runtime to dispatch, and everything the
//! terminal shows goes through a [`View`].
//!
//! # Flow
//!
//! ```text
//! card ──> Preflight ──{data: []}──────────────> Clocking ──> Confirmation ──3s──> Idle
//!              │                                    ▲    └──> Error ──2s──> Idle
//!              └─{data: [q, ..]}─> Questions ──last─┘
//!                                      └──10s──> Idle
//! ```
//!
//! All methods take the current monotonic time so tests can drive the
//! workflow without sleeping.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, TimeZone};
use serde_json::{Value, json};
use timeclock_core::constants::{MSG_BOOKING_ERROR, MSG_NETWORK_ERROR};
use timeclock_core::{AdminKeys, CardEvent, Config, Token, unknown_card_message};
use timeclock_network::{ApiRequest, Completion, Outcome};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::host::{DisplayPower, HostInfo, SysinfoHost, XsetDisplay};
use crate::session::Session;
use crate::state_machine::{KioskState, StateMachine};
use crate::timers::{TimerAction, TimerPool};
use crate::token::{TokenManager, TokenUpdate};
use crate::view::{ErrorIcon, View, ViewUpdate};

/// Runtime-adjustable behaviour of the orchestrator.
#[derive(Debug, Clone)]
pub struct KioskSettings {
    pub terminal: u32,
    pub admin_keys: AdminKeys,
    pub screensaver: Duration,
    pub screenshots: bool,
    pub question_timeout: Duration,
    pub confirmation: Duration,
    pub error: Duration,
}

impl KioskSettings {
    /// # Errors
    /// Returns an error if the configured admin keys do not parse.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            terminal: config.api.terminal,
            admin_keys: config.admin_keys()?,
            screensaver: config.screensaver(),
            screenshots: config.api.screenshots,
            question_timeout: config.timing.question_timeout(),
            confirmation: config.timing.confirmation(),
            error: config.timing.error(),
        })
    }
}

impl Default for KioskSettings {
    fn default() -> Self {
        let config = Config::default();
        Self {
            terminal: config.api.terminal,
            admin_keys: AdminKeys::default(),
            screensaver: config.screensaver(),
            screenshots: config.api.screenshots,
            question_timeout: config.timing.question_timeout(),
            confirmation: config.timing.confirmation(),
            error: config.timing.error(),
        }
    }
}

/// What a backend call was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Token,
    Preflight,
    Clock,
    Diagnostics,
    Screenshot,
}

/// Tag attached to every dispatched call and returned with its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub kind: RequestKind,

    /// Session generation at the time of dispatch.
    pub generation: u64,
}

/// A backend call waiting to be dispatched.
#[derive(Debug, Clone)]
pub struct Outgoing {
    pub ticket: Ticket,
    pub request: ApiRequest,
    pub token: Option<Token>,
}

/// Classify a failed preflight or clock call for the error screen.
///
/// ```
/// use serde_json::json;
/// use timeclock_kiosk::{ErrorIcon, classify_failure};
/// use timeclock_network::Outcome;
///
/// let (message, icon) = classify_failure(&Outcome::Failure {
///     status: 404,
///     body: json!({"detail": "Karte gesperrt"}),
/// });
/// assert_eq!(message, "Karte gesperrt");
/// assert_eq!(icon, ErrorIcon::UnknownCard);
/// ```
pub fn classify_failure(outcome: &Outcome) -> (String, ErrorIcon) {
    match outcome {
        Outcome::Failure { status: 404, body } => {
            (unknown_card_message(body), ErrorIcon::UnknownCard)
        }
        Outcome::Failure { .. } | Outcome::Success { .. } => {
            (MSG_BOOKING_ERROR.to_string(), ErrorIcon::Warning)
        }
        Outcome::Redirect { .. } | Outcome::Error(_) => {
            (MSG_NETWORK_ERROR.to_string(), ErrorIcon::Warning)
        }
    }
}

/// Join the `data` messages of a clock response, one per line.
fn confirmation_text(body: &Value) -> String {
    body.get("data")
        .and_then(Value::as_array)
        .map(|messages| {
            messages
                .iter()
                .map(|m| match m {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

/// Drives the kiosk workflow on the event loop.
pub struct Orchestrator {
    machine: StateMachine,
    session: Session,
    tokens: TokenManager,
    timers: TimerPool<TimerAction>,
    settings: KioskSettings,
    view: Box<dyn View + Send>,
    power: Box<dyn DisplayPower + Send>,
    host: Box<dyn HostInfo + Send>,
    last_activity: Instant,
    blanked: bool,
    network: BTreeMap<String, Vec<String>>,
    outbox: Vec<Outgoing>,
}

impl Orchestrator {
    /// Create an orchestrator with the `xset` display and `sysinfo` host.
    pub fn new(settings: KioskSettings, tokens: TokenManager, view: Box<dyn View + Send>) -> Self {
        Self {
            machine: StateMachine::new(),
            session: Session::new(),
            tokens,
            timers: TimerPool::new(),
            settings,
            view,
            power: Box::new(XsetDisplay::new()),
            host: Box::new(SysinfoHost::new()),
            last_activity: Instant::now(),
            blanked: false,
            network: BTreeMap::new(),
            outbox: Vec::new(),
        }
    }

    pub fn with_display_power(mut self, power: Box<dyn DisplayPower + Send>) -> Self {
        self.power = power;
        self
    }

    pub fn with_host_info(mut self, host: Box<dyn HostInfo + Send>) -> Self {
        self.host = host;
        self
    }

    pub fn state(&self) -> KioskState {
        *self.machine.current_state()
    }

    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn settings(&self) -> &KioskSettings {
        &self.settings
    }

    pub fn has_token(&self) -> bool {
        self.tokens.has_token()
    }

    pub fn is_blanked(&self) -> bool {
        self.blanked
    }

    /// Earliest pending reset deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Take the calls queued since the last call.
    pub fn take_outbox(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }

    pub fn update_settings(&mut self, settings: KioskSettings) {
        info!(
            admin_keys = settings.admin_keys.len(),
            screensaver_secs = settings.screensaver.as_secs(),
            screenshots = settings.screenshots,
            "settings_updated"
        );
        self.settings = settings;
    }

    /// Show the idle screen and request the first token.
    pub fn start(&mut self, now: Instant) {
        self.last_activity = now;
        self.view.render(ViewUpdate::Screen(self.state()));
        self.on_token_tick();
    }

    /// Handle a coalesced card event.
    pub fn on_card_event(&mut self, event: CardEvent, now: Instant) {
        self.on_activity(now);
        info!(uid = %event.uid_hex(), sector = event.sector.is_some(), state = %self.state(), "tag_detected");

        if self.state() == KioskState::Maintenance {
            warn!("card ignored in maintenance");
            return;
        }

        if let Some(sector) = event.sector_hex()
            && self.settings.admin_keys.matches(&sector)
        {
            if self.state() == KioskState::Admin {
                info!("admin_exit");
                self.reset();
            } else {
                info!("admin_enter");
                self.reset();
                self.transition(KioskState::Admin);
            }
            return;
        }

        if !self.tokens.has_token() {
            warn!("no token, card ignored");
            return;
        }

        let card_id = match event.card_id() {
            Ok(card_id) => card_id,
            Err(e) => {
                warn!(error = %e, "card ignored");
                return;
            }
        };

        self.reset();
        info!(card_id = %card_id, "booking_started");
        let request = ApiRequest::preflight(self.settings.terminal, &card_id);
        self.session.begin(card_id);
        self.transition(KioskState::Preflight);
        self.queue(RequestKind::Preflight, request, true);
    }

    /// Handle an answer to the current question.
    pub fn on_answer(&mut self, key: &str, now: Instant) {
        self.on_activity(now);
        if self.state() != KioskState::Questions {
            debug!(key, state = %self.state(), "answer outside questions ignored");
            return;
        }
        if let Err(e) = self.session.record_answer(key) {
            warn!(key, error = %e, "answer ignored");
            return;
        }
        debug!(key, remaining = self.session.has_pending(), "answer_recorded");

        if self.session.has_pending() {
            self.ask_next(now);
        } else {
            self.clock_step();
        }
    }

    /// Handle the outcome of a dispatched call.
    pub fn on_completion(&mut self, completion: Completion<Ticket>, now: Instant) {
        let Completion { ticket, outcome } = completion;
        match ticket.kind {
            RequestKind::Token => self.token_completed(&outcome),
            RequestKind::Preflight | RequestKind::Clock => {
                let expected = if ticket.kind == RequestKind::Preflight {
                    KioskState::Preflight
                } else {
                    KioskState::Clocking
                };
                if ticket.generation != self.session.generation() || self.state() != expected {
                    info!(
                        kind = ?ticket.kind,
                        generation = ticket.generation,
                        current = self.session.generation(),
                        "stale completion ignored"
                    );
                    return;
                }
                if ticket.kind == RequestKind::Preflight {
                    self.preflight_completed(&outcome, now);
                } else {
                    self.clock_completed(&outcome, now);
                }
            }
            RequestKind::Diagnostics | RequestKind::Screenshot => {
                if outcome.is_success() {
                    debug!(kind = ?ticket.kind, "upload_done");
                } else {
                    warn!(kind = ?ticket.kind, outcome = outcome.kind(), status = ?outcome.status(), "upload failed");
                }
            }
        }
    }

    /// Fire the reset timers that are due.
    pub fn on_timers(&mut self, now: Instant) {
        for action in self.timers.pop_due(now) {
            match action {
                TimerAction::Reset => {
                    info!(state = %self.state(), "reset_timer_fired");
                    self.reset();
                }
            }
        }
    }

    /// Push the wall clock to the view.
    pub fn on_clock_tick<Tz>(&mut self, wall: &DateTime<Tz>)
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        self.view.render(ViewUpdate::Time(wall.format("%c").to_string()));
    }

    /// Blank the display once the screensaver delay has passed.
    pub fn on_screensaver_tick(&mut self, now: Instant) {
        if self.blanked {
            return;
        }
        if now.saturating_duration_since(self.last_activity) >= self.settings.screensaver {
            info!("screensaver_on");
            self.power.set_power(false);
            self.blanked = true;
        }
    }

    /// Record user presence and wake the display if it was blanked.
    pub fn on_activity(&mut self, now: Instant) {
        self.last_activity = now;
        if self.blanked {
            info!("screensaver_off");
            self.power.set_power(true);
            self.blanked = false;
        }
    }

    /// Refresh the cached interface list.
    pub fn on_network_tick(&mut self) {
        self.network = self.host.interfaces();
    }

    /// Show the cached interface list.
    pub fn show_network(&mut self) {
        self.view.render(ViewUpdate::Network(self.network.clone()));
    }

    /// Queue a token fetch.
    pub fn on_token_tick(&mut self) {
        let request = self.tokens.request();
        self.queue(RequestKind::Token, request, false);
    }

    /// Queue the diagnostics upload.
    pub fn on_upload_tick<Tz>(&mut self, wall: &DateTime<Tz>)
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        if !self.tokens.has_token() {
            debug!("no token, diagnostics skipped");
            return;
        }
        let config = json!({
            "interfaces": self.host.interfaces(),
            "platform": self.host.platform(),
            "version": timeclock_core::VERSION,
            "datetime": wall.to_rfc3339(),
        });
        let request = ApiRequest::diagnostics(self.settings.terminal, config);
        self.queue(RequestKind::Diagnostics, request, true);
    }

    /// Whether a screenshot should be captured for upload.
    pub fn wants_screenshot(&self) -> bool {
        self.settings.screenshots && self.tokens.has_token()
    }

    /// Queue the upload of a captured PNG.
    pub fn on_screenshot(&mut self, png: &[u8]) {
        if !self.wants_screenshot() {
            debug!("screenshot dropped");
            return;
        }
        let request = ApiRequest::screenshot(self.settings.terminal, STANDARD.encode(png));
        self.queue(RequestKind::Screenshot, request, true);
    }

    fn token_completed(&mut self, outcome: &Outcome) {
        match self.tokens.handle(outcome) {
            TokenUpdate::Unchanged => debug!("token unchanged"),
            TokenUpdate::Changed => self.reset(),
            TokenUpdate::Lost => {
                self.timers.cancel_all();
                self.session.reset();
                self.view.render(ViewUpdate::ClearQuestion);
                if self.state() != KioskState::Maintenance {
                    self.transition(KioskState::Maintenance);
                }
            }
        }
    }

    fn preflight_completed(&mut self, outcome: &Outcome, now: Instant) {
        let Outcome::Success { body, .. } = outcome else {
            self.show_error(outcome, now);
            return;
        };

        let data = body
            .get("data")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let count = self.session.load_questions(data);
        info!(questions = count, "preflight_done");

        if count == 0 {
            self.clock_step();
        } else {
            self.transition(KioskState::Questions);
            self.ask_next(now);
        }
    }

    fn clock_completed(&mut self, outcome: &Outcome, now: Instant) {
        let Outcome::Success { body, .. } = outcome else {
            self.show_error(outcome, now);
            return;
        };

        let text = confirmation_text(body);
        info!(card_id = ?self.session.card_id().map(|c| c.as_str()), "clock_done");
        self.transition(KioskState::Confirmation);
        self.view.render(ViewUpdate::Confirmation(text));
        self.arm_reset(now, self.settings.confirmation);
    }

    fn ask_next(&mut self, now: Instant) {
        if let Some(question) = self.session.next_question().cloned() {
            debug!(question = %question.id, "question_shown");
            self.view.render(ViewUpdate::Question(question));
            self.arm_reset(now, self.settings.question_timeout);
        }
    }

    fn clock_step(&mut self) {
        self.timers.cancel_all();
        let Some(card_id) = self.session.card_id().cloned() else {
            warn!("clocking without a card");
            return;
        };
        self.view.render(ViewUpdate::ClearQuestion);
        self.transition(KioskState::Clocking);
        let request = ApiRequest::clock(self.settings.terminal, &card_id, self.session.answers());
        self.queue(RequestKind::Clock, request, true);
    }

    fn show_error(&mut self, outcome: &Outcome, now: Instant) {
        let (message, icon) = classify_failure(outcome);
        warn!(outcome = outcome.kind(), status = ?outcome.status(), message = %message, "booking_failed");
        self.transition(KioskState::Error);
        self.view.render(ViewUpdate::Error { message, icon });
        self.arm_reset(now, self.settings.error);
    }

    /// Cancel every timer, clear the session and return to Idle.
    fn reset(&mut self) {
        self.timers.cancel_all();
        self.session.reset();
        self.view.render(ViewUpdate::ScrollTop);
        let dwell = self.machine.time_in_current_state();
        if let Some(transition) = self.machine.reset() {
            info!(
                from = %transition.from,
                to = %transition.to,
                dwell_ms = dwell.as_millis() as u64,
                "state_transition"
            );
            self.view.render(ViewUpdate::Screen(KioskState::Idle));
        }
    }

    /// Replace any pending reset with one due `after` from `now`.
    fn arm_reset(&mut self, now: Instant, after: Duration) {
        self.timers.cancel_all();
        self.timers.schedule(now, after, TimerAction::Reset);
    }

    fn transition(&mut self, to: KioskState) -> bool {
        let dwell = self.machine.time_in_current_state();
        match self.machine.transition_to(to) {
            Ok(transition) => {
                info!(
                    from = %transition.from,
                    to = %transition.to,
                    dwell_ms = dwell.as_millis() as u64,
                    "state_transition"
                );
                self.view.render(ViewUpdate::Screen(to));
                true
            }
            Err(e) => {
                warn!(error = %e, "transition rejected");
                false
            }
        }
    }

    fn queue(&mut self, kind: RequestKind, request: ApiRequest, authenticated: bool) {
        let token = if authenticated {
            self.tokens.token().cloned()
        } else {
            None
        };
        self.outbox.push(Outgoing {
            ticket: Ticket {
                kind,
                generation: self.session.generation(),
            },
            request,
            token,
        });
    }
}
