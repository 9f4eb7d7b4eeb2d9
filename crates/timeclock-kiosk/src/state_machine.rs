//! Kiosk interaction state machine.
//!
//! This module tracks which screen of the attendance workflow is active and
//! enforces the legal order of screens.
//!
//! # States
//!
//! - `Idle`: Waiting for a card
//! - `Admin`: Settings unlocked by an admin card
//! - `Preflight`: Asking the backend whether questions are needed
//! - `Questions`: Showing a survey question
//! - `Clocking`: Recording the attendance event
//! - `Confirmation`: Showing the backend's confirmation messages
//! - `Error`: Showing why the booking failed
//! - `Maintenance`: No token, attendance blocked
//!
//! # Valid Transitions
//!
//! - Idle → Admin | Preflight
//! - Preflight → Questions | Clocking | Error
//! - Questions → Clocking
//! - Clocking → Confirmation | Error
//! - any state except Maintenance → Maintenance
//! - any state → Idle through [`StateMachine::reset`]
//!
//! # Examples
//!
//! ```
//! use timeclock_kiosk::{KioskState, StateMachine};
//!
//! let mut machine = StateMachine::new();
//! assert_eq!(machine.current_state(), &KioskState::Idle);
//!
//! machine.transition_to(KioskState::Preflight).unwrap();
//! assert!(machine.transition_to(KioskState::Confirmation).is_err());
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use timeclock_core::{Error, Result};

/// Maximum number of state transitions to keep in history.
///
/// A complete booking takes four to five transitions, so this covers the
/// last twenty or so sessions for debugging.
const MAX_HISTORY_SIZE: usize = 100;

/// Screens of the attendance workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KioskState {
    /// Waiting for a card.
    Idle,

    /// Settings unlocked by an admin card.
    Admin,

    /// Preflight request outstanding.
    Preflight,

    /// A question is on screen.
    Questions,

    /// Clock request outstanding.
    Clocking,

    /// Booking confirmed.
    Confirmation,

    /// Booking failed.
    Error,

    /// No valid token. Left only through a successful token fetch.
    Maintenance,
}

impl fmt::Display for KioskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            KioskState::Idle => "Idle",
            KioskState::Admin => "Admin",
            KioskState::Preflight => "Preflight",
            KioskState::Questions => "Questions",
            KioskState::Clocking => "Clocking",
            KioskState::Confirmation => "Confirmation",
            KioskState::Error => "Error",
            KioskState::Maintenance => "Maintenance",
        };
        write!(f, "{}", state_str)
    }
}

impl KioskState {
    /// Check if transition to target state is valid from this state.
    ///
    /// Returning to `Idle` is not listed here; it always goes through
    /// [`StateMachine::reset`].
    ///
    /// # Examples
    ///
    /// ```
    /// use timeclock_kiosk::KioskState;
    ///
    /// assert!(KioskState::Idle.can_transition_to(&KioskState::Preflight));
    /// assert!(!KioskState::Idle.can_transition_to(&KioskState::Clocking));
    /// assert!(KioskState::Questions.can_transition_to(&KioskState::Maintenance));
    /// ```
    pub fn can_transition_to(&self, target: &KioskState) -> bool {
        matches!(
            (self, target),
            // From Idle
            (KioskState::Idle, KioskState::Admin | KioskState::Preflight)
            // From Preflight
            | (KioskState::Preflight, KioskState::Questions | KioskState::Clocking | KioskState::Error)
            // From Questions
            | (KioskState::Questions, KioskState::Clocking)
            // From Clocking
            | (KioskState::Clocking, KioskState::Confirmation | KioskState::Error)
        ) || (*target == KioskState::Maintenance && *self != KioskState::Maintenance)
    }
}

/// Represents a single state transition with timestamp.
#[derive(Debug, Clone)]
pub struct StateTransition {
    /// The state transitioned from.
    pub from: KioskState,

    /// The state transitioned to.
    pub to: KioskState,

    /// When the transition occurred.
    pub timestamp: Instant,
}

impl StateTransition {
    pub fn new(from: KioskState, to: KioskState) -> Self {
        Self {
            from,
            to,
            timestamp: Instant::now(),
        }
    }
}

/// State machine for the attendance workflow.
///
/// Enforces valid transitions and keeps a bounded transition history.
///
/// # Thread Safety
///
/// Not synchronised. The orchestrator owns it on the event loop.
///
/// # Examples
///
/// ```
/// use timeclock_kiosk::{KioskState, StateMachine};
///
/// let mut machine = StateMachine::new();
/// machine.transition_to(KioskState::Preflight).unwrap();
/// machine.transition_to(KioskState::Clocking).unwrap();
/// machine.transition_to(KioskState::Confirmation).unwrap();
/// machine.reset();
///
/// assert_eq!(machine.history().len(), 4);
/// ```
#[derive(Debug)]
pub struct StateMachine {
    /// Current screen.
    current_state: KioskState,

    /// When the current state was entered.
    state_entered_at: Instant,

    /// History of state transitions (limited to MAX_HISTORY_SIZE).
    history: VecDeque<StateTransition>,
}

impl StateMachine {
    /// Create a new state machine in the Idle state.
    pub fn new() -> Self {
        Self {
            current_state: KioskState::Idle,
            state_entered_at: Instant::now(),
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    /// Create a builder for constructing a state machine with custom configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use timeclock_kiosk::{KioskState, StateMachine};
    ///
    /// let machine = StateMachine::builder()
    ///     .with_initial_state(KioskState::Maintenance)
    ///     .build();
    ///
    /// assert_eq!(machine.current_state(), &KioskState::Maintenance);
    /// ```
    pub fn builder() -> StateMachineBuilder {
        StateMachineBuilder::default()
    }

    pub fn current_state(&self) -> &KioskState {
        &self.current_state
    }

    /// Get the time elapsed in the current state.
    pub fn time_in_current_state(&self) -> Duration {
        self.state_entered_at.elapsed()
    }

    /// Transition history, oldest first.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// Transition to a new state, validating the transition.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidStateTransition` if the transition is not valid
    /// for the current state. The state is left unchanged.
    pub fn transition_to(&mut self, new_state: KioskState) -> Result<StateTransition> {
        if !self.current_state.can_transition_to(&new_state) {
            return Err(Error::InvalidStateTransition {
                from: self.current_state.to_string(),
                to: new_state.to_string(),
            });
        }

        let transition = StateTransition::new(self.current_state, new_state);
        self.perform_state_change(new_state, transition.clone());
        Ok(transition)
    }

    /// Return to Idle from any state.
    ///
    /// Returns `None` if the machine already is Idle; no history entry is
    /// recorded in that case.
    pub fn reset(&mut self) -> Option<StateTransition> {
        if self.current_state == KioskState::Idle {
            return None;
        }
        let transition = StateTransition::new(self.current_state, KioskState::Idle);
        self.perform_state_change(KioskState::Idle, transition.clone());
        Some(transition)
    }

    fn perform_state_change(&mut self, new_state: KioskState, transition: StateTransition) {
        self.current_state = new_state;
        self.state_entered_at = Instant::now();

        self.history.push_back(transition);
        if self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for constructing `StateMachine` instances with custom configuration.
#[derive(Debug)]
pub struct StateMachineBuilder {
    initial_state: KioskState,
}

impl StateMachineBuilder {
    /// Set the initial state for the machine.
    pub fn with_initial_state(mut self, state: KioskState) -> Self {
        self.initial_state = state;
        self
    }

    pub fn build(self) -> StateMachine {
        StateMachine {
            current_state: self.initial_state,
            state_entered_at: Instant::now(),
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }
}

impl Default for StateMachineBuilder {
    fn default() -> Self {
        Self {
            initial_state: KioskState::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_new_machine_starts_idle() {
        let machine = StateMachine::new();
        assert_eq!(machine.current_state(), &KioskState::Idle);
        assert_eq!(machine.history().len(), 0);
    }

    #[rstest]
    #[case(KioskState::Idle, KioskState::Admin)]
    #[case(KioskState::Idle, KioskState::Preflight)]
    #[case(KioskState::Preflight, KioskState::Questions)]
    #[case(KioskState::Preflight, KioskState::Clocking)]
    #[case(KioskState::Preflight, KioskState::Error)]
    #[case(KioskState::Questions, KioskState::Clocking)]
    #[case(KioskState::Clocking, KioskState::Confirmation)]
    #[case(KioskState::Clocking, KioskState::Error)]
    #[case(KioskState::Admin, KioskState::Maintenance)]
    #[case(KioskState::Questions, KioskState::Maintenance)]
    fn test_valid_transitions(#[case] from: KioskState, #[case] to: KioskState) {
        let mut machine = StateMachine::builder().with_initial_state(from).build();
        let transition = machine.transition_to(to).unwrap();
        assert_eq!(transition.from, from);
        assert_eq!(transition.to, to);
        assert_eq!(machine.current_state(), &to);
    }

    #[rstest]
    #[case(KioskState::Idle, KioskState::Clocking)]
    #[case(KioskState::Idle, KioskState::Questions)]
    #[case(KioskState::Admin, KioskState::Preflight)]
    #[case(KioskState::Questions, KioskState::Confirmation)]
    #[case(KioskState::Confirmation, KioskState::Preflight)]
    #[case(KioskState::Error, KioskState::Clocking)]
    #[case(KioskState::Maintenance, KioskState::Maintenance)]
    #[case(KioskState::Maintenance, KioskState::Preflight)]
    #[case(KioskState::Preflight, KioskState::Idle)]
    fn test_invalid_transitions(#[case] from: KioskState, #[case] to: KioskState) {
        let mut machine = StateMachine::builder().with_initial_state(from).build();
        let result = machine.transition_to(to);
        assert!(matches!(result, Err(Error::InvalidStateTransition { .. })));
        assert_eq!(machine.current_state(), &from);
        assert!(machine.history().is_empty());
    }

    #[test]
    fn test_reset_from_any_state() {
        let mut machine = StateMachine::builder()
            .with_initial_state(KioskState::Maintenance)
            .build();
        let transition = machine.reset().unwrap();
        assert_eq!(transition.from, KioskState::Maintenance);
        assert_eq!(machine.current_state(), &KioskState::Idle);

        assert!(machine.reset().is_none());
        assert_eq!(machine.history().len(), 1);
    }

    #[test]
    fn test_complete_booking_flow() {
        let mut machine = StateMachine::new();
        machine.transition_to(KioskState::Preflight).unwrap();
        machine.transition_to(KioskState::Questions).unwrap();
        machine.transition_to(KioskState::Clocking).unwrap();
        machine.transition_to(KioskState::Confirmation).unwrap();
        machine.reset();

        let states: Vec<_> = machine.history().iter().map(|t| t.to).collect();
        assert_eq!(
            states,
            vec![
                KioskState::Preflight,
                KioskState::Questions,
                KioskState::Clocking,
                KioskState::Confirmation,
                KioskState::Idle
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_in_current_state_restarts_on_transition() {
        let mut machine = StateMachine::new();
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(machine.time_in_current_state() >= Duration::from_secs(3));

        let transition = machine.transition_to(KioskState::Preflight).unwrap();
        assert_eq!(transition.timestamp, Instant::now());
        assert_eq!(machine.time_in_current_state(), Duration::ZERO);

        tokio::time::advance(Duration::from_millis(250)).await;
        machine.reset();
        assert_eq!(machine.time_in_current_state(), Duration::ZERO);
        assert_eq!(machine.history().len(), 2);
    }

    #[test]
    fn test_history_size_limit() {
        let mut machine = StateMachine::new();
        for _ in 0..60 {
            machine.transition_to(KioskState::Admin).unwrap();
            machine.reset();
        }
        assert_eq!(machine.history().len(), MAX_HISTORY_SIZE);
        assert_eq!(machine.history().back().unwrap().to, KioskState::Idle);
    }

    #[test]
    fn test_state_display_formatting() {
        assert_eq!(KioskState::Idle.to_string(), "Idle");
        assert_eq!(KioskState::Maintenance.to_string(), "Maintenance");
        assert_eq!(format!("{}", KioskState::Questions), "Questions");
    }
}
