//! Presentation boundary of the kiosk.
//!
//! The orchestrator never draws anything itself. It emits [`ViewUpdate`]s to
//! a [`View`], which may be a touch UI, a console, or a recorder in tests.
//!
//! # Examples
//!
//! ```
//! use timeclock_kiosk::{ConsoleView, KioskState, View, ViewUpdate};
//!
//! let mut view = ConsoleView::new(Vec::new(), 20);
//! view.render(ViewUpdate::Screen(KioskState::Idle));
//!
//! let text = String::from_utf8(view.into_inner()).unwrap();
//! assert_eq!(text, "======= Idle =======\n");
//! ```

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

use timeclock_core::Question;
use tracing::warn;

use crate::state_machine::KioskState;

/// Icon shown next to an error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorIcon {
    /// The backend does not know the card.
    UnknownCard,

    /// Anything else went wrong.
    Warning,
}

/// One change to what the terminal shows.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewUpdate {
    /// Switch to the screen for a state.
    Screen(KioskState),

    /// Present a question with its options.
    Question(Question),

    /// Remove the question and its buttons.
    ClearQuestion,

    /// Booking confirmation, one message per line.
    Confirmation(String),

    /// Booking failure.
    Error { message: String, icon: ErrorIcon },

    /// Wall clock text.
    Time(String),

    /// Scroll the question area back to the top.
    ScrollTop,

    /// Interface name to addresses, for the network diagnostics page.
    Network(BTreeMap<String, Vec<String>>),
}

/// Receiver of view updates.
pub trait View {
    fn render(&mut self, update: ViewUpdate);
}

/// Line-oriented view for headless terminals.
///
/// Screen changes print a centered banner; clock updates are only kept for
/// the next banner.
#[derive(Debug)]
pub struct ConsoleView<W> {
    out: W,
    width: usize,
    time: Option<String>,
}

impl<W: Write> ConsoleView<W> {
    pub fn new(out: W, width: usize) -> Self {
        Self {
            out,
            width,
            time: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn lines(&self, update: ViewUpdate) -> Vec<String> {
        match update {
            ViewUpdate::Screen(state) => {
                let title = match &self.time {
                    Some(time) if state == KioskState::Idle => format!(" {state} | {time} "),
                    _ => format!(" {state} "),
                };
                vec![center(&title, self.width, '=')]
            }
            ViewUpdate::Question(question) => {
                let mut lines = vec![format!("? {}", question.text)];
                lines.extend(
                    question
                        .options
                        .iter()
                        .map(|o| format!("  [{}] {}", o.key, o.text)),
                );
                lines
            }
            ViewUpdate::Confirmation(text) => text.lines().map(|l| format!("OK {l}")).collect(),
            ViewUpdate::Error { message, icon } => {
                let prefix = match icon {
                    ErrorIcon::UnknownCard => "??",
                    ErrorIcon::Warning => "!!",
                };
                vec![format!("{prefix} {message}")]
            }
            ViewUpdate::Network(interfaces) => interfaces
                .into_iter()
                .map(|(name, addresses)| format!("{name}: {}", addresses.join(", ")))
                .collect(),
            ViewUpdate::Time(_) | ViewUpdate::ClearQuestion | ViewUpdate::ScrollTop => Vec::new(),
        }
    }
}

impl<W: Write> View for ConsoleView<W> {
    fn render(&mut self, update: ViewUpdate) {
        if let ViewUpdate::Time(time) = &update {
            self.time = Some(time.clone());
        }
        for line in self.lines(update) {
            if let Err(e) = writeln!(self.out, "{line}") {
                warn!(error = %e, "console write failed");
                return;
            }
        }
        if let Err(e) = self.out.flush() {
            warn!(error = %e, "console flush failed");
        }
    }
}

/// Center `text` within `width` columns using `fill`.
///
/// Text wider than the line is returned unchanged. An odd remainder goes to
/// the right.
fn center(text: &str, width: usize, fill: char) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    let left = (width - len) / 2;
    let right = width - len - left;
    let fill = fill.to_string();
    format!("{}{}{}", fill.repeat(left), text, fill.repeat(right))
}

/// View that stores every update, shared with the test that created it.
#[derive(Debug, Clone, Default)]
pub struct RecordingView {
    updates: Arc<Mutex<Vec<ViewUpdate>>>,
}

impl RecordingView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything rendered so far.
    pub fn updates(&self) -> Vec<ViewUpdate> {
        self.updates.lock().map(|u| u.clone()).unwrap_or_default()
    }

    /// Drop the recorded updates.
    pub fn clear(&self) {
        if let Ok(mut updates) = self.updates.lock() {
            updates.clear();
        }
    }
}

impl View for RecordingView {
    fn render(&mut self, update: ViewUpdate) {
        if let Ok(mut updates) = self.updates.lock() {
            updates.push(update);
        }
    }
}
