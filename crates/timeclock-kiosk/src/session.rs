//! Per-card booking session.

use serde_json::Value;
use timeclock_core::{Answers, CardId, Question};
use tracing::warn;

use crate::error::{KioskError, Result};

/// State of the booking in progress.
///
/// The generation increases on every reset. Requests carry the generation
/// they were issued under so late completions from an abandoned session can
/// be recognised.
#[derive(Debug, Default)]
pub struct Session {
    card_id: Option<CardId>,
    pending: Vec<Question>,
    current: Option<Question>,
    answers: Answers,
    generation: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything and start a new generation.
    pub fn reset(&mut self) {
        self.card_id = None;
        self.pending.clear();
        self.current = None;
        self.answers.clear();
        self.generation += 1;
    }

    /// Attach the card being booked.
    pub fn begin(&mut self, card_id: CardId) {
        self.card_id = Some(card_id);
    }

    pub fn card_id(&self) -> Option<&CardId> {
        self.card_id.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn answers(&self) -> &Answers {
        &self.answers
    }

    pub fn current(&self) -> Option<&Question> {
        self.current.as_ref()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Load the questions from a preflight `data` list.
    ///
    /// Non-object elements are not questions and are skipped silently;
    /// malformed question objects are skipped with a warning. Returns the
    /// number of questions loaded.
    pub fn load_questions(&mut self, data: &[Value]) -> usize {
        self.pending = data
            .iter()
            .filter(|v| v.is_object())
            .filter_map(|v| match Question::from_value(v) {
                Ok(question) => Some(question),
                Err(e) => {
                    warn!(error = %e, "skipping question");
                    None
                }
            })
            .collect();
        self.pending.len()
    }

    /// Make the next question current.
    ///
    /// Questions are taken from the end of the list the backend sent.
    pub fn next_question(&mut self) -> Option<&Question> {
        self.current = self.pending.pop();
        self.current.as_ref()
    }

    /// Record the answer to the current question.
    ///
    /// # Errors
    /// Returns `KioskError::NoActiveQuestion` if no question is current and
    /// `KioskError::UnknownOption` if the key is not one of its options.
    pub fn record_answer(&mut self, key: &str) -> Result<()> {
        let question = self.current.as_ref().ok_or(KioskError::NoActiveQuestion)?;
        if question.option(key).is_none() {
            return Err(KioskError::UnknownOption {
                question: question.id.clone(),
                key: key.to_string(),
            });
        }
        self.answers.insert(question.id.clone(), key.to_string());
        Ok(())
    }
}
