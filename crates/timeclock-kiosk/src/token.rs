//! Backend token lifecycle.

use timeclock_core::Token;
use timeclock_network::{ApiRequest, Outcome, extract_token};
use tracing::{info, warn};

/// Effect of a token fetch on the kiosk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenUpdate {
    /// Same token as before.
    Unchanged,

    /// A new token replaced the old one (or none). The kiosk resets.
    Changed,

    /// The fetch failed and the token was cleared. The kiosk enters
    /// Maintenance.
    Lost,
}

/// Holds the credentials and the current token.
pub struct TokenManager {
    username: String,
    password: String,
    token: Option<Token>,
}

impl TokenManager {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            token: None,
        }
    }

    pub fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Request that exchanges the credentials for a token.
    pub fn request(&self) -> ApiRequest {
        ApiRequest::token(&self.username, &self.password)
    }

    /// Apply the outcome of a token fetch.
    ///
    /// Only a 2xx response carrying a non-empty `token` keeps a token;
    /// anything else clears it.
    pub fn handle(&mut self, outcome: &Outcome) -> TokenUpdate {
        let fresh = match outcome {
            Outcome::Success { body, .. } => extract_token(body),
            _ => None,
        };

        match fresh {
            Some(token) if self.token.as_ref() == Some(&token) => TokenUpdate::Unchanged,
            Some(token) => {
                info!(replaced = self.token.is_some(), "token_changed");
                self.token = Some(token);
                TokenUpdate::Changed
            }
            None => {
                warn!(outcome = outcome.kind(), status = ?outcome.status(), "token_lost");
                self.token = None;
                TokenUpdate::Lost
            }
        }
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("username", &self.username)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}
