//! Backend requests and their outcomes.
//!
//! | Call | Method | Path |
//! |---|---|---|
//! | Token fetch | POST | `auth/token/` |
//! | Preflight | GET | `attendance/{terminal}/{card_id}/` |
//! | Clock | POST | `attendance/{terminal}/{card_id}/` |
//! | Diagnostics / screenshot upload | PATCH | `v1/attendance/terminal/{terminal}/` |

use reqwest::Method;
use serde_json::{Value, json};
use timeclock_core::constants::{ATTENDANCE_PATH, TERMINAL_PATH, TOKEN_PATH};
use timeclock_core::{Answers, CardId, Token};

/// One HTTP call against the backend, relative to the base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    /// Attach a JSON body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Credential exchange for a token.
    ///
    /// ```
    /// use timeclock_network::ApiRequest;
    ///
    /// let request = ApiRequest::token("terminal", "secret");
    /// assert_eq!(request.path, "auth/token/");
    /// assert_eq!(request.body.unwrap()["username"], "terminal");
    /// ```
    pub fn token(username: &str, password: &str) -> Self {
        Self::new(Method::POST, TOKEN_PATH)
            .with_body(json!({ "username": username, "password": password }))
    }

    /// Ask whether a card needs to answer questions before clocking.
    pub fn preflight(terminal: u32, card_id: &CardId) -> Self {
        Self::new(Method::GET, attendance_path(terminal, card_id))
    }

    /// Record the attendance event with the collected answers.
    pub fn clock(terminal: u32, card_id: &CardId, answers: &Answers) -> Self {
        Self::new(Method::POST, attendance_path(terminal, card_id)).with_body(json!(answers))
    }

    /// Upload the terminal diagnostics snapshot.
    pub fn diagnostics(terminal: u32, config: Value) -> Self {
        Self::new(Method::PATCH, terminal_path(terminal)).with_body(json!({ "config": config }))
    }

    /// Upload a base64 encoded PNG screenshot.
    pub fn screenshot(terminal: u32, png_base64: String) -> Self {
        Self::new(Method::PATCH, terminal_path(terminal))
            .with_body(json!({ "screen": png_base64 }))
    }
}

fn attendance_path(terminal: u32, card_id: &CardId) -> String {
    format!("{ATTENDANCE_PATH}/{terminal}/{card_id}/")
}

fn terminal_path(terminal: u32) -> String {
    format!("{TERMINAL_PATH}/{terminal}/")
}

/// Result of one backend call. Exactly one is delivered per call.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// 2xx response.
    Success { status: u16, body: Value },

    /// 4xx or 5xx response.
    Failure { status: u16, body: Value },

    /// 3xx response. Redirects are never followed.
    Redirect { status: u16 },

    /// Transport failure: connect, DNS, timeout or unreadable body.
    Error(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// HTTP status, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Success { status, .. }
            | Self::Failure { status, .. }
            | Self::Redirect { status } => Some(*status),
            Self::Error(_) => None,
        }
    }

    /// Short label for log records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Failure { .. } => "failure",
            Self::Redirect { .. } => "redirect",
            Self::Error(_) => "error",
        }
    }
}

/// Pull the token out of a token endpoint response body.
///
/// Missing, empty or non-string values yield `None`.
///
/// ```
/// use serde_json::json;
/// use timeclock_network::extract_token;
///
/// assert_eq!(extract_token(&json!({"token": "abc"})).unwrap().as_str(), "abc");
/// assert!(extract_token(&json!({"detail": "nope"})).is_none());
/// ```
pub fn extract_token(body: &Value) -> Option<Token> {
    body.get("token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(Token::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card() -> CardId {
        CardId::from_uid(&[0x04, 0xAB, 0xCD, 0xEF]).unwrap()
    }

    #[test]
    fn test_attendance_requests() {
        let preflight = ApiRequest::preflight(3, &card());
        assert_eq!(preflight.method, Method::GET);
        assert_eq!(preflight.path, "attendance/3/04ABCDEF/");
        assert!(preflight.body.is_none());

        let mut answers = Answers::new();
        answers.insert("7".to_string(), "y".to_string());
        let clock = ApiRequest::clock(3, &card(), &answers);
        assert_eq!(clock.method, Method::POST);
        assert_eq!(clock.path, preflight.path);
        assert_eq!(clock.body, Some(json!({"7": "y"})));
    }

    #[test]
    fn test_clock_without_answers_sends_empty_object() {
        let clock = ApiRequest::clock(1, &card(), &Answers::new());
        assert_eq!(clock.body, Some(json!({})));
    }

    #[test]
    fn test_terminal_uploads() {
        let diag = ApiRequest::diagnostics(12, json!({"version": "0.1.0"}));
        assert_eq!(diag.method, Method::PATCH);
        assert_eq!(diag.path, "v1/attendance/terminal/12/");
        assert_eq!(diag.body.unwrap()["config"]["version"], "0.1.0");

        let shot = ApiRequest::screenshot(12, "iVBORw0KGgo=".to_string());
        assert_eq!(shot.body.unwrap()["screen"], "iVBORw0KGgo=");
    }

    #[test]
    fn test_outcome_accessors() {
        assert_eq!(Outcome::Redirect { status: 302 }.status(), Some(302));
        assert_eq!(Outcome::Error("dns".into()).status(), None);
        assert_eq!(
            Outcome::Failure {
                status: 404,
                body: Value::Null
            }
            .kind(),
            "failure"
        );
    }

    #[test]
    fn test_extract_token_rejects_non_strings() {
        assert!(extract_token(&json!({"token": 5})).is_none());
        assert!(extract_token(&json!({"token": ""})).is_none());
        assert!(extract_token(&Value::Null).is_none());
    }
}
