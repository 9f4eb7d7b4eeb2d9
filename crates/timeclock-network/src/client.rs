//! HTTP client for the attendance backend.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator
//!     │ ApiRequest + ticket
//!     ▼
//! ApiClient::dispatch ──spawn──> reqwest ───(HTTPS)───> Backend
//!     │
//!     └── Completion { ticket, outcome } ──mpsc──> event loop
//! ```
//!
//! # Design Principles
//!
//! - **Never blocks the caller**: `dispatch` spawns the call and returns.
//! - **Exactly one outcome**: every dispatched call yields one
//!   [`Completion`], whatever happens on the wire.
//! - **No automatic retry**: the caller's fixed intervals decide.
//! - **No redirects**: a 3xx is reported as [`Outcome::Redirect`].
//!
//! # Timeout Handling
//!
//! A single timeout (default 10 s) covers connect, send and body read.
//! Expiry is reported as [`Outcome::Error`].

use crate::request::{ApiRequest, Outcome};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, Url, redirect};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use timeclock_core::Token;
use timeclock_core::constants::DEFAULT_REQUEST_TIMEOUT_SECS;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Configuration for [`ApiClient`].
///
/// # Example
///
/// ```
/// use timeclock_network::ApiClientConfig;
/// use std::time::Duration;
///
/// let config = ApiClientConfig {
///     base_url: "https://api.example.org/".to_string(),
///     timeout: Duration::from_secs(5),
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Base URL every request path is joined onto.
    pub base_url: String,

    /// Timeout for the whole request.
    pub timeout: Duration,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.medunigraz.at/".to_string(),
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Errors that can occur while setting up the client.
///
/// Individual calls never fail with this type; they report an [`Outcome`].
#[derive(Debug, Error)]
pub enum ApiError {
    /// Base URL does not parse or cannot be a base
    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// HTTP client construction failed
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Outcome of a dispatched call, tagged with the caller's ticket.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion<T> {
    pub ticket: T,
    pub outcome: Outcome,
}

/// Asynchronous client for the backend REST API.
///
/// Cheap to clone; clones share the connection pool.
///
/// # Example
///
/// ```no_run
/// use timeclock_network::{ApiClient, ApiClientConfig, ApiRequest, Outcome};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ApiClient::new(ApiClientConfig::default())?;
/// match client.send(&ApiRequest::token("terminal", "secret"), None).await {
///     Outcome::Success { body, .. } => println!("token response: {body}"),
///     other => println!("token fetch failed: {}", other.kind()),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a client for the configured backend.
    ///
    /// A missing trailing slash on the base URL is added so that its path
    /// segments are kept when joining request paths.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: ApiClientConfig) -> Result<Self, ApiError> {
        let base_url = parse_base_url(&config.base_url)?;
        debug!(base_url = %base_url, timeout_ms = config.timeout.as_millis() as u64, "creating API client");

        let http = Client::builder()
            .timeout(config.timeout)
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a request path against the base URL.
    ///
    /// ```
    /// use timeclock_network::{ApiClient, ApiClientConfig};
    ///
    /// let client = ApiClient::new(ApiClientConfig {
    ///     base_url: "https://host/api".to_string(),
    ///     ..Default::default()
    /// }).unwrap();
    /// assert_eq!(
    ///     client.url("attendance/1/04ABCDEF/").unwrap().as_str(),
    ///     "https://host/api/attendance/1/04ABCDEF/"
    /// );
    /// ```
    ///
    /// # Errors
    ///
    /// Returns the parse error message if the path cannot be joined.
    pub fn url(&self, path: &str) -> Result<Url, String> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| e.to_string())
    }

    /// Perform one call and classify its outcome.
    ///
    /// Sends `Accept: application/json`, a JSON body with its content type
    /// when present, and `Authorization: Token ...` when a token is given.
    pub async fn send(&self, request: &ApiRequest, token: Option<&Token>) -> Outcome {
        let url = match self.url(&request.path) {
            Ok(url) => url,
            Err(e) => return Outcome::Error(e),
        };

        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .header(ACCEPT, "application/json");
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, token.authorization());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(method = %request.method, path = %request.path, error = %e, "request failed");
                return Outcome::Error(describe(&e));
            }
        };

        let status = response.status();
        if status.is_redirection() {
            warn!(method = %request.method, path = %request.path, status = status.as_u16(), "redirect refused");
            return Outcome::Redirect {
                status: status.as_u16(),
            };
        }

        let body = match response.bytes().await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or(Value::Null),
            Err(e) => {
                warn!(method = %request.method, path = %request.path, error = %e, "reading response body failed");
                return Outcome::Error(describe(&e));
            }
        };

        info!(method = %request.method, path = %request.path, status = status.as_u16(), "api_response");
        if status.is_success() {
            Outcome::Success {
                status: status.as_u16(),
                body,
            }
        } else {
            Outcome::Failure {
                status: status.as_u16(),
                body,
            }
        }
    }

    /// Spawn a call and deliver its outcome on `completions`.
    ///
    /// Returns immediately. If the receiver is gone when the call finishes
    /// the outcome is dropped.
    pub fn dispatch<T>(
        &self,
        ticket: T,
        request: ApiRequest,
        token: Option<Token>,
        completions: mpsc::UnboundedSender<Completion<T>>,
    ) where
        T: Send + 'static,
    {
        let client = self.clone();
        tokio::spawn(async move {
            let outcome = client.send(&request, token.as_ref()).await;
            if completions.send(Completion { ticket, outcome }).is_err() {
                debug!(path = %request.path, "completion receiver dropped");
            }
        });
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ApiError> {
    let invalid = |reason: String| ApiError::InvalidBaseUrl {
        url: raw.to_string(),
        reason,
    };

    let mut text = raw.trim().to_string();
    if !text.ends_with('/') {
        text.push('/');
    }
    let url = Url::parse(&text).map_err(|e| invalid(e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(invalid("cannot be a base".to_string()));
    }
    Ok(url)
}

fn describe(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("timeout: {error}")
    } else if error.is_connect() {
        format!("connect: {error}")
    } else {
        error.to_string()
    }
}
