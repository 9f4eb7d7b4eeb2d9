//! Network communication layer for the timeclock kiosk.
//!
//! This crate talks to the attendance backend over HTTPS. Every call is
//! classified into exactly one [`Outcome`] so the kiosk can tell apart a
//! rejected card (failure with status), an unreachable backend (error) and
//! a misconfigured endpoint (redirect).
//!
//! # Components
//!
//! - **ApiClient**: reqwest based client with fixed timeout and no redirects
//! - **ApiRequest**: builders for the token, attendance and terminal endpoints
//!
//! # Example
//!
//! ```no_run
//! use timeclock_network::{ApiClient, ApiClientConfig, ApiRequest, Completion};
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ApiClient::new(ApiClientConfig::default())?;
//! let (tx, mut rx) = mpsc::unbounded_channel::<Completion<u64>>();
//!
//! client.dispatch(1, ApiRequest::token("terminal", "secret"), None, tx);
//! let completion = rx.recv().await.unwrap();
//! println!("ticket {} -> {}", completion.ticket, completion.outcome.kind());
//! # Ok(())
//! # }
//! ```

mod client;
mod request;

pub use client::{ApiClient, ApiClientConfig, ApiError, Completion};
pub use request::{ApiRequest, Outcome, extract_token};
pub use reqwest::Method;
