//! # asker
//!
//! An async HTTP(S) client with retries, timeouts and connection pools.
//!
//! Every request runs as one tokio task that waits for a pooled socket
//! under a queue timeout, exchanges the request under a socket timeout,
//! retries with exponential backoff and delivers its outcome exactly once.
//!
//! ## Features
//!
//! - **Retries**: status filter plus an optional veto, backoff capped by `max_retries_timeout`
//! - **Timeouts**: separate queue and socket timers per attempt
//! - **Agents**: named per-protocol pools with `max_sockets` and self-evicting non-persistent agents
//! - **Body encoders**: `string`, `json`, `urlencoded`, `raw`, `multipart` and custom ones
//! - **Gzip**: transparent inflation of gzip encoded responses
//! - **TLS**: BoringSSL for `https` targets
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use asker::RequestOptions;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let response = asker::fetch(
//!         RequestOptions::builder()
//!             .url("example.com/search")
//!             .query("q", "rust")
//!             .max_retries(2)
//!             .timeout(Duration::from_secs(2)),
//!     )
//!     .await
//!     .unwrap();
//!     println!("Status: {}", response.status_code());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error taxonomy, diagnostics, timers and execution states
//! - [`http`] - Request bodies, encoders, retry policy and attempts
//! - [`socket`] - Transport, TLS, agents and the agent registry
//! - [`urlrequest`] - Request options, the retry job and the execution handle

pub mod base;
pub mod client;
pub mod http;
pub mod socket;
pub mod urlrequest;

pub use crate::base::askererror::{AskerError, ErrorCode};
pub use crate::client::{Client, ClientBuilder, RequestBuilder};
pub use crate::http::{RequestBody, Response};
pub use crate::socket::{AgentOptions, AgentRegistry, AgentSelector};
pub use crate::urlrequest::{Request, RequestOptions};

/// Build and execute a request on the default client.
///
/// The callback receives the outcome exactly once. Must be called from
/// within a tokio runtime.
pub fn ask<F>(options: RequestOptions, callback: F) -> Option<Request>
where
    F: FnOnce(Result<Response, AskerError>) + Send + 'static,
{
    Client::global().ask(options, callback)
}

/// Build a request on the default client, execute it and wait for the outcome.
pub async fn fetch(options: RequestOptions) -> Result<Response, AskerError> {
    Client::global().fetch(options).await
}
