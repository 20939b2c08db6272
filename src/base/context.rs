//! Error context helpers.
//!
//! [`Diagnostics`] is the request identity bound into execution errors.
//! [`IoResultExt`] converts IO errors into context-rich [`TransportError`]s.

use crate::socket::transport::TransportError;
use std::fmt;
use std::io;

/// Request id, timing summary and URL of the request an error belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub request_id: String,
    pub timings: String,
    pub url: String,
}

impl Diagnostics {
    pub fn new(
        request_id: impl Into<String>,
        timings: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            timings: timings.into(),
            url: url.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.request_id.is_empty() && self.timings.is_empty() && self.url.is_empty()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for part in [&self.request_id, &self.timings, &self.url] {
            if part.is_empty() {
                continue;
            }
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(part)?;
            first = false;
        }
        Ok(())
    }
}

/// Extension trait for adding context to IO Results.
pub trait IoResultExt<T> {
    /// Add connection context to an IO error.
    ///
    /// # Example
    /// ```ignore
    /// use asker::base::context::IoResultExt;
    ///
    /// let stream = TcpStream::connect(addr).await
    ///     .connection_context("example.com", 443)?;
    /// // Error: "Connection to example.com:443 failed: connection refused"
    /// ```
    fn connection_context(self, host: &str, port: u16) -> Result<T, TransportError>;

    /// Add DNS resolution context to an IO error.
    fn dns_context(self, host: &str) -> Result<T, TransportError>;
}

impl<T> IoResultExt<T> for Result<T, io::Error> {
    fn connection_context(self, host: &str, port: u16) -> Result<T, TransportError> {
        self.map_err(|source| TransportError::Connect {
            host: host.to_string(),
            port,
            source,
        })
    }

    fn dns_context(self, host: &str) -> Result<T, TransportError> {
        self.map_err(|source| TransportError::Resolve {
            host: host.to_string(),
            source,
        })
    }
}
