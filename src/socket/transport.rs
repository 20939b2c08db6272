//! Transport seam.
//!
//! A [`Transport`] opens a [`Connection`] to a [`Target`]; a connection sends
//! one request at a time and streams the response body back. The default
//! implementation lives in [`connectjob`](crate::socket::connectjob).

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use http::{HeaderMap, StatusCode};
use std::fmt;
use std::io;
use thiserror::Error;

/// Scheme of a request target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    pub fn scheme(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Http => 80,
            Protocol::Https => 443,
        }
    }

    /// Parse a scheme, accepting a trailing colon (`"https:"`).
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        let scheme = scheme.strip_suffix(':').unwrap_or(scheme);
        if scheme.eq_ignore_ascii_case("http") {
            Some(Protocol::Http)
        } else if scheme.eq_ignore_ascii_case("https") {
            Some(Protocol::Https)
        } else {
            None
        }
    }

    pub fn is_secure(self) -> bool {
        self == Protocol::Https
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Connection endpoint. Pools group sockets by target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
}

impl Target {
    pub fn new(protocol: Protocol, host: impl Into<String>, port: u16) -> Self {
        Self {
            protocol,
            host: host.into(),
            port,
        }
    }

    /// `host:port`, with IPv6 literals bracketed.
    pub fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Value for the `host` header; the port is omitted when it is the
    /// protocol default.
    pub fn host_header(&self) -> String {
        if self.port == self.protocol.default_port() {
            if self.host.contains(':') && !self.host.starts_with('[') {
                format!("[{}]", self.host)
            } else {
                self.host.clone()
            }
        } else {
            self.authority()
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Name resolution for {host} failed: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("Connection to {host}:{port} failed: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("TLS handshake with {host} failed: {message}")]
    Tls { host: String, message: String },

    #[error("HTTP protocol error: {0}")]
    Protocol(#[from] hyper::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] http::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error("Connection closed")]
    Closed,
}

pub type BodyStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Response head plus a body stream.
pub struct IncomingResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyStream,
}

impl fmt::Debug for IncomingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// An established connection.
pub trait Connection: Send {
    fn send(
        &mut self,
        request: http::Request<Bytes>,
    ) -> BoxFuture<'_, Result<IncomingResponse, TransportError>>;

    /// Whether the connection can carry another request once the current
    /// response has been read to the end.
    fn is_reusable(&self) -> bool;
}

pub trait Transport: Send + Sync {
    fn connect(&self, target: &Target)
        -> BoxFuture<'static, Result<Box<dyn Connection>, TransportError>>;
}
