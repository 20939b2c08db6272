//! Socket and connection management.
//!
//! - [`transport`]: `Transport`/`Connection` traits and the dispatch target
//! - [`connectjob`]: DNS → TCP → TLS connection flow and the hyper HTTP/1.1 connection
//! - [`tls`]: TLS configuration with BoringSSL
//! - [`pool`]: bounded per-target agent with a FIFO wait queue
//! - [`registry`]: named agents per protocol

pub mod connectjob;
pub mod pool;
pub mod registry;
pub mod stream;
pub mod tls;
pub mod transport;

pub use connectjob::HttpTransport;
pub use pool::{Agent, AgentOptions, ConnectionManager, Socket, Unpooled};
pub use registry::{AgentRegistry, AgentSelector, ResolvedAgent};
pub use tls::TlsConfig;
pub use transport::{Connection, Protocol, Target, Transport, TransportError};
