//! High-level request API: options, the retry job and the execution handle.

pub mod job;
pub mod options;
pub mod request;

pub use options::{NormalizedOptions, RequestOptions};
pub use request::Request;
