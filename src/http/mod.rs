//! Request bodies, encoders, retry policy and the per-attempt exchange.

pub mod encoders;
pub mod multipart;
pub mod requestbody;
pub mod response;
pub mod responsebody;
pub mod retry;
pub mod transaction;

// Re-exports for convenience
pub use encoders::{BodyEncoder, BodyEncoders, ContentType};
pub use requestbody::{FilePart, FormField, RequestBody};
pub use response::{Response, ResponseMeta, RetryStats};
pub use retry::{RetryPolicy, StatusVerdict};
