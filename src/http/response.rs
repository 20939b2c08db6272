//! Successful request outcome.

use crate::base::timer::Timers;
use crate::urlrequest::options::NormalizedOptions;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use std::string::FromUtf8Error;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryStats {
    pub used: u32,
    pub limit: u32,
}

/// Execution details attached to a response.
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub time: Timers,
    pub retries: RetryStats,
    pub options: Arc<NormalizedOptions>,
}

#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    data: Option<Bytes>,
    headers: HeaderMap,
    meta: ResponseMeta,
}

impl Response {
    pub(crate) fn new(
        status: StatusCode,
        data: Option<Bytes>,
        headers: HeaderMap,
        meta: ResponseMeta,
    ) -> Self {
        Self {
            status,
            data,
            headers,
            meta,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Decoded body. `None` for an empty body.
    pub fn data(&self) -> Option<&Bytes> {
        self.data.as_ref()
    }

    pub fn into_data(self) -> Option<Bytes> {
        self.data
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn meta(&self) -> &ResponseMeta {
        &self.meta
    }

    /// Body as UTF-8. An empty body gives an empty string.
    pub fn text(&self) -> Result<String, FromUtf8Error> {
        String::from_utf8(self.data.as_deref().unwrap_or_default().to_vec())
    }

    /// Deserialize the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(self.data.as_deref().unwrap_or_default())
    }
}
