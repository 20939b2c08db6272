//! Request options and their normalization.
//!
//! [`RequestOptions`] is what callers fill in. [`RequestOptions::normalize`]
//! resolves the url shorthand, merges the query into the path, lowercases
//! headers and encodes the body, producing the immutable
//! [`NormalizedOptions`] every attempt of a request shares.

use crate::base::askererror::AskerError;
use crate::http::encoders::{self, BodyEncoders};
use crate::http::requestbody::RequestBody;
use crate::http::retry::{
    default_status_filter, RetryHook, RetryPolicy, RetryPredicate, StatusFilter, StatusVerdict,
};
use crate::socket::registry::AgentSelector;
use crate::socket::transport::{Protocol, Target, TransportError};
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, ACCEPT_ENCODING, CONTENT_LENGTH};
use http::uri::PathAndQuery;
use http::{HeaderMap, Method};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::{form_urlencoded, Url};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PATH: &str = "/";
/// Socket timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);
/// Added to the socket timeout when no queue timeout is given.
pub const QUEUE_TIMEOUT_DELTA: Duration = Duration::from_millis(50);

/// Caller side request options.
///
/// ```ignore
/// let options = RequestOptions::builder()
///     .url("example.com/search?q=old")
///     .query("q", "new")
///     .max_retries(2)
///     .timeout(Duration::from_secs(1));
/// ```
#[derive(Clone)]
pub struct RequestOptions {
    url: Option<String>,
    protocol: Protocol,
    host: String,
    port: Option<u16>,
    path: String,
    method: String,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    body: Option<RequestBody>,
    body_encoding: String,
    retry: RetryPolicy,
    timeout: Duration,
    queue_timeout: Option<Duration>,
    allow_gzip: bool,
    request_id: String,
    agent: AgentSelector,
    status_filter: Option<StatusFilter>,
    on_retry: Option<RetryHook>,
    is_retry_allowed: Option<RetryPredicate>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            url: None,
            protocol: Protocol::Http,
            host: DEFAULT_HOST.to_string(),
            port: None,
            path: DEFAULT_PATH.to_string(),
            method: Method::GET.to_string(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
            body_encoding: encoders::TEXT.to_string(),
            retry: RetryPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
            queue_timeout: None,
            allow_gzip: true,
            request_id: String::new(),
            agent: AgentSelector::Default,
            status_filter: None,
            on_retry: None,
            is_retry_allowed: None,
        }
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("url", &self.url)
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("path", &self.path)
            .field("method", &self.method)
            .field("body_encoding", &self.body_encoding)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .field("queue_timeout", &self.queue_timeout)
            .field("request_id", &self.request_id)
            .field("agent", &self.agent)
            .finish_non_exhaustive()
    }
}

impl RequestOptions {
    pub fn builder() -> Self {
        Self::default()
    }

    /// Shorthand for protocol, host, port and path. `http://` is assumed
    /// when no scheme is given. Takes precedence over the separate fields.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Case-insensitive method name.
    pub fn method(mut self, method: impl AsRef<str>) -> Self {
        self.method = method.as_ref().to_string();
        self
    }

    /// Add a header. Names are case-insensitive; the last value wins.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add a query parameter. Overrides a parameter of the same name in
    /// the path.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` and send it with the `json` encoder.
    #[cfg(feature = "json")]
    pub fn json<T: serde::Serialize + ?Sized>(
        mut self,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        self.body = Some(RequestBody::json(value)?);
        self.body_encoding = encoders::JSON.to_string();
        Ok(self)
    }

    /// Name of the body encoder, `"string"` by default.
    pub fn body_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.body_encoding = encoding.into();
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    pub fn min_retries_timeout(mut self, timeout: Duration) -> Self {
        self.retry.min_timeout = timeout;
        self
    }

    pub fn max_retries_timeout(mut self, timeout: Duration) -> Self {
        self.retry.max_timeout = Some(timeout);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Socket timeout, counted from socket assignment to the end of the
    /// response body.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Limit on the wait for a pooled socket. Defaults to the socket
    /// timeout plus [`QUEUE_TIMEOUT_DELTA`].
    pub fn queue_timeout(mut self, timeout: Duration) -> Self {
        self.queue_timeout = Some(timeout);
        self
    }

    pub fn allow_gzip(mut self, allow: bool) -> Self {
        self.allow_gzip = allow;
        self
    }

    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn agent(mut self, agent: impl Into<AgentSelector>) -> Self {
        self.agent = agent.into();
        self
    }

    pub fn status_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(u16) -> StatusVerdict + Send + Sync + 'static,
    {
        self.status_filter = Some(Arc::new(filter));
        self
    }

    pub fn on_retry<F>(mut self, hook: F) -> Self
    where
        F: Fn(&AskerError, u32) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    pub fn is_retry_allowed<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&AskerError) -> bool + Send + Sync + 'static,
    {
        self.is_retry_allowed = Some(Arc::new(predicate));
        self
    }

    pub fn normalize(self, encoders: &BodyEncoders) -> Result<NormalizedOptions, AskerError> {
        let mut protocol = self.protocol;
        let mut host = self.host;
        let mut port = self.port;
        let mut path = self.path;

        if let Some(url) = &self.url {
            let url = parse_url_shorthand(url).map_err(AskerError::client_request)?;
            protocol = Protocol::from_scheme(url.scheme()).unwrap_or_default();
            host = url
                .host_str()
                .unwrap_or(DEFAULT_HOST)
                .trim_start_matches('[')
                .trim_end_matches(']')
                .to_string();
            port = url.port();
            path = match url.query() {
                Some(query) => format!("{}?{}", url.path(), query),
                None => url.path().to_string(),
            };
        }

        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        if !self.query.is_empty() {
            path = merge_query(&path, &self.query);
        }
        PathAndQuery::try_from(path.as_str())
            .map_err(|e| AskerError::client_request(http::Error::from(e)))?;

        let method = Method::from_bytes(self.method.to_ascii_uppercase().as_bytes())
            .map_err(|e| AskerError::client_request(http::Error::from(e)))?;

        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.to_ascii_lowercase().as_bytes())
                .map_err(|e| AskerError::client_request(http::Error::from(e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| AskerError::client_request(http::Error::from(e)))?;
            headers.insert(name, value);
        }

        let body = match self.body {
            Some(body) => {
                let encoded = encoders.encode(&self.body_encoding, body, &mut headers)?;
                if !headers.contains_key(CONTENT_LENGTH) {
                    headers.insert(CONTENT_LENGTH, HeaderValue::from(encoded.len()));
                }
                Some(encoded)
            }
            None => None,
        };

        if self.allow_gzip {
            add_gzip(&mut headers);
        }

        Ok(NormalizedOptions {
            target: Target::new(protocol, host, port.unwrap_or(protocol.default_port())),
            path,
            method,
            headers,
            body,
            body_encoding: self.body_encoding,
            retry: self.retry,
            timeout: self.timeout,
            queue_timeout: self
                .queue_timeout
                .unwrap_or(self.timeout + QUEUE_TIMEOUT_DELTA),
            allow_gzip: self.allow_gzip,
            request_id: self.request_id,
            agent: self.agent,
            status_filter: self.status_filter,
            on_retry: self.on_retry,
            is_retry_allowed: self.is_retry_allowed,
        })
    }
}

fn parse_url_shorthand(url: &str) -> Result<Url, TransportError> {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Ok(Url::parse(url)?)
    } else {
        Ok(Url::parse(&format!("http://{url}"))?)
    }
}

/// Replace parameters of `path` named in `query` and append `query`.
fn merge_query(path: &str, query: &[(String, String)]) -> String {
    let (base, existing) = path.split_once('?').unwrap_or((path, ""));

    let kept = form_urlencoded::parse(existing.as_bytes())
        .into_owned()
        .filter(|(key, _)| !query.iter().any(|(k, _)| k == key));
    let query = encoders::querystring(kept.chain(query.iter().cloned()));
    if query.is_empty() {
        base.to_string()
    } else {
        format!("{base}?{query}")
    }
}

/// `gzip, *` when absent, `gzip, <existing>` when present without gzip.
fn add_gzip(headers: &mut HeaderMap) {
    let existing = headers
        .get(ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("*");
    if existing.contains("gzip") {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(&format!("gzip, {existing}")) {
        headers.insert(ACCEPT_ENCODING, value);
    }
}

/// Options after normalization, shared by every attempt of a request.
pub struct NormalizedOptions {
    target: Target,
    path: String,
    method: Method,
    headers: HeaderMap,
    body: Option<Bytes>,
    body_encoding: String,
    retry: RetryPolicy,
    timeout: Duration,
    queue_timeout: Duration,
    allow_gzip: bool,
    request_id: String,
    agent: AgentSelector,
    status_filter: Option<StatusFilter>,
    on_retry: Option<RetryHook>,
    is_retry_allowed: Option<RetryPredicate>,
}

impl fmt::Debug for NormalizedOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NormalizedOptions")
            .field("url", &self.url())
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("body_len", &self.body.as_ref().map(Bytes::len))
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .field("queue_timeout", &self.queue_timeout)
            .field("allow_gzip", &self.allow_gzip)
            .field("request_id", &self.request_id)
            .field("agent", &self.agent)
            .finish_non_exhaustive()
    }
}

impl NormalizedOptions {
    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn protocol(&self) -> Protocol {
        self.target.protocol
    }

    pub fn host(&self) -> &str {
        &self.target.host
    }

    pub fn port(&self) -> u16 {
        self.target.port
    }

    /// Path with the merged query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Encoded body.
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn body_encoding(&self) -> &str {
        &self.body_encoding
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn max_retries(&self) -> u32 {
        self.retry.max_retries
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn queue_timeout(&self) -> Duration {
        self.queue_timeout
    }

    pub fn allow_gzip(&self) -> bool {
        self.allow_gzip
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn agent(&self) -> &AgentSelector {
        &self.agent
    }

    pub fn on_retry(&self) -> Option<&RetryHook> {
        self.on_retry.as_ref()
    }

    pub fn is_retry_allowed(&self) -> Option<&RetryPredicate> {
        self.is_retry_allowed.as_ref()
    }

    /// Run the status filter, the default one unless overridden.
    pub fn check_status(&self, status_code: u16) -> StatusVerdict {
        match &self.status_filter {
            Some(filter) => filter(status_code),
            None => default_status_filter(status_code),
        }
    }

    /// `protocol://host:port/path`
    pub fn url(&self) -> String {
        format!(
            "{}://{}{}",
            self.target.protocol.scheme(),
            self.target.authority(),
            self.path
        )
    }
}
