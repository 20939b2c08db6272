//! HTTP client with builder pattern.
//!
//! A [`Client`] bundles the agent registry, the transport and the body
//! encoders that requests are built against.
//!
//! # Example
//!
//! ```rust,ignore
//! use asker::{Client, RequestOptions};
//!
//! let client = Client::builder().build();
//!
//! let resp = client
//!     .get("example.com/api")
//!     .query("page", "2")
//!     .max_retries(2)
//!     .send()
//!     .await?;
//! ```

use crate::base::askererror::AskerError;
use crate::http::encoders::{BodyEncoder, BodyEncoders};
use crate::http::requestbody::RequestBody;
use crate::http::response::Response;
use crate::socket::connectjob::HttpTransport;
use crate::socket::pool::{Agent, AgentOptions};
use crate::socket::registry::{AgentRegistry, AgentSelector};
use crate::socket::tls::TlsConfig;
use crate::socket::transport::{Protocol, Transport};
use crate::urlrequest::options::RequestOptions;
use crate::urlrequest::request::Request;
use http::Method;
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

static DEFAULT_CLIENT: Lazy<Client> = Lazy::new(Client::new);

/// Builds and executes requests.
///
/// Use [`Client::builder()`] to configure and create a client. Clones share
/// the registry, transport and encoders.
#[derive(Clone)]
pub struct Client {
    registry: AgentRegistry,
    transport: Arc<dyn Transport>,
    encoders: Arc<BodyEncoders>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("registry", &self.registry)
            .field("encoders", &self.encoders)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Client on the process-wide agent registry with the default transport.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Process default client used by [`crate::ask`] and [`crate::fetch`].
    pub fn global() -> &'static Client {
        &DEFAULT_CLIENT
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn encoders(&self) -> &BodyEncoders {
        &self.encoders
    }

    /// Register a named agent, failing if the name is taken.
    pub fn create_agent(
        &self,
        protocol: Protocol,
        options: AgentOptions,
    ) -> Result<Arc<Agent>, AskerError> {
        self.registry.create_agent(protocol, options)
    }

    /// Normalize `options` into a request ready to execute.
    pub fn request(&self, options: RequestOptions) -> Result<Request, AskerError> {
        let options = options.normalize(&self.encoders)?;
        Ok(Request::new(
            Arc::new(options),
            self.registry.clone(),
            self.transport.clone(),
        ))
    }

    /// Build and execute in one go. An options error goes straight to the
    /// callback and no request is returned.
    pub fn ask<F>(&self, options: RequestOptions, callback: F) -> Option<Request>
    where
        F: FnOnce(Result<Response, AskerError>) + Send + 'static,
    {
        match self.request(options) {
            Ok(request) => {
                request.execute(callback);
                Some(request)
            }
            Err(err) => {
                callback(Err(err));
                None
            }
        }
    }

    /// Build, execute and wait for the outcome.
    pub async fn fetch(&self, options: RequestOptions) -> Result<Response, AskerError> {
        self.request(options)?.send().await
    }

    /// Start building a GET request.
    pub fn get<U: Into<String>>(&self, url: U) -> RequestBuilder {
        self.method(Method::GET, url)
    }

    /// Start building a POST request.
    pub fn post<U: Into<String>>(&self, url: U) -> RequestBuilder {
        self.method(Method::POST, url)
    }

    /// Start building a PUT request.
    pub fn put<U: Into<String>>(&self, url: U) -> RequestBuilder {
        self.method(Method::PUT, url)
    }

    /// Start building a DELETE request.
    pub fn delete<U: Into<String>>(&self, url: U) -> RequestBuilder {
        self.method(Method::DELETE, url)
    }

    /// Start building a request with custom method.
    pub fn method<U: Into<String>>(&self, method: Method, url: U) -> RequestBuilder {
        RequestBuilder {
            client: self.clone(),
            options: RequestOptions::builder().method(method).url(url),
        }
    }
}

/// Builder for creating a [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    registry: Option<AgentRegistry>,
    transport: Option<Arc<dyn Transport>>,
    tls: Option<TlsConfig>,
    encoders: Option<BodyEncoders>,
}

impl ClientBuilder {
    /// Use a private agent registry instead of the process-wide one.
    pub fn registry(mut self, registry: AgentRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Replace the hyper transport.
    pub fn transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// TLS settings of the default transport.
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn encoders(mut self, encoders: BodyEncoders) -> Self {
        self.encoders = Some(encoders);
        self
    }

    /// Register a body encoder on top of the defaults.
    pub fn encoder<E: BodyEncoder + 'static>(mut self, name: impl Into<String>, encoder: E) -> Self {
        self.encoders
            .get_or_insert_with(BodyEncoders::default)
            .register(name, encoder);
        self
    }

    pub fn build(self) -> Client {
        let tls = self.tls.unwrap_or_default();
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(HttpTransport::new(tls)));

        Client {
            registry: self
                .registry
                .unwrap_or_else(|| AgentRegistry::global().clone()),
            transport,
            encoders: Arc::new(self.encoders.unwrap_or_default()),
        }
    }
}

/// Builder for a single request.
pub struct RequestBuilder {
    client: Client,
    options: RequestOptions,
}

impl RequestBuilder {
    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options = self.options.header(name, value);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options = self.options.query(key, value);
        self
    }

    /// Set request body.
    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.options = self.options.body(body);
        self
    }

    /// Set JSON body.
    #[cfg(feature = "json")]
    pub fn json<T: serde::Serialize + ?Sized>(mut self, value: &T) -> Result<Self, serde_json::Error> {
        self.options = self.options.json(value)?;
        Ok(self)
    }

    pub fn body_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.options = self.options.body_encoding(encoding);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.options = self.options.max_retries(max_retries);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.timeout(timeout);
        self
    }

    pub fn agent(mut self, agent: impl Into<AgentSelector>) -> Self {
        self.options = self.options.agent(agent);
        self
    }

    /// Adjust any other option.
    pub fn with_options<F>(mut self, f: F) -> Self
    where
        F: FnOnce(RequestOptions) -> RequestOptions,
    {
        self.options = f(self.options);
        self
    }

    pub fn build(self) -> Result<Request, AskerError> {
        self.client.request(self.options)
    }

    /// Send the request.
    pub async fn send(self) -> Result<Response, AskerError> {
        self.build()?.send().await
    }
}
