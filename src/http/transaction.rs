//! One dispatch of a request over a pooled socket.
//!
//! An [`Attempt`] waits for a socket slot under the queue timeout, then
//! connects, sends and reads the response body under the socket timeout.
//! Both timers are futures owned by the attempt, so nothing outlives it.

use crate::base::askererror::AskerError;
use crate::base::timer::{Timings, NETWORK};
use crate::http::responsebody::{self, BodyAccumulator};
use crate::socket::pool::{ConnectionManager, Socket};
use crate::socket::transport::{Transport, TransportError};
use crate::urlrequest::options::NormalizedOptions;
use bytes::Bytes;
use futures::TryStreamExt;
use http::header::HOST;
use http::{HeaderMap, StatusCode};
use std::sync::{Mutex, PoisonError};
use tokio::time::{self, Instant};
use tracing::debug;

/// Internal state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    AwaitSocket,
    Connect,
    ReadBody,
    Rejected,
    Done,
}

/// Accepted response with its body read to the end.
#[derive(Debug)]
pub struct Completed {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub data: Option<Bytes>,
}

#[derive(Debug)]
pub enum AttemptOutcome {
    Completed(Completed),
    /// The attempt was rejected. `retry` tells whether the reason may be
    /// handed to the retry policy or ends the request as is.
    Failed { reason: AskerError, retry: bool },
}

/// Why an exchange stopped before an accepted response was read.
enum Failure {
    Transport(TransportError),
    Status { status_code: u16, retry_allowed: bool },
}

impl From<TransportError> for Failure {
    fn from(err: TransportError) -> Self {
        Failure::Transport(err)
    }
}

pub struct Attempt<'a> {
    options: &'a NormalizedOptions,
    manager: &'a dyn ConnectionManager,
    transport: &'a dyn Transport,
    timings: &'a Mutex<Timings>,
    state: State,
}

impl<'a> Attempt<'a> {
    pub fn new(
        options: &'a NormalizedOptions,
        manager: &'a dyn ConnectionManager,
        transport: &'a dyn Transport,
        timings: &'a Mutex<Timings>,
    ) -> Self {
        Self {
            options,
            manager,
            transport,
            timings,
            state: State::Idle,
        }
    }

    pub async fn run(mut self) -> AttemptOutcome {
        let target = self.options.target();

        self.state = State::AwaitSocket;
        let assigned = time::timeout(self.options.queue_timeout(), self.manager.assign(target)).await;
        let mut socket = match assigned {
            Ok(Ok(socket)) => socket,
            Ok(Err(err)) => return self.reject(AskerError::client_request(err), true),
            Err(_) => {
                self.manager.abandon(target);
                return self.reject(AskerError::queue_timeout(), true);
            }
        };

        self.state = State::Connect;
        self.timings().start(NETWORK);
        let deadline = Instant::now() + self.options.timeout();
        let exchanged = time::timeout_at(deadline, self.exchange(&mut socket)).await;
        self.timings().stop(NETWORK);

        let (status, headers, data) = match exchanged {
            Ok(Ok(response)) => response,
            Ok(Err(Failure::Transport(err))) => {
                self.manager.release(socket, false);
                return self.reject(AskerError::client_request(err), true);
            }
            Ok(Err(Failure::Status {
                status_code,
                retry_allowed,
            })) => {
                self.manager.release(socket, false);
                return self.reject(AskerError::unexpected_status(status_code), retry_allowed);
            }
            Err(_) => {
                self.manager.release(socket, false);
                return self.reject(AskerError::socket_timeout(), true);
            }
        };

        self.manager.release(socket, true);
        self.state = State::Done;

        match responsebody::decode(data, &headers, self.options.allow_gzip()) {
            Ok(data) => AttemptOutcome::Completed(Completed {
                status,
                headers,
                data,
            }),
            Err(err) => AttemptOutcome::Failed {
                reason: AskerError::gunzip(err),
                retry: false,
            },
        }
    }

    /// Connect if needed, send the request and read an accepted response.
    ///
    /// A rejected status returns before the body is read; dropping the body
    /// stream aborts the exchange.
    async fn exchange(
        &mut self,
        socket: &mut Socket,
    ) -> Result<(StatusCode, HeaderMap, Option<Bytes>), Failure> {
        let request = build_request(self.options)?;
        let reused = socket.is_connected();
        let connection = socket.connect(self.transport).await?;
        debug!(
            target = %self.options.target().authority(),
            reused,
            method = %self.options.method(),
            path = self.options.path(),
            "sending request"
        );
        let response = connection.send(request).await?;

        let verdict = self.options.check_status(response.status.as_u16());
        if !verdict.accept {
            return Err(Failure::Status {
                status_code: response.status.as_u16(),
                retry_allowed: verdict.retry_allowed,
            });
        }

        self.state = State::ReadBody;
        let mut body = response.body;
        let mut accumulator = BodyAccumulator::new();
        while let Some(chunk) = body.try_next().await? {
            accumulator.push(chunk);
        }

        Ok((response.status, response.headers, accumulator.finish()))
    }

    fn reject(&mut self, reason: AskerError, retry: bool) -> AttemptOutcome {
        debug!(
            state = ?self.state,
            code = %reason.code(),
            retry,
            "attempt rejected"
        );
        self.state = State::Rejected;
        AttemptOutcome::Failed { reason, retry }
    }

    fn timings(&self) -> std::sync::MutexGuard<'a, Timings> {
        self.timings.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Request with the normalized headers and body. The `host` header is
/// derived from the target unless the caller set one.
fn build_request(options: &NormalizedOptions) -> Result<http::Request<Bytes>, TransportError> {
    let mut builder = http::Request::builder()
        .method(options.method().clone())
        .uri(options.path());

    if let Some(headers) = builder.headers_mut() {
        headers.extend(options.headers().clone());
    }
    if !options.headers().contains_key(HOST) {
        builder = builder.header(HOST, options.target().host_header());
    }

    Ok(builder.body(options.body().cloned().unwrap_or_default())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::askererror::ErrorCode;
    use crate::http::encoders::BodyEncoders;
    use crate::socket::pool::{Agent, AgentOptions, Unpooled};
    use crate::socket::transport::{BodyStream, Connection, IncomingResponse, Target};
    use crate::urlrequest::options::RequestOptions;
    use futures::future::BoxFuture;
    use futures::stream::{self, StreamExt};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Transport answering every request with a canned response.
    struct Canned {
        status: u16,
        chunks: Vec<&'static str>,
        delay: Duration,
        connects: AtomicUsize,
    }

    impl Canned {
        fn new(status: u16, chunks: Vec<&'static str>) -> Self {
            Self {
                status,
                chunks,
                delay: Duration::ZERO,
                connects: AtomicUsize::new(0),
            }
        }
    }

    struct CannedConnection {
        status: u16,
        chunks: Vec<&'static str>,
        delay: Duration,
    }

    impl Connection for CannedConnection {
        fn send(
            &mut self,
            request: http::Request<Bytes>,
        ) -> BoxFuture<'_, Result<IncomingResponse, TransportError>> {
            Box::pin(async move {
                assert!(request.headers().contains_key(HOST));
                tokio::time::sleep(self.delay).await;
                let chunks: Vec<Result<Bytes, TransportError>> = self
                    .chunks
                    .iter()
                    .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                    .collect();
                let body: BodyStream = stream::iter(chunks).boxed();
                Ok(IncomingResponse {
                    status: StatusCode::from_u16(self.status).unwrap(),
                    headers: HeaderMap::new(),
                    body,
                })
            })
        }

        fn is_reusable(&self) -> bool {
            true
        }
    }

    impl Transport for Canned {
        fn connect(
            &self,
            _target: &Target,
        ) -> BoxFuture<'static, Result<Box<dyn Connection>, TransportError>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let connection = CannedConnection {
                status: self.status,
                chunks: self.chunks.clone(),
                delay: self.delay,
            };
            Box::pin(async move { Ok(Box::new(connection) as Box<dyn Connection>) })
        }
    }

    fn options(builder: RequestOptions) -> NormalizedOptions {
        builder.normalize(&BodyEncoders::default()).unwrap()
    }

    #[tokio::test]
    async fn test_completed_body_concatenated() {
        let options = options(RequestOptions::builder().url("example.com"));
        let transport = Canned::new(200, vec!["hel", "", "lo"]);
        let timings = Mutex::new(Timings::new());

        let outcome = Attempt::new(&options, &Unpooled, &transport, &timings)
            .run()
            .await;
        match outcome {
            AttemptOutcome::Completed(done) => {
                assert_eq!(done.status, StatusCode::OK);
                assert_eq!(done.data.unwrap().as_ref(), b"hello");
            }
            other => panic!("expected completion, got {other:?}"),
        }
        assert!(timings.lock().unwrap().elapsed(NETWORK).is_some());
    }

    #[tokio::test]
    async fn test_empty_body_is_none() {
        let options = options(RequestOptions::builder());
        let transport = Canned::new(201, vec![]);
        let timings = Mutex::new(Timings::new());

        match Attempt::new(&options, &Unpooled, &transport, &timings).run().await {
            AttemptOutcome::Completed(done) => assert!(done.data.is_none()),
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejected_status() {
        let options = options(RequestOptions::builder());
        let timings = Mutex::new(Timings::new());

        let transport = Canned::new(500, vec!["oops"]);
        match Attempt::new(&options, &Unpooled, &transport, &timings).run().await {
            AttemptOutcome::Failed { reason, retry } => {
                assert_eq!(reason.status_code(), Some(500));
                assert!(retry);
            }
            other => panic!("expected failure, got {other:?}"),
        }

        let transport = Canned::new(404, vec![]);
        match Attempt::new(&options, &Unpooled, &transport, &timings).run().await {
            AttemptOutcome::Failed { reason, retry } => {
                assert_eq!(reason.code(), ErrorCode::UnexpectedStatusCode);
                assert!(!retry);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_socket_timeout() {
        let options = options(RequestOptions::builder().timeout(Duration::from_millis(100)));
        let mut transport = Canned::new(200, vec!["late"]);
        transport.delay = Duration::from_millis(150);
        let agent = Agent::default();
        let timings = Mutex::new(Timings::new());

        match Attempt::new(&options, &agent, &transport, &timings).run().await {
            AttemptOutcome::Failed { reason, retry } => {
                assert_eq!(reason.code(), ErrorCode::SocketTimeout);
                assert!(retry);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(agent.active_count(), 0);
        assert_eq!(agent.idle_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_timeout_abandons_wait() {
        let options = options(
            RequestOptions::builder()
                .timeout(Duration::from_millis(100))
                .queue_timeout(Duration::from_millis(30)),
        );
        let transport = Canned::new(200, vec![]);
        let agent = Agent::new(AgentOptions::default().with_max_sockets(1));
        let held = agent.assign(options.target()).await.unwrap();
        let timings = Mutex::new(Timings::new());

        match Attempt::new(&options, &agent, &transport, &timings).run().await {
            AttemptOutcome::Failed { reason, retry } => {
                assert_eq!(reason.code(), ErrorCode::QueueTimeout);
                assert!(retry);
            }
            other => panic!("expected queue timeout, got {other:?}"),
        }
        assert_eq!(agent.pending_count(), 0);
        assert_eq!(transport.connects.load(Ordering::SeqCst), 0);
        assert!(timings.lock().unwrap().elapsed(NETWORK).is_none());

        agent.release(held, false);
        assert!(agent.is_idle());
    }

    #[tokio::test]
    async fn test_pooled_connection_reused() {
        let options = options(RequestOptions::builder());
        let transport = Canned::new(200, vec!["ok"]);
        let agent = Agent::default();
        let timings = Mutex::new(Timings::new());

        for _ in 0..3 {
            let outcome = Attempt::new(&options, &agent, &transport, &timings).run().await;
            assert!(matches!(outcome, AttemptOutcome::Completed(_)));
        }
        assert_eq!(transport.connects.load(Ordering::SeqCst), 1);
        assert_eq!(agent.idle_count(), 1);
    }

    #[test]
    fn test_build_request_host_header() {
        let options = options(
            RequestOptions::builder()
                .url("example.com:8080/a?b=c")
                .method("put")
                .body("payload"),
        );
        let request = build_request(&options).unwrap();
        assert_eq!(request.method(), http::Method::PUT);
        assert_eq!(request.uri(), "/a?b=c");
        assert_eq!(request.headers()[HOST], "example.com:8080");
        assert_eq!(request.body().as_ref(), b"payload");

        let options = options_with_host();
        let request = build_request(&options).unwrap();
        assert_eq!(request.headers()[HOST], "virtual.test");
    }

    fn options_with_host() -> NormalizedOptions {
        options(RequestOptions::builder().header("Host", "virtual.test"))
    }
}
