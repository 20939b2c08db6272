use crate::base::askererror::AskerError;
use crate::base::state::ExecutionState;
use crate::base::timer::{Timers, EXECUTION, NETWORK};
use crate::http::response::{Response, ResponseMeta, RetryStats};
use crate::http::transaction::Completed;
use crate::socket::registry::AgentRegistry;
use crate::socket::transport::{Transport, TransportError};
use crate::urlrequest::job::{Progress, RequestJob};
use crate::urlrequest::options::NormalizedOptions;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Receives the outcome of an execution.
pub type Callback = Box<dyn FnOnce(Result<Response, AskerError>) + Send + 'static>;

/// A request bound to its normalized options.
///
/// Cloning yields another handle to the same execution. `execute` spawns
/// one task on the current tokio runtime which owns every attempt until
/// the callback is delivered.
#[derive(Clone)]
pub struct Request {
    inner: Arc<Inner>,
}

struct Inner {
    options: Arc<NormalizedOptions>,
    registry: AgentRegistry,
    transport: Arc<dyn Transport>,
    progress: Arc<Progress>,
    callback: Mutex<Option<Callback>>,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("url", &self.url())
            .field("state", &self.state())
            .field("retries_used", &self.retries_used())
            .finish()
    }
}

impl Request {
    pub fn new(
        options: Arc<NormalizedOptions>,
        registry: AgentRegistry,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                options,
                registry,
                transport,
                progress: Arc::new(Progress::default()),
                callback: Mutex::new(None),
            }),
        }
    }

    /// Start executing. Returns false, and changes nothing, if the request
    /// is already running.
    pub fn execute<F>(&self, callback: F) -> bool
    where
        F: FnOnce(Result<Response, AskerError>) + Send + 'static,
    {
        self.start(Some(Box::new(callback)))
    }

    /// Start executing without a callback. A failure is only logged.
    pub fn execute_detached(&self) -> bool {
        self.start(None)
    }

    /// Execute and wait for the outcome.
    pub async fn send(&self) -> Result<Response, AskerError> {
        let (tx, rx) = oneshot::channel();
        let started = self.execute(move |result| {
            let _ = tx.send(result);
        });
        if !started {
            return Err(AskerError::RequestAlreadyRunning {
                context: self.diagnostics(),
            });
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(AskerError::client_request(TransportError::Closed).bind(&self.diagnostics())),
        }
    }

    fn start(&self, callback: Option<Callback>) -> bool {
        let inner = &self.inner;
        if !inner.progress.try_begin() {
            return false;
        }

        inner.progress.reset_retries();
        {
            let mut timings = inner.progress.timings();
            timings.reset();
            timings.start(EXECUTION);
        }
        *inner.callback.lock().unwrap_or_else(PoisonError::into_inner) = callback;

        let manager = inner
            .registry
            .resolve(inner.options.protocol(), inner.options.agent())
            .manager();
        let job = RequestJob::new(
            inner.options.clone(),
            manager,
            inner.transport.clone(),
            inner.progress.clone(),
        );

        debug!(
            url = %inner.options.url(),
            request_id = inner.options.request_id(),
            "executing request"
        );

        let request = self.clone();
        tokio::spawn(async move {
            let result = job.run().await;
            request.done(result);
        });
        true
    }

    /// Terminal transition: stop the spans, build the response or bind the
    /// error, and hand the outcome to the callback.
    fn done(&self, result: Result<Completed, AskerError>) {
        let inner = &self.inner;
        let time = {
            let mut timings = inner.progress.timings();
            timings.stop(NETWORK);
            timings.stop(EXECUTION);
            timings.snapshot()
        };

        let result = match result {
            Ok(completed) => Ok(Response::new(
                completed.status,
                completed.data,
                completed.headers,
                ResponseMeta {
                    time,
                    retries: RetryStats {
                        used: inner.progress.retries_used(),
                        limit: inner.options.max_retries(),
                    },
                    options: inner.options.clone(),
                },
            )),
            Err(err) => Err(err.bind(&self.diagnostics())),
        };

        let callback = inner
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        inner.progress.set_state(ExecutionState::Finished);

        debug!(
            url = %inner.options.url(),
            request_id = inner.options.request_id(),
            ok = result.is_ok(),
            time = %time.format_timestamp(),
            "request finished"
        );

        match callback {
            Some(callback) => callback(result),
            None => {
                if let Err(err) = result {
                    warn!(error = %err, "request without callback failed");
                }
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    pub fn state(&self) -> ExecutionState {
        self.inner.progress.state()
    }

    pub fn retries_used(&self) -> u32 {
        self.inner.progress.retries_used()
    }

    /// Recorded spans. A span still running reads as `None`.
    pub fn get_timers(&self) -> Timers {
        self.inner.progress.timers()
    }

    pub fn options(&self) -> &Arc<NormalizedOptions> {
        &self.inner.options
    }

    /// `protocol://host:port/path`
    pub fn url(&self) -> String {
        self.inner.options.url()
    }

    fn diagnostics(&self) -> crate::base::context::Diagnostics {
        self.inner.progress.diagnostics(&self.inner.options)
    }
}
