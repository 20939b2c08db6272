use crate::base::askererror::AskerError;
use crate::base::context::Diagnostics;
use crate::base::state::ExecutionState;
use crate::base::timer::{Timers, Timings};
use crate::http::retry::RetryDecision;
use crate::http::transaction::{Attempt, AttemptOutcome, Completed};
use crate::socket::pool::ConnectionManager;
use crate::socket::transport::Transport;
use crate::urlrequest::options::NormalizedOptions;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Execution bookkeeping readable while a job runs.
#[derive(Debug, Default)]
pub struct Progress {
    state: Mutex<ExecutionState>,
    retries: AtomicU32,
    timings: Mutex<Timings>,
}

impl Progress {
    pub fn state(&self) -> ExecutionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_state(&self, state: ExecutionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Move to `Running` unless already running.
    pub fn try_begin(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.is_running() {
            return false;
        }
        *state = ExecutionState::Running;
        true
    }

    pub fn retries_used(&self) -> u32 {
        self.retries.load(Ordering::SeqCst)
    }

    pub fn reset_retries(&self) {
        self.retries.store(0, Ordering::SeqCst);
    }

    pub fn timings(&self) -> MutexGuard<'_, Timings> {
        self.timings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn timers(&self) -> Timers {
        self.timings().snapshot()
    }

    /// Request id, formatted timings and URL for error messages.
    pub fn diagnostics(&self, options: &NormalizedOptions) -> Diagnostics {
        Diagnostics::new(
            options.request_id(),
            self.timers().format_timestamp(),
            options.url(),
        )
    }
}

/// Drives attempts until one completes or the retry policy gives up.
pub struct RequestJob {
    options: Arc<NormalizedOptions>,
    manager: Arc<dyn ConnectionManager>,
    transport: Arc<dyn Transport>,
    progress: Arc<Progress>,
}

impl RequestJob {
    pub fn new(
        options: Arc<NormalizedOptions>,
        manager: Arc<dyn ConnectionManager>,
        transport: Arc<dyn Transport>,
        progress: Arc<Progress>,
    ) -> Self {
        Self {
            options,
            manager,
            transport,
            progress,
        }
    }

    pub async fn run(&self) -> Result<Completed, AskerError> {
        loop {
            let attempt = Attempt::new(
                &self.options,
                self.manager.as_ref(),
                self.transport.as_ref(),
                &self.progress.timings,
            );

            let reason = match attempt.run().await {
                AttemptOutcome::Completed(completed) => return Ok(completed),
                AttemptOutcome::Failed {
                    reason,
                    retry: false,
                } => return Err(reason),
                AttemptOutcome::Failed { reason, retry: true } => reason,
            };

            let decision = self.options.retry_policy().decide(
                self.progress.retries_used(),
                reason,
                self.options.is_retry_allowed(),
            );

            match decision {
                RetryDecision::GiveUp(err) => return Err(err),
                RetryDecision::Retry {
                    retry_count,
                    delay,
                    reason,
                } => {
                    self.progress.retries.store(retry_count, Ordering::SeqCst);
                    self.progress.set_state(ExecutionState::Retrying);

                    let reason = reason.bind(&self.progress.diagnostics(&self.options));
                    debug!(
                        url = %self.options.url(),
                        request_id = self.options.request_id(),
                        retry_count,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "retrying request"
                    );
                    if let Some(on_retry) = self.options.on_retry() {
                        on_retry(&reason, retry_count);
                    }

                    tokio::time::sleep(delay).await;
                    self.progress.set_state(ExecutionState::Running);
                }
            }
        }
    }
}
