//! Retry policy with exponential backoff.
//!
//! A response status is judged by a [`StatusFilter`], which decides both
//! whether the response is accepted and whether a rejection may be
//! retried. Transport failures and timeouts are always retry-eligible
//! unless a [`RetryPredicate`] vetoes them.

use crate::base::askererror::AskerError;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a status filter for one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusVerdict {
    /// The response completes the request successfully.
    pub accept: bool,
    /// A rejected response may be retried.
    pub retry_allowed: bool,
}

pub type StatusFilter = Arc<dyn Fn(u16) -> StatusVerdict + Send + Sync>;

/// Called before each retry with the failure reason and the retry count.
pub type RetryHook = Arc<dyn Fn(&AskerError, u32) + Send + Sync>;

/// Final veto on a retry-eligible failure. Returning false ends the
/// request with the reason itself.
pub type RetryPredicate = Arc<dyn Fn(&AskerError) -> bool + Send + Sync>;

/// Accepts 200 and 201. Client errors (4xx) are final.
pub fn default_status_filter(status_code: u16) -> StatusVerdict {
    StatusVerdict {
        accept: status_code == 200 || status_code == 201,
        retry_allowed: !(400..=499).contains(&status_code),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub min_timeout: Duration,
    /// Cap on the backoff. `None` leaves it unbounded.
    pub max_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            min_timeout: Duration::from_millis(300),
            max_timeout: None,
        }
    }
}

/// What the job does with a retry-eligible failure.
#[derive(Debug)]
pub enum RetryDecision {
    Retry {
        retry_count: u32,
        delay: Duration,
        reason: AskerError,
    },
    GiveUp(AskerError),
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self::default()
    }

    /// Backoff before retry number `retry_count` (1-based).
    ///
    /// `min_timeout * 2^(retry_count - 1)`, capped at `max_timeout`.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        if retry_count == 0 {
            return Duration::ZERO;
        }

        let factor = 1u32 << (retry_count - 1).min(31);
        let delay = self.min_timeout.saturating_mul(factor);
        match self.max_timeout {
            Some(max) => delay.min(max),
            None => delay,
        }
    }

    pub fn should_retry(&self, retries_used: u32) -> bool {
        retries_used < self.max_retries
    }

    /// Decide on a retry-eligible failure after `retries_used` retries.
    ///
    /// A vetoed reason is returned as is. An exhausted budget wraps the
    /// reason in `RETRIES_LIMIT_EXCEEDED`, except when no retries were
    /// configured at all.
    pub fn decide(
        &self,
        retries_used: u32,
        reason: AskerError,
        is_retry_allowed: Option<&RetryPredicate>,
    ) -> RetryDecision {
        if let Some(allowed) = is_retry_allowed {
            if !allowed(&reason) {
                return RetryDecision::GiveUp(reason);
            }
        }

        if !self.should_retry(retries_used) {
            if self.max_retries == 0 {
                return RetryDecision::GiveUp(reason);
            }
            return RetryDecision::GiveUp(AskerError::retries_limit_exceeded(
                self.max_retries,
                reason,
            ));
        }

        let retry_count = retries_used + 1;
        RetryDecision::Retry {
            retry_count,
            delay: self.backoff(retry_count),
            reason,
        }
    }
}
