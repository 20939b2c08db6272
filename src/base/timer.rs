//! Named wall-clock spans for a request execution.

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Span covering a single attempt from socket assignment to its end.
pub const NETWORK: &str = "network";
/// Span covering the whole execution, retries and backoff included.
pub const EXECUTION: &str = "execution";

#[derive(Debug, Clone, Copy)]
enum Span {
    Running(Instant),
    Stopped(Duration),
}

#[derive(Debug, Default)]
pub struct Timings {
    spans: HashMap<&'static str, Span>,
}

impl Timings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `key`. Returns false if it is already running.
    pub fn start(&mut self, key: &'static str) -> bool {
        if self.is_running(key) {
            return false;
        }
        self.spans.insert(key, Span::Running(Instant::now()));
        true
    }

    /// Stop `key` and record its duration.
    ///
    /// Stopping an already stopped span keeps the first recorded value.
    pub fn stop(&mut self, key: &'static str) -> Option<Duration> {
        match self.spans.get(key).copied()? {
            Span::Running(started) => {
                let elapsed = started.elapsed();
                self.spans.insert(key, Span::Stopped(elapsed));
                Some(elapsed)
            }
            Span::Stopped(elapsed) => Some(elapsed),
        }
    }

    pub fn is_running(&self, key: &str) -> bool {
        matches!(self.spans.get(key), Some(Span::Running(_)))
    }

    /// Recorded duration of a stopped span.
    pub fn elapsed(&self, key: &str) -> Option<Duration> {
        match self.spans.get(key)? {
            Span::Stopped(elapsed) => Some(*elapsed),
            Span::Running(_) => None,
        }
    }

    pub fn reset(&mut self) {
        self.spans.clear();
    }

    pub fn snapshot(&self) -> Timers {
        Timers {
            network: self.elapsed(NETWORK),
            total: self.elapsed(EXECUTION),
        }
    }
}

/// Recorded spans exposed to callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timers {
    /// Last attempt, from socket assignment to completion.
    pub network: Option<Duration>,
    /// Whole execution.
    pub total: Option<Duration>,
}

impl Timers {
    /// `in <network>~<total> ms`, with missing spans rendered as 0.
    pub fn format_timestamp(&self) -> String {
        let millis = |d: Option<Duration>| d.map(|d| d.as_millis()).unwrap_or(0);
        format!("in {}~{} ms", millis(self.network), millis(self.total))
    }
}
