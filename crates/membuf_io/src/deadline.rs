// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{Level, event};

use crate::{Result, StreamError};

/// Tracks how long a transfer has gone without progress.
///
/// The deadline is pushed back every time progress is recorded. Callers that make no progress
/// call [`stalled()`][Self::stalled] before trying again; it fails once the timeout has
/// elapsed since the last progress and otherwise yields the thread.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use membuf_io::{ProgressDeadline, StreamError};
///
/// let mut deadline = ProgressDeadline::new(Duration::ZERO);
///
/// assert!(matches!(deadline.stalled(), Err(StreamError::Timeout { .. })));
/// ```
#[derive(Debug)]
pub struct ProgressDeadline {
    timeout: Duration,
    last_progress: Instant,
}

impl ProgressDeadline {
    /// Starts tracking with the timer running from now.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_progress: Instant::now(),
        }
    }

    /// Records that `transferred` bytes were moved, restarting the timer if any were.
    pub fn progress(&mut self, transferred: usize) {
        if transferred > 0 {
            self.last_progress = Instant::now();
        }
    }

    /// Time since the last recorded progress.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.last_progress.elapsed()
    }

    /// Reports an attempt that moved nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Timeout`] once the timeout has elapsed since the last progress.
    pub fn stalled(&mut self) -> Result<()> {
        let elapsed = self.elapsed();

        if elapsed >= self.timeout {
            event!(
                Level::DEBUG,
                message = "stream transfer timed out",
                elapsed_ms = elapsed.as_millis(),
                timeout_ms = self.timeout.as_millis()
            );

            return Err(StreamError::Timeout { elapsed });
        }

        thread::yield_now();
        Ok(())
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;

    #[test]
    #[traced_test]
    fn zero_timeout_fails_on_first_stall() {
        let mut deadline = ProgressDeadline::new(Duration::ZERO);

        assert!(matches!(deadline.stalled(), Err(StreamError::Timeout { .. })));
        assert!(logs_contain("stream transfer timed out"));
    }

    #[test]
    fn stall_within_timeout_is_tolerated() {
        let mut deadline = ProgressDeadline::new(Duration::from_secs(3600));

        for _ in 0..10 {
            deadline.stalled().unwrap();
        }
    }

    #[test]
    fn progress_restarts_the_timer() {
        let timeout = Duration::from_millis(200);
        let mut deadline = ProgressDeadline::new(timeout);

        thread::sleep(timeout);
        deadline.progress(1);

        assert!(deadline.elapsed() < timeout);
        deadline.stalled().unwrap();
    }

    #[test]
    fn zero_progress_does_not_restart_the_timer() {
        let timeout = Duration::from_millis(10);
        let mut deadline = ProgressDeadline::new(timeout);

        thread::sleep(timeout);
        deadline.progress(0);

        match deadline.stalled() {
            Err(StreamError::Timeout { elapsed }) => assert!(elapsed >= timeout),
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
