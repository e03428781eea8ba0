//! Client-side operation timeouts.
//!
//! A `TimeoutContext` is created once per top-level operation and borrowed by every network
//! step that operation performs: connection checkout, command sends, cursor iteration, and
//! cleanup. Once its budget is exhausted no further network attempt is made under it.
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// The remaining time budget of a single top-level operation.
#[derive(Clone, Debug)]
pub struct TimeoutContext {
    created_at: Instant,
    // The configured timeoutMS this context was resolved from.
    timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl TimeoutContext {
    /// Creates a context with the given overall timeout. `None` or a zero duration
    /// disables client-side timeouts for the operation.
    pub fn new(timeout: Option<Duration>) -> TimeoutContext {
        let created_at = Instant::now();
        let timeout = timeout.filter(|t| !t.is_zero());

        TimeoutContext {
            created_at,
            timeout,
            deadline: timeout.map(|t| created_at + t),
        }
    }

    /// Resolves an operation-level timeout against the client default. The operation-level
    /// value always wins, including an explicit zero which disables the timeout.
    pub fn resolve(
        operation: Option<Duration>,
        client_default: Option<Duration>,
    ) -> TimeoutContext {
        TimeoutContext::new(operation.or(client_default))
    }

    /// A context with no deadline.
    pub fn unbounded() -> TimeoutContext {
        TimeoutContext::new(None)
    }

    pub fn is_enabled(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// The remaining budget; `None` when unbounded and `Some(Duration::ZERO)` once expired.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().map_or(false, |r| r.is_zero())
    }

    /// Fails with an operation timeout if the budget is exhausted.
    pub fn check(&self, what: &str) -> Result<()> {
        if self.is_expired() {
            Err(Error::timeout(what))
        } else {
            Ok(())
        }
    }

    /// The smaller of the remaining budget and `other`. `None` means no bound at all.
    pub fn bounded(&self, other: Option<Duration>) -> Option<Duration> {
        match (self.remaining(), other) {
            (Some(r), Some(o)) => Some(r.min(o)),
            (Some(r), None) => Some(r),
            (None, o) => o,
        }
    }

    /// The execution time limit to advertise to the server for one command.
    pub fn ceiling_for_command(&self, override_limit: Option<Duration>) -> Option<Duration> {
        self.bounded(override_limit)
    }

    /// The `maxTimeMS` value to attach to an outgoing command, if any.
    pub fn max_time_ms(&self, override_limit: Option<Duration>) -> Option<i64> {
        self.ceiling_for_command(override_limit).map(|ceiling| {
            let ms = ceiling.as_millis() as i64;
            // A sub-millisecond remainder must not become maxTimeMS: 0, which means "no limit".
            if ms == 0 {
                1
            } else {
                ms
            }
        })
    }

    /// An independent context with deadline `now + max(remaining, minimum)`, used only for
    /// best-effort cleanup after the primary deadline may already have passed.
    pub fn refresh(&self, minimum: Duration) -> TimeoutContext {
        match self.remaining() {
            Some(remaining) => {
                let budget = remaining.max(minimum);
                let now = Instant::now();
                TimeoutContext {
                    created_at: now,
                    timeout: Some(budget),
                    deadline: Some(now + budget),
                }
            }
            None => TimeoutContext::unbounded(),
        }
    }

    /// Refreshes using the originally configured timeout as the minimum cleanup window.
    pub fn refresh_for_cleanup(&self) -> TimeoutContext {
        self.refresh(self.timeout.unwrap_or_default())
    }
}
