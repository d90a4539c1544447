//! Per-operation options: timeout, cancellation and lock hints
//!
//! Every blocking store or index operation takes an [`OpOptions`]. There is
//! no process-wide default timeout; the default comes from the database
//! configuration and is threaded into each collection when it is opened.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cooperative cancellation signal shared between a caller and its operations
///
/// Cloning shares the underlying flag. Once cancelled, a token stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that has not been cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation to every holder of this token
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether `cancel` has been called
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Fail with [`Error::Cancelled`] if cancelled
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Timeout and cancellation for one logical operation
#[derive(Debug, Clone)]
pub struct OpOptions {
    /// Upper bound on time spent waiting for locks
    pub timeout: Duration,
    /// Cancellation signal checked before each store access
    pub cancel: CancellationToken,
}

impl OpOptions {
    /// Options with the given timeout and a fresh, never-fired token
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Replace the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fail if the operation has been cancelled
    pub fn check(&self) -> Result<()> {
        self.cancel.check()
    }

    /// Start the clock for `operation`
    pub fn deadline(&self, operation: &'static str) -> Deadline {
        Deadline {
            operation,
            timeout: self.timeout,
            started: Instant::now(),
        }
    }
}

/// A started timeout for one operation
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    operation: &'static str,
    timeout: Duration,
    started: Instant,
}

impl Deadline {
    /// Time left before expiry, or [`Error::Timeout`] once expired
    pub fn remaining(&self) -> Result<Duration> {
        let elapsed = self.started.elapsed();
        if elapsed >= self.timeout {
            return Err(self.expired());
        }
        Ok(self.timeout - elapsed)
    }

    /// The timeout error for this deadline
    pub fn expired(&self) -> Error {
        Error::Timeout {
            operation: self.operation,
            timeout: self.timeout,
        }
    }
}

/// Lock hint for point reads and scans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockMode {
    /// Read-committed read; not validated at commit
    #[default]
    Default,
    /// Update-intent read; validated at commit so concurrent writers of the
    /// same key cannot both commit
    Update,
}

/// Requested ordering of an enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumerationMode {
    /// No ordering promise
    #[default]
    Unordered,
    /// Ascending key order
    Ordered,
}

/// Whether a range endpoint is part of the range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeBound {
    /// Endpoint included
    Inclusive,
    /// Endpoint excluded
    Exclusive,
}

impl RangeBound {
    /// `std::ops::Bound` for `value` under this bound type
    pub fn to_bound<T>(self, value: T) -> std::ops::Bound<T> {
        match self {
            RangeBound::Inclusive => std::ops::Bound::Included(value),
            RangeBound::Exclusive => std::ops::Bound::Excluded(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::Bound;

    #[test]
    fn test_cancellation_shared_between_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());

        clone.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_options_check_uses_token() {
        let token = CancellationToken::new();
        let opts = OpOptions::new(Duration::from_secs(1)).with_cancellation(token.clone());
        assert!(opts.check().is_ok());
        token.cancel();
        assert!(opts.check().is_err());
    }

    #[test]
    fn test_deadline_expires() {
        let opts = OpOptions::new(Duration::ZERO);
        let deadline = opts.deadline("get");
        match deadline.remaining() {
            Err(Error::Timeout { operation, .. }) => assert_eq!(operation, "get"),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_deadline_remaining_is_bounded() {
        let opts = OpOptions::new(Duration::from_secs(30));
        let remaining = opts.deadline("scan").remaining().unwrap();
        assert!(remaining <= Duration::from_secs(30));
    }

    #[test]
    fn test_range_bound_conversion() {
        assert_eq!(RangeBound::Inclusive.to_bound(3), Bound::Included(3));
        assert_eq!(RangeBound::Exclusive.to_bound(3), Bound::Excluded(3));
    }

    #[test]
    fn test_defaults() {
        assert_eq!(LockMode::default(), LockMode::Default);
        assert_eq!(EnumerationMode::default(), EnumerationMode::Unordered);
    }
}
