//! Pool error types.

use std::time::Duration;

use thiserror::Error;

/// Boxed error produced by a [`ConnectionLifecycle`](crate::ConnectionLifecycle).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by pool operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// The connection factory failed.
    ///
    /// The admission slot reserved for the new connection has already been
    /// released when this error is returned.
    #[error("failed to create connection: {0}")]
    Creation(#[source] BoxError),

    /// No connection became available before the deadline.
    #[error("timed out after {0:?} waiting for a connection")]
    Timeout(Duration),

    /// The pool has been closed.
    #[error("pool is closed")]
    PoolClosed,

    /// The pool configuration is invalid.
    #[error("invalid pool configuration: {0}")]
    Config(String),
}

impl PoolError {
    /// Whether retrying the same operation later could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Creation(_))
    }
}
