//! Connection lifecycle management.
//!
//! This module defines the seam between the pool and the broker client:
//! the [`ConnectionLifecycle`] trait creates, probes and closes raw
//! connections, while [`ConnectionMetadata`] and [`LifecyclePolicy`] hold
//! the bookkeeping the pool uses to decide when a connection must be
//! replaced.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

/// Creates, probes and closes the raw connections held by a pool.
///
/// The pool never talks to the broker itself; every transport operation
/// goes through this trait.
///
/// # Example
///
/// ```rust,ignore
/// struct AmqpLifecycle { params: ConnectionParams }
///
/// #[async_trait]
/// impl ConnectionLifecycle for AmqpLifecycle {
///     type Connection = amqp::Connection;
///     type Error = amqp::Error;
///
///     async fn connect(&self) -> Result<Self::Connection, Self::Error> {
///         amqp::Connection::open(&self.params).await
///     }
///
///     fn close(&self, conn: Self::Connection) -> Result<(), Self::Error> {
///         conn.shutdown()
///     }
/// }
/// ```
#[async_trait]
pub trait ConnectionLifecycle: Send + Sync + 'static {
    /// The raw connection type.
    type Connection: Send + 'static;

    /// Error returned by [`connect`](Self::connect) and [`close`](Self::close).
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a new connection.
    ///
    /// Only called after the pool has admitted a new connection.
    async fn connect(&self) -> Result<Self::Connection, Self::Error>;

    /// Close a connection.
    ///
    /// Called exactly once per connection. Implementations must not fail
    /// just because the transport is already broken; any error returned
    /// is logged and otherwise ignored.
    fn close(&self, conn: Self::Connection) -> Result<(), Self::Error>;

    /// Check whether a connection is still usable.
    ///
    /// Only called when [`PoolConfig::probe_on_acquire`] is enabled.
    ///
    /// [`PoolConfig::probe_on_acquire`]: crate::PoolConfig::probe_on_acquire
    async fn is_alive(&self, _conn: &mut Self::Connection) -> bool {
        true
    }
}

/// A [`ConnectionLifecycle`] built from a connect closure and a close closure.
///
/// Created by [`from_fn`].
pub struct FnLifecycle<C, D> {
    connect: C,
    close: D,
}

/// Build a lifecycle from plain closures.
///
/// ```rust,ignore
/// let lifecycle = broker_pool::lifecycle::from_fn(
///     move || amqp::Connection::open(params.clone()),
///     |conn: amqp::Connection| conn.shutdown(),
/// );
/// let pool = Pool::builder(lifecycle).base_size(4).build()?;
/// ```
pub fn from_fn<C, D>(connect: C, close: D) -> FnLifecycle<C, D> {
    FnLifecycle { connect, close }
}

impl<C, D> fmt::Debug for FnLifecycle<C, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnLifecycle").finish_non_exhaustive()
    }
}

#[async_trait]
impl<C, D, Fut, T, E> ConnectionLifecycle for FnLifecycle<C, D>
where
    C: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    D: Fn(T) -> Result<(), E> + Send + Sync + 'static,
    T: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    type Connection = T;
    type Error = E;

    async fn connect(&self) -> Result<T, E> {
        (self.connect)().await
    }

    fn close(&self, conn: T) -> Result<(), E> {
        (self.close)(conn)
    }
}

/// How a connection was admitted into the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    /// Long-lived connection, returned to the idle store on release.
    Base,
    /// Burst connection, closed on release.
    Overflow,
}

impl ConnectionKind {
    /// Get the kind name as a static string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Overflow => "overflow",
        }
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bookkeeping attached to every pooled connection.
#[derive(Debug, Clone)]
pub struct ConnectionMetadata {
    id: u64,
    kind: ConnectionKind,
    created_at: Instant,
    last_used_at: Instant,
    valid: bool,
}

impl ConnectionMetadata {
    pub(crate) fn new(id: u64, kind: ConnectionKind, now: Instant) -> Self {
        Self {
            id,
            kind,
            created_at: now,
            last_used_at: now,
            valid: true,
        }
    }

    /// Pool-unique connection ID.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether this is a base or overflow connection.
    #[must_use]
    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    /// When the connection was created.
    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// When the connection was last released back to the pool.
    #[must_use]
    pub fn last_used_at(&self) -> Instant {
        self.last_used_at
    }

    /// Whether the connection is still considered usable.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Time since creation.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Time since the connection was last released.
    #[must_use]
    pub fn idle_time(&self) -> Duration {
        self.last_used_at.elapsed()
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_used_at = now;
    }

    pub(crate) fn invalidate(&mut self) {
        self.valid = false;
    }
}

impl fmt::Display for ConnectionMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id={}, kind={}, age={:?}, idle={:?}, valid={}",
            self.id,
            self.kind,
            self.age(),
            self.idle_time(),
            self.valid
        )
    }
}

/// Outcome of a [`LifecyclePolicy`] check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The connection may be handed out.
    Usable,
    /// The connection was marked broken.
    Invalid,
    /// The connection outlived `recycle_after`.
    Expired,
    /// The connection sat idle for at least `stale_after`.
    Stale,
}

impl Verdict {
    /// Get the verdict name as a static string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usable => "usable",
            Self::Invalid => "invalid",
            Self::Expired => "expired",
            Self::Stale => "stale",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Age and idle thresholds applied to connections at acquisition time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecyclePolicy {
    /// Maximum lifetime, `None` for unlimited.
    pub recycle_after: Option<Duration>,
    /// Maximum idle time, `None` for unlimited.
    pub stale_after: Option<Duration>,
}

impl LifecyclePolicy {
    /// Create a policy from the given thresholds.
    #[must_use]
    pub fn new(recycle_after: Option<Duration>, stale_after: Option<Duration>) -> Self {
        Self {
            recycle_after,
            stale_after,
        }
    }

    /// Classify a connection as of `now`.
    #[must_use]
    pub fn check(&self, meta: &ConnectionMetadata, now: Instant) -> Verdict {
        if !meta.valid {
            return Verdict::Invalid;
        }

        if let Some(limit) = self.recycle_after {
            if now.saturating_duration_since(meta.created_at) >= limit {
                return Verdict::Expired;
            }
        }

        if let Some(limit) = self.stale_after {
            if now.saturating_duration_since(meta.last_used_at) >= limit {
                return Verdict::Stale;
            }
        }

        Verdict::Usable
    }

    /// Whether the connection may be handed out as of `now`.
    #[must_use]
    pub fn is_usable(&self, meta: &ConnectionMetadata, now: Instant) -> bool {
        self.check(meta, now) == Verdict::Usable
    }
}
