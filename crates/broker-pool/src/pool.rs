//! Connection pool implementation.
//!
//! This module provides the pool façade: acquisition under contention,
//! overflow admission, timeouts and lazy recycling of stale or expired
//! connections.

use std::fmt;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::admission::Admission;
use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::lifecycle::{
    ConnectionKind, ConnectionLifecycle, ConnectionMetadata, LifecyclePolicy, Verdict,
};
use crate::store::IdleStore;
use crate::wrapper::Wrapped;

/// A pool of broker connections.
///
/// The pool manages a bounded set of connections created by a
/// [`ConnectionLifecycle`], reusing idle connections, admitting overflow
/// connections under load and replacing connections that are too old,
/// idle for too long or broken.
///
/// Cloning a `Pool` is cheap and yields another handle to the same pool.
///
/// # Example
///
/// ```rust,ignore
/// use broker_pool::Pool;
/// use std::time::Duration;
///
/// let pool = Pool::builder(lifecycle)
///     .base_size(10)
///     .overflow(10)
///     .acquire_timeout(Duration::from_secs(10))
///     .recycle_after(Duration::from_secs(3600))
///     .stale_after(Duration::from_secs(45))
///     .build()?;
///
/// let mut conn = pool.get().await?;
/// conn.publish("exchange", "routing.key", body).await?;
/// // Connection returned to the pool on drop
/// ```
pub struct Pool<L: ConnectionLifecycle> {
    inner: Arc<PoolInner<L>>,
}

struct PoolInner<L: ConnectionLifecycle> {
    /// Creates, probes and closes connections.
    lifecycle: L,

    /// Pool configuration.
    config: PoolConfig,

    /// Age and idle thresholds.
    policy: LifecyclePolicy,

    /// Admission counters, idle store and closed flag.
    state: Mutex<PoolState<L::Connection>>,

    /// Signalled whenever a connection or a slot is released.
    available: Notify,

    /// Counter for generating connection IDs.
    next_connection_id: AtomicU64,

    /// When the pool was created.
    created_at: Instant,

    /// Pool metrics.
    metrics: Mutex<PoolMetricsInner>,
}

struct PoolState<C> {
    admission: Admission,
    idle: IdleStore<Wrapped<C>>,
    closed: bool,
}

/// Result of one pass over the pool state.
enum Checkout<C> {
    /// An idle connection was taken from the store.
    Idle(Wrapped<C>),
    /// A slot was reserved for a new connection.
    Admitted(ConnectionKind),
    /// Every slot is in use.
    Exhausted,
}

/// Internal metrics tracking.
#[derive(Debug, Default)]
struct PoolMetricsInner {
    /// Total connections created.
    connections_created: u64,
    /// Total connections closed.
    connections_closed: u64,
    /// Connections created beyond the base size.
    overflow_created: u64,
    /// Total successful checkouts.
    checkouts_successful: u64,
    /// Total failed checkouts (timeouts, errors).
    checkouts_failed: u64,
    /// Checkouts that timed out.
    timeouts: u64,
    /// Connection factory failures.
    creation_failures: u64,
    /// Connections replaced for exceeding their lifetime.
    recycled: u64,
    /// Connections replaced for sitting idle too long.
    stale_evicted: u64,
    /// Connections discarded after being marked broken.
    invalid_discarded: u64,
    /// Liveness probes performed.
    probes_performed: u64,
    /// Liveness probes that failed.
    probes_failed: u64,
}

impl<L: ConnectionLifecycle> Pool<L> {
    /// Create a new pool builder around a connection lifecycle.
    #[must_use]
    pub fn builder(lifecycle: L) -> PoolBuilder<L> {
        PoolBuilder::new(lifecycle)
    }

    /// Create a new pool with the given configuration.
    ///
    /// For more control over pool creation, use [`Pool::builder()`].
    pub fn new(lifecycle: L, config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        Ok(Self::with_config(lifecycle, config))
    }

    /// Create a pool that keeps no idle connections.
    ///
    /// Every acquire opens a fresh connection and every release closes it.
    /// Useful for tests and low-volume producers where holding connections
    /// open is not worth it.
    #[must_use]
    pub fn unpooled(lifecycle: L) -> Self {
        let config = PoolConfig::new().base_size(0).overflow(u32::MAX);
        Self::with_config(lifecycle, config)
    }

    fn with_config(lifecycle: L, config: PoolConfig) -> Self {
        let inner = Arc::new(PoolInner {
            lifecycle,
            policy: LifecyclePolicy::new(config.recycle_after, config.stale_after),
            state: Mutex::new(PoolState {
                admission: Admission::new(config.base_size, config.overflow),
                idle: IdleStore::new(config.base_size as usize),
                closed: false,
            }),
            available: Notify::new(),
            next_connection_id: AtomicU64::new(1),
            created_at: Instant::now(),
            metrics: Mutex::new(PoolMetricsInner::default()),
            config,
        });

        tracing::info!(
            base_size = inner.config.base_size,
            overflow = inner.config.overflow,
            acquire_timeout = ?inner.config.acquire_timeout,
            "connection pool created"
        );

        Self { inner }
    }

    /// Get a connection from the pool.
    ///
    /// This will either return an existing idle connection or create a new
    /// one if the pool is not at capacity. If all connections are in use and
    /// the pool is at capacity, this waits until a connection is released.
    ///
    /// The configured acquire timeout bounds the whole call: waiting for a
    /// release, opening a new connection and the liveness probe.
    pub async fn get(&self) -> Result<PooledConnection<L>, PoolError> {
        self.get_timeout(self.inner.config.acquire_timeout).await
    }

    /// Get a connection from the pool, waiting at most `timeout`.
    ///
    /// A connection attempt still in progress at the deadline is abandoned
    /// and its slot freed.
    pub async fn get_timeout(&self, timeout: Duration) -> Result<PooledConnection<L>, PoolError> {
        tracing::trace!(timeout = ?timeout, "acquiring connection from pool");

        let deadline = Instant::now().checked_add(timeout);
        let result = self.acquire(deadline, timeout).await;

        let mut metrics = self.inner.metrics.lock();
        match &result {
            Ok(_) => metrics.checkouts_successful += 1,
            Err(e) => {
                metrics.checkouts_failed += 1;
                match e {
                    PoolError::Timeout(_) => metrics.timeouts += 1,
                    PoolError::Creation(_) => metrics.creation_failures += 1,
                    _ => {}
                }
            }
        }

        result
    }

    async fn acquire(
        &self,
        deadline: Option<Instant>,
        timeout: Duration,
    ) -> Result<PooledConnection<L>, PoolError> {
        let inner = &self.inner;
        let expired = || {
            tracing::debug!(timeout = ?timeout, "timed out acquiring a connection");
            PoolError::Timeout(timeout)
        };

        loop {
            // Register for wakeups before inspecting the state so a release
            // between the check and the wait is not missed.
            let notified = inner.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match inner.checkout()? {
                Checkout::Idle(wrapped) => {
                    let verdict = inner.policy.check(&wrapped.meta, Instant::now());
                    if verdict != Verdict::Usable {
                        inner.discard(wrapped, verdict);
                        continue;
                    }

                    let mut conn = PooledConnection::new(wrapped, Arc::clone(inner));
                    if inner.config.probe_on_acquire {
                        // On expiry the unprobed connection goes back to the
                        // idle store with the guard.
                        let alive = until(deadline, conn.probe()).await.ok_or_else(expired)?;
                        if !alive {
                            // Dropping the invalidated guard closes the
                            // connection and frees its slot.
                            conn.invalidate();
                            drop(conn);
                            continue;
                        }
                    }

                    tracing::trace!(
                        connection_id = conn.metadata().id(),
                        "reusing idle connection"
                    );
                    return Ok(conn);
                }
                Checkout::Admitted(kind) => {
                    let wrapped = until(deadline, inner.open(kind))
                        .await
                        .ok_or_else(expired)??;
                    return Ok(PooledConnection::new(wrapped, Arc::clone(inner)));
                }
                Checkout::Exhausted => {}
            }

            until(deadline, notified).await.ok_or_else(expired)?;
        }
    }

    /// Try to get an idle connection without waiting.
    ///
    /// Returns `None` if no usable idle connection is immediately available.
    /// This never opens a new connection and never runs the liveness probe,
    /// even when [`PoolConfig::probe_on_acquire`] is set.
    pub fn try_get(&self) -> Result<Option<PooledConnection<L>>, PoolError> {
        let inner = &self.inner;

        loop {
            let wrapped = {
                let mut state = inner.state.lock();
                if state.closed {
                    return Err(PoolError::PoolClosed);
                }
                match state.idle.try_take() {
                    Some(wrapped) => wrapped,
                    None => return Ok(None),
                }
            };

            let verdict = inner.policy.check(&wrapped.meta, Instant::now());
            if verdict != Verdict::Usable {
                inner.discard(wrapped, verdict);
                continue;
            }

            inner.metrics.lock().checkouts_successful += 1;
            return Ok(Some(PooledConnection::new(wrapped, Arc::clone(inner))));
        }
    }

    /// Open base connections until the idle store is full.
    ///
    /// Returns the number of connections created. Stops early without error
    /// when the base slots are taken by checked-out connections.
    pub async fn warm_up(&self) -> Result<usize, PoolError> {
        let inner = &self.inner;
        let mut created = 0;

        loop {
            {
                let mut state = inner.state.lock();
                if state.closed {
                    return Err(PoolError::PoolClosed);
                }
                if state.idle.is_full() || !state.admission.try_admit_base() {
                    break;
                }
            }

            let wrapped = inner.open(ConnectionKind::Base).await?;
            inner.release(wrapped);
            created += 1;
        }

        tracing::debug!(created = created, "pool warmed up");
        Ok(created)
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        let available = u32::try_from(state.idle.len()).unwrap_or(u32::MAX);
        let total = state.admission.created_total();
        PoolStatus {
            available,
            in_use: total.saturating_sub(available),
            total,
            overflow: state.admission.overflow_in_use(),
            max: self.inner.config.max_connections(),
        }
    }

    /// Get pool metrics.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        let inner = self.inner.metrics.lock();
        PoolMetrics {
            connections_created: inner.connections_created,
            connections_closed: inner.connections_closed,
            overflow_created: inner.overflow_created,
            checkouts_successful: inner.checkouts_successful,
            checkouts_failed: inner.checkouts_failed,
            timeouts: inner.timeouts,
            creation_failures: inner.creation_failures,
            recycled: inner.recycled,
            stale_evicted: inner.stale_evicted,
            invalid_discarded: inner.invalid_discarded,
            probes_performed: inner.probes_performed,
            probes_failed: inner.probes_failed,
            uptime: self.inner.created_at.elapsed(),
        }
    }

    /// Close the pool.
    ///
    /// Idle connections are closed immediately, checked-out connections are
    /// closed when they are released, and every waiting or later `get`
    /// fails with [`PoolError::PoolClosed`].
    pub fn close(&self) {
        let drained = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;

            let drained = state.idle.drain();
            for wrapped in &drained {
                state.admission.release(wrapped.kind());
            }
            drained
        };

        self.inner.available.notify_waiters();

        let count = drained.len();
        for wrapped in drained {
            self.inner.close_connection(wrapped);
        }

        tracing::info!(idle_closed = count, "connection pool closed");
    }

    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Get the connection lifecycle.
    #[must_use]
    pub fn lifecycle(&self) -> &L {
        &self.inner.lifecycle
    }
}

impl<L: ConnectionLifecycle> Clone for Pool<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: ConnectionLifecycle> fmt::Debug for Pool<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.inner.config)
            .field("status", &self.status())
            .finish()
    }
}

impl<L: ConnectionLifecycle> PoolInner<L> {
    /// Take an idle connection or reserve a slot for a new one.
    fn checkout(&self) -> Result<Checkout<L::Connection>, PoolError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PoolError::PoolClosed);
        }

        if let Some(wrapped) = state.idle.try_take() {
            return Ok(Checkout::Idle(wrapped));
        }

        Ok(match state.admission.try_admit() {
            Some(kind) => Checkout::Admitted(kind),
            None => Checkout::Exhausted,
        })
    }

    /// Open a connection in a slot already reserved for `kind`.
    ///
    /// The slot is released if the factory fails or the future is dropped.
    async fn open(&self, kind: ConnectionKind) -> Result<Wrapped<L::Connection>, PoolError> {
        let slot = SlotGuard {
            pool: self,
            kind,
            armed: true,
        };

        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        match Wrapped::create(&self.lifecycle, id, kind).await {
            Ok(wrapped) => {
                slot.disarm();

                let mut metrics = self.metrics.lock();
                metrics.connections_created += 1;
                if kind == ConnectionKind::Overflow {
                    metrics.overflow_created += 1;
                }
                drop(metrics);

                tracing::debug!(connection_id = id, kind = %kind, "connection created");
                Ok(wrapped)
            }
            Err(e) => {
                tracing::warn!(kind = %kind, error = %e, "failed to create connection");
                Err(PoolError::Creation(Box::new(e)))
            }
        }
    }

    /// Return a checked-out connection.
    ///
    /// Base connections go back to the idle store; overflow connections,
    /// invalidated connections and anything released after `close` are
    /// closed. A closed connection's slot is freed only after the close,
    /// so the broker never sees more than the configured maximum.
    fn release(&self, mut wrapped: Wrapped<L::Connection>) {
        let to_close = {
            let mut state = self.state.lock();
            let keep = wrapped.meta.is_valid() && wrapped.kind() == ConnectionKind::Base;
            if state.closed || !keep {
                Some(wrapped)
            } else {
                wrapped.touch();
                state.idle.put(wrapped).err()
            }
        };

        let Some(wrapped) = to_close else {
            self.available.notify_one();
            return;
        };

        if !wrapped.meta.is_valid() {
            self.metrics.lock().invalid_discarded += 1;
        }
        tracing::debug!(
            connection_id = wrapped.meta.id(),
            kind = %wrapped.kind(),
            valid = wrapped.meta.is_valid(),
            "closing released connection"
        );

        let kind = wrapped.kind();
        self.close_connection(wrapped);
        self.release_slot(kind);
    }

    /// Drop an idle connection rejected by the lifecycle policy.
    fn discard(&self, wrapped: Wrapped<L::Connection>, verdict: Verdict) {
        {
            let mut metrics = self.metrics.lock();
            match verdict {
                Verdict::Expired => metrics.recycled += 1,
                Verdict::Stale => metrics.stale_evicted += 1,
                Verdict::Invalid => metrics.invalid_discarded += 1,
                Verdict::Usable => {}
            }
        }

        tracing::info!(
            reason = %verdict,
            connection = %wrapped.meta,
            "discarding pooled connection"
        );

        let kind = wrapped.kind();
        self.close_connection(wrapped);
        self.release_slot(kind);
    }

    /// Give up a reserved slot without a connection to close.
    fn release_slot(&self, kind: ConnectionKind) {
        self.state.lock().admission.release(kind);
        self.available.notify_one();
    }

    fn close_connection(&self, wrapped: Wrapped<L::Connection>) {
        wrapped.close(&self.lifecycle);
        self.metrics.lock().connections_closed += 1;
    }
}

impl<L: ConnectionLifecycle> Drop for PoolInner<L> {
    fn drop(&mut self) {
        let drained = self.state.get_mut().idle.drain();
        if drained.is_empty() {
            return;
        }

        tracing::debug!(idle = drained.len(), "closing idle connections of dropped pool");
        for wrapped in drained {
            wrapped.close(&self.lifecycle);
        }
    }
}

/// Run `fut` to completion, or give up at `deadline`.
async fn until<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut).await.ok(),
        None => Some(fut.await),
    }
}

/// Releases an admission slot unless disarmed.
struct SlotGuard<'a, L: ConnectionLifecycle> {
    pool: &'a PoolInner<L>,
    kind: ConnectionKind,
    armed: bool,
}

impl<L: ConnectionLifecycle> SlotGuard<'_, L> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<L: ConnectionLifecycle> Drop for SlotGuard<'_, L> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.release_slot(self.kind);
        }
    }
}

/// Builder for creating a connection pool.
///
/// # Example
///
/// ```rust,ignore
/// let pool = Pool::builder(lifecycle)
///     .base_size(4)
///     .overflow(2)
///     .build()?;
/// ```
pub struct PoolBuilder<L> {
    lifecycle: L,
    pool_config: PoolConfig,
}

impl<L: ConnectionLifecycle> PoolBuilder<L> {
    /// Create a new pool builder with default settings.
    pub fn new(lifecycle: L) -> Self {
        Self {
            lifecycle,
            pool_config: PoolConfig::default(),
        }
    }

    /// Set the pool configuration.
    #[must_use]
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Set the number of base connections.
    #[must_use]
    pub fn base_size(mut self, size: u32) -> Self {
        self.pool_config.base_size = size;
        self
    }

    /// Set the overflow capacity.
    #[must_use]
    pub fn overflow(mut self, overflow: u32) -> Self {
        self.pool_config.overflow = overflow;
        self
    }

    /// Set the connection acquisition timeout.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.acquire_timeout = timeout;
        self
    }

    /// Set the maximum connection lifetime.
    #[must_use]
    pub fn recycle_after(mut self, lifetime: Duration) -> Self {
        self.pool_config.recycle_after = Some(lifetime);
        self
    }

    /// Set the maximum idle time.
    #[must_use]
    pub fn stale_after(mut self, idle: Duration) -> Self {
        self.pool_config.stale_after = Some(idle);
        self
    }

    /// Enable or disable the liveness probe on acquire.
    #[must_use]
    pub fn probe_on_acquire(mut self, enabled: bool) -> Self {
        self.pool_config.probe_on_acquire = enabled;
        self
    }

    /// Build the pool.
    pub fn build(self) -> Result<Pool<L>, PoolError> {
        Pool::new(self.lifecycle, self.pool_config)
    }
}

impl<L> fmt::Debug for PoolBuilder<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolBuilder")
            .field("pool_config", &self.pool_config)
            .finish_non_exhaustive()
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Number of idle connections available.
    pub available: u32,
    /// Number of connections checked out or being opened.
    pub in_use: u32,
    /// Total number of live connections.
    pub total: u32,
    /// Number of live overflow connections.
    pub overflow: u32,
    /// Maximum allowed connections.
    pub max: u32,
}

impl PoolStatus {
    /// Calculate the utilization percentage.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        (f64::from(self.in_use) / f64::from(self.max)) * 100.0
    }

    /// Check if the pool is at capacity.
    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.total >= self.max
    }
}

/// Metrics collected from the pool.
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Total connections created since pool start.
    pub connections_created: u64,
    /// Total connections closed since pool start.
    pub connections_closed: u64,
    /// Connections created as overflow.
    pub overflow_created: u64,
    /// Successful connection checkouts.
    pub checkouts_successful: u64,
    /// Failed connection checkouts (timeouts, pool closed, etc.).
    pub checkouts_failed: u64,
    /// Checkouts that timed out.
    pub timeouts: u64,
    /// Connection factory failures.
    pub creation_failures: u64,
    /// Connections replaced for exceeding `recycle_after`.
    pub recycled: u64,
    /// Connections replaced for exceeding `stale_after`.
    pub stale_evicted: u64,
    /// Connections discarded after being marked broken.
    pub invalid_discarded: u64,
    /// Liveness probes performed.
    pub probes_performed: u64,
    /// Liveness probes that failed.
    pub probes_failed: u64,
    /// Time since pool creation.
    pub uptime: Duration,
}

impl PoolMetrics {
    /// Calculate checkout success rate (0.0 to 1.0).
    #[must_use]
    pub fn checkout_success_rate(&self) -> f64 {
        let total = self.checkouts_successful + self.checkouts_failed;
        if total == 0 {
            return 1.0;
        }
        self.checkouts_successful as f64 / total as f64
    }

    /// Calculate liveness probe success rate (0.0 to 1.0).
    #[must_use]
    pub fn probe_success_rate(&self) -> f64 {
        if self.probes_performed == 0 {
            return 1.0;
        }
        let successful = self.probes_performed - self.probes_failed;
        successful as f64 / self.probes_performed as f64
    }
}

/// A connection checked out of the pool.
///
/// Dereferences to the raw connection. When dropped, the connection is
/// returned to the pool, or closed if it is an overflow connection, was
/// invalidated, or the pool has been closed.
pub struct PooledConnection<L: ConnectionLifecycle> {
    /// `None` only after `detach` has taken the connection.
    conn: Option<Wrapped<L::Connection>>,
    /// Reference to the pool for returning the connection.
    pool: Arc<PoolInner<L>>,
}

// The connection is only taken out by methods that consume the guard, so
// every `&self`/`&mut self` access finds it present.
#[allow(clippy::expect_used)]
impl<L: ConnectionLifecycle> PooledConnection<L> {
    fn new(wrapped: Wrapped<L::Connection>, pool: Arc<PoolInner<L>>) -> Self {
        Self {
            conn: Some(wrapped),
            pool,
        }
    }

    fn wrapped(&self) -> &Wrapped<L::Connection> {
        self.conn.as_ref().expect("connection present until guard is consumed")
    }

    fn wrapped_mut(&mut self) -> &mut Wrapped<L::Connection> {
        self.conn.as_mut().expect("connection present until guard is consumed")
    }

    /// Get the connection metadata.
    #[must_use]
    pub fn metadata(&self) -> &ConnectionMetadata {
        &self.wrapped().meta
    }

    /// Mark the connection as broken.
    ///
    /// Call this after a transport error; the connection will be closed
    /// instead of returned to the pool.
    pub fn invalidate(&mut self) {
        self.wrapped_mut().invalidate();
    }

    /// Return the connection to the pool.
    ///
    /// Equivalent to dropping the guard.
    pub fn release(self) {
        drop(self);
    }

    /// Close the connection instead of returning it to the pool.
    pub fn close(mut self) {
        self.invalidate();
        drop(self);
    }

    /// Detach the connection from the pool.
    ///
    /// The raw connection is handed to the caller, who becomes responsible
    /// for closing it. Its slot in the pool is freed.
    #[must_use]
    pub fn detach(mut self) -> L::Connection {
        let wrapped = self
            .conn
            .take()
            .expect("connection present until guard is consumed");

        self.pool.release_slot(wrapped.kind());
        tracing::debug!(connection_id = wrapped.meta.id(), "connection detached from pool");
        wrapped.conn
    }

    async fn probe(&mut self) -> bool {
        let wrapped = self.conn.as_mut().expect("connection present until guard is consumed");
        let alive = self.pool.lifecycle.is_alive(&mut wrapped.conn).await;

        let mut metrics = self.pool.metrics.lock();
        metrics.probes_performed += 1;
        if !alive {
            metrics.probes_failed += 1;
            drop(metrics);
            tracing::warn!(connection_id = wrapped.meta.id(), "liveness probe failed");
        }

        alive
    }
}

impl<L: ConnectionLifecycle> Deref for PooledConnection<L> {
    type Target = L::Connection;

    fn deref(&self) -> &Self::Target {
        &self.wrapped().conn
    }
}

impl<L: ConnectionLifecycle> DerefMut for PooledConnection<L> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.wrapped_mut().conn
    }
}

impl<L: ConnectionLifecycle> fmt::Debug for PooledConnection<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("metadata", &self.conn.as_ref().map(|w| &w.meta))
            .finish()
    }
}

impl<L: ConnectionLifecycle> Drop for PooledConnection<L> {
    fn drop(&mut self) {
        if let Some(wrapped) = self.conn.take() {
            tracing::trace!(
                connection_id = wrapped.meta.id(),
                "returning connection to pool"
            );
            self.pool.release(wrapped);
        }
    }
}
