//! In-memory broker lifecycle for tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use broker_pool::ConnectionLifecycle;
use parking_lot::Mutex;
use thiserror::Error;

/// Errors produced by the mock broker.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MockError {
    /// The broker refused the connection.
    #[error("connection refused by mock broker")]
    Refused,

    /// The transport is broken.
    #[error("connection {0} is broken")]
    Broken(u64),

    /// Closing the connection failed.
    #[error("failed to close connection {0}")]
    CloseFailed(u64),
}

/// A connection to the mock broker.
#[derive(Debug)]
pub struct MockConnection {
    id: u64,
    alive: Arc<AtomicBool>,
    published: u64,
}

impl MockConnection {
    /// Broker-side connection ID, unique per [`MockLifecycle`].
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Simulate a transport failure.
    pub fn break_transport(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Whether the transport has failed.
    #[must_use]
    pub fn is_broken(&self) -> bool {
        !self.alive.load(Ordering::SeqCst)
    }

    /// Publish a message, failing if the transport is broken.
    pub fn publish(&mut self, _body: &[u8]) -> Result<(), MockError> {
        if self.is_broken() {
            return Err(MockError::Broken(self.id));
        }
        self.published += 1;
        Ok(())
    }

    /// Number of messages published on this connection.
    #[must_use]
    pub fn published(&self) -> u64 {
        self.published
    }
}

#[derive(Default)]
struct MockState {
    next_id: AtomicU64,
    connects: AtomicUsize,
    closes: AtomicUsize,
    probes: AtomicUsize,
    double_closes: AtomicUsize,
    fail_connects: AtomicUsize,
    fail_close: AtomicBool,
    connect_delay: Mutex<Option<Duration>>,
    probe_delay: Mutex<Option<Duration>>,
    open: Mutex<HashMap<u64, Arc<AtomicBool>>>,
    closed: Mutex<HashSet<u64>>,
}

/// Scriptable [`ConnectionLifecycle`] backed by an in-memory broker.
///
/// Clones share state, so a test can keep one handle while the pool owns
/// another.
#[derive(Clone, Default)]
pub struct MockLifecycle {
    state: Arc<MockState>,
}

impl MockLifecycle {
    /// Create a new mock broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` connection attempts.
    pub fn fail_next_connects(&self, count: usize) {
        self.state.fail_connects.store(count, Ordering::SeqCst);
    }

    /// Make every close report an error.
    pub fn set_fail_close(&self, fail: bool) {
        self.state.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Delay every connection attempt.
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.state.connect_delay.lock() = Some(delay);
    }

    /// Delay every liveness check.
    pub fn set_probe_delay(&self, delay: Duration) {
        *self.state.probe_delay.lock() = Some(delay);
    }

    /// Break the transport of every open connection.
    pub fn break_all(&self) {
        for alive in self.state.open.lock().values() {
            alive.store(false, Ordering::SeqCst);
        }
    }

    /// Successful connection attempts so far.
    #[must_use]
    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Close calls so far.
    #[must_use]
    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Liveness probes so far.
    #[must_use]
    pub fn probes(&self) -> usize {
        self.state.probes.load(Ordering::SeqCst)
    }

    /// Close calls for a connection that was already closed.
    #[must_use]
    pub fn double_closes(&self) -> usize {
        self.state.double_closes.load(Ordering::SeqCst)
    }

    /// Connections opened and not yet closed.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.state.open.lock().len()
    }

    /// Whether the connection with `id` has been closed.
    #[must_use]
    pub fn is_closed(&self, id: u64) -> bool {
        self.state.closed.lock().contains(&id)
    }
}

impl std::fmt::Debug for MockLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLifecycle")
            .field("connects", &self.connects())
            .field("closes", &self.closes())
            .field("open", &self.open_connections())
            .finish()
    }
}

#[async_trait]
impl ConnectionLifecycle for MockLifecycle {
    type Connection = MockConnection;
    type Error = MockError;

    async fn connect(&self) -> Result<MockConnection, MockError> {
        let delay = *self.state.connect_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let refused = self
            .state
            .fail_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            tracing::debug!("mock broker refusing connection");
            return Err(MockError::Refused);
        }

        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let alive = Arc::new(AtomicBool::new(true));
        self.state.open.lock().insert(id, Arc::clone(&alive));
        self.state.connects.fetch_add(1, Ordering::SeqCst);

        Ok(MockConnection {
            id,
            alive,
            published: 0,
        })
    }

    fn close(&self, conn: MockConnection) -> Result<(), MockError> {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        self.state.open.lock().remove(&conn.id);
        if !self.state.closed.lock().insert(conn.id) {
            self.state.double_closes.fetch_add(1, Ordering::SeqCst);
        }

        if self.state.fail_close.load(Ordering::SeqCst) {
            return Err(MockError::CloseFailed(conn.id));
        }
        Ok(())
    }

    async fn is_alive(&self, conn: &mut MockConnection) -> bool {
        let delay = *self.state.probe_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.state.probes.fetch_add(1, Ordering::SeqCst);
        !conn.is_broken()
    }
}
