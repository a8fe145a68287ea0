//! Raw connection plus its pool bookkeeping.

use tokio::time::Instant;

use crate::lifecycle::{ConnectionKind, ConnectionLifecycle, ConnectionMetadata};

/// A raw connection owned by the pool.
///
/// `close` consumes the wrapper, so a connection cannot be closed twice.
pub(crate) struct Wrapped<C> {
    pub(crate) conn: C,
    pub(crate) meta: ConnectionMetadata,
}

impl<C: Send + 'static> Wrapped<C> {
    /// Open a new connection through the lifecycle.
    pub(crate) async fn create<L>(
        lifecycle: &L,
        id: u64,
        kind: ConnectionKind,
    ) -> Result<Self, L::Error>
    where
        L: ConnectionLifecycle<Connection = C>,
    {
        let conn = lifecycle.connect().await?;
        Ok(Self {
            conn,
            meta: ConnectionMetadata::new(id, kind, Instant::now()),
        })
    }

    pub(crate) fn touch(&mut self) {
        self.meta.touch(Instant::now());
    }

    pub(crate) fn invalidate(&mut self) {
        self.meta.invalidate();
    }

    pub(crate) fn kind(&self) -> ConnectionKind {
        self.meta.kind()
    }

    /// Close the connection, logging any failure.
    pub(crate) fn close<L>(self, lifecycle: &L)
    where
        L: ConnectionLifecycle<Connection = C>,
    {
        let id = self.meta.id();
        if let Err(e) = lifecycle.close(self.conn) {
            tracing::warn!(connection_id = id, error = %e, "failed to close connection");
        }
    }
}
