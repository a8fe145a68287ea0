//! # broker-pool
//!
//! Bounded connection pool for message broker clients.
//!
//! The pool amortizes expensive connection setup, caps the number of
//! connections a process opens against the broker, absorbs bursts with
//! short-lived overflow connections, and transparently replaces
//! connections that are too old, idle for too long, or broken.
//!
//! The broker client itself is injected through the
//! [`ConnectionLifecycle`] trait, so the pool works with any transport.
//!
//! ## Features
//!
//! - Base connections kept warm, overflow connections closed on release
//! - Acquire timeout with cancellation-safe waiting
//! - Lazy recycling of expired (`recycle_after`) and stale (`stale_after`)
//!   connections, evaluated at acquisition time
//! - Optional liveness probe before handing out an idle connection
//! - RAII guard that always returns the connection
//! - Status and metrics for observability
//!
//! ## Example
//!
//! ```rust,ignore
//! use broker_pool::{Pool, PoolConfig};
//! use std::time::Duration;
//!
//! // Using the builder pattern
//! let pool = Pool::builder(lifecycle)
//!     .base_size(10)
//!     .overflow(10)
//!     .acquire_timeout(Duration::from_secs(10))
//!     .recycle_after(Duration::from_secs(3600))
//!     .stale_after(Duration::from_secs(45))
//!     .build()?;
//!
//! // Or using PoolConfig directly
//! let config = PoolConfig::new()
//!     .base_size(10)
//!     .overflow(10);
//!
//! let pool = Pool::new(lifecycle, config)?;
//!
//! // Get a connection from the pool
//! let mut conn = pool.get().await?;
//! if let Err(e) = conn.publish("exchange", "fruits", body).await {
//!     // Broken transport: close it instead of pooling it
//!     conn.invalidate();
//!     return Err(e.into());
//! }
//! // Connection automatically returned to pool on drop
//!
//! // Check pool status
//! let status = pool.status();
//! println!("Pool utilization: {:.1}%", status.utilization());
//!
//! // Get metrics
//! let metrics = pool.metrics();
//! println!("Checkout success rate: {:.2}", metrics.checkout_success_rate());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

mod admission;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod pool;
mod store;
mod wrapper;

// Configuration
pub use config::PoolConfig;

// Error types
pub use error::{BoxError, PoolError};

// Pool types
pub use pool::{Pool, PoolBuilder, PoolMetrics, PoolStatus, PooledConnection};

// Lifecycle management
pub use lifecycle::{
    ConnectionKind, ConnectionLifecycle, ConnectionMetadata, FnLifecycle, LifecyclePolicy,
    Verdict,
};
