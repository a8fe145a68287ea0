//! # broker-pool-testing
//!
//! Test infrastructure for broker-pool development.
//!
//! Provides a scriptable in-memory [`MockLifecycle`] standing in for a
//! broker client, so pool behavior can be exercised without a running
//! broker. The pool integration, property and benchmark suites live in
//! this crate.
//!
//! ## Example
//!
//! ```rust,ignore
//! use broker_pool::Pool;
//! use broker_pool_testing::MockLifecycle;
//!
//! let broker = MockLifecycle::new();
//! let pool = Pool::builder(broker.clone()).base_size(2).build()?;
//!
//! let conn = pool.get().await?;
//! assert_eq!(broker.connects(), 1);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod mock;

pub use mock::{MockConnection, MockError, MockLifecycle};

/// Install a fmt subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("broker_pool=debug")),
        )
        .with_test_writer()
        .try_init();
}
