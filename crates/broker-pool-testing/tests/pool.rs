//! Pool behavior tests against the mock broker.
//!
//! Timing-sensitive tests run on a paused clock, so timeouts, connection
//! ages and idle times are exact.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use broker_pool::{ConnectionKind, ConnectionLifecycle, Pool, PoolConfig, PoolError};
use broker_pool_testing::{MockError, MockLifecycle, init_tracing};
use tokio::time::Instant;

fn pool(broker: &MockLifecycle, config: PoolConfig) -> Pool<MockLifecycle> {
    init_tracing();
    Pool::new(broker.clone(), config).unwrap()
}

// =============================================================================
// Reuse and admission
// =============================================================================

#[tokio::test]
async fn test_released_connection_is_reused_before_creating() {
    let broker = MockLifecycle::new();
    let pool = pool(&broker, PoolConfig::new().base_size(2).overflow(0));

    let conn = pool.get().await.unwrap();
    let id = conn.id();
    drop(conn);

    let conn = pool.get().await.unwrap();
    assert_eq!(conn.id(), id);
    assert_eq!(broker.connects(), 1);
}

#[tokio::test]
async fn test_most_recently_released_is_reused_first() {
    let broker = MockLifecycle::new();
    let pool = pool(&broker, PoolConfig::new().base_size(2).overflow(0));

    let a = pool.get().await.unwrap();
    let b = pool.get().await.unwrap();
    let b_id = b.id();
    drop(a);
    drop(b);

    assert_eq!(pool.get().await.unwrap().id(), b_id);
}

#[tokio::test]
async fn test_overflow_connection_closed_on_release() {
    let broker = MockLifecycle::new();
    let pool = pool(&broker, PoolConfig::new().base_size(1).overflow(1));

    let base = pool.get().await.unwrap();
    let overflow = pool.get().await.unwrap();
    assert_eq!(base.metadata().kind(), ConnectionKind::Base);
    assert_eq!(overflow.metadata().kind(), ConnectionKind::Overflow);

    let status = pool.status();
    assert_eq!(status.total, 2);
    assert_eq!(status.overflow, 1);
    assert!(status.is_at_capacity());

    let overflow_id = overflow.id();
    drop(overflow);
    assert!(broker.is_closed(overflow_id));
    assert_eq!(pool.status().total, 1);

    let base_id = base.id();
    drop(base);
    assert!(!broker.is_closed(base_id));
    assert_eq!(pool.status().available, 1);

    let metrics = pool.metrics();
    assert_eq!(metrics.overflow_created, 1);
    assert_eq!(metrics.connections_closed, 1);
}

#[tokio::test]
async fn test_factory_failure_surfaces_creation_error() {
    let broker = MockLifecycle::new();
    let pool = pool(&broker, PoolConfig::new().base_size(1).overflow(0));
    broker.fail_next_connects(1);

    let err = pool.get().await.unwrap_err();
    assert!(matches!(err, PoolError::Creation(_)));
    let source = std::error::Error::source(&err)
        .and_then(|e| e.downcast_ref::<MockError>())
        .unwrap();
    assert_eq!(source, &MockError::Refused);

    let status = pool.status();
    assert_eq!(status.total, 0);
    assert_eq!(status.in_use, 0);

    // The slot was released, so the only base slot is still usable.
    let conn = pool.get().await.unwrap();
    assert_eq!(conn.id(), 1);

    let metrics = pool.metrics();
    assert_eq!(metrics.creation_failures, 1);
    assert_eq!(metrics.checkouts_failed, 1);
    assert_eq!(metrics.checkouts_successful, 1);
}

// =============================================================================
// Waiting and timeouts
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_second_acquire_waits_for_release() {
    let broker = MockLifecycle::new();
    let pool = pool(
        &broker,
        PoolConfig::new()
            .base_size(1)
            .overflow(0)
            .acquire_timeout(Duration::from_secs(5)),
    );

    let first = pool.get().await.unwrap();
    let first_id = first.id();

    let waiter = tokio::spawn({
        let pool = pool.clone();
        async move { pool.get().await.map(|conn| conn.id()) }
    });

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!waiter.is_finished());

    drop(first);
    assert_eq!(waiter.await.unwrap().unwrap(), first_id);
    assert_eq!(broker.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_third_acquire_times_out_without_creating() {
    let broker = MockLifecycle::new();
    let pool = pool(
        &broker,
        PoolConfig::new()
            .base_size(1)
            .overflow(1)
            .acquire_timeout(Duration::from_secs(2)),
    );

    let _a = pool.get().await.unwrap();
    let _b = pool.get().await.unwrap();

    let start = Instant::now();
    let err = pool.get().await.unwrap_err();
    let waited = start.elapsed();

    assert!(matches!(err, PoolError::Timeout(t) if t == Duration::from_secs(2)));
    assert!(waited >= Duration::from_secs(2));
    assert!(waited < Duration::from_secs(3));
    assert_eq!(broker.connects(), 2);
    assert_eq!(pool.status().total, 2);
    assert_eq!(pool.metrics().timeouts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_get_timeout_overrides_configured_timeout() {
    let broker = MockLifecycle::new();
    let pool = pool(&broker, PoolConfig::new().base_size(1).overflow(0));
    let _held = pool.get().await.unwrap();

    let start = Instant::now();
    let err = pool.get_timeout(Duration::from_millis(250)).await.unwrap_err();
    assert!(matches!(err, PoolError::Timeout(_)));
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_connect_releases_slot() {
    let broker = MockLifecycle::new();
    let pool = pool(&broker, PoolConfig::new().base_size(1).overflow(0));
    broker.set_connect_delay(Duration::from_secs(10));

    let result = tokio::time::timeout(Duration::from_secs(1), pool.get()).await;
    assert!(result.is_err());
    assert_eq!(pool.status().total, 0);
    assert_eq!(broker.connects(), 0);

    broker.set_connect_delay(Duration::ZERO);
    assert!(pool.get().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_slow_connect_bounded_by_acquire_timeout() {
    let broker = MockLifecycle::new();
    let pool = pool(
        &broker,
        PoolConfig::new()
            .base_size(1)
            .overflow(0)
            .acquire_timeout(Duration::from_secs(1)),
    );
    broker.set_connect_delay(Duration::from_secs(60));

    let start = Instant::now();
    let err = pool.get().await.unwrap_err();
    assert!(matches!(err, PoolError::Timeout(t) if t == Duration::from_secs(1)));
    assert_eq!(start.elapsed(), Duration::from_secs(1));
    assert_eq!(pool.status().total, 0);
    assert_eq!(broker.connects(), 0);
    assert_eq!(pool.metrics().timeouts, 1);

    broker.set_connect_delay(Duration::ZERO);
    assert!(pool.get().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_slow_liveness_check_bounded_by_acquire_timeout() {
    let broker = MockLifecycle::new();
    let pool = pool(
        &broker,
        PoolConfig::new()
            .base_size(1)
            .overflow(0)
            .acquire_timeout(Duration::from_secs(1))
            .probe_on_acquire(true),
    );

    let conn = pool.get().await.unwrap();
    let id = conn.id();
    drop(conn);

    broker.set_probe_delay(Duration::from_secs(60));
    let start = Instant::now();
    let err = pool.get().await.unwrap_err();
    assert!(matches!(err, PoolError::Timeout(_)));
    assert_eq!(start.elapsed(), Duration::from_secs(1));
    assert_eq!(broker.probes(), 0);

    // The unchecked connection went back to the idle store.
    let status = pool.status();
    assert_eq!(status.available, 1);
    assert_eq!(status.total, 1);
    assert_eq!(broker.closes(), 0);

    broker.set_probe_delay(Duration::ZERO);
    let conn = pool.get().await.unwrap();
    assert_eq!(conn.id(), id);
    assert_eq!(broker.probes(), 1);
}

#[tokio::test]
async fn test_try_get_does_not_check_liveness() {
    let broker = MockLifecycle::new();
    let pool = pool(
        &broker,
        PoolConfig::new().base_size(1).probe_on_acquire(true),
    );

    let conn = pool.get().await.unwrap();
    let id = conn.id();
    drop(conn);

    broker.break_all();
    let conn = pool.try_get().unwrap().unwrap();
    assert_eq!(conn.id(), id);
    assert!(conn.is_broken());
    assert_eq!(broker.probes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_waiter_woken_by_discarded_overflow_slot() {
    let broker = MockLifecycle::new();
    let pool = pool(
        &broker,
        PoolConfig::new()
            .base_size(0)
            .overflow(1)
            .acquire_timeout(Duration::from_secs(5)),
    );

    let held = pool.get().await.unwrap();
    let waiter = tokio::spawn({
        let pool = pool.clone();
        async move { pool.get().await.map(|conn| conn.id()) }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    drop(held);
    // The overflow connection was closed, so the waiter gets a fresh one.
    assert_eq!(waiter.await.unwrap().unwrap(), 2);
    assert_eq!(broker.connects(), 2);
}

// =============================================================================
// Recycling and staleness
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_expired_connection_replaced() {
    let broker = MockLifecycle::new();
    let pool = pool(
        &broker,
        PoolConfig::new()
            .base_size(2)
            .recycle_after(Duration::from_secs(10)),
    );

    let conn = pool.get().await.unwrap();
    let old = conn.id();
    drop(conn);

    tokio::time::advance(Duration::from_secs(9)).await;
    let conn = pool.get().await.unwrap();
    assert_eq!(conn.id(), old);
    drop(conn);

    // Age is measured from creation, not from the last release.
    tokio::time::advance(Duration::from_secs(1)).await;
    let conn = pool.get().await.unwrap();
    assert_ne!(conn.id(), old);
    assert!(broker.is_closed(old));
    assert_eq!(pool.status().total, 1);
    assert_eq!(pool.metrics().recycled, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stale_connection_replaced() {
    let broker = MockLifecycle::new();
    let pool = pool(
        &broker,
        PoolConfig::new()
            .base_size(2)
            .stale_after(Duration::from_secs(5)),
    );

    let conn = pool.get().await.unwrap();
    let old = conn.id();
    drop(conn);

    tokio::time::advance(Duration::from_secs(4)).await;
    let conn = pool.get().await.unwrap();
    assert_eq!(conn.id(), old);
    drop(conn);

    tokio::time::advance(Duration::from_secs(4)).await;
    let conn = pool.get().await.unwrap();
    assert_eq!(conn.id(), old);
    drop(conn);

    tokio::time::advance(Duration::from_secs(5)).await;
    let conn = pool.get().await.unwrap();
    assert_ne!(conn.id(), old);
    assert!(broker.is_closed(old));
    assert_eq!(pool.metrics().stale_evicted, 1);
}

#[tokio::test(start_paused = true)]
async fn test_all_stale_connections_discarded_in_one_acquire() {
    let broker = MockLifecycle::new();
    let pool = pool(
        &broker,
        PoolConfig::new()
            .base_size(3)
            .overflow(0)
            .stale_after(Duration::from_secs(1)),
    );
    assert_eq!(pool.warm_up().await.unwrap(), 3);

    tokio::time::advance(Duration::from_secs(2)).await;
    let conn = pool.get().await.unwrap();
    assert_eq!(conn.id(), 4);
    assert_eq!(broker.closes(), 3);
    assert_eq!(pool.status().total, 1);
}

#[tokio::test(start_paused = true)]
async fn test_try_get_skips_expired() {
    let broker = MockLifecycle::new();
    let pool = pool(
        &broker,
        PoolConfig::new()
            .base_size(1)
            .recycle_after(Duration::from_secs(3)),
    );
    drop(pool.get().await.unwrap());

    assert!(pool.try_get().unwrap().is_some());

    tokio::time::advance(Duration::from_secs(3)).await;
    assert!(pool.try_get().unwrap().is_none());
    assert_eq!(broker.closes(), 1);
    assert_eq!(pool.status().total, 0);
}

// =============================================================================
// Broken connections
// =============================================================================

#[tokio::test]
async fn test_invalidated_connection_closed_on_release() {
    let broker = MockLifecycle::new();
    let pool = pool(&broker, PoolConfig::new().base_size(1).overflow(0));

    let mut conn = pool.get().await.unwrap();
    let id = conn.id();
    conn.break_transport();
    if conn.publish(b"banana").is_err() {
        conn.invalidate();
    }
    drop(conn);

    assert!(broker.is_closed(id));
    assert_eq!(pool.status().total, 0);
    assert_eq!(pool.metrics().invalid_discarded, 1);

    let conn = pool.get().await.unwrap();
    assert_ne!(conn.id(), id);
}

#[tokio::test]
async fn test_explicit_close() {
    let broker = MockLifecycle::new();
    let pool = pool(&broker, PoolConfig::new().base_size(1));

    let conn = pool.get().await.unwrap();
    let id = conn.id();
    conn.close();

    assert!(broker.is_closed(id));
    assert_eq!(pool.status().available, 0);
}

#[tokio::test]
async fn test_probe_replaces_broken_connection() {
    let broker = MockLifecycle::new();
    let pool = pool(
        &broker,
        PoolConfig::new().base_size(2).probe_on_acquire(true),
    );

    let conn = pool.get().await.unwrap();
    let old = conn.id();
    drop(conn);

    broker.break_all();
    let conn = pool.get().await.unwrap();
    assert_ne!(conn.id(), old);
    assert!(!conn.is_broken());
    assert!(broker.is_closed(old));

    assert_eq!(broker.probes(), 1);
    let metrics = pool.metrics();
    assert_eq!(metrics.probes_performed, 1);
    assert_eq!(metrics.probes_failed, 1);
    assert_eq!(metrics.checkouts_successful, 2);
}

#[tokio::test]
async fn test_probe_disabled_by_default() {
    let broker = MockLifecycle::new();
    let pool = pool(&broker, PoolConfig::new().base_size(1));

    let conn = pool.get().await.unwrap();
    let id = conn.id();
    drop(conn);

    broker.break_all();
    let conn = pool.get().await.unwrap();
    assert_eq!(conn.id(), id);
    assert_eq!(broker.probes(), 0);
}

#[tokio::test]
async fn test_close_failure_is_not_propagated() {
    let broker = MockLifecycle::new();
    let pool = pool(&broker, PoolConfig::new().base_size(0).overflow(2));
    broker.set_fail_close(true);

    let conn = pool.get().await.unwrap();
    drop(conn);

    assert_eq!(broker.closes(), 1);
    assert_eq!(pool.status().total, 0);
    assert!(pool.get().await.is_ok());
}

// =============================================================================
// Teardown
// =============================================================================

#[tokio::test]
async fn test_close_drains_idle_connections() {
    let broker = MockLifecycle::new();
    let pool = pool(&broker, PoolConfig::new().base_size(3));
    pool.warm_up().await.unwrap();

    pool.close();
    assert!(pool.is_closed());
    assert_eq!(broker.closes(), 3);
    assert_eq!(broker.open_connections(), 0);
    assert_eq!(pool.status().total, 0);

    // Closing twice is a no-op.
    pool.close();
    assert_eq!(broker.closes(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_acquire_after_close_fails() {
    let broker = MockLifecycle::new();
    let pool = pool(&broker, PoolConfig::new().base_size(1));
    pool.close();

    let start = Instant::now();
    assert!(matches!(pool.get().await, Err(PoolError::PoolClosed)));
    assert!(matches!(pool.try_get(), Err(PoolError::PoolClosed)));
    assert!(matches!(pool.warm_up().await, Err(PoolError::PoolClosed)));
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(broker.connects(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_close_wakes_waiters_and_closes_in_flight() {
    let broker = MockLifecycle::new();
    let pool = pool(
        &broker,
        PoolConfig::new()
            .base_size(1)
            .overflow(0)
            .acquire_timeout(Duration::from_secs(60)),
    );

    let held = pool.get().await.unwrap();
    let waiter = tokio::spawn({
        let pool = pool.clone();
        async move { pool.get().await.map(|conn| conn.id()) }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let start = Instant::now();
    pool.close();
    let result = waiter.await.unwrap();
    assert!(matches!(result, Err(PoolError::PoolClosed)));
    assert!(start.elapsed() < Duration::from_secs(1));

    let id = held.id();
    assert!(!broker.is_closed(id));
    drop(held);
    assert!(broker.is_closed(id));
    assert_eq!(broker.open_connections(), 0);
}

#[tokio::test]
async fn test_dropping_last_handle_closes_idle() {
    let broker = MockLifecycle::new();
    let pool = pool(&broker, PoolConfig::new().base_size(2));
    let conn = pool.get().await.unwrap();
    let other = pool.clone();
    drop(pool);
    drop(conn);
    assert_eq!(broker.open_connections(), 1);

    drop(other);
    assert_eq!(broker.open_connections(), 0);
    assert_eq!(broker.double_closes(), 0);
}

// =============================================================================
// Detach, warm-up and unpooled mode
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_detach_frees_slot() {
    let broker = MockLifecycle::new();
    let pool = pool(
        &broker,
        PoolConfig::new()
            .base_size(1)
            .overflow(0)
            .acquire_timeout(Duration::from_secs(1)),
    );

    let conn = pool.get().await.unwrap();
    let raw = conn.detach();
    assert_eq!(pool.status().total, 0);

    let conn = pool.get().await.unwrap();
    assert_ne!(conn.id(), raw.id());
    assert!(!broker.is_closed(raw.id()));

    broker.close(raw).unwrap();
    assert_eq!(broker.double_closes(), 0);
}

#[tokio::test]
async fn test_warm_up_fills_idle_store() {
    let broker = MockLifecycle::new();
    let pool = pool(&broker, PoolConfig::new().base_size(3).overflow(5));

    let held = pool.get().await.unwrap();
    assert_eq!(pool.warm_up().await.unwrap(), 2);
    assert_eq!(pool.warm_up().await.unwrap(), 0);

    let status = pool.status();
    assert_eq!(status.available, 2);
    assert_eq!(status.in_use, 1);
    assert_eq!(status.overflow, 0);
    drop(held);
    assert_eq!(pool.status().available, 3);
}

#[tokio::test]
async fn test_warm_up_surfaces_creation_error() {
    let broker = MockLifecycle::new();
    let pool = pool(&broker, PoolConfig::new().base_size(2));
    broker.fail_next_connects(1);

    assert!(matches!(pool.warm_up().await, Err(PoolError::Creation(_))));
    assert_eq!(pool.status().total, 0);
}

#[tokio::test]
async fn test_unpooled_closes_every_connection() {
    init_tracing();
    let broker = MockLifecycle::new();
    let pool = Pool::unpooled(broker.clone());

    let a = pool.get().await.unwrap();
    let b = pool.get().await.unwrap();
    assert_eq!(a.metadata().kind(), ConnectionKind::Overflow);
    let a_id = a.id();
    drop(a);
    drop(b);

    assert!(broker.is_closed(a_id));
    assert_eq!(broker.open_connections(), 0);
    assert_eq!(pool.status().total, 0);

    let c = pool.get().await.unwrap();
    assert_eq!(c.id(), 3);
}

#[tokio::test]
async fn test_closure_lifecycle() {
    let opened = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicUsize::new(0));

    let lifecycle = broker_pool::lifecycle::from_fn(
        {
            let opened = Arc::clone(&opened);
            move || {
                let opened = Arc::clone(&opened);
                async move { Ok::<_, std::io::Error>(opened.fetch_add(1, Ordering::SeqCst)) }
            }
        },
        {
            let closed = Arc::clone(&closed);
            move |_conn: usize| {
                closed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        },
    );

    let pool = Pool::builder(lifecycle).base_size(1).overflow(1).build().unwrap();
    let a = pool.get().await.unwrap();
    let b = pool.get().await.unwrap();
    assert_eq!((*a, *b), (0, 1));

    drop(b);
    drop(a);
    assert_eq!(opened.load(Ordering::SeqCst), 2);
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checkouts_respect_capacity() {
    let broker = MockLifecycle::new();
    let pool = pool(
        &broker,
        PoolConfig::new()
            .base_size(3)
            .overflow(2)
            .acquire_timeout(Duration::from_secs(30)),
    );
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..32 {
        let pool = pool.clone();
        let broker = broker.clone();
        let peak = Arc::clone(&peak);
        handles.push(tokio::spawn(async move {
            for _ in 0..25 {
                let mut conn = pool.get().await.unwrap();
                peak.fetch_max(broker.open_connections(), Ordering::SeqCst);
                assert!(pool.status().total <= 5);
                conn.publish(b"banana").unwrap();
                tokio::task::yield_now().await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 5);
    assert_eq!(broker.double_closes(), 0);
    assert_eq!(pool.status().overflow, 0);
    assert_eq!(pool.metrics().checkouts_successful, 32 * 25);

    pool.close();
    assert_eq!(broker.open_connections(), 0);
}
