//! Factory failures, hand-out validation and discard.

use std::error::Error as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use reservoir_pool::{Config, Error, Pool, PoolConfig, Resource};

#[derive(Debug, Clone)]
struct TestConfig;

impl Config for TestConfig {}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
enum ConnError {
    #[error("connection refused")]
    Refused,
    #[error("ping failed")]
    PingFailed,
}

struct Conn {
    serial: u64,
    alive: Arc<AtomicBool>,
}

/// A resource whose behaviour the test can steer.
#[derive(Default)]
struct Flaky {
    created: AtomicU64,
    attempts: AtomicU64,
    cleaned: AtomicU64,
    refuse: AtomicUsize,
    born_dead: AtomicBool,
    ping_errors: AtomicBool,
    slow_dead_ping: AtomicBool,
}

impl Resource for Flaky {
    type Config = TestConfig;
    type Instance = Conn;
    type Error = ConnError;

    fn id(&self) -> &str {
        "flaky"
    }

    async fn create(&self, _config: &TestConfig) -> Result<Conn, ConnError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ConnError::Refused);
        }
        Ok(Conn {
            serial: self.created.fetch_add(1, Ordering::SeqCst),
            alive: Arc::new(AtomicBool::new(!self.born_dead.load(Ordering::SeqCst))),
        })
    }

    async fn is_valid(&self, conn: &Conn) -> Result<bool, ConnError> {
        if self.ping_errors.load(Ordering::SeqCst) {
            return Err(ConnError::PingFailed);
        }
        let alive = conn.alive.load(Ordering::SeqCst);
        if !alive && self.slow_dead_ping.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        Ok(alive)
    }

    async fn cleanup(&self, _conn: Conn) -> Result<(), ConnError> {
        self.cleaned.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn pool_with(resource: Arc<Flaky>, max_size: usize) -> Pool<Shared> {
    let config = PoolConfig {
        min_size: 0,
        max_size,
        acquire_timeout: Some(Duration::from_millis(100)),
        ..Default::default()
    };
    Pool::new(Shared(resource), TestConfig, config).unwrap()
}

/// Lets the test keep a handle on the resource the pool owns.
struct Shared(Arc<Flaky>);

impl Resource for Shared {
    type Config = TestConfig;
    type Instance = Conn;
    type Error = ConnError;

    fn id(&self) -> &str {
        self.0.id()
    }

    async fn create(&self, config: &TestConfig) -> Result<Conn, ConnError> {
        self.0.create(config).await
    }

    async fn is_valid(&self, conn: &Conn) -> Result<bool, ConnError> {
        self.0.is_valid(conn).await
    }

    async fn cleanup(&self, conn: Conn) -> Result<(), ConnError> {
        self.0.cleanup(conn).await
    }
}

#[tokio::test]
async fn factory_error_is_surfaced_unmodified_and_not_retried() {
    let flaky = Arc::new(Flaky::default());
    flaky.refuse.store(1, Ordering::SeqCst);
    let pool = pool_with(Arc::clone(&flaky), 2);

    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, Error::CreationFailed { .. }), "got {err:?}");
    let source = err
        .source()
        .and_then(|source| source.downcast_ref::<ConnError>())
        .expect("factory error should be the source");
    assert_eq!(source, &ConnError::Refused);
    assert_eq!(flaky.attempts.load(Ordering::SeqCst), 1);

    // The failed attempt did not consume capacity.
    let stats = pool.stats();
    assert_eq!(stats.live(), 0);
    let _a = pool.acquire().await.unwrap();
    let _b = pool.acquire().await.unwrap();
}

#[tokio::test]
async fn dead_idle_resource_is_destroyed_and_replaced() {
    let flaky = Arc::new(Flaky::default());
    let pool = pool_with(Arc::clone(&flaky), 1);

    let lease = pool.acquire().await.unwrap();
    lease.alive.store(false, Ordering::SeqCst);
    drop(lease);

    let fresh = pool.acquire().await.unwrap();
    assert_eq!(fresh.serial, 1, "dead instance must never be handed out");
    assert_eq!(flaky.cleaned.load(Ordering::SeqCst), 1);

    let stats = pool.stats();
    assert_eq!(stats.validation_failures, 1);
    assert_eq!(stats.live(), 1);
}

#[tokio::test]
async fn validation_error_counts_as_invalid() {
    let flaky = Arc::new(Flaky::default());
    let pool = pool_with(Arc::clone(&flaky), 2);
    drop(pool.acquire().await.unwrap());

    flaky.ping_errors.store(true, Ordering::SeqCst);
    // The idle one fails its ping, and so does the replacement.
    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, Error::CreationFailed { .. }), "got {err:?}");
    assert_eq!(flaky.cleaned.load(Ordering::SeqCst), 2);
    assert_eq!(pool.stats().live(), 0);

    flaky.ping_errors.store(false, Ordering::SeqCst);
    assert!(pool.acquire().await.is_ok());
}

#[tokio::test]
async fn fresh_instance_failing_validation_is_a_creation_failure() {
    let flaky = Arc::new(Flaky::default());
    flaky.born_dead.store(true, Ordering::SeqCst);
    let pool = pool_with(Arc::clone(&flaky), 1);

    let err = pool.acquire().await.unwrap_err();
    match err {
        Error::CreationFailed { reason, source, .. } => {
            assert!(reason.contains("validation"), "reason: {reason}");
            assert!(source.is_none());
        }
        other => panic!("expected CreationFailed, got {other:?}"),
    }
    assert_eq!(flaky.cleaned.load(Ordering::SeqCst), 1);
    assert_eq!(pool.stats().live(), 0);
}

#[tokio::test]
async fn every_idle_instance_dead_drains_and_recreates() {
    let flaky = Arc::new(Flaky::default());
    let pool = pool_with(Arc::clone(&flaky), 3);

    let leases = vec![
        pool.acquire().await.unwrap(),
        pool.acquire().await.unwrap(),
        pool.acquire().await.unwrap(),
    ];
    for lease in &leases {
        lease.alive.store(false, Ordering::SeqCst);
    }
    drop(leases);
    assert_eq!(pool.stats().idle, 3);

    let fresh = pool.acquire().await.unwrap();
    assert_eq!(fresh.serial, 3);
    let stats = pool.stats();
    assert_eq!(stats.validation_failures, 3);
    assert_eq!(stats.idle, 0);
    assert_eq!(stats.in_use, 1);
}

#[tokio::test]
async fn discarded_lease_is_destroyed_and_frees_its_slot() {
    let flaky = Arc::new(Flaky::default());
    let pool = pool_with(Arc::clone(&flaky), 1);

    let lease = pool.acquire().await.unwrap();
    lease.discard().await.unwrap();
    assert_eq!(flaky.cleaned.load(Ordering::SeqCst), 1);

    let stats = pool.stats();
    assert_eq!(stats.live(), 0);
    assert_eq!(stats.destroyed, 1);

    let next = pool.acquire().await.unwrap();
    assert_eq!(next.serial, 1);
}

#[tokio::test(start_paused = true)]
async fn spent_validation_budget_creates_instead_of_timing_out() {
    let flaky = Arc::new(Flaky::default());
    flaky.slow_dead_ping.store(true, Ordering::SeqCst);
    let pool = pool_with(Arc::clone(&flaky), 2);

    let first = pool.acquire().await.unwrap();
    let second = pool.acquire().await.unwrap();
    first.alive.store(false, Ordering::SeqCst);
    second.alive.store(false, Ordering::SeqCst);
    drop(first);

    let acquirer = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await.map(|lease| lease.serial) })
    };
    // Checking serial 0; serial 1 comes back dead meanwhile.
    tokio::time::sleep(Duration::from_millis(10)).await;
    drop(second);

    // Checking serial 1 with the budget spent; a healthy instance goes idle.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let healthy = pool.acquire().await.unwrap();
    assert_eq!(healthy.serial, 2);
    drop(healthy);

    assert_eq!(acquirer.await.unwrap().unwrap(), 3);
    let stats = pool.stats();
    assert_eq!(stats.timeouts, 0, "validation failures are not timeouts");
    assert_eq!(stats.validation_failures, 2);
    // The healthy one stayed idle; the acquirer's fresh instance joined it.
    assert_eq!(stats.idle, 2);
    assert_eq!(stats.live(), 2);
}
