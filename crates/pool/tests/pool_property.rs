//! Property tests for pool capacity and exclusivity.
//!
//! After any interleaving of acquire, release, discard and dead-instance
//! returns, `idle + in_use + pending <= max_size`, no instance is both idle
//! and leased, and every lease holds a distinct instance.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use proptest::prelude::*;
use reservoir_pool::{Config, Lease, Pool, PoolConfig, PoolStrategy, Resource};

// ---------------------------------------------------------------------------
// Test resource
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct TestConfig;

impl Config for TestConfig {}

#[derive(Debug, thiserror::Error)]
#[error("never fails")]
struct Infallible;

struct Conn {
    serial: u64,
    alive: Arc<AtomicBool>,
}

struct CountingResource {
    counter: AtomicU64,
}

impl Resource for CountingResource {
    type Config = TestConfig;
    type Instance = Conn;
    type Error = Infallible;

    fn id(&self) -> &str {
        "counting"
    }

    async fn create(&self, _config: &TestConfig) -> Result<Conn, Infallible> {
        Ok(Conn {
            serial: self.counter.fetch_add(1, Ordering::SeqCst),
            alive: Arc::new(AtomicBool::new(true)),
        })
    }

    async fn is_valid(&self, conn: &Conn) -> Result<bool, Infallible> {
        Ok(conn.alive.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone)]
enum Op {
    Acquire,
    Release,
    Discard,
    KillAndRelease,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Acquire),
        2 => Just(Op::Release),
        1 => Just(Op::Discard),
        1 => Just(Op::KillAndRelease),
    ]
}

// ---------------------------------------------------------------------------
// Property: live instances never exceed max_size
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn live_instances_never_exceed_max_size(
        max_size in 1usize..6,
        ops in proptest::collection::vec(op(), 1..40),
        strategy in prop_oneof![Just(PoolStrategy::Fifo), Just(PoolStrategy::Lifo)],
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async {
            let pool_config = PoolConfig {
                min_size: 0,
                max_size,
                acquire_timeout: Some(Duration::ZERO),
                strategy,
                ..Default::default()
            };
            let resource = CountingResource { counter: AtomicU64::new(0) };
            let pool = Pool::new(resource, TestConfig, pool_config).unwrap();
            let mut leases: Vec<Lease<CountingResource>> = Vec::new();

            for op in &ops {
                match op {
                    Op::Acquire => {
                        // Exhaustion is an allowed outcome.
                        if let Ok(lease) = pool.acquire().await {
                            leases.push(lease);
                        }
                    }
                    Op::Release => {
                        if let Some(lease) = leases.pop() {
                            lease.release().unwrap();
                        }
                    }
                    Op::Discard => {
                        if let Some(lease) = leases.pop() {
                            lease.discard().await.unwrap();
                        }
                    }
                    Op::KillAndRelease => {
                        if let Some(lease) = leases.pop() {
                            lease.alive.store(false, Ordering::SeqCst);
                            drop(lease);
                        }
                    }
                }

                let stats = pool.stats();
                prop_assert!(
                    stats.live() <= max_size,
                    "capacity violated: {:?} with max_size={}", stats, max_size,
                );
                prop_assert_eq!(stats.in_use, leases.len());
                prop_assert_eq!(stats.pending, 0);

                let serials: HashSet<u64> = leases.iter().map(|lease| lease.serial).collect();
                prop_assert_eq!(serials.len(), leases.len(), "instance leased twice");
            }

            drop(leases);
            let stats = pool.stats();
            prop_assert_eq!(stats.in_use, 0);
            prop_assert!(stats.idle <= max_size);
            // Every hand-out ended in exactly one release or one discard.
            let discarded = stats.destroyed - stats.validation_failures;
            prop_assert_eq!(stats.total_releases + discarded, stats.total_acquisitions);
            Ok(())
        })?;
    }
}
