//! FIFO wait-queue tests.
//!
//! Blocked callers must be served in the order they started waiting,
//! regardless of how the runtime schedules them.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reservoir_pool::{Config, Pool, PoolConfig, Resource};

#[derive(Debug, Clone)]
struct TestConfig;

impl Config for TestConfig {}

#[derive(Debug, thiserror::Error)]
#[error("never fails")]
struct Infallible;

struct Token;

impl Resource for Token {
    type Config = TestConfig;
    type Instance = &'static str;
    type Error = Infallible;

    fn id(&self) -> &str {
        "token"
    }

    async fn create(&self, _config: &TestConfig) -> Result<&'static str, Infallible> {
        Ok("token")
    }
}

fn single_slot_pool() -> Pool<Token> {
    let config = PoolConfig {
        min_size: 0,
        max_size: 1,
        acquire_timeout: None,
        ..Default::default()
    };
    Pool::new(Token, TestConfig, config).unwrap()
}

async fn wait_for_waiters(pool: &Pool<Token>, count: usize) {
    while pool.stats().waiters < count {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn waiters_are_served_in_arrival_order() {
    let pool = single_slot_pool();
    let held = pool.acquire().await.unwrap();
    let served = Arc::new(Mutex::new(Vec::new()));

    let mut tasks = Vec::new();
    for (index, name) in ["A", "B", "C"].into_iter().enumerate() {
        let task_pool = pool.clone();
        let served = Arc::clone(&served);
        tasks.push(tokio::spawn(async move {
            let lease = task_pool.acquire().await.unwrap();
            served.lock().push(name);
            tokio::time::sleep(Duration::from_millis(5)).await;
            drop(lease);
        }));
        wait_for_waiters(&pool, index + 1).await;
    }

    drop(held);
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(*served.lock(), ["A", "B", "C"]);
    assert_eq!(pool.stats().created, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn arrival_order_holds_on_multi_thread_runtime() {
    let pool = single_slot_pool();
    let held = pool.acquire().await.unwrap();
    let served = Arc::new(Mutex::new(Vec::new()));

    let mut tasks = Vec::new();
    for index in 0..8usize {
        let task_pool = pool.clone();
        let served = Arc::clone(&served);
        tasks.push(tokio::spawn(async move {
            let lease = task_pool.acquire().await.unwrap();
            served.lock().push(index);
            drop(lease);
        }));
        // Counted only once the waiter sits in the queue.
        wait_for_waiters(&pool, index + 1).await;
    }

    drop(held);
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(*served.lock(), (0..8).collect::<Vec<_>>());
}

#[tokio::test]
async fn try_acquire_does_not_jump_the_queue() {
    let pool = single_slot_pool();
    let held = pool.acquire().await.unwrap();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await.map(|lease| lease.resource_id()) })
    };
    wait_for_waiters(&pool, 1).await;

    let held_id = held.resource_id();
    drop(held);

    // The released slot already belongs to the waiter.
    assert!(pool.try_acquire().await.is_err());
    assert_eq!(waiter.await.unwrap().unwrap(), held_id);
}
