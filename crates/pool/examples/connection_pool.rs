//! Connection pool walkthrough with the simulated database.
//!
//! ```text
//! cargo run -p reservoir-pool --example connection_pool --features testing
//! ```

use std::sync::Arc;
use std::time::Duration;

use reservoir_pool::testing::{MockDatabase, MockDatabaseConfig};
use reservoir_pool::{Error, EventBus, Pool, PoolConfig, WarmUp};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _log = reservoir_log::init_with(reservoir_log::Config::development())?;

    let bus = Arc::new(EventBus::default());
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::info!(event = event.name(), pool = event.pool(), "pool event");
        }
    });

    let db = MockDatabase::new().with_create_delay(Duration::from_millis(20));
    let config = PoolConfig {
        min_size: 2,
        max_size: 2,
        acquire_timeout: Some(Duration::from_millis(500)),
        warm_up: WarmUp::Eager,
        shutdown_grace: Duration::from_secs(1),
        ..Default::default()
    };
    let pool = Pool::start(
        db.clone(),
        MockDatabaseConfig::new("postgres://localhost/app"),
        config,
        Some(bus),
    )
    .await?;
    let maintenance = pool.spawn_maintenance(Duration::from_secs(30));

    // Both connections checked out: a short acquire gives up.
    let mut first = pool.acquire().await?;
    let second = pool.acquire().await?;
    first.execute("SELECT 1")?;
    match pool.acquire_timeout(Some(Duration::from_millis(10))).await {
        Err(Error::PoolExhausted { waited_ms, .. }) => {
            tracing::info!(waited_ms, "pool exhausted as expected");
        }
        other => tracing::warn!(?other, "unexpected acquire outcome"),
    }

    // Releasing one hands the same connection to the next caller.
    let released = first.resource_id();
    first.release()?;
    let again = pool.acquire_timeout(Some(Duration::from_millis(10))).await?;
    tracing::info!(resource = %again.resource_id(), same = again.resource_id() == released, "re-acquired");

    // A connection the server dropped is replaced transparently.
    again.kill();
    drop(again);
    let replacement = pool.acquire().await?;
    tracing::info!(resource = %replacement.resource_id(), alive = replacement.is_alive(), "replacement");

    drop((second, replacement));
    tracing::info!(stats = ?pool.stats(), "before shutdown");

    maintenance.stop().await;
    pool.shutdown().await?;
    tracing::info!(
        opened = db.opened_connections(),
        closed = db.closed_connections(),
        "done"
    );
    Ok(())
}
