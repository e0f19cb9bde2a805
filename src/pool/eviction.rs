//! Periodic idle sweep
//!
//! Ticks every `eviction_period` and asks the pool to evict slots that sat
//! idle past their timeout. Holds only a weak reference, so a dropped pool
//! ends the loop on the next tick.

use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::manager::PoolManager;

pub(crate) fn spawn(
    pool: Weak<PoolManager>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run(pool, period, cancel))
}

async fn run(pool: Weak<PoolManager>, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!("Idle sweeper started, period: {:?}", period);

    // Skip the first immediate tick
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let Some(pool) = pool.upgrade() else {
            break;
        };
        let evicted = pool.evict_idle();
        debug!(evicted, "Idle sweep finished");
    }

    info!("Idle sweeper stopped");
}
