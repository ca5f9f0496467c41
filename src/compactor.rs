use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::engine::{Engine, EngineError};
use crate::observability;
use crate::store::DurableStore;

const TICK: Duration = Duration::from_secs(30);

/// One housekeeping pass. Compacts the WAL once `threshold` appends have
/// accumulated and drops idle booking locks for days before `today`.
/// Returns whether a compaction ran.
pub async fn housekeep(
    store: &DurableStore,
    engine: &Engine,
    threshold: u64,
    today: NaiveDate,
) -> Result<bool, EngineError> {
    let pruned = engine.prune_day_locks(today);
    let channels = engine.notify.prune();
    if pruned > 0 || channels > 0 {
        debug!("pruned {pruned} day locks, {channels} notify channels");
    }

    let appends = store.appends_since_compact().await;
    if appends < threshold {
        return Ok(false);
    }
    store.compact().await?;
    metrics::counter!(observability::WAL_COMPACTIONS_TOTAL).increment(1);
    info!("compacted {} after {appends} appends", store.path().display());
    Ok(true)
}

/// Background task that runs [`housekeep`] on a fixed tick.
pub async fn run_compactor(store: Arc<DurableStore>, engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(TICK);
    loop {
        interval.tick().await;
        let today = chrono::Local::now().date_naive();
        if let Err(e) = housekeep(&store, &engine, threshold, today).await {
            tracing::error!("compaction of {} failed: {e}", store.path().display());
        }
    }
}
