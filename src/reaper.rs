use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::{now_ms, Engine, WalStore};

/// Background task: expire stale holds and retry outstanding refunds.
pub async fn run_sweeper(engine: Arc<Engine>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        sweep_once(&engine).await;
    }
}

/// One sweeper pass. Failures are logged; the next tick tries again.
pub async fn sweep_once(engine: &Engine) -> (usize, usize) {
    let expired = match engine.expire_stale_holds(now_ms()).await {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!("hold sweep failed: {e}");
            0
        }
    };
    let refunded = match engine.retry_refunds().await {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!("refund retry failed: {e}");
            0
        }
    };
    if expired > 0 || refunded > 0 {
        info!(expired, refunded, "sweep finished");
    }
    (expired, refunded)
}

/// Background task: compact the journal once enough events piled up since the last compaction.
pub async fn run_compactor(store: Arc<WalStore>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let appends = store.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match store.compact().await {
            Ok(()) => info!(appends, "journal compacted"),
            Err(e) => tracing::error!("journal compaction failed: {e}"),
        }
    }
}
