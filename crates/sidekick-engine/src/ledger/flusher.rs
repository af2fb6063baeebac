use super::ResponseLedger;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Flush `ledger` every `interval` until the returned task is aborted.
///
/// Flushes run on the blocking pool since the store does synchronous file
/// I/O. Failures are logged by the ledger and retried on the next tick.
pub fn spawn_periodic_flush(ledger: Arc<ResponseLedger>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if ledger.pending_updates() == 0 {
                continue;
            }
            let ledger = Arc::clone(&ledger);
            match tokio::task::spawn_blocking(move || ledger.flush()).await {
                Ok(Ok(n)) => debug!(updates = n, "periodic flush complete"),
                Ok(Err(_)) => {}
                Err(e) => warn!(error = %e, "periodic flush task failed"),
            }
        }
    })
}
