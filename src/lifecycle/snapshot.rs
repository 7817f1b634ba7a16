//! Periodic store snapshots.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::lifecycle::Shutdown;
use crate::storage::Storage;

/// Flush `store` every `interval` until shutdown.
pub fn spawn_snapshot_task(store: Arc<dyn Storage>, interval: Duration, shutdown: &Shutdown) -> JoinHandle<()> {
    let mut stop = shutdown.subscribe();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = store.flush() {
                        tracing::error!(error = %e, "Periodic snapshot failed");
                    }
                }
                _ = stop.recv() => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LogEntry, LogLevel};
    use crate::storage::{MemoryStore, QueryLimits};
    use chrono::Utc;
    use std::collections::HashMap;

    #[tokio::test]
    async fn flushes_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.json");
        let store = Arc::new(MemoryStore::open(&path, QueryLimits::default()).unwrap());
        store
            .save_log(&LogEntry {
                id: "a".into(),
                timestamp: Utc::now(),
                service: "api".into(),
                level: LogLevel::Info,
                message: "m".into(),
                trace_id: None,
                span_id: None,
                attributes: HashMap::new(),
                env: String::new(),
                host: String::new(),
            })
            .unwrap();

        let shutdown = Shutdown::new();
        let handle = spawn_snapshot_task(store.clone(), Duration::from_millis(20), &shutdown);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(path.exists());

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
