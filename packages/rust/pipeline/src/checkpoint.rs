//! Checkpoint writing and crash recovery.
//!
//! The [`CheckpointManager`] is the sole writer of the checkpoint row. It
//! accumulates run counters (resumed across restarts) and flushes a frontier
//! snapshot after every item outcome.

use chrono::Utc;
use tilescout_shared::{FrontierCheckpoint, Result, RunCounters};
use tilescout_storage::Storage;
use tracing::{info, warn};

pub struct CheckpointManager {
    counters: RunCounters,
}

impl CheckpointManager {
    /// Startup recovery: fail any URL left `InProgress` by a dead process
    /// and resume the previous run's counters, if a checkpoint exists.
    pub async fn recover(storage: &Storage) -> Result<Self> {
        let interrupted = storage.fail_interrupted().await?;
        if interrupted > 0 {
            warn!(interrupted, "recovered interrupted URLs as failed");
        }

        let counters = match storage.read_checkpoint().await? {
            Some(checkpoint) => {
                info!(
                    attempted = checkpoint.counters.attempted,
                    completed = checkpoint.counters.completed,
                    failed = checkpoint.counters.failed,
                    written_at = %checkpoint.written_at,
                    "resuming from checkpoint"
                );
                checkpoint.counters
            }
            None => RunCounters::default(),
        };

        Ok(Self { counters })
    }

    pub fn counters(&self) -> RunCounters {
        self.counters
    }

    pub fn record_completed(&mut self) {
        self.counters.attempted += 1;
        self.counters.completed += 1;
    }

    pub fn record_failed(&mut self) {
        self.counters.attempted += 1;
        self.counters.failed += 1;
    }

    /// Persist the frontier snapshot. Called after every item outcome and on
    /// graceful shutdown.
    pub async fn flush(
        &self,
        storage: &Storage,
        pending: Vec<String>,
        in_flight: Option<String>,
    ) -> Result<()> {
        storage
            .write_checkpoint(&FrontierCheckpoint {
                pending,
                in_flight,
                counters: self.counters,
                written_at: Utc::now(),
            })
            .await
    }

    /// Drop the checkpoint after a run that drained the frontier.
    pub async fn finish(&self, storage: &Storage) -> Result<()> {
        storage.clear_checkpoint().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilescout_shared::UrlStatus;
    use uuid::Uuid;

    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("ts_ckpt_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    #[tokio::test]
    async fn recover_without_checkpoint_starts_fresh() {
        let storage = test_storage().await;
        let manager = CheckpointManager::recover(&storage).await.unwrap();
        assert_eq!(manager.counters(), RunCounters::default());
    }

    #[tokio::test]
    async fn recover_resumes_counters_and_fails_interrupted() {
        let storage = test_storage().await;
        storage
            .insert_pending_urls(&[("https://a".to_string(), 1)])
            .await
            .unwrap();
        storage.mark_in_progress("https://a").await.unwrap();

        let mut manager = CheckpointManager::recover(&storage).await.unwrap();
        manager.record_completed();
        manager.record_completed();
        manager.record_failed();
        manager
            .flush(&storage, vec!["https://b".into()], None)
            .await
            .unwrap();

        // Simulated restart
        let resumed = CheckpointManager::recover(&storage).await.unwrap();
        assert_eq!(
            resumed.counters(),
            RunCounters {
                attempted: 3,
                completed: 2,
                failed: 1
            }
        );
        let snapshot = storage.url_snapshot().await.unwrap();
        assert_eq!(snapshot[0].status, UrlStatus::Failed);
    }

    #[tokio::test]
    async fn finish_clears_the_checkpoint() {
        let storage = test_storage().await;
        let manager = CheckpointManager::recover(&storage).await.unwrap();
        manager.flush(&storage, vec![], None).await.unwrap();
        assert!(storage.read_checkpoint().await.unwrap().is_some());

        manager.finish(&storage).await.unwrap();
        assert!(storage.read_checkpoint().await.unwrap().is_none());
    }
}
