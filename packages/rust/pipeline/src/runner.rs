//! The batch run loop: schedule, fetch, extract, persist, checkpoint.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::{Duration, Utc};
use tilescout_extract::extract;
use tilescout_fetch::{PageFetcher, Pacer};
use tilescout_shared::{FetchConfig, Result, RunCounters, SchedulerConfig};
use tilescout_storage::{Storage, UpsertOutcome};
use tokio::sync::{Mutex, Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use crate::checkpoint::CheckpointManager;
use crate::scheduler;

enum ItemOutcome {
    Completed,
    Failed,
    /// Shutdown arrived before the item started; not counted.
    Skipped,
}

/// Drives the acquisition pipeline over the stored frontier.
///
/// Generic over the page source so the whole loop is testable with canned
/// pages. Only this runner mutates URL statuses during a run.
pub struct PipelineRunner<F> {
    storage: Arc<Storage>,
    fetcher: Arc<F>,
    scheduler_config: SchedulerConfig,
    pacer: Arc<Mutex<Pacer>>,
    shutdown: watch::Receiver<bool>,
}

impl<F: PageFetcher + 'static> PipelineRunner<F> {
    pub fn new(
        storage: Arc<Storage>,
        fetcher: F,
        scheduler_config: SchedulerConfig,
        fetch_config: &FetchConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            storage,
            fetcher: Arc::new(fetcher),
            scheduler_config,
            pacer: Arc::new(Mutex::new(Pacer::new(fetch_config))),
            shutdown,
        }
    }

    /// Process batches until the frontier drains, `max_pages` outcomes are
    /// recorded, shutdown is signalled, or storage becomes unavailable.
    pub async fn run(&self, max_pages: Option<u64>) -> Result<RunCounters> {
        let mut manager = CheckpointManager::recover(&self.storage).await?;
        let horizon = self
            .scheduler_config
            .recrawl_horizon_days
            .map(|d| Duration::days(d as i64));

        // Failed URLs become schedulable again immediately; retrying them
        // within the same run would spin on a persistently broken page.
        let mut attempted_this_run: HashSet<String> = HashSet::new();
        let mut processed: u64 = 0;
        let mut drained = false;

        'run: loop {
            if *self.shutdown.borrow() {
                break;
            }

            let snapshot = self.storage.url_snapshot().await?;
            let scheduled = scheduler::next_batch(
                &snapshot,
                self.scheduler_config.batch_size as usize,
                horizon,
                Utc::now(),
            );
            let batch: Vec<String> = scheduled
                .iter()
                .filter(|url| !attempted_this_run.contains(*url))
                .cloned()
                .collect();
            if batch.is_empty() {
                drained = scheduled.is_empty();
                break;
            }

            info!(size = batch.len(), "processing batch");
            let semaphore = Arc::new(Semaphore::new(self.scheduler_config.concurrency as usize));
            let mut remaining: VecDeque<String> = batch.iter().cloned().collect();
            let mut join_set = JoinSet::new();

            for url in batch {
                attempted_this_run.insert(url.clone());
                let storage = Arc::clone(&self.storage);
                let fetcher = Arc::clone(&self.fetcher);
                let pacer = Arc::clone(&self.pacer);
                let semaphore = Arc::clone(&semaphore);
                let shutdown = self.shutdown.clone();
                join_set.spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return (url, Ok(ItemOutcome::Skipped));
                    };
                    if *shutdown.borrow() {
                        return (url, Ok(ItemOutcome::Skipped));
                    }
                    let outcome = process_one(&storage, fetcher.as_ref(), &pacer, &url).await;
                    (url, outcome)
                });
            }

            while let Some(joined) = join_set.join_next().await {
                let Ok((url, outcome)) = joined else {
                    warn!("pipeline task panicked");
                    continue;
                };
                remaining.retain(|u| u != &url);
                match outcome {
                    Ok(ItemOutcome::Completed) => {
                        manager.record_completed();
                        processed += 1;
                    }
                    Ok(ItemOutcome::Failed) => {
                        manager.record_failed();
                        processed += 1;
                    }
                    Ok(ItemOutcome::Skipped) => continue,
                    Err(e) => {
                        error!(error = %e, "storage unavailable, aborting run");
                        join_set.abort_all();
                        // Last-gasp flush; the checkpoint may be stale if
                        // storage is truly gone.
                        let _ = manager.flush(&self.storage, remaining.into(), None).await;
                        return Err(e);
                    }
                }
                manager
                    .flush(&self.storage, remaining.iter().cloned().collect(), None)
                    .await?;

                if let Some(max) = max_pages {
                    if processed >= max {
                        info!(processed, "page limit reached");
                        break 'run;
                    }
                }
            }
        }

        if drained && !*self.shutdown.borrow() {
            manager.finish(&self.storage).await?;
            info!("frontier drained, checkpoint cleared");
        } else {
            manager.flush(&self.storage, Vec::new(), None).await?;
            info!("run stopped, checkpoint retained");
        }

        let counters = manager.counters();
        info!(
            attempted = counters.attempted,
            completed = counters.completed,
            failed = counters.failed,
            "run finished"
        );
        Ok(counters)
    }
}

/// One URL through the full cycle. Fetch and extraction failures are
/// recorded on the URL and absorbed; only storage errors propagate.
#[instrument(skip_all, fields(url = %url))]
async fn process_one<F: PageFetcher>(
    storage: &Storage,
    fetcher: &F,
    pacer: &Mutex<Pacer>,
    url: &str,
) -> Result<ItemOutcome> {
    storage.mark_in_progress(url).await?;
    pacer.lock().await.pause().await;

    let page = match fetcher.fetch(url).await {
        Ok(page) => page,
        Err(e) => {
            warn!(error = %e, "fetch failed");
            let reason = e.reason();
            storage.mark_failed(url, reason).await?;
            return Ok(ItemOutcome::Failed);
        }
    };

    match extract(&page) {
        Ok(extraction) => {
            let outcome = storage.upsert_product(&extraction.record).await?;
            if outcome == UpsertOutcome::KeptExisting {
                info!(
                    score = extraction.score,
                    "degraded extraction, stored record kept"
                );
            }
            storage.mark_completed(url).await?;
            Ok(ItemOutcome::Completed)
        }
        Err(e) => {
            warn!(error = %e, "extraction failed");
            let reason = e.reason();
            storage.mark_failed(url, reason).await?;
            Ok(ItemOutcome::Failed)
        }
    }
}
