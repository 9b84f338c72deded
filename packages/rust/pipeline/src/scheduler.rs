//! Frontier scheduling.
//!
//! Batch selection is a pure function over a frontier snapshot so ordering
//! is deterministic and testable without a database. Priority tiers:
//!
//! 1. Never-attempted `Pending` records, in sitemap order.
//! 2. `Failed` records, oldest attempt first, ties in sitemap order.
//! 3. `Completed` records past the optional re-crawl horizon.
//!
//! `removed` and `InProgress` records are never yielded.

use chrono::{DateTime, Duration, Utc};
use tilescout_shared::{UrlRecord, UrlStatus};

/// Select the next batch of URLs to process.
pub fn next_batch(
    records: &[UrlRecord],
    batch_size: usize,
    recrawl_horizon: Option<Duration>,
    now: DateTime<Utc>,
) -> Vec<String> {
    let eligible = records.iter().filter(|r| !r.removed);

    let mut fresh: Vec<&UrlRecord> = Vec::new();
    let mut retries: Vec<&UrlRecord> = Vec::new();
    let mut recrawls: Vec<&UrlRecord> = Vec::new();

    for record in eligible {
        match record.status {
            UrlStatus::Pending if record.attempt_count == 0 => fresh.push(record),
            UrlStatus::Pending | UrlStatus::InProgress => {}
            UrlStatus::Failed => retries.push(record),
            UrlStatus::Completed => {
                if let (Some(horizon), Some(success)) = (recrawl_horizon, record.last_success_at) {
                    if now - success > horizon {
                        recrawls.push(record);
                    }
                }
            }
        }
    }

    fresh.sort_by_key(|r| r.sitemap_position);
    retries.sort_by_key(|r| (r.last_attempt_at, r.sitemap_position));
    recrawls.sort_by_key(|r| (r.last_success_at, r.sitemap_position));

    fresh
        .into_iter()
        .chain(retries)
        .chain(recrawls)
        .take(batch_size)
        .map(|r| r.url.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilescout_shared::FailureReason;

    fn pending(url: &str, position: u64) -> UrlRecord {
        UrlRecord::pending(url, position)
    }

    fn failed(url: &str, position: u64, attempted_mins_ago: i64) -> UrlRecord {
        let mut record = UrlRecord::pending(url, position);
        record.status = UrlStatus::Failed;
        record.failure_reason = Some(FailureReason::Timeout);
        record.attempt_count = 1;
        record.last_attempt_at = Some(Utc::now() - Duration::minutes(attempted_mins_ago));
        record
    }

    fn completed(url: &str, position: u64, succeeded_days_ago: i64) -> UrlRecord {
        let mut record = UrlRecord::pending(url, position);
        record.status = UrlStatus::Completed;
        record.attempt_count = 1;
        record.last_success_at = Some(Utc::now() - Duration::days(succeeded_days_ago));
        record
    }

    #[test]
    fn fresh_urls_lead_in_sitemap_order() {
        let records = vec![
            failed("https://f", 1, 60),
            pending("https://c", 5),
            pending("https://a", 2),
        ];
        let batch = next_batch(&records, 10, None, Utc::now());
        assert_eq!(batch, vec!["https://a", "https://c", "https://f"]);
    }

    #[test]
    fn retries_order_by_oldest_attempt_then_position() {
        let records = vec![
            failed("https://recent", 1, 5),
            failed("https://old", 9, 120),
            failed("https://old-low-pos", 3, 120),
        ];
        let mut tied = records.clone();
        // Force an exact tie on last_attempt_at for the two old ones
        let ts = Some(Utc::now() - Duration::minutes(120));
        tied[1].last_attempt_at = ts;
        tied[2].last_attempt_at = ts;

        let batch = next_batch(&tied, 10, None, Utc::now());
        assert_eq!(
            batch,
            vec!["https://old-low-pos", "https://old", "https://recent"]
        );
    }

    #[test]
    fn completed_skipped_without_horizon() {
        let records = vec![completed("https://done", 1, 365), pending("https://new", 2)];
        let batch = next_batch(&records, 10, None, Utc::now());
        assert_eq!(batch, vec!["https://new"]);
    }

    #[test]
    fn completed_past_horizon_recrawled_last() {
        let records = vec![
            completed("https://stale", 1, 30),
            completed("https://fresh", 2, 1),
            pending("https://new", 3),
        ];
        let batch = next_batch(&records, 10, Some(Duration::days(14)), Utc::now());
        assert_eq!(batch, vec!["https://new", "https://stale"]);
    }

    #[test]
    fn removed_and_in_progress_never_yielded() {
        let mut gone = pending("https://gone", 1);
        gone.removed = true;
        let mut busy = pending("https://busy", 2);
        busy.status = UrlStatus::InProgress;
        let records = vec![gone, busy, pending("https://ok", 3)];

        let batch = next_batch(&records, 10, None, Utc::now());
        assert_eq!(batch, vec!["https://ok"]);
    }

    #[test]
    fn small_batch_is_fresh_urls_only() {
        let records = vec![
            pending("https://n1", 1),
            failed("https://f1", 2, 60),
            pending("https://n2", 3),
            failed("https://f2", 4, 30),
            completed("https://c1", 5, 2),
            pending("https://n3", 6),
        ];
        let batch = next_batch(&records, 3, None, Utc::now());
        assert_eq!(batch, vec!["https://n1", "https://n2", "https://n3"]);
    }

    #[test]
    fn batch_size_truncates() {
        let records: Vec<UrlRecord> = (1..=50)
            .map(|i| pending(&format!("https://p{i}"), i))
            .collect();
        let batch = next_batch(&records, 25, None, Utc::now());
        assert_eq!(batch.len(), 25);
        assert_eq!(batch[0], "https://p1");
        assert_eq!(batch[24], "https://p25");
    }

    #[test]
    fn ordering_is_stable_across_calls() {
        let records = vec![
            failed("https://x", 4, 30),
            pending("https://y", 1),
            failed("https://z", 2, 90),
        ];
        let now = Utc::now();
        let first = next_batch(&records, 10, None, now);
        let second = next_batch(&records, 10, None, now);
        assert_eq!(first, second);
    }
}
