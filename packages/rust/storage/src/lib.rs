//! libSQL storage layer for the acquisition pipeline.
//!
//! The [`Storage`] struct wraps a local libSQL database holding the two
//! logical tables of the relational-store boundary (URL status tracking and
//! product records) plus the frontier checkpoint row and sitemap freshness.
//!
//! **Access rules:**
//! - The run loop is the sole mutator of `url_records.status`.
//! - The checkpoint manager is the sole writer of `frontier_checkpoint`.
//! - Product upserts rely on the database's native conflict resolution, so
//!   multiple pipeline instances against the same store stay safe.

mod migrations;

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};

use tilescout_shared::{
    FailureReason, FrontierCheckpoint, ProductRecord, Result, RunCounters, StatusCounts,
    TileScoutError, UrlRecord, UrlStatus,
};

/// Outcome of a product upsert under the no-regression merge policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The new record's field values were written.
    Applied,
    /// The stored record scored higher; its fields were kept and only
    /// `last_updated_at` was bumped. Deliberately not an error.
    KeptExisting,
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TileScoutError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| TileScoutError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| TileScoutError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode (operator status queries).
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| TileScoutError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| TileScoutError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    TileScoutError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(TileScoutError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // URL record operations
    // -----------------------------------------------------------------------

    /// Insert URLs as `Pending` at the given sitemap positions, ignoring any
    /// already known. Returns the number actually inserted.
    pub async fn insert_pending_urls(&self, urls: &[(String, u64)]) -> Result<u64> {
        self.check_writable()?;
        let mut inserted = 0;
        for (url, position) in urls {
            let affected = self
                .conn
                .execute(
                    "INSERT OR IGNORE INTO url_records (url, sitemap_position)
                     VALUES (?1, ?2)",
                    params![url.as_str(), *position as i64],
                )
                .await
                .map_err(|e| TileScoutError::Storage(e.to_string()))?;
            inserted += affected;
        }
        Ok(inserted)
    }

    /// All known URLs with their removed flag (includes history).
    pub async fn known_urls(&self) -> Result<HashMap<String, bool>> {
        let mut rows = self
            .conn
            .query("SELECT url, removed FROM url_records", params![])
            .await
            .map_err(|e| TileScoutError::Storage(e.to_string()))?;

        let mut results = HashMap::new();
        while let Ok(Some(row)) = rows.next().await {
            let url: String = row
                .get(0)
                .map_err(|e| TileScoutError::Storage(e.to_string()))?;
            let removed: i64 = row
                .get(1)
                .map_err(|e| TileScoutError::Storage(e.to_string()))?;
            results.insert(url, removed != 0);
        }
        Ok(results)
    }

    /// Highest sitemap position assigned so far (0 when empty).
    pub async fn max_sitemap_position(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COALESCE(MAX(sitemap_position), 0) FROM url_records",
                params![],
            )
            .await
            .map_err(|e| TileScoutError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let max: i64 = row
                    .get(0)
                    .map_err(|e| TileScoutError::Storage(e.to_string()))?;
                Ok(max as u64)
            }
            _ => Ok(0),
        }
    }

    /// Flag or unflag a URL as removed from the upstream sitemap.
    pub async fn set_removed(&self, url: &str, removed: bool) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "UPDATE url_records SET removed = ?1 WHERE url = ?2",
                params![removed as i64, url],
            )
            .await
            .map_err(|e| TileScoutError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Transition a URL to `InProgress`, stamping the attempt.
    pub async fn mark_in_progress(&self, url: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE url_records
                 SET status = 'in_progress',
                     last_attempt_at = ?1,
                     attempt_count = attempt_count + 1
                 WHERE url = ?2",
                params![now.as_str(), url],
            )
            .await
            .map_err(|e| TileScoutError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Transition a URL to `Completed`, clearing any failure reason.
    pub async fn mark_completed(&self, url: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE url_records
                 SET status = 'completed',
                     last_success_at = ?1,
                     failure_reason = NULL
                 WHERE url = ?2",
                params![now.as_str(), url],
            )
            .await
            .map_err(|e| TileScoutError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Transition a URL to `Failed` with a categorized reason.
    pub async fn mark_failed(&self, url: &str, reason: FailureReason) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "UPDATE url_records SET status = 'failed', failure_reason = ?1 WHERE url = ?2",
                params![reason.as_str(), url],
            )
            .await
            .map_err(|e| TileScoutError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Crash recovery: flip every `InProgress` record to `Failed`.
    ///
    /// No silent resume mid-fetch; the prior reason (if any) is preserved.
    /// Returns the number of records recovered.
    pub async fn fail_interrupted(&self) -> Result<u64> {
        self.check_writable()?;
        let affected = self
            .conn
            .execute(
                "UPDATE url_records SET status = 'failed' WHERE status = 'in_progress'",
                params![],
            )
            .await
            .map_err(|e| TileScoutError::Storage(e.to_string()))?;
        Ok(affected)
    }

    /// Full frontier snapshot in sitemap order, for the scheduler.
    pub async fn url_snapshot(&self) -> Result<Vec<UrlRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT url, status, last_attempt_at, last_success_at, failure_reason,
                        attempt_count, sitemap_position, removed
                 FROM url_records
                 ORDER BY sitemap_position",
                params![],
            )
            .await
            .map_err(|e| TileScoutError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_url_record(&row)?);
        }
        Ok(results)
    }

    /// Operator-facing counts. `total` excludes removed URLs.
    pub async fn status_counts(&self) -> Result<StatusCounts> {
        let mut rows = self
            .conn
            .query(
                "SELECT status, removed, COUNT(*) FROM url_records GROUP BY status, removed",
                params![],
            )
            .await
            .map_err(|e| TileScoutError::Storage(e.to_string()))?;

        let mut counts = StatusCounts::default();
        while let Ok(Some(row)) = rows.next().await {
            let status: String = row
                .get(0)
                .map_err(|e| TileScoutError::Storage(e.to_string()))?;
            let removed: i64 = row
                .get(1)
                .map_err(|e| TileScoutError::Storage(e.to_string()))?;
            let count: i64 = row
                .get(2)
                .map_err(|e| TileScoutError::Storage(e.to_string()))?;
            let count = count as u64;

            if removed != 0 {
                counts.removed += count;
                continue;
            }
            counts.total += count;
            match status.parse::<UrlStatus>() {
                Ok(UrlStatus::Pending) => counts.pending += count,
                Ok(UrlStatus::InProgress) => counts.in_progress += count,
                Ok(UrlStatus::Completed) => counts.completed += count,
                Ok(UrlStatus::Failed) => counts.failed += count,
                Err(e) => return Err(TileScoutError::Storage(e)),
            }
        }
        Ok(counts)
    }

    // -----------------------------------------------------------------------
    // Product operations
    // -----------------------------------------------------------------------

    /// Upsert a product under the no-regression merge policy.
    ///
    /// On conflict the new field values win only when the new completeness
    /// score is >= the stored score; otherwise stored fields are kept.
    /// `last_updated_at` is always bumped so operators can see "we tried but
    /// didn't improve". The whole merge is a single atomic statement.
    pub async fn upsert_product(&self, record: &ProductRecord) -> Result<UpsertOutcome> {
        self.check_writable()?;
        let score = record.completeness() as i64;
        let now = Utc::now().to_rfc3339();

        let specifications_json = serde_json::to_string(&record.specifications)
            .map_err(|e| TileScoutError::Storage(format!("specifications encode: {e}")))?;
        let images_json = serde_json::to_string(&record.images)
            .map_err(|e| TileScoutError::Storage(format!("images encode: {e}")))?;
        let resources_json = serde_json::to_string(&record.resources)
            .map_err(|e| TileScoutError::Storage(format!("resources encode: {e}")))?;
        let variations_json = serde_json::to_string(&record.color_variations)
            .map_err(|e| TileScoutError::Storage(format!("variations encode: {e}")))?;
        let snapshot_hash = record.raw_source_snapshot.as_deref().map(content_hash);

        self.conn
            .execute(
                "INSERT INTO products (
                     url, sku, title, brand,
                     price_per_unit_area, price_per_container, price_per_item,
                     coverage_per_container,
                     finish, color, dimensions, description,
                     specifications_json, images_json, resources_json, color_variations_json,
                     raw_source_snapshot, snapshot_hash, completeness, first_seen_at, last_updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?20)
                 ON CONFLICT(url) DO UPDATE SET
                   sku = CASE WHEN excluded.completeness >= products.completeness THEN excluded.sku ELSE products.sku END,
                   title = CASE WHEN excluded.completeness >= products.completeness THEN excluded.title ELSE products.title END,
                   brand = CASE WHEN excluded.completeness >= products.completeness THEN excluded.brand ELSE products.brand END,
                   price_per_unit_area = CASE WHEN excluded.completeness >= products.completeness THEN excluded.price_per_unit_area ELSE products.price_per_unit_area END,
                   price_per_container = CASE WHEN excluded.completeness >= products.completeness THEN excluded.price_per_container ELSE products.price_per_container END,
                   price_per_item = CASE WHEN excluded.completeness >= products.completeness THEN excluded.price_per_item ELSE products.price_per_item END,
                   coverage_per_container = CASE WHEN excluded.completeness >= products.completeness THEN excluded.coverage_per_container ELSE products.coverage_per_container END,
                   finish = CASE WHEN excluded.completeness >= products.completeness THEN excluded.finish ELSE products.finish END,
                   color = CASE WHEN excluded.completeness >= products.completeness THEN excluded.color ELSE products.color END,
                   dimensions = CASE WHEN excluded.completeness >= products.completeness THEN excluded.dimensions ELSE products.dimensions END,
                   description = CASE WHEN excluded.completeness >= products.completeness THEN excluded.description ELSE products.description END,
                   specifications_json = CASE WHEN excluded.completeness >= products.completeness THEN excluded.specifications_json ELSE products.specifications_json END,
                   images_json = CASE WHEN excluded.completeness >= products.completeness THEN excluded.images_json ELSE products.images_json END,
                   resources_json = CASE WHEN excluded.completeness >= products.completeness THEN excluded.resources_json ELSE products.resources_json END,
                   color_variations_json = CASE WHEN excluded.completeness >= products.completeness THEN excluded.color_variations_json ELSE products.color_variations_json END,
                   raw_source_snapshot = CASE WHEN excluded.completeness >= products.completeness THEN excluded.raw_source_snapshot ELSE products.raw_source_snapshot END,
                   snapshot_hash = CASE WHEN excluded.completeness >= products.completeness THEN excluded.snapshot_hash ELSE products.snapshot_hash END,
                   completeness = CASE WHEN excluded.completeness >= products.completeness THEN excluded.completeness ELSE products.completeness END,
                   last_updated_at = excluded.last_updated_at",
                params![
                    record.url.as_str(),
                    record.sku.as_deref(),
                    record.title.as_deref(),
                    record.brand.as_deref(),
                    record.price_per_unit_area,
                    record.price_per_container,
                    record.price_per_item,
                    record.coverage_per_container,
                    record.finish.as_deref(),
                    record.color.as_deref(),
                    record.dimensions.as_deref(),
                    record.description.as_deref(),
                    specifications_json.as_str(),
                    images_json.as_str(),
                    resources_json.as_str(),
                    variations_json.as_str(),
                    record.raw_source_snapshot.as_deref(),
                    snapshot_hash.as_deref(),
                    score,
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| TileScoutError::Storage(e.to_string()))?;

        // Equal scores apply the new record, so only a strictly higher stored
        // score means the merge kept the old one.
        let stored_score = self.product_completeness(&record.url).await?.unwrap_or(0);
        if stored_score as i64 > score {
            Ok(UpsertOutcome::KeptExisting)
        } else {
            Ok(UpsertOutcome::Applied)
        }
    }

    /// Stored completeness score for a product, if present.
    pub async fn product_completeness(&self, url: &str) -> Result<Option<u32>> {
        let mut rows = self
            .conn
            .query(
                "SELECT completeness FROM products WHERE url = ?1",
                params![url],
            )
            .await
            .map_err(|e| TileScoutError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let score: i64 = row
                    .get(0)
                    .map_err(|e| TileScoutError::Storage(e.to_string()))?;
                Ok(Some(score as u32))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(TileScoutError::Storage(e.to_string())),
        }
    }

    /// Get a product by URL.
    pub async fn get_product(&self, url: &str) -> Result<Option<ProductRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT url, sku, title, brand,
                        price_per_unit_area, price_per_container, price_per_item,
                        coverage_per_container,
                        finish, color, dimensions, description,
                        specifications_json, images_json, resources_json, color_variations_json,
                        raw_source_snapshot, first_seen_at, last_updated_at
                 FROM products WHERE url = ?1",
                params![url],
            )
            .await
            .map_err(|e| TileScoutError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_product(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(TileScoutError::Storage(e.to_string())),
        }
    }

    /// Completeness scores of the most recently written products, newest
    /// first, restricted to writes at or after `since`. Feeds the quality gate.
    pub async fn recent_completeness(
        &self,
        limit: u32,
        since: DateTime<Utc>,
    ) -> Result<Vec<(String, u32)>> {
        let since = since.to_rfc3339();
        let mut rows = self
            .conn
            .query(
                "SELECT url, completeness FROM products
                 WHERE last_updated_at >= ?1
                 ORDER BY last_updated_at DESC
                 LIMIT ?2",
                params![since.as_str(), limit as i64],
            )
            .await
            .map_err(|e| TileScoutError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let url: String = row
                .get(0)
                .map_err(|e| TileScoutError::Storage(e.to_string()))?;
            let score: i64 = row
                .get(1)
                .map_err(|e| TileScoutError::Storage(e.to_string()))?;
            results.push((url, score as u32));
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Checkpoint operations
    // -----------------------------------------------------------------------

    /// Write (replace) the single frontier checkpoint row.
    pub async fn write_checkpoint(&self, checkpoint: &FrontierCheckpoint) -> Result<()> {
        self.check_writable()?;
        let pending_json = serde_json::to_string(&checkpoint.pending)
            .map_err(|e| TileScoutError::Storage(format!("checkpoint encode: {e}")))?;
        let counters_json = serde_json::to_string(&checkpoint.counters)
            .map_err(|e| TileScoutError::Storage(format!("checkpoint encode: {e}")))?;
        let written_at = checkpoint.written_at.to_rfc3339();

        self.conn
            .execute(
                "INSERT INTO frontier_checkpoint (id, pending_json, in_flight_url, counters_json, written_at)
                 VALUES (1, ?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                   pending_json = excluded.pending_json,
                   in_flight_url = excluded.in_flight_url,
                   counters_json = excluded.counters_json,
                   written_at = excluded.written_at",
                params![
                    pending_json.as_str(),
                    checkpoint.in_flight.as_deref(),
                    counters_json.as_str(),
                    written_at.as_str(),
                ],
            )
            .await
            .map_err(|e| TileScoutError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Read the checkpoint row, if one exists.
    pub async fn read_checkpoint(&self) -> Result<Option<FrontierCheckpoint>> {
        let mut rows = self
            .conn
            .query(
                "SELECT pending_json, in_flight_url, counters_json, written_at
                 FROM frontier_checkpoint WHERE id = 1",
                params![],
            )
            .await
            .map_err(|e| TileScoutError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let pending_json: String = row
                    .get(0)
                    .map_err(|e| TileScoutError::Storage(e.to_string()))?;
                let in_flight: Option<String> = row.get::<String>(1).ok();
                let counters_json: String = row
                    .get(2)
                    .map_err(|e| TileScoutError::Storage(e.to_string()))?;
                let written_at: String = row
                    .get(3)
                    .map_err(|e| TileScoutError::Storage(e.to_string()))?;

                let pending: Vec<String> = serde_json::from_str(&pending_json)
                    .map_err(|e| TileScoutError::Storage(format!("checkpoint decode: {e}")))?;
                let counters: RunCounters = serde_json::from_str(&counters_json)
                    .map_err(|e| TileScoutError::Storage(format!("checkpoint decode: {e}")))?;

                Ok(Some(FrontierCheckpoint {
                    pending,
                    in_flight,
                    counters,
                    written_at: parse_ts(&written_at)?,
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(TileScoutError::Storage(e.to_string())),
        }
    }

    /// Drop the checkpoint row (run finished cleanly).
    pub async fn clear_checkpoint(&self) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute("DELETE FROM frontier_checkpoint WHERE id = 1", params![])
            .await
            .map_err(|e| TileScoutError::Storage(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Sitemap freshness
    // -----------------------------------------------------------------------

    /// When the sitemap was last successfully downloaded, if ever.
    pub async fn sitemap_last_refreshed(&self) -> Result<Option<DateTime<Utc>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT last_refreshed_at FROM sitemap_meta WHERE id = 1",
                params![],
            )
            .await
            .map_err(|e| TileScoutError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let ts: String = row
                    .get(0)
                    .map_err(|e| TileScoutError::Storage(e.to_string()))?;
                Ok(Some(parse_ts(&ts)?))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(TileScoutError::Storage(e.to_string())),
        }
    }

    /// Record a successful sitemap refresh.
    pub async fn record_sitemap_refresh(&self, url_count: u64) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO sitemap_meta (id, last_refreshed_at, url_count)
                 VALUES (1, ?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET
                   last_refreshed_at = excluded.last_refreshed_at,
                   url_count = excluded.url_count",
                params![now.as_str(), url_count as i64],
            )
            .await
            .map_err(|e| TileScoutError::Storage(e.to_string()))?;
        Ok(())
    }
}

/// Hex-encoded SHA-256 of a snapshot body, for cheap change detection.
fn content_hash(content: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Row readers
// ---------------------------------------------------------------------------

/// Parse an rfc3339 TEXT column.
fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TileScoutError::Storage(format!("invalid date: {e}")))
}

/// Convert a database row to a [`UrlRecord`].
fn row_to_url_record(row: &libsql::Row) -> Result<UrlRecord> {
    let status: String = row
        .get(1)
        .map_err(|e| TileScoutError::Storage(e.to_string()))?;
    let failure_reason: Option<String> = row.get::<String>(4).ok();

    Ok(UrlRecord {
        url: row
            .get::<String>(0)
            .map_err(|e| TileScoutError::Storage(e.to_string()))?,
        status: status.parse().map_err(TileScoutError::Storage)?,
        last_attempt_at: row
            .get::<String>(2)
            .ok()
            .map(|s| parse_ts(&s))
            .transpose()?,
        last_success_at: row
            .get::<String>(3)
            .ok()
            .map(|s| parse_ts(&s))
            .transpose()?,
        failure_reason: failure_reason
            .map(|s| s.parse::<FailureReason>().map_err(TileScoutError::Storage))
            .transpose()?,
        attempt_count: row
            .get::<i64>(5)
            .map_err(|e| TileScoutError::Storage(e.to_string()))? as u32,
        sitemap_position: row
            .get::<i64>(6)
            .map_err(|e| TileScoutError::Storage(e.to_string()))? as u64,
        removed: row
            .get::<i64>(7)
            .map_err(|e| TileScoutError::Storage(e.to_string()))?
            != 0,
    })
}

/// Convert a database row to a [`ProductRecord`].
fn row_to_product(row: &libsql::Row) -> Result<ProductRecord> {
    let specifications_json: String = row
        .get(12)
        .map_err(|e| TileScoutError::Storage(e.to_string()))?;
    let images_json: String = row
        .get(13)
        .map_err(|e| TileScoutError::Storage(e.to_string()))?;
    let resources_json: String = row
        .get(14)
        .map_err(|e| TileScoutError::Storage(e.to_string()))?;
    let variations_json: String = row
        .get(15)
        .map_err(|e| TileScoutError::Storage(e.to_string()))?;

    Ok(ProductRecord {
        url: row
            .get::<String>(0)
            .map_err(|e| TileScoutError::Storage(e.to_string()))?,
        sku: row.get::<String>(1).ok(),
        title: row.get::<String>(2).ok(),
        brand: row.get::<String>(3).ok(),
        price_per_unit_area: row.get::<f64>(4).ok(),
        price_per_container: row.get::<f64>(5).ok(),
        price_per_item: row.get::<f64>(6).ok(),
        coverage_per_container: row.get::<f64>(7).ok(),
        finish: row.get::<String>(8).ok(),
        color: row.get::<String>(9).ok(),
        dimensions: row.get::<String>(10).ok(),
        description: row.get::<String>(11).ok(),
        specifications: serde_json::from_str(&specifications_json)
            .map_err(|e| TileScoutError::Storage(format!("specifications decode: {e}")))?,
        images: serde_json::from_str(&images_json)
            .map_err(|e| TileScoutError::Storage(format!("images decode: {e}")))?,
        resources: serde_json::from_str(&resources_json)
            .map_err(|e| TileScoutError::Storage(format!("resources decode: {e}")))?,
        color_variations: serde_json::from_str(&variations_json)
            .map_err(|e| TileScoutError::Storage(format!("variations decode: {e}")))?,
        raw_source_snapshot: row.get::<String>(16).ok(),
        first_seen_at: row
            .get::<String>(17)
            .ok()
            .map(|s| parse_ts(&s))
            .transpose()?,
        last_updated_at: row
            .get::<String>(18)
            .ok()
            .map(|s| parse_ts(&s))
            .transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tilescout_shared::{ColorVariation, ProductImage};
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("ts_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn product(url: &str) -> ProductRecord {
        ProductRecord::new(url)
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("ts_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn pending_insert_ignores_known_urls() {
        let storage = test_storage().await;
        let urls = vec![
            ("https://shop.example.com/product/a".to_string(), 1),
            ("https://shop.example.com/product/b".to_string(), 2),
        ];
        assert_eq!(storage.insert_pending_urls(&urls).await.unwrap(), 2);
        // Second ingest of the same URLs inserts nothing
        assert_eq!(storage.insert_pending_urls(&urls).await.unwrap(), 0);
        assert_eq!(storage.max_sitemap_position().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn url_status_lifecycle() {
        let storage = test_storage().await;
        let url = "https://shop.example.com/product/a";
        storage
            .insert_pending_urls(&[(url.to_string(), 1)])
            .await
            .unwrap();

        storage.mark_in_progress(url).await.unwrap();
        let snapshot = storage.url_snapshot().await.unwrap();
        assert_eq!(snapshot[0].status, UrlStatus::InProgress);
        assert_eq!(snapshot[0].attempt_count, 1);
        assert!(snapshot[0].last_attempt_at.is_some());

        storage
            .mark_failed(url, FailureReason::Timeout)
            .await
            .unwrap();
        let snapshot = storage.url_snapshot().await.unwrap();
        assert_eq!(snapshot[0].status, UrlStatus::Failed);
        assert_eq!(snapshot[0].failure_reason, Some(FailureReason::Timeout));

        storage.mark_in_progress(url).await.unwrap();
        storage.mark_completed(url).await.unwrap();
        let snapshot = storage.url_snapshot().await.unwrap();
        assert_eq!(snapshot[0].status, UrlStatus::Completed);
        assert_eq!(snapshot[0].attempt_count, 2);
        assert!(snapshot[0].failure_reason.is_none());
        assert!(snapshot[0].last_success_at.is_some());
    }

    #[tokio::test]
    async fn interrupted_records_fail_on_recovery() {
        let storage = test_storage().await;
        for (i, url) in ["https://a", "https://b", "https://c"].iter().enumerate() {
            storage
                .insert_pending_urls(&[(url.to_string(), i as u64 + 1)])
                .await
                .unwrap();
        }
        storage.mark_in_progress("https://a").await.unwrap();
        storage.mark_in_progress("https://b").await.unwrap();

        let recovered = storage.fail_interrupted().await.unwrap();
        assert_eq!(recovered, 2);

        let snapshot = storage.url_snapshot().await.unwrap();
        assert!(
            snapshot
                .iter()
                .all(|r| r.status != UrlStatus::InProgress)
        );
        assert_eq!(
            snapshot
                .iter()
                .filter(|r| r.status == UrlStatus::Failed)
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn status_counts_exclude_removed() {
        let storage = test_storage().await;
        for (i, url) in ["https://a", "https://b", "https://c"].iter().enumerate() {
            storage
                .insert_pending_urls(&[(url.to_string(), i as u64 + 1)])
                .await
                .unwrap();
        }
        storage.mark_in_progress("https://a").await.unwrap();
        storage.mark_completed("https://a").await.unwrap();
        storage.set_removed("https://c", true).await.unwrap();

        let counts = storage.status_counts().await.unwrap();
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.removed, 1);
        assert_eq!(counts.total, 2);
    }

    #[tokio::test]
    async fn upsert_inserts_and_reads_back() {
        let storage = test_storage().await;
        let mut record = product("https://shop.example.com/product/a");
        record.sku = Some("TL-1001".into());
        record.title = Some("Carrara Matte 12x24".into());
        record.price_per_unit_area = Some(3.49);
        record.specifications.material = Some("Porcelain".into());
        record.images.push(ProductImage {
            url: "https://cdn.example.com/a.jpg".into(),
            variants: Default::default(),
        });
        record.color_variations.push(ColorVariation {
            sku: "TL-1002".into(),
            url: "https://shop.example.com/product/b".into(),
            color: Some("Slate".into()),
        });

        let outcome = storage.upsert_product(&record).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Applied);

        let found = storage
            .get_product(&record.url)
            .await
            .unwrap()
            .expect("product stored");
        assert_eq!(found.sku.as_deref(), Some("TL-1001"));
        assert_eq!(found.price_per_unit_area, Some(3.49));
        assert_eq!(found.specifications.material.as_deref(), Some("Porcelain"));
        assert_eq!(found.images.len(), 1);
        assert_eq!(found.color_variations[0].sku, "TL-1002");
        assert!(found.first_seen_at.is_some());
        assert!(found.last_updated_at.is_some());
    }

    #[tokio::test]
    async fn degraded_upsert_keeps_stored_fields() {
        let storage = test_storage().await;
        let url = "https://shop.example.com/product/a";

        let mut rich = product(url);
        rich.sku = Some("TL-1001".into());
        rich.title = Some("Carrara Matte".into());
        rich.brand = Some("StoneWorks".into());
        rich.finish = Some("Matte".into());
        assert_eq!(
            storage.upsert_product(&rich).await.unwrap(),
            UpsertOutcome::Applied
        );
        let first = storage.get_product(url).await.unwrap().unwrap();

        // A later degraded extraction must not clobber the good record.
        let mut degraded = product(url);
        degraded.title = Some("Carrara".into());
        assert_eq!(
            storage.upsert_product(&degraded).await.unwrap(),
            UpsertOutcome::KeptExisting
        );

        let second = storage.get_product(url).await.unwrap().unwrap();
        assert_eq!(second.sku.as_deref(), Some("TL-1001"));
        assert_eq!(second.title.as_deref(), Some("Carrara Matte"));
        assert_eq!(second.brand.as_deref(), Some("StoneWorks"));
        assert_eq!(second.finish.as_deref(), Some("Matte"));
        assert_eq!(
            storage.product_completeness(url).await.unwrap(),
            Some(rich.completeness())
        );
        // "We tried but didn't improve" is still visible.
        assert!(second.last_updated_at > first.last_updated_at);
        assert_eq!(second.first_seen_at, first.first_seen_at);
    }

    #[tokio::test]
    async fn equal_score_upsert_applies_new_values() {
        let storage = test_storage().await;
        let url = "https://shop.example.com/product/a";

        let mut old = product(url);
        old.title = Some("Old Title".into());
        storage.upsert_product(&old).await.unwrap();

        let mut new = product(url);
        new.title = Some("New Title".into());
        assert_eq!(
            storage.upsert_product(&new).await.unwrap(),
            UpsertOutcome::Applied
        );
        let found = storage.get_product(url).await.unwrap().unwrap();
        assert_eq!(found.title.as_deref(), Some("New Title"));
    }

    #[tokio::test]
    async fn recent_completeness_orders_and_limits() {
        let storage = test_storage().await;
        for i in 0..5 {
            let mut record = product(&format!("https://shop.example.com/product/{i}"));
            record.sku = Some(format!("TL-{i}"));
            if i % 2 == 0 {
                record.title = Some("t".into());
            }
            storage.upsert_product(&record).await.unwrap();
        }

        let since = Utc::now() - Duration::hours(1);
        let rows = storage.recent_completeness(3, since).await.unwrap();
        assert_eq!(rows.len(), 3);
        // Newest first
        assert_eq!(rows[0].0, "https://shop.example.com/product/4");

        let none = storage
            .recent_completeness(10, Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn checkpoint_roundtrip_and_clear() {
        let storage = test_storage().await;
        assert!(storage.read_checkpoint().await.unwrap().is_none());

        let checkpoint = FrontierCheckpoint {
            pending: vec!["https://a".into(), "https://b".into()],
            in_flight: Some("https://c".into()),
            counters: RunCounters {
                attempted: 3,
                completed: 2,
                failed: 1,
            },
            written_at: Utc::now(),
        };
        storage.write_checkpoint(&checkpoint).await.unwrap();

        let read = storage.read_checkpoint().await.unwrap().expect("row");
        assert_eq!(read.pending, checkpoint.pending);
        assert_eq!(read.in_flight.as_deref(), Some("https://c"));
        assert_eq!(read.counters, checkpoint.counters);

        // Overwrite keeps a single row
        let later = FrontierCheckpoint {
            pending: vec!["https://b".into()],
            in_flight: None,
            counters: RunCounters {
                attempted: 4,
                completed: 3,
                failed: 1,
            },
            written_at: Utc::now(),
        };
        storage.write_checkpoint(&later).await.unwrap();
        let read = storage.read_checkpoint().await.unwrap().expect("row");
        assert_eq!(read.pending.len(), 1);
        assert!(read.in_flight.is_none());

        storage.clear_checkpoint().await.unwrap();
        assert!(storage.read_checkpoint().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sitemap_refresh_tracking() {
        let storage = test_storage().await;
        assert!(storage.sitemap_last_refreshed().await.unwrap().is_none());

        storage.record_sitemap_refresh(1234).await.unwrap();
        let ts = storage
            .sitemap_last_refreshed()
            .await
            .unwrap()
            .expect("refreshed");
        assert!(Utc::now() - ts < Duration::minutes(1));
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("ts_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.insert_pending_urls(&[("https://a".to_string(), 1)])
            .await
            .unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        let result = ro.mark_in_progress("https://a").await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));

        // Reads still work
        assert_eq!(ro.url_snapshot().await.unwrap().len(), 1);
    }
}
