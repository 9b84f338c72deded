//! SQL migration definitions for the TileScout database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed within a transaction.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: url_records, products, frontier_checkpoint, sitemap_meta",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Per-URL acquisition state. sitemap_position preserves the original
-- insertion order for deterministic scheduling.
CREATE TABLE IF NOT EXISTS url_records (
    url              TEXT PRIMARY KEY,
    status           TEXT NOT NULL DEFAULT 'pending',
    last_attempt_at  TEXT,
    last_success_at  TEXT,
    failure_reason   TEXT,
    attempt_count    INTEGER NOT NULL DEFAULT 0,
    sitemap_position INTEGER NOT NULL,
    removed          INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_url_records_status ON url_records(status);
CREATE INDEX IF NOT EXISTS idx_url_records_position ON url_records(sitemap_position);

-- Extracted products. Open structured fields are schema-flexible JSON
-- documents because attribute sets vary across product categories.
CREATE TABLE IF NOT EXISTS products (
    url                    TEXT PRIMARY KEY,
    sku                    TEXT,
    title                  TEXT,
    brand                  TEXT,
    price_per_unit_area    REAL,
    price_per_container    REAL,
    price_per_item         REAL,
    coverage_per_container REAL,
    finish                 TEXT,
    color                  TEXT,
    dimensions             TEXT,
    description            TEXT,
    specifications_json    TEXT NOT NULL DEFAULT '{}',
    images_json            TEXT NOT NULL DEFAULT '[]',
    resources_json         TEXT NOT NULL DEFAULT '[]',
    color_variations_json  TEXT NOT NULL DEFAULT '[]',
    raw_source_snapshot    TEXT,
    snapshot_hash          TEXT,
    completeness           INTEGER NOT NULL DEFAULT 0,
    first_seen_at          TEXT NOT NULL,
    last_updated_at        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_products_last_updated ON products(last_updated_at);

-- Durable frontier snapshot, single row, one writer.
CREATE TABLE IF NOT EXISTS frontier_checkpoint (
    id            INTEGER PRIMARY KEY CHECK (id = 1),
    pending_json  TEXT NOT NULL,
    in_flight_url TEXT,
    counters_json TEXT NOT NULL,
    written_at    TEXT NOT NULL
);

-- Sitemap freshness, single row.
CREATE TABLE IF NOT EXISTS sitemap_meta (
    id                INTEGER PRIMARY KEY CHECK (id = 1),
    last_refreshed_at TEXT NOT NULL,
    url_count         INTEGER NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
