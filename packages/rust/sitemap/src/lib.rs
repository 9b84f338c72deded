//! Sitemap acquisition and frontier seeding.
//!
//! The [`SitemapService`] downloads the target site's sitemap (following one
//! level of sitemap-index indirection), filters it down to product pages, and
//! reconciles the result against the stored URL history: new URLs are
//! appended as `Pending`, URLs that disappeared upstream are flagged removed,
//! and URLs that reappear are restored. History is never deleted.

pub mod parser;

use chrono::{Duration, Utc};
use tilescout_shared::{Result, SitemapConfig, TileScoutError};
use tilescout_storage::Storage;
use tracing::{info, instrument, warn};

/// What a sitemap reconciliation changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Product URLs present in the downloaded sitemap.
    pub discovered: u64,
    /// New URLs appended to the frontier.
    pub added: u64,
    /// Known URLs no longer present upstream.
    pub removed: u64,
    /// Previously removed URLs that reappeared.
    pub restored: u64,
}

/// Outcome of a staleness-gated refresh at run start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// The stored sitemap is within the max-age window; nothing downloaded.
    Fresh,
    /// The sitemap was re-downloaded and reconciled.
    Refreshed(IngestSummary),
    /// Download failed but stored URLs exist; the run continues on old data.
    Degraded,
}

/// Downloads and reconciles the target site's sitemap.
pub struct SitemapService {
    http: reqwest::Client,
    config: SitemapConfig,
}

impl SitemapService {
    pub fn new(config: SitemapConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| TileScoutError::config(format!("http client: {e}")))?;
        Ok(Self { http, config })
    }

    /// Download the configured sitemap and return product URLs in document
    /// order. Sitemap-index documents are followed one level deep.
    #[instrument(skip_all, fields(url = %self.config.url))]
    pub async fn download_product_urls(&self) -> Result<Vec<String>> {
        if self.config.url.is_empty() {
            return Err(TileScoutError::config("sitemap.url is not set"));
        }
        let body = self.get(&self.config.url).await?;

        let locs = if parser::is_sitemap_index(&body) {
            let children = parser::extract_locs(&body);
            info!(children = children.len(), "following sitemap index");
            let mut all = Vec::new();
            for child in children {
                let child_body = self.get(&child).await?;
                all.extend(parser::extract_locs(&child_body));
            }
            all
        } else {
            parser::extract_locs(&body)
        };

        Ok(parser::filter_products(
            locs,
            &self.config.product_path_filter,
        ))
    }

    /// Download and reconcile against stored URL history.
    #[instrument(skip_all)]
    pub async fn ingest(&self, storage: &Storage) -> Result<IngestSummary> {
        let present = self.download_product_urls().await?;
        let known = storage.known_urls().await?;
        let present_set: std::collections::HashSet<&str> =
            present.iter().map(String::as_str).collect();

        let mut summary = IngestSummary {
            discovered: present.len() as u64,
            ..Default::default()
        };

        // New URLs append after the highest existing position so earlier
        // ingests keep their ordering.
        let mut next_position = storage.max_sitemap_position().await? + 1;
        let mut new_urls = Vec::new();
        for url in &present {
            if !known.contains_key(url.as_str()) {
                new_urls.push((url.clone(), next_position));
                next_position += 1;
            }
        }
        summary.added = storage.insert_pending_urls(&new_urls).await?;

        for (url, was_removed) in &known {
            let upstream = present_set.contains(url.as_str());
            if upstream && *was_removed {
                storage.set_removed(url, false).await?;
                summary.restored += 1;
            } else if !upstream && !*was_removed {
                storage.set_removed(url, true).await?;
                summary.removed += 1;
            }
        }

        storage.record_sitemap_refresh(summary.discovered).await?;
        info!(
            discovered = summary.discovered,
            added = summary.added,
            removed = summary.removed,
            restored = summary.restored,
            "sitemap reconciled"
        );
        Ok(summary)
    }

    /// Refresh the sitemap when the stored copy is older than the configured
    /// max age. An unreachable sitemap only aborts when there is no stored
    /// URL history to fall back on.
    #[instrument(skip_all)]
    pub async fn refresh_if_stale(&self, storage: &Storage) -> Result<Freshness> {
        let max_age = Duration::days(self.config.max_age_days as i64);
        if let Some(last) = storage.sitemap_last_refreshed().await? {
            if Utc::now() - last <= max_age {
                return Ok(Freshness::Fresh);
            }
        }

        match self.ingest(storage).await {
            Ok(summary) => Ok(Freshness::Refreshed(summary)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                if storage.max_sitemap_position().await? > 0 {
                    warn!(error = %e, "sitemap refresh failed, continuing on stored URLs");
                    Ok(Freshness::Degraded)
                } else {
                    Err(TileScoutError::SitemapUnreachable(format!(
                        "no stored URLs and sitemap download failed: {e}"
                    )))
                }
            }
        }
    }

    async fn get(&self, url: &str) -> Result<String> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| TileScoutError::SitemapUnreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TileScoutError::SitemapUnreachable(format!(
                "{url} returned {}",
                response.status()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| TileScoutError::SitemapUnreachable(e.to_string()))
    }
}
