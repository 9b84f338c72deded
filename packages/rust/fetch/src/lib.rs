//! Page retrieval via the rendering service.
//!
//! Product pages on the target site are client-side rendered, so raw HTTP
//! GETs return empty shells. The [`RenderClient`] posts each URL to a
//! headless rendering endpoint and gets back the fully rendered HTML plus a
//! markdown rendition kept as the re-extraction snapshot.
//!
//! Two host-protection mechanisms live here as well: the [`Pacer`] enforces
//! the randomized inter-request delay with a hard floor, and the
//! [`ContentCheck`] rejects responses where the renderer silently served the
//! site homepage instead of the requested product page.

use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tilescout_shared::{FetchConfig, FetchError, RawPage, TileScoutError};
use tokio::time::Instant;
use tracing::{debug, instrument, trace};

// ---------------------------------------------------------------------------
// PageFetcher trait
// ---------------------------------------------------------------------------

/// A source of rendered pages. The pipeline is generic over this so tests
/// can substitute canned pages for the rendering service.
pub trait PageFetcher: Send + Sync {
    fn fetch(
        &self,
        url: &str,
    ) -> impl std::future::Future<Output = std::result::Result<RawPage, FetchError>> + Send;
}

// ---------------------------------------------------------------------------
// RenderClient
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct RenderRequest<'a> {
    url: &'a str,
    render_wait_hint_ms: u64,
}

#[derive(Debug, Deserialize)]
struct RenderResponse {
    html: String,
    #[serde(default)]
    markdown: String,
}

/// HTTP client for the rendering service.
pub struct RenderClient {
    http: reqwest::Client,
    endpoint: String,
    render_wait_hint_ms: u64,
    timeout_secs: u64,
    check: ContentCheck,
}

impl RenderClient {
    pub fn new(config: &FetchConfig) -> Result<Self, TileScoutError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TileScoutError::config(format!("http client: {e}")))?;

        Ok(Self {
            http,
            endpoint: config.render_endpoint.clone(),
            render_wait_hint_ms: config.render_wait_hint_ms,
            timeout_secs: config.timeout_secs,
            check: ContentCheck::new(config),
        })
    }
}

impl PageFetcher for RenderClient {
    #[instrument(skip_all, fields(url = %url))]
    async fn fetch(&self, url: &str) -> std::result::Result<RawPage, FetchError> {
        let request = RenderRequest {
            url,
            render_wait_hint_ms: self.render_wait_hint_ms,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout {
                        secs: self.timeout_secs,
                    }
                } else {
                    FetchError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http(format!("render service returned {status}")));
        }

        let body: RenderResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    secs: self.timeout_secs,
                }
            } else {
                FetchError::Http(format!("invalid render response: {e}"))
            }
        })?;

        self.check.verify(&body.html)?;

        debug!(bytes = body.html.len(), "page fetched");
        Ok(RawPage {
            url: url.to_string(),
            html: body.html,
            markdown: body.markdown,
            fetched_at: Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// ContentCheck
// ---------------------------------------------------------------------------

/// Rejects rendered pages that are not the requested product page.
///
/// The rendering service is known to occasionally return the site homepage
/// with a 200 status. A page passes when any product marker is present;
/// otherwise the homepage markers decide the error detail.
#[derive(Debug, Clone)]
pub struct ContentCheck {
    product_markers: Vec<String>,
    homepage_markers: Vec<String>,
}

impl ContentCheck {
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            product_markers: config.product_markers.clone(),
            homepage_markers: config.homepage_markers.clone(),
        }
    }

    pub fn verify(&self, html: &str) -> std::result::Result<(), FetchError> {
        if self.product_markers.iter().any(|m| html.contains(m)) {
            return Ok(());
        }
        if let Some(marker) = self.homepage_markers.iter().find(|m| html.contains(*m)) {
            return Err(FetchError::BadContent {
                detail: format!("homepage marker {marker:?} present"),
            });
        }
        Err(FetchError::BadContent {
            detail: "no product markers present".into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Pacer
// ---------------------------------------------------------------------------

/// Enforces the randomized inter-request delay.
///
/// Every request is preceded by a uniformly sampled delay from the
/// configured window. Regardless of the sample, consecutive requests are
/// kept at least `floor_delay_secs` apart.
pub struct Pacer {
    min: Duration,
    max: Duration,
    floor: Duration,
    last_request: Option<Instant>,
}

impl Pacer {
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            min: Duration::from_secs(config.min_delay_secs),
            max: Duration::from_secs(config.max_delay_secs),
            floor: Duration::from_secs(config.floor_delay_secs),
            last_request: None,
        }
    }

    /// Sleep for the sampled jitter (floor-adjusted), then stamp the request.
    pub async fn pause(&mut self) {
        let jitter = self.sample_jitter();
        let wait = delay_for(jitter, self.last_request.map(|t| t.elapsed()), self.floor);
        if !wait.is_zero() {
            trace!(wait_ms = wait.as_millis() as u64, "pacing delay");
            tokio::time::sleep(wait).await;
        }
        self.last_request = Some(Instant::now());
    }

    fn sample_jitter(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        if min >= max {
            return self.min;
        }
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}

/// Actual sleep before the next request: the jitter sample, extended when
/// the elapsed gap since the previous request would undercut the floor.
fn delay_for(jitter: Duration, elapsed_since_last: Option<Duration>, floor: Duration) -> Duration {
    match elapsed_since_last {
        None => jitter,
        Some(elapsed) => jitter.max(floor.saturating_sub(elapsed)),
    }
}
