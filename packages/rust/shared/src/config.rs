//! Application configuration for TileScout.
//!
//! User config lives at `~/.tilescout/tilescout.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TileScoutError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "tilescout.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".tilescout";

// ---------------------------------------------------------------------------
// Config structs (matching tilescout.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Local database location.
    #[serde(default)]
    pub store: StoreConfig,

    /// Sitemap source and refresh policy.
    #[serde(default)]
    pub sitemap: SitemapConfig,

    /// Render-service fetch settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Frontier scheduling settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Quality gate thresholds.
    #[serde(default)]
    pub quality: QualityConfig,
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the libsql database file.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.tilescout/tilescout.db".into()
}

/// `[sitemap]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SitemapConfig {
    /// Sitemap (or sitemap index) URL for the target site.
    #[serde(default)]
    pub url: String,

    /// Only URLs containing this path fragment are treated as product pages.
    #[serde(default = "default_product_path_filter")]
    pub product_path_filter: String,

    /// Re-download the sitemap when the last refresh is older than this.
    #[serde(default = "default_sitemap_max_age_days")]
    pub max_age_days: u64,
}

impl Default for SitemapConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            product_path_filter: default_product_path_filter(),
            max_age_days: default_sitemap_max_age_days(),
        }
    }
}

fn default_product_path_filter() -> String {
    "/product/".into()
}
fn default_sitemap_max_age_days() -> u64 {
    7
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Render-service endpoint accepting `{url, render_wait_hint_ms}`.
    #[serde(default = "default_render_endpoint")]
    pub render_endpoint: String,

    /// Hint passed to the renderer for client-side code execution time.
    #[serde(default = "default_render_wait_hint_ms")]
    pub render_wait_hint_ms: u64,

    /// Wall-clock limit for a single page fetch.
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,

    /// Lower bound of the randomized pre-request delay window.
    #[serde(default = "default_min_delay_secs")]
    pub min_delay_secs: u64,

    /// Upper bound of the randomized pre-request delay window.
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,

    /// Hard inter-request floor, enforced regardless of jitter.
    #[serde(default = "default_floor_delay_secs")]
    pub floor_delay_secs: u64,

    /// Markers expected on a real product page (any one suffices).
    #[serde(default = "default_product_markers")]
    pub product_markers: Vec<String>,

    /// Markers identifying the generic landing page the render service is
    /// known to silently serve instead of the requested page.
    #[serde(default = "default_homepage_markers")]
    pub homepage_markers: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            render_endpoint: default_render_endpoint(),
            render_wait_hint_ms: default_render_wait_hint_ms(),
            timeout_secs: default_fetch_timeout_secs(),
            min_delay_secs: default_min_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            floor_delay_secs: default_floor_delay_secs(),
            product_markers: default_product_markers(),
            homepage_markers: default_homepage_markers(),
        }
    }
}

fn default_render_endpoint() -> String {
    "http://127.0.0.1:3000/render".into()
}
fn default_render_wait_hint_ms() -> u64 {
    5_000
}
fn default_fetch_timeout_secs() -> u64 {
    120
}
fn default_min_delay_secs() -> u64 {
    1
}
fn default_max_delay_secs() -> u64 {
    20
}
fn default_floor_delay_secs() -> u64 {
    3
}
fn default_product_markers() -> Vec<String> {
    vec!["application/ld+json".into(), "add-to-cart".into()]
}
fn default_homepage_markers() -> Vec<String> {
    vec!["hero-banner".into(), "Shop by Category".into()]
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// URLs requested from the frontier per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Concurrent fetch/extract/write pipelines within a batch.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Re-crawl completed URLs whose last success is older than this.
    /// Unset means completed URLs are never re-crawled (host policy).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recrawl_horizon_days: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            recrawl_horizon_days: None,
        }
    }
}

fn default_batch_size() -> u32 {
    25
}
fn default_concurrency() -> u32 {
    1
}

/// `[quality]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Number of recently written records to sample.
    #[serde(default = "default_quality_window")]
    pub window_size: u32,

    /// Only records updated within this many hours are sampled.
    #[serde(default = "default_quality_time_window_hours")]
    pub time_window_hours: u64,

    /// Minimum completeness score for a record to count as acceptable.
    #[serde(default = "default_min_fields")]
    pub min_fields: u32,

    /// Fraction of acceptable records at or above which the gate is Good.
    #[serde(default = "default_good_threshold")]
    pub good_threshold: f64,

    /// Fraction below which the gate is Critical.
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            window_size: default_quality_window(),
            time_window_hours: default_quality_time_window_hours(),
            min_fields: default_min_fields(),
            good_threshold: default_good_threshold(),
            warning_threshold: default_warning_threshold(),
        }
    }
}

fn default_quality_window() -> u32 {
    50
}
fn default_quality_time_window_hours() -> u64 {
    24
}
fn default_min_fields() -> u32 {
    10
}
fn default_good_threshold() -> f64 {
    0.8
}
fn default_warning_threshold() -> f64 {
    0.6
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.tilescout/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| TileScoutError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.tilescout/tilescout.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| TileScoutError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        TileScoutError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| TileScoutError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| TileScoutError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| TileScoutError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject configs that would misbehave at runtime.
fn validate(config: &AppConfig) -> Result<()> {
    let fetch = &config.fetch;
    if fetch.min_delay_secs > fetch.max_delay_secs {
        return Err(TileScoutError::config(format!(
            "fetch.min_delay_secs ({}) exceeds fetch.max_delay_secs ({})",
            fetch.min_delay_secs, fetch.max_delay_secs
        )));
    }
    if config.scheduler.batch_size == 0 {
        return Err(TileScoutError::config("scheduler.batch_size must be > 0"));
    }
    if config.scheduler.concurrency == 0 {
        return Err(TileScoutError::config("scheduler.concurrency must be > 0"));
    }
    let quality = &config.quality;
    if quality.warning_threshold > quality.good_threshold {
        return Err(TileScoutError::config(format!(
            "quality.warning_threshold ({}) exceeds quality.good_threshold ({})",
            quality.warning_threshold, quality.good_threshold
        )));
    }
    Ok(())
}

/// Expand a leading `~/` against the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("db_path"));
        assert!(toml_str.contains("render_endpoint"));
        assert!(toml_str.contains("max_age_days"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.sitemap.max_age_days, 7);
        assert_eq!(parsed.fetch.timeout_secs, 120);
        assert_eq!(parsed.fetch.floor_delay_secs, 3);
        assert_eq!(parsed.quality.min_fields, 10);
        assert!(parsed.scheduler.recrawl_horizon_days.is_none());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[sitemap]
url = "https://shop.example.com/sitemap.xml"

[scheduler]
batch_size = 10
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.sitemap.url, "https://shop.example.com/sitemap.xml");
        assert_eq!(config.scheduler.batch_size, 10);
        assert_eq!(config.scheduler.concurrency, 1);
        assert_eq!(config.fetch.min_delay_secs, 1);
        assert_eq!(config.fetch.max_delay_secs, 20);
    }

    #[test]
    fn inverted_delay_window_rejected() {
        let mut config = AppConfig::default();
        config.fetch.min_delay_secs = 30;
        config.fetch.max_delay_secs = 5;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn zero_batch_size_rejected() {
        let mut config = AppConfig::default();
        config.scheduler.batch_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn inverted_quality_thresholds_rejected() {
        let mut config = AppConfig::default();
        config.quality.warning_threshold = 0.9;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn expand_home_passthrough_for_absolute() {
        assert_eq!(
            expand_home("/var/lib/tilescout.db"),
            PathBuf::from("/var/lib/tilescout.db")
        );
    }
}
