//! Shared types, error model, and configuration for TileScout.
//!
//! This crate is the foundation depended on by all other TileScout crates.
//! It provides:
//! - [`TileScoutError`] — the unified error type, plus the fetch/extraction
//!   failure taxonomy ([`FetchError`], [`ExtractionError`])
//! - Domain types ([`UrlRecord`], [`ProductRecord`], [`FrontierCheckpoint`])
//! - Configuration ([`AppConfig`], runtime configs, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, FetchConfig, QualityConfig, SchedulerConfig, SitemapConfig, StoreConfig,
    config_dir, config_file_path, expand_home, init_config, load_config, load_config_from,
};
pub use error::{ExtractionError, FetchError, Result, TileScoutError};
pub use types::{
    ColorVariation, FailureReason, FrontierCheckpoint, ProductImage, ProductRecord, RawPage,
    ResourceLink, RunCounters, Specifications, StatusCounts, TARGET_FIELD_COUNT, UrlRecord,
    UrlStatus,
};
