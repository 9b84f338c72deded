//! Core domain types for the TileScout acquisition pipeline.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of fields in the full target schema that the completeness score
/// is counted against. See [`ProductRecord::completeness`].
pub const TARGET_FIELD_COUNT: u32 = 20;

// ---------------------------------------------------------------------------
// UrlStatus / FailureReason
// ---------------------------------------------------------------------------

/// Acquisition status of a single target URL. Exactly one at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl UrlStatus {
    /// Column value stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for UrlStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UrlStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown url status: {other}")),
        }
    }
}

/// Categorized failure reason recorded alongside a `Failed` status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    BadContent,
    ParseError,
    HttpError,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::BadContent => "bad_content",
            Self::ParseError => "parse_error",
            Self::HttpError => "http_error",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FailureReason {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "timeout" => Ok(Self::Timeout),
            "bad_content" => Ok(Self::BadContent),
            "parse_error" => Ok(Self::ParseError),
            "http_error" => Ok(Self::HttpError),
            other => Err(format!("unknown failure reason: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// UrlRecord
// ---------------------------------------------------------------------------

/// Per-URL acquisition state, one row per target URL.
///
/// `sitemap_position` is the original sitemap insertion order; the scheduler
/// uses it for stable, reproducible tie-breaking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlRecord {
    pub url: String,
    pub status: UrlStatus,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<FailureReason>,
    pub attempt_count: u32,
    pub sitemap_position: u64,
    /// No longer present upstream; excluded from scheduling, kept in history.
    pub removed: bool,
}

impl UrlRecord {
    /// A fresh `Pending` record at the given sitemap position.
    pub fn pending(url: impl Into<String>, sitemap_position: u64) -> Self {
        Self {
            url: url.into(),
            status: UrlStatus::Pending,
            last_attempt_at: None,
            last_success_at: None,
            failure_reason: None,
            attempt_count: 0,
            sitemap_position,
            removed: false,
        }
    }
}

// ---------------------------------------------------------------------------
// RawPage
// ---------------------------------------------------------------------------

/// A successfully fetched, rendered page from the page-fetching service.
#[derive(Debug, Clone)]
pub struct RawPage {
    /// The requested product URL.
    pub url: String,
    /// Rendered HTML.
    pub html: String,
    /// Markdown rendition of the same page, retained as the re-extraction
    /// snapshot.
    pub markdown: String,
    pub fetched_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ProductRecord and structured sub-documents
// ---------------------------------------------------------------------------

/// Open key-value specification document.
///
/// Known keys get typed fields; anything unanticipated lands in `extra` so
/// heterogeneous category attributes are never dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Specifications {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thickness: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shade_variation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pei_rating: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    /// Unrecognized specification rows, keyed by their on-page label.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Specifications {
    pub fn is_empty(&self) -> bool {
        self.material.is_none()
            && self.weight.is_none()
            && self.origin.is_none()
            && self.thickness.is_none()
            && self.edge_type.is_none()
            && self.shade_variation.is_none()
            && self.pei_rating.is_none()
            && self.application.is_none()
            && self.extra.is_empty()
    }

    /// Set a specification by its on-page label, routing known labels to
    /// typed fields and the rest to `extra`.
    pub fn set(&mut self, label: &str, value: impl Into<String>) {
        let value = value.into();
        let normalized = label.trim().to_lowercase().replace([' ', '-'], "_");
        let slot = match normalized.as_str() {
            "material" => &mut self.material,
            "weight" => &mut self.weight,
            "origin" | "country_of_origin" => &mut self.origin,
            "thickness" => &mut self.thickness,
            "edge_type" | "edge" => &mut self.edge_type,
            "shade_variation" => &mut self.shade_variation,
            "pei_rating" | "pei" => &mut self.pei_rating,
            "application" | "applications" => &mut self.application,
            _ => {
                self.extra
                    .entry(label.trim().to_string())
                    .or_insert_with(|| serde_json::Value::String(value));
                return;
            }
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }
}

/// A product image with its size-variant map (variant name → URL).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductImage {
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variants: BTreeMap<String, String>,
}

/// A typed resource link (installation guide, spec sheet, warranty, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLink {
    pub kind: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A sibling color variant of the same product line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorVariation {
    pub sku: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// One extracted product, keyed by `url`, upserted on every successful
/// extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductRecord {
    pub url: String,

    // Core identity
    pub sku: Option<String>,
    pub title: Option<String>,
    pub brand: Option<String>,

    // Commercial
    pub price_per_unit_area: Option<f64>,
    pub price_per_container: Option<f64>,
    pub price_per_item: Option<f64>,
    pub coverage_per_container: Option<f64>,

    // Descriptive
    pub finish: Option<String>,
    pub color: Option<String>,
    pub dimensions: Option<String>,
    pub description: Option<String>,

    // Structured
    #[serde(default)]
    pub specifications: Specifications,
    #[serde(default)]
    pub images: Vec<ProductImage>,
    #[serde(default)]
    pub resources: Vec<ResourceLink>,
    #[serde(default)]
    pub color_variations: Vec<ColorVariation>,

    // Provenance
    pub raw_source_snapshot: Option<String>,
    pub first_seen_at: Option<DateTime<Utc>>,
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl ProductRecord {
    /// An empty record for the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Count of populated fields out of [`TARGET_FIELD_COUNT`].
    ///
    /// The schema counts the eleven scalar product fields, the three
    /// structured collections, and six known specification keys. Provenance
    /// fields and the `extra` bucket are not scored.
    pub fn completeness(&self) -> u32 {
        let scalars = [
            self.sku.is_some(),
            self.title.is_some(),
            self.brand.is_some(),
            self.price_per_unit_area.is_some(),
            self.price_per_container.is_some(),
            self.price_per_item.is_some(),
            self.coverage_per_container.is_some(),
            self.finish.is_some(),
            self.color.is_some(),
            self.dimensions.is_some(),
            self.description.is_some(),
        ];
        let collections = [
            !self.images.is_empty(),
            !self.resources.is_empty(),
            !self.color_variations.is_empty(),
        ];
        let specs = [
            self.specifications.material.is_some(),
            self.specifications.weight.is_some(),
            self.specifications.origin.is_some(),
            self.specifications.thickness.is_some(),
            self.specifications.edge_type.is_some(),
            self.specifications.application.is_some(),
        ];
        scalars
            .iter()
            .chain(collections.iter())
            .chain(specs.iter())
            .filter(|b| **b)
            .count() as u32
    }
}

// ---------------------------------------------------------------------------
// FrontierCheckpoint
// ---------------------------------------------------------------------------

/// Counters carried across checkpoint writes within (and across) runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub attempted: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Durable snapshot of frontier + progress state.
///
/// Written after every completed/failed item by the checkpoint manager (its
/// sole writer), read once at process start, then superseded by live state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierCheckpoint {
    /// Remaining queue, in scheduler order.
    pub pending: Vec<String>,
    /// URL being processed when the snapshot was taken, if any.
    pub in_flight: Option<String>,
    pub counters: RunCounters,
    pub written_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// StatusCounts
// ---------------------------------------------------------------------------

/// Operator-facing frontier counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub failed: u64,
    pub removed: u64,
    pub total: u64,
}
