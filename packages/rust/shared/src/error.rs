//! Error types for TileScout.
//!
//! Library crates use [`TileScoutError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Fetch and extraction failures have their own enums because the scheduler
//! records them as categorized [`FailureReason`]s on the URL record; they are
//! recovered per-URL and never propagate out of a single processing cycle.
//! Storage failures are the one fatal class: the run loop stops pulling work
//! when it sees [`TileScoutError::Storage`].

use std::path::PathBuf;

use crate::types::FailureReason;

/// Top-level error type for all TileScout operations.
#[derive(Debug, thiserror::Error)]
pub enum TileScoutError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Page fetch failure (recovered locally per URL).
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Extraction failure (recovered locally per URL).
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Database or storage layer error. Fatal for the current run.
    #[error("storage error: {0}")]
    Storage(String),

    /// Sitemap source unreachable. Downgraded to a warning by the refresh
    /// policy; the last good snapshot keeps serving.
    #[error("sitemap unreachable: {0}")]
    SitemapUnreachable(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TileScoutError>;

impl TileScoutError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error must end the current run (storage-unavailable class).
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

// ---------------------------------------------------------------------------
// FetchError
// ---------------------------------------------------------------------------

/// A single page retrieval failure from the render service.
///
/// `BadContent` covers the known failure mode where the service returns a
/// generic landing page instead of the requested product page: the HTTP layer
/// succeeded but the content is semantically wrong.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The fetch did not complete within the wall-clock limit.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The fetched content is not the requested product page.
    #[error("bad content: {detail}")]
    BadContent { detail: String },

    /// Transport or HTTP-status failure.
    #[error("http error: {0}")]
    Http(String),
}

impl FetchError {
    /// Categorized reason recorded on the URL record.
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::Timeout { .. } => FailureReason::Timeout,
            Self::BadContent { .. } => FailureReason::BadContent,
            Self::Http(_) => FailureReason::HttpError,
        }
    }
}

// ---------------------------------------------------------------------------
// ExtractionError
// ---------------------------------------------------------------------------

/// Extraction chain failure, distinct from fetch failures so operators can
/// tell a content-fetch problem from an extraction-logic problem.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// The page carried no parseable structured markup and nothing matched.
    #[error("parse error: {0}")]
    Parse(String),

    /// The page parsed but the chain produced zero fields.
    #[error("empty extraction result")]
    Empty,
}

impl ExtractionError {
    /// Both variants surface as `parse_error` on the URL record.
    pub fn reason(&self) -> FailureReason {
        FailureReason::ParseError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = TileScoutError::config("missing render endpoint");
        assert_eq!(err.to_string(), "config error: missing render endpoint");

        let err = TileScoutError::Fetch(FetchError::Timeout { secs: 120 });
        assert_eq!(err.to_string(), "fetch error: timed out after 120s");
    }

    #[test]
    fn fetch_error_reasons() {
        assert_eq!(
            FetchError::Timeout { secs: 90 }.reason(),
            FailureReason::Timeout
        );
        assert_eq!(
            FetchError::BadContent {
                detail: "homepage marker".into()
            }
            .reason(),
            FailureReason::BadContent
        );
        assert_eq!(
            FetchError::Http("HTTP 503".into()).reason(),
            FailureReason::HttpError
        );
    }

    #[test]
    fn only_storage_is_fatal() {
        assert!(TileScoutError::Storage("db gone".into()).is_fatal());
        assert!(!TileScoutError::Fetch(FetchError::Http("500".into())).is_fatal());
        assert!(!TileScoutError::SitemapUnreachable("dns".into()).is_fatal());
    }

    #[test]
    fn extraction_errors_map_to_parse_reason() {
        assert_eq!(
            ExtractionError::Parse("no json-ld".into()).reason(),
            FailureReason::ParseError
        );
        assert_eq!(ExtractionError::Empty.reason(), FailureReason::ParseError);
    }
}
