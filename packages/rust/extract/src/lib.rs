//! Layered product extraction.
//!
//! Product pages on the target site span several template generations, so no
//! single selector set covers them. [`extract`] runs a fixed chain of layers
//! over a rendered page, each filling only the fields earlier layers left
//! empty:
//!
//! 1. [`jsonld`] — schema.org Product markup (richest, most stable)
//! 2. [`embedded`] — the frontend's inline state blob
//! 3. [`patterns`] — regex fallbacks over page text
//! 4. [`derived`] — arithmetic and URL-derived fields
//!
//! A degraded page never loses data it had on a previous crawl; the writer's
//! merge policy handles that downstream. Here the only hard failure is a
//! chain that produces nothing at all.

mod derived;
mod embedded;
mod jsonld;
mod patterns;

use scraper::Html;
use tilescout_shared::{ExtractionError, ProductRecord, RawPage};
use tracing::{debug, instrument};

/// A successfully extracted product with its completeness score.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub record: ProductRecord,
    pub score: u32,
}

/// Run the extraction chain over a rendered page.
///
/// Errors: [`ExtractionError::Parse`] when the page carried no parseable
/// structured markup and no pattern matched; [`ExtractionError::Empty`] when
/// structured markup parsed but yielded zero fields.
#[instrument(skip_all, fields(url = %page.url))]
pub fn extract(page: &RawPage) -> Result<Extraction, ExtractionError> {
    let document = Html::parse_document(&page.html);
    let mut record = ProductRecord::new(&page.url);

    let had_jsonld = jsonld::apply(&document, &mut record);
    let had_blob = embedded::apply(&page.html, &mut record);
    patterns::apply(&page.html, &mut record);
    derived::apply(&document, &mut record);

    let score = record.completeness();
    if score == 0 {
        return if had_jsonld || had_blob {
            Err(ExtractionError::Empty)
        } else {
            Err(ExtractionError::Parse(
                "no structured markup and no pattern matched".into(),
            ))
        };
    }

    record.raw_source_snapshot = Some(if page.markdown.is_empty() {
        page.html.clone()
    } else {
        page.markdown.clone()
    });

    debug!(score, "extraction complete");
    Ok(Extraction { record, score })
}

/// Set `slot` only when it is still empty. Layer priority is expressed
/// entirely through this.
pub(crate) fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}
