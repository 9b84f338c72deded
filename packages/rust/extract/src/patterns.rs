//! Layer 3: text-pattern fallbacks.
//!
//! Older product templates put commercial data in free text instead of
//! structured markup. These regexes pick up coverage, alternate price
//! formats, and dimensions when the structured layers came up empty.

use std::sync::LazyLock;

use regex::Regex;
use tilescout_shared::ProductRecord;

static COVERAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*sq\.?\s*ft\.?\s*(?:per|/)\s*(?:carton|box|case)").unwrap()
});

static PRICE_PER_AREA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\$(\d+(?:,\d{3})*(?:\.\d+)?)\s*/\s*sq\.?\s*ft").unwrap());

static PRICE_EACH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\$(\d+(?:,\d{3})*(?:\.\d+)?)\s*(?:each|/\s*(?:piece|ea)\b)").unwrap()
});

static DIMENSIONS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b\d+(?:\.\d+)?\s*(?:in\.?|")?\s*[x×]\s*\d+(?:\.\d+)?\s*(?:in\.?|")"#)
        .unwrap()
});

/// Fill commercial fields the structured layers left empty.
pub(crate) fn apply(text: &str, record: &mut ProductRecord) {
    if record.coverage_per_container.is_none() {
        record.coverage_per_container = first_number(&COVERAGE_RE, text);
    }
    if record.price_per_unit_area.is_none() {
        record.price_per_unit_area = first_number(&PRICE_PER_AREA_RE, text);
    }
    if record.price_per_item.is_none() {
        record.price_per_item = first_number(&PRICE_EACH_RE, text);
    }
    if record.dimensions.is_none() {
        record.dimensions = DIMENSIONS_RE
            .find(text)
            .map(|m| m.as_str().trim().to_string());
    }
}

fn first_number(re: &Regex, text: &str) -> Option<f64> {
    re.captures(text)
        .and_then(|cap| cap[1].replace(',', "").parse().ok())
}
