//! Layer 4: computed fields.
//!
//! Nothing here reads new page data except the swatch fallback; the layer
//! mostly closes gaps arithmetically from what earlier layers found.

use scraper::{Html, Selector};
use tilescout_shared::{ColorVariation, ProductRecord};

/// Width presets the CDN serves via its `w` query parameter.
const IMAGE_VARIANTS: [(&str, u32); 3] = [("thumb", 200), ("medium", 800), ("large", 1600)];

pub(crate) fn apply(html: &Html, record: &mut ProductRecord) {
    derive_prices(record);
    derive_image_variants(record);
    if record.color_variations.is_empty() {
        record.color_variations = swatch_variations(html);
    }
}

/// Unit price and container price are convertible through coverage.
fn derive_prices(record: &mut ProductRecord) {
    let Some(coverage) = record.coverage_per_container else {
        return;
    };
    if coverage <= 0.0 {
        return;
    }
    match (record.price_per_unit_area, record.price_per_container) {
        (Some(unit), None) => record.price_per_container = Some(round_cents(unit * coverage)),
        (None, Some(container)) => {
            record.price_per_unit_area = Some(round_cents(container / coverage));
        }
        _ => {}
    }
}

/// The CDN exposes sized renditions of every base image through a width
/// parameter, so the variant map is derivable from the base URL alone.
fn derive_image_variants(record: &mut ProductRecord) {
    for image in &mut record.images {
        if !image.variants.is_empty() {
            continue;
        }
        let separator = if image.url.contains('?') { '&' } else { '?' };
        for (name, width) in IMAGE_VARIANTS {
            image
                .variants
                .insert(name.to_string(), format!("{}{separator}w={width}", image.url));
        }
    }
}

/// Sibling colors rendered as swatch anchors on the page.
fn swatch_variations(html: &Html) -> Vec<ColorVariation> {
    let selector = Selector::parse("a.color-swatch[data-sku][href]")
        .unwrap_or_else(|_| unreachable!("static selector"));

    html.select(&selector)
        .filter_map(|el| {
            let sku = el.value().attr("data-sku")?.trim();
            let url = el.value().attr("href")?.trim();
            if sku.is_empty() || url.is_empty() {
                return None;
            }
            Some(ColorVariation {
                sku: sku.to_string(),
                url: url.to_string(),
                color: el
                    .value()
                    .attr("data-color")
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(String::from),
            })
        })
        .collect()
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
