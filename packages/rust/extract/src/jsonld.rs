//! Layer 1: JSON-LD structured data.
//!
//! Most product pages on the target site carry a `schema.org/Product` object
//! in a `script[type="application/ld+json"]` tag. This is the richest and
//! most stable source, so it runs first.

use scraper::{Html, Selector};
use serde_json::Value;
use tilescout_shared::{ProductImage, ProductRecord};
use tracing::trace;

use crate::fill;

/// Apply JSON-LD Product data to the record. Returns true when at least one
/// parseable Product object was found, whether or not it carried fields.
pub(crate) fn apply(html: &Html, record: &mut ProductRecord) -> bool {
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#)
        .unwrap_or_else(|_| unreachable!("static selector"));

    let mut found_product = false;
    for script in html.select(&selector) {
        let raw: String = script.text().collect();
        let Ok(value) = serde_json::from_str::<Value>(&raw) else {
            trace!("skipping malformed ld+json block");
            continue;
        };
        for product in product_objects(&value) {
            found_product = true;
            apply_product(product, record);
        }
    }
    found_product
}

/// Collect every `@type: Product` object, looking through top-level arrays
/// and `@graph` containers.
fn product_objects(value: &Value) -> Vec<&Value> {
    let mut out = Vec::new();
    collect_products(value, &mut out);
    out
}

fn collect_products<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_products(item, out);
            }
        }
        Value::Object(map) => {
            if is_product(value) {
                out.push(value);
            }
            if let Some(graph) = map.get("@graph") {
                collect_products(graph, out);
            }
        }
        _ => {}
    }
}

fn is_product(value: &Value) -> bool {
    match value.get("@type") {
        Some(Value::String(t)) => t == "Product",
        Some(Value::Array(ts)) => ts.iter().any(|t| t.as_str() == Some("Product")),
        _ => false,
    }
}

fn apply_product(product: &Value, record: &mut ProductRecord) {
    fill(&mut record.title, str_field(product, "name"));
    fill(&mut record.sku, str_field(product, "sku"));
    fill(&mut record.description, str_field(product, "description"));

    // brand is either a plain string or a nested {name} object
    let brand = match product.get("brand") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Object(o)) => o.get("name").and_then(Value::as_str).map(String::from),
        _ => None,
    };
    fill(&mut record.brand, brand);

    if let Some(offers) = product.get("offers") {
        // offers can be a single Offer or an array; take the first price
        let offer = match offers {
            Value::Array(items) => items.first(),
            other => Some(other),
        };
        if let Some(offer) = offer {
            let price = price_field(offer, "price").or_else(|| price_field(offer, "lowPrice"));
            // The site lists its offer price per unit area.
            fill(&mut record.price_per_unit_area, price);
        }
    }

    if record.images.is_empty() {
        let images: Vec<ProductImage> = match product.get("image") {
            Some(Value::String(url)) => vec![image(url)],
            Some(Value::Array(urls)) => urls
                .iter()
                .filter_map(Value::as_str)
                .map(image)
                .collect(),
            _ => Vec::new(),
        };
        record.images = images;
    }
}

fn image(url: &str) -> ProductImage {
    ProductImage {
        url: url.to_string(),
        variants: Default::default(),
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// schema.org prices appear as both numbers and strings.
fn price_field(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_start_matches('$').parse().ok(),
        _ => None,
    }
}
