//! Layer 2: the inline product-state blob.
//!
//! The site's frontend hydrates from `window.__PRODUCT_STATE__ = {...};`.
//! The blob is looser than the JSON-LD markup but carries the merchandising
//! detail JSON-LD lacks: the specification table, finish/color/dimensions,
//! resource links, and sibling color variations.

use serde_json::Value;
use tilescout_shared::{ColorVariation, ProductImage, ProductRecord, ResourceLink};

use crate::fill;

const STATE_MARKER: &str = "window.__PRODUCT_STATE__";

/// Apply the embedded state blob. Returns true when a blob was found and
/// parsed, whether or not it carried usable fields.
pub(crate) fn apply(html: &str, record: &mut ProductRecord) -> bool {
    let Some(state) = find_state_blob(html) else {
        return false;
    };
    let Ok(state) = serde_json::from_str::<Value>(&state) else {
        return false;
    };

    fill(&mut record.sku, str_field(&state, "sku"));
    fill(&mut record.title, str_field(&state, "title"));
    fill(&mut record.brand, str_field(&state, "brand"));
    fill(&mut record.finish, str_field(&state, "finish"));
    fill(&mut record.color, str_field(&state, "color"));
    fill(&mut record.dimensions, str_field(&state, "dimensions"));

    if let Some(Value::Object(specs)) = state.get("specifications") {
        for (label, value) in specs {
            if let Some(s) = value.as_str() {
                record.specifications.set(label, s);
            }
        }
    }

    if record.resources.is_empty() {
        if let Some(Value::Array(items)) = state.get("resources") {
            record.resources = items.iter().filter_map(resource_link).collect();
        }
    }

    if record.color_variations.is_empty() {
        let variations = state
            .get("colorVariations")
            .or_else(|| state.get("variations"));
        if let Some(Value::Array(items)) = variations {
            record.color_variations = items.iter().filter_map(color_variation).collect();
        }
    }

    if record.images.is_empty() {
        if let Some(Value::Array(items)) = state.get("images") {
            record.images = items
                .iter()
                .filter_map(Value::as_str)
                .map(|url| ProductImage {
                    url: url.to_string(),
                    variants: Default::default(),
                })
                .collect();
        }
    }

    true
}

/// Locate the state assignment and slice out its balanced-brace JSON object.
/// A regex can't pair the braces, so scan them directly, skipping string
/// literals.
fn find_state_blob(html: &str) -> Option<String> {
    let marker = html.find(STATE_MARKER)?;
    let rest = &html[marker..];
    let start = rest.find('{')?;
    let body = &rest[start..];

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(body[..=i].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn resource_link(item: &Value) -> Option<ResourceLink> {
    let url = str_field(item, "url")?;
    let kind = str_field(item, "kind")
        .or_else(|| str_field(item, "type"))
        .unwrap_or_else(|| "document".into());
    Some(ResourceLink {
        kind,
        url,
        label: str_field(item, "label"),
    })
}

fn color_variation(item: &Value) -> Option<ColorVariation> {
    Some(ColorVariation {
        sku: str_field(item, "sku")?,
        url: str_field(item, "url")?,
        color: str_field(item, "color"),
    })
}
