//! Minimal sitemap XML parsing.
//!
//! Sitemaps are flat, machine-generated XML; `<loc>` entries are pulled out
//! with a regex rather than a full XML parser. Both urlset documents and
//! sitemap-index documents are supported.

use std::sync::LazyLock;

use regex::Regex;

static LOC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<loc>\s*([^<]+?)\s*</loc>").unwrap());

/// True when the document is a sitemap index pointing at child sitemaps.
pub fn is_sitemap_index(xml: &str) -> bool {
    xml.contains("<sitemapindex")
}

/// All `<loc>` values in document order, CDATA-unwrapped and trimmed.
pub fn extract_locs(xml: &str) -> Vec<String> {
    LOC_RE
        .captures_iter(xml)
        .map(|cap| unwrap_cdata(cap[1].trim()).to_string())
        .filter(|loc| !loc.is_empty())
        .collect()
}

/// Keep only product-page URLs, preserving order and dropping duplicates.
pub fn filter_products(locs: Vec<String>, product_path_filter: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    locs.into_iter()
        .filter(|loc| loc.contains(product_path_filter))
        .filter(|loc| seen.insert(loc.clone()))
        .collect()
}

fn unwrap_cdata(s: &str) -> &str {
    s.strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
        .unwrap_or(s)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    const URLSET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://shop.example.com/product/carrara-matte</loc></url>
  <url><loc> https://shop.example.com/product/slate-honed </loc></url>
  <url><loc>https://shop.example.com/about-us</loc></url>
  <url><loc>https://shop.example.com/product/carrara-matte</loc></url>
</urlset>"#;

    const INDEX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc>https://shop.example.com/sitemap-products-1.xml</loc></sitemap>
  <sitemap><loc>https://shop.example.com/sitemap-products-2.xml</loc></sitemap>
</sitemapindex>"#;

    #[test]
    fn extracts_locs_in_order() {
        let locs = extract_locs(URLSET);
        assert_eq!(locs.len(), 4);
        assert_eq!(locs[0], "https://shop.example.com/product/carrara-matte");
        // Whitespace trimmed
        assert_eq!(locs[1], "https://shop.example.com/product/slate-honed");
    }

    #[test]
    fn detects_sitemap_index() {
        assert!(is_sitemap_index(INDEX));
        assert!(!is_sitemap_index(URLSET));
        assert_eq!(extract_locs(INDEX).len(), 2);
    }

    #[test]
    fn product_filter_drops_non_products_and_duplicates() {
        let products = filter_products(extract_locs(URLSET), "/product/");
        assert_eq!(
            products,
            vec![
                "https://shop.example.com/product/carrara-matte".to_string(),
                "https://shop.example.com/product/slate-honed".to_string(),
            ]
        );
    }

    #[test]
    fn cdata_locs_unwrapped() {
        let xml = "<urlset><url><loc><![CDATA[https://shop.example.com/product/a]]></loc></url></urlset>";
        assert_eq!(
            extract_locs(xml),
            vec!["https://shop.example.com/product/a".to_string()]
        );
    }

    #[test]
    fn empty_document_yields_nothing() {
        assert!(extract_locs("<urlset></urlset>").is_empty());
    }
}
