//! Built-in adapter kinds.
//!
//! Manifests select one of these through their `adapter` field:
//!
//! - `json-api`: a JSON endpoint with configurable field paths
//! - `html`: a server-rendered listing parsed with CSS selectors
//! - `rendered`: a page rendered in the headless session and read by an
//!   extraction script

mod html;
mod json_api;
mod rendered;

use std::sync::Arc;

pub use html::{HtmlAdapter, HtmlSettings};
pub use json_api::{FieldMap, JsonApiAdapter, JsonApiSettings};
pub use rendered::{RenderedAdapter, RenderedSettings, ScriptBlock, ScriptSettings};

use crate::adapter::Adapter;
use crate::registry::AdapterKinds;

/// Kind table with `json-api`, `html` and `rendered` registered.
pub fn builtin_kinds() -> AdapterKinds {
    AdapterKinds::new()
        .with(JsonApiAdapter::KIND, |name, manifest, ctx| {
            Ok(Arc::new(JsonApiAdapter::from_manifest(name, manifest, ctx)?) as Arc<dyn Adapter>)
        })
        .with(HtmlAdapter::KIND, |name, manifest, ctx| {
            Ok(Arc::new(HtmlAdapter::from_manifest(name, manifest, ctx)?) as Arc<dyn Adapter>)
        })
        .with(RenderedAdapter::KIND, |name, manifest, ctx| {
            Ok(Arc::new(RenderedAdapter::from_manifest(name, manifest, ctx)?) as Arc<dyn Adapter>)
        })
}

/// Expands a manifest URL template.
///
/// `{base}` is the base URL without a trailing slash, `{query}` the
/// percent-encoded query, `{page}` the 1-based page and `{page0}` the
/// 0-based page.
pub fn expand_url(template: &str, base_url: Option<&str>, query: &str, page: u32) -> String {
    template
        .replace("{base}", base_url.unwrap_or_default().trim_end_matches('/'))
        .replace("{query}", &urlencoding::encode(query))
        .replace("{page0}", &page.saturating_sub(1).to_string())
        .replace("{page}", &page.to_string())
}

/// Expands `{base}` and `{id}` in chapter and page URL templates. The id is
/// inserted verbatim since sources often use paths as ids.
pub fn expand_item_url(template: &str, base_url: Option<&str>, id: &str) -> String {
    template
        .replace("{base}", base_url.unwrap_or_default().trim_end_matches('/'))
        .replace("{id}", id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_kinds_registered() {
        assert_eq!(builtin_kinds().names(), vec!["html", "json-api", "rendered"]);
    }

    #[test]
    fn test_expand_url() {
        let url = expand_url(
            "{base}/posts.json?tags={query}&page={page}&pid={page0}",
            Some("https://board.example/"),
            "blue sky",
            3,
        );
        assert_eq!(
            url,
            "https://board.example/posts.json?tags=blue%20sky&page=3&pid=2"
        );
    }

    #[test]
    fn test_expand_url_without_base() {
        assert_eq!(
            expand_url("https://x.example/?q={query}", None, "a&b", 1),
            "https://x.example/?q=a%26b"
        );
    }

    #[test]
    fn test_expand_item_url_keeps_path_ids() {
        assert_eq!(
            expand_item_url("{base}{id}", Some("https://manga.example"), "/title/42"),
            "https://manga.example/title/42"
        );
    }
}
