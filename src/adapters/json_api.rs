//! JSON API adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::expand_url;
use crate::adapter::{Adapter, AdapterContext, RawSearchPage};
use crate::discovery::AdapterManifest;
use crate::{Result, SearchError};

/// Settings of a `json-api` manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonApiSettings {
    /// URL template, see [`super::expand_url`].
    pub search_url: String,
    /// Dot path to the result array. The body itself when unset.
    #[serde(default)]
    pub results_path: Option<String>,
    #[serde(default)]
    pub fields: FieldMap,
    /// Results per full page. A shorter page means there is no next page.
    #[serde(default)]
    pub page_size: Option<usize>,
}

/// Dot paths from a source item to the normalized keys.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldMap {
    #[serde(default = "default_id")]
    pub id: String,
    #[serde(default = "default_image")]
    pub image: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub sample: Option<String>,
    #[serde(default)]
    pub full: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
}

fn default_id() -> String {
    "id".to_string()
}

fn default_image() -> String {
    "image".to_string()
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            id: default_id(),
            image: default_image(),
            thumbnail: None,
            sample: None,
            full: None,
            tags: None,
        }
    }
}

/// Adapter for sources with a JSON search endpoint.
pub struct JsonApiAdapter {
    name: String,
    base_url: Option<String>,
    content_type: Option<String>,
    settings: JsonApiSettings,
    client: Client,
}

impl JsonApiAdapter {
    /// Manifest kind.
    pub const KIND: &'static str = "json-api";

    /// Builds the adapter from its manifest.
    pub fn from_manifest(name: &str, manifest: &AdapterManifest, ctx: &AdapterContext) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            base_url: manifest.base_url.clone(),
            content_type: manifest.content_type.clone(),
            settings: manifest.settings()?,
            client: ctx.http.clone(),
        })
    }

    fn search_url(&self, query: &str, page: u32) -> String {
        expand_url(&self.settings.search_url, self.base_url.as_deref(), query, page)
    }

    fn extract_page(&self, body: &Value) -> Result<RawSearchPage> {
        let items = match self.settings.results_path.as_deref() {
            Some(path) => lookup(body, path),
            None => Some(body),
        }
        .and_then(Value::as_array)
        .ok_or_else(|| {
            SearchError::Parse(format!(
                "{}: no result array at '{}'",
                self.name,
                self.settings.results_path.as_deref().unwrap_or_default()
            ))
        })?;

        let results: Vec<Value> = items
            .iter()
            .map(|item| map_item(item, &self.settings.fields))
            .collect();

        let has_next_page = match self.settings.page_size {
            Some(size) => items.len() >= size,
            None => !items.is_empty(),
        };

        Ok(RawSearchPage::new(results, has_next_page))
    }
}

#[async_trait]
impl Adapter for JsonApiAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    async fn fetch_search_result(&self, query: &str, page: u32) -> Result<RawSearchPage> {
        let url = self.search_url(query, page);
        debug!("{}: GET {}", self.name, url);

        let response = self.client.get(&url).send().await?.error_for_status()?;
        let body: Value = response.json().await?;

        self.extract_page(&body)
    }
}

/// Follows a dot path through objects and arrays. Numeric segments index
/// arrays.
fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

/// Rewrites a source item into the keys the normalizer reads.
fn map_item(item: &Value, fields: &FieldMap) -> Value {
    let mut out = Map::new();
    let mut copy = |key: &str, path: Option<&str>| {
        if let Some(value) = path.and_then(|p| lookup(item, p)) {
            if !value.is_null() {
                out.insert(key.to_string(), value.clone());
            }
        }
    };
    copy("id", Some(&fields.id));
    copy("image", Some(&fields.image));
    copy("thumbnail", fields.thumbnail.as_deref());
    copy("sample", fields.sample.as_deref());
    copy("full", fields.full.as_deref());
    copy("tags", fields.tags.as_deref());
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::scrape::ScrapeExecutor;
    use crate::session::SessionPool;
    use serde_json::json;
    use std::sync::Arc;

    fn context() -> AdapterContext {
        let pool = Arc::new(SessionPool::unavailable());
        AdapterContext::new(Client::new(), Arc::new(ScrapeExecutor::new(pool)))
    }

    fn adapter(manifest: Value) -> JsonApiAdapter {
        let manifest: AdapterManifest = serde_json::from_value(manifest).unwrap();
        JsonApiAdapter::from_manifest("Board", &manifest, &context()).unwrap()
    }

    fn booru() -> JsonApiAdapter {
        adapter(json!({
            "adapter": "json-api",
            "base_url": "https://board.example",
            "type": "image-board",
            "search_url": "{base}/posts.json?tags={query}&page={page}&limit=2",
            "results_path": "data.posts",
            "page_size": 2,
            "fields": {
                "id": "id",
                "image": "preview.url",
                "sample": "sample_url",
                "full": "file_url",
                "tags": "tag_string"
            }
        }))
    }

    #[test]
    fn test_from_manifest() {
        let adapter = booru();
        assert_eq!(adapter.name(), "Board");
        assert_eq!(adapter.base_url(), Some("https://board.example"));
        assert_eq!(adapter.content_type(), Some("image-board"));
        assert_eq!(
            adapter.search_url("cat ears", 2),
            "https://board.example/posts.json?tags=cat%20ears&page=2&limit=2"
        );
    }

    #[test]
    fn test_from_manifest_requires_search_url() {
        let manifest: AdapterManifest = serde_json::from_value(json!({"adapter": "json-api"})).unwrap();
        assert!(JsonApiAdapter::from_manifest("Board", &manifest, &context()).is_err());
    }

    #[test]
    fn test_extract_page_maps_fields() {
        let body = json!({
            "data": {
                "posts": [
                    {"id": 7, "preview": {"url": "7s.jpg"}, "sample_url": "7m.jpg",
                     "file_url": "7.png", "tag_string": "cat solo"},
                    {"id": 8, "preview": {"url": "8s.jpg"}, "file_url": null}
                ]
            }
        });
        let page = booru().extract_page(&body).unwrap();
        assert!(page.has_next_page);
        assert_eq!(page.results[0]["image"], json!("7s.jpg"));
        assert_eq!(page.results[0]["tags"], json!("cat solo"));
        assert!(page.results[1].get("full").is_none());

        let result = normalize(&page);
        assert_eq!(result.items.len(), 2);
        assert_eq!(result.items[0].id, "7");
        assert_eq!(result.items[0].display_url, "7m.jpg");
        assert_eq!(result.items[0].tags, vec!["cat", "solo"]);
    }

    #[test]
    fn test_short_page_has_no_next() {
        let body = json!({"data": {"posts": [{"id": 1, "preview": {"url": "1.jpg"}}]}});
        assert!(!booru().extract_page(&body).unwrap().has_next_page);
    }

    #[test]
    fn test_missing_results_path_is_parse_error() {
        let err = booru().extract_page(&json!({"error": "rate limited"})).unwrap_err();
        assert!(matches!(err, SearchError::Parse(_)));
    }

    #[test]
    fn test_top_level_array_without_page_size() {
        let adapter = adapter(json!({
            "adapter": "json-api",
            "search_url": "https://x.example/?q={query}"
        }));
        let page = adapter.extract_page(&json!([{"id": "a", "image": "a.jpg"}])).unwrap();
        assert!(page.has_next_page);
        assert!(!adapter.extract_page(&json!([])).unwrap().has_next_page);
    }

    #[test]
    fn test_lookup_indexes_arrays() {
        let value = json!({"a": [{"b": 1}, {"b": 2}]});
        assert_eq!(lookup(&value, "a.1.b"), Some(&json!(2)));
        assert_eq!(lookup(&value, "a.x"), None);
    }

    #[tokio::test]
    #[ignore]
    async fn test_fetch_live_json_api() {
        let adapter = adapter(json!({
            "adapter": "json-api",
            "base_url": "https://danbooru.donmai.us",
            "search_url": "{base}/posts.json?tags={query}&page={page}&limit=20",
            "page_size": 20,
            "fields": {"image": "preview_file_url", "full": "file_url", "tags": "tag_string"}
        }));
        let page = adapter.fetch_search_result("landscape", 1).await.unwrap();
        assert!(!page.results.is_empty());
    }
}
