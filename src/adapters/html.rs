//! Server-rendered HTML listing adapter.

use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use super::expand_url;
use crate::adapter::{Adapter, AdapterContext, RawSearchPage};
use crate::discovery::AdapterManifest;
use crate::{Result, SearchError};

/// Settings of an `html` manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct HtmlSettings {
    /// URL template, see [`super::expand_url`].
    pub search_url: String,
    /// Selects one element per result.
    pub item_selector: String,
    /// Attribute on the item element holding its id.
    #[serde(default = "default_id_attr")]
    pub id_attr: String,
    /// Image element inside the item. The item itself when unset.
    #[serde(default)]
    pub image_selector: Option<String>,
    #[serde(default = "default_image_attr")]
    pub image_attr: String,
    /// Attribute on the image element with whitespace-separated tags.
    #[serde(default)]
    pub tags_attr: Option<String>,
    /// Present on pages that have a successor.
    #[serde(default)]
    pub next_selector: Option<String>,
}

fn default_id_attr() -> String {
    "id".to_string()
}

fn default_image_attr() -> String {
    "src".to_string()
}

/// Adapter for sources whose listing pages are plain HTML.
pub struct HtmlAdapter {
    name: String,
    base_url: Option<String>,
    content_type: Option<String>,
    settings: HtmlSettings,
    client: Client,
}

impl HtmlAdapter {
    /// Manifest kind.
    pub const KIND: &'static str = "html";

    /// Builds the adapter from its manifest. Selectors are validated here so
    /// a typo surfaces as a load error.
    pub fn from_manifest(name: &str, manifest: &AdapterManifest, ctx: &AdapterContext) -> Result<Self> {
        let settings: HtmlSettings = manifest.settings()?;
        parse_selector(&settings.item_selector)?;
        if let Some(ref selector) = settings.image_selector {
            parse_selector(selector)?;
        }
        if let Some(ref selector) = settings.next_selector {
            parse_selector(selector)?;
        }

        Ok(Self {
            name: name.to_string(),
            base_url: manifest.base_url.clone(),
            content_type: manifest.content_type.clone(),
            settings,
            client: ctx.http.clone(),
        })
    }

    fn parse_results(&self, html: &str, page_url: &Url) -> Result<RawSearchPage> {
        let document = Html::parse_document(html);
        let item_selector = parse_selector(&self.settings.item_selector)?;
        let image_selector = self
            .settings
            .image_selector
            .as_deref()
            .map(parse_selector)
            .transpose()?;

        let mut results = Vec::new();
        for element in document.select(&item_selector) {
            let image_elem = match image_selector {
                Some(ref selector) => element.select(selector).next(),
                None => Some(element),
            };
            if let Some(item) = self.item_json(element, image_elem, page_url) {
                results.push(item);
            }
        }

        let has_next_page = match self.settings.next_selector {
            Some(ref selector) => document.select(&parse_selector(selector)?).next().is_some(),
            None => !results.is_empty(),
        };

        Ok(RawSearchPage::new(results, has_next_page))
    }

    fn item_json(&self, item: ElementRef, image: Option<ElementRef>, page_url: &Url) -> Option<Value> {
        let id = item.value().attr(&self.settings.id_attr)?.trim();
        let image = image?;
        let src = image.value().attr(&self.settings.image_attr)?.trim();
        if id.is_empty() || src.is_empty() {
            return None;
        }
        let src = page_url
            .join(src)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| src.to_string());

        let tags = self
            .settings
            .tags_attr
            .as_deref()
            .and_then(|attr| image.value().attr(attr))
            .unwrap_or_default();

        Some(json!({ "id": id, "image": src, "tags": tags }))
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| SearchError::Parse(format!("Failed to parse selector '{}': {:?}", selector, e)))
}

#[async_trait]
impl Adapter for HtmlAdapter {
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
        let url = Url::parse(&expand_url(
            &self.settings.search_url,
            self.base_url.as_deref(),
            query,
            page,
        ))?;
        debug!("{}: GET {}", self.name, url);

        let response = self.client.get(url.clone()).send().await?.error_for_status()?;
        let html = response.text().await?;

        self.parse_results(&html, &url)
    }
}
