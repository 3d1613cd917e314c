//! Adapter for sources that need a real browser.
//!
//! Pages are loaded in the shared headless session and read by extraction
//! functions written in JavaScript. The search function receives
//! `(query, page)` and returns `{results, hasNextPage}`. The optional
//! chapter and page functions receive the id they were called with.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{expand_item_url, expand_url};
use crate::adapter::{Adapter, AdapterContext, ChapterListing, PageRef, RawSearchPage};
use crate::discovery::AdapterManifest;
use crate::scrape::{ScrapeExecutor, ScrapeOptions};
use crate::{Result, SearchError};

/// How one extraction script runs.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptSettings {
    /// JavaScript function source.
    pub extract: String,
    #[serde(default)]
    pub wait_selector: Option<String>,
    #[serde(default)]
    pub scroll_to_bottom: bool,
    #[serde(default)]
    pub render_wait_ms: u64,
    #[serde(default = "default_load_images")]
    pub load_images: bool,
    /// Selector wait budget. Defaults to the executor's.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_load_images() -> bool {
    true
}

impl ScriptSettings {
    fn options(&self, args: Vec<Value>) -> ScrapeOptions {
        let mut options = ScrapeOptions::new()
            .with_args(args)
            .with_scroll_to_bottom(self.scroll_to_bottom)
            .with_render_wait(Duration::from_millis(self.render_wait_ms))
            .with_load_images(self.load_images);
        if let Some(ref selector) = self.wait_selector {
            options = options.with_wait_selector(selector);
        }
        if let Some(ms) = self.timeout_ms {
            options = options.with_timeout(Duration::from_millis(ms));
        }
        options
    }
}

/// A chapter or page script with its URL template (`{base}`, `{id}`).
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptBlock {
    pub url: String,
    #[serde(flatten)]
    pub script: ScriptSettings,
}

/// Settings of a `rendered` manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct RenderedSettings {
    /// URL template, see [`super::expand_url`].
    pub search_url: String,
    #[serde(flatten)]
    pub search: ScriptSettings,
    #[serde(default)]
    pub chapters: Option<ScriptBlock>,
    #[serde(default)]
    pub pages: Option<ScriptBlock>,
}

pub struct RenderedAdapter {
    name: String,
    base_url: Option<String>,
    content_type: Option<String>,
    settings: RenderedSettings,
    scraper: Arc<ScrapeExecutor>,
}

impl RenderedAdapter {
    /// Manifest kind.
    pub const KIND: &'static str = "rendered";

    pub fn from_manifest(name: &str, manifest: &AdapterManifest, ctx: &AdapterContext) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            base_url: manifest.base_url.clone(),
            content_type: manifest.content_type.clone(),
            settings: manifest.settings()?,
            scraper: Arc::clone(&ctx.scraper),
        })
    }

    fn block<'a>(&self, block: Option<&'a ScriptBlock>, capability: &str) -> Result<&'a ScriptBlock> {
        block.ok_or_else(|| SearchError::Unsupported {
            adapter: self.name.clone(),
            capability: capability.to_string(),
        })
    }
}

#[async_trait]
impl Adapter for RenderedAdapter {
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
        let url = expand_url(&self.settings.search_url, self.base_url.as_deref(), query, page);
        let options = self
            .settings
            .search
            .options(vec![Value::from(query), Value::from(page)]);
        debug!("{}: rendering {}", self.name, url);
        self.scraper
            .scrape(&url, &self.settings.search.extract, &options)
            .await
    }

    async fn find_chapters(&self, id: &str) -> Result<ChapterListing> {
        let block = self.block(self.settings.chapters.as_ref(), "chapters")?;
        let url = expand_item_url(&block.url, self.base_url.as_deref(), id);
        let options = block.script.options(vec![Value::from(id)]);
        self.scraper.scrape(&url, &block.script.extract, &options).await
    }

    async fn find_chapter_pages(&self, chapter_id: &str) -> Result<Vec<PageRef>> {
        let block = self.block(self.settings.pages.as_ref(), "chapter pages")?;
        let url = expand_item_url(&block.url, self.base_url.as_deref(), chapter_id);
        let options = block.script.options(vec![Value::from(chapter_id)]);
        let values: Vec<Value> = self.scraper.scrape(&url, &block.script.extract, &options).await?;
        page_refs(values)
    }
}

/// Accepts bare URL strings or `{url, index?}` objects. Missing indexes
/// follow list order.
fn page_refs(values: Vec<Value>) -> Result<Vec<PageRef>> {
    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| match value {
            Value::String(url) => Ok(PageRef {
                url,
                index: i as u32,
            }),
            Value::Object(mut map) => {
                map.entry("index").or_insert_with(|| Value::from(i as u32));
                serde_json::from_value(Value::Object(map)).map_err(SearchError::from)
            }
            other => Err(SearchError::Parse(format!("unexpected page entry: {}", other))),
        })
        .collect()
}
