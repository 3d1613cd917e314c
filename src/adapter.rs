//! Source adapter trait and the capabilities injected into adapters.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::scrape::ScrapeExecutor;
use crate::{Result, SearchError};

/// Raw page of results as produced by an adapter, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSearchPage {
    /// Loosely structured items. See [`crate::normalize`] for accepted keys.
    #[serde(default)]
    pub results: Vec<Value>,
    /// Whether the source claims another page exists.
    #[serde(default, alias = "hasNextPage")]
    pub has_next_page: bool,
}

impl RawSearchPage {
    /// Creates a page from raw items.
    pub fn new(results: Vec<Value>, has_next_page: bool) -> Self {
        Self {
            results,
            has_next_page,
        }
    }
}

/// A chapter of a multi-page item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRef {
    /// Identifier passed back to [`Adapter::find_chapter_pages`].
    pub id: String,
    /// Display title.
    #[serde(default)]
    pub title: Option<String>,
    /// Chapter number as the source prints it.
    #[serde(default)]
    pub chapter: Option<String>,
}

/// A single page image within a chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRef {
    /// Image URL.
    pub url: String,
    /// Zero-based position within the chapter.
    #[serde(default)]
    pub index: u32,
}

/// Chapters plus an optional cover, as returned by [`Adapter::find_chapters`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChapterListing {
    pub chapters: Vec<ChapterRef>,
    pub cover: Option<String>,
}

/// Adapters may answer with a bare list or with `{chapters, cover}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ChapterListingRepr {
    Bare(Vec<ChapterRef>),
    Full {
        chapters: Vec<ChapterRef>,
        #[serde(default)]
        cover: Option<String>,
    },
}

impl<'de> Deserialize<'de> for ChapterListing {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(match ChapterListingRepr::deserialize(deserializer)? {
            ChapterListingRepr::Bare(chapters) => Self {
                chapters,
                cover: None,
            },
            ChapterListingRepr::Full { chapters, cover } => Self { chapters, cover },
        })
    }
}

/// Capabilities handed to every adapter at construction.
///
/// Adapters do all networking through these handles so the render session
/// stays serialized and the HTTP client settings (user agent, proxy) apply
/// uniformly.
#[derive(Clone)]
pub struct AdapterContext {
    /// Plain HTTP client.
    pub http: Client,
    /// Headless scrape executor backed by the shared render session.
    pub scraper: Arc<ScrapeExecutor>,
}

impl AdapterContext {
    /// Creates a context from its two capabilities.
    pub fn new(http: Client, scraper: Arc<ScrapeExecutor>) -> Self {
        Self { http, scraper }
    }
}

/// Trait for implementing content source adapters.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Returns the adapter name.
    fn name(&self) -> &str;

    /// Fetches one page of raw results. Pages are 1-indexed.
    async fn fetch_search_result(&self, query: &str, page: u32) -> Result<RawSearchPage>;

    /// Declared base URL of the source.
    fn base_url(&self) -> Option<&str> {
        None
    }

    /// Declared content type (e.g. "image-board", "manga").
    fn content_type(&self) -> Option<&str> {
        None
    }

    /// Lists the chapters of an item.
    async fn find_chapters(&self, _id: &str) -> Result<ChapterListing> {
        Err(SearchError::Unsupported {
            adapter: self.name().to_string(),
            capability: "chapters".to_string(),
        })
    }

    /// Lists the page images of a chapter.
    async fn find_chapter_pages(&self, _chapter_id: &str) -> Result<Vec<PageRef>> {
        Err(SearchError::Unsupported {
            adapter: self.name().to_string(),
            capability: "chapter pages".to_string(),
        })
    }
}
