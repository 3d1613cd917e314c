//! Search API over the adapter registry.
//!
//! [`SearchService`] is the boundary the UI talks to. Internally everything
//! is `Result`; at this boundary failures become tagged [`ApiResponse`]s
//! with user-facing messages.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use crate::adapter::{ChapterRef, PageRef};
use crate::normalize::normalize;
use crate::query::SearchRequest;
use crate::registry::{AdapterRegistry, SourceInfo};
use crate::result::SearchResult;
use crate::{Result, SearchError};

/// Default budget for one adapter call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Tagged response returned across the API boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

impl<T> ApiResponse<T> {
    /// A successful response.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            extra: None,
        }
    }

    /// A failed response with no data.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            extra: None,
        }
    }

    /// Attaches side data (e.g. a cover image).
    pub fn with_extra(mut self, extra: Value) -> Self {
        self.extra = Some(extra);
        self
    }

    /// Converts into a `Result`, keeping the error message.
    pub fn into_result(self) -> std::result::Result<T, String> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (_, _) => Err(self.error.unwrap_or_else(|| "unknown error".to_string())),
        }
    }
}

/// One normalized page plus how many raw items the adapter produced.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub raw_count: usize,
    pub result: SearchResult,
}

/// Routes requests to adapters through the registry.
pub struct SearchService {
    registry: Arc<AdapterRegistry>,
    timeout: Duration,
}

impl SearchService {
    /// Creates a service with the default timeout.
    pub fn new(registry: Arc<AdapterRegistry>) -> Self {
        Self {
            registry,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the per-call timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Returns the registry.
    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    /// Lists sources without loading any adapter.
    pub async fn get_sources(&self) -> Vec<SourceInfo> {
        self.registry.list_sources().await
    }

    /// Fetches and normalizes one page.
    pub async fn fetch_page(&self, request: &SearchRequest) -> Result<FetchedPage> {
        request.validate()?;
        let adapter = self.registry.resolve(&request.source).await?;
        let raw = self
            .bounded(&request.source, adapter.fetch_search_result(&request.query, request.page))
            .await?;

        let result = normalize(&raw);
        debug!(
            "{} page {}: {} raw, {} valid, has_next_page={}",
            request.source,
            request.page,
            raw.results.len(),
            result.items.len(),
            result.has_next_page
        );
        Ok(FetchedPage {
            raw_count: raw.results.len(),
            result,
        })
    }

    /// Searches `source`.
    ///
    /// An invalid request, an unknown source or an adapter that fails to
    /// load is reported as an error. A failing adapter call yields an empty final page with the
    /// error attached.
    pub async fn search(&self, source: &str, query: &str, page: u32) -> ApiResponse<SearchResult> {
        let request = SearchRequest::new(source, query).with_page(page);
        match self.fetch_page(&request).await {
            Ok(fetched) => ApiResponse::ok(fetched.result),
            Err(
                e @ (SearchError::AdapterNotFound(_)
                | SearchError::AdapterLoad { .. }
                | SearchError::InvalidQuery(_)),
            ) => {
                ApiResponse::failure(api_error(&e))
            }
            Err(e) => {
                warn!("Error during search in {}: {}", source, e);
                ApiResponse {
                    success: false,
                    data: Some(SearchResult::empty()),
                    error: Some(api_error(&e)),
                    extra: None,
                }
            }
        }
    }

    /// Lists the chapters of `id`. The cover, if any, is in `extra.cover`.
    pub async fn get_chapters(&self, source: &str, id: &str) -> ApiResponse<Vec<ChapterRef>> {
        let listing = async {
            let adapter = self.registry.resolve(source).await?;
            self.bounded(source, adapter.find_chapters(id)).await
        };
        match listing.await {
            Ok(listing) => {
                let response = ApiResponse::ok(listing.chapters);
                match listing.cover {
                    Some(cover) => response.with_extra(json!({ "cover": cover })),
                    None => response,
                }
            }
            Err(e) => {
                warn!("Error fetching chapters of {} from {}: {}", id, source, e);
                ApiResponse::failure(api_error(&e))
            }
        }
    }

    /// Lists the page images of a chapter.
    pub async fn get_pages(&self, source: &str, chapter_id: &str) -> ApiResponse<Vec<PageRef>> {
        let pages = async {
            let adapter = self.registry.resolve(source).await?;
            self.bounded(source, adapter.find_chapter_pages(chapter_id)).await
        };
        match pages.await {
            Ok(pages) => ApiResponse::ok(pages),
            Err(e) => {
                warn!("Error fetching pages of {} from {}: {}", chapter_id, source, e);
                ApiResponse::failure(api_error(&e))
            }
        }
    }

    async fn bounded<T>(
        &self,
        source: &str,
        call: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        match timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Source {} timed out after {:?}", source, self.timeout);
                Err(SearchError::Timeout)
            }
        }
    }
}

/// User-facing message for an error.
pub fn api_error(error: &SearchError) -> String {
    match error {
        SearchError::AdapterLoad { reason, .. } => format!("Failed to load extension: {}", reason),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{Adapter, AdapterContext, ChapterListing, RawSearchPage};
    use crate::registry::AdapterKinds;
    use crate::scrape::ScrapeExecutor;
    use crate::session::SessionPool;
    use async_trait::async_trait;

    struct MockAdapter {
        results: Vec<Value>,
        has_next_page: bool,
    }

    #[async_trait]
    impl Adapter for MockAdapter {
        fn name(&self) -> &str {
            "Mock"
        }

        async fn fetch_search_result(&self, query: &str, page: u32) -> Result<RawSearchPage> {
            let mut results = self.results.clone();
            for item in results.iter_mut() {
                item["query"] = json!(query);
                item["page"] = json!(page);
            }
            Ok(RawSearchPage::new(results, self.has_next_page))
        }

        async fn find_chapters(&self, id: &str) -> Result<ChapterListing> {
            Ok(ChapterListing {
                chapters: vec![ChapterRef {
                    id: format!("{}/1", id),
                    title: Some("One".to_string()),
                    chapter: Some("1".to_string()),
                }],
                cover: Some("cover.jpg".to_string()),
            })
        }
    }

    struct FailingAdapter;

    #[async_trait]
    impl Adapter for FailingAdapter {
        fn name(&self) -> &str {
            "Failing"
        }

        async fn fetch_search_result(&self, _query: &str, _page: u32) -> Result<RawSearchPage> {
            Err(SearchError::Other("Adapter failed".to_string()))
        }
    }

    struct SlowAdapter;

    #[async_trait]
    impl Adapter for SlowAdapter {
        fn name(&self) -> &str {
            "Slow"
        }

        async fn fetch_search_result(&self, _query: &str, _page: u32) -> Result<RawSearchPage> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(RawSearchPage::default())
        }
    }

    fn service() -> SearchService {
        let pool = Arc::new(SessionPool::unavailable());
        let ctx = AdapterContext::new(reqwest::Client::new(), Arc::new(ScrapeExecutor::new(pool)));
        let mut registry = AdapterRegistry::new(ctx, AdapterKinds::new());
        registry.register("Mock", |_ctx| {
            Ok(Arc::new(MockAdapter {
                results: vec![
                    json!({"id": 1, "image": "1.jpg"}),
                    json!({"id": 2}),
                    json!({"id": 3, "image": "3.jpg", "sampleImageUrl": "3s.jpg"}),
                ],
                has_next_page: true,
            }) as Arc<dyn Adapter>)
        });
        registry.register("Failing", |_ctx| Ok(Arc::new(FailingAdapter) as Arc<dyn Adapter>));
        registry.register("Slow", |_ctx| Ok(Arc::new(SlowAdapter) as Arc<dyn Adapter>));
        registry.register("Broken", |_ctx| Err(SearchError::Other("bad manifest".to_string())));
        let mut service = SearchService::new(Arc::new(registry));
        service.set_timeout(Duration::from_millis(100));
        service
    }

    #[tokio::test]
    async fn test_get_sources_lists_without_loading() {
        let service = service();
        let sources = service.get_sources().await;
        let names: Vec<_> = sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Broken", "Failing", "Mock", "Slow"]);
        assert!(!service.registry().is_loaded("Mock"));
    }

    #[tokio::test]
    async fn test_search_normalizes_results() {
        let response = service().search("Mock", " cat,dog ", 2).await;
        assert!(response.success);
        let result = response.data.unwrap();
        assert_eq!(result.items.len(), 2);
        assert_eq!(result.items[0].id, "1");
        assert_eq!(result.items[1].display_url, "3s.jpg");
        assert!(result.has_next_page);
    }

    #[tokio::test]
    async fn test_fetch_page_reports_raw_count() {
        let service = service();
        let fetched = service
            .fetch_page(&SearchRequest::new("Mock", "cat").with_page(4))
            .await
            .unwrap();
        assert_eq!(fetched.raw_count, 3);
        assert_eq!(fetched.result.items.len(), 2);
    }

    #[tokio::test]
    async fn test_search_unknown_source() {
        let response = service().search("Nope", "cat", 1).await;
        assert!(!response.success);
        assert!(response.data.is_none());
        assert_eq!(response.error.as_deref(), Some("Source Nope not found."));
    }

    #[tokio::test]
    async fn test_search_rejects_invalid_request_before_loading() {
        let service = service();
        let response = service.search("Mock", "cat", 0).await;
        assert!(!response.success);
        assert!(response.data.is_none());
        assert_eq!(response.error.as_deref(), Some("Invalid query: pages start at 1"));

        let response = service.search("", "cat", 1).await;
        assert_eq!(
            response.error.as_deref(),
            Some("Invalid query: no source selected")
        );
        assert!(!service.registry().is_loaded("Mock"));
    }

    #[tokio::test]
    async fn test_search_with_empty_terms_browses() {
        let response = service().search("Mock", " , ", 1).await;
        assert!(response.success);
        assert_eq!(response.data.unwrap().items.len(), 2);
    }

    #[tokio::test]
    async fn test_search_load_failure() {
        let response = service().search("Broken", "cat", 1).await;
        assert!(!response.success);
        assert_eq!(
            response.error.as_deref(),
            Some("Failed to load extension: bad manifest")
        );
    }

    #[tokio::test]
    async fn test_search_adapter_failure_is_empty_final_page() {
        let response = service().search("Failing", "cat", 1).await;
        assert!(!response.success);
        let data = response.data.unwrap();
        assert!(data.is_empty());
        assert!(!data.has_next_page);
        assert_eq!(response.error.as_deref(), Some("Adapter failed"));
    }

    #[tokio::test]
    async fn test_search_timeout() {
        let response = service().search("Slow", "cat", 1).await;
        assert_eq!(response.error.as_deref(), Some("Search timeout exceeded"));
    }

    #[tokio::test]
    async fn test_get_chapters_puts_cover_in_extra() {
        let response = service().get_chapters("Mock", "/title/9").await;
        assert!(response.success);
        assert_eq!(response.extra, Some(json!({"cover": "cover.jpg"})));
        assert_eq!(response.data.unwrap()[0].id, "/title/9/1");
    }

    #[tokio::test]
    async fn test_get_pages_unsupported() {
        let response = service().get_pages("Mock", "c1").await;
        assert!(!response.success);
        assert_eq!(
            response.error.as_deref(),
            Some("Adapter 'Mock' does not support chapter pages")
        );
    }

    #[test]
    fn test_api_response_serialization_skips_empty_fields() {
        let ok = serde_json::to_value(ApiResponse::ok(vec![1, 2])).unwrap();
        assert_eq!(ok, json!({"success": true, "data": [1, 2]}));
        let err = serde_json::to_value(ApiResponse::<()>::failure("nope")).unwrap();
        assert_eq!(err, json!({"success": false, "error": "nope"}));
    }

    #[test]
    fn test_api_response_into_result() {
        assert_eq!(ApiResponse::ok(3).into_result(), Ok(3));
        assert_eq!(
            ApiResponse::<u8>::failure("boom").into_result(),
            Err("boom".to_string())
        );
    }
}
