//! Page cursor for one active search.
//!
//! The controller owns the cursor of the current `(source, query)` pair and
//! hands out page loads strictly in order. Infinite scroll calls
//! [`PaginationController::load_next`]; a new query calls
//! [`PaginationController::perform_search`], which bumps the generation so
//! responses for the old query are dropped when they arrive.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::query::SearchRequest;
use crate::result::ResultItem;
use crate::search::SearchService;

/// Why a search stopped producing pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum EndReason {
    /// The source returned an empty page or said there is no next page.
    Exhausted,
    /// The source returned items but none survived normalization.
    NoValidItems,
    /// The adapter call failed.
    Failed(String),
}

/// Why a load request was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoActiveSearch,
    Loading,
    NoNextPage,
    /// The requested page is not the cursor.
    OutOfOrder { requested: u32, cursor: u32 },
}

/// Result of a load request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// `added` items were appended from `page`.
    Loaded { page: u32, added: usize },
    /// The search reached a terminal state on this load.
    Ended(EndReason),
    /// Nothing was requested.
    Skipped(SkipReason),
    /// The response belonged to a superseded search.
    Discarded,
}

/// Snapshot of the controller state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaginationState {
    pub source: Option<String>,
    pub query: Option<String>,
    /// Next page to load.
    pub page: u32,
    pub is_loading: bool,
    pub has_next_page: bool,
    pub items: Vec<ResultItem>,
    pub end_reason: Option<EndReason>,
}

#[derive(Default)]
struct State {
    request: Option<SearchRequest>,
    is_loading: bool,
    has_next_page: bool,
    items: Vec<ResultItem>,
    end_reason: Option<EndReason>,
    generation: u64,
}

impl State {
    fn end(&mut self, reason: EndReason) -> LoadOutcome {
        self.has_next_page = false;
        self.end_reason = Some(reason.clone());
        LoadOutcome::Ended(reason)
    }
}

/// Sequential pager over a [`SearchService`].
pub struct PaginationController {
    service: Arc<SearchService>,
    state: Mutex<State>,
}

impl PaginationController {
    pub fn new(service: Arc<SearchService>) -> Self {
        Self {
            service,
            state: Mutex::new(State::default()),
        }
    }

    /// Starts a new search and loads its first page.
    pub async fn perform_search(&self, source: &str, query: &str) -> LoadOutcome {
        {
            let mut state = self.state.lock().await;
            state.generation += 1;
            state.request = Some(SearchRequest::new(source, query));
            state.is_loading = false;
            state.has_next_page = true;
            state.items.clear();
            state.end_reason = None;
            debug!("New search on {} (generation {})", source, state.generation);
        }
        self.load_page(1).await
    }

    /// Loads the page at the cursor.
    pub async fn load_next(&self) -> LoadOutcome {
        let cursor = match self.state.lock().await.request {
            Some(ref request) => request.page,
            None => return LoadOutcome::Skipped(SkipReason::NoActiveSearch),
        };
        self.load_page(cursor).await
    }

    /// Loads page `page` if it is the cursor and the search is still open.
    pub async fn load_page(&self, page: u32) -> LoadOutcome {
        let (request, generation) = {
            let mut state = self.state.lock().await;
            let cursor = match state.request {
                Some(ref request) => request.page,
                None => return LoadOutcome::Skipped(SkipReason::NoActiveSearch),
            };
            if state.is_loading {
                return LoadOutcome::Skipped(SkipReason::Loading);
            }
            if !state.has_next_page {
                return LoadOutcome::Skipped(SkipReason::NoNextPage);
            }
            if page != cursor {
                return LoadOutcome::Skipped(SkipReason::OutOfOrder {
                    requested: page,
                    cursor,
                });
            }
            state.is_loading = true;
            match state.request.clone() {
                Some(request) => (request, state.generation),
                None => return LoadOutcome::Skipped(SkipReason::NoActiveSearch),
            }
        };

        let fetched = self.service.fetch_page(&request).await;

        let mut state = self.state.lock().await;
        if state.generation != generation {
            debug!(
                "Discarding page {} of '{}' from superseded search",
                request.page, request.query
            );
            return LoadOutcome::Discarded;
        }
        state.is_loading = false;

        let fetched = match fetched {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!("Search on {} failed at page {}: {}", request.source, request.page, e);
                return state.end(EndReason::Failed(e.to_string()));
            }
        };

        if fetched.raw_count == 0 {
            info!("{}: no more results for '{}'", request.source, request.query);
            return state.end(EndReason::Exhausted);
        }
        if fetched.result.items.is_empty() {
            info!(
                "{}: page {} had {} items, none valid",
                request.source, request.page, fetched.raw_count
            );
            return state.end(EndReason::NoValidItems);
        }

        let added = fetched.result.items.len();
        state.items.extend(fetched.result.items);
        state.has_next_page = fetched.result.has_next_page;
        if let Some(ref mut active) = state.request {
            active.page += 1;
        }
        if !state.has_next_page {
            state.end_reason = Some(EndReason::Exhausted);
        }

        LoadOutcome::Loaded {
            page: request.page,
            added,
        }
    }

    /// Copies the current state.
    pub async fn snapshot(&self) -> PaginationState {
        let state = self.state.lock().await;
        PaginationState {
            source: state.request.as_ref().map(|r| r.source.clone()),
            query: state.request.as_ref().map(|r| r.query.clone()),
            page: state.request.as_ref().map_or(0, |r| r.page),
            is_loading: state.is_loading,
            has_next_page: state.has_next_page,
            items: state.items.clone(),
            end_reason: state.end_reason.clone(),
        }
    }
}
