//! # board-search
//!
//! An image-board and manga search backend with pluggable source adapters.
//!
//! Sources are described by JSON manifests in a plugin directory. They are
//! discovered at startup without being built, then constructed lazily the
//! first time they are searched. Sources that need a real browser share a
//! single headless session through [`SessionPool`].
//!
//! - Lazy, idempotent adapter loading ([`AdapterRegistry`])
//! - One serialized render session with request filtering
//! - Script-based extraction with selector waits and scroll settling
//! - Ordered page loading for infinite scroll ([`PaginationController`])
//! - Result normalization and a favorites store
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use board_search::adapters::builtin_kinds;
//! use board_search::{AdapterContext, AdapterRegistry, ScrapeExecutor, SearchService, SessionPool};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = Arc::new(SessionPool::unavailable());
//!     let ctx = AdapterContext::new(reqwest::Client::new(), Arc::new(ScrapeExecutor::new(pool)));
//!     let registry = AdapterRegistry::from_plugin_dir(Path::new("extensions"), ctx, builtin_kinds())?;
//!     let service = SearchService::new(Arc::new(registry));
//!
//!     let response = service.search("Gelbooru", "landscape", 1).await;
//!     for item in response.data.unwrap_or_default().items() {
//!         println!("{}: {}", item.id, item.display_url);
//!     }
//!     Ok(())
//! }
//! ```

mod adapter;
mod error;
mod query;
mod result;

pub mod adapters;
pub mod config;
pub mod discovery;
pub mod favorites;
pub mod network;
pub mod normalize;
pub mod pagination;
pub mod registry;
pub mod scrape;
pub mod search;
pub mod session;

#[cfg(feature = "headless")]
pub mod browser;
#[cfg(feature = "headless")]
pub mod browser_setup;

pub use adapter::{Adapter, AdapterContext, ChapterListing, ChapterRef, PageRef, RawSearchPage};
pub use config::{AppConfig, BrowserSettings};
pub use discovery::{discover, AdapterDescriptor, AdapterManifest};
pub use error::{Result, SearchError};
pub use favorites::{Favorite, FavoritesStore, JsonFavoritesStore, MutationResult};
pub use pagination::{EndReason, LoadOutcome, PaginationController, PaginationState, SkipReason};
pub use query::{sanitize_query, SearchRequest};
pub use registry::{AdapterKinds, AdapterRegistry, SourceInfo};
pub use result::{ResultItem, SearchResult};
pub use scrape::{ScrapeExecutor, ScrapeOptions};
pub use search::{ApiResponse, SearchService};
pub use session::{RenderSession, SessionConfig, SessionLauncher, SessionPool};
