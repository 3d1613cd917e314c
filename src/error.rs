//! Error types for the search library.

use thiserror::Error;

/// Result type alias for search operations.
pub type Result<T> = std::result::Result<T, SearchError>;

/// Errors that can occur while resolving adapters, rendering pages or searching.
#[derive(Error, Debug)]
pub enum SearchError {
    /// An adapter could not be constructed. Retryable on the next resolve.
    #[error("Failed to load adapter '{name}': {reason}")]
    AdapterLoad { name: String, reason: String },

    /// No adapter is registered under the requested name.
    #[error("Source {0} not found.")]
    AdapterNotFound(String),

    /// The render session failed (browser process died, navigation threw).
    #[error("Render session error: {0}")]
    RenderSession(String),

    /// A readiness selector never matched within its budget.
    #[error("Timed out after {timeout_ms}ms waiting for selector '{selector}'")]
    ExtractionTimeout { selector: String, timeout_ms: u64 },

    /// The extraction script threw inside the page.
    #[error("Extraction script failed: {0}")]
    ExtractionScript(String),

    /// A favorite with the same id already exists.
    #[error("{0}")]
    FavoriteConstraint(String),

    /// The adapter does not implement an optional capability.
    #[error("Adapter '{adapter}' does not support {capability}")]
    Unsupported { adapter: String, capability: String },

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Search timeout exceeded.
    #[error("Search timeout exceeded")]
    Timeout,

    /// Invalid query.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// URL parsing error.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl SearchError {
    /// Builds an [`SearchError::AdapterLoad`] for `name`.
    pub fn load(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::AdapterLoad {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the failure invalidates the render session it happened on.
    pub fn is_session_fault(&self) -> bool {
        matches!(self, Self::RenderSession(_))
    }
}
