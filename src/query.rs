//! Search request representation.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

static SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[, ]+").expect("valid separator regex"));

/// A search against one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Source (adapter) name.
    pub source: String,
    /// Sanitized search terms.
    pub query: String,
    /// Page number (1-indexed).
    pub page: u32,
}

impl SearchRequest {
    /// Creates a request for page 1. The query is sanitized.
    pub fn new(source: impl Into<String>, query: &str) -> Self {
        Self {
            source: source.into(),
            query: sanitize_query(query),
            page: 1,
        }
    }

    /// Sets the page number.
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    /// Rejects requests no source can answer. Empty terms are fine and
    /// browse the source's latest items.
    pub fn validate(&self) -> Result<()> {
        if self.source.trim().is_empty() {
            return Err(SearchError::InvalidQuery("no source selected".to_string()));
        }
        if self.page == 0 {
            return Err(SearchError::InvalidQuery("pages start at 1".to_string()));
        }
        Ok(())
    }
}

/// Trims the query and collapses runs of commas and spaces to one space.
pub fn sanitize_query(raw: &str) -> String {
    SEPARATORS
        .replace_all(raw.trim(), " ")
        .trim()
        .to_string()
}
