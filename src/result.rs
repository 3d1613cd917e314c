//! Search result types.

use serde::{Deserialize, Serialize};

/// A single validated search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultItem {
    /// Source-assigned identifier.
    pub id: String,
    /// Tags attached to the item.
    pub tags: Vec<String>,
    /// Primary image reference. Always present on a valid item.
    pub image_ref: String,
    /// Thumbnail reference, falls back to the primary image.
    pub thumbnail_ref: String,
    /// Mid-size sample image, when the source offers one.
    pub sample_ref: Option<String>,
    /// Full resolution image, when the source offers one.
    pub full_ref: Option<String>,
    /// Preferred URL for display: sample, then full, then the primary image.
    pub display_url: String,
}

impl ResultItem {
    /// Creates an item from an id and its primary image.
    pub fn new(id: impl Into<String>, image_ref: impl Into<String>) -> Self {
        let image_ref = image_ref.into();
        Self {
            id: id.into(),
            tags: Vec::new(),
            thumbnail_ref: image_ref.clone(),
            display_url: image_ref.clone(),
            image_ref,
            sample_ref: None,
            full_ref: None,
        }
    }

    /// Sets the tags.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Sets the thumbnail reference.
    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail_ref = thumbnail.into();
        self
    }

    /// Sets the sample image reference.
    pub fn with_sample(mut self, sample: impl Into<String>) -> Self {
        self.sample_ref = Some(sample.into());
        self.refresh_display_url();
        self
    }

    /// Sets the full image reference.
    pub fn with_full(mut self, full: impl Into<String>) -> Self {
        self.full_ref = Some(full.into());
        self.refresh_display_url();
        self
    }

    fn refresh_display_url(&mut self) {
        self.display_url = self
            .sample_ref
            .as_ref()
            .or(self.full_ref.as_ref())
            .unwrap_or(&self.image_ref)
            .clone();
    }
}

/// One page of validated results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Valid items, in source order.
    pub items: Vec<ResultItem>,
    /// Whether the source reported another page.
    pub has_next_page: bool,
}

impl SearchResult {
    /// Creates an empty, terminal result.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the items.
    pub fn items(&self) -> &[ResultItem] {
        &self.items
    }

    /// Returns `true` when there are no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
