//! Favorites persistence.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::result::ResultItem;
use crate::{Result, SearchError};

/// Message returned when adding an id that is already stored.
pub const DUPLICATE_FAVORITE: &str = "Item is already a favorite.";

/// A saved item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorite {
    pub id: String,
    pub title: String,
    pub image_url: String,
    pub thumbnail_url: String,
    /// Comma-separated tags.
    #[serde(default)]
    pub tags: String,
}

impl Favorite {
    /// Builds a favorite from a search result. The title is the first tag,
    /// or `"Favorite"` when the item has none.
    pub fn from_item(item: &ResultItem) -> Self {
        Self {
            id: item.id.clone(),
            title: item
                .tags
                .first()
                .cloned()
                .unwrap_or_else(|| "Favorite".to_string()),
            image_url: item.display_url.clone(),
            thumbnail_url: item.thumbnail_ref.clone(),
            tags: item.tags.join(","),
        }
    }
}

/// Outcome of an add or remove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl MutationResult {
    fn added(id: &str) -> Self {
        Self {
            success: true,
            error: None,
            id: Some(id.to_string()),
        }
    }

    fn removed(success: bool) -> Self {
        Self {
            success,
            error: None,
            id: None,
        }
    }

    fn failed(error: &SearchError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            id: None,
        }
    }
}

/// Storage for favorites.
#[async_trait]
pub trait FavoritesStore: Send + Sync {
    /// All favorites in insertion order.
    async fn get_all(&self) -> Vec<Favorite>;

    /// Adds `favorite`. A duplicate id fails and leaves the store unchanged.
    async fn add(&self, favorite: Favorite) -> MutationResult;

    /// Removes the favorite with `id`. Succeeds only if one was removed.
    async fn remove(&self, id: &str) -> MutationResult;
}

/// Favorites kept in memory and optionally mirrored to a JSON file.
pub struct JsonFavoritesStore {
    path: Option<PathBuf>,
    favorites: Mutex<Vec<Favorite>>,
}

impl JsonFavoritesStore {
    /// Opens the store at `path`, creating nothing until the first write.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let favorites = match tokio::fs::read_to_string(&path).await {
            Ok(text) if text.trim().is_empty() => Vec::new(),
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        debug!("Loaded {} favorites from {}", favorites.len(), path.display());
        Ok(Self {
            path: Some(path),
            favorites: Mutex::new(favorites),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            favorites: Mutex::new(Vec::new()),
        }
    }

    async fn persist(&self, favorites: &[Favorite]) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let text = serde_json::to_string_pretty(favorites)?;
        tokio::fs::write(path, text).await?;
        Ok(())
    }
}

#[async_trait]
impl FavoritesStore for JsonFavoritesStore {
    async fn get_all(&self) -> Vec<Favorite> {
        self.favorites.lock().await.clone()
    }

    async fn add(&self, favorite: Favorite) -> MutationResult {
        let mut favorites = self.favorites.lock().await;
        if favorites.iter().any(|f| f.id == favorite.id) {
            return MutationResult::failed(&SearchError::FavoriteConstraint(
                DUPLICATE_FAVORITE.to_string(),
            ));
        }

        let id = favorite.id.clone();
        favorites.push(favorite);
        if let Err(e) = self.persist(&favorites).await {
            warn!("Error adding favorite: {}", e);
            favorites.pop();
            return MutationResult::failed(&e);
        }
        MutationResult::added(&id)
    }

    async fn remove(&self, id: &str) -> MutationResult {
        let mut favorites = self.favorites.lock().await;
        let Some(position) = favorites.iter().position(|f| f.id == id) else {
            return MutationResult::removed(false);
        };

        let removed = favorites.remove(position);
        if let Err(e) = self.persist(&favorites).await {
            warn!("Error removing favorite: {}", e);
            favorites.insert(position, removed);
            return MutationResult::failed(&e);
        }
        MutationResult::removed(true)
    }
}
