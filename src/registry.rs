//! Adapter registry with lazy, idempotent instantiation.
//!
//! Every source gets an entry at startup (from discovery or an explicit
//! [`AdapterRegistry::register`] call) but no adapter is built until the
//! first [`AdapterRegistry::resolve`]. Each entry owns a
//! [`tokio::sync::OnceCell`], so concurrent resolves share one construction
//! and a failed construction leaves the slot empty for the next attempt.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};

use crate::adapter::{Adapter, AdapterContext};
use crate::discovery::{discover, AdapterDescriptor, AdapterManifest};
use crate::{Result, SearchError};

/// Builds an adapter from a parsed manifest. Arguments are the source name,
/// the manifest and the injected capabilities.
pub type KindFactory =
    Arc<dyn Fn(&str, &AdapterManifest, &AdapterContext) -> Result<Arc<dyn Adapter>> + Send + Sync>;

/// Builds an in-process adapter with no manifest.
pub type AdapterFactory = Arc<dyn Fn(&AdapterContext) -> Result<Arc<dyn Adapter>> + Send + Sync>;

/// Maps manifest `adapter` kinds to factories.
#[derive(Clone, Default)]
pub struct AdapterKinds {
    kinds: HashMap<String, KindFactory>,
}

impl AdapterKinds {
    /// Creates an empty kind table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory for `kind`, replacing any previous one.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&str, &AdapterManifest, &AdapterContext) -> Result<Arc<dyn Adapter>>
            + Send
            + Sync
            + 'static,
    {
        self.kinds.insert(kind.into(), Arc::new(factory));
    }

    /// Builder-style [`AdapterKinds::register`].
    pub fn with<F>(mut self, kind: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&str, &AdapterManifest, &AdapterContext) -> Result<Arc<dyn Adapter>>
            + Send
            + Sync
            + 'static,
    {
        self.register(kind, factory);
        self
    }

    /// Looks up a factory.
    pub fn get(&self, kind: &str) -> Option<&KindFactory> {
        self.kinds.get(kind)
    }

    /// Registered kind names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.kinds.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Source metadata exposed to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub name: String,
    /// Base URL, or the source name when none is known.
    pub url: String,
    #[serde(rename = "type")]
    pub content_type: Option<String>,
}

enum Origin {
    Manifest(PathBuf),
    Factory(AdapterFactory),
}

struct Entry {
    descriptor: RwLock<AdapterDescriptor>,
    origin: Origin,
    instance: OnceCell<Arc<dyn Adapter>>,
}

/// Registry of named sources.
pub struct AdapterRegistry {
    entries: BTreeMap<String, Entry>,
    kinds: AdapterKinds,
    context: AdapterContext,
}

impl AdapterRegistry {
    /// Creates an empty registry.
    pub fn new(context: AdapterContext, kinds: AdapterKinds) -> Self {
        Self {
            entries: BTreeMap::new(),
            kinds,
            context,
        }
    }

    /// Creates a registry populated from the manifests in `plugin_dir`.
    pub fn from_plugin_dir(
        plugin_dir: &Path,
        context: AdapterContext,
        kinds: AdapterKinds,
    ) -> Result<Self> {
        let mut registry = Self::new(context, kinds);
        for descriptor in discover(plugin_dir)? {
            registry.add_descriptor(descriptor);
        }
        Ok(registry)
    }

    /// Adds a discovered source. Descriptors without a manifest path are
    /// ignored; use [`AdapterRegistry::register`] for in-process adapters.
    pub fn add_descriptor(&mut self, descriptor: AdapterDescriptor) {
        let Some(path) = descriptor.source_path.clone() else {
            warn!("Descriptor {} has no manifest path, skipping", descriptor.name);
            return;
        };
        if self.entries.contains_key(&descriptor.name) {
            warn!("Duplicate source {}, keeping the first", descriptor.name);
            return;
        }
        self.entries.insert(
            descriptor.name.clone(),
            Entry {
                descriptor: RwLock::new(descriptor),
                origin: Origin::Manifest(path),
                instance: OnceCell::new(),
            },
        );
    }

    /// Registers an in-process adapter factory under `name`, replacing any
    /// existing entry. The factory runs on first resolve.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&AdapterContext) -> Result<Arc<dyn Adapter>> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!("Registered in-process source {}", name);
        self.entries.insert(
            name.clone(),
            Entry {
                descriptor: RwLock::new(AdapterDescriptor::new(name)),
                origin: Origin::Factory(Arc::new(factory)),
                instance: OnceCell::new(),
            },
        );
    }

    /// Number of known sources.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no sources are known.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a source named `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Whether the adapter for `name` has been constructed.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.entries
            .get(name)
            .is_some_and(|entry| entry.instance.initialized())
    }

    /// Current descriptor of `name`.
    pub async fn descriptor(&self, name: &str) -> Option<AdapterDescriptor> {
        match self.entries.get(name) {
            Some(entry) => Some(entry.descriptor.read().await.clone()),
            None => None,
        }
    }

    /// Lists all sources by name. Never constructs an adapter.
    pub async fn list_sources(&self) -> Vec<SourceInfo> {
        let mut sources = Vec::with_capacity(self.entries.len());
        for (name, entry) in &self.entries {
            let descriptor = entry.descriptor.read().await;
            sources.push(SourceInfo {
                name: name.clone(),
                url: descriptor.base_url.clone().unwrap_or_else(|| name.clone()),
                content_type: descriptor.content_type.clone(),
            });
        }
        sources
    }

    /// Returns the adapter for `name`, constructing it on first use.
    pub async fn resolve(&self, name: &str) -> Result<Arc<dyn Adapter>> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| SearchError::AdapterNotFound(name.to_string()))?;

        let adapter = entry
            .instance
            .get_or_try_init(|| async move {
                info!("[LazyLoad] Initializing adapter: {}", name);
                match self.construct(name, &entry.origin).await {
                    Ok(adapter) => {
                        backfill(&entry.descriptor, adapter.as_ref()).await;
                        Ok(adapter)
                    }
                    Err(e) => {
                        warn!("Failed to lazy load {}: {}", name, e);
                        Err(e)
                    }
                }
            })
            .await?;

        Ok(Arc::clone(adapter))
    }

    async fn construct(&self, name: &str, origin: &Origin) -> Result<Arc<dyn Adapter>> {
        let built = match origin {
            Origin::Factory(factory) => factory(&self.context),
            Origin::Manifest(path) => {
                let text = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| SearchError::load(name, e))?;
                let manifest = AdapterManifest::parse(&text).map_err(|e| SearchError::load(name, e))?;
                let factory = self.kinds.get(&manifest.adapter).ok_or_else(|| {
                    SearchError::load(name, format!("unknown adapter kind '{}'", manifest.adapter))
                })?;
                factory(name, &manifest, &self.context)
            }
        };

        built.map_err(|e| match e {
            SearchError::AdapterLoad { .. } => e,
            other => SearchError::load(name, other),
        })
    }
}

/// Copies metadata the live adapter knows over the descriptor.
async fn backfill(descriptor: &RwLock<AdapterDescriptor>, adapter: &dyn Adapter) {
    let base_url = adapter.base_url().map(str::to_string);
    let content_type = adapter.content_type().map(str::to_string);
    if base_url.is_none() && content_type.is_none() {
        return;
    }
    let mut descriptor = descriptor.write().await;
    if base_url.is_some() {
        descriptor.base_url = base_url;
    }
    if content_type.is_some() {
        descriptor.content_type = content_type;
    }
}
