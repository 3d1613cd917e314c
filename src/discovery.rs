//! Startup-time adapter discovery.
//!
//! A plugin directory holds one JSON manifest per source. Discovery only
//! lists the files and peeks at `base_url` / `type` with a regex so the UI
//! can show sources before any adapter is built. Full parsing happens in
//! [`AdapterManifest::parse`] when the registry first resolves the source.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::{Result, SearchError};

/// File extension of adapter manifests.
pub const MANIFEST_EXTENSION: &str = "json";

/// Metadata known about a source before its adapter is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterDescriptor {
    /// Source name (manifest file stem).
    pub name: String,
    /// Manifest path, `None` for in-process registrations.
    pub source_path: Option<PathBuf>,
    /// Base URL, peeked or back-filled.
    pub base_url: Option<String>,
    /// Content type, peeked or back-filled.
    pub content_type: Option<String>,
}

impl AdapterDescriptor {
    /// Creates a descriptor with no metadata.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_path: None,
            base_url: None,
            content_type: None,
        }
    }
}

/// Lists adapter manifests in `plugin_dir`, sorted by file name.
///
/// A missing directory is created and yields no descriptors. Unreadable
/// files still produce a descriptor; their metadata is simply unset.
pub fn discover(plugin_dir: &Path) -> Result<Vec<AdapterDescriptor>> {
    if !plugin_dir.exists() {
        std::fs::create_dir_all(plugin_dir)?;
        info!("Created plugin directory {}", plugin_dir.display());
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(plugin_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(MANIFEST_EXTENSION)
        })
        .collect();
    paths.sort();

    let descriptors: Vec<AdapterDescriptor> = paths
        .into_iter()
        .filter_map(|path| {
            let name = path.file_stem()?.to_str()?.to_string();
            let text = std::fs::read_to_string(&path).ok();
            let (base_url, content_type) = match text {
                Some(ref text) => (peek(&BASE_URL_KEY, text), peek(&TYPE_KEY, text)),
                None => (None, None),
            };
            debug!("Discovered adapter {} at {}", name, path.display());
            Some(AdapterDescriptor {
                name,
                source_path: Some(path),
                base_url,
                content_type,
            })
        })
        .collect();

    info!(
        "Discovered {} adapter(s) in {}",
        descriptors.len(),
        plugin_dir.display()
    );
    Ok(descriptors)
}

static BASE_URL_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""base_url"\s*:\s*"([^"]+)""#).expect("valid base_url regex"));
static TYPE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""type"\s*:\s*"([^"]+)""#).expect("valid type regex"));

/// First value of a top-level key matched by `re`. Text-only: the manifest
/// is never parsed, and keys inside nested blocks are skipped.
fn peek(re: &Regex, text: &str) -> Option<String> {
    re.captures_iter(text)
        .filter(|c| c.get(0).map_or(false, |m| nesting_at(text, m.start()) == Some(1)))
        .find_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Object/array depth at byte `pos`, `None` inside a string literal.
fn nesting_at(text: &str, pos: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for b in text.as_bytes()[..pos].iter() {
        match (in_string, escaped, b) {
            (true, true, _) => escaped = false,
            (true, false, b'\\') => escaped = true,
            (true, false, b'"') => in_string = false,
            (true, false, _) => {}
            (false, _, b'"') => in_string = true,
            (false, _, b'{' | b'[') => depth += 1,
            (false, _, b'}' | b']') => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    (!in_string).then_some(depth)
}

/// A fully parsed adapter manifest.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AdapterManifest {
    /// Adapter kind, looked up in the registry's kind table.
    pub adapter: String,
    /// Declared base URL.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Declared content type.
    #[serde(default, rename = "type")]
    pub content_type: Option<String>,
    /// Kind-specific settings.
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl AdapterManifest {
    /// Parses manifest text.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| SearchError::Parse(format!("invalid manifest: {}", e)))
    }

    /// Deserializes the kind-specific settings.
    pub fn settings<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.settings.clone()))
            .map_err(|e| SearchError::Parse(format!("invalid '{}' settings: {}", self.adapter, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn test_discover_creates_missing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("extensions");
        let descriptors = discover(&dir).unwrap();
        assert!(descriptors.is_empty());
        assert!(dir.is_dir());
    }

    #[test]
    fn test_discover_lists_manifests_sorted_with_peeked_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "Zeta.json",
            r#"{"adapter": "rendered", "base_url": "https://zeta.example", "type": "manga"}"#,
        );
        write(tmp.path(), "Alpha.json", r#"{"adapter":"json-api","base_url":"https://alpha.example"}"#);
        write(tmp.path(), "notes.txt", "not a manifest");
        fs::create_dir(tmp.path().join("nested.json")).unwrap();

        let descriptors = discover(tmp.path()).unwrap();
        let names: Vec<_> = descriptors.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Zeta"]);
        assert_eq!(descriptors[0].base_url.as_deref(), Some("https://alpha.example"));
        assert!(descriptors[0].content_type.is_none());
        assert_eq!(descriptors[1].content_type.as_deref(), Some("manga"));
        assert_eq!(
            descriptors[1].source_path.as_deref(),
            Some(tmp.path().join("Zeta.json").as_path())
        );
    }

    #[test]
    fn test_discover_does_not_parse_broken_manifests() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "Broken.json", r#"{ "base_url": "https://broken.example", oops"#);
        let descriptors = discover(tmp.path()).unwrap();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].base_url.as_deref(), Some("https://broken.example"));
    }

    #[test]
    fn test_discover_leaves_metadata_unset_when_absent() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "Bare.json", r#"{"adapter": "html"}"#);
        let descriptors = discover(tmp.path()).unwrap();
        assert!(descriptors[0].base_url.is_none());
        assert!(descriptors[0].content_type.is_none());
    }

    #[test]
    fn test_discover_peeks_top_level_keys_only() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "Nested.json",
            r#"{
                "adapter": "rendered",
                "chapters": {"type": "chapter-list", "base_url": "https://cdn.example"},
                "note": "{\"type\": \"fake\"}",
                "type": "manga"
            }"#,
        );
        let descriptors = discover(tmp.path()).unwrap();
        assert_eq!(descriptors[0].content_type.as_deref(), Some("manga"));
        assert!(descriptors[0].base_url.is_none());
    }

    #[test]
    fn test_manifest_parse_and_settings() {
        #[derive(Deserialize)]
        struct Settings {
            search_url: String,
            page_size: u32,
        }

        let manifest = AdapterManifest::parse(
            r#"{"adapter": "json-api", "base_url": "https://a.example", "type": "image-board",
                "search_url": "{base}/posts?q={query}", "page_size": 40}"#,
        )
        .unwrap();
        assert_eq!(manifest.adapter, "json-api");
        assert_eq!(manifest.content_type.as_deref(), Some("image-board"));
        let settings: Settings = manifest.settings().unwrap();
        assert_eq!(settings.search_url, "{base}/posts?q={query}");
        assert_eq!(settings.page_size, 40);
    }

    #[test]
    fn test_manifest_requires_adapter_kind() {
        let err = AdapterManifest::parse(r#"{"base_url": "https://a.example"}"#).unwrap_err();
        assert!(matches!(err, SearchError::Parse(_)));
    }
}
