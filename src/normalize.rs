//! Reshapes loosely structured adapter output into [`SearchResult`].
//!
//! Adapters hand back whatever their source produced. An item survives only
//! if it carries an id and an image reference; everything else is optional
//! and coerced. Surviving items keep their relative order.

use serde_json::Value;
use tracing::debug;

use crate::adapter::RawSearchPage;
use crate::result::{ResultItem, SearchResult};

const ID_KEYS: &[&str] = &["id"];
const IMAGE_KEYS: &[&str] = &["image", "imageUrl", "image_url"];
const THUMBNAIL_KEYS: &[&str] = &["thumbnail", "thumbnailUrl", "thumbnail_url"];
const SAMPLE_KEYS: &[&str] = &["sampleImageUrl", "sample_image_url", "sample"];
const FULL_KEYS: &[&str] = &["fullImageUrl", "full_image_url", "full"];

/// Normalizes one raw page. `has_next_page` is carried over unchanged.
pub fn normalize(page: &RawSearchPage) -> SearchResult {
    let items: Vec<ResultItem> = page.results.iter().filter_map(normalize_item).collect();

    let dropped = page.results.len() - items.len();
    if dropped > 0 {
        debug!("Dropped {} of {} raw items without id or image", dropped, page.results.len());
    }

    SearchResult {
        items,
        has_next_page: page.has_next_page,
    }
}

/// Normalizes a single raw item, returning `None` when it is unusable.
pub fn normalize_item(raw: &Value) -> Option<ResultItem> {
    let id = first_id(raw)?;
    let image = first_str(raw, IMAGE_KEYS)?;

    let mut item = ResultItem::new(id, image).with_tags(coerce_tags(raw.get("tags")));
    if let Some(thumbnail) = first_str(raw, THUMBNAIL_KEYS) {
        item = item.with_thumbnail(thumbnail);
    }
    if let Some(full) = first_str(raw, FULL_KEYS) {
        item = item.with_full(full);
    }
    if let Some(sample) = first_str(raw, SAMPLE_KEYS) {
        item = item.with_sample(sample);
    }
    Some(item)
}

fn first_id(raw: &Value) -> Option<String> {
    ID_KEYS.iter().find_map(|key| match raw.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn first_str(raw: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        raw.get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    })
}

/// Tags arrive as an array, a whitespace-separated string, or not at all.
fn coerce_tags(tags: Option<&Value>) -> Vec<String> {
    match tags {
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => s.split_whitespace().map(String::from).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(results: Vec<Value>, has_next_page: bool) -> RawSearchPage {
        RawSearchPage {
            results,
            has_next_page,
        }
    }

    #[test]
    fn test_drops_items_without_image_and_keeps_order() {
        let raw = page(
            vec![
                json!({"id": "a", "image": "a.jpg"}),
                json!({"id": "b"}),
                json!({"id": "c", "image": "  "}),
                json!({"id": "d", "image": "d.jpg"}),
                json!({"id": "e", "image": null}),
                json!({"id": "f", "image": "f.jpg"}),
            ],
            true,
        );
        let result = normalize(&raw);
        let ids: Vec<_> = result.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "d", "f"]);
        assert!(result.has_next_page);
    }

    #[test]
    fn test_drops_items_without_id() {
        let raw = page(
            vec![json!({"image": "x.jpg"}), json!({"id": "", "image": "y.jpg"})],
            false,
        );
        assert!(normalize(&raw).is_empty());
    }

    #[test]
    fn test_numeric_id_is_rendered_not_fabricated() {
        let item = normalize_item(&json!({"id": 1234, "image": "x.jpg"})).unwrap();
        assert_eq!(item.id, "1234");
    }

    #[test]
    fn test_absent_tags_become_empty() {
        let item = normalize_item(&json!({"id": "1", "image": "x.jpg"})).unwrap();
        assert!(item.tags.is_empty());
    }

    #[test]
    fn test_string_tags_are_split() {
        let item =
            normalize_item(&json!({"id": "1", "image": "x.jpg", "tags": "cat  dog\tbird"})).unwrap();
        assert_eq!(item.tags, vec!["cat", "dog", "bird"]);
    }

    #[test]
    fn test_array_tags_skip_non_strings() {
        let item = normalize_item(
            &json!({"id": "1", "image": "x.jpg", "tags": ["cat", null, {"k": 1}, "", 5]}),
        )
        .unwrap();
        assert_eq!(item.tags, vec!["cat", "5"]);
    }

    #[test]
    fn test_display_url_preference_order() {
        let sample = normalize_item(&json!({
            "id": "1",
            "image": "thumb.jpg",
            "sampleImageUrl": "sample.jpg",
            "fullImageUrl": "full.jpg"
        }))
        .unwrap();
        assert_eq!(sample.display_url, "sample.jpg");

        let full = normalize_item(&json!({
            "id": "2",
            "image": "thumb.jpg",
            "full_image_url": "full.jpg"
        }))
        .unwrap();
        assert_eq!(full.display_url, "full.jpg");

        let thumb = normalize_item(&json!({"id": "3", "image": "thumb.jpg"})).unwrap();
        assert_eq!(thumb.display_url, "thumb.jpg");
        assert_eq!(thumb.thumbnail_ref, "thumb.jpg");
    }

    #[test]
    fn test_non_object_items_are_dropped() {
        let raw = page(vec![json!("just a string"), json!(42), json!(null)], true);
        assert!(normalize(&raw).is_empty());
    }
}
