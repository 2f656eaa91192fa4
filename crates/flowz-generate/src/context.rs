//! Normalized per-product generation context.

use serde_json::Value;
use uuid::Uuid;

use flowz_db::ProductRow;

/// Everything the prompt builder needs to know about one product, flattened
/// out of the product's JSON documents.
///
/// Each field falls back `working_content` → `metadata`; the title
/// additionally falls back to the `products.title` column, which is always
/// present.
#[derive(Debug, Clone)]
pub struct ProductContext {
    pub id: Uuid,
    pub title: String,
    pub short_description: Option<String>,
    pub description: Option<String>,
    pub price: Option<String>,
    pub sku: Option<String>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    /// Image URLs for alt-text generation: the `images` array when present,
    /// otherwise the single `image_url` as a fallback.
    pub image_urls: Vec<String>,
}

impl ProductContext {
    #[must_use]
    pub fn from_row(row: &ProductRow) -> Self {
        let working = &row.working_content;
        let metadata = &row.metadata;

        let title = string_field(working, metadata, "title").unwrap_or_else(|| row.title.clone());

        let mut image_urls = image_list(working).unwrap_or_else(|| {
            image_list(metadata).unwrap_or_default()
        });
        if image_urls.is_empty() {
            if let Some(single) = string_field(working, metadata, "image_url") {
                image_urls.push(single);
            }
        }

        Self {
            id: row.id,
            title,
            short_description: string_field(working, metadata, "short_description"),
            description: string_field(working, metadata, "description"),
            price: scalar_field(working, metadata, "price"),
            sku: string_field(working, metadata, "sku"),
            categories: string_list(working, metadata, "categories"),
            tags: string_list(working, metadata, "tags"),
            image_urls,
        }
    }
}

/// Non-empty string under `key`, working content first, then metadata.
fn string_field(working: &Value, metadata: &Value, key: &str) -> Option<String> {
    [working, metadata].into_iter().find_map(|doc| {
        doc.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
    })
}

/// Like [`string_field`], but also accepts numbers (prices arrive as either).
fn scalar_field(working: &Value, metadata: &Value, key: &str) -> Option<String> {
    [working, metadata].into_iter().find_map(|doc| {
        doc.get(key).and_then(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    })
}

fn string_list(working: &Value, metadata: &Value, key: &str) -> Vec<String> {
    [working, metadata]
        .into_iter()
        .find_map(|doc| doc.get(key).and_then(Value::as_array))
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(ToOwned::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// Extracts image URLs from a document's `images` array. Entries are either
/// plain URL strings or objects with a `url` key.
fn image_list(doc: &Value) -> Option<Vec<String>> {
    let items = doc.get("images").and_then(Value::as_array)?;
    Some(
        items
            .iter()
            .filter_map(|item| match item {
                Value::String(url) => Some(url.clone()),
                Value::Object(obj) => obj.get("url").and_then(Value::as_str).map(ToOwned::to_owned),
                _ => None,
            })
            .collect(),
    )
}
