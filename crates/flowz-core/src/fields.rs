//! Content field types that can be generated for a product.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One kind of product content the generator can produce.
///
/// The wire names (`title`, `short_description`, ...) match the
/// `content_types` map sent by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Title,
    ShortDescription,
    Description,
    SeoTitle,
    MetaDescription,
    Sku,
    AltText,
}

impl FieldType {
    /// Fixed processing order for a batch run. Every enabled field of a
    /// product is generated in exactly this order.
    pub const ORDERED: [FieldType; 7] = [
        FieldType::Title,
        FieldType::ShortDescription,
        FieldType::Description,
        FieldType::SeoTitle,
        FieldType::MetaDescription,
        FieldType::Sku,
        FieldType::AltText,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Title => "title",
            FieldType::ShortDescription => "short_description",
            FieldType::Description => "description",
            FieldType::SeoTitle => "seo_title",
            FieldType::MetaDescription => "meta_description",
            FieldType::Sku => "sku",
            FieldType::AltText => "alt_text",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the enabled fields from a `content_types` map, in processing order.
///
/// Fields absent from the map or mapped to `false` are skipped. The result is
/// empty when nothing is enabled; callers reject that case at the boundary.
#[must_use]
pub fn enabled_fields(content_types: &HashMap<FieldType, bool>) -> Vec<FieldType> {
    FieldType::ORDERED
        .into_iter()
        .filter(|f| content_types.get(f).copied().unwrap_or(false))
        .collect()
}
