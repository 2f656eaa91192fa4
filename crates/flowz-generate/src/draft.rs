//! Per-product accumulator for generated field values and its merge semantics.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use flowz_core::FieldType;

/// Alt text for a single product image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAlt {
    pub url: String,
    pub alt: String,
}

/// Newly generated values for one product, owned by the current loop
/// iteration and discarded after being merged and persisted.
#[derive(Debug, Default, Clone)]
pub struct FieldDraft {
    pub title: Option<String>,
    pub short_description: Option<String>,
    pub description: Option<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub sku: Option<String>,
    /// When set, replaces the existing `images` array wholesale.
    pub images: Option<Vec<ImageAlt>>,
}

impl FieldDraft {
    /// Records a generated scalar value for `field`. `AltText` accumulates
    /// through [`FieldDraft::images`] instead and is rejected here.
    pub(crate) fn set_scalar(&mut self, field: FieldType, value: String) {
        match field {
            FieldType::Title => self.title = Some(value),
            FieldType::ShortDescription => self.short_description = Some(value),
            FieldType::Description => self.description = Some(value),
            FieldType::SeoTitle => self.seo_title = Some(value),
            FieldType::MetaDescription => self.seo_description = Some(value),
            FieldType::Sku => self.sku = Some(value),
            FieldType::AltText => {
                debug_assert!(false, "alt text is accumulated via the images vec");
            }
        }
    }

    /// Merges the accumulated values into a product's existing draft content.
    ///
    /// Scalars are spread-merged — keys not generated in this run survive.
    /// SEO values nest under `"seo"` without disturbing its other keys. The
    /// `images` array, when generated, replaces the existing one wholesale.
    #[must_use]
    pub fn merge_into(&self, existing: &Value) -> Value {
        let mut doc: Map<String, Value> = existing
            .as_object()
            .cloned()
            .unwrap_or_default();

        let scalars = [
            ("title", &self.title),
            ("short_description", &self.short_description),
            ("description", &self.description),
            ("sku", &self.sku),
        ];
        for (key, value) in scalars {
            if let Some(v) = value {
                doc.insert(key.to_owned(), Value::String(v.clone()));
            }
        }

        if self.seo_title.is_some() || self.seo_description.is_some() {
            let mut seo: Map<String, Value> = doc
                .get("seo")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            if let Some(v) = &self.seo_title {
                seo.insert("title".to_owned(), Value::String(v.clone()));
            }
            if let Some(v) = &self.seo_description {
                seo.insert("description".to_owned(), Value::String(v.clone()));
            }
            doc.insert("seo".to_owned(), Value::Object(seo));
        }

        if let Some(images) = &self.images {
            doc.insert(
                "images".to_owned(),
                json!(images),
            );
        }

        Value::Object(doc)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.short_description.is_none()
            && self.description.is_none()
            && self.seo_title.is_none()
            && self.seo_description.is_none()
            && self.sku.is_none()
            && self.images.is_none()
    }
}
