//! Per-batch generation settings sent by the dashboard.

use serde::{Deserialize, Serialize};

fn default_model() -> String {
    "gemini-2.0-flash".to_owned()
}

fn default_tone() -> String {
    "professional".to_owned()
}

fn default_language() -> String {
    "en".to_owned()
}

fn default_title_max_words() -> u32 {
    12
}

fn default_description_max_words() -> u32 {
    150
}

fn default_sku_format() -> String {
    "{CATEGORY}-{NUMBER}".to_owned()
}

/// Settings applied to every generation call in a batch.
///
/// All fields have defaults so the dashboard can send a partial object;
/// unknown keys are ignored rather than rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Gemini model name, e.g. `gemini-2.0-flash`.
    #[serde(default = "default_model")]
    pub model: String,
    /// Writing tone, e.g. `professional`, `playful`.
    #[serde(default = "default_tone")]
    pub tone: String,
    /// ISO 639-1 output language code.
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_title_max_words")]
    pub title_max_words: u32,
    #[serde(default = "default_description_max_words")]
    pub description_max_words: u32,
    /// Template for generated SKUs, e.g. `{CATEGORY}-{NUMBER}`.
    #[serde(default = "default_sku_format")]
    pub sku_format: String,
    /// When `true`, alt-text generation downloads product images and uses the
    /// vision path; otherwise alt text is produced from text context alone.
    #[serde(default)]
    pub analyze_images: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            tone: default_tone(),
            language: default_language(),
            title_max_words: default_title_max_words(),
            description_max_words: default_description_max_words(),
            sku_format: default_sku_format(),
            analyze_images: false,
        }
    }
}
