//! Prompt construction for each content field.

use flowz_core::{FieldType, GenerationSettings};

use crate::context::ProductContext;

/// Shared context block describing the product, prepended to every prompt.
fn context_block(ctx: &ProductContext) -> String {
    let mut lines = vec![format!("Product title: {}", ctx.title)];
    if let Some(short) = &ctx.short_description {
        lines.push(format!("Short description: {short}"));
    }
    if let Some(desc) = &ctx.description {
        lines.push(format!("Description: {desc}"));
    }
    if let Some(price) = &ctx.price {
        lines.push(format!("Price: {price}"));
    }
    if let Some(sku) = &ctx.sku {
        lines.push(format!("Current SKU: {sku}"));
    }
    if !ctx.categories.is_empty() {
        lines.push(format!("Categories: {}", ctx.categories.join(", ")));
    }
    if !ctx.tags.is_empty() {
        lines.push(format!("Tags: {}", ctx.tags.join(", ")));
    }
    lines.join("\n")
}

fn style_block(settings: &GenerationSettings) -> String {
    format!(
        "Write in a {} tone, in language code '{}'. Return only the requested text with no \
         surrounding quotes, labels, or markdown.",
        settings.tone, settings.language
    )
}

/// Builds the text prompt for a scalar field. `AltText` goes through
/// [`alt_text_prompt`] instead.
pub(crate) fn field_prompt(
    field: FieldType,
    ctx: &ProductContext,
    settings: &GenerationSettings,
) -> String {
    let instruction = match field {
        FieldType::Title => format!(
            "Write a compelling e-commerce product title of at most {} words.",
            settings.title_max_words
        ),
        FieldType::ShortDescription => format!(
            "Write a punchy one-or-two sentence product summary of at most {} words.",
            settings.description_max_words.min(50)
        ),
        FieldType::Description => format!(
            "Write a persuasive product description of at most {} words, highlighting benefits \
             and concrete details.",
            settings.description_max_words
        ),
        FieldType::SeoTitle => format!(
            "Write an SEO page title of at most 60 characters for the product \"{}\". \
             Include the most searched-for phrase naturally.",
            ctx.title
        ),
        FieldType::MetaDescription => format!(
            "Write an SEO meta description of at most 155 characters for the product \"{}\". \
             It should entice a click without keyword stuffing.",
            ctx.title
        ),
        FieldType::Sku => format!(
            "Propose a single SKU code for this product following the format '{}'. \
             Uppercase letters, digits, and dashes only. Return only the SKU.",
            settings.sku_format
        ),
        FieldType::AltText => String::new(),
    };

    format!(
        "{}\n\n{}\n\n{}",
        instruction,
        context_block(ctx),
        style_block(settings)
    )
}

/// Builds the alt-text prompt for one image. When image bytes accompany the
/// request the model is asked to describe what it sees; otherwise it works
/// from the product context and the image URL alone.
pub(crate) fn alt_text_prompt(
    ctx: &ProductContext,
    settings: &GenerationSettings,
    image_url: &str,
    has_image_bytes: bool,
) -> String {
    let instruction = if has_image_bytes {
        "Write concise, descriptive alt text (at most 125 characters) for the attached product \
         image. Describe what is visible; do not start with 'image of'."
            .to_owned()
    } else {
        format!(
            "Write concise, descriptive alt text (at most 125 characters) for the product image \
             at {image_url}. Infer the likely contents from the product details; do not start \
             with 'image of'."
        )
    };

    format!(
        "{}\n\n{}\n\n{}",
        instruction,
        context_block(ctx),
        style_block(settings)
    )
}

/// Strips the wrappers models like to add: markdown code fences and a single
/// pair of surrounding quotes.
pub(crate) fn clean_generated(raw: &str) -> String {
    let mut text = raw.trim();

    if text.starts_with("```") {
        text = text.trim_start_matches("```");
        // Drop an opening language tag like `json`.
        if let Some(rest) = text.split_once('\n') {
            if !rest.0.trim().contains(' ') && rest.0.len() < 16 {
                text = rest.1;
            }
        }
        text = text.trim_end_matches("```");
        text = text.trim();
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.len() >= 2 {
        let (first, last) = (chars[0], chars[chars.len() - 1]);
        if (first == '"' && last == '"') || (first == '\'' && last == '\'') {
            text = &text[first.len_utf8()..text.len() - last.len_utf8()];
        }
    }

    text.trim().to_owned()
}
