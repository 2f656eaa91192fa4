//! Database operations for `products`.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `products` table.
///
/// `working_content` holds the live/published content, `draft_content` the
/// AI-proposed content awaiting review, and `metadata` whatever the platform
/// import attached (price, sku, image urls, categories, tags).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: Uuid,
    pub store_id: Uuid,
    /// Identifier on the source platform (e.g. Shopify product id).
    pub external_id: Option<String>,
    pub title: String,
    pub working_content: Value,
    pub draft_content: Value,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fetches a product by id, scoped to a store.
///
/// Returns `None` when the product does not exist or belongs to a different
/// store — callers treat both the same way.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_product(
    pool: &PgPool,
    store_id: Uuid,
    product_id: Uuid,
) -> Result<Option<ProductRow>, DbError> {
    let row = sqlx::query_as::<_, ProductRow>(
        "SELECT id, store_id, external_id, title, working_content, draft_content, \
                metadata, created_at, updated_at \
         FROM products \
         WHERE id = $1 AND store_id = $2",
    )
    .bind(product_id)
    .bind(store_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Replaces a product's draft content.
///
/// The orchestrator merges generated fields into the existing draft before
/// calling this; the write itself is whole-document (last write wins across
/// concurrent batches).
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the product does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn update_draft_content(
    pool: &PgPool,
    product_id: Uuid,
    draft_content: &Value,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE products SET draft_content = $1, updated_at = NOW() WHERE id = $2",
    )
    .bind(draft_content)
    .bind(product_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
