//! Database operations for `stores`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `stores` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoreRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    /// Source platform, e.g. `"shopify"`.
    pub platform: String,
    pub store_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fetches a store by id. Ownership checks happen at the API layer by
/// comparing `owner_id` against the authenticated user.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_store(pool: &PgPool, id: Uuid) -> Result<Option<StoreRow>, DbError> {
    let row = sqlx::query_as::<_, StoreRow>(
        "SELECT id, owner_id, name, platform, store_url, created_at \
         FROM stores \
         WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}
