//! Database operations for `users`.

use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// Resolves an API-key hash (hex SHA-256 of salt + token) to a user id.
///
/// Returns `None` for unknown hashes; the auth middleware maps that to 401.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_user_by_api_key_hash(
    pool: &PgPool,
    api_key_hash: &str,
) -> Result<Option<Uuid>, DbError> {
    let id: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE api_key_hash = $1")
        .bind(api_key_hash)
        .fetch_optional(pool)
        .await?;

    Ok(id)
}
