//! Database operations for the `accounts` table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `accounts` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccountRow {
    pub id: i64,
    pub name: String,
    pub account_type: String,
    pub created_at: DateTime<Utc>,
}

impl From<AccountRow> for camdb_core::Account {
    fn from(row: AccountRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            account_type: row.account_type,
            created_at: row.created_at,
        }
    }
}

/// Creates an account and returns the inserted row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_account(
    pool: &PgPool,
    name: &str,
    account_type: &str,
) -> Result<AccountRow, DbError> {
    let row = sqlx::query_as::<_, AccountRow>(
        "INSERT INTO accounts (name, account_type) \
         VALUES ($1, $2) \
         RETURNING id, name, account_type, created_at",
    )
    .bind(name)
    .bind(account_type)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Returns an account by id, or `None` if it does not exist.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_account(pool: &PgPool, id: i64) -> Result<Option<AccountRow>, DbError> {
    let row = sqlx::query_as::<_, AccountRow>(
        "SELECT id, name, account_type, created_at FROM accounts WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Returns accounts ordered by name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_accounts(pool: &PgPool, limit: i64) -> Result<Vec<AccountRow>, DbError> {
    let rows = sqlx::query_as::<_, AccountRow>(
        "SELECT id, name, account_type, created_at \
         FROM accounts \
         ORDER BY name, id \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
