//! Database operations for `campaign_accounts` (campaign ↔ account links).
//!
//! Unlinking is a status transition; rows are never deleted except by the
//! campaign cascade.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use camdb_core::{Link, LinkStatus};

use crate::DbError;

/// A row from the `campaign_accounts` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LinkRow {
    pub campaign_id: i64,
    pub account_id: i64,
    pub status: String,
    pub linked_at: DateTime<Utc>,
    pub unlinked_at: Option<DateTime<Utc>>,
}

impl From<&LinkRow> for Link {
    fn from(row: &LinkRow) -> Self {
        Self {
            campaign_id: row.campaign_id,
            account_id: row.account_id,
        }
    }
}

/// Moves a pair to `linked`, inserting the row if needed.
///
/// Returns `true` only when the pair transitioned (new row, or
/// `unlinked → linked`); `false` when it was already linked.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn link_account(
    pool: &PgPool,
    campaign_id: i64,
    account_id: i64,
) -> Result<bool, DbError> {
    let transitioned = sqlx::query_scalar::<_, i64>(
        "INSERT INTO campaign_accounts (campaign_id, account_id, status) \
         VALUES ($1, $2, 'linked') \
         ON CONFLICT (campaign_id, account_id) DO UPDATE SET \
             status      = 'linked', \
             linked_at   = NOW(), \
             unlinked_at = NULL \
         WHERE campaign_accounts.status = 'unlinked' \
         RETURNING campaign_id",
    )
    .bind(campaign_id)
    .bind(account_id)
    .fetch_optional(pool)
    .await?;
    Ok(transitioned.is_some())
}

/// Moves a pair from `linked` to `unlinked`.
///
/// Returns `false` if the pair was not linked.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn unlink_account(
    pool: &PgPool,
    campaign_id: i64,
    account_id: i64,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE campaign_accounts \
         SET status = 'unlinked', unlinked_at = NOW() \
         WHERE campaign_id = $1 AND account_id = $2 AND status = 'linked'",
    )
    .bind(campaign_id)
    .bind(account_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Current state of a pair, or `None` if it has never been linked.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::Decode`] if
/// the stored status is unrecognised.
pub async fn get_link_status(
    pool: &PgPool,
    campaign_id: i64,
    account_id: i64,
) -> Result<Option<LinkStatus>, DbError> {
    let status = sqlx::query_scalar::<_, String>(
        "SELECT status FROM campaign_accounts WHERE campaign_id = $1 AND account_id = $2",
    )
    .bind(campaign_id)
    .bind(account_id)
    .fetch_optional(pool)
    .await?;

    status
        .map(|s| s.parse::<LinkStatus>().map_err(DbError::from))
        .transpose()
}

/// Currently linked pairs, optionally filtered by campaign and/or account.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_links(
    pool: &PgPool,
    campaign_id: Option<i64>,
    account_id: Option<i64>,
) -> Result<Vec<LinkRow>, DbError> {
    let rows = sqlx::query_as::<_, LinkRow>(
        "SELECT campaign_id, account_id, status, linked_at, unlinked_at \
         FROM campaign_accounts \
         WHERE status = 'linked' \
           AND ($1::BIGINT IS NULL OR campaign_id = $1) \
           AND ($2::BIGINT IS NULL OR account_id = $2) \
         ORDER BY campaign_id, account_id",
    )
    .bind(campaign_id)
    .bind(account_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Account ids currently linked to a campaign, ascending.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_linked_account_ids(pool: &PgPool, campaign_id: i64) -> Result<Vec<i64>, DbError> {
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT account_id FROM campaign_accounts \
         WHERE campaign_id = $1 AND status = 'linked' \
         ORDER BY account_id",
    )
    .bind(campaign_id)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}
