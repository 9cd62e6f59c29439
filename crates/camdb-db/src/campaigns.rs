//! Database operations for the `campaigns` table.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `campaigns` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CampaignRow {
    pub id: i64,
    pub name: String,
    pub categories: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
    pub goal: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<CampaignRow> for camdb_core::Campaign {
    type Error = camdb_core::CoreError;

    fn try_from(row: CampaignRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            categories: row.categories,
            start_date: row.start_date,
            end_date: row.end_date,
            status: row.status.parse()?,
            goal: row.goal,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Input for [`create_campaign`].
#[derive(Debug, Clone)]
pub struct NewCampaign<'a> {
    pub name: &'a str,
    pub categories: &'a [String],
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: &'a str,
    pub goal: Option<Decimal>,
}

/// Sparse update for [`update_campaign`]. `None` keeps the current value;
/// `goal: Some(None)` clears the goal.
#[allow(clippy::option_option)]
#[derive(Debug, Clone, Default)]
pub struct UpdateCampaign<'a> {
    pub name: Option<&'a str>,
    pub categories: Option<&'a [String]>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<&'a str>,
    pub goal: Option<Option<Decimal>>,
}

const CAMPAIGN_COLUMNS: &str =
    "id, name, categories, start_date, end_date, status, goal, created_at, updated_at";

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Creates a campaign and returns the inserted row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including check-constraint
/// violations on status or date range).
pub async fn create_campaign(
    pool: &PgPool,
    campaign: &NewCampaign<'_>,
) -> Result<CampaignRow, DbError> {
    let row = sqlx::query_as::<_, CampaignRow>(&format!(
        "INSERT INTO campaigns (name, categories, start_date, end_date, status, goal) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING {CAMPAIGN_COLUMNS}"
    ))
    .bind(campaign.name)
    .bind(campaign.categories)
    .bind(campaign.start_date)
    .bind(campaign.end_date)
    .bind(campaign.status)
    .bind(campaign.goal)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Returns a campaign by id, or `None` if it does not exist.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_campaign(pool: &PgPool, id: i64) -> Result<Option<CampaignRow>, DbError> {
    let row = sqlx::query_as::<_, CampaignRow>(&format!(
        "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Returns campaigns ordered by most recently created, capped at `limit`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_campaigns(pool: &PgPool, limit: i64) -> Result<Vec<CampaignRow>, DbError> {
    let rows = sqlx::query_as::<_, CampaignRow>(&format!(
        "SELECT {CAMPAIGN_COLUMNS} FROM campaigns ORDER BY created_at DESC, id DESC LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Applies a sparse update in a single `UPDATE … RETURNING` statement.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no campaign has `id`, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn update_campaign(
    pool: &PgPool,
    id: i64,
    update: &UpdateCampaign<'_>,
) -> Result<CampaignRow, DbError> {
    let goal_supplied = update.goal.is_some();
    let goal_val = update.goal.flatten();

    let row = sqlx::query_as::<_, CampaignRow>(&format!(
        "UPDATE campaigns \
         SET name       = COALESCE($2, name), \
             categories = COALESCE($3, categories), \
             start_date = COALESCE($4, start_date), \
             end_date   = COALESCE($5, end_date), \
             status     = COALESCE($6, status), \
             goal       = CASE WHEN $7::BOOL THEN $8 ELSE goal END, \
             updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {CAMPAIGN_COLUMNS}"
    ))
    .bind(id)
    .bind(update.name)
    .bind(update.categories)
    .bind(update.start_date)
    .bind(update.end_date)
    .bind(update.status)
    .bind(goal_supplied)
    .bind(goal_val)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;
    Ok(row)
}

/// Deletes a campaign. Posts, links and KPI rows cascade.
///
/// Returns `false` if no campaign had `id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_campaign(pool: &PgPool, id: i64) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM campaigns WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
