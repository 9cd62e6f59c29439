//! Database operations for the `kpis` table.
//!
//! `actual` is written only by the aggregation engine through
//! [`upsert_kpi_actual`]; `target` only by users through [`set_kpi_target`].

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use camdb_core::{Kpi, KpiCategory};

use crate::DbError;

/// A row from the `kpis` table. `account_id = NULL` is the campaign-wide scope.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct KpiRow {
    pub id: i64,
    pub campaign_id: i64,
    pub account_id: Option<i64>,
    pub category: String,
    pub target: i64,
    pub actual: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<KpiRow> for Kpi {
    type Error = camdb_core::CoreError;

    fn try_from(row: KpiRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            campaign_id: row.campaign_id,
            account_id: row.account_id,
            category: row.category.parse()?,
            target: row.target,
            actual: row.actual,
            updated_at: row.updated_at,
        })
    }
}

const KPI_COLUMNS: &str =
    "id, campaign_id, account_id, category, target, actual, created_at, updated_at";

/// Returns the KPI row for one scope and category, or `None` if the scope has
/// not been initialized for it.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_kpi(
    pool: &PgPool,
    campaign_id: i64,
    account_id: Option<i64>,
    category: KpiCategory,
) -> Result<Option<KpiRow>, DbError> {
    let row = sqlx::query_as::<_, KpiRow>(&format!(
        "SELECT {KPI_COLUMNS} \
         FROM kpis \
         WHERE campaign_id = $1 \
           AND account_id IS NOT DISTINCT FROM $2 \
           AND category = $3"
    ))
    .bind(campaign_id)
    .bind(account_id)
    .bind(category.as_str())
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Writes `actual` for a scope/category, creating the row if it is absent.
///
/// `target` is used only when the row is created; an existing row keeps its
/// target. Conflicts resolve on the `(campaign_id, COALESCE(account_id, 0),
/// category)` unique index.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_kpi_actual(
    pool: &PgPool,
    campaign_id: i64,
    account_id: Option<i64>,
    category: KpiCategory,
    actual: i64,
    target: i64,
) -> Result<KpiRow, DbError> {
    let row = sqlx::query_as::<_, KpiRow>(&format!(
        "INSERT INTO kpis (campaign_id, account_id, category, target, actual) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (campaign_id, (COALESCE(account_id, 0)), category) DO UPDATE SET \
             actual     = EXCLUDED.actual, \
             updated_at = NOW() \
         RETURNING {KPI_COLUMNS}"
    ))
    .bind(campaign_id)
    .bind(account_id)
    .bind(category.as_str())
    .bind(target)
    .bind(actual)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Sets the user-owned target of a KPI row.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row has `id`, or [`DbError::Sqlx`] if
/// the update fails.
pub async fn set_kpi_target(pool: &PgPool, id: i64, target: i64) -> Result<KpiRow, DbError> {
    let row = sqlx::query_as::<_, KpiRow>(&format!(
        "UPDATE kpis SET target = $2, updated_at = NOW() WHERE id = $1 RETURNING {KPI_COLUMNS}"
    ))
    .bind(id)
    .bind(target)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;
    Ok(row)
}

/// All KPI rows of a campaign: the campaign-wide scope first, then accounts.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_kpis_for_campaign(
    pool: &PgPool,
    campaign_id: i64,
) -> Result<Vec<KpiRow>, DbError> {
    let rows = sqlx::query_as::<_, KpiRow>(&format!(
        "SELECT {KPI_COLUMNS} \
         FROM kpis \
         WHERE campaign_id = $1 \
         ORDER BY account_id NULLS FIRST, category"
    ))
    .bind(campaign_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// KPI rows of one scope.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_kpis_for_scope(
    pool: &PgPool,
    campaign_id: i64,
    account_id: Option<i64>,
) -> Result<Vec<KpiRow>, DbError> {
    let rows = sqlx::query_as::<_, KpiRow>(&format!(
        "SELECT {KPI_COLUMNS} \
         FROM kpis \
         WHERE campaign_id = $1 AND account_id IS NOT DISTINCT FROM $2 \
         ORDER BY category"
    ))
    .bind(campaign_id)
    .bind(account_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Ids of campaigns that have at least one post or KPI row, ascending.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_kpi_campaign_ids(pool: &PgPool) -> Result<Vec<i64>, DbError> {
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT campaign_id FROM posts \
         UNION \
         SELECT campaign_id FROM kpis \
         ORDER BY campaign_id",
    )
    .fetch_all(pool)
    .await?;
    Ok(ids)
}
