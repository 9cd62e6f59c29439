//! Database operations for the `posts` table.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `posts` table.
///
/// Engagement counters are nullable; the aggregation layer reads NULL as 0.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostRow {
    pub id: i64,
    pub campaign_id: i64,
    pub account_id: i64,
    pub post_date: NaiveDate,
    pub total_view: Option<i64>,
    pub total_like: Option<i64>,
    pub total_comment: Option<i64>,
    pub total_share: Option<i64>,
    pub total_saved: Option<i64>,
    pub content_type: Option<String>,
    pub platform: Option<String>,
    pub url: Option<String>,
    pub caption: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PostRow> for camdb_core::Post {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            campaign_id: row.campaign_id,
            account_id: row.account_id,
            post_date: row.post_date,
            total_view: row.total_view,
            total_like: row.total_like,
            total_comment: row.total_comment,
            total_share: row.total_share,
            total_saved: row.total_saved,
            content_type: row.content_type,
            platform: row.platform,
            url: row.url,
            caption: row.caption,
        }
    }
}

/// Input for [`create_post`].
#[derive(Debug, Clone)]
pub struct NewPost<'a> {
    pub campaign_id: i64,
    pub account_id: i64,
    pub post_date: NaiveDate,
    pub total_view: Option<i64>,
    pub total_like: Option<i64>,
    pub total_comment: Option<i64>,
    pub total_share: Option<i64>,
    pub total_saved: Option<i64>,
    pub content_type: Option<&'a str>,
    pub platform: Option<&'a str>,
    pub url: Option<&'a str>,
    pub caption: Option<&'a str>,
}

/// Sparse update for [`update_post`]. `None` keeps the current value.
///
/// Counters are not clearable through an update; send `0` instead.
#[derive(Debug, Clone, Default)]
pub struct UpdatePost<'a> {
    pub campaign_id: Option<i64>,
    pub account_id: Option<i64>,
    pub post_date: Option<NaiveDate>,
    pub total_view: Option<i64>,
    pub total_like: Option<i64>,
    pub total_comment: Option<i64>,
    pub total_share: Option<i64>,
    pub total_saved: Option<i64>,
    pub content_type: Option<&'a str>,
    pub platform: Option<&'a str>,
    pub url: Option<&'a str>,
    pub caption: Option<&'a str>,
}

const POST_COLUMNS: &str = "id, campaign_id, account_id, post_date, total_view, total_like, \
     total_comment, total_share, total_saved, content_type, platform, url, caption, \
     created_at, updated_at";

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Inserts a post and returns the full row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including foreign-key
/// violations for unknown campaign or account ids).
pub async fn create_post(pool: &PgPool, post: &NewPost<'_>) -> Result<PostRow, DbError> {
    let row = sqlx::query_as::<_, PostRow>(&format!(
        "INSERT INTO posts \
             (campaign_id, account_id, post_date, total_view, total_like, total_comment, \
              total_share, total_saved, content_type, platform, url, caption) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
         RETURNING {POST_COLUMNS}"
    ))
    .bind(post.campaign_id)
    .bind(post.account_id)
    .bind(post.post_date)
    .bind(post.total_view)
    .bind(post.total_like)
    .bind(post.total_comment)
    .bind(post.total_share)
    .bind(post.total_saved)
    .bind(post.content_type)
    .bind(post.platform)
    .bind(post.url)
    .bind(post.caption)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Returns a post by id, or `None` if it does not exist.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_post(pool: &PgPool, id: i64) -> Result<Option<PostRow>, DbError> {
    let row = sqlx::query_as::<_, PostRow>(&format!(
        "SELECT {POST_COLUMNS} FROM posts WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Returns every post in a campaign, optionally narrowed to one account.
///
/// Link state is deliberately not consulted: posts from accounts that have
/// since been unlinked are still returned.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_posts(
    pool: &PgPool,
    campaign_id: i64,
    account_id: Option<i64>,
) -> Result<Vec<PostRow>, DbError> {
    let rows = sqlx::query_as::<_, PostRow>(&format!(
        "SELECT {POST_COLUMNS} \
         FROM posts \
         WHERE campaign_id = $1 AND ($2::BIGINT IS NULL OR account_id = $2) \
         ORDER BY id"
    ))
    .bind(campaign_id)
    .bind(account_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Applies a sparse update and returns the updated row.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no post has `id`, or [`DbError::Sqlx`]
/// if the update fails.
pub async fn update_post(
    pool: &PgPool,
    id: i64,
    update: &UpdatePost<'_>,
) -> Result<PostRow, DbError> {
    let row = sqlx::query_as::<_, PostRow>(&format!(
        "UPDATE posts \
         SET campaign_id   = COALESCE($2, campaign_id), \
             account_id    = COALESCE($3, account_id), \
             post_date     = COALESCE($4, post_date), \
             total_view    = COALESCE($5, total_view), \
             total_like    = COALESCE($6, total_like), \
             total_comment = COALESCE($7, total_comment), \
             total_share   = COALESCE($8, total_share), \
             total_saved   = COALESCE($9, total_saved), \
             content_type  = COALESCE($10, content_type), \
             platform      = COALESCE($11, platform), \
             url           = COALESCE($12, url), \
             caption       = COALESCE($13, caption), \
             updated_at    = NOW() \
         WHERE id = $1 \
         RETURNING {POST_COLUMNS}"
    ))
    .bind(id)
    .bind(update.campaign_id)
    .bind(update.account_id)
    .bind(update.post_date)
    .bind(update.total_view)
    .bind(update.total_like)
    .bind(update.total_comment)
    .bind(update.total_share)
    .bind(update.total_saved)
    .bind(update.content_type)
    .bind(update.platform)
    .bind(update.url)
    .bind(update.caption)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;
    Ok(row)
}

/// Deletes a post and returns the deleted row, or `None` if it did not exist.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_post(pool: &PgPool, id: i64) -> Result<Option<PostRow>, DbError> {
    let row = sqlx::query_as::<_, PostRow>(&format!(
        "DELETE FROM posts WHERE id = $1 RETURNING {POST_COLUMNS}"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
