//! Post handlers. Every committed mutation is followed by the KPI triggers
//! for the scopes it touched; creating a post for an unlinked pair links it.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use camdb_core::Post;
use camdb_kpi::MutationEvent;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{
    map_db_error, validation_error, ApiError, ApiResponse, AppState, KpiSync, ResponseMeta,
};

#[derive(Debug, Deserialize)]
pub(super) struct CreatePostRequest {
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
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct UpdatePostRequest {
    pub campaign_id: Option<i64>,
    pub account_id: Option<i64>,
    pub post_date: Option<NaiveDate>,
    pub total_view: Option<i64>,
    pub total_like: Option<i64>,
    pub total_comment: Option<i64>,
    pub total_share: Option<i64>,
    pub total_saved: Option<i64>,
    pub content_type: Option<String>,
    pub platform: Option<String>,
    pub url: Option<String>,
    pub caption: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct PostWithSync {
    #[serde(flatten)]
    pub post: Post,
    pub kpi_sync: KpiSync,
}

fn validate_counters(req_id: &str, counters: [(&str, Option<i64>); 5]) -> Result<(), ApiError> {
    for (field, value) in counters {
        if let Some(v) = value.filter(|v| *v < 0) {
            return Err(validation_error(
                req_id,
                format!("{field} must be non-negative, got {v}"),
            ));
        }
    }
    Ok(())
}

/// POST /api/v1/posts
pub(super) async fn create_post(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PostWithSync>>), ApiError> {
    let rid = &req_id.0;
    validate_counters(
        rid,
        [
            ("total_view", body.total_view),
            ("total_like", body.total_like),
            ("total_comment", body.total_comment),
            ("total_share", body.total_share),
            ("total_saved", body.total_saved),
        ],
    )?;

    let row = camdb_db::create_post(
        &state.pool,
        &camdb_db::NewPost {
            campaign_id: body.campaign_id,
            account_id: body.account_id,
            post_date: body.post_date,
            total_view: body.total_view,
            total_like: body.total_like,
            total_comment: body.total_comment,
            total_share: body.total_share,
            total_saved: body.total_saved,
            content_type: body.content_type.as_deref(),
            platform: body.platform.as_deref(),
            url: body.url.as_deref(),
            caption: body.caption.as_deref(),
        },
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;
    let post = Post::from(row);

    let link_result = camdb_db::link_account(&state.pool, post.campaign_id, post.account_id).await;
    let linked_now = match link_result {
        Ok(linked_now) => linked_now,
        Err(e) => {
            // The post is committed; its scopes are recomputed even though linking failed.
            state
                .sync_kpis(MutationEvent::PostCreated {
                    post,
                    linked_now: false,
                })
                .await;
            return Err(map_db_error(rid.clone(), &e));
        }
    };
    if linked_now {
        tracing::info!(
            campaign_id = post.campaign_id,
            account_id = post.account_id,
            "account linked by first post"
        );
    }

    let kpi_sync = state
        .sync_kpis(MutationEvent::PostCreated {
            post: post.clone(),
            linked_now,
        })
        .await;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: PostWithSync { post, kpi_sync },
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

/// PATCH /api/v1/posts/{id}: sparse update.
pub(super) async fn update_post(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<UpdatePostRequest>,
) -> Result<Json<ApiResponse<PostWithSync>>, ApiError> {
    let rid = &req_id.0;
    validate_counters(
        rid,
        [
            ("total_view", body.total_view),
            ("total_like", body.total_like),
            ("total_comment", body.total_comment),
            ("total_share", body.total_share),
            ("total_saved", body.total_saved),
        ],
    )?;

    let before = camdb_db::get_post(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .map(Post::from)
        .ok_or_else(|| ApiError::new(rid, "not_found", format!("post {id} not found")))?;

    let row = camdb_db::update_post(
        &state.pool,
        id,
        &camdb_db::UpdatePost {
            campaign_id: body.campaign_id,
            account_id: body.account_id,
            post_date: body.post_date,
            total_view: body.total_view,
            total_like: body.total_like,
            total_comment: body.total_comment,
            total_share: body.total_share,
            total_saved: body.total_saved,
            content_type: body.content_type.as_deref(),
            platform: body.platform.as_deref(),
            url: body.url.as_deref(),
            caption: body.caption.as_deref(),
        },
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;
    let after = Post::from(row);

    let moved = before.campaign_id != after.campaign_id || before.account_id != after.account_id;
    let link_result = if moved {
        camdb_db::link_account(&state.pool, after.campaign_id, after.account_id).await
    } else {
        Ok(false)
    };
    let linked_now = match link_result {
        Ok(linked_now) => linked_now,
        Err(e) => {
            state
                .sync_kpis(MutationEvent::PostUpdated {
                    before,
                    after,
                    linked_now: false,
                })
                .await;
            return Err(map_db_error(rid.clone(), &e));
        }
    };

    let kpi_sync = state
        .sync_kpis(MutationEvent::PostUpdated {
            before,
            after: after.clone(),
            linked_now,
        })
        .await;

    Ok(Json(ApiResponse {
        data: PostWithSync {
            post: after,
            kpi_sync,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// DELETE /api/v1/posts/{id}
pub(super) async fn delete_post(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let rid = &req_id.0;
    let post = camdb_db::delete_post(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .map(Post::from)
        .ok_or_else(|| ApiError::new(rid, "not_found", format!("post {id} not found")))?;

    let kpi_sync = state.sync_kpis(MutationEvent::PostDeleted { post }).await;

    Ok(Json(ApiResponse {
        data: serde_json::json!({ "deleted": true, "kpi_sync": kpi_sync }),
        meta: ResponseMeta::new(req_id.0),
    }))
}
