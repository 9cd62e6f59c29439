use axum::{
    extract::{Path, State},
    Extension, Json,
};
use camdb_kpi::MutationEvent;
use serde::Serialize;

use crate::middleware::RequestId;

use super::{map_db_error, resolve_campaign, ApiError, ApiResponse, AppState, KpiSync, ResponseMeta};

#[derive(Debug, Serialize)]
pub(super) struct LinkResult {
    pub campaign_id: i64,
    pub account_id: i64,
    pub status: &'static str,
    /// `false` when the pair was already in the requested state.
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kpi_sync: Option<KpiSync>,
}

/// POST /api/v1/campaigns/{id}/accounts/{account_id}
pub(super) async fn link_account(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((campaign_id, account_id)): Path<(i64, i64)>,
) -> Result<Json<ApiResponse<LinkResult>>, ApiError> {
    let rid = &req_id.0;
    resolve_campaign(&state.pool, campaign_id, rid).await?;

    let changed = camdb_db::link_account(&state.pool, campaign_id, account_id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    let kpi_sync = if changed {
        tracing::info!(campaign_id, account_id, "account linked");
        Some(
            state
                .sync_kpis(MutationEvent::LinkCreated {
                    campaign_id,
                    account_id,
                })
                .await,
        )
    } else {
        None
    };

    Ok(Json(ApiResponse {
        data: LinkResult {
            campaign_id,
            account_id,
            status: "linked",
            changed,
            kpi_sync,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// DELETE /api/v1/campaigns/{id}/accounts/{account_id}: KPI rows are kept.
pub(super) async fn unlink_account(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((campaign_id, account_id)): Path<(i64, i64)>,
) -> Result<Json<ApiResponse<LinkResult>>, ApiError> {
    let rid = &req_id.0;
    let changed = camdb_db::unlink_account(&state.pool, campaign_id, account_id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    if !changed {
        return Err(ApiError::new(
            rid,
            "not_found",
            format!("account {account_id} is not linked to campaign {campaign_id}"),
        ));
    }

    tracing::info!(campaign_id, account_id, "account unlinked");
    let kpi_sync = state
        .sync_kpis(MutationEvent::LinkDeleted {
            campaign_id,
            account_id,
        })
        .await;

    Ok(Json(ApiResponse {
        data: LinkResult {
            campaign_id,
            account_id,
            status: "unlinked",
            changed,
            kpi_sync: Some(kpi_sync),
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}
