//! KPI read, target, and manual recalculation handlers.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use camdb_core::{Kpi, Scope};
use camdb_kpi::RecalcOutcome;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{
    map_db_error, map_engine_error, resolve_campaign, validation_error, ApiError, ApiResponse,
    AppState, ResponseMeta,
};

#[derive(Debug, Deserialize)]
pub(super) struct KpiQuery {
    /// Restricts the listing to one account scope.
    pub account_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct SetTargetRequest {
    pub target: i64,
}

#[derive(Debug, Serialize)]
pub(super) struct ScopeValues {
    pub scope: Scope,
    pub values: BTreeMap<&'static str, i64>,
    pub coalesced: bool,
}

impl From<RecalcOutcome> for ScopeValues {
    fn from(outcome: RecalcOutcome) -> Self {
        Self {
            scope: outcome.scope,
            values: outcome
                .values
                .into_iter()
                .map(|(category, value)| (category.as_str(), value))
                .collect(),
            coalesced: outcome.coalesced,
        }
    }
}

fn to_kpis(req_id: &str, rows: Vec<camdb_db::KpiRow>) -> Result<Vec<Kpi>, ApiError> {
    rows.into_iter()
        .map(Kpi::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            tracing::error!(error = %e, "corrupt kpi row");
            ApiError::new(req_id, "internal_error", "corrupt kpi row")
        })
}

/// GET /api/v1/campaigns/{id}/kpis: campaign-wide rows first, then accounts.
pub(super) async fn list_campaign_kpis(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(campaign_id): Path<i64>,
    Query(query): Query<KpiQuery>,
) -> Result<Json<ApiResponse<Vec<Kpi>>>, ApiError> {
    let rid = &req_id.0;
    resolve_campaign(&state.pool, campaign_id, rid).await?;

    let rows = match query.account_id {
        Some(account_id) => {
            camdb_db::list_kpis_for_scope(&state.pool, campaign_id, Some(account_id)).await
        }
        None => camdb_db::list_kpis_for_campaign(&state.pool, campaign_id).await,
    }
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: to_kpis(rid, rows)?,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// PUT /api/v1/kpis/{id}/target: the only write path for `target`.
pub(super) async fn set_target(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<SetTargetRequest>,
) -> Result<Json<ApiResponse<Kpi>>, ApiError> {
    let rid = &req_id.0;
    if body.target < 0 {
        return Err(validation_error(
            rid,
            format!("target must be non-negative, got {}", body.target),
        ));
    }

    let row = camdb_db::set_kpi_target(&state.pool, id, body.target)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    let kpi = to_kpis(rid, vec![row])?.remove(0);

    Ok(Json(ApiResponse {
        data: kpi,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// POST /api/v1/campaigns/{id}/kpis/recalculate: recomputes the campaign-wide
/// scope and every linked account scope. Engine failures fail the request.
pub(super) async fn recalculate_campaign(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(campaign_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<ScopeValues>>>, ApiError> {
    let rid = &req_id.0;
    resolve_campaign(&state.pool, campaign_id, rid).await?;
    let account_ids = camdb_db::list_linked_account_ids(&state.pool, campaign_id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    let engine = state.dispatcher.engine();
    let mut results = Vec::with_capacity(account_ids.len() + 1);
    results.push(
        engine
            .recalc_campaign(campaign_id)
            .await
            .map_err(|e| map_engine_error(rid.clone(), &e))?
            .into(),
    );
    for account_id in account_ids {
        results.push(
            engine
                .recalc(campaign_id, account_id)
                .await
                .map_err(|e| map_engine_error(rid.clone(), &e))?
                .into(),
        );
    }

    tracing::info!(
        campaign_id,
        scopes = results.len(),
        "manual kpi recalculation complete"
    );
    Ok(Json(ApiResponse {
        data: results,
        meta: ResponseMeta::new(req_id.0),
    }))
}
