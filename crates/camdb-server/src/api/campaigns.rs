//! Campaign handlers, including membership updates through `account_ids`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use camdb_core::{campaigns::is_valid_date_range, Campaign, CampaignStatus};
use camdb_kpi::MutationEvent;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{
    map_db_error, normalize_limit, resolve_campaign, validation_error, ApiError, ApiResponse,
    AppState, KpiSync, ResponseMeta,
};

#[derive(Debug, Deserialize)]
pub(super) struct ListQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateCampaignRequest {
    pub name: String,
    #[serde(default)]
    pub categories: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: Option<String>,
    pub goal: Option<Decimal>,
    #[serde(default)]
    pub account_ids: Vec<i64>,
}

// Outer None = not in request, Some(None) = clear the goal.
#[allow(clippy::option_option)]
#[derive(Debug, Deserialize)]
pub(super) struct UpdateCampaignRequest {
    pub name: Option<String>,
    pub categories: Option<Vec<String>>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub goal: Option<Option<Decimal>>,
    /// Full membership list; accounts missing from it are unlinked.
    pub account_ids: Option<Vec<i64>>,
}

fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<Decimal>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<Decimal>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Serialize)]
pub(super) struct CampaignDetail {
    #[serde(flatten)]
    pub campaign: Campaign,
    pub account_ids: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kpi_sync: Option<KpiSync>,
}

fn validate_name(req_id: &str, name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > 200 {
        return Err(validation_error(req_id, "name must be 1-200 characters"));
    }
    Ok(name.to_owned())
}

fn validate_status(req_id: &str, status: &str) -> Result<CampaignStatus, ApiError> {
    status.parse().map_err(|_| {
        validation_error(
            req_id,
            format!("status must be one of draft, active, completed, archived; got '{status}'"),
        )
    })
}

fn validate_dates(req_id: &str, start: NaiveDate, end: NaiveDate) -> Result<(), ApiError> {
    if is_valid_date_range(start, end) {
        Ok(())
    } else {
        Err(validation_error(
            req_id,
            format!("end_date {end} is before start_date {start}"),
        ))
    }
}

fn dedup(ids: &[i64]) -> Vec<i64> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn to_campaign(req_id: &str, row: camdb_db::CampaignRow) -> Result<Campaign, ApiError> {
    Campaign::try_from(row).map_err(|e| {
        tracing::error!(error = %e, "corrupt campaign row");
        ApiError::new(req_id, "internal_error", "corrupt campaign row")
    })
}

/// GET /api/v1/campaigns
pub(super) async fn list_campaigns(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<Campaign>>>, ApiError> {
    let rid = &req_id.0;
    let rows = camdb_db::list_campaigns(&state.pool, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    let campaigns = rows
        .into_iter()
        .map(|row| to_campaign(rid, row))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(ApiResponse {
        data: campaigns,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// POST /api/v1/campaigns
pub(super) async fn create_campaign(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CampaignDetail>>), ApiError> {
    let rid = &req_id.0;
    let name = validate_name(rid, &body.name)?;
    let status = validate_status(rid, body.status.as_deref().unwrap_or("draft"))?;
    validate_dates(rid, body.start_date, body.end_date)?;
    let requested = dedup(&body.account_ids);
    require_accounts(&state, rid, &requested).await?;

    let row = camdb_db::create_campaign(
        &state.pool,
        &camdb_db::NewCampaign {
            name: &name,
            categories: &body.categories,
            start_date: body.start_date,
            end_date: body.end_date,
            status: status.as_str(),
            goal: body.goal,
        },
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;
    let campaign = to_campaign(rid, row)?;

    let (account_ids, kpi_sync) = if requested.is_empty() {
        (Vec::new(), None)
    } else {
        let sync = apply_membership(&state, rid, campaign.id, &[], &requested).await?;
        let ids = camdb_db::list_linked_account_ids(&state.pool, campaign.id)
            .await
            .map_err(|e| map_db_error(rid.clone(), &e))?;
        (ids, Some(sync))
    };

    tracing::info!(campaign_id = campaign.id, "campaign created");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: CampaignDetail {
                campaign,
                account_ids,
                kpi_sync,
            },
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

/// GET /api/v1/campaigns/{id}
pub(super) async fn get_campaign(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<CampaignDetail>>, ApiError> {
    let rid = &req_id.0;
    let row = resolve_campaign(&state.pool, id, rid).await?;
    let account_ids = camdb_db::list_linked_account_ids(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: CampaignDetail {
            campaign: to_campaign(rid, row)?,
            account_ids,
            kpi_sync: None,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// PATCH /api/v1/campaigns/{id}: sparse update. When `account_ids` is
/// present the membership is diffed against the currently linked accounts.
pub(super) async fn update_campaign(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateCampaignRequest>,
) -> Result<Json<ApiResponse<CampaignDetail>>, ApiError> {
    let rid = &req_id.0;
    let current = resolve_campaign(&state.pool, id, rid).await?;

    let name = body
        .name
        .as_deref()
        .map(|n| validate_name(rid, n))
        .transpose()?;
    let status = body
        .status
        .as_deref()
        .map(|s| validate_status(rid, s))
        .transpose()?;
    validate_dates(
        rid,
        body.start_date.unwrap_or(current.start_date),
        body.end_date.unwrap_or(current.end_date),
    )?;
    let requested = body.account_ids.as_deref().map(dedup);
    if let Some(ref requested) = requested {
        require_accounts(&state, rid, requested).await?;
    }

    let row = camdb_db::update_campaign(
        &state.pool,
        id,
        &camdb_db::UpdateCampaign {
            name: name.as_deref(),
            categories: body.categories.as_deref(),
            start_date: body.start_date,
            end_date: body.end_date,
            status: status.map(CampaignStatus::as_str),
            goal: body.goal,
        },
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    let before = camdb_db::list_linked_account_ids(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    let (account_ids, kpi_sync) = match requested {
        Some(requested) => {
            let sync = apply_membership(&state, rid, id, &before, &requested).await?;
            let after = camdb_db::list_linked_account_ids(&state.pool, id)
                .await
                .map_err(|e| map_db_error(rid.clone(), &e))?;
            (after, Some(sync))
        }
        None => (before, None),
    };

    Ok(Json(ApiResponse {
        data: CampaignDetail {
            campaign: to_campaign(rid, row)?,
            account_ids,
            kpi_sync,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// DELETE /api/v1/campaigns/{id}: cascades posts, links and KPI rows.
pub(super) async fn delete_campaign(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let rid = &req_id.0;
    let deleted = camdb_db::delete_campaign(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    if !deleted {
        return Err(ApiError::new(
            rid,
            "not_found",
            format!("campaign {id} not found"),
        ));
    }

    tracing::info!(campaign_id = id, "campaign deleted");
    Ok(Json(ApiResponse {
        data: serde_json::json!({ "deleted": true }),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// Fails with `not_found` for the first id that has no account row, before
/// anything is written.
async fn require_accounts(
    state: &AppState,
    rid: &str,
    account_ids: &[i64],
) -> Result<(), ApiError> {
    for &account_id in account_ids {
        let found = camdb_db::get_account(&state.pool, account_id)
            .await
            .map_err(|e| map_db_error(rid.to_owned(), &e))?;
        if found.is_none() {
            return Err(ApiError::new(
                rid,
                "not_found",
                format!("account {account_id} not found"),
            ));
        }
    }
    Ok(())
}

/// Links accounts in `after` but not `before`, unlinks the reverse, then
/// dispatches one membership event for the transitions that happened.
///
/// A write failure stops the remaining transitions, but the ones already
/// committed are still dispatched before the error is returned.
async fn apply_membership(
    state: &AppState,
    rid: &str,
    campaign_id: i64,
    before: &[i64],
    after: &[i64],
) -> Result<KpiSync, ApiError> {
    let mut linked = Vec::new();
    let mut unlinked = Vec::new();
    let mut failure = None;

    for &account_id in after.iter().filter(|a| !before.contains(a)) {
        match camdb_db::link_account(&state.pool, campaign_id, account_id).await {
            Ok(true) => linked.push(account_id),
            Ok(false) => {}
            Err(e) => {
                failure = Some(map_db_error(rid.to_owned(), &e));
                break;
            }
        }
    }

    if failure.is_none() {
        for &account_id in before.iter().filter(|a| !after.contains(a)) {
            match camdb_db::unlink_account(&state.pool, campaign_id, account_id).await {
                Ok(true) => unlinked.push(account_id),
                Ok(false) => {}
                Err(e) => {
                    failure = Some(map_db_error(rid.to_owned(), &e));
                    break;
                }
            }
        }
    }

    if failure.is_some() {
        tracing::warn!(
            campaign_id,
            linked = linked.len(),
            unlinked = unlinked.len(),
            "campaign membership update interrupted"
        );
    } else {
        tracing::info!(
            campaign_id,
            linked = linked.len(),
            unlinked = unlinked.len(),
            "campaign membership updated"
        );
    }

    let now_linked: Vec<i64> = before
        .iter()
        .copied()
        .filter(|a| !unlinked.contains(a))
        .chain(linked)
        .collect();
    let sync = state
        .sync_kpis(MutationEvent::MembershipUpdated {
            campaign_id,
            before: before.to_vec(),
            after: now_linked,
        })
        .await;

    match failure {
        Some(err) => Err(err),
        None => Ok(sync),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn goal_field_distinguishes_absent_from_null() {
        let absent: UpdateCampaignRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.goal, None);

        let cleared: UpdateCampaignRequest = serde_json::from_str(r#"{"goal": null}"#).unwrap();
        assert_eq!(cleared.goal, Some(None));

        let set: UpdateCampaignRequest = serde_json::from_str(r#"{"goal": "1500.50"}"#).unwrap();
        assert_eq!(set.goal, Some(Some(Decimal::new(150_050, 2))));
    }

    #[test]
    fn dedup_sorts_and_removes_repeats() {
        assert_eq!(dedup(&[3, 1, 3, 2]), vec![1, 2, 3]);
    }

    #[test]
    fn name_validation_trims_and_bounds() {
        assert_eq!(validate_name("r", "  Spring  ").unwrap(), "Spring");
        assert!(validate_name("r", "   ").is_err());
        assert!(validate_name("r", &"x".repeat(201)).is_err());
    }

    #[test]
    fn status_validation_rejects_unknown_values() {
        assert_eq!(validate_status("r", "active").unwrap(), CampaignStatus::Active);
        assert!(validate_status("r", "paused").is_err());
    }
}
