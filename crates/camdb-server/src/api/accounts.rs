use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use camdb_core::Account;
use serde::Deserialize;

use crate::middleware::RequestId;

use super::{
    map_db_error, normalize_limit, validation_error, ApiError, ApiResponse, AppState, ResponseMeta,
};

#[derive(Debug, Deserialize)]
pub(super) struct ListQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateAccountRequest {
    pub name: String,
    pub account_type: String,
}

/// GET /api/v1/accounts
pub(super) async fn list_accounts(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<Account>>>, ApiError> {
    let rows = camdb_db::list_accounts(&state.pool, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows.into_iter().map(Account::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// POST /api/v1/accounts
pub(super) async fn create_account(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Account>>), ApiError> {
    let rid = &req_id.0;
    let name = body.name.trim();
    if name.is_empty() || name.chars().count() > 200 {
        return Err(validation_error(rid, "name must be 1-200 characters"));
    }
    let account_type = body.account_type.trim().to_ascii_lowercase();
    if account_type.is_empty() {
        return Err(validation_error(rid, "account_type must not be empty"));
    }

    let row = camdb_db::create_account(&state.pool, name, &account_type)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: Account::from(row),
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}
