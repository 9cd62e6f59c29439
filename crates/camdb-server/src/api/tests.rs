use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::response::IntoResponse;
use camdb_kpi::{Dispatcher, EngineConfig, KpiEngine, PgKpiStore};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::*;

fn test_app(pool: sqlx::PgPool) -> Router {
    let engine = KpiEngine::new(
        Arc::new(PgKpiStore::new(pool.clone())),
        EngineConfig::default(),
    );
    build_app(AppState {
        pool,
        dispatcher: Dispatcher::new(engine),
    })
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    };

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json parse")
    };
    (status, json)
}

async fn create_campaign(app: &Router, account_ids: &[i64]) -> i64 {
    let (status, json) = send(
        app,
        "POST",
        "/api/v1/campaigns",
        Some(json!({
            "name": "Summer Launch",
            "categories": ["beauty"],
            "start_date": "2026-06-01",
            "end_date": "2026-08-31",
            "status": "active",
            "account_ids": account_ids,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json["data"]["id"].as_i64().expect("campaign id")
}

async fn create_account(app: &Router, name: &str) -> i64 {
    let (status, json) = send(
        app,
        "POST",
        "/api/v1/accounts",
        Some(json!({ "name": name, "account_type": "Instagram" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json["data"]["id"].as_i64().expect("account id")
}

async fn create_post(app: &Router, campaign_id: i64, account_id: i64, views: i64) -> Value {
    let (status, json) = send(
        app,
        "POST",
        "/api/v1/posts",
        Some(json!({
            "campaign_id": campaign_id,
            "account_id": account_id,
            "post_date": "2026-06-15",
            "total_view": views,
            "content_type": "reel",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json["data"].clone()
}

async fn kpi_actual(
    app: &Router,
    campaign_id: i64,
    account_id: Option<i64>,
    category: &str,
) -> Option<i64> {
    let uri = format!("/api/v1/campaigns/{campaign_id}/kpis");
    let (status, json) = send(app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    json["data"]
        .as_array()
        .expect("data array")
        .iter()
        .find(|k| k["category"] == category && k["account_id"].as_i64() == account_id)
        .and_then(|k| k["actual"].as_i64())
}

/// Makes every attempt to link `account_id` fail inside Postgres.
async fn reject_links_for(pool: &sqlx::PgPool, account_id: i64) {
    sqlx::query(&format!(
        "CREATE FUNCTION reject_link() RETURNS trigger AS $$ \
         BEGIN \
           IF NEW.account_id = {account_id} THEN RAISE EXCEPTION 'link rejected'; END IF; \
           RETURN NEW; \
         END $$ LANGUAGE plpgsql"
    ))
    .execute(pool)
    .await
    .unwrap();
    sqlx::query(
        "CREATE TRIGGER reject_link BEFORE INSERT OR UPDATE ON campaign_accounts \
         FOR EACH ROW EXECUTE FUNCTION reject_link()",
    )
    .execute(pool)
    .await
    .unwrap();
}

// ---------------------------------------------------------------------------
// Pure helpers
// ---------------------------------------------------------------------------

#[test]
fn normalize_limit_applies_defaults_and_bounds() {
    assert_eq!(normalize_limit(None), 50);
    assert_eq!(normalize_limit(Some(0)), 1);
    assert_eq!(normalize_limit(Some(1_000)), 200);
    assert_eq!(normalize_limit(Some(25)), 25);
}

#[test]
fn api_error_codes_map_to_statuses() {
    let cases = [
        ("validation_error", StatusCode::BAD_REQUEST),
        ("not_found", StatusCode::NOT_FOUND),
        ("conflict", StatusCode::CONFLICT),
        ("timeout", StatusCode::GATEWAY_TIMEOUT),
        ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (code, expected) in cases {
        let response = ApiError::new("req-1", code, "msg").into_response();
        assert_eq!(response.status(), expected, "code {code}");
    }
}

#[test]
fn db_not_found_maps_to_404() {
    let err = map_db_error("req-1".to_string(), &camdb_db::DbError::NotFound);
    assert_eq!(err.error.code, "not_found");
}

// ---------------------------------------------------------------------------
// Routes (with DB)
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn health_reports_database_ok(pool: sqlx::PgPool) {
    let app = test_app(pool);
    let (status, json) = send(&app, "GET", "/api/v1/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["database"], "ok");
    assert!(json["meta"]["request_id"].is_string());
}

#[sqlx::test(migrations = "../../migrations")]
async fn first_post_links_account_and_populates_both_scopes(pool: sqlx::PgPool) {
    let app = test_app(pool);
    let account = create_account(&app, "alpha").await;
    let campaign = create_campaign(&app, &[]).await;

    let post = create_post(&app, campaign, account, 120).await;
    assert_eq!(post["kpi_sync"]["failed"], 0);

    let (_, detail) = send(&app, "GET", &format!("/api/v1/campaigns/{campaign}"), None).await;
    assert_eq!(detail["data"]["account_ids"], json!([account]));

    create_post(&app, campaign, account, 80).await;
    assert_eq!(kpi_actual(&app, campaign, Some(account), "VIEWS").await, Some(200));
    assert_eq!(kpi_actual(&app, campaign, Some(account), "VIDEO_COUNT").await, Some(2));
    assert_eq!(kpi_actual(&app, campaign, None, "QTY_POST").await, Some(2));
}

#[sqlx::test(migrations = "../../migrations")]
async fn deleting_a_post_zeroes_the_scope_but_keeps_rows(pool: sqlx::PgPool) {
    let app = test_app(pool);
    let account = create_account(&app, "alpha").await;
    let campaign = create_campaign(&app, &[account]).await;
    let post = create_post(&app, campaign, account, 50).await;
    let post_id = post["id"].as_i64().expect("post id");

    let (status, _) = send(&app, "DELETE", &format!("/api/v1/posts/{post_id}"), None).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(kpi_actual(&app, campaign, Some(account), "VIEWS").await, Some(0));
    assert_eq!(kpi_actual(&app, campaign, Some(account), "QTY_POST").await, Some(0));
    assert_eq!(kpi_actual(&app, campaign, None, "VIEWS").await, Some(0));
}

#[sqlx::test(migrations = "../../migrations")]
async fn moving_a_post_recalculates_both_accounts(pool: sqlx::PgPool) {
    let app = test_app(pool);
    let a = create_account(&app, "alpha").await;
    let b = create_account(&app, "beta").await;
    let campaign = create_campaign(&app, &[a]).await;
    let post = create_post(&app, campaign, a, 75).await;
    let post_id = post["id"].as_i64().expect("post id");

    let (status, json) = send(
        &app,
        "PATCH",
        &format!("/api/v1/posts/{post_id}"),
        Some(json!({ "account_id": b })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");

    assert_eq!(kpi_actual(&app, campaign, Some(a), "VIEWS").await, Some(0));
    assert_eq!(kpi_actual(&app, campaign, Some(b), "VIEWS").await, Some(75));
    assert_eq!(kpi_actual(&app, campaign, None, "VIEWS").await, Some(75));
}

#[sqlx::test(migrations = "../../migrations")]
async fn caption_edit_triggers_no_recalculation(pool: sqlx::PgPool) {
    let app = test_app(pool);
    let account = create_account(&app, "alpha").await;
    let campaign = create_campaign(&app, &[account]).await;
    let post = create_post(&app, campaign, account, 10).await;
    let post_id = post["id"].as_i64().expect("post id");

    let (status, json) = send(
        &app,
        "PATCH",
        &format!("/api/v1/posts/{post_id}"),
        Some(json!({ "caption": "edited" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["kpi_sync"]["triggers"], 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn explicit_link_initializes_rows_and_unlink_keeps_them(pool: sqlx::PgPool) {
    let app = test_app(pool);
    let account = create_account(&app, "alpha").await;
    let campaign = create_campaign(&app, &[]).await;
    let path = format!("/api/v1/campaigns/{campaign}/accounts/{account}");

    let (status, json) = send(&app, "POST", &path, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["changed"], true);
    assert_eq!(kpi_actual(&app, campaign, Some(account), "VIEWS").await, Some(0));

    let (_, again) = send(&app, "POST", &path, None).await;
    assert_eq!(again["data"]["changed"], false);

    let (status, _) = send(&app, "DELETE", &path, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(kpi_actual(&app, campaign, Some(account), "VIEWS").await, Some(0));

    let (status, _) = send(&app, "DELETE", &path, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../migrations")]
async fn membership_patch_links_and_unlinks(pool: sqlx::PgPool) {
    let app = test_app(pool);
    let a = create_account(&app, "alpha").await;
    let b = create_account(&app, "beta").await;
    let campaign = create_campaign(&app, &[a]).await;

    let (status, json) = send(
        &app,
        "PATCH",
        &format!("/api/v1/campaigns/{campaign}"),
        Some(json!({ "account_ids": [b] })),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["data"]["account_ids"], json!([b]));
    assert_eq!(json["data"]["kpi_sync"]["triggers"], 2);
    assert_eq!(kpi_actual(&app, campaign, Some(a), "VIEWS").await, Some(0));
    assert_eq!(kpi_actual(&app, campaign, Some(b), "VIEWS").await, Some(0));
}

#[sqlx::test(migrations = "../../migrations")]
async fn membership_patch_with_unknown_account_writes_nothing(pool: sqlx::PgPool) {
    let app = test_app(pool.clone());
    let a = create_account(&app, "alpha").await;
    let campaign = create_campaign(&app, &[]).await;

    let (status, json) = send(
        &app,
        "PATCH",
        &format!("/api/v1/campaigns/{campaign}"),
        Some(json!({ "name": "Renamed", "account_ids": [a, 999_999] })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND, "{json}");
    assert!(json["error"]["message"].as_str().unwrap().contains("999999"));

    let linked = camdb_db::list_linked_account_ids(&pool, campaign).await.unwrap();
    assert!(linked.is_empty(), "linked after failed patch: {linked:?}");

    let (_, detail) = send(&app, "GET", &format!("/api/v1/campaigns/{campaign}"), None).await;
    assert_eq!(detail["data"]["name"], "Summer Launch");
    assert_eq!(kpi_actual(&app, campaign, Some(a), "VIEWS").await, None);
}

#[sqlx::test(migrations = "../../migrations")]
async fn campaign_create_with_unknown_account_is_rejected(pool: sqlx::PgPool) {
    let app = test_app(pool);
    let a = create_account(&app, "alpha").await;

    let (status, json) = send(
        &app,
        "POST",
        "/api/v1/campaigns",
        Some(json!({
            "name": "Orphan",
            "start_date": "2026-06-01",
            "end_date": "2026-06-30",
            "account_ids": [a, 424_242],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{json}");

    let (_, list) = send(&app, "GET", "/api/v1/campaigns", None).await;
    assert_eq!(list["data"], json!([]));
}

#[sqlx::test(migrations = "../../migrations")]
async fn every_linked_account_has_kpi_rows_after_membership_patch(pool: sqlx::PgPool) {
    let app = test_app(pool.clone());
    let a = create_account(&app, "alpha").await;
    let b = create_account(&app, "beta").await;
    let campaign = create_campaign(&app, &[]).await;

    let (status, json) = send(
        &app,
        "PATCH",
        &format!("/api/v1/campaigns/{campaign}"),
        Some(json!({ "account_ids": [a, b, a] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");

    let linked = camdb_db::list_linked_account_ids(&pool, campaign).await.unwrap();
    assert_eq!(linked, vec![a, b]);
    for account in linked {
        assert_eq!(
            kpi_actual(&app, campaign, Some(account), "QTY_POST").await,
            Some(0),
            "account {account} linked without rows"
        );
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn interrupted_membership_patch_still_initializes_committed_links(pool: sqlx::PgPool) {
    let app = test_app(pool.clone());
    let a = create_account(&app, "alpha").await;
    let b = create_account(&app, "beta").await;
    let campaign = create_campaign(&app, &[]).await;
    reject_links_for(&pool, b).await;

    let (status, json) = send(
        &app,
        "PATCH",
        &format!("/api/v1/campaigns/{campaign}"),
        Some(json!({ "account_ids": [a, b] })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{json}");

    let linked = camdb_db::list_linked_account_ids(&pool, campaign).await.unwrap();
    assert_eq!(linked, vec![a]);
    assert_eq!(kpi_actual(&app, campaign, Some(a), "VIEWS").await, Some(0));
    assert_eq!(kpi_actual(&app, campaign, Some(b), "VIEWS").await, None);
}

#[sqlx::test(migrations = "../../migrations")]
async fn post_is_aggregated_even_when_linking_fails(pool: sqlx::PgPool) {
    let app = test_app(pool.clone());
    let account = create_account(&app, "alpha").await;
    let campaign = create_campaign(&app, &[]).await;
    reject_links_for(&pool, account).await;

    let (status, json) = send(
        &app,
        "POST",
        "/api/v1/posts",
        Some(json!({
            "campaign_id": campaign,
            "account_id": account,
            "post_date": "2026-06-15",
            "total_view": 75,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{json}");

    assert_eq!(kpi_actual(&app, campaign, Some(account), "VIEWS").await, Some(75));
    assert_eq!(kpi_actual(&app, campaign, None, "VIEWS").await, Some(75));
    assert_eq!(kpi_actual(&app, campaign, None, "QTY_POST").await, Some(1));
}

#[sqlx::test(migrations = "../../migrations")]
async fn target_updates_survive_recalculation(pool: sqlx::PgPool) {
    let app = test_app(pool);
    let account = create_account(&app, "alpha").await;
    let campaign = create_campaign(&app, &[account]).await;
    create_post(&app, campaign, account, 40).await;

    let uri = format!("/api/v1/campaigns/{campaign}/kpis?account_id={account}");
    let (_, listing) = send(&app, "GET", &uri, None).await;
    let views_id = listing["data"]
        .as_array()
        .expect("data array")
        .iter()
        .find(|k| k["category"] == "VIEWS")
        .and_then(|k| k["id"].as_i64())
        .expect("views row");

    let (status, json) = send(
        &app,
        "PUT",
        &format!("/api/v1/kpis/{views_id}/target"),
        Some(json!({ "target": 1000 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["target"], 1000);

    let (status, json) = send(
        &app,
        "POST",
        &format!("/api/v1/campaigns/{campaign}/kpis/recalculate"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"].as_array().map(Vec::len), Some(2));
    assert_eq!(json["data"][0]["values"]["VIEWS"], 40);

    let uri = format!("/api/v1/campaigns/{campaign}/kpis?account_id={account}");
    let (_, listing) = send(&app, "GET", &uri, None).await;
    let views = listing["data"]
        .as_array()
        .expect("data array")
        .iter()
        .find(|k| k["category"] == "VIEWS")
        .cloned()
        .expect("views row");
    assert_eq!(views["target"], 1000);
    assert_eq!(views["actual"], 40);
}

#[sqlx::test(migrations = "../../migrations")]
async fn negative_target_is_rejected(pool: sqlx::PgPool) {
    let app = test_app(pool);
    let (status, json) = send(
        &app,
        "PUT",
        "/api/v1/kpis/1/target",
        Some(json!({ "target": -5 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "validation_error");
}

#[sqlx::test(migrations = "../../migrations")]
async fn unknown_ids_return_404(pool: sqlx::PgPool) {
    let app = test_app(pool);

    let (status, _) = send(&app, "GET", "/api/v1/campaigns/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "GET", "/api/v1/campaigns/999/kpis", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        "PUT",
        "/api/v1/kpis/999/target",
        Some(json!({ "target": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) = send(
        &app,
        "POST",
        "/api/v1/posts",
        Some(json!({
            "campaign_id": 999,
            "account_id": 999,
            "post_date": "2026-06-15",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{json}");
}

#[sqlx::test(migrations = "../../migrations")]
async fn campaign_validation_rejects_bad_input(pool: sqlx::PgPool) {
    let app = test_app(pool);

    let (status, json) = send(
        &app,
        "POST",
        "/api/v1/campaigns",
        Some(json!({
            "name": "Backwards",
            "start_date": "2026-09-01",
            "end_date": "2026-08-01",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "validation_error");

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/campaigns",
        Some(json!({
            "name": "Paused",
            "start_date": "2026-08-01",
            "end_date": "2026-09-01",
            "status": "paused",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../../migrations")]
async fn deleting_a_campaign_cascades_kpis(pool: sqlx::PgPool) {
    let app = test_app(pool.clone());
    let account = create_account(&app, "alpha").await;
    let campaign = create_campaign(&app, &[account]).await;
    create_post(&app, campaign, account, 10).await;

    let (status, _) = send(&app, "DELETE", &format!("/api/v1/campaigns/{campaign}"), None).await;
    assert_eq!(status, StatusCode::OK);

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kpis WHERE campaign_id = $1")
        .bind(campaign)
        .fetch_one(&pool)
        .await
        .expect("count");
    assert_eq!(remaining, 0);

    let (status, _) = send(&app, "DELETE", &format!("/api/v1/campaigns/{campaign}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
