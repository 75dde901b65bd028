use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

use super::middleware;
use super::AppState;
use crate::alerts::error::AlertError;
use crate::alerts::evaluator::TestAlertOutcome;

const REQUESTER_HEADER: &str = "x-user-id";
const DEFAULT_HISTORY_LIMIT: usize = 50;
const MAX_HISTORY_LIMIT: usize = 100;

type ApiError = (StatusCode, Json<Value>);

pub fn build_router(state: AppState) -> Router {
    let health_routes = Router::new().route(
        "/",
        get(|| async {
            Json(json!({
                "status": "ok",
            }))
        }),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(vec![
            header::CONTENT_TYPE,
            header::HeaderName::from_static(REQUESTER_HEADER),
        ]);

    Router::new()
        .nest("/health", health_routes)
        .nest("/api", api_router())
        .fallback(not_found)
        .with_state(state)
        .layer(cors)
        .layer(axum::middleware::from_fn(middleware::strip_trailing_slash))
        .layer(axum::middleware::from_fn(
            middleware::enrich_current_span_middleware,
        ))
}

fn api_router() -> Router<AppState> {
    Router::new()
        .route("/alerts/history", get(alert_history))
        .route("/alerts/{id}/test", post(trigger_test_alert))
        .route("/scheduler", get(scheduler_status))
}

async fn not_found(req: axum::extract::Request) -> impl IntoResponse {
    tracing::warn!("unhandled path: {}", req.uri());
    (StatusCode::NOT_FOUND, "Not Found")
}

fn requester(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(REQUESTER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("missing {REQUESTER_HEADER} header") })),
            )
        })
}

fn alert_error(e: AlertError) -> ApiError {
    let status = match &e {
        AlertError::NotFound(_) => StatusCode::NOT_FOUND,
        AlertError::Unauthorized { .. } => StatusCode::FORBIDDEN,
        AlertError::Store(_) => {
            tracing::error!(error = %e, "Store failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(json!({ "error": e.to_string() })))
}

/// POST /api/alerts/{id}/test
#[tracing::instrument(skip(state, headers))]
async fn trigger_test_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<TestAlertOutcome>, ApiError> {
    let requester = requester(&headers)?;
    let outcome = state
        .evaluator
        .trigger_test_alert(&id, &requester)
        .await
        .map_err(alert_error)?;

    Ok(Json(outcome))
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

/// GET /api/alerts/history?limit=N
async fn alert_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let requester = requester(&headers)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    let records = state
        .store
        .history_for_owner(&requester, limit)
        .await
        .map_err(|e| alert_error(AlertError::Store(e)))?;

    Ok(Json(json!({ "history": records })))
}

/// GET /api/scheduler
async fn scheduler_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "state": state.scheduler.state().await,
        "daily_hour": state.scheduler.daily_hour(),
        "next_daily_run": state.scheduler.next_daily_run().map(|t| t.to_rfc3339()),
    }))
}
