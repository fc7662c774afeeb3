//! Axum router and all HTTP handlers for tg-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! tracing and CORS layers. Every `/api` route sits behind
//! [`crate::auth::require_auth`]; `/v1/health` does not.

use std::{fmt::Display, sync::Arc};

use axum::{
    body::Bytes,
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, Multipart, Query, State,
    },
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde_json::Value;
use tg_db::{TradeQuery, DEFAULT_PAGE_LIMIT};
use tg_journal::CreateTradeError;
use tg_schemas::Side;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    api_types::{
        AnalyzeResponse, AnalyzeTradeQuery, AnalyzeTradeResponse, DataResponse, ErrorResponse,
        HealthResponse, IngestResponse, MetricsQuery, RunsQuery, TradesQuery,
    },
    auth::{require_auth, AuthUser},
    state::AppState,
};

/// Multipart field carrying the CSV.
const UPLOAD_FIELD: &str = "file";
const DEFAULT_UPLOAD_NAME: &str = "upload.csv";

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Tracing and CORS are **not** applied here so tests can use the bare
/// router. The upload body limit is, since handlers depend on it.
pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/api/ingest", post(ingest))
        .route("/api/ingest/runs", get(ingest_runs))
        .route("/api/trades", get(list_trades).post(create_trade))
        .route("/api/analyze", post(analyze))
        .route("/api/analyze-trade", post(analyze_trade))
        .route("/api/metrics/daily", get(metrics_daily))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_auth,
        ));

    Router::new()
        .route("/v1/health", get(health))
        .merge(api)
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error helpers
// ---------------------------------------------------------------------------

fn error_json(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: msg.into() })).into_response()
}

fn bad_request(msg: impl Into<String>) -> Response {
    error_json(StatusCode::BAD_REQUEST, msg)
}

/// Log the cause; the client only sees a generic 500.
fn internal(what: &str, err: impl Display) -> Response {
    error!(error = %err, "{what}");
    error_json(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
            backend: st.store.backend().to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /api/ingest
// ---------------------------------------------------------------------------

/// Upload a CSV as multipart field `file`.
pub(crate) async fn ingest(
    State(st): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(m) => m,
        Err(e) => return error_json(e.status(), e.body_text()),
    };

    let mut upload: Option<(String, Bytes)> = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some(UPLOAD_FIELD) {
                    continue;
                }
                let filename = field
                    .file_name()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or(DEFAULT_UPLOAD_NAME)
                    .to_string();
                match field.bytes().await {
                    Ok(bytes) => {
                        upload = Some((filename, bytes));
                        break;
                    }
                    Err(e) => return error_json(e.status(), e.body_text()),
                }
            }
            Ok(None) => break,
            Err(e) => return error_json(e.status(), e.body_text()),
        }
    }

    let Some((filename, bytes)) = upload else {
        return bad_request("No file provided");
    };

    match tg_journal::ingest_csv(&st.store, &bytes, &filename, &user.user_id).await {
        Ok(summary) => (StatusCode::OK, Json(IngestResponse::from(summary))).into_response(),
        Err(e) if e.is_client_error() => bad_request(e.to_string()),
        Err(e) => internal("ingest failed", e),
    }
}

// ---------------------------------------------------------------------------
// GET /api/ingest/runs
// ---------------------------------------------------------------------------

pub(crate) async fn ingest_runs(
    State(st): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    query: Result<Query<RunsQuery>, QueryRejection>,
) -> Response {
    let Query(q) = match query {
        Ok(q) => q,
        Err(e) => return bad_request(e.body_text()),
    };
    match tg_journal::list_ingest_runs(st.store.as_ref(), &user.user_id, q.limit).await {
        Ok(runs) => Json(DataResponse { data: runs }).into_response(),
        Err(e) => internal("list ingest runs failed", format!("{e:#}")),
    }
}

// ---------------------------------------------------------------------------
// /api/trades
// ---------------------------------------------------------------------------

pub(crate) async fn list_trades(
    State(st): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    query: Result<Query<TradesQuery>, QueryRejection>,
) -> Response {
    let Query(q) = match query {
        Ok(q) => q,
        Err(e) => return bad_request(e.body_text()),
    };

    let side = match q.side.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => None,
        Some(raw) => match Side::parse(raw) {
            Some(s) => Some(s),
            None => return bad_request("side must be one of BUY, SELL, SHORT, COVER"),
        },
    };

    let mut tq = TradeQuery::for_user(user.user_id);
    tq.page = q.page.unwrap_or(1);
    tq.limit = q.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    tq.symbol = q.symbol;
    tq.side = side;

    match tg_journal::list_trades_with_tags(st.store.as_ref(), tq).await {
        Ok(trades) => Json(DataResponse { data: trades }).into_response(),
        Err(e) => internal("list trades failed", format!("{e:#}")),
    }
}

pub(crate) async fn create_trade(
    State(st): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return bad_request(e.body_text()),
    };

    match tg_journal::create_trade(st.store.as_ref(), &user.user_id, &body).await {
        Ok(trade) => Json(DataResponse { data: trade }).into_response(),
        Err(e @ (CreateTradeError::Missing(_) | CreateTradeError::Invalid(_))) => {
            bad_request(e.to_string())
        }
        Err(CreateTradeError::Duplicate) => {
            error_json(StatusCode::CONFLICT, CreateTradeError::Duplicate.to_string())
        }
        Err(e @ CreateTradeError::Store(_)) => internal("create trade failed", e),
    }
}

// ---------------------------------------------------------------------------
// POST /api/analyze, POST /api/analyze-trade
// ---------------------------------------------------------------------------

pub(crate) async fn analyze(
    State(st): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Response {
    match tg_journal::analyze_user(st.store.as_ref(), &user.user_id).await {
        Ok(summary) => Json(AnalyzeResponse::from(summary)).into_response(),
        Err(e) => internal("analysis failed", format!("{e:#}")),
    }
}

pub(crate) async fn analyze_trade(
    State(st): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    query: Result<Query<AnalyzeTradeQuery>, QueryRejection>,
) -> Response {
    let Query(q) = match query {
        Ok(q) => q,
        Err(e) => return bad_request(e.body_text()),
    };
    let Some(raw) = q.id.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
        return bad_request("Trade ID is required");
    };
    let Ok(trade_id) = Uuid::parse_str(raw) else {
        return bad_request("Invalid trade ID");
    };

    match tg_journal::analyze_trade(st.store.as_ref(), &user.user_id, trade_id).await {
        Ok(Some(behaviors)) => {
            info!(
                user_id = %user.user_id,
                trade_id = %trade_id,
                tags = behaviors.len(),
                "trade analyzed"
            );
            Json(AnalyzeTradeResponse {
                success: true,
                behaviors,
            })
            .into_response()
        }
        Ok(None) => error_json(StatusCode::NOT_FOUND, "Trade not found"),
        Err(e) => internal("trade analysis failed", format!("{e:#}")),
    }
}

// ---------------------------------------------------------------------------
// GET /api/metrics/daily
// ---------------------------------------------------------------------------

pub(crate) async fn metrics_daily(
    State(st): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    query: Result<Query<MetricsQuery>, QueryRejection>,
) -> Response {
    let Query(q) = match query {
        Ok(q) => q,
        Err(e) => return bad_request(e.body_text()),
    };
    let Some(days) = tg_behavior::parse_range(q.range.as_deref().unwrap_or("")) else {
        return bad_request("range must look like 30d");
    };

    let today = Utc::now().date_naive();
    match tg_journal::daily_metrics(st.store.as_ref(), &user.user_id, today, days).await {
        Ok(rows) => Json(DataResponse { data: rows }).into_response(),
        Err(e) => internal("daily metrics failed", format!("{e:#}")),
    }
}
