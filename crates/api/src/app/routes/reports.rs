//! Read-only statistics over stored sessions.
//!
//! Every endpoint takes optional `start`/`end` query parameters restricting
//! sessions by start time (inclusive).

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/metrics", get(general_metrics))
        .route("/operators/:id", get(operator_metrics))
        .route("/sessions", get(session_report))
}

/// GET /reports/metrics?start=2024-01-01&end=2024-01-31
pub async fn general_metrics(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::RangeQuery>,
) -> axum::response::Response {
    let range = match query.to_range() {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    match services.general_metrics(&range).await {
        Ok(metrics) => Json(metrics).into_response(),
        Err(e) => errors::audit_error_to_response(e),
    }
}

pub async fn operator_metrics(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Query(query): Query<dto::RangeQuery>,
) -> axum::response::Response {
    let operator_id = match dto::parse_operator_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let range = match query.to_range() {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    match services.operator_metrics(operator_id, &range).await {
        Ok(metrics) => Json(metrics).into_response(),
        Err(e) => errors::audit_error_to_response(e),
    }
}

/// GET /reports/sessions
///
/// One row per session, newest first, plus the status summary.
pub async fn session_report(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::RangeQuery>,
) -> axum::response::Response {
    let range = match query.to_range() {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    match services.report(&range).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => errors::audit_error_to_response(e),
    }
}
