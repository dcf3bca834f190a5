use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};

use stocktake_audit::{NewSessionEvent, ScanReading, SessionStatus};
use stocktake_infra::OperatorRef;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_session).get(list_sessions))
        .route("/open", get(open_session))
        .route("/:id", get(get_session))
        .route("/:id/readings", post(submit_readings).get(list_readings))
        .route("/:id/events", post(append_events).get(list_events))
        .route("/:id/finalize", put(finalize_session))
        .route("/:id/cancel", put(cancel_session))
}

/// POST /sessions
///
/// Opens a session for the given operator (username or id). Inactive
/// operators are refused before the engine is involved.
pub async fn create_session(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateSessionRequest>,
) -> axum::response::Response {
    if body.operator.trim().is_empty() {
        return errors::validation_error("operator cannot be empty");
    }
    let operator_ref = OperatorRef::parse(&body.operator);

    let operator = match services.resolve_operator(&operator_ref).await {
        Ok(o) => o,
        Err(e) => return errors::audit_error_to_response(e),
    };
    if !operator.is_active {
        tracing::warn!(operator_id = %operator.id, "refused session for inactive operator");
        return errors::json_error(
            StatusCode::FORBIDDEN,
            "operator_inactive",
            format!("operator '{}' is inactive", operator.username),
        );
    }

    match services.start_session(&operator).await {
        Ok(session) => (StatusCode::CREATED, Json(dto::session_to_json(&session))).into_response(),
        Err(e) => errors::audit_error_to_response(e),
    }
}

pub async fn list_sessions(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.list_sessions().await {
        Ok(sessions) => Json(
            sessions
                .iter()
                .map(dto::session_to_json)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::audit_error_to_response(e),
    }
}

/// GET /sessions/open
///
/// 204 when no session is open.
pub async fn open_session(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.open_session().await {
        Ok(Some(session)) => Json(dto::session_to_json(&session)).into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::audit_error_to_response(e),
    }
}

pub async fn get_session(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match dto::parse_session_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.get_detail(id).await {
        Ok(detail) => Json(dto::detail_to_json(&detail)).into_response(),
        Err(e) => errors::audit_error_to_response(e),
    }
}

/// POST /sessions/:id/readings
///
/// Body: `[{"tag_id", "product_code", "scanned_at"}]`. Already accepted tags
/// are skipped; an unknown product fails the whole batch.
pub async fn submit_readings(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<Vec<dto::ReadingRequest>>,
) -> axum::response::Response {
    let id = match dto::parse_session_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let readings: Vec<ScanReading> = body.into_iter().map(Into::into).collect();

    match services.submit_readings(id, readings).await {
        Ok(detail) => Json(dto::detail_to_json(&detail)).into_response(),
        Err(e) => errors::audit_error_to_response(e),
    }
}

pub async fn append_events(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<Vec<dto::EventRequest>>,
) -> axum::response::Response {
    let id = match dto::parse_session_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let events: Vec<NewSessionEvent> = body.into_iter().map(Into::into).collect();

    match services.append_events(id, events).await {
        Ok(detail) => Json(dto::detail_to_json(&detail)).into_response(),
        Err(e) => errors::audit_error_to_response(e),
    }
}

pub async fn finalize_session(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    close(&services, &id, SessionStatus::Finalized).await
}

pub async fn cancel_session(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    close(&services, &id, SessionStatus::Cancelled).await
}

async fn close(services: &AppServices, raw_id: &str, target: SessionStatus) -> axum::response::Response {
    let id = match dto::parse_session_id(raw_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.close_session(id, target).await {
        Ok(session) => Json(dto::session_to_json(&session)).into_response(),
        Err(e) => errors::audit_error_to_response(e),
    }
}

/// GET /sessions/:id/readings?product_id=X&category_code=Y&limit=50&offset=0
pub async fn list_readings(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Query(query): Query<dto::ReadingListQuery>,
) -> axum::response::Response {
    let id = match dto::parse_session_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let (filter, pagination) = match query.into_parts() {
        Ok(parts) => parts,
        Err(resp) => return resp,
    };

    match services.list_readings(id, &filter, pagination).await {
        Ok(page) => Json(dto::page_to_json(&page)).into_response(),
        Err(e) => errors::audit_error_to_response(e),
    }
}

/// GET /sessions/:id/events?kind=pause&limit=50&offset=0
pub async fn list_events(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Query(query): Query<dto::EventListQuery>,
) -> axum::response::Response {
    let id = match dto::parse_session_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let (filter, pagination) = query.into_parts();

    match services.list_events(id, &filter, pagination).await {
        Ok(page) => Json(dto::page_to_json(&page)).into_response(),
        Err(e) => errors::audit_error_to_response(e),
    }
}
