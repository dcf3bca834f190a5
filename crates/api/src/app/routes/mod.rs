use axum::Router;

pub mod reports;
pub mod sessions;
pub mod system;

/// Router for all audit endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/sessions", sessions::router())
        .nest("/reports", reports::router())
}
