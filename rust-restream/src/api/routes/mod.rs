//! API route modules.
//!
//! Organizes routes by resource type.

pub mod backup;
pub mod health;
pub mod logging;
pub mod streams;

use axum::Router;

use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/streams", streams::router())
        .nest("/api/backup", backup::router())
        .nest("/api/logging", logging::router())
        .nest("/health", health::router())
        .with_state(state)
}
