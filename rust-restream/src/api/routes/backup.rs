//! Backup routes: export and import the full stream list.

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};

use crate::api::error::ApiResult;
use crate::api::models::{ImportRequest, ImportResponse, StreamSnapshot};
use crate::api::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/export", get(export_streams))
        .route("/import", post(import_streams))
}

async fn export_streams(State(state): State<AppState>) -> Json<StreamSnapshot> {
    Json(StreamSnapshot::new(state.manager.export().await))
}

/// Stop everything, replace the stored list, start the enabled streams.
async fn import_streams(
    State(state): State<AppState>,
    Json(request): Json<ImportRequest>,
) -> ApiResult<Json<ImportResponse>> {
    let streams = request.into_streams();
    let imported = streams.len();
    let started = state.manager.import(streams).await?;
    Ok(Json(ImportResponse { imported, started }))
}
