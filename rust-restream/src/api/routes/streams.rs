//! Stream management routes.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/api/streams` | List streams with runtime status |
//! | POST | `/api/streams` | Create (and by default start) a stream |
//! | GET | `/api/streams/{id}` | Get one stream |
//! | DELETE | `/api/streams/{id}` | Stop and delete a stream |
//! | POST | `/api/streams/{id}/start` | Start a stored stream |
//! | POST | `/api/streams/{id}/stop` | Stop a stream |

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};

use crate::api::error::ApiResult;
use crate::api::models::{CreateStreamRequest, StopStreamResponse};
use crate::api::server::AppState;
use crate::domain::StreamStatus;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_streams).post(create_stream))
        .route("/{id}", get(get_stream).delete(delete_stream))
        .route("/{id}/start", post(start_stream))
        .route("/{id}/stop", post(stop_stream))
}

async fn list_streams(State(state): State<AppState>) -> Json<Vec<StreamStatus>> {
    Json(state.manager.list_streams().await)
}

async fn create_stream(
    State(state): State<AppState>,
    Json(request): Json<CreateStreamRequest>,
) -> ApiResult<(StatusCode, Json<StreamStatus>)> {
    let start = request.start;
    let definition = request.into_definition();
    let definition = if start {
        state.manager.create_stream(definition).await?
    } else {
        state.manager.add_stream(definition).await?
    };
    // A short-lived stream may already be gone from the store; report what
    // was started rather than re-reading it.
    Ok((StatusCode::CREATED, Json(state.manager.status_of(definition))))
}

async fn get_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<StreamStatus>> {
    Ok(Json(state.manager.get_stream(&id).await?))
}

async fn delete_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.manager.delete_stream(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn start_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<StreamStatus>> {
    let definition = state.manager.start_stream(&id).await?;
    Ok(Json(state.manager.status_of(definition)))
}

async fn stop_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<StopStreamResponse>> {
    let stopped = state.manager.stop_stream(&id).await?;
    Ok(Json(StopStreamResponse { id, stopped }))
}
