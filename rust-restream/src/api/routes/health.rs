//! Health check route.

use axum::{Json, Router, extract::State, routing::get};

use crate::api::models::{EncoderHealth, HealthResponse};
use crate::api::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health_check))
}

/// Reports `degraded` when the encoder binary is not usable.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let engine = state.manager.engine();
    let available = engine.is_available();

    Json(HealthResponse {
        status: if available { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        encoder: EncoderHealth {
            name: engine.name().to_string(),
            available,
            version: engine.version(),
        },
        running_streams: state.manager.running_count(),
    })
}
