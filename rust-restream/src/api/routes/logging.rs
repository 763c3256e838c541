//! Logging routes: view and change the log filter at runtime.

use axum::{Json, Router, extract::State, routing::get};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{LogFilterBody, LogFilterResponse, LogModuleInfo};
use crate::api::server::AppState;
use crate::logging::{LoggingConfig, available_modules};

pub fn router() -> Router<AppState> {
    Router::new().route("/filter", get(get_filter).put(set_filter))
}

fn logging_config(state: &AppState) -> ApiResult<&LoggingConfig> {
    state
        .logging_config
        .as_deref()
        .ok_or_else(|| ApiError::internal("Logging is not configured"))
}

fn response(config: &LoggingConfig) -> LogFilterResponse {
    LogFilterResponse {
        filter: config.get_filter(),
        modules: available_modules()
            .into_iter()
            .map(|(name, description)| LogModuleInfo {
                name: name.to_string(),
                description: description.to_string(),
            })
            .collect(),
    }
}

async fn get_filter(State(state): State<AppState>) -> ApiResult<Json<LogFilterResponse>> {
    Ok(Json(response(logging_config(&state)?)))
}

async fn set_filter(
    State(state): State<AppState>,
    Json(body): Json<LogFilterBody>,
) -> ApiResult<Json<LogFilterResponse>> {
    let config = logging_config(&state)?;
    config.set_filter(&body.filter)?;
    Ok(Json(response(config)))
}
