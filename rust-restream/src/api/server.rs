//! HTTP server wiring: shared state, middleware and the serve loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, info};

use crate::api::routes;
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::logging::LoggingConfig;
use crate::supervisor::StreamManager;

/// Where and how the API listens.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Allow any origin; the API is meant to sit behind a trusted frontend.
    pub enable_cors: bool,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ApiServerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            bind_address: config.bind_address.clone(),
            port: config.port,
            enable_cors: true,
        }
    }
}

impl ApiServerConfig {
    fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| Error::config(format!("invalid listen address: {e}")))
    }
}

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub start_time: Instant,
    pub manager: Arc<StreamManager>,
    /// Set once the global subscriber is installed.
    pub logging_config: Option<Arc<LoggingConfig>>,
}

impl AppState {
    pub fn new(manager: Arc<StreamManager>) -> Self {
        Self {
            start_time: Instant::now(),
            manager,
            logging_config: None,
        }
    }

    pub fn with_logging_config(self, config: Arc<LoggingConfig>) -> Self {
        Self {
            logging_config: Some(config),
            ..self
        }
    }
}

pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, state: AppState) -> Self {
        Self {
            config,
            state,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Cancelling this token drains in-flight requests and ends [`ApiServer::run`].
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Routes plus CORS and request tracing.
    pub fn build_router(&self) -> Router {
        let trace = TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
            .on_response(DefaultOnResponse::new().level(Level::INFO));

        let router = routes::create_router(self.state.clone()).layer(trace);
        if self.config.enable_cors {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    pub async fn run(&self) -> Result<()> {
        let addr = self.config.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Other(format!("cannot listen on {addr}: {e}")))?;
        info!("API server listening on http://{}", addr);

        let token = self.cancel_token.clone();
        axum::serve(listener, self.build_router())
            .with_graceful_shutdown(async move {
                token.cancelled().await;
                info!("API server draining connections");
            })
            .await
            .map_err(|e| Error::Other(format!("API server failed: {e}")))
    }
}
