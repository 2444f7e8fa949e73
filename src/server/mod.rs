//! HTTP surface of the service

mod handlers;

pub use handlers::{CodeResponse, GenerateRequest, OpenApiRequest};

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServiceConfig;
use crate::contexts::{
    AgentModelRegistry, AgentRegistry, ChatCompletion, ExecutionError, OpenAiChatClient,
};
use crate::registries::{FileAgentModelRegistry, FileAgentRegistry};

/// Read-only state shared by all requests
#[derive(Clone)]
pub struct AppState {
    pub agent_registry: Arc<dyn AgentRegistry>,
    pub model_registry: Arc<dyn AgentModelRegistry>,
    pub client: Arc<dyn ChatCompletion>,
    pub max_body_bytes: usize,
}

impl AppState {
    /// Wires file registries and the HTTP generation client from `config`
    pub fn from_config(config: &ServiceConfig) -> Result<Self, ExecutionError> {
        let client = OpenAiChatClient::new(&config.base_url, &config.api_key, config.timeout())?;
        Self::with_client(config, Arc::new(client))
    }

    /// Same as [`AppState::from_config`] with a caller supplied generation client
    pub fn with_client(
        config: &ServiceConfig,
        client: Arc<dyn ChatCompletion>,
    ) -> Result<Self, ExecutionError> {
        Ok(Self {
            agent_registry: Arc::new(FileAgentRegistry::new(config.agents_dir.clone())),
            model_registry: Arc::new(FileAgentModelRegistry::new(config.agents_dir.clone())?),
            client,
            max_body_bytes: config.max_body_bytes,
        })
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/generate", post(handlers::generate))
        .route("/lime", post(handlers::generate_from_openapi))
        .route("/blue", post(handlers::optimize_tests))
        .route("/purple", post(handlers::review_tests))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Binds the listener and serves until the process is stopped
pub async fn serve(config: ServiceConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(&config)?;
    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        address = %listener.local_addr()?,
        base_url = %config.base_url,
        timeout_secs = config.timeout_secs,
        "casesmith listening"
    );
    axum::serve(listener, router(state)).await?;
    Ok(())
}
