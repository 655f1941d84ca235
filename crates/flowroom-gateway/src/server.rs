use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use flowroom_workflow_orchestrator::FlowOrchestrator;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::error::GatewayError;
use crate::routes;
use crate::state::AppState;

/// Build the gateway's routes around an orchestrator.
pub fn router(orchestrator: Arc<FlowOrchestrator>) -> Router {
  let state = Arc::new(AppState { orchestrator });

  Router::new()
    .route("/api/health", get(routes::health))
    .route(
      "/api/rooms/{room_id}/nodes/{node_id}/execute",
      post(routes::execute_node),
    )
    .route("/api/rooms/{room_id}/flows", post(routes::start_flow))
    // The canvas calls in from the browser.
    .layer(CorsLayer::permissive())
    .with_state(state)
}

/// HTTP server in front of a [`FlowOrchestrator`].
pub struct GatewayServer {
  bind: String,
  orchestrator: Arc<FlowOrchestrator>,
}

impl GatewayServer {
  pub fn new(bind: impl Into<String>, orchestrator: Arc<FlowOrchestrator>) -> Self {
    Self {
      bind: bind.into(),
      orchestrator,
    }
  }

  /// Serve until `shutdown` is cancelled.
  pub async fn run(&self, shutdown: CancellationToken) -> Result<(), GatewayError> {
    let app = router(self.orchestrator.clone());

    let listener = TcpListener::bind(&self.bind).await?;
    info!(bind = %self.bind, "gateway listening");

    axum::serve(listener, app)
      .with_graceful_shutdown(async move { shutdown.cancelled().await })
      .await?;

    info!("gateway shut down");
    Ok(())
  }
}
