use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use flowroom_workflow_orchestrator::OrchestratorError;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
  #[error(transparent)]
  Orchestrator(#[from] OrchestratorError),

  #[error("invalid request body: {0}")]
  InvalidBody(String),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

impl GatewayError {
  pub fn status(&self) -> StatusCode {
    match self {
      GatewayError::Orchestrator(OrchestratorError::Validation { .. }) => StatusCode::BAD_REQUEST,
      GatewayError::Orchestrator(
        OrchestratorError::RoomNotFound { .. } | OrchestratorError::NodeNotFound { .. },
      ) => StatusCode::NOT_FOUND,
      GatewayError::Orchestrator(OrchestratorError::Store { .. }) => StatusCode::SERVICE_UNAVAILABLE,
      GatewayError::InvalidBody(_) => StatusCode::BAD_REQUEST,
      GatewayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for GatewayError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      warn!(error = %self, "request failed");
    }
    let body = Json(serde_json::json!({ "error": self.to_string() }));
    (status, body).into_response()
  }
}
