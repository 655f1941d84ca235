use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use flowroom_workflow_orchestrator::{FlowOutcome, SingleNodeOutcome};
use serde::Deserialize;
use tracing::info;

use crate::error::GatewayError;
use crate::state::AppState;

// GET /api/health
pub async fn health() -> Json<serde_json::Value> {
  Json(serde_json::json!({
    "status": "ok",
    "version": env!("CARGO_PKG_VERSION"),
  }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ExecuteNodeBody {
  #[serde(default)]
  pub input: serde_json::Value,
}

// POST /api/rooms/{room_id}/nodes/{node_id}/execute
pub async fn execute_node(
  State(state): State<Arc<AppState>>,
  Path((room_id, node_id)): Path<(String, String)>,
  body: Bytes,
) -> Result<Json<SingleNodeOutcome>, GatewayError> {
  // The body is optional; no body means a null input.
  let body: ExecuteNodeBody = if body.iter().all(u8::is_ascii_whitespace) {
    ExecuteNodeBody::default()
  } else {
    serde_json::from_slice(&body).map_err(|e| GatewayError::InvalidBody(e.to_string()))?
  };

  info!(room_id = %room_id, node_id = %node_id, "execute node requested");
  let outcome = state
    .orchestrator
    .execute_single_node(&room_id, &node_id, body.input)
    .await?;
  Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartFlowBody {
  #[serde(default)]
  pub start_node_id: String,
}

// POST /api/rooms/{room_id}/flows
pub async fn start_flow(
  State(state): State<Arc<AppState>>,
  Path(room_id): Path<String>,
  body: Bytes,
) -> Result<Json<FlowOutcome>, GatewayError> {
  let body: StartFlowBody =
    serde_json::from_slice(&body).map_err(|e| GatewayError::InvalidBody(e.to_string()))?;

  info!(room_id = %room_id, start_node_id = %body.start_node_id, "flow requested");
  let outcome = state
    .orchestrator
    .execute_flow(&room_id, &body.start_node_id)
    .await?;
  Ok(Json(outcome))
}
