use std::sync::Arc;

use flowroom_workflow_orchestrator::FlowOrchestrator;

/// Shared application state for axum handlers.
pub struct AppState {
  pub orchestrator: Arc<FlowOrchestrator>,
}
