use std::sync::Arc;

use flowroom_config::{
  ExecutionRecord, ExecutionStatus, ExecutionUpdate, NodeExecutionResult, RoomDocument,
};
use flowroom_store::{SharedState, SharedStateClient};
use flowroom_task_runtime::ScriptExecutor;
use flowroom_workflow::children_of;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::budget::ExecutionBudget;
use crate::config::OrchestratorConfig;
use crate::dispatcher::LocationDispatcher;
use crate::error::OrchestratorError;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::history::HistoryRecorder;

/// Result of running one node in isolation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleNodeOutcome {
  pub node_result: NodeExecutionResult,
  /// The node's children in edge order, whether or not the node succeeded.
  pub children: Vec<String>,
}

/// Result of a full flow run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowOutcome {
  pub success: bool,
  pub execution_id: String,
  pub nodes_executed: usize,
  pub results: Vec<NodeExecutionResult>,
}

/// Mutable state of one flow run, threaded through every branch.
struct FlowRun {
  execution_id: String,
  budget: ExecutionBudget,
  results: Vec<NodeExecutionResult>,
  failed: bool,
}

/// Entry point for running nodes and flows in a room.
pub struct FlowOrchestrator {
  client: SharedStateClient,
  dispatcher: LocationDispatcher,
  history: HistoryRecorder,
  notifier: Arc<dyn ExecutionNotifier>,
  config: OrchestratorConfig,
}

impl FlowOrchestrator {
  pub fn new(
    store: Arc<dyn SharedState>,
    executor: Arc<dyn ScriptExecutor>,
    config: OrchestratorConfig,
  ) -> Self {
    let client = SharedStateClient::new(store);
    let dispatcher = LocationDispatcher::new(
      client.clone(),
      executor,
      config.caller_poll_interval,
      config.caller_timeout,
    );
    let history = HistoryRecorder::new(client.clone(), config.history_limit);

    Self {
      client,
      dispatcher,
      history,
      notifier: Arc::new(NoopNotifier),
      config,
    }
  }

  /// Send execution events to `notifier`.
  pub fn with_notifier(mut self, notifier: Arc<dyn ExecutionNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  pub fn config(&self) -> &OrchestratorConfig {
    &self.config
  }

  /// Run exactly one node and report its children.
  ///
  /// No history record is written. The caller decides whether to continue
  /// into `children` based on the node's result.
  #[instrument(
    name = "execute_single_node",
    skip(self, input),
    fields(room_id = %room_id, node_id = %node_id)
  )]
  pub async fn execute_single_node(
    &self,
    room_id: &str,
    node_id: &str,
    input: Value,
  ) -> Result<SingleNodeOutcome, OrchestratorError> {
    require_id("roomId", room_id)?;
    require_id("nodeId", node_id)?;

    let doc = self.initial_snapshot(room_id).await?;
    let node = doc
      .node(node_id)
      .ok_or_else(|| OrchestratorError::NodeNotFound {
        room_id: room_id.to_string(),
        node_id: node_id.to_string(),
      })?;

    self.notifier.notify(ExecutionEvent::NodeStarted {
      execution_id: None,
      node_id: node_id.to_string(),
    });
    let node_result = self.dispatcher.dispatch(room_id, node, &input).await;
    self.report_node(None, &node_result);

    Ok(SingleNodeOutcome {
      node_result,
      children: children_of(node_id, &doc.edges),
    })
  }

  /// Run a flow from `start_node_id` until every branch stops or the budget
  /// runs out.
  #[instrument(
    name = "execute_flow",
    skip(self),
    fields(room_id = %room_id, start_node_id = %start_node_id)
  )]
  pub async fn execute_flow(
    &self,
    room_id: &str,
    start_node_id: &str,
  ) -> Result<FlowOutcome, OrchestratorError> {
    require_id("roomId", room_id)?;
    require_id("startNodeId", start_node_id)?;

    let doc = self.initial_snapshot(room_id).await?;
    let start = doc
      .node(start_node_id)
      .ok_or_else(|| OrchestratorError::NodeNotFound {
        room_id: room_id.to_string(),
        node_id: start_node_id.to_string(),
      })?;

    let execution_id = uuid::Uuid::new_v4().to_string();
    info!(execution_id = %execution_id, "flow_started");

    self
      .history
      .begin(
        room_id,
        ExecutionRecord::started(&execution_id, start_node_id, &start.label),
      )
      .await;
    self.notifier.notify(ExecutionEvent::FlowStarted {
      execution_id: execution_id.clone(),
      room_id: room_id.to_string(),
      start_node_id: start_node_id.to_string(),
    });

    let mut run = FlowRun {
      execution_id,
      budget: ExecutionBudget::from_config(&self.config),
      results: Vec::new(),
      failed: false,
    };
    self
      .visit(room_id, start_node_id.to_string(), Value::Null, &mut run)
      .await;

    let status = if run.failed {
      ExecutionStatus::Error
    } else {
      ExecutionStatus::Success
    };
    self
      .history
      .finish(room_id, &run.execution_id, status, &run.results)
      .await;

    info!(
      execution_id = %run.execution_id,
      nodes_executed = run.results.len(),
      success = !run.failed,
      "flow_completed"
    );
    self.notifier.notify(ExecutionEvent::FlowCompleted {
      execution_id: run.execution_id.clone(),
      success: !run.failed,
      nodes_executed: run.results.len(),
    });

    Ok(FlowOutcome {
      success: !run.failed,
      execution_id: run.execution_id,
      nodes_executed: run.results.len(),
      results: run.results,
    })
  }

  /// Execute `node_id` and then, depth-first and in edge order, its
  /// children.
  fn visit<'a>(
    &'a self,
    room_id: &'a str,
    node_id: String,
    input: Value,
    run: &'a mut FlowRun,
  ) -> BoxFuture<'a, ()> {
    async move {
      if let Err(stop) = run.budget.try_acquire(&node_id) {
        debug!(node_id = %node_id, reason = ?stop, "execution budget stop");
        return;
      }

      // Always act on fresh state; the graph may have changed since the
      // run started.
      let doc = match self.client.snapshot(room_id).await {
        Ok(doc) => doc,
        Err(e) => {
          warn!(node_id = %node_id, error = %e, "failed to read room, branch stopped");
          return;
        }
      };
      let Some(node) = doc.node(&node_id) else {
        debug!(node_id = %node_id, "node no longer exists, branch stopped");
        return;
      };

      self.notifier.notify(ExecutionEvent::NodeStarted {
        execution_id: Some(run.execution_id.clone()),
        node_id: node_id.clone(),
      });
      let result = self.dispatcher.dispatch(room_id, node, &input).await;
      self.report_node(Some(&run.execution_id), &result);

      let next = result.propagated_value().cloned();
      let failed = result.is_error();
      run.results.push(result);

      if failed {
        run.failed = true;
        return;
      }

      self
        .history
        .advance(
          room_id,
          &run.execution_id,
          ExecutionUpdate::progress(&run.results),
        )
        .await;

      let Some(value) = next else {
        return;
      };
      for child in children_of(&node_id, &doc.edges) {
        self.visit(room_id, child, value.clone(), run).await;
      }
    }
    .boxed()
  }

  async fn initial_snapshot(&self, room_id: &str) -> Result<RoomDocument, OrchestratorError> {
    self
      .client
      .snapshot(room_id)
      .await
      .map_err(|e| OrchestratorError::from_store(room_id, e))
  }

  fn report_node(&self, execution_id: Option<&String>, result: &NodeExecutionResult) {
    let execution_id = execution_id.cloned();
    match &result.error {
      Some(error) => {
        info!(node_id = %result.node_id, error = %error, "node_failed");
        self.notifier.notify(ExecutionEvent::NodeFailed {
          execution_id,
          node_id: result.node_id.clone(),
          error: error.clone(),
        });
      }
      None => {
        info!(node_id = %result.node_id, "node_completed");
        self.notifier.notify(ExecutionEvent::NodeCompleted {
          execution_id,
          node_id: result.node_id.clone(),
          result: result.result.clone(),
        });
      }
    }
  }
}

fn require_id(name: &str, value: &str) -> Result<(), OrchestratorError> {
  if value.trim().is_empty() {
    return Err(OrchestratorError::Validation {
      message: format!("{} is required", name),
    });
  }
  Ok(())
}
