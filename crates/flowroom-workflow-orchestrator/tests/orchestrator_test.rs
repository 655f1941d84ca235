//! Integration tests for FlowOrchestrator using the Lua executor and the
//! in-memory store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flowroom_config::{Edge, ExecutionLocation, ExecutionStatus, Node, RoomDocument};
use flowroom_host_http::HttpPolicy;
use flowroom_store::{DocumentUpdate, InMemoryStore, SharedState, SharedStateClient, StoreError};
use flowroom_task_runtime::{Capabilities, ScriptExecutor};
use flowroom_task_runtime_lua::{LuaScriptExecutor, SandboxLimits};
use flowroom_workflow_orchestrator::{
  CallerWorker, ChannelNotifier, ExecutionEvent, FlowOrchestrator, OrchestratorConfig,
  OrchestratorError, TraversalPolicy,
};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const ROOM: &str = "room";

fn lua_executor() -> Arc<dyn ScriptExecutor> {
  let capabilities = Capabilities::with_http_policy(HttpPolicy::default()).unwrap();
  Arc::new(LuaScriptExecutor::new(capabilities, SandboxLimits::default()))
}

fn fast_config() -> OrchestratorConfig {
  OrchestratorConfig {
    caller_poll_interval: Duration::from_millis(10),
    caller_timeout: Duration::from_millis(200),
    ..Default::default()
  }
}

fn room(nodes: Vec<Node>, edges: &[(&str, &str)]) -> RoomDocument {
  let mut doc = RoomDocument::default();
  for node in nodes {
    doc.insert_node(node);
  }
  for (i, (source, target)) in edges.iter().enumerate() {
    doc.edges.push(Edge::new(format!("e{i}"), *source, *target));
  }
  doc
}

async fn setup(doc: RoomDocument, config: OrchestratorConfig) -> (FlowOrchestrator, Arc<InMemoryStore>) {
  let store = Arc::new(InMemoryStore::new());
  store.insert_room(ROOM, doc).await;
  let orchestrator = FlowOrchestrator::new(store.clone(), lua_executor(), config);
  (orchestrator, store)
}

fn executed_ids(results: &[flowroom_config::NodeExecutionResult]) -> Vec<&str> {
  results.iter().map(|r| r.node_id.as_str()).collect()
}

#[tokio::test]
async fn test_linear_flow_passes_results_downstream() {
  let doc = room(
    vec![
      Node::new("a", "A", "return { v = 1 }"),
      Node::new("b", "B", "return { v = input.v + 1 }"),
    ],
    &[("a", "b")],
  );
  let (orchestrator, store) = setup(doc, fast_config()).await;

  let outcome = orchestrator.execute_flow(ROOM, "a").await.unwrap();

  assert!(outcome.success);
  assert_eq!(outcome.nodes_executed, 2);
  assert_eq!(outcome.results[0].result, Some(json!({"v": 1})));
  assert_eq!(outcome.results[1].result, Some(json!({"v": 2})));
  assert_eq!(executed_ids(&outcome.results), vec!["a", "b"]);

  let doc = store.snapshot(ROOM).await.unwrap();
  let record = &doc.execution_history[0];
  assert_eq!(record.id, outcome.execution_id);
  assert_eq!(record.status, ExecutionStatus::Success);
  assert_eq!(record.nodes_executed, 2);
  assert_eq!(record.results, outcome.results);
  assert!(record.completed_at.is_some());

  let b = doc.node("b").unwrap();
  assert_eq!(b.last_result, Some(json!({"v": 2})));
  assert!(!b.is_executing);
  assert_eq!(b.error, None);
}

#[tokio::test]
async fn test_start_node_receives_nil() {
  let doc = room(vec![Node::new("a", "A", "return { was_nil = input == nil }")], &[]);
  let (orchestrator, _store) = setup(doc, fast_config()).await;

  let outcome = orchestrator.execute_flow(ROOM, "a").await.unwrap();
  assert_eq!(outcome.results[0].result, Some(json!({"was_nil": true})));
}

#[tokio::test]
async fn test_throwing_start_node() {
  let doc = room(
    vec![
      Node::new("a", "A", r#"error("boom")"#),
      Node::new("b", "B", "return 1"),
    ],
    &[("a", "b")],
  );
  let (orchestrator, store) = setup(doc, fast_config()).await;

  let outcome = orchestrator.execute_flow(ROOM, "a").await.unwrap();

  assert!(!outcome.success);
  assert_eq!(outcome.nodes_executed, 1);
  assert_eq!(outcome.results[0].error.as_deref(), Some("boom"));
  assert_eq!(outcome.results[0].result, None);

  let doc = store.snapshot(ROOM).await.unwrap();
  assert_eq!(doc.execution_history[0].status, ExecutionStatus::Error);
  let a = doc.node("a").unwrap();
  assert_eq!(a.error.as_deref(), Some("boom"));
  assert!(!a.is_executing);
}

#[tokio::test]
async fn test_cycle_stops_at_node_cap() {
  let doc = room(
    vec![
      Node::new("a", "A", "return { n = 1 }"),
      Node::new("b", "B", "return input"),
    ],
    &[("a", "b"), ("b", "a")],
  );
  let config = OrchestratorConfig {
    per_node_cap: 2,
    global_cap: 100,
    ..fast_config()
  };
  let (orchestrator, _store) = setup(doc, config).await;

  let outcome = orchestrator.execute_flow(ROOM, "a").await.unwrap();

  assert!(outcome.success);
  assert_eq!(outcome.nodes_executed, 4);
  assert_eq!(executed_ids(&outcome.results), vec!["a", "b", "a", "b"]);
}

#[tokio::test]
async fn test_global_cap_bounds_run() {
  let doc = room(
    vec![
      Node::new("a", "A", "return 1"),
      Node::new("b", "B", "return 1"),
      Node::new("c", "C", "return 1"),
    ],
    &[
      ("a", "a"),
      ("a", "b"),
      ("a", "c"),
      ("b", "a"),
      ("b", "c"),
      ("c", "a"),
      ("c", "b"),
    ],
  );
  let config = OrchestratorConfig {
    per_node_cap: 10,
    global_cap: 12,
    ..fast_config()
  };
  let (orchestrator, _store) = setup(doc, config).await;

  let outcome = orchestrator.execute_flow(ROOM, "a").await.unwrap();

  assert_eq!(outcome.nodes_executed, 12);
  let mut counts: HashMap<&str, usize> = HashMap::new();
  for id in executed_ids(&outcome.results) {
    *counts.entry(id).or_default() += 1;
  }
  assert!(counts.values().all(|&n| n <= 10));
}

#[tokio::test]
async fn test_dag_reaches_every_path() {
  // a -> b -> d, a -> c -> d: d is reached once per path.
  let doc = room(
    vec![
      Node::new("a", "A", "return 1"),
      Node::new("b", "B", "return 1"),
      Node::new("c", "C", "return 1"),
      Node::new("d", "D", "return 1"),
      Node::new("e", "E", "return 1"),
    ],
    &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
  );
  let (orchestrator, _store) = setup(doc, fast_config()).await;

  let outcome = orchestrator.execute_flow(ROOM, "a").await.unwrap();

  assert!(outcome.success);
  assert_eq!(executed_ids(&outcome.results), vec!["a", "b", "d", "c", "d"]);
}

#[tokio::test]
async fn test_failing_branch_does_not_stop_siblings() {
  let doc = room(
    vec![
      Node::new("a", "A", "return 1"),
      Node::new("b", "B", r#"error("bad branch")"#),
      Node::new("c", "C", "return input + 1"),
      Node::new("d", "D", "return 1"),
    ],
    &[("a", "b"), ("a", "c"), ("b", "d")],
  );
  let (orchestrator, _store) = setup(doc, fast_config()).await;

  let outcome = orchestrator.execute_flow(ROOM, "a").await.unwrap();

  assert!(!outcome.success);
  assert_eq!(executed_ids(&outcome.results), vec!["a", "b", "c"]);
  assert_eq!(outcome.results[1].error.as_deref(), Some("bad branch"));
  assert_eq!(outcome.results[1].result, None);
  assert_eq!(outcome.results[2].result, Some(json!(2)));
}

#[tokio::test]
async fn test_empty_result_stops_branch() {
  let doc = room(
    vec![
      Node::new("a", "A", "local x = 1"),
      Node::new("b", "B", "return 1"),
      Node::new("n", "N", "return nil"),
    ],
    &[("a", "b"), ("n", "b")],
  );
  let (orchestrator, _store) = setup(doc, fast_config()).await;

  let outcome = orchestrator.execute_flow(ROOM, "a").await.unwrap();
  assert!(outcome.success);
  assert_eq!(executed_ids(&outcome.results), vec!["a"]);
  assert_eq!(outcome.results[0].result, None);

  let outcome = orchestrator.execute_flow(ROOM, "n").await.unwrap();
  assert_eq!(executed_ids(&outcome.results), vec!["n"]);
}

#[tokio::test]
async fn test_visit_once_policy() {
  let doc = room(
    vec![
      Node::new("a", "A", "return 1"),
      Node::new("b", "B", "return 1"),
    ],
    &[("a", "b"), ("b", "a")],
  );
  let config = OrchestratorConfig {
    traversal_policy: TraversalPolicy::VisitOnce,
    ..fast_config()
  };
  let (orchestrator, _store) = setup(doc, config).await;

  let outcome = orchestrator.execute_flow(ROOM, "a").await.unwrap();
  assert_eq!(executed_ids(&outcome.results), vec!["a", "b"]);
}

#[tokio::test]
async fn test_history_keeps_most_recent_runs() {
  let doc = room(vec![Node::new("a", "A", "return 1")], &[]);
  let config = OrchestratorConfig {
    history_limit: 3,
    ..fast_config()
  };
  let (orchestrator, store) = setup(doc, config).await;

  let mut ids = Vec::new();
  for _ in 0..5 {
    ids.push(orchestrator.execute_flow(ROOM, "a").await.unwrap().execution_id);
  }

  let doc = store.snapshot(ROOM).await.unwrap();
  let kept: Vec<_> = doc.execution_history.iter().map(|r| r.id.clone()).collect();
  assert_eq!(kept, vec![ids[4].clone(), ids[3].clone(), ids[2].clone()]);
}

#[tokio::test]
async fn test_validation_and_not_found() {
  let doc = room(vec![Node::new("a", "A", "return 1")], &[]);
  let (orchestrator, _store) = setup(doc, fast_config()).await;

  assert!(matches!(
    orchestrator.execute_flow("", "a").await,
    Err(OrchestratorError::Validation { .. })
  ));
  assert!(matches!(
    orchestrator.execute_single_node(ROOM, "  ", Value::Null).await,
    Err(OrchestratorError::Validation { .. })
  ));
  assert!(matches!(
    orchestrator.execute_flow("other", "a").await,
    Err(OrchestratorError::RoomNotFound { .. })
  ));
  assert!(matches!(
    orchestrator.execute_flow(ROOM, "zzz").await,
    Err(OrchestratorError::NodeNotFound { .. })
  ));
}

#[tokio::test]
async fn test_unreachable_store_on_first_read() {
  let doc = room(vec![Node::new("a", "A", "return 1")], &[]);
  let (orchestrator, store) = setup(doc, fast_config()).await;
  store.set_available(false);

  assert!(matches!(
    orchestrator.execute_flow(ROOM, "a").await,
    Err(OrchestratorError::Store { .. })
  ));
}

/// Serves reads but rejects every write.
struct ReadOnlyStore(InMemoryStore);

#[async_trait]
impl SharedState for ReadOnlyStore {
  async fn snapshot(&self, room_id: &str) -> Result<RoomDocument, StoreError> {
    self.0.snapshot(room_id).await
  }

  async fn mutate(&self, _room_id: &str, _update: &DocumentUpdate<'_>) -> Result<(), StoreError> {
    Err(StoreError::Unavailable("writes rejected".to_string()))
  }
}

#[tokio::test]
async fn test_failed_writes_do_not_affect_run() {
  let inner = InMemoryStore::new();
  inner
    .insert_room(
      ROOM,
      room(
        vec![
          Node::new("a", "A", "return { v = 1 }"),
          Node::new("b", "B", "return { v = input.v + 1 }"),
        ],
        &[("a", "b")],
      ),
    )
    .await;
  let store = Arc::new(ReadOnlyStore(inner));
  let orchestrator = FlowOrchestrator::new(store.clone(), lua_executor(), fast_config());

  let outcome = orchestrator.execute_flow(ROOM, "a").await.unwrap();

  assert!(outcome.success);
  assert_eq!(outcome.results[1].result, Some(json!({"v": 2})));
  assert!(store.snapshot(ROOM).await.unwrap().execution_history.is_empty());
}

#[tokio::test]
async fn test_single_node_returns_children_without_history() {
  let doc = room(
    vec![
      Node::new("a", "A", "return { v = input.v * 2 }"),
      Node::new("b", "B", "return 1"),
      Node::new("c", "C", "return 1"),
    ],
    &[("a", "c"), ("a", "b")],
  );
  let (orchestrator, store) = setup(doc, fast_config()).await;

  let outcome = orchestrator
    .execute_single_node(ROOM, "a", json!({"v": 21}))
    .await
    .unwrap();

  assert_eq!(outcome.node_result.result, Some(json!({"v": 42})));
  assert_eq!(outcome.children, vec!["c", "b"]);
  assert!(store.snapshot(ROOM).await.unwrap().execution_history.is_empty());
}

#[tokio::test]
async fn test_single_node_failure_still_lists_children() {
  let doc = room(
    vec![Node::new("a", "A", r#"error("nope")"#), Node::new("b", "B", "")],
    &[("a", "b")],
  );
  let (orchestrator, _store) = setup(doc, fast_config()).await;

  let outcome = orchestrator
    .execute_single_node(ROOM, "a", Value::Null)
    .await
    .unwrap();

  assert_eq!(outcome.node_result.error.as_deref(), Some("nope"));
  assert_eq!(outcome.children, vec!["b"]);
}

#[tokio::test]
async fn test_caller_timeout_clears_marker() {
  let doc = room(
    vec![Node::new("a", "A", "return 1").with_location(ExecutionLocation::Caller)],
    &[],
  );
  let (orchestrator, store) = setup(doc, fast_config()).await;

  let outcome = orchestrator.execute_flow(ROOM, "a").await.unwrap();

  assert!(!outcome.success);
  let error = outcome.results[0].error.clone().unwrap();
  assert_eq!(error, "caller execution timed out after 200ms");

  let doc = store.snapshot(ROOM).await.unwrap();
  let a = doc.node("a").unwrap();
  assert!(!a.is_executing);
  assert!(!a.pending_caller_execution);
  assert_eq!(a.caller_input, None);
  assert!(a.error.as_deref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_caller_result_flows_to_children() {
  let doc = room(
    vec![
      Node::new("a", "A", "return { v = 5 }").with_location(ExecutionLocation::Caller),
      Node::new("b", "B", "return { v = input.v * 2 }"),
    ],
    &[("a", "b")],
  );
  let config = OrchestratorConfig {
    caller_timeout: Duration::from_secs(5),
    ..fast_config()
  };
  let (orchestrator, store) = setup(doc, config).await;

  let worker = CallerWorker::new(
    SharedStateClient::new(store.clone()),
    lua_executor(),
    Duration::from_millis(10),
  );
  let cancel = CancellationToken::new();
  let worker_cancel = cancel.clone();
  let handle = tokio::spawn(async move { worker.run(ROOM, worker_cancel).await });

  let outcome = orchestrator.execute_flow(ROOM, "a").await.unwrap();
  cancel.cancel();
  handle.await.unwrap();

  assert!(outcome.success, "{:?}", outcome.results);
  assert_eq!(outcome.results[0].result, Some(json!({"v": 5})));
  assert_eq!(outcome.results[1].result, Some(json!({"v": 10})));

  let doc = store.snapshot(ROOM).await.unwrap();
  let a = doc.node("a").unwrap();
  assert!(!a.pending_caller_execution);
  assert!(!a.is_executing);
}

#[tokio::test]
async fn test_caller_error_is_recorded() {
  let doc = room(
    vec![Node::new("a", "A", r#"error("client side")"#).with_location(ExecutionLocation::Caller)],
    &[],
  );
  let config = OrchestratorConfig {
    caller_timeout: Duration::from_secs(5),
    ..fast_config()
  };
  let (orchestrator, store) = setup(doc, config).await;

  let worker = CallerWorker::new(
    SharedStateClient::new(store.clone()),
    lua_executor(),
    Duration::from_millis(10),
  );
  let cancel = CancellationToken::new();
  let worker_cancel = cancel.clone();
  let handle = tokio::spawn(async move { worker.run(ROOM, worker_cancel).await });

  let outcome = orchestrator.execute_flow(ROOM, "a").await.unwrap();
  cancel.cancel();
  handle.await.unwrap();

  assert!(!outcome.success);
  assert_eq!(outcome.results[0].error.as_deref(), Some("client side"));
}

#[tokio::test]
async fn test_node_removed_while_awaiting_caller() {
  let doc = room(
    vec![Node::new("a", "A", "return 1").with_location(ExecutionLocation::Caller)],
    &[],
  );
  let config = OrchestratorConfig {
    caller_timeout: Duration::from_secs(5),
    ..fast_config()
  };
  let (orchestrator, store) = setup(doc, config).await;

  let remover = store.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(50)).await;
    remover
      .mutate(ROOM, &|doc: &mut RoomDocument| {
        doc.nodes.remove("a");
      })
      .await
      .unwrap();
  });

  let outcome = orchestrator.execute_flow(ROOM, "a").await.unwrap();
  assert_eq!(
    outcome.results[0].error.as_deref(),
    Some("node a was removed while awaiting caller execution")
  );
}

#[tokio::test]
async fn test_edge_to_missing_node_is_dropped() {
  let doc = room(
    vec![Node::new("a", "A", "return 1"), Node::new("b", "B", "return input + 1")],
    &[("a", "ghost"), ("a", "b")],
  );
  let (orchestrator, _store) = setup(doc, fast_config()).await;

  let outcome = orchestrator.execute_flow(ROOM, "a").await.unwrap();

  assert!(outcome.success, "{:?}", outcome.results);
  assert_eq!(outcome.nodes_executed, 2);
  assert_eq!(executed_ids(&outcome.results), vec!["a", "b"]);
  assert_eq!(outcome.results[1].result, Some(json!(2)));
}

#[tokio::test]
async fn test_concurrent_caller_runs_of_one_node_do_not_mix_inputs() {
  let doc = room(
    vec![Node::new("a", "A", "return input").with_location(ExecutionLocation::Caller)],
    &[],
  );
  let config = OrchestratorConfig {
    caller_timeout: Duration::from_secs(5),
    ..fast_config()
  };
  let (orchestrator, store) = setup(doc, config).await;

  let worker = CallerWorker::new(
    SharedStateClient::new(store.clone()),
    lua_executor(),
    Duration::from_millis(10),
  );
  let cancel = CancellationToken::new();
  let worker_cancel = cancel.clone();
  let handle = tokio::spawn(async move { worker.run(ROOM, worker_cancel).await });

  let (first, second) = tokio::join!(
    orchestrator.execute_single_node(ROOM, "a", json!(1)),
    orchestrator.execute_single_node(ROOM, "a", json!(2)),
  );
  cancel.cancel();
  handle.await.unwrap();

  assert_eq!(first.unwrap().node_result.result, Some(json!(1)));
  assert_eq!(second.unwrap().node_result.result, Some(json!(2)));

  let doc = store.snapshot(ROOM).await.unwrap();
  let a = doc.node("a").unwrap();
  assert!(!a.pending_caller_execution);
  assert_eq!(a.caller_input, None);
}

#[tokio::test]
async fn test_events_are_emitted_in_order() {
  let doc = room(
    vec![
      Node::new("a", "A", "return 1"),
      Node::new("b", "B", r#"error("x")"#),
    ],
    &[("a", "b")],
  );
  let (tx, mut rx) = mpsc::unbounded_channel();
  let store = Arc::new(InMemoryStore::new());
  store.insert_room(ROOM, doc).await;
  let orchestrator = FlowOrchestrator::new(store, lua_executor(), fast_config())
    .with_notifier(Arc::new(ChannelNotifier::new(tx)));

  let outcome = orchestrator.execute_flow(ROOM, "a").await.unwrap();
  drop(orchestrator);

  let mut events = Vec::new();
  while let Some(event) = rx.recv().await {
    events.push(event);
  }

  let id = Some(outcome.execution_id.clone());
  assert_eq!(
    events,
    vec![
      ExecutionEvent::FlowStarted {
        execution_id: outcome.execution_id.clone(),
        room_id: ROOM.to_string(),
        start_node_id: "a".to_string(),
      },
      ExecutionEvent::NodeStarted {
        execution_id: id.clone(),
        node_id: "a".to_string(),
      },
      ExecutionEvent::NodeCompleted {
        execution_id: id.clone(),
        node_id: "a".to_string(),
        result: Some(json!(1)),
      },
      ExecutionEvent::NodeStarted {
        execution_id: id.clone(),
        node_id: "b".to_string(),
      },
      ExecutionEvent::NodeFailed {
        execution_id: id,
        node_id: "b".to_string(),
        error: "x".to_string(),
      },
      ExecutionEvent::FlowCompleted {
        execution_id: outcome.execution_id.clone(),
        success: false,
        nodes_executed: 2,
      },
    ]
  );
}
